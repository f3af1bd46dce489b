//! Half-duplex direction control for RS-485 adapters
//!
//! The Mult-K sits on a two-wire RS-485 bus: the driver-enable line must be
//! asserted for the duration of the transmit phase and released before the
//! meter's reply window opens. The hold is scoped so release happens on
//! every exit path, including errors mid-send.

use tracing::warn;

use crate::error::Result;

/// Driver-enable control of an RS-485 transceiver
pub trait DirectionControl: Send {
    /// Assert the driver-enable line prior to transmission
    fn assert_transmit(&mut self) -> Result<()>;

    /// Release the driver-enable line, returning the bus to receive
    fn release_transmit(&mut self) -> Result<()>;
}

/// Scoped transmit hold
///
/// Asserts on construction, releases on drop. Failure to release is logged
/// rather than propagated: the transaction outcome is already decided by
/// the time the hold ends.
pub struct TransmitHold<'a> {
    control: &'a mut dyn DirectionControl,
}

impl<'a> TransmitHold<'a> {
    pub fn new(control: &'a mut dyn DirectionControl) -> Result<Self> {
        control.assert_transmit()?;
        Ok(Self { control })
    }
}

impl Drop for TransmitHold<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.control.release_transmit() {
            warn!("Failed to release transmit control: {}", e);
        }
    }
}

/// No-op control for adapters with automatic direction switching
#[derive(Debug, Default)]
pub struct NoopDirection;

impl DirectionControl for NoopDirection {
    fn assert_transmit(&mut self) -> Result<()> {
        Ok(())
    }

    fn release_transmit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// DE/RE control via a GPIO pin (Raspberry Pi class gateways)
#[cfg(all(target_os = "linux", feature = "gpio"))]
pub mod gpio {
    use rppal::gpio::{Gpio, OutputPin};

    use super::DirectionControl;
    use crate::error::{MeterError, Result};

    pub struct GpioDirection {
        pin: OutputPin,
    }

    impl GpioDirection {
        /// Claim the given BCM pin and initialize it to receive (low)
        pub fn new(bcm_pin: u8) -> Result<Self> {
            let gpio = Gpio::new()
                .map_err(|e| MeterError::IoError(format!("GPIO init failed: {e}")))?;
            let mut pin = gpio
                .get(bcm_pin)
                .map_err(|e| MeterError::IoError(format!("GPIO pin {bcm_pin} unavailable: {e}")))?
                .into_output();
            pin.set_low();
            Ok(Self { pin })
        }
    }

    impl DirectionControl for GpioDirection {
        fn assert_transmit(&mut self) -> Result<()> {
            self.pin.set_high();
            Ok(())
        }

        fn release_transmit(&mut self) -> Result<()> {
            self.pin.set_low();
            Ok(())
        }
    }
}
