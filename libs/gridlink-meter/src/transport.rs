//! Serial transport for the RTU bus

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info};

use crate::error::{MeterError, Result};

/// Byte-level transport under the RTU framing layer
#[async_trait]
pub trait RtuTransport: Send {
    /// Write a complete frame to the bus
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Read available bytes into `buffer`, bounded by `read_timeout`
    async fn receive(&mut self, buffer: &mut [u8], read_timeout: Duration) -> Result<usize>;
}

/// Serial port transport (RS-485 via `tokio-serial`)
pub struct SerialTransport {
    port: SerialStream,
}

impl SerialTransport {
    /// Open the serial device with Mult-K framing (8N1)
    pub fn open(device: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        info!("Opening serial port: {} at {} baud", device, baud_rate);

        let port = tokio_serial::new(device, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(read_timeout)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", device, e);
                MeterError::IoError(format!("Failed to open serial port {device}: {e}"))
            })?;

        Ok(Self { port })
    }
}

#[async_trait]
impl RtuTransport for SerialTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.port
            .write_all(frame)
            .await
            .map_err(|e| MeterError::IoError(format!("Serial send error: {e}")))?;
        self.port
            .flush()
            .await
            .map_err(|e| MeterError::IoError(format!("Serial flush error: {e}")))?;
        debug!("Sent {} bytes via serial", frame.len());
        Ok(())
    }

    async fn receive(&mut self, buffer: &mut [u8], read_timeout: Duration) -> Result<usize> {
        match timeout(read_timeout, self.port.read(buffer)).await {
            Ok(Ok(bytes)) => {
                debug!("Received {} bytes via serial", bytes);
                Ok(bytes)
            }
            Ok(Err(e)) => Err(MeterError::IoError(format!("Serial receive error: {e}"))),
            Err(_) => Err(MeterError::timeout("Serial receive timeout")),
        }
    }
}
