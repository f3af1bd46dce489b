//! Modbus RTU access to the Kron Mult-K three-phase power meter
//!
//! Register map, bit-exact value decoding, RTU framing, and a serial
//! client with half-duplex direction control. The acquisition policy
//! (pacing, per-register failure handling, upload) lives in `telemsrv`.

pub mod catalog;
pub mod client;
pub mod decode;
pub mod direction;
pub mod error;
pub mod frame;
pub mod pdu;
pub mod transport;

pub use catalog::{descriptor_by_address, RegisterDescriptor, ValueKind, REGISTER_CATALOG};
pub use client::{MeterClient, RegisterReader};
pub use decode::{decode, decode_float32, decode_scaled, encode_float32};
pub use direction::{DirectionControl, NoopDirection, TransmitHold};
pub use error::{MeterError, Result};
pub use frame::RtuFrameCodec;
pub use transport::{RtuTransport, SerialTransport};

#[cfg(all(target_os = "linux", feature = "gpio"))]
pub use direction::gpio::GpioDirection;
