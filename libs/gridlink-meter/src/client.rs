//! Register-read client for the Mult-K
//!
//! One call = one bus transaction: build request, scoped transmit hold,
//! send, accumulate the reply under a deadline, validate, extract words.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::direction::{DirectionControl, TransmitHold};
use crate::error::{MeterError, Result};
use crate::frame::RtuFrameCodec;
use crate::pdu::{build_read_request, expected_response_len, parse_read_response, EXCEPTION_FRAME_LEN};
use crate::transport::RtuTransport;

/// Register-read access to the meter
///
/// The seam consumed by the acquisition engine and the diagnostics
/// endpoints; mocked in their tests.
#[async_trait]
pub trait RegisterReader: Send {
    /// Read `quantity` input registers starting at `address`
    async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u16>>;
}

/// Modbus RTU client bound to a single station id
pub struct MeterClient<T: RtuTransport> {
    transport: T,
    direction: Box<dyn DirectionControl>,
    codec: RtuFrameCodec,
    station_id: u8,
    read_timeout: Duration,
}

impl<T: RtuTransport> MeterClient<T> {
    pub fn new(
        transport: T,
        direction: Box<dyn DirectionControl>,
        station_id: u8,
        read_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            direction,
            codec: RtuFrameCodec::new(),
            station_id,
            read_timeout,
        }
    }

    /// Accumulate a complete response frame under one deadline
    ///
    /// The reply length is known up front from the request; an exception
    /// reply is shorter and is detected from the flagged function code as
    /// soon as two PDU bytes are in.
    async fn read_frame(&mut self, quantity: u16) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.read_timeout;
        let full_len = expected_response_len(quantity);
        let mut response: Vec<u8> = Vec::with_capacity(full_len);
        let mut chunk = [0u8; 64];

        loop {
            let expected = if response.len() >= 2 && response[1] & 0x80 != 0 {
                EXCEPTION_FRAME_LEN
            } else {
                full_len
            };
            if response.len() >= expected {
                return Ok(response);
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| MeterError::timeout("Response deadline exceeded"))?;

            let n = self.transport.receive(&mut chunk, remaining).await?;
            if n == 0 {
                return Err(MeterError::protocol("Serial port closed mid-response"));
            }
            response.extend_from_slice(&chunk[..n]);
            trace!("Response buffer at {}/{} bytes", response.len(), expected);
        }
    }
}

#[async_trait]
impl<T: RtuTransport> RegisterReader for MeterClient<T> {
    async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u16>> {
        let pdu = build_read_request(address, quantity)?;
        let frame = self.codec.build_frame(self.station_id, &pdu);

        debug!(
            "Reading {} register(s) at 0x{:04X} from station {}",
            quantity, address, self.station_id
        );

        // Driver-enable held for the transmit phase only; the scoped hold
        // releases before the meter's reply window on every exit path.
        {
            let _hold = TransmitHold::new(self.direction.as_mut())?;
            self.transport.send(&frame).await?;
        }

        let raw = self.read_frame(quantity).await?;
        let (station_id, response_pdu) = self.codec.parse_frame(&raw)?;
        if station_id != self.station_id {
            return Err(MeterError::ProtocolError(format!(
                "Station id mismatch: expected {}, got {}",
                self.station_id, station_id
            )));
        }

        parse_read_response(&response_pdu, quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::encode_float32;
    use crate::direction::NoopDirection;
    use crate::frame::crc16;

    /// Transport fed with canned responses; records sent frames.
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        responses: Vec<Result<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                sent: Vec::new(),
                responses,
            }
        }
    }

    #[async_trait]
    impl RtuTransport for ScriptedTransport {
        async fn send(&mut self, frame: &[u8]) -> Result<()> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        async fn receive(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
            if self.responses.is_empty() {
                return Err(MeterError::timeout("Serial receive timeout"));
            }
            let bytes = self.responses.remove(0)?;
            buffer[..bytes.len()].copy_from_slice(&bytes);
            Ok(bytes.len())
        }
    }

    fn response_frame(station_id: u8, pdu: &[u8]) -> Vec<u8> {
        let mut frame = vec![station_id];
        frame.extend_from_slice(pdu);
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    fn float_response(station_id: u8, value: f32) -> Vec<u8> {
        let (w1, w2) = encode_float32(value);
        let mut pdu = vec![0x04, 0x04];
        pdu.extend_from_slice(&w1.to_be_bytes());
        pdu.extend_from_slice(&w2.to_be_bytes());
        response_frame(station_id, &pdu)
    }

    #[tokio::test]
    async fn test_read_decodes_full_transaction() {
        let transport = ScriptedTransport::new(vec![Ok(float_response(1, 220.5))]);
        let mut client = MeterClient::new(
            transport,
            Box::new(NoopDirection),
            1,
            Duration::from_secs(1),
        );

        let regs = client
            .read_input_registers(0x0002, 2)
            .await
            .expect("read should succeed");
        let (w1, w2) = encode_float32(220.5);
        assert_eq!(regs, vec![w1, w2]);
    }

    #[tokio::test]
    async fn test_request_frame_layout() {
        let transport = ScriptedTransport::new(vec![Ok(float_response(1, 0.0))]);
        let mut client = MeterClient::new(
            transport,
            Box::new(NoopDirection),
            1,
            Duration::from_secs(1),
        );
        client
            .read_input_registers(0x000E, 2)
            .await
            .expect("read should succeed");

        let sent = &client.transport.sent[0];
        // station 1, FC04, address 0x000E, quantity 2, CRC trailer
        assert_eq!(&sent[..6], &[0x01, 0x04, 0x00, 0x0E, 0x00, 0x02]);
        assert_eq!(sent.len(), 8);
    }

    #[tokio::test]
    async fn test_fragmented_response_is_accumulated() {
        let full = float_response(1, 60.0);
        let (head, tail) = full.split_at(3);
        let transport = ScriptedTransport::new(vec![Ok(head.to_vec()), Ok(tail.to_vec())]);
        let mut client = MeterClient::new(
            transport,
            Box::new(NoopDirection),
            1,
            Duration::from_secs(1),
        );

        let regs = client
            .read_input_registers(0x000E, 2)
            .await
            .expect("fragmented read should succeed");
        assert_eq!(regs, vec![encode_float32(60.0).0, encode_float32(60.0).1]);
    }

    #[tokio::test]
    async fn test_exception_response_maps_to_error() {
        let frame = response_frame(1, &[0x84, 0x02]);
        let transport = ScriptedTransport::new(vec![Ok(frame)]);
        let mut client = MeterClient::new(
            transport,
            Box::new(NoopDirection),
            1,
            Duration::from_secs(1),
        );

        let result = client.read_input_registers(0x0002, 2).await;
        assert!(matches!(result, Err(MeterError::Exception(0x02))));
    }

    #[tokio::test]
    async fn test_timeout_propagates() {
        let transport = ScriptedTransport::new(vec![]);
        let mut client = MeterClient::new(
            transport,
            Box::new(NoopDirection),
            1,
            Duration::from_millis(10),
        );

        let result = client.read_input_registers(0x0002, 2).await;
        assert!(matches!(result, Err(MeterError::TimeoutError(_))));
    }

    #[tokio::test]
    async fn test_station_mismatch_rejected() {
        let transport = ScriptedTransport::new(vec![Ok(float_response(9, 220.5))]);
        let mut client = MeterClient::new(
            transport,
            Box::new(NoopDirection),
            1,
            Duration::from_secs(1),
        );

        let result = client.read_input_registers(0x0002, 2).await;
        assert!(matches!(result, Err(MeterError::ProtocolError(_))));
    }
}
