//! MBAP framing for Modbus/TCP.
//!
//! One codec instance belongs to one session. Exchanges on a session are
//! strictly serialized, so at most one request is outstanding at a time and
//! response matching reduces to validating the echoed transaction id, unit
//! id and function code of that single request.

use tracing::debug;

use crate::error::{LinkError, Result};
use crate::pdu::Pdu;

/// Bytes preceding the PDU in a TCP frame: transaction id, protocol id,
/// length field, unit id
pub const MBAP_HEADER_LEN: usize = 7;

/// Maximum value of the MBAP length field, which counts the unit id plus
/// the PDU
pub const MAX_MBAP_LENGTH: usize = 254;

/// Largest complete frame the link layer will accept: the six fixed header
/// bytes plus the length field maximum
pub const MAX_FRAME_SIZE: usize = 6 + MAX_MBAP_LENGTH;

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    transaction_id: u16,
    unit_id: u8,
    function_code: u8,
}

/// Frame builder/parser with transaction tracking
#[derive(Debug)]
pub struct FrameCodec {
    next_transaction_id: u16,
    pending: Option<PendingRequest>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            next_transaction_id: 1,
            pending: None,
        }
    }

    /// Next transaction id, wrapping naturally at 0xFFFF
    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Build a complete request frame and record it as the outstanding
    /// exchange
    pub fn build_request(&mut self, unit_id: u8, pdu: &Pdu) -> Vec<u8> {
        let transaction_id = self.next_transaction_id();
        let function_code = pdu.function_code().unwrap_or(0);
        let length = (pdu.len() + 1) as u16;

        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes());
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(pdu.as_slice());

        self.pending = Some(PendingRequest {
            transaction_id,
            unit_id,
            function_code,
        });

        debug!(
            "built frame: tid={:04X} unit={} fc={:02X} pdu_len={}",
            transaction_id,
            unit_id,
            function_code,
            pdu.len()
        );

        frame
    }

    /// Parse a response frame, validating it against the outstanding request
    pub fn parse_response(&mut self, data: &[u8]) -> Result<Pdu> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| LinkError::protocol("response received with no request outstanding"))?;

        if data.len() < MBAP_HEADER_LEN + 2 {
            return Err(LinkError::protocol(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        let transaction_id = u16::from_be_bytes([data[0], data[1]]);
        let protocol_id = u16::from_be_bytes([data[2], data[3]]);
        let length = u16::from_be_bytes([data[4], data[5]]) as usize;
        let unit_id = data[6];

        if protocol_id != 0 {
            return Err(LinkError::protocol(format!(
                "invalid protocol id {protocol_id}"
            )));
        }
        // The length field counts the unit id plus the PDU; six fixed
        // bytes precede it on the wire.
        if data.len() != 6 + length {
            return Err(LinkError::protocol(format!(
                "frame length mismatch: header says {}, got {}",
                6 + length,
                data.len()
            )));
        }
        if transaction_id != pending.transaction_id {
            return Err(LinkError::protocol(format!(
                "transaction id mismatch: expected {:04X}, got {:04X}",
                pending.transaction_id, transaction_id
            )));
        }
        if unit_id != pending.unit_id {
            return Err(LinkError::protocol(format!(
                "unit id mismatch: expected {}, got {}",
                pending.unit_id, unit_id
            )));
        }

        let pdu = Pdu::from_slice(&data[MBAP_HEADER_LEN..])?;
        let response_fc = pdu.function_code().map(|fc| fc & 0x7F).unwrap_or(0);
        if response_fc != pending.function_code {
            return Err(LinkError::protocol(format!(
                "function code mismatch: expected {:02X}, got {:02X}",
                pending.function_code, response_fc
            )));
        }

        Ok(pdu)
    }

    /// Drop any outstanding exchange (after a timeout or reconnect)
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::FC_READ_HOLDING;

    #[test]
    fn build_parse_round_trip() {
        let mut codec = FrameCodec::new();
        let request = Pdu::read_request(FC_READ_HOLDING, 1, 2).unwrap();
        let frame = codec.build_request(9, &request);
        assert_eq!(frame.len(), MBAP_HEADER_LEN + 5);
        assert_eq!(frame[6], 9);

        // Echo the frame back as if it were the response.
        let parsed = codec.parse_response(&frame).unwrap();
        assert_eq!(parsed.as_slice(), request.as_slice());
    }

    #[test]
    fn rejects_unknown_transaction_id() {
        let mut codec = FrameCodec::new();
        let request = Pdu::read_request(FC_READ_HOLDING, 0, 1).unwrap();
        let mut frame = codec.build_request(1, &request);
        frame[1] ^= 0xFF;

        let err = codec.parse_response(&frame).unwrap_err();
        assert!(err.to_string().contains("transaction id mismatch"));
    }

    #[test]
    fn rejects_wrong_unit_id() {
        let mut codec = FrameCodec::new();
        let request = Pdu::read_request(FC_READ_HOLDING, 0, 1).unwrap();
        let mut frame = codec.build_request(1, &request);
        frame[6] = 2;

        let err = codec.parse_response(&frame).unwrap_err();
        assert!(err.to_string().contains("unit id mismatch"));
    }

    #[test]
    fn rejects_short_frame() {
        let mut codec = FrameCodec::new();
        let request = Pdu::read_request(FC_READ_HOLDING, 0, 1).unwrap();
        let _ = codec.build_request(1, &request);

        let err = codec.parse_response(&[0x00, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn rejects_invalid_protocol_id() {
        let mut codec = FrameCodec::new();
        let request = Pdu::read_request(FC_READ_HOLDING, 0, 1).unwrap();
        let mut frame = codec.build_request(1, &request);
        frame[3] = 0x01;

        let err = codec.parse_response(&frame).unwrap_err();
        assert!(err.to_string().contains("protocol id"));
    }

    #[test]
    fn response_without_request_rejected() {
        let mut codec = FrameCodec::new();
        let err = codec
            .parse_response(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x03, 0x00])
            .unwrap_err();
        assert!(err.to_string().contains("no request outstanding"));
    }

    #[test]
    fn transaction_id_wraps() {
        let mut codec = FrameCodec::new();
        codec.next_transaction_id = 0xFFFF;
        let request = Pdu::read_request(FC_READ_HOLDING, 0, 1).unwrap();

        let frame = codec.build_request(1, &request);
        assert_eq!(u16::from_be_bytes([frame[0], frame[1]]), 0xFFFF);
        codec.reset();

        let frame = codec.build_request(1, &request);
        assert_eq!(u16::from_be_bytes([frame[0], frame[1]]), 0x0000);
    }
}
