//! Modbus PDU construction and inspection.
//!
//! PDUs are held in a fixed-size stack buffer; the fleet only ever issues
//! single-register writes and short register reads, so nothing here
//! allocates.

use crate::error::{LinkError, Result};

/// Maximum PDU size allowed by the Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Read holding registers
pub const FC_READ_HOLDING: u8 = 0x03;
/// Read input registers
pub const FC_READ_INPUT: u8 = 0x04;
/// Write single register
pub const FC_WRITE_SINGLE: u8 = 0x06;

/// A Modbus protocol data unit backed by a fixed stack buffer
#[derive(Debug, Clone)]
pub struct Pdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl Pdu {
    /// Create an empty PDU
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from received bytes
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(LinkError::protocol(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    /// Build a read request for FC 03 (holding) or FC 04 (input)
    pub fn read_request(function: u8, address: u16, quantity: u16) -> Result<Self> {
        if function != FC_READ_HOLDING && function != FC_READ_INPUT {
            return Err(LinkError::invalid_request(format!(
                "unsupported read function {function:#04x}"
            )));
        }
        if quantity == 0 || quantity > 125 {
            return Err(LinkError::invalid_request(format!(
                "invalid read quantity {quantity}"
            )));
        }
        let mut pdu = Self::new();
        pdu.push(function)?;
        pdu.push_u16(address)?;
        pdu.push_u16(quantity)?;
        Ok(pdu)
    }

    /// Build a write request for FC 06
    pub fn write_single_request(address: u16, value: u16) -> Result<Self> {
        let mut pdu = Self::new();
        pdu.push(FC_WRITE_SINGLE)?;
        pdu.push_u16(address)?;
        pdu.push_u16(value)?;
        Ok(pdu)
    }

    /// Append a single byte
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(LinkError::protocol("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a u16 in big-endian order
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)
    }

    /// The PDU bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Function code (first byte)
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Whether the exception bit is set on the function code
    pub fn is_exception(&self) -> bool {
        self.function_code().map(|fc| fc & 0x80 != 0).unwrap_or(false)
    }

    /// Exception code for an exception response
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Big-endian u16 at the given byte offset
    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        if offset + 2 > self.len {
            return Err(LinkError::protocol(format!(
                "PDU truncated: no u16 at offset {offset}"
            )));
        }
        Ok(u16::from_be_bytes([self.data[offset], self.data[offset + 1]]))
    }

    /// Human-readable description for a Modbus exception code
    pub fn exception_description(code: u8) -> &'static str {
        match code {
            0x01 => "Illegal Function",
            0x02 => "Illegal Data Address",
            0x03 => "Illegal Data Value",
            0x04 => "Slave Device Failure",
            0x05 => "Acknowledge",
            0x06 => "Slave Device Busy",
            0x07 => "Negative Acknowledge",
            0x08 => "Memory Parity Error",
            0x0A => "Gateway Path Unavailable",
            0x0B => "Gateway Target Device Failed to Respond",
            _ => "Unknown Exception",
        }
    }
}

impl Default for Pdu {
    fn default() -> Self {
        Self::new()
    }
}
