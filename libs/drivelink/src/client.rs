//! Register-level Modbus client.
//!
//! One client owns one transport; every call performs a full
//! request/response exchange before returning, so callers holding the
//! client behind a mutex get whole-exchange exclusion for free.

use std::time::Duration;

use tracing::debug;

use crate::error::{LinkError, Result};
use crate::frame::{FrameCodec, MAX_FRAME_SIZE};
use crate::pdu::{Pdu, FC_READ_HOLDING, FC_READ_INPUT};
use crate::transport::Transport;

/// Modbus client bound to a single drive
#[derive(Debug)]
pub struct ModbusClient {
    transport: Box<dyn Transport>,
    codec: FrameCodec,
    unit_id: u8,
    response_timeout: Duration,
}

impl ModbusClient {
    pub fn new(transport: Box<dyn Transport>, unit_id: u8, response_timeout: Duration) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(),
            unit_id,
            response_timeout,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.codec.reset();
        self.transport.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.codec.reset();
        self.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Read `quantity` holding registers starting at `address` (FC 03)
    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>> {
        let request = Pdu::read_request(FC_READ_HOLDING, address, quantity)?;
        let response = self.transact(request).await?;
        decode_registers(&response, FC_READ_HOLDING, quantity)
    }

    /// Read `quantity` input registers starting at `address` (FC 04)
    pub async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u16>> {
        let request = Pdu::read_request(FC_READ_INPUT, address, quantity)?;
        let response = self.transact(request).await?;
        decode_registers(&response, FC_READ_INPUT, quantity)
    }

    /// Write one register (FC 06); the drive must echo address and value
    pub async fn write_single_register(&mut self, address: u16, value: u16) -> Result<()> {
        let request = Pdu::write_single_request(address, value)?;
        let response = self.transact(request).await?;

        let echoed_address = response.u16_at(1)?;
        let echoed_value = response.u16_at(3)?;
        if echoed_address != address || echoed_value != value {
            return Err(LinkError::protocol(format!(
                "write echo mismatch: wrote {value} to {address}, drive echoed {echoed_value} at {echoed_address}"
            )));
        }
        Ok(())
    }

    /// One request/response exchange
    async fn transact(&mut self, request: Pdu) -> Result<Pdu> {
        let frame = self.codec.build_request(self.unit_id, &request);

        if let Err(e) = self.transport.send(&frame).await {
            self.codec.reset();
            return Err(e);
        }

        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = match self.transport.receive(&mut buffer, self.response_timeout).await {
            Ok(len) => len,
            Err(e) => {
                self.codec.reset();
                return Err(e);
            }
        };

        let response = self.codec.parse_response(&buffer[..len])?;
        if response.is_exception() {
            let function = response.function_code().unwrap_or(0) & 0x7F;
            let code = response.exception_code().unwrap_or(0);
            debug!("exception response: fc={:02X} code={:02X}", function, code);
            return Err(LinkError::Exception {
                function,
                code,
                description: Pdu::exception_description(code),
            });
        }
        Ok(response)
    }
}

/// Decode a read-registers response into word values
fn decode_registers(pdu: &Pdu, function: u8, quantity: u16) -> Result<Vec<u16>> {
    if pdu.function_code() != Some(function) {
        return Err(LinkError::protocol(format!(
            "unexpected function code {:?} in read response",
            pdu.function_code()
        )));
    }

    let data = pdu.as_slice();
    let byte_count = *data
        .get(1)
        .ok_or_else(|| LinkError::protocol("read response missing byte count"))?
        as usize;

    if byte_count != quantity as usize * 2 || data.len() < 2 + byte_count {
        return Err(LinkError::protocol(format!(
            "short read response: expected {} data bytes, got {}",
            quantity as usize * 2,
            data.len().saturating_sub(2)
        )));
    }

    Ok(data[2..2 + byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}
