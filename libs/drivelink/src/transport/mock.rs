//! Scripted transport for protocol-level tests.
//!
//! Responses are queued as bare PDUs; the mock frames each one with the
//! transaction and unit id of the request it answers, so tests never have
//! to predict transaction counters. Single-register writes are
//! acknowledged automatically when no response is queued, since a correct
//! FC 06 acknowledgement is a byte-for-byte echo of the request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{LinkError, Result};
use crate::frame::MBAP_HEADER_LEN;
use crate::pdu::FC_WRITE_SINGLE;
use crate::transport::Transport;

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    fail_connect: bool,
    fail_next_exchange: bool,
    responses: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

/// Shared-handle mock transport
///
/// Clones share state: hand one clone to the client under test and keep
/// another to script responses and inspect traffic.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response PDU for the next unanswered request
    pub fn push_response(&self, pdu: &[u8]) {
        self.state.lock().responses.push_back(pdu.to_vec());
    }

    /// Queue a read-registers response carrying the given word values
    pub fn push_registers(&self, function: u8, registers: &[u16]) {
        let mut pdu = Vec::with_capacity(2 + registers.len() * 2);
        pdu.push(function);
        pdu.push((registers.len() * 2) as u8);
        for reg in registers {
            pdu.extend_from_slice(&reg.to_be_bytes());
        }
        self.push_response(&pdu);
    }

    /// All frames sent through this transport so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Decode the sent frames into (function, address, value/quantity)
    /// triples
    pub fn sent_requests(&self) -> Vec<(u8, u16, u16)> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|f| f.len() >= MBAP_HEADER_LEN + 5)
            .map(|f| {
                let p = &f[MBAP_HEADER_LEN..];
                (
                    p[0],
                    u16::from_be_bytes([p[1], p[2]]),
                    u16::from_be_bytes([p[3], p[4]]),
                )
            })
            .collect()
    }

    /// Make the next `connect` call fail
    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Make the next request/response exchange fail with an IO error
    pub fn fail_next_exchange(&self) {
        self.state.lock().fail_next_exchange = true;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(LinkError::connection("mock connection refused"));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.lock().connected = false;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        if state.fail_next_exchange {
            state.fail_next_exchange = false;
            return Err(LinkError::Io("mock send failure".to_string()));
        }
        state.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(LinkError::NotConnected);
        }

        let request = state
            .sent
            .last()
            .cloned()
            .ok_or_else(|| LinkError::protocol("receive before any request"))?;

        let pdu = match state.responses.pop_front() {
            Some(pdu) => pdu,
            None if request.get(MBAP_HEADER_LEN) == Some(&FC_WRITE_SINGLE) => {
                // Echo acknowledgement.
                request[MBAP_HEADER_LEN..].to_vec()
            }
            None => return Err(LinkError::timeout("mock has no response queued")),
        };

        let total = MBAP_HEADER_LEN + pdu.len();
        if buffer.len() < total {
            return Err(LinkError::protocol("buffer too small for mock frame"));
        }

        // MBAP header echoing the request identity.
        buffer[..2].copy_from_slice(&request[..2]);
        buffer[2..4].copy_from_slice(&[0, 0]);
        buffer[4..6].copy_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        buffer[6] = request[6];
        buffer[MBAP_HEADER_LEN..total].copy_from_slice(&pdu);

        Ok(total)
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}
