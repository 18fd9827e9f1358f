//! Modbus/TCP transport.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{LinkError, Result};
use crate::frame::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::transport::Transport;

/// TCP transport to a single drive
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            stream: None,
        }
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(LinkError::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        debug!("TCP connecting: {}", addr);

        match timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                debug!("TCP connected: {}", addr);
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(LinkError::connection(format!(
                "failed to connect to {addr}: {e}"
            ))),
            Err(_) => {
                warn!("TCP connect timeout: {}", addr);
                Err(LinkError::timeout(format!("connection to {addr} timed out")))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("TCP disconnected: {}:{}", self.host, self.port);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream
            .write_all(data)
            .await
            .map_err(|e| LinkError::Io(format!("TCP send error: {e}")))?;
        debug!("TCP TX: {}B", data.len());
        Ok(())
    }

    async fn receive(&mut self, buffer: &mut [u8], deadline: Duration) -> Result<usize> {
        let stream = self.stream_mut()?;

        // Read the MBAP header first, then exactly the number of bytes its
        // length field announces.
        let mut header = [0u8; MBAP_HEADER_LEN];
        match timeout(deadline, stream.read_exact(&mut header)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(LinkError::Io(format!("TCP header read error: {e}"))),
            Err(_) => return Err(LinkError::timeout("TCP header read timeout")),
        }

        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if length < 2 || length > MAX_MBAP_LENGTH {
            return Err(LinkError::protocol(format!(
                "invalid TCP frame length: {length}"
            )));
        }

        // The header prefix already consumed the unit id byte the length
        // field counts.
        let total = 6 + length;
        if buffer.len() < total {
            return Err(LinkError::protocol("buffer too small for complete frame"));
        }
        buffer[..MBAP_HEADER_LEN].copy_from_slice(&header);

        match timeout(deadline, stream.read_exact(&mut buffer[MBAP_HEADER_LEN..total])).await {
            Ok(Ok(_)) => {
                debug!("TCP RX: {}B", total);
                Ok(total)
            }
            Ok(Err(e)) => Err(LinkError::Io(format!("TCP body read error: {e}"))),
            Err(_) => Err(LinkError::timeout("TCP body read timeout")),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
