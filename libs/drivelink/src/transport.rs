//! Transport seam between the register client and the wire.
//!
//! The TCP implementation talks to real drives; the mock implementation
//! feeds scripted frames to protocol-level tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

mod mock;
mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

/// A bidirectional, frame-oriented byte channel to one drive
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Open the channel
    async fn connect(&mut self) -> Result<()>;

    /// Close the channel; subsequent operations fail with `NotConnected`
    async fn disconnect(&mut self) -> Result<()>;

    /// Send one complete request frame
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive one complete response frame into `buffer`, returning its
    /// length
    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Whether the channel is currently open
    fn is_connected(&self) -> bool;
}
