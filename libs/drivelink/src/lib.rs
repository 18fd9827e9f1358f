//! Modbus/TCP link layer for the VFD fleet gateway.
//!
//! Provides the wire-level building blocks the fleet engine drives: PDU
//! construction for the three function codes the drives speak (read holding
//! registers, read input registers, write single register), MBAP framing
//! with transaction tracking, a pluggable transport seam, and a
//! register-level client that performs one request/response exchange at a
//! time.

pub mod client;
pub mod error;
pub mod frame;
pub mod pdu;
pub mod transport;

pub use client::ModbusClient;
pub use error::{LinkError, Result};
pub use frame::FrameCodec;
pub use pdu::Pdu;
pub use transport::{MockTransport, TcpTransport, Transport};
