//! Long-running control and telemetry gateway for a fleet of industrial
//! variable frequency drives reachable over Modbus/TCP.
//!
//! One persistent session per drive, continuous polling into a
//! process-wide cache, command dispatch translated into register writes
//! per drive family, and durable side state (disabled drives, control
//! events, curtailment snapshot). The HTTP/WebSocket surface is a thin
//! adapter elsewhere; this crate exposes the cache, dispatcher and query
//! interfaces it consumes.

pub mod api;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod persist;
pub mod poller;
pub mod profile;
pub mod session;
pub mod status;
pub mod supervisor;

pub use error::{GatewayError, Result};
pub use gateway::Gateway;
