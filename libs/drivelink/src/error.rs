//! Link layer error types.

use thiserror::Error;

/// Result type for drivelink operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors surfaced by the Modbus link layer
#[derive(Debug, Error, Clone)]
pub enum LinkError {
    /// Malformed or unexpected frame content
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection establishment failures
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted on a closed transport
    #[error("Not connected")]
    NotConnected,

    /// Socket-level failures
    #[error("IO error: {0}")]
    Io(String),

    /// A deadline elapsed before the exchange completed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The drive answered with a Modbus exception response
    #[error("Modbus exception {code:#04x} ({description}) for function {function:#04x}")]
    Exception {
        function: u8,
        code: u8,
        description: &'static str,
    },

    /// Invalid arguments or unsupported requests
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl LinkError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        LinkError::Protocol(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        LinkError::Connection(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        LinkError::Timeout(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        LinkError::InvalidRequest(msg.into())
    }
}
