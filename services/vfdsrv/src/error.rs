//! Gateway error types.

use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the drive fleet engine
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration document problems; fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failures
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wire-level failures from the link layer
    #[error(transparent)]
    Link(#[from] drivelink::LinkError),

    /// Drive address not present in the site configuration
    #[error("Unknown drive: {0}")]
    UnknownDrive(String),

    /// Drive family missing from the profile catalogue
    #[error("No drive profile for {0}")]
    UnknownFamily(String),

    /// No healthy session for the drive
    #[error("No available connection for {0}")]
    NotConnected(String),

    /// Command blocked by the drive's cached status; the message is the
    /// status name
    #[error("{0}")]
    Precondition(String),

    /// Unrecognized control action name
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Curtail matched no configured drive
    #[error("No drives matched the requested groups")]
    NoMatchingDrives,

    /// Resume requested with no curtailment snapshot on disk
    #[error("No curtailment snapshot to resume from")]
    NoCurtailment,

    /// Metrics registry failures
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for GatewayError {
    fn from(err: prometheus::Error) -> Self {
        GatewayError::Metrics(err.to_string())
    }
}
