//! Request and response types for the command API.
//!
//! The HTTP adapter deserializes requests into these shapes and hands
//! them to the [`Gateway`](crate::gateway::Gateway); responses serialize
//! straight back out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::DriveTelemetry;

/// Movement command against a set of drives
#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub drives: Vec<String>,
    pub action: String,
    #[serde(default)]
    pub speed: f64,
}

/// Curtail or resume request
#[derive(Debug, Clone, Deserialize)]
pub struct CurtailRequest {
    pub action: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Outcome of a curtail or resume
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurtailResponse {
    pub success: bool,
    pub message: String,
    pub drive_count: usize,
    pub groups: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Toggle one drive's enabled state
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    pub ip: String,
}

/// Bulk enable/disable; omitting `action` toggles each drive
#[derive(Debug, Clone, Deserialize)]
pub struct BulkConnectRequest {
    pub ips: Vec<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// A cache record enriched with the drive's family name for the devices
/// query
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    #[serde(rename = "DriveType")]
    pub drive_family: String,
    #[serde(flatten)]
    pub telemetry: DriveTelemetry,
}

/// Site identity summary for the UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigSummary {
    pub site_name: String,
    pub group_label: String,
    pub bind_ip: String,
    pub no_fanhold: bool,
}
