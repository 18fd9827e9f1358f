//! The single curtailment snapshot used by resume.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::write_json_atomic;
use crate::profile::DriveStatus;

/// One drive's state captured at curtail time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurtailedDrive {
    pub ip: String,
    pub group: String,
    pub set_speed: f64,
    pub status: DriveStatus,
}

/// The pre-curtailment record; at most one exists on disk at any time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurtailmentSnapshot {
    pub timestamp: DateTime<Utc>,
    pub groups: Vec<String>,
    pub drives: Vec<CurtailedDrive>,
}

/// Holder for the snapshot, mirrored to a single file
#[derive(Debug)]
pub struct CurtailmentStore {
    path: PathBuf,
    current: Mutex<Option<CurtailmentSnapshot>>,
}

impl CurtailmentStore {
    /// Load any snapshot left over from a previous run
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<CurtailmentSnapshot>(&data) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("curtailment snapshot {} is malformed, ignoring: {}", path.display(), e);
                    None
                }
            },
            Err(_) => {
                debug!("no curtailment snapshot at {}", path.display());
                None
            }
        };
        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn current(&self) -> Option<CurtailmentSnapshot> {
        self.current.lock().clone()
    }

    /// Replace the snapshot and mirror it to disk
    pub async fn store(&self, snapshot: CurtailmentSnapshot) {
        *self.current.lock() = Some(snapshot.clone());
        if let Err(e) = write_json_atomic(&self.path, &snapshot).await {
            warn!("failed to persist curtailment snapshot to {}: {}", self.path.display(), e);
        }
    }

    /// Drop the snapshot and remove the file
    pub async fn clear(&self) {
        *self.current.lock() = None;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove curtailment snapshot {}: {}", self.path.display(), e);
            }
        }
    }
}
