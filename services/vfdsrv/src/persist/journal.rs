//! Bounded, append-only log of control events.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::write_json_atomic;

/// Only the most recent events are retained
pub const JOURNAL_RETENTION: usize = 100;

/// Per-drive outcome inside a control event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveEventInfo {
    pub ip: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// One journaled control request, aggregating every target drive's result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub speed: f64,
    pub drives: Vec<DriveEventInfo>,
}

impl ControlEvent {
    pub fn new(action: impl Into<String>, speed: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            speed,
            drives: Vec::new(),
        }
    }

    pub fn record(&mut self, ip: impl Into<String>, outcome: std::result::Result<(), String>) {
        self.drives.push(match outcome {
            Ok(()) => DriveEventInfo {
                ip: ip.into(),
                success: true,
                error: None,
            },
            Err(error) => DriveEventInfo {
                ip: ip.into(),
                success: false,
                error: Some(error),
            },
        });
    }

    pub fn all_succeeded(&self) -> bool {
        self.drives.iter().all(|d| d.success)
    }
}

/// The journal, mirrored to disk on every append
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    events: Mutex<Vec<ControlEvent>>,
}

impl EventJournal {
    /// Load the journal; a missing or malformed file starts empty
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let events = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<Vec<ControlEvent>>(&data) {
                Ok(mut events) => {
                    if events.len() > JOURNAL_RETENTION {
                        let excess = events.len() - JOURNAL_RETENTION;
                        events.drain(..excess);
                    }
                    events
                }
                Err(e) => {
                    warn!("control event journal {} is malformed, starting empty: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => {
                debug!("no control event journal at {}", path.display());
                Vec::new()
            }
        };
        Self {
            path,
            events: Mutex::new(events),
        }
    }

    /// Events in insertion order
    pub fn events(&self) -> Vec<ControlEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Append, trim to retention, and flush the whole journal to disk
    pub async fn append(&self, event: ControlEvent) {
        let snapshot = {
            let mut events = self.events.lock();
            events.push(event);
            if events.len() > JOURNAL_RETENTION {
                let excess = events.len() - JOURNAL_RETENTION;
                events.drain(..excess);
            }
            events.clone()
        };

        if let Err(e) = write_json_atomic(&self.path, &snapshot).await {
            warn!("failed to persist control events to {}: {}", self.path.display(), e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
