//! System-wide readiness and freshness.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::TelemetryCache;
use crate::session::SessionMap;

/// Initial connections are considered settled this long after startup,
/// whether or not every drive answered
pub const STARTUP_GRACE: Duration = Duration::from_secs(10);

/// Aggregated gateway state for the status query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub loading: bool,
    pub ready: bool,
    pub initial_connections_done: bool,
    pub drive_count: usize,
    pub connected_count: usize,
    pub healthy_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<f64>,
}

/// Derives readiness from the cache, session map and wall clock
#[derive(Debug)]
pub struct SystemStatus {
    started: Instant,
    drive_count: usize,
    sessions: SessionMap,
    cache: Arc<TelemetryCache>,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl SystemStatus {
    pub fn new(drive_count: usize, sessions: SessionMap, cache: Arc<TelemetryCache>) -> Self {
        Self {
            started: Instant::now(),
            drive_count,
            sessions,
            cache,
            last_update: RwLock::new(None),
        }
    }

    /// Called by the polling engine after each published cycle
    pub fn stamp_update(&self) {
        *self.last_update.write() = Some(Utc::now());
    }

    pub async fn report(&self) -> StatusReport {
        let initial_connections_done = self.started.elapsed() >= STARTUP_GRACE;
        let ready = initial_connections_done && !self.cache.is_empty();
        let last_update = *self.last_update.read();
        let age_seconds = last_update
            .map(|t| (Utc::now() - t).num_milliseconds().max(0) as f64 / 1000.0);

        StatusReport {
            loading: !ready,
            ready,
            initial_connections_done,
            drive_count: self.drive_count,
            connected_count: self.sessions.connected_count().await,
            healthy_count: self.sessions.healthy_count().await,
            last_update,
            age_seconds,
        }
    }
}
