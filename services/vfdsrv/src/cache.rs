//! Process-wide telemetry cache.
//!
//! Single writer (the polling engine), many readers. Readers always see a
//! complete cycle: the vector is swapped wholesale, never patched in
//! place.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::DriveConfig;
use crate::profile::DriveStatus;

/// One drive's cached state, replaced atomically as a whole record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveTelemetry {
    pub group: String,
    pub fan_number: u32,
    pub fan_desc: String,
    pub ip: String,
    pub rpm_to_hz: f64,
    pub cfm_rpm: f64,
    /// Commanded frequency, Hz
    pub set_speed: f64,
    /// Measured output frequency, Hz
    pub actual_speed: f64,
    /// Measured speed as a percentage of the 60 Hz nominal
    pub actual_percent: f64,
    pub rpm_speed: i64,
    pub actual_cfm: i64,
    /// Output current, A
    pub current: f64,
    pub clockwise: bool,
    pub status: DriveStatus,
    /// Unix seconds of the last successful update
    pub last_updated: i64,
}

impl DriveTelemetry {
    /// Initial record before the first poll completes
    pub fn waiting(config: &DriveConfig) -> Self {
        Self {
            group: config.group.clone(),
            fan_number: config.fan_number,
            fan_desc: config.fan_desc.clone(),
            ip: config.ip.clone(),
            rpm_to_hz: config.rpm_per_hz,
            cfm_rpm: config.cfm_per_rpm,
            set_speed: 0.0,
            actual_speed: 0.0,
            actual_percent: 0.0,
            rpm_speed: 0,
            actual_cfm: 0,
            current: 0.0,
            clockwise: true,
            status: DriveStatus::Waiting,
            last_updated: Utc::now().timestamp(),
        }
    }

    /// Overwrite with an offline status, zeroing every numeric field
    pub fn mark_offline(&mut self, status: DriveStatus) {
        self.set_speed = 0.0;
        self.actual_speed = 0.0;
        self.actual_percent = 0.0;
        self.rpm_speed = 0;
        self.actual_cfm = 0;
        self.current = 0.0;
        self.clockwise = true;
        self.status = status;
        self.last_updated = Utc::now().timestamp();
    }
}

/// The per-drive snapshot vector
#[derive(Debug)]
pub struct TelemetryCache {
    records: RwLock<Vec<DriveTelemetry>>,
}

impl TelemetryCache {
    /// Seed one record per configured drive, in configuration order
    pub fn new(drives: &[DriveConfig]) -> Self {
        Self {
            records: RwLock::new(drives.iter().map(DriveTelemetry::waiting).collect()),
        }
    }

    /// Immutable copy of the current cycle
    pub fn snapshot(&self) -> Vec<DriveTelemetry> {
        self.records.read().clone()
    }

    /// Swap in the next cycle; polling engine only
    pub fn replace(&self, records: Vec<DriveTelemetry>) {
        *self.records.write() = records;
    }

    pub fn status_of(&self, ip: &str) -> Option<DriveStatus> {
        self.records
            .read()
            .iter()
            .find(|r| r.ip == ip)
            .map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ip: &str) -> DriveConfig {
        DriveConfig {
            ip: ip.to_string(),
            port: 502,
            unit: 1,
            default_speed: 0,
            group: "East".to_string(),
            fan_number: 1,
            fan_desc: String::new(),
            rpm_per_hz: 29.5,
            cfm_per_rpm: 12.4,
            drive_family: "OptidriveP2".to_string(),
        }
    }

    #[test]
    fn one_record_per_drive() {
        let cache = TelemetryCache::new(&[config("10.0.0.1"), config("10.0.0.2")]);
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.status == DriveStatus::Waiting));
        assert_eq!(cache.status_of("10.0.0.2"), Some(DriveStatus::Waiting));
        assert_eq!(cache.status_of("10.0.0.9"), None);
    }

    #[test]
    fn replace_swaps_wholesale() {
        let cache = TelemetryCache::new(&[config("10.0.0.1")]);
        let mut working = cache.snapshot();
        working[0].actual_speed = 45.0;
        working[0].status = DriveStatus::Running;
        cache.replace(working);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot[0].actual_speed, 45.0);
        assert_eq!(snapshot[0].status, DriveStatus::Running);
    }

    #[test]
    fn mark_offline_zeroes_numerics() {
        let cache = TelemetryCache::new(&[config("10.0.0.1")]);
        let mut record = cache.snapshot().remove(0);
        record.actual_speed = 45.0;
        record.rpm_speed = 1300;
        record.clockwise = false;

        record.mark_offline(DriveStatus::Unavailable);
        assert_eq!(record.actual_speed, 0.0);
        assert_eq!(record.rpm_speed, 0);
        assert!(record.clockwise);
        assert_eq!(record.status, DriveStatus::Unavailable);
    }
}
