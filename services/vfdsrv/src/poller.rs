//! Polling engine: one coherent telemetry cycle per second.
//!
//! Each cycle snapshots the cache into a working copy, overwrites entries
//! for disabled and unreachable drives, fans the rest out to a bounded
//! pool of poll transactions, and publishes the whole working copy at
//! once. Readers never see a partially updated cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::warn;

use crate::cache::{DriveTelemetry, TelemetryCache};
use crate::config::DriveConfig;
use crate::error::Result;
use crate::persist::DisabledDrives;
use crate::profile::{apply_calc, decode_status, DriveProfile, DriveStatus, ProfileCatalog};
use crate::session::{DriveSession, SessionMap};
use crate::status::SystemStatus;

/// Cycle cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Deadline for one drive's whole poll transaction
pub const POLL_DEADLINE: Duration = Duration::from_millis(1500);
/// Poll transactions in flight at once
pub const POLL_CONCURRENCY: usize = 10;

/// The periodic reader feeding the telemetry cache
pub struct PollEngine {
    drives: Vec<DriveConfig>,
    profiles: Arc<ProfileCatalog>,
    sessions: SessionMap,
    disabled: Arc<DisabledDrives>,
    cache: Arc<TelemetryCache>,
    status: Arc<SystemStatus>,
}

impl PollEngine {
    pub fn new(
        drives: Vec<DriveConfig>,
        profiles: Arc<ProfileCatalog>,
        sessions: SessionMap,
        disabled: Arc<DisabledDrives>,
        cache: Arc<TelemetryCache>,
        status: Arc<SystemStatus>,
    ) -> Self {
        Self {
            drives,
            profiles,
            sessions,
            disabled,
            cache,
            status,
        }
    }

    /// Poll on the interval and whenever `trigger` fires (commands request
    /// an immediate cycle so their effect lands in the cache quickly)
    pub async fn run(self: Arc<Self>, trigger: Arc<Notify>) {
        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = trigger.notified() => {}
            }
            self.poll_cycle().await;
        }
    }

    /// One full cycle over every configured drive
    pub async fn poll_cycle(&self) {
        let mut working = self.cache.snapshot();
        let index: HashMap<String, usize> = working
            .iter()
            .enumerate()
            .map(|(i, record)| (record.ip.clone(), i))
            .collect();

        let semaphore = Arc::new(Semaphore::new(POLL_CONCURRENCY));
        let mut transactions: JoinSet<(String, Option<TelemetryReading>)> = JoinSet::new();

        for drive in &self.drives {
            let Some(&idx) = index.get(&drive.ip) else {
                continue;
            };

            if self.disabled.contains(&drive.ip) {
                working[idx].mark_offline(DriveStatus::Disabled);
                continue;
            }
            let Some(session) = self.sessions.healthy(&drive.ip).await else {
                working[idx].mark_offline(DriveStatus::Unavailable);
                continue;
            };
            let Some(profile) = self.profiles.get(&drive.drive_family).cloned() else {
                warn!("drive {} has unknown family {}", drive.ip, drive.drive_family);
                working[idx].mark_offline(DriveStatus::Unavailable);
                continue;
            };

            let drive = drive.clone();
            let semaphore = semaphore.clone();
            transactions.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let reading = match timeout(POLL_DEADLINE, poll_drive(&session, &profile, &drive)).await {
                    Ok(Ok(reading)) => Some(reading),
                    Ok(Err(e)) => {
                        warn!("drive {} polling failed: {}", drive.ip, e);
                        None
                    }
                    Err(_) => {
                        session.mark_unhealthy();
                        warn!("drive {} poll transaction exceeded deadline", drive.ip);
                        None
                    }
                };
                (drive.ip, reading)
            });
        }

        while let Some(joined) = transactions.join_next().await {
            let Ok((ip, reading)) = joined else { continue };
            // A failed transaction leaves the previous record lingering for
            // this cycle; the supervisor observes the unhealthy session.
            if let (Some(&idx), Some(reading)) = (index.get(&ip), reading) {
                reading.apply_to(&mut working[idx]);
            }
        }

        self.cache.replace(working);
        self.status.stamp_update();
    }
}

/// Values derived from one successful poll transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub set_speed: f64,
    pub actual_speed: f64,
    pub actual_percent: f64,
    pub rpm: i64,
    pub cfm: i64,
    pub current: f64,
    pub clockwise: bool,
    pub status: DriveStatus,
}

impl TelemetryReading {
    fn apply_to(&self, record: &mut DriveTelemetry) {
        record.set_speed = self.set_speed;
        record.actual_speed = self.actual_speed;
        record.actual_percent = self.actual_percent;
        record.rpm_speed = self.rpm;
        record.actual_cfm = self.cfm;
        record.current = self.current;
        record.clockwise = self.clockwise;
        record.status = self.status;
        record.last_updated = Utc::now().timestamp();
    }
}

/// The four or five serial reads of one poll transaction, all under the
/// session mutex
async fn poll_drive(
    session: &DriveSession,
    profile: &DriveProfile,
    drive: &DriveConfig,
) -> Result<TelemetryReading> {
    let mut link = session.lock().await;

    let status_raw = link.read_register(profile.status).await?;
    let enabled_raw = if profile.enabled_status > 0 {
        link.read_register(profile.enabled_status).await?
    } else {
        0
    };
    let set_speed_raw = link.read_register(profile.setpoint[0]).await?;
    let output_freq_raw: f64 = if profile.signed_output_freq {
        f64::from(link.read_signed_register(profile.output_frequency).await?)
    } else {
        f64::from(link.read_register(profile.output_frequency).await?)
    };
    let current_raw = link.read_register(profile.output_current).await?;
    drop(link);

    Ok(derive_reading(
        status_raw,
        enabled_raw,
        set_speed_raw,
        output_freq_raw,
        current_raw,
        profile,
        drive,
    ))
}

/// Derivation of the cached fields from raw register words
fn derive_reading(
    status_raw: u16,
    enabled_raw: u16,
    set_speed_raw: u16,
    output_freq_raw: f64,
    current_raw: u16,
    profile: &DriveProfile,
    drive: &DriveConfig,
) -> TelemetryReading {
    // Negative output frequency means reverse rotation; calculations use
    // the magnitude.
    let clockwise = output_freq_raw >= 0.0;
    let freq_magnitude = output_freq_raw.abs();

    // The commanded setpoint is decoded with the output calc; every
    // supported family ships symmetric scalings.
    let set_speed = apply_calc(f64::from(set_speed_raw), &profile.out_freq_calc);
    let actual_speed = apply_calc(freq_magnitude, &profile.out_freq_calc);
    let current = apply_calc(f64::from(current_raw), &profile.out_current_calc);

    let rpm = (actual_speed * drive.rpm_per_hz).round() as i64;
    let cfm = (rpm as f64 * drive.cfm_per_rpm).round() as i64;

    TelemetryReading {
        set_speed: round1(set_speed),
        actual_speed: round1(actual_speed),
        actual_percent: round1(actual_speed / 0.6),
        rpm,
        cfm,
        current: round1(current),
        clockwise,
        status: decode_status(status_raw, enabled_raw, profile),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_with_bits;

    fn drive() -> DriveConfig {
        DriveConfig {
            ip: "10.0.0.1".to_string(),
            port: 502,
            unit: 1,
            default_speed: 0,
            group: "East".to_string(),
            fan_number: 1,
            fan_desc: String::new(),
            rpm_per_hz: 29.0,
            cfm_per_rpm: 10.0,
            drive_family: "OptidriveP2".to_string(),
        }
    }

    #[test]
    fn derives_scaled_speeds_and_flow() {
        let mut profile = profile_with_bits(&[("Enabled", 0), ("Tripped", 1)]);
        profile.out_freq_calc = "/ 10".to_string();
        profile.out_current_calc = "/ 10".to_string();

        let reading = derive_reading(0b0001, 0, 450, 432.0, 87, &profile, &drive());
        assert_eq!(reading.set_speed, 45.0);
        assert_eq!(reading.actual_speed, 43.2);
        assert_eq!(reading.actual_percent, 72.0);
        assert_eq!(reading.rpm, 1253); // 43.2 * 29.0 = 1252.8
        assert_eq!(reading.cfm, 12530);
        assert_eq!(reading.current, 8.7);
        assert!(reading.clockwise);
        assert_eq!(reading.status, DriveStatus::Running);
    }

    #[test]
    fn negative_frequency_is_reverse_rotation() {
        let profile = profile_with_bits(&[("Enabled", 0)]);
        let reading = derive_reading(1, 0, 0, -123.0, 0, &profile, &drive());
        assert!(!reading.clockwise);
        assert_eq!(reading.actual_speed, 12.3);
    }

    #[test]
    fn most_negative_word_keeps_magnitude() {
        // 0x8000 read as i16 is -32768: magnitude survives, direction flips.
        let profile = profile_with_bits(&[("Enabled", 0)]);
        let raw = f64::from(0x8000u16 as i16);
        let reading = derive_reading(1, 0, 0, raw, 0, &profile, &drive());
        assert!(!reading.clockwise);
        assert_eq!(reading.actual_speed, 3276.8);
    }

    #[tokio::test]
    async fn cycle_marks_disabled_and_unavailable() {
        let dir = tempfile::tempdir().unwrap();

        let mut off = drive();
        off.ip = "10.0.0.2".to_string();
        let drives = vec![drive(), off];

        let cache = Arc::new(TelemetryCache::new(&drives));
        let sessions = SessionMap::new();
        let disabled = Arc::new(DisabledDrives::load(dir.path().join("disabled.json")).await);
        disabled.insert("10.0.0.2");
        let status = Arc::new(SystemStatus::new(2, sessions.clone(), cache.clone()));

        let engine = PollEngine::new(
            drives,
            Arc::new(ProfileCatalog::new(HashMap::new())),
            sessions,
            disabled,
            cache.clone(),
            status,
        );
        engine.poll_cycle().await;

        // No sessions exist: the enabled drive reads Unavailable, the
        // disabled one Disabled, and both are zeroed.
        assert_eq!(cache.status_of("10.0.0.1"), Some(DriveStatus::Unavailable));
        assert_eq!(cache.status_of("10.0.0.2"), Some(DriveStatus::Disabled));
        assert!(cache.snapshot().iter().all(|r| r.actual_speed == 0.0));
    }
}
