//! Shared fixtures for the gateway integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use drivelink::pdu::FC_READ_HOLDING;
use drivelink::MockTransport;
use tempfile::TempDir;
use tokio::sync::Notify;

use vfdsrv::cache::TelemetryCache;
use vfdsrv::config::{DriveConfig, SiteConfig, StatePaths};
use vfdsrv::dispatcher::CommandDispatcher;
use vfdsrv::persist::{CurtailmentStore, DisabledDrives, EventJournal};
use vfdsrv::profile::{DriveProfile, DriveStatus, ProfileCatalog, RegisterSpace};
use vfdsrv::session::{DriveSession, SessionMap};
use vfdsrv::supervisor::SupervisorSet;

pub fn drive(ip: &str, group: &str, family: &str) -> DriveConfig {
    DriveConfig {
        ip: ip.to_string(),
        port: 502,
        unit: 1,
        default_speed: 0,
        group: group.to_string(),
        fan_number: 1,
        fan_desc: String::new(),
        rpm_per_hz: 29.0,
        cfm_per_rpm: 10.0,
        drive_family: family.to_string(),
    }
}

pub fn site(drives: Vec<DriveConfig>) -> SiteConfig {
    SiteConfig {
        site_name: "TestSite".to_string(),
        bind_ip: "0.0.0.0".to_string(),
        bind_port: "8080".to_string(),
        no_fanhold: false,
        group_label: "Pod".to_string(),
        drives,
    }
}

/// A single-setpoint profile in the Optidrive shape: control register 0,
/// setpoint 1, untrip 5
pub fn single_setpoint_profile() -> DriveProfile {
    serde_json::from_value(serde_json::json!({
        "Setpoint": [1],
        "Control": 0,
        "OutputFrequency": 2,
        "OutputCurrent": 3,
        "Status": 4,
        "StatusBits": {"Enabled": 0, "Tripped": 1, "Inhibited": 3},
        "StartValue": 1,
        "StopValue": 0,
        "UnTripRegister": 5,
        "UnTripValue": 1,
        "SetFreqCalc": "* 10",
        "OutFreqCalc": "/ 10"
    }))
    .expect("profile json")
}

/// A two-setpoint profile with a preset multiplier of 6
pub fn two_setpoint_profile() -> DriveProfile {
    serde_json::from_value(serde_json::json!({
        "Setpoint": [1, 207],
        "Control": 0,
        "SpeedPresetMultiplier": 6,
        "OutputFrequency": 2,
        "OutputCurrent": 3,
        "Status": 4,
        "StatusBits": {"Enabled": 0, "Tripped": 1},
        "StartValue": 1,
        "StopValue": 0,
        "SetFreqCalc": "* 10",
        "OutFreqCalc": "/ 10"
    }))
    .expect("profile json")
}

pub struct Fixture {
    pub dispatcher: CommandDispatcher,
    pub cache: Arc<TelemetryCache>,
    pub sessions: SessionMap,
    pub journal: Arc<EventJournal>,
    pub disabled: Arc<DisabledDrives>,
    pub curtailment: Arc<CurtailmentStore>,
    pub site: SiteConfig,
    pub dir: TempDir,
}

impl Fixture {
    pub async fn new(site_config: SiteConfig, profiles: HashMap<String, DriveProfile>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::in_dir(dir.path());

        let cache = Arc::new(TelemetryCache::new(&site_config.drives));
        let sessions = SessionMap::new();
        let journal = Arc::new(EventJournal::load(paths.journal).await);
        let disabled = Arc::new(DisabledDrives::load(paths.disabled).await);
        let curtailment = Arc::new(CurtailmentStore::load(paths.curtailment).await);

        let dispatcher = CommandDispatcher::new(
            &site_config,
            Arc::new(ProfileCatalog::new(profiles)),
            sessions.clone(),
            cache.clone(),
            journal.clone(),
            disabled.clone(),
            curtailment.clone(),
            SupervisorSet::new(),
            Arc::new(Notify::new()),
        );

        Self {
            dispatcher,
            cache,
            sessions,
            journal,
            disabled,
            curtailment,
            site: site_config,
            dir,
        }
    }

    /// Attach a mock-backed session for `ip` and return the scripting
    /// handle
    pub async fn attach_session(&self, ip: &str) -> MockTransport {
        let config = self
            .site
            .drive(ip)
            .expect("drive in site config")
            .clone();
        let mock = MockTransport::new();
        mock.push_registers(FC_READ_HOLDING, &[0]); // connect probe
        let session =
            DriveSession::establish(Box::new(mock.clone()), &config, RegisterSpace::Holding)
                .await
                .expect("mock session");
        self.sessions.insert(session).await;
        mock
    }

    /// Overwrite one drive's cached status and set-speed
    pub fn seed_cache(&self, ip: &str, status: DriveStatus, set_speed: f64) {
        let mut working = self.cache.snapshot();
        for record in working.iter_mut() {
            if record.ip == ip {
                record.status = status;
                record.set_speed = set_speed;
            }
        }
        self.cache.replace(working);
    }

    pub fn state_paths(&self) -> StatePaths {
        StatePaths::in_dir(self.dir.path())
    }
}

/// Only the write traffic, as (register, value) pairs
pub fn writes(mock: &MockTransport) -> Vec<(u16, u16)> {
    mock.sent_requests()
        .into_iter()
        .filter(|(fc, _, _)| *fc == drivelink::pdu::FC_WRITE_SINGLE)
        .map(|(_, address, value)| (address, value))
        .collect()
}
