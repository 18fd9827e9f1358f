//! Command dispatch: control actions, curtailment, and the disabled set.
//!
//! Every request fans out to its target drives, one task each; per-drive
//! failures never abort the rest. One aggregated event is journaled per
//! request and an immediate poll is scheduled so the cache reflects the
//! command within the request's tail latency.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::api::CurtailResponse;
use crate::cache::TelemetryCache;
use crate::config::{DriveConfig, SiteConfig};
use crate::error::{GatewayError, Result};
use crate::persist::{
    ControlEvent, CurtailedDrive, CurtailmentSnapshot, CurtailmentStore, DisabledDrives,
    EventJournal,
};
use crate::profile::{apply_calc, DriveProfile, DriveStatus, ProfileCatalog, RegisterSpace};
use crate::session::SessionMap;
use crate::supervisor::{ConnectionSupervisor, SupervisorSet};

/// A validated movement action
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    Start,
    Stop,
    Fanhold,
    /// Alias of Stop kept for the operator vocabulary
    Freespin,
    SetSpeed(f64),
}

impl ControlAction {
    /// Validate an action name from a request; unknown names are rejected
    pub fn parse(name: &str, speed: f64) -> Result<Self> {
        match name {
            "Start" => Ok(ControlAction::Start),
            "Stop" => Ok(ControlAction::Stop),
            "Fanhold" => Ok(ControlAction::Fanhold),
            "Freespin" => Ok(ControlAction::Freespin),
            "SetSpeed" => Ok(ControlAction::SetSpeed(speed)),
            other => Err(GatewayError::InvalidAction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlAction::Start => "Start",
            ControlAction::Stop => "Stop",
            ControlAction::Fanhold => "Fanhold",
            ControlAction::Freespin => "Freespin",
            ControlAction::SetSpeed(_) => "SetSpeed",
        }
    }

    pub fn speed(&self) -> f64 {
        match self {
            ControlAction::SetSpeed(hz) => *hz,
            _ => 0.0,
        }
    }
}

/// Resolves drives to (session, profile) and issues the minimum write
/// sequence per action
#[derive(Clone)]
pub struct CommandDispatcher {
    drives: Arc<HashMap<String, DriveConfig>>,
    profiles: Arc<ProfileCatalog>,
    sessions: SessionMap,
    cache: Arc<TelemetryCache>,
    journal: Arc<EventJournal>,
    disabled: Arc<DisabledDrives>,
    curtailment: Arc<CurtailmentStore>,
    supervisors: SupervisorSet,
    poll_trigger: Arc<Notify>,
}

impl CommandDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site: &SiteConfig,
        profiles: Arc<ProfileCatalog>,
        sessions: SessionMap,
        cache: Arc<TelemetryCache>,
        journal: Arc<EventJournal>,
        disabled: Arc<DisabledDrives>,
        curtailment: Arc<CurtailmentStore>,
        supervisors: SupervisorSet,
        poll_trigger: Arc<Notify>,
    ) -> Self {
        let drives = site
            .drives
            .iter()
            .map(|d| (d.ip.clone(), d.clone()))
            .collect();
        Self {
            drives: Arc::new(drives),
            profiles,
            sessions,
            cache,
            journal,
            disabled,
            curtailment,
            supervisors,
            poll_trigger,
        }
    }

    /// Run a movement action against a set of drives, journaling one
    /// aggregated event
    pub async fn dispatch(&self, drives: &[String], action: ControlAction) -> Result<ControlEvent> {
        info!(
            "control action: action={} speed={:.2} drives={:?}",
            action.name(),
            action.speed(),
            drives
        );

        let mut event = ControlEvent::new(action.name(), action.speed());
        let results = self.fan_out(drives.to_vec(), action).await;
        for (ip, outcome) in results {
            event.record(ip, outcome);
        }

        self.journal.append(event.clone()).await;
        self.poll_trigger.notify_one();
        Ok(event)
    }

    /// One worker per target drive; results arrive in completion order
    async fn fan_out(
        &self,
        ips: Vec<String>,
        action: ControlAction,
    ) -> Vec<(String, std::result::Result<(), String>)> {
        let mut workers: JoinSet<(String, std::result::Result<(), String>)> = JoinSet::new();
        for ip in ips {
            let dispatcher = self.clone();
            workers.spawn(async move {
                let outcome = dispatcher
                    .execute_action(&ip, action)
                    .await
                    .map_err(|e| e.to_string());
                (ip, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }
        results
    }

    /// The per-drive write sequence; any error skips the remaining writes
    async fn execute_action(&self, ip: &str, action: ControlAction) -> Result<()> {
        let status = self
            .cache
            .status_of(ip)
            .ok_or_else(|| GatewayError::UnknownDrive(ip.to_string()))?;

        // Precondition: no I/O against drives the cache knows are
        // unreachable or not ready.
        if matches!(status, DriveStatus::Unavailable | DriveStatus::NotReady) {
            info!("control blocked: ip={} action={} state={}", ip, action.name(), status);
            return Err(GatewayError::Precondition(status.to_string()));
        }

        let session = self
            .sessions
            .healthy(ip)
            .await
            .ok_or_else(|| GatewayError::NotConnected(ip.to_string()))?;
        let profile = self.profile_for(ip)?;

        let mut link = session.lock().await;
        match action {
            ControlAction::Start => {
                if status == DriveStatus::Tripped {
                    link.write_register(profile.untrip_register, profile.untrip_value)
                        .await?;
                }
                link.write_register(profile.control, profile.start_value)
                    .await?;
            }
            ControlAction::Stop | ControlAction::Freespin => {
                link.write_register(profile.control, profile.stop_value)
                    .await?;
            }
            ControlAction::Fanhold => {
                link.write_register(profile.control, profile.start_value)
                    .await?;
                // A raw zero is correct for every calc form: zero is a
                // fixed point of the whole DSL.
                for &register in &profile.setpoint {
                    link.write_register(register, 0).await?;
                }
            }
            ControlAction::SetSpeed(hz) => {
                if status == DriveStatus::Tripped {
                    link.write_register(profile.untrip_register, profile.untrip_value)
                        .await?;
                }
                link.write_register(profile.control, profile.start_value)
                    .await?;

                let scaled = apply_calc(hz, &profile.set_freq_calc);
                if let Some(&first) = profile.setpoint.first() {
                    link.write_register(first, scaled as u16).await?;
                }
                if let Some(&second) = profile.setpoint.get(1) {
                    let preset = scaled * f64::from(profile.speed_preset_multiplier);
                    link.write_register(second, preset as u16).await?;
                }
            }
        }
        Ok(())
    }

    fn profile_for(&self, ip: &str) -> Result<DriveProfile> {
        let config = self
            .drives
            .get(ip)
            .ok_or_else(|| GatewayError::UnknownDrive(ip.to_string()))?;
        self.profiles
            .get(&config.drive_family)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownFamily(ip.to_string()))
    }

    /// Stop every running drive in the listed groups, memoizing set-speeds
    /// for resume. An empty group list selects the whole fleet.
    pub async fn curtail(&self, groups: &[String]) -> Result<CurtailResponse> {
        let selected: Vec<&DriveConfig> = self
            .drives
            .values()
            .filter(|d| groups.is_empty() || groups.contains(&d.group))
            .collect();
        if selected.is_empty() {
            return Err(GatewayError::NoMatchingDrives);
        }

        // Capture before stopping; resume depends on this record.
        let records: HashMap<String, _> = self
            .cache
            .snapshot()
            .into_iter()
            .map(|r| (r.ip.clone(), r))
            .collect();
        let captured: Vec<CurtailedDrive> = selected
            .iter()
            .map(|d| {
                let record = records.get(&d.ip);
                CurtailedDrive {
                    ip: d.ip.clone(),
                    group: d.group.clone(),
                    set_speed: record.map(|r| r.set_speed).unwrap_or(0.0),
                    status: record.map(|r| r.status).unwrap_or(DriveStatus::Unknown),
                }
            })
            .collect();

        let snapshot = CurtailmentSnapshot {
            timestamp: Utc::now(),
            groups: groups.to_vec(),
            drives: captured.clone(),
        };
        self.curtailment.store(snapshot).await;

        // Only running drives receive a stop; stopped and faulted drives
        // are recorded in the snapshot but left alone.
        let targets: Vec<String> = captured
            .iter()
            .filter(|d| d.status == DriveStatus::Running)
            .map(|d| d.ip.clone())
            .collect();

        info!("curtailing {} of {} selected drives", targets.len(), captured.len());

        let mut event = ControlEvent::new("Curtail", 0.0);
        for (ip, outcome) in self.fan_out(targets.clone(), ControlAction::Stop).await {
            event.record(ip, outcome);
        }
        let success = event.all_succeeded();
        self.journal.append(event).await;
        self.poll_trigger.notify_one();

        Ok(CurtailResponse {
            success,
            message: format!("Curtailed {} drives", targets.len()),
            drive_count: targets.len(),
            groups: groups.to_vec(),
            timestamp: Utc::now(),
        })
    }

    /// Restore every drive the snapshot captured as running to its
    /// pre-curtailment set-speed; drives captured stopped stay stopped
    pub async fn resume(&self) -> Result<CurtailResponse> {
        let snapshot = self.curtailment.current().ok_or(GatewayError::NoCurtailment)?;

        let targets: Vec<&CurtailedDrive> = snapshot
            .drives
            .iter()
            .filter(|d| d.status == DriveStatus::Running)
            .collect();

        info!("resuming {} drives from curtailment", targets.len());

        let mut workers: JoinSet<(String, std::result::Result<(), String>)> = JoinSet::new();
        for drive in &targets {
            let dispatcher = self.clone();
            let ip = drive.ip.clone();
            let speed = drive.set_speed;
            workers.spawn(async move {
                let outcome = dispatcher
                    .execute_action(&ip, ControlAction::SetSpeed(speed))
                    .await
                    .map_err(|e| e.to_string());
                (ip, outcome)
            });
        }

        let mut event = ControlEvent::new("Resume", 0.0);
        while let Some(joined) = workers.join_next().await {
            if let Ok((ip, outcome)) = joined {
                event.record(ip, outcome);
            }
        }

        let success = event.all_succeeded();
        let drive_count = targets.len();
        self.journal.append(event).await;
        self.poll_trigger.notify_one();

        if success {
            self.curtailment.clear().await;
        } else {
            warn!("resume left the curtailment snapshot in place after failures");
        }

        Ok(CurtailResponse {
            success,
            message: format!("Resumed {drive_count} drives"),
            drive_count,
            groups: snapshot.groups,
            timestamp: Utc::now(),
        })
    }

    /// Enable or disable a set of drives, persisting the set and
    /// journaling one aggregated event
    pub async fn set_enabled(&self, ips: &[String], enable: bool) -> Result<ControlEvent> {
        let action = if enable { "ConnectVFD" } else { "DisconnectVFD" };
        let mut event = ControlEvent::new(action, 0.0);

        for ip in ips {
            let Some(config) = self.drives.get(ip).cloned() else {
                event.record(ip.clone(), Err(GatewayError::UnknownDrive(ip.clone()).to_string()));
                continue;
            };

            if enable {
                self.disabled.remove(ip);
                // The supervisor for a re-enabled drive may have been
                // started at boot and is still looping; only spawn when
                // none is running.
                let register_space = self
                    .profiles
                    .get(&config.drive_family)
                    .map(|p| p.register_space)
                    .unwrap_or(RegisterSpace::Holding);
                let supervisor = ConnectionSupervisor::new(
                    config,
                    register_space,
                    self.sessions.clone(),
                    self.disabled.clone(),
                );
                self.supervisors.spawn_if_idle(supervisor);
            } else {
                self.disabled.insert(ip);
            }
            info!("control action: action={} drive={}", action, ip);
            event.record(ip.clone(), Ok(()));
        }

        self.disabled.persist().await;
        self.poll_trigger.notify_one();
        self.journal.append(event.clone()).await;
        Ok(event)
    }

    /// Flip one drive's enabled state; returns whether it is now enabled
    pub async fn toggle(&self, ip: &str) -> Result<(bool, ControlEvent)> {
        let enable = self.disabled.contains(ip);
        let ips = [ip.to_string()];
        let event = self.set_enabled(&ips, enable).await?;
        Ok((enable, event))
    }
}
