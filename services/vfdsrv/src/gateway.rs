//! Gateway assembly: wires the cache, sessions, durable state, polling
//! and command dispatch together and exposes the surface the HTTP adapter
//! consumes.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::api::{
    AppConfigSummary, BulkConnectRequest, ConnectRequest, ControlRequest, CurtailRequest,
    CurtailResponse, DeviceRecord,
};
use crate::cache::TelemetryCache;
use crate::config::{SiteConfig, StatePaths};
use crate::dispatcher::{CommandDispatcher, ControlAction};
use crate::error::{GatewayError, Result};
use crate::metrics::FleetMetrics;
use crate::persist::{ControlEvent, CurtailmentStore, DisabledDrives, EventJournal};
use crate::poller::PollEngine;
use crate::profile::{ProfileCatalog, RegisterSpace};
use crate::session::SessionMap;
use crate::status::{StatusReport, SystemStatus};
use crate::supervisor::{ConnectionSupervisor, SupervisorSet};

/// The drive fleet engine
pub struct Gateway {
    site: Arc<SiteConfig>,
    profiles: Arc<ProfileCatalog>,
    cache: Arc<TelemetryCache>,
    sessions: SessionMap,
    disabled: Arc<DisabledDrives>,
    journal: Arc<EventJournal>,
    status: Arc<SystemStatus>,
    metrics: Arc<FleetMetrics>,
    dispatcher: CommandDispatcher,
    poller: Arc<PollEngine>,
    poll_trigger: Arc<Notify>,
    supervisors: SupervisorSet,
}

impl Gateway {
    /// Build the engine from the two configuration documents and whatever
    /// durable state survives from previous runs
    pub async fn new(
        site: SiteConfig,
        profiles: ProfileCatalog,
        paths: StatePaths,
    ) -> Result<Self> {
        site.validate()?;
        let site = Arc::new(site);
        let profiles = Arc::new(profiles);

        let disabled = Arc::new(DisabledDrives::load(paths.disabled).await);
        let journal = Arc::new(EventJournal::load(paths.journal).await);
        let curtailment = Arc::new(CurtailmentStore::load(paths.curtailment).await);
        if disabled.len() > 0 {
            info!("{} drive(s) start disabled", disabled.len());
        }

        let cache = Arc::new(TelemetryCache::new(&site.drives));
        let sessions = SessionMap::new();
        let status = Arc::new(SystemStatus::new(
            site.drives.len(),
            sessions.clone(),
            cache.clone(),
        ));
        let metrics = Arc::new(FleetMetrics::new()?);
        let poll_trigger = Arc::new(Notify::new());
        let supervisors = SupervisorSet::new();

        let dispatcher = CommandDispatcher::new(
            &site,
            profiles.clone(),
            sessions.clone(),
            cache.clone(),
            journal.clone(),
            disabled.clone(),
            curtailment,
            supervisors.clone(),
            poll_trigger.clone(),
        );

        let poller = Arc::new(PollEngine::new(
            site.drives.to_vec(),
            profiles.clone(),
            sessions.clone(),
            disabled.clone(),
            cache.clone(),
            status.clone(),
        ));

        Ok(Self {
            site,
            profiles,
            cache,
            sessions,
            disabled,
            journal,
            status,
            metrics,
            dispatcher,
            poller,
            poll_trigger,
            supervisors,
        })
    }

    /// Spawn one supervisor per drive plus the polling and metrics loops
    pub fn start(&self) {
        for drive in &self.site.drives {
            let register_space = match self.profiles.get(&drive.drive_family) {
                Some(profile) => profile.register_space,
                None => {
                    // Supervision still runs; the probe only needs holding
                    // register 0. Polling will flag the missing profile.
                    warn!(
                        "drive {} references unknown family {}",
                        drive.ip, drive.drive_family
                    );
                    RegisterSpace::Holding
                }
            };
            let supervisor = ConnectionSupervisor::new(
                drive.clone(),
                register_space,
                self.sessions.clone(),
                self.disabled.clone(),
            );
            self.supervisors.spawn_if_idle(supervisor);
        }

        tokio::spawn(self.poller.clone().run(self.poll_trigger.clone()));
        tokio::spawn(self.metrics.clone().run(self.cache.clone()));

        info!(
            "gateway started: {} drives, {} profiles",
            self.site.drives.len(),
            self.profiles.len()
        );
    }

    /// Movement command surface
    pub async fn control(&self, request: &ControlRequest) -> Result<ControlEvent> {
        let action = ControlAction::parse(&request.action, request.speed)?;
        self.dispatcher.dispatch(&request.drives, action).await
    }

    /// Curtail/resume surface
    pub async fn curtail(&self, request: &CurtailRequest) -> Result<CurtailResponse> {
        match request.action.as_str() {
            "curtail" => self.dispatcher.curtail(&request.groups).await,
            "resume" => self.dispatcher.resume().await,
            other => Err(GatewayError::InvalidAction(other.to_string())),
        }
    }

    /// Toggle one drive's enabled state; returns whether it is now
    /// enabled
    pub async fn toggle_drive(&self, request: &ConnectRequest) -> Result<bool> {
        let (enabled, _event) = self.dispatcher.toggle(&request.ip).await?;
        Ok(enabled)
    }

    /// Bulk enable/disable; a missing action toggles each drive
    /// independently
    pub async fn bulk_connect(&self, request: &BulkConnectRequest) -> Result<()> {
        match request.action.as_deref() {
            Some("connect") => {
                self.dispatcher.set_enabled(&request.ips, true).await?;
            }
            Some("disconnect") => {
                self.dispatcher.set_enabled(&request.ips, false).await?;
            }
            Some(other) => return Err(GatewayError::InvalidAction(other.to_string())),
            None => {
                for ip in &request.ips {
                    self.dispatcher.toggle(ip).await?;
                }
            }
        }
        Ok(())
    }

    /// Devices query: the latest snapshot enriched with family names
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.cache
            .snapshot()
            .into_iter()
            .map(|telemetry| {
                let drive_family = self
                    .site
                    .drive(&telemetry.ip)
                    .map(|d| d.drive_family.clone())
                    .unwrap_or_default();
                DeviceRecord {
                    drive_family,
                    telemetry,
                }
            })
            .collect()
    }

    /// Events query, insertion order
    pub fn events(&self) -> Vec<ControlEvent> {
        self.journal.events()
    }

    /// Status query
    pub async fn status_report(&self) -> StatusReport {
        self.status.report().await
    }

    /// Site identity for the UI
    pub fn app_config(&self) -> AppConfigSummary {
        AppConfigSummary {
            site_name: self.site.site_name.clone(),
            group_label: self.site.group_label.clone(),
            bind_ip: self.site.bind_ip.clone(),
            no_fanhold: self.site.no_fanhold,
        }
    }

    /// Metrics exposition for the scraping adapter
    pub fn metrics_text(&self) -> Result<String> {
        self.metrics.collect(&self.cache.snapshot());
        self.metrics.gather()
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }
}
