//! Per-drive connection supervision.
//!
//! One long-running task per configured drive owns that drive's session
//! lifecycle: connect with bounded retries, keepalive probing, backoff
//! when the drive stays unreachable, and teardown when the drive is
//! administratively disabled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::DriveConfig;
use crate::persist::DisabledDrives;
use crate::profile::RegisterSpace;
use crate::session::{DriveSession, SessionMap};

/// How often a disabled drive re-checks its membership
pub const DISABLED_RECHECK: Duration = Duration::from_secs(10);
/// Connection attempts per round
pub const CONNECT_ATTEMPTS: u32 = 3;
/// Sleep between attempts within a round
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Backoff after a failed round; bounds reconnection storms and log noise
/// when a drive is powered off
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(300);
/// Keepalive probe cadence while healthy
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Supervises one drive's connection
pub struct ConnectionSupervisor {
    config: DriveConfig,
    register_space: RegisterSpace,
    sessions: SessionMap,
    disabled: Arc<DisabledDrives>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: DriveConfig,
        register_space: RegisterSpace,
        sessions: SessionMap,
        disabled: Arc<DisabledDrives>,
    ) -> Self {
        Self {
            config,
            register_space,
            sessions,
            disabled,
        }
    }

    pub fn ip(&self) -> &str {
        &self.config.ip
    }

    /// The supervision loop; never returns
    pub async fn run(self) {
        let ip = self.config.ip.clone();
        let mut was_unavailable = false;

        loop {
            if self.disabled.contains(&ip) {
                sleep(DISABLED_RECHECK).await;
                continue;
            }

            // Connecting: a bounded round of attempts.
            let mut session = None;
            let mut last_err = None;
            for attempt in 1..=CONNECT_ATTEMPTS {
                match DriveSession::connect(&self.config, self.register_space).await {
                    Ok(s) => {
                        session = Some(s);
                        break;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        if attempt < CONNECT_ATTEMPTS {
                            sleep(CONNECT_RETRY_DELAY).await;
                        }
                    }
                }
            }

            let Some(session) = session else {
                if let Some(e) = last_err {
                    warn!(
                        "drive {}: {} connection attempts failed, last error: {}. Retrying in {} minutes",
                        ip,
                        CONNECT_ATTEMPTS,
                        e,
                        CONNECT_BACKOFF.as_secs() / 60
                    );
                }
                was_unavailable = true;
                sleep(CONNECT_BACKOFF).await;
                continue;
            };

            self.sessions.insert(session.clone()).await;
            if was_unavailable {
                info!("drive {} is available again (reconnected)", ip);
                was_unavailable = false;
            }

            // Healthy: probe until the link drops or the drive is disabled.
            loop {
                if self.disabled.contains(&ip) {
                    let mut link = session.lock().await;
                    link.close().await;
                    info!("drive {} disabled, connection closed", ip);
                    break;
                }

                sleep(HEALTH_INTERVAL).await;

                let mut link = session.lock().await;
                if let Err(e) = link.probe().await {
                    warn!("lost connection to {}: {}", ip, e);
                    break;
                }
            }
        }
    }
}

/// Registry of running supervisor tasks, keyed by drive address
#[derive(Clone, Default)]
pub struct SupervisorSet {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl SupervisorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the supervisor unless one is already running for its drive;
    /// returns whether a task was spawned
    pub fn spawn_if_idle(&self, supervisor: ConnectionSupervisor) -> bool {
        let mut tasks = self.tasks.lock();
        let ip = supervisor.ip().to_string();
        if let Some(handle) = tasks.get(&ip) {
            if !handle.is_finished() {
                return false;
            }
        }
        tasks.insert(ip, tokio::spawn(supervisor.run()));
        true
    }

    pub fn running_count(&self) -> usize {
        self.tasks.lock().values().filter(|h| !h.is_finished()).count()
    }
}
