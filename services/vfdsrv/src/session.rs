//! Per-drive Modbus session: one transport, one request/response mutex,
//! one health flag.
//!
//! The session is the unit of mutual exclusion. A guard from `lock()`
//! must be held for the entire duration of any exchange: poll
//! transactions and command writes contend on the same mutex, which is
//! what keeps a set-speed followed by a poll from interleaving.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use drivelink::{ModbusClient, TcpTransport, Transport};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::config::DriveConfig;
use crate::error::Result;
use crate::profile::RegisterSpace;

/// TCP connect deadline
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Per-exchange response deadline
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Register probed on connect and during health checks
const PROBE_REGISTER: u16 = 0;

/// One drive's live connection
#[derive(Debug)]
pub struct DriveSession {
    ip: String,
    register_space: RegisterSpace,
    client: Mutex<ModbusClient>,
    healthy: AtomicBool,
    failures: AtomicU32,
    last_failure: parking_lot::Mutex<Option<Instant>>,
}

impl DriveSession {
    /// Connect to a drive: open TCP under a 2 s deadline, then probe a
    /// known register so a listening socket that is not a drive does not
    /// count as present. Any failure closes the transport.
    pub async fn connect(config: &DriveConfig, register_space: RegisterSpace) -> Result<Arc<Self>> {
        let transport = TcpTransport::new(config.ip.clone(), config.port, CONNECT_TIMEOUT);
        Self::establish(Box::new(transport), config, register_space).await
    }

    /// Connect over a caller-supplied transport; tests feed the mock
    /// through here
    pub async fn establish(
        transport: Box<dyn Transport>,
        config: &DriveConfig,
        register_space: RegisterSpace,
    ) -> Result<Arc<Self>> {
        let mut client = ModbusClient::new(transport, config.unit, RESPONSE_TIMEOUT);
        client.connect().await?;

        if let Err(probe_err) = client.read_holding_registers(PROBE_REGISTER, 1).await {
            let _ = client.disconnect().await;
            return Err(probe_err.into());
        }

        Ok(Arc::new(Self {
            ip: config.ip.clone(),
            register_space,
            client: Mutex::new(client),
            healthy: AtomicBool::new(true),
            failures: AtomicU32::new(0),
            last_failure: parking_lot::Mutex::new(None),
        }))
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        self.failures.fetch_add(1, Ordering::SeqCst);
        *self.last_failure.lock() = Some(Instant::now());
    }

    /// Wire failures observed on this session since it connected
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn last_failure(&self) -> Option<Instant> {
        *self.last_failure.lock()
    }

    /// Acquire the session for one exchange (or an uninterrupted sequence
    /// of them)
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            session: self,
            client: self.client.lock().await,
        }
    }
}

/// Exclusive access to a session's wire operations
pub struct SessionGuard<'a> {
    session: &'a DriveSession,
    client: MutexGuard<'a, ModbusClient>,
}

impl SessionGuard<'_> {
    /// Read one telemetry register, dispatching on the family's register
    /// space
    pub async fn read_register(&mut self, address: u16) -> Result<u16> {
        let result = match self.session.register_space {
            RegisterSpace::Holding => self.client.read_holding_registers(address, 1).await,
            RegisterSpace::Input => self.client.read_input_registers(address, 1).await,
        };
        match result {
            Ok(words) => Ok(words[0]),
            Err(e) => {
                self.session.mark_unhealthy();
                Err(e.into())
            }
        }
    }

    /// Read one register as a two's-complement 16-bit value; signed reads
    /// always use the holding space
    pub async fn read_signed_register(&mut self, address: u16) -> Result<i16> {
        match self.client.read_holding_registers(address, 1).await {
            Ok(words) => Ok(words[0] as i16),
            Err(e) => {
                self.session.mark_unhealthy();
                Err(e.into())
            }
        }
    }

    pub async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        match self.client.write_single_register(address, value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.session.mark_unhealthy();
                Err(e.into())
            }
        }
    }

    /// Keepalive read of the probe register
    pub async fn probe(&mut self) -> Result<()> {
        match self.client.read_holding_registers(PROBE_REGISTER, 1).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.session.mark_unhealthy();
                Err(e.into())
            }
        }
    }

    /// Close the transport and leave the session unhealthy
    pub async fn close(&mut self) {
        let _ = self.client.disconnect().await;
        self.session.mark_unhealthy();
    }
}

/// Shared map from drive address to live session
#[derive(Debug, Clone, Default)]
pub struct SessionMap {
    inner: Arc<RwLock<HashMap<String, Arc<DriveSession>>>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<DriveSession>) {
        self.inner
            .write()
            .await
            .insert(session.ip().to_string(), session);
    }

    pub async fn get(&self, ip: &str) -> Option<Arc<DriveSession>> {
        self.inner.read().await.get(ip).cloned()
    }

    /// The session for `ip`, only if it is currently healthy
    pub async fn healthy(&self, ip: &str) -> Option<Arc<DriveSession>> {
        self.inner
            .read()
            .await
            .get(ip)
            .filter(|s| s.is_healthy())
            .cloned()
    }

    pub async fn connected_count(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn healthy_count(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.is_healthy())
            .count()
    }
}
