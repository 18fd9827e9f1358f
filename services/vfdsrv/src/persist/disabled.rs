//! Durable set of drives the supervisors must not connect to.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::write_json_atomic;

/// Drive addresses that are administratively off; membership survives
/// restarts
#[derive(Debug)]
pub struct DisabledDrives {
    path: PathBuf,
    set: RwLock<HashSet<String>>,
}

impl DisabledDrives {
    /// Load the set; a missing or malformed file starts empty
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        // The file format stores `true` per key; only the keys matter.
        let set = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<HashMap<String, bool>>(&data) {
                Ok(map) => map.into_keys().collect(),
                Err(e) => {
                    warn!("disabled drive file {} is malformed, starting empty: {}", path.display(), e);
                    HashSet::new()
                }
            },
            Err(_) => {
                debug!("no disabled drive file at {}", path.display());
                HashSet::new()
            }
        };
        Self {
            path,
            set: RwLock::new(set),
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.set.read().contains(ip)
    }

    /// Returns true when membership changed
    pub fn insert(&self, ip: &str) -> bool {
        self.set.write().insert(ip.to_string())
    }

    /// Returns true when membership changed
    pub fn remove(&self, ip: &str) -> bool {
        self.set.write().remove(ip)
    }

    pub fn all(&self) -> HashSet<String> {
        self.set.read().clone()
    }

    pub fn len(&self) -> usize {
        self.set.read().len()
    }

    /// Mirror the current membership to disk as `{addr: true}`
    pub async fn persist(&self) {
        let map: HashMap<String, bool> = self.all().into_iter().map(|ip| (ip, true)).collect();
        if let Err(e) = write_json_atomic(&self.path, &map).await {
            warn!("failed to persist disabled drives to {}: {}", self.path.display(), e);
        }
    }
}
