//! Site configuration: the fleet the gateway supervises.
//!
//! Field names follow the JSON documents the deployment tooling already
//! ships to `/etc/vfd`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Top-level site document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(rename = "SiteName")]
    pub site_name: String,
    #[serde(rename = "BindIP")]
    pub bind_ip: String,
    #[serde(rename = "BindPort")]
    pub bind_port: String,
    #[serde(rename = "NoFanHold", default)]
    pub no_fanhold: bool,
    #[serde(rename = "GroupLabel", default)]
    pub group_label: String,
    #[serde(rename = "VFDs")]
    pub drives: Vec<DriveConfig>,
}

/// One drive entry; immutable after load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Unit")]
    pub unit: u8,
    #[serde(rename = "DefaultSpeed", default)]
    pub default_speed: i32,
    #[serde(rename = "Group", default)]
    pub group: String,
    #[serde(rename = "FanNumber", default)]
    pub fan_number: u32,
    #[serde(rename = "FanDesc", default)]
    pub fan_desc: String,
    #[serde(rename = "RpmHz", default)]
    pub rpm_per_hz: f64,
    #[serde(rename = "CfmRpm", default)]
    pub cfm_per_rpm: f64,
    #[serde(rename = "DriveType")]
    pub drive_family: String,
}

impl SiteConfig {
    /// The drive address is the fleet-wide identifier; duplicates would
    /// alias sessions.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for drive in &self.drives {
            if !seen.insert(drive.ip.as_str()) {
                return Err(GatewayError::Config(format!(
                    "duplicate drive address {} in site configuration",
                    drive.ip
                )));
            }
        }
        Ok(())
    }

    pub fn drive(&self, ip: &str) -> Option<&DriveConfig> {
        self.drives.iter().find(|d| d.ip == ip)
    }
}

/// Load and validate the site document; failure here is fatal at startup
pub fn load_site_config(path: impl AsRef<Path>) -> Result<SiteConfig> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("failed to read site config {}: {e}", path.display()))
    })?;
    let config: SiteConfig = serde_json::from_str(&data).map_err(|e| {
        GatewayError::Config(format!("failed to parse site config {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// File locations the gateway works against
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub site_config: PathBuf,
    pub profile_catalog: PathBuf,
    pub state_dir: PathBuf,
}

impl GatewaySettings {
    /// Resolve locations from the environment with the conventional
    /// `/etc/vfd` defaults
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };
        Self {
            site_config: PathBuf::from(var("VFD_SITE_CONFIG", "/etc/vfd/config.json")),
            profile_catalog: PathBuf::from(var("VFD_PROFILES", "/etc/vfd/drive_profiles.json")),
            state_dir: PathBuf::from(var("VFD_STATE_DIR", "/etc/vfd")),
        }
    }

    pub fn state_paths(&self) -> StatePaths {
        StatePaths::in_dir(&self.state_dir)
    }
}

/// Durable state file locations
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub journal: PathBuf,
    pub disabled: PathBuf,
    pub curtailment: PathBuf,
}

impl StatePaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            journal: dir.join("control_events.json"),
            disabled: dir.join("disabled_drives.json"),
            curtailment: dir.join("curtailment.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(ip: &str) -> DriveConfig {
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
    fn parses_site_document() {
        let json = r#"{
            "SiteName": "AAIMDC",
            "BindIP": "0.0.0.0",
            "BindPort": "8080",
            "NoFanHold": true,
            "GroupLabel": "Pod",
            "VFDs": [{
                "IP": "10.0.0.21",
                "Port": 502,
                "Unit": 1,
                "Group": "East",
                "FanNumber": 3,
                "FanDesc": "Exhaust 3",
                "RpmHz": 29.5,
                "CfmRpm": 12.4,
                "DriveType": "OptidriveP2"
            }]
        }"#;

        let config: SiteConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.site_name, "AAIMDC");
        assert!(config.no_fanhold);
        assert_eq!(config.drives.len(), 1);
        assert_eq!(config.drives[0].fan_number, 3);
        assert_eq!(config.drives[0].default_speed, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_addresses_rejected() {
        let config = SiteConfig {
            site_name: "Test".to_string(),
            bind_ip: "0.0.0.0".to_string(),
            bind_port: "8080".to_string(),
            no_fanhold: false,
            group_label: String::new(),
            drives: vec![drive("10.0.0.1"), drive("10.0.0.1")],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_paths_join_dir() {
        let paths = StatePaths::in_dir("/var/lib/vfd");
        assert_eq!(paths.journal, PathBuf::from("/var/lib/vfd/control_events.json"));
        assert_eq!(paths.disabled, PathBuf::from("/var/lib/vfd/disabled_drives.json"));
        assert_eq!(paths.curtailment, PathBuf::from("/var/lib/vfd/curtailment.json"));
    }
}
