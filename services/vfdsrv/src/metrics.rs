//! Prometheus gauges derived from the telemetry cache.
//!
//! The gateway only collects; the scraping endpoint lives in the HTTP
//! adapter, which renders `gather()`.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio::time::interval;

use crate::cache::{DriveTelemetry, TelemetryCache};
use crate::error::Result;
use crate::profile::DriveStatus;

/// Collection cadence
pub const METRICS_INTERVAL: Duration = Duration::from_secs(15);

const LABELS: &[&str] = &["ip", "group", "fan_number"];

/// Per-drive gauge vectors over the cached telemetry
#[derive(Debug)]
pub struct FleetMetrics {
    registry: Registry,
    status: GaugeVec,
    up: GaugeVec,
    speed_hz: GaugeVec,
    speed_rpm: GaugeVec,
    speed_percent: GaugeVec,
    amperage: GaugeVec,
    cfm: GaugeVec,
}

impl FleetMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(name, help), LABELS)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        Ok(Self {
            status: gauge("vfd_status", "VFD operational status (1=running, 0=stopped)")?,
            up: gauge("up", "VFD connection status (1=connected, 0=disconnected)")?,
            speed_hz: gauge("vfd_speed_hz", "Current VFD speed in Hertz")?,
            speed_rpm: gauge("vfd_speed_rpm", "Current VFD speed in RPM")?,
            speed_percent: gauge("vfd_speed_percent", "Current VFD speed in percent")?,
            amperage: gauge("vfd_amperage", "Current VFD amperage usage")?,
            cfm: gauge("vfd_cfm", "Current fan CFM")?,
            registry,
        })
    }

    /// Refresh every gauge from one cache snapshot
    pub fn collect(&self, records: &[DriveTelemetry]) {
        for record in records {
            let fan_number = record.fan_number.to_string();
            let labels = [record.ip.as_str(), record.group.as_str(), fan_number.as_str()];

            let running = if record.status == DriveStatus::Running { 1.0 } else { 0.0 };
            let up = if matches!(record.status, DriveStatus::Unavailable | DriveStatus::Disabled) {
                0.0
            } else {
                1.0
            };

            self.status.with_label_values(&labels).set(running);
            self.up.with_label_values(&labels).set(up);
            self.speed_hz.with_label_values(&labels).set(record.actual_speed);
            self.speed_rpm.with_label_values(&labels).set(record.rpm_speed as f64);
            self.speed_percent.with_label_values(&labels).set(record.actual_percent);
            self.amperage.with_label_values(&labels).set(record.current);
            self.cfm.with_label_values(&labels).set(record.actual_cfm as f64);
        }
    }

    /// Text exposition format for the scraping adapter
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::GatewayError::Metrics(e.to_string()))
    }

    /// Periodic collection loop
    pub async fn run(self: Arc<Self>, cache: Arc<TelemetryCache>) {
        let mut ticker = interval(METRICS_INTERVAL);
        loop {
            ticker.tick().await;
            self.collect(&cache.snapshot());
        }
    }
}
