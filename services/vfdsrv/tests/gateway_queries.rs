//! The query surface the HTTP adapter consumes: devices, status, events,
//! app-config, metrics, and the disabled-set command path.

mod common;

use std::collections::HashMap;

use common::{drive, single_setpoint_profile, site};
use tempfile::tempdir;

use vfdsrv::api::{BulkConnectRequest, ConnectRequest, ControlRequest};
use vfdsrv::config::StatePaths;
use vfdsrv::profile::ProfileCatalog;
use vfdsrv::Gateway;

async fn gateway() -> (Gateway, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let site_config = site(vec![
        drive("10.0.0.21", "East", "OptidriveP2"),
        drive("10.0.0.22", "West", "OptidriveP2"),
    ]);
    let mut profiles = HashMap::new();
    profiles.insert("OptidriveP2".to_string(), single_setpoint_profile());
    let gateway = Gateway::new(
        site_config,
        ProfileCatalog::new(profiles),
        StatePaths::in_dir(dir.path()),
    )
    .await
    .unwrap();
    (gateway, dir)
}

#[tokio::test]
async fn devices_carry_family_and_waiting_status() {
    let (gateway, _dir) = gateway().await;
    let devices = gateway.devices();
    assert_eq!(devices.len(), 2);
    assert!(devices.iter().all(|d| d.drive_family == "OptidriveP2"));

    let json = serde_json::to_value(&devices[0]).unwrap();
    assert_eq!(json["DriveType"], "OptidriveP2");
    assert_eq!(json["status"], "Waiting");
    assert_eq!(json["actualSpeed"], 0.0);
    assert!(json["ip"].is_string());
}

#[tokio::test]
async fn status_report_shape() {
    let (gateway, _dir) = gateway().await;
    let report = gateway.status_report().await;
    assert_eq!(report.drive_count, 2);
    assert_eq!(report.connected_count, 0);
    assert!(report.loading);
    assert!(!report.ready);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["driveCount"], 2);
    assert_eq!(json["initialConnectionsDone"], false);
}

#[tokio::test]
async fn app_config_reflects_the_site_document() {
    let (gateway, _dir) = gateway().await;
    let summary = gateway.app_config();
    assert_eq!(summary.site_name, "TestSite");
    assert_eq!(summary.group_label, "Pod");
    assert!(!summary.no_fanhold);
}

#[tokio::test]
async fn metrics_text_exposes_per_drive_gauges() {
    let (gateway, _dir) = gateway().await;
    let text = gateway.metrics_text().unwrap();
    assert!(text.contains("vfd_status"));
    assert!(text.contains("vfd_speed_hz"));
    assert!(text.contains(r#"ip="10.0.0.21""#));
}

#[tokio::test]
async fn control_rejects_unknown_actions() {
    let (gateway, _dir) = gateway().await;
    let request = ControlRequest {
        drives: vec!["10.0.0.21".to_string()],
        action: "Levitate".to_string(),
        speed: 0.0,
    };
    assert!(gateway.control(&request).await.is_err());
    // Nothing journaled for a rejected request.
    assert!(gateway.events().is_empty());
}

#[tokio::test]
async fn toggle_flips_disabled_membership_and_journals() {
    let (gateway, dir) = gateway().await;

    let request = ConnectRequest {
        ip: "10.0.0.21".to_string(),
    };
    // First toggle disables the drive.
    let enabled = gateway.toggle_drive(&request).await.unwrap();
    assert!(!enabled);

    // Membership is mirrored to disk immediately.
    let data = std::fs::read_to_string(dir.path().join("disabled_drives.json")).unwrap();
    let map: HashMap<String, bool> = serde_json::from_str(&data).unwrap();
    assert!(map.contains_key("10.0.0.21"));

    // Second toggle re-enables it.
    let enabled = gateway.toggle_drive(&request).await.unwrap();
    assert!(enabled);

    let actions: Vec<String> = gateway.events().into_iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec!["DisconnectVFD".to_string(), "ConnectVFD".to_string()]
    );
}

#[tokio::test]
async fn bulk_disconnect_covers_every_listed_drive() {
    let (gateway, dir) = gateway().await;
    let request = BulkConnectRequest {
        ips: vec!["10.0.0.21".to_string(), "10.0.0.22".to_string()],
        action: Some("disconnect".to_string()),
    };
    gateway.bulk_connect(&request).await.unwrap();

    let data = std::fs::read_to_string(dir.path().join("disabled_drives.json")).unwrap();
    let map: HashMap<String, bool> = serde_json::from_str(&data).unwrap();
    assert_eq!(map.len(), 2);

    // One aggregated event for the bulk request.
    let events = gateway.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "DisconnectVFD");
    assert_eq!(events[0].drives.len(), 2);
}
