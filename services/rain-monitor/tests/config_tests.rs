//! Tests for loading monitor configuration files.

use std::path::PathBuf;

use rain_engine::StepMapping;
use rain_monitor::MonitorConfig;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = MonitorConfig::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, MonitorConfig::default());
    assert_eq!(config.locations[0].name, "Mishima Station");
}

#[test]
fn test_load_json() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.json",
        r#"{
            "version": 1,
            "locations": [
                {"name": "Home", "lat": 35.0, "lon": 139.0, "email_to": "me@example.com"},
                {"name": "Office", "lat": 35.5, "lon": 139.5, "heavy_rain": 10, "notification_enabled": false}
            ],
            "monitoring": {"enabled": true, "interval_minutes": 5},
            "debug_images": {"max_files": 50},
            "source": {"zoom": 11, "step_mapping": "identity"}
        }"#,
    );

    let config = MonitorConfig::load(&path).unwrap();
    assert_eq!(config.locations.len(), 2);
    assert_eq!(config.locations[0].heavy_rain, 30.0);
    assert_eq!(config.locations[0].recipient(), Some("me@example.com"));
    assert_eq!(config.locations[1].heavy_rain, 10.0);
    assert_eq!(config.locations[1].recipient(), None);
    assert!(config.monitoring.enabled);
    assert_eq!(config.monitoring.interval_minutes, 5);
    assert_eq!(config.monitoring.lead_minutes, 0);
    assert_eq!(config.debug_images.max_files, 50);
    assert_eq!(config.debug_images.retention_hours, 12);
    assert_eq!(config.source.zoom, 11);
    assert_eq!(config.source.step_mapping, StepMapping::Identity);
}

#[test]
fn test_load_yaml() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.yaml",
        r#"
locations:
  - name: Station
    lat: 35.1
    lon: 138.9
    torrential_rain: 80
heartbeat:
  times: ["07:30"]
"#,
    );

    let config = MonitorConfig::load(&path).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.locations[0].torrential_rain, 80.0);
    assert_eq!(config.heartbeat.times, vec!["07:30"]);
    assert!(config.heartbeat.enabled);
}

#[test]
fn test_legacy_layout_is_migrated() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.json",
        r#"{
            "location": {"name": "Old", "lat": 35.0, "lon": 139.0},
            "thresholds": {"heavy_rain": 25, "torrential_rain": 45},
            "notification": {"email_to": "old@example.com", "enabled": true},
            "monitoring": {"enabled": true}
        }"#,
    );

    let config = MonitorConfig::load(&path).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.locations.len(), 1);
    let loc = &config.locations[0];
    assert_eq!(loc.name, "Old");
    assert_eq!(loc.heavy_rain, 25.0);
    assert_eq!(loc.torrential_rain, 45.0);
    assert_eq!(loc.recipient(), Some("old@example.com"));
}

#[test]
fn test_empty_locations_fall_back_to_default_point() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.json", r#"{"version": 1, "locations": []}"#);

    let config = MonitorConfig::load(&path).unwrap();
    assert_eq!(config.locations.len(), 1);
    assert_eq!(config.locations[0].name, "Mishima Station");
}

#[test]
fn test_bad_location_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.json",
        r#"{
            "version": 1,
            "locations": [
                {"name": "Good", "lat": 35.1, "lon": 138.9},
                {"name": "Typo", "latitude": 35.2, "lon": 139.0},
                {"name": "Pole", "lat": 89.9, "lon": 0.0},
                {"name": "Negative", "lat": 35.0, "lon": 139.0, "heavy_rain": -1}
            ],
            "monitoring": {"enabled": true}
        }"#,
    );

    let config = MonitorConfig::load(&path).unwrap();
    let names: Vec<&str> = config.locations.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Good"]);
    assert!(config.monitoring.enabled);
}

#[test]
fn test_all_bad_locations_fall_back_to_default_point() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "config.yaml",
        r#"
locations:
  - name: Pole
    lat: 89.9
    lon: 0.0
  - "not a mapping"
"#,
    );

    let config = MonitorConfig::load(&path).unwrap();
    assert_eq!(config.locations.len(), 1);
    assert_eq!(config.locations[0].name, "Mishima Station");
}

#[test]
fn test_invalid_documents_are_errors() {
    let dir = TempDir::new().unwrap();

    let broken = write(&dir, "broken.json", "{not json");
    assert!(MonitorConfig::load(&broken).is_err());

    let not_a_list = write(&dir, "scalar.json", r#"{"version": 1, "locations": "Mishima"}"#);
    assert!(MonitorConfig::load(&not_a_list).is_err());

    let zoom = write(&dir, "zoom.json", r#"{"version": 1, "source": {"zoom": 42}}"#);
    let err = MonitorConfig::load(&zoom).unwrap_err();
    assert!(format!("{:#}", err).contains("zoom 42"));
}
