//! Monitor configuration.
//!
//! The configuration file is owned by an external editor and re-read every
//! cycle. It may be JSON or YAML (picked by extension) and may still use the
//! legacy single-`location` layout, which is migrated before typed parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nowcast_common::GeoCoord;
use rain_engine::estimator::{DEFAULT_UTC_OFFSET_MINUTES, DEFAULT_ZOOM};
use rain_engine::fetcher::DEFAULT_BASE_URL;
use rain_engine::transport::DEFAULT_USER_AGENT;
use rain_engine::{EstimatorConfig, RetentionPolicy, RetryPolicy, StepMapping};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Current configuration layout version.
pub const CONFIG_VERSION: u64 = 1;

/// Full monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub version: u64,
    pub locations: Vec<LocationConfig>,
    pub monitoring: MonitoringConfig,
    pub heartbeat: HeartbeatConfig,
    pub debug_images: RetentionPolicy,
    pub debug: bool,
    pub source: SourceConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            locations: vec![LocationConfig::default()],
            monitoring: MonitoringConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            debug_images: RetentionPolicy::default(),
            debug: false,
            source: SourceConfig::default(),
        }
    }
}

/// A monitored point with its alert thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_location_name")]
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// mm/h at or above which rain counts as heavy
    #[serde(default = "default_heavy_rain")]
    pub heavy_rain: f64,
    /// mm/h at or above which rain counts as torrential
    #[serde(default = "default_torrential_rain")]
    pub torrential_rain: f64,
    #[serde(default)]
    pub email_to: String,
    #[serde(default = "default_true")]
    pub notification_enabled: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Mishima Station".to_string(),
            lat: 35.126474871810345,
            lon: 138.91109391000256,
            heavy_rain: default_heavy_rain(),
            torrential_rain: default_torrential_rain(),
            email_to: String::new(),
            notification_enabled: true,
        }
    }
}

impl LocationConfig {
    pub fn geo(&self) -> GeoCoord {
        GeoCoord::new(self.lat, self.lon)
    }

    pub fn validate(&self) -> Result<()> {
        if !(-85.0..=85.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            bail!("location '{}' is outside the tiled area ({}, {})", self.name, self.lat, self.lon);
        }
        if self.heavy_rain < 0.0 || self.torrential_rain < 0.0 {
            bail!("location '{}' has a negative threshold", self.name);
        }
        Ok(())
    }

    /// Recipient for alerts, if notifications are on and an address is set.
    pub fn recipient(&self) -> Option<&str> {
        let to = self.email_to.trim();
        (self.notification_enabled && !to.is_empty()).then_some(to)
    }
}

fn parse_locations(entries: Vec<Value>) -> Vec<LocationConfig> {
    let mut locations = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let parsed = serde_json::from_value::<LocationConfig>(entry)
            .map_err(anyhow::Error::from)
            .and_then(|loc| loc.validate().map(|()| loc));
        match parsed {
            Ok(loc) => locations.push(loc),
            Err(e) => warn!(index, error = %e, "Skipping invalid location entry"),
        }
    }
    locations
}

fn default_location_name() -> String {
    "(unnamed)".to_string()
}

fn default_heavy_rain() -> f64 {
    30.0
}

fn default_torrential_rain() -> f64 {
    50.0
}

fn default_true() -> bool {
    true
}

/// Polling cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    /// Lead of the main estimate
    pub lead_minutes: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 3,
            lead_minutes: 0,
        }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// Daily liveness messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Local `HH:MM` times
    pub times: Vec<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            times: vec!["09:00".to_string(), "17:00".to_string()],
        }
    }
}

/// Where tiles come from and how they are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub zoom: u32,
    pub utc_offset_minutes: i32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
    pub step_mapping: StepMapping,
    /// Debug snapshots go here
    pub snapshot_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            zoom: DEFAULT_ZOOM,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            timeout_secs: 10,
            max_retries: 3,
            backoff_ms: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            step_mapping: StepMapping::Binned,
            snapshot_dir: PathBuf::from("debug_images"),
        }
    }
}

impl MonitorConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let raw: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        let config = Self::from_value(raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!(
            path = %path.display(),
            locations = config.locations.len(),
            enabled = config.monitoring.enabled,
            "Loaded monitor config"
        );
        Ok(config)
    }

    /// Migrate, deserialize and validate an untyped document.
    ///
    /// Locations are parsed one by one; an entry that fails to parse or
    /// validate is logged and skipped. The default location is used only
    /// when no entry survives.
    pub fn from_value(raw: Value) -> Result<Self> {
        let mut doc = migrate(raw)?;
        let entries = match doc.as_object_mut().and_then(|d| d.remove("locations")) {
            Some(Value::Array(entries)) => entries,
            Some(other) => bail!("locations must be a list, got {}", other),
            None => Vec::new(),
        };

        let mut config: MonitorConfig = serde_json::from_value(doc)?;
        config.locations = parse_locations(entries);
        if config.locations.is_empty() {
            info!("No usable locations configured, using default");
            config.locations.push(LocationConfig::default());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for loc in &self.locations {
            loc.validate()?;
        }
        if self.source.zoom > 20 {
            bail!("zoom {} is out of range", self.source.zoom);
        }
        Ok(())
    }

    /// Engine settings derived from the `source` section and the debug flag.
    pub fn estimator_config(&self) -> EstimatorConfig {
        let source = &self.source;
        EstimatorConfig {
            base_url: source.base_url.clone(),
            zoom: source.zoom,
            utc_offset_minutes: source.utc_offset_minutes,
            request_timeout: Duration::from_secs(source.timeout_secs),
            retry: RetryPolicy {
                max_retries: source.max_retries,
                backoff_base: Duration::from_millis(source.backoff_ms),
            },
            user_agent: source.user_agent.clone(),
            step_mapping: source.step_mapping,
            snapshot_dir: self.debug.then(|| source.snapshot_dir.clone()),
        }
    }
}

/// Bring a document up to [`CONFIG_VERSION`].
///
/// Version 0 kept a single `location` with top-level `thresholds` and
/// `notification` sections; version 1 folds those into `locations`.
pub fn migrate(raw: Value) -> Result<Value> {
    let Value::Object(mut doc) = raw else {
        bail!("config root must be a mapping");
    };

    let version = doc.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > CONFIG_VERSION {
        bail!("config version {} is newer than supported {}", version, CONFIG_VERSION);
    }

    if version == 0 {
        let legacy = doc.remove("location");
        let thresholds = doc.remove("thresholds").unwrap_or(Value::Null);
        let notification = doc.remove("notification").unwrap_or(Value::Null);

        let has_locations = doc
            .get("locations")
            .and_then(Value::as_array)
            .map_or(false, |l| !l.is_empty());

        if !has_locations {
            if let Some(Value::Object(mut loc)) = legacy {
                copy_or(&mut loc, "heavy_rain", &thresholds, "heavy_rain", json!(30));
                copy_or(&mut loc, "torrential_rain", &thresholds, "torrential_rain", json!(50));
                copy_or(&mut loc, "email_to", &notification, "email_to", json!(""));
                copy_or(&mut loc, "notification_enabled", &notification, "enabled", json!(true));
                info!("Migrated legacy single-location config");
                doc.insert("locations".to_string(), Value::Array(vec![Value::Object(loc)]));
            }
        }
        doc.insert("version".to_string(), json!(CONFIG_VERSION));
    }

    Ok(Value::Object(doc))
}

fn copy_or(loc: &mut Map<String, Value>, key: &str, section: &Value, field: &str, fallback: Value) {
    let value = section.get(field).cloned().unwrap_or(fallback);
    loc.entry(key.to_string()).or_insert(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.locations.len(), 1);
        assert!(!config.monitoring.enabled);
        assert_eq!(config.monitoring.interval(), Duration::from_secs(180));
        assert_eq!(config.heartbeat.times, vec!["09:00", "17:00"]);
        assert_eq!(config.debug_images.max_files, 500);
    }

    #[test]
    fn test_migrate_legacy_location() {
        let raw = json!({
            "location": {"name": "Station", "lat": 35.0, "lon": 139.0},
            "thresholds": {"heavy_rain": 20, "torrential_rain": 40},
            "notification": {"email_to": "ops@example.com", "enabled": false},
        });
        let migrated = migrate(raw).unwrap();
        assert_eq!(migrated["version"], 1);
        assert!(migrated.get("location").is_none());
        let loc = &migrated["locations"][0];
        assert_eq!(loc["heavy_rain"], 20);
        assert_eq!(loc["email_to"], "ops@example.com");
        assert_eq!(loc["notification_enabled"], false);
    }

    #[test]
    fn test_migrate_keeps_existing_locations() {
        let raw = json!({
            "locations": [{"name": "A", "lat": 1.0, "lon": 2.0}],
            "location": {"name": "B", "lat": 3.0, "lon": 4.0},
        });
        let migrated = migrate(raw).unwrap();
        assert_eq!(migrated["locations"].as_array().unwrap().len(), 1);
        assert_eq!(migrated["locations"][0]["name"], "A");
    }

    #[test]
    fn test_rejects_newer_version() {
        assert!(migrate(json!({"version": 7})).is_err());
        assert!(migrate(json!([1, 2])).is_err());
    }

    #[test]
    fn test_recipient() {
        let mut loc = LocationConfig::default();
        assert_eq!(loc.recipient(), None);
        loc.email_to = " ops@example.com ".into();
        assert_eq!(loc.recipient(), Some("ops@example.com"));
        loc.notification_enabled = false;
        assert_eq!(loc.recipient(), None);
    }

    #[test]
    fn test_snapshot_dir_only_in_debug() {
        let mut config = MonitorConfig::default();
        assert!(config.estimator_config().snapshot_dir.is_none());
        config.debug = true;
        assert_eq!(
            config.estimator_config().snapshot_dir,
            Some(PathBuf::from("debug_images"))
        );
    }
}
