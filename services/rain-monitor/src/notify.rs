//! Alerts, heartbeats and the delivery seam.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use rain_engine::RainfallEstimate;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::{LocationConfig, MonitorConfig};

/// Message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(recipient = %recipient, subject = %subject, body = %body, "Notification");
        Ok(())
    }
}

/// Severity of an estimate against a location's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Heavy,
    Torrential,
}

impl AlertLevel {
    /// Highest level reached by `mm_per_hour`, if any.
    pub fn classify(mm_per_hour: f64, location: &LocationConfig) -> Option<Self> {
        if mm_per_hour >= location.torrential_rain {
            Some(Self::Torrential)
        } else if mm_per_hour >= location.heavy_rain {
            Some(Self::Heavy)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Heavy => "heavy rain",
            Self::Torrential => "torrential rain",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heavy => "heavy",
            Self::Torrential => "torrential",
        }
    }
}

/// A threshold crossing ready to be delivered.
#[derive(Debug, Clone)]
pub struct Alert {
    pub location: String,
    pub level: AlertLevel,
    pub threshold: f64,
    pub estimate: RainfallEstimate,
}

impl Alert {
    pub fn new(location: &LocationConfig, level: AlertLevel, estimate: RainfallEstimate) -> Self {
        let threshold = match level {
            AlertLevel::Heavy => location.heavy_rain,
            AlertLevel::Torrential => location.torrential_rain,
        };
        Self {
            location: location.name.clone(),
            level,
            threshold,
            estimate,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "[{}] {} {:.1} mm/h",
            self.location,
            self.level.label(),
            self.estimate.mm_per_hour
        )
    }

    pub fn body(&self) -> String {
        let est = &self.estimate;
        format!(
            "Location: {}\nLevel: {} (threshold {:.1} mm/h)\nEstimate: {:.1} mm/h\nValid time: {}\nSource: {}\nDetail: {}\n",
            self.location,
            self.level.label(),
            self.threshold,
            est.mm_per_hour,
            est.valid_time_local.format("%Y-%m-%d %H:%M %:z"),
            est.source_url,
            est.diagnostic_line(),
        )
    }
}

/// Sends the daily liveness message at most once per configured minute.
#[derive(Debug, Default)]
pub struct Heartbeat {
    last_sent: Option<String>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send if `now` falls on a configured `HH:MM` not yet served.
    ///
    /// Every recipient is tried even if some fail; the minute counts as
    /// served afterwards. Returns the number of successful deliveries.
    pub async fn maybe_send(
        &mut self,
        config: &MonitorConfig,
        now: DateTime<FixedOffset>,
        notifier: &dyn Notifier,
    ) -> usize {
        if !config.heartbeat.enabled {
            return 0;
        }
        let hhmm = now.format("%H:%M").to_string();
        if !config.heartbeat.times.iter().any(|t| t.trim() == hhmm) {
            return 0;
        }
        let stamp = now.format("%Y%m%d%H%M").to_string();
        if self.last_sent.as_deref() == Some(stamp.as_str()) {
            debug!(stamp = %stamp, "Heartbeat already sent");
            return 0;
        }

        let recipients: BTreeSet<&str> = config
            .locations
            .iter()
            .filter_map(LocationConfig::recipient)
            .collect();
        let names: Vec<&str> = config.locations.iter().map(|l| l.name.as_str()).collect();
        let subject = format!("Rain monitor heartbeat {}", hhmm);
        let body = format!(
            "Monitoring is running.\nTime: {}\nLocations: {}\nEnabled: {}\n",
            now.format("%Y-%m-%d %H:%M %:z"),
            names.join(", "),
            config.monitoring.enabled,
        );

        let mut delivered = 0;
        for recipient in &recipients {
            match notifier.send(recipient, &subject, &body).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(recipient = %recipient, error = %e, "Heartbeat delivery failed"),
            }
        }
        self.last_sent = Some(stamp);
        info!(delivered, recipients = recipients.len(), time = %hhmm, "Heartbeat sent");
        delivered
    }
}
