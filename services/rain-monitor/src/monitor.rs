//! One monitoring cycle over every configured location.

use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use metrics::counter;
use nowcast_common::{NowcastError, NowcastResult};
use rain_engine::{
    prune_directory, AggregationMethod, RainfallEstimate, RainfallEstimator, Transport,
};
use tracing::{error, info, warn};

use crate::config::{LocationConfig, MonitorConfig, SourceConfig};
use crate::notify::{Alert, AlertLevel, Heartbeat, Notifier};

/// Methods shown in the fixed-time preview.
pub const PREVIEW_METHODS: [AggregationMethod; 4] = [
    AggregationMethod::Single,
    AggregationMethod::Max2x2,
    AggregationMethod::Max4x4,
    AggregationMethod::Max8x8,
];

/// Methods compared in debug and experiment runs.
pub const COMPARISON_METHODS: [AggregationMethod; 3] = [
    AggregationMethod::Single,
    AggregationMethod::HighZoom,
    AggregationMethod::Average2x2,
];

/// Outcome of checking one location.
#[derive(Debug)]
pub struct LocationReport {
    pub estimate: RainfallEstimate,
    pub level: Option<AlertLevel>,
    pub notified: bool,
}

/// Per-location outcomes of one cycle, in configuration order.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub heartbeats: usize,
    pub locations: Vec<(String, NowcastResult<LocationReport>)>,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.locations.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// Spread of the comparison methods at one location.
#[derive(Debug)]
pub struct ExperimentReport {
    pub values: Vec<(AggregationMethod, NowcastResult<f64>)>,
}

impl ExperimentReport {
    /// Max minus min over the successful methods.
    pub fn spread(&self) -> Option<f64> {
        let ok: Vec<f64> = self
            .values
            .iter()
            .filter_map(|(_, v)| v.as_ref().ok().copied())
            .collect();
        let max = ok.iter().copied().reduce(f64::max)?;
        let min = ok.iter().copied().reduce(f64::min)?;
        Some(max - min)
    }
}

/// Long-lived monitor state: the estimator, its time cache, and heartbeat
/// dedup survive across cycles.
pub struct Monitor {
    transport: Option<Arc<dyn Transport>>,
    notifier: Arc<dyn Notifier>,
    heartbeat: Heartbeat,
    estimator: Option<(SourceConfig, bool, RainfallEstimator)>,
}

impl Monitor {
    /// Monitor using a real HTTP client built from the config.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport: None,
            notifier,
            heartbeat: Heartbeat::new(),
            estimator: None,
        }
    }

    /// Monitor over a fixed transport.
    pub fn with_transport(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new(notifier)
        }
    }

    /// Estimator for `config`, rebuilt only when its source settings change.
    fn estimator(&mut self, config: &MonitorConfig) -> NowcastResult<&mut RainfallEstimator> {
        let stale = match &self.estimator {
            Some((source, debug, _)) => *source != config.source || *debug != config.debug,
            None => true,
        };
        if stale {
            let settings = config.estimator_config();
            let estimator = match &self.transport {
                Some(t) => RainfallEstimator::with_transport(settings, t.clone()),
                None => RainfallEstimator::new(settings)?,
            };
            info!(zoom = config.source.zoom, debug = config.debug, "Estimator configured");
            self.estimator = Some((config.source.clone(), config.debug, estimator));
        }
        match &mut self.estimator {
            Some((_, _, estimator)) => Ok(estimator),
            None => Err(NowcastError::InternalError(
                "estimator missing after configuration".to_string(),
            )),
        }
    }

    /// Check every location once.
    pub async fn run_cycle(&mut self, config: &MonitorConfig) -> CycleReport {
        let offset = local_offset(config);
        self.run_cycle_at(config, Utc::now().with_timezone(&offset)).await
    }

    /// [`Monitor::run_cycle`] with an explicit local clock.
    pub async fn run_cycle_at(
        &mut self,
        config: &MonitorConfig,
        now: DateTime<FixedOffset>,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        report.heartbeats = self
            .heartbeat
            .maybe_send(config, now, self.notifier.as_ref())
            .await;

        info!(
            locations = config.locations.len(),
            lead_minutes = config.monitoring.lead_minutes,
            "Starting monitoring cycle"
        );

        for location in &config.locations {
            let result = self.check_location(config, location).await;
            if let Err(e) = &result {
                counter!("rain_monitor_location_failures_total").increment(1);
                error!(location = %location.name, error = %e, "Location check failed");
            }
            report.locations.push((location.name.clone(), result));
            prune_snapshots(config);
        }

        info!(
            checked = report.locations.len(),
            failed = report.failures(),
            "Monitoring cycle complete"
        );
        report
    }

    async fn check_location(
        &mut self,
        config: &MonitorConfig,
        location: &LocationConfig,
    ) -> NowcastResult<LocationReport> {
        let geo = location.geo();
        let debug = config.debug;
        let estimator = self.estimator(config)?;

        let preview = estimator.fixed_preview(geo, &PREVIEW_METHODS).await?;
        for method in PREVIEW_METHODS {
            info!(
                location = %location.name,
                method = %method,
                preview = %preview.summary_line(method),
                "Fixed-time preview"
            );
        }

        let pair = estimator.resolve(config.monitoring.lead_minutes).await?;
        let estimate = estimator
            .estimate_at(geo, &pair, AggregationMethod::Single)
            .await?;

        if debug {
            for method in COMPARISON_METHODS {
                match estimator.estimate_at(geo, &pair, method).await {
                    Ok(est) => info!(
                        location = %location.name,
                        method = %method,
                        mm_per_hour = est.mm_per_hour,
                        "Method comparison"
                    ),
                    Err(e) => warn!(location = %location.name, method = %method, error = %e, "Method comparison failed"),
                }
            }
        }

        info!(
            location = %location.name,
            mm_per_hour = estimate.mm_per_hour,
            valid_time = %estimate.valid_time_local.format("%Y-%m-%d %H:%M"),
            diagnostic = %estimate.diagnostic_line(),
            "Estimated rainfall"
        );

        let level = AlertLevel::classify(estimate.mm_per_hour, location);
        let mut notified = false;
        match level {
            None => info!(
                location = %location.name,
                heavy = location.heavy_rain,
                torrential = location.torrential_rain,
                "Below alert thresholds"
            ),
            Some(level) => {
                counter!("rain_monitor_alerts_total", "level" => level.as_str()).increment(1);
                match location.recipient() {
                    Some(recipient) => {
                        let alert = Alert::new(location, level, estimate.clone());
                        match self
                            .notifier
                            .send(recipient, &alert.subject(), &alert.body())
                            .await
                        {
                            Ok(()) => notified = true,
                            Err(e) => error!(location = %location.name, error = %e, "Alert delivery failed"),
                        }
                    }
                    None => info!(
                        location = %location.name,
                        level = level.as_str(),
                        enabled = location.notification_enabled,
                        "Alert suppressed, no recipient"
                    ),
                }
            }
        }

        Ok(LocationReport {
            estimate,
            level,
            notified,
        })
    }

    /// Run every comparison method at lead 0 and log the spread.
    pub async fn run_experiment(
        &mut self,
        config: &MonitorConfig,
    ) -> Vec<(String, NowcastResult<ExperimentReport>)> {
        let mut reports = Vec::with_capacity(config.locations.len());
        for location in &config.locations {
            let result = self.experiment_location(config, location).await;
            match &result {
                Ok(report) => info!(
                    location = %location.name,
                    spread = report.spread().unwrap_or(0.0),
                    "Experiment complete"
                ),
                Err(e) => error!(location = %location.name, error = %e, "Experiment failed"),
            }
            reports.push((location.name.clone(), result));
        }
        reports
    }

    async fn experiment_location(
        &mut self,
        config: &MonitorConfig,
        location: &LocationConfig,
    ) -> NowcastResult<ExperimentReport> {
        let geo = location.geo();
        let estimator = self.estimator(config)?;
        let pair = estimator.resolve(0).await?;

        let mut values = Vec::with_capacity(COMPARISON_METHODS.len());
        for method in COMPARISON_METHODS {
            let value = estimator
                .estimate_at(geo, &pair, method)
                .await
                .map(|est| est.mm_per_hour);
            match &value {
                Ok(mm) => info!(location = %location.name, method = %method, mm_per_hour = mm, "Experiment value"),
                Err(e) => warn!(location = %location.name, method = %method, error = %e, "Experiment method failed"),
            }
            values.push((method, value));
        }
        Ok(ExperimentReport { values })
    }
}

fn local_offset(config: &MonitorConfig) -> FixedOffset {
    FixedOffset::east_opt(config.source.utc_offset_minutes * 60)
        .unwrap_or_else(|| Utc.fix())
}

fn prune_snapshots(config: &MonitorConfig) {
    let dir = &config.source.snapshot_dir;
    match prune_directory(dir, &config.debug_images, SystemTime::now()) {
        Ok(stats) if stats.removed() > 0 => info!(
            dir = %dir.display(),
            expired = stats.expired,
            over_count = stats.over_count,
            over_size = stats.over_size,
            bytes_freed = stats.bytes_freed,
            remaining = stats.remaining,
            "Pruned debug snapshots"
        ),
        Ok(_) => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "Snapshot pruning failed"),
    }
}
