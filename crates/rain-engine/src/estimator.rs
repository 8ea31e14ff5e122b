//! Point rainfall estimation.
//!
//! [`RainfallEstimator`] ties the pipeline together: resolve the frame,
//! map the point onto a tile, fetch it, aggregate the step and classify it.
//! Estimates are never cached; only the time index is.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use nowcast_common::{GeoCoord, NowcastError, NowcastResult, PixelCoord, TileCoord, TimePair};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::classifier::{classify, StepMapping};
use crate::decoder::{aggregate_step, AggregationMethod};
use crate::fetcher::{TileFetcher, DEFAULT_BASE_URL};
use crate::resolver::TimeResolver;
use crate::snapshot::{SnapshotInfo, SnapshotWriter};
use crate::transport::{
    ReqwestTransport, RetryPolicy, RetryingClient, Transport, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT,
};

/// Leads compared by [`RainfallEstimator::fixed_preview`].
pub const PREVIEW_LEADS: [i64; 4] = [0, 15, 30, 60];

/// Default working zoom.
pub const DEFAULT_ZOOM: u32 = 10;

/// Japan Standard Time.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 9 * 60;

/// Agency web viewer, for eyeballing a point against the estimate.
const VIEWER_URL: &str = "https://www.jma.go.jp/bosai/nowc/";

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Root of the tile tree and time-index documents
    pub base_url: String,
    /// Working zoom level
    pub zoom: u32,
    /// Offset of local valid times from UTC, in minutes
    pub utc_offset_minutes: i32,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub step_mapping: StepMapping,
    /// Annotated snapshots are written here when set
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            zoom: DEFAULT_ZOOM,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            step_mapping: StepMapping::Binned,
            snapshot_dir: None,
        }
    }
}

impl EstimatorConfig {
    /// Local offset as a chrono offset.
    pub fn utc_offset(&self) -> NowcastResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            NowcastError::InternalError(format!("UTC offset out of range: {} min", self.utc_offset_minutes))
        })
    }
}

/// One decoded point value and everything needed to audit it.
#[derive(Debug, Clone, Serialize)]
pub struct RainfallEstimate {
    pub mm_per_hour: f64,
    pub valid_time_local: DateTime<FixedOffset>,
    pub source_url: String,
    pub method: AggregationMethod,
    pub times: TimePair,
    pub tile: TileCoord,
    pub pixel: PixelCoord,
    pub step: u8,
    pub step_estimate: f64,
    pub color_estimate: Option<f64>,
    pub meters_per_pixel: f64,
}

impl RainfallEstimate {
    /// One-line summary for logs and alerts.
    pub fn diagnostic_line(&self) -> String {
        let color = self
            .color_estimate
            .map(|c| format!("{:.1}", c))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "{} z{} x{} y{} px{} py{} (~{:.0} m/pixel) step={} stepConv={:.1} colorConv={} -> {:.1} mm/h at {}",
            self.method,
            self.tile.z,
            self.tile.x,
            self.tile.y,
            self.pixel.px,
            self.pixel.py,
            self.meters_per_pixel,
            self.step,
            self.step_estimate,
            color,
            self.mm_per_hour,
            self.valid_time_local.format("%H:%M"),
        )
    }
}

/// One cell of a fixed-time comparison.
#[derive(Debug)]
pub struct PreviewEntry {
    pub method: AggregationMethod,
    pub lead_minutes: i64,
    pub result: NowcastResult<RainfallEstimate>,
}

/// Estimates for several methods against the same resolved frames.
#[derive(Debug)]
pub struct FixedPreview {
    /// Frame used for each preview lead
    pub pairs: Vec<(i64, TimePair)>,
    pub entries: Vec<PreviewEntry>,
}

impl FixedPreview {
    pub fn for_method(&self, method: AggregationMethod) -> impl Iterator<Item = &PreviewEntry> {
        self.entries.iter().filter(move |e| e.method == method)
    }

    /// `now 1.0mm/h(12:30), +15min 5.0mm/h(12:45), ...` for one method.
    pub fn summary_line(&self, method: AggregationMethod) -> String {
        self.for_method(method)
            .map(|entry| {
                let label = if entry.lead_minutes == 0 {
                    "now".to_string()
                } else {
                    format!("+{}min", entry.lead_minutes)
                };
                match &entry.result {
                    Ok(est) => format!(
                        "{} {:.1}mm/h({})",
                        label,
                        est.mm_per_hour,
                        est.valid_time_local.format("%H:%M")
                    ),
                    Err(_) => format!("{} n/a", label),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Estimates rainfall at geographic points.
pub struct RainfallEstimator {
    config: EstimatorConfig,
    resolver: TimeResolver,
    fetcher: TileFetcher,
    snapshots: Option<SnapshotWriter>,
}

impl RainfallEstimator {
    /// Estimator backed by a real HTTP client.
    pub fn new(config: EstimatorConfig) -> NowcastResult<Self> {
        let transport = ReqwestTransport::new(config.request_timeout, &config.user_agent)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Estimator over an arbitrary transport.
    pub fn with_transport(config: EstimatorConfig, transport: Arc<dyn Transport>) -> Self {
        let client = RetryingClient::new(transport, config.retry.clone());
        let resolver = TimeResolver::new(client.clone(), config.base_url.clone());
        let fetcher = TileFetcher::new(client, config.base_url.clone());
        let snapshots = config.snapshot_dir.clone().map(SnapshotWriter::new);
        Self {
            config,
            resolver,
            fetcher,
            snapshots,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn zoom(&self) -> u32 {
        self.config.zoom
    }

    /// Resolve a lead to a frame through the shared time cache.
    pub async fn resolve(&mut self, lead_minutes: i64) -> NowcastResult<TimePair> {
        self.resolver.resolve(lead_minutes).await
    }

    /// Estimate at `geo` for a lead from now.
    pub async fn estimate(
        &mut self,
        geo: GeoCoord,
        lead_minutes: i64,
        method: AggregationMethod,
    ) -> NowcastResult<RainfallEstimate> {
        let pair = self.resolve(lead_minutes).await?;
        self.estimate_at(geo, &pair, method).await
    }

    /// Estimate at `geo` for an already resolved frame.
    ///
    /// `high_zoom` maps the point one level deeper and fetches only that
    /// tile; the configured zoom is left untouched.
    #[instrument(skip(self, pair, method), fields(validtime = %pair.validtime, method = %method))]
    pub async fn estimate_at(
        &self,
        geo: GeoCoord,
        pair: &TimePair,
        method: AggregationMethod,
    ) -> NowcastResult<RainfallEstimate> {
        let zoom = match method {
            AggregationMethod::HighZoom => self.config.zoom + 1,
            _ => self.config.zoom,
        };
        let tile = geo.to_tile(zoom);
        let pixel = geo.to_pixel(zoom);
        let meters_per_pixel = geo.meters_per_pixel(zoom);
        debug!(
            lat = geo.lat,
            lon = geo.lon,
            tile = %tile,
            px = pixel.px,
            py = pixel.py,
            meters_per_pixel = %format!("{:.0}", meters_per_pixel),
            "Mapped point onto tile"
        );

        let fetched = self.fetcher.fetch(pair, &tile).await?;
        let step = aggregate_step(&fetched.image, pixel, method);
        let classification = classify(&fetched.image, pixel, step, self.config.step_mapping);
        let valid_time_local = pair.valid_local(self.config.utc_offset()?)?;

        let estimate = RainfallEstimate {
            mm_per_hour: classification.mm_per_hour,
            valid_time_local,
            source_url: fetched.url,
            method,
            times: pair.clone(),
            tile,
            pixel,
            step,
            step_estimate: classification.step_estimate,
            color_estimate: classification.color_estimate,
            meters_per_pixel,
        };
        debug!(diagnostic = %estimate.diagnostic_line(), "Decoded estimate");

        if let Some(writer) = &self.snapshots {
            let info = SnapshotInfo {
                validtime: pair.validtime.clone(),
                method,
                tile,
                pixel,
                step,
                mm_per_hour: estimate.mm_per_hour,
            };
            if let Err(e) = writer.write(&fetched.image, &info).await {
                warn!(error = %e, "Failed to save decode snapshot");
            }
            debug!(url = %viewer_url(geo, zoom), "Viewer URL");
        }

        Ok(estimate)
    }

    /// Compare methods across [`PREVIEW_LEADS`].
    ///
    /// Every frame is resolved once up front and shared by all methods, so
    /// the comparison cannot straddle a feed update. A resolution failure
    /// aborts the preview; per-estimate failures are kept in the entries.
    pub async fn fixed_preview(
        &mut self,
        geo: GeoCoord,
        methods: &[AggregationMethod],
    ) -> NowcastResult<FixedPreview> {
        let mut pairs = Vec::with_capacity(PREVIEW_LEADS.len());
        for lead in PREVIEW_LEADS {
            pairs.push((lead, self.resolve(lead).await?));
        }

        let mut entries = Vec::with_capacity(methods.len() * pairs.len());
        for &method in methods {
            for (lead, pair) in &pairs {
                let result = self.estimate_at(geo, pair, method).await;
                if let Err(e) = &result {
                    debug!(method = %method, lead = lead, error = %e, "Preview estimate failed");
                }
                entries.push(PreviewEntry {
                    method,
                    lead_minutes: *lead,
                    result,
                });
            }
        }
        Ok(FixedPreview { pairs, entries })
    }
}

/// Viewer link centered on a point.
pub fn viewer_url(geo: GeoCoord, zoom: u32) -> String {
    format!(
        "{}#zoom:{}/lat:{}/lon:{}/colordepth:normal/elements:hrpns",
        VIEWER_URL, zoom, geo.lat, geo.lon
    )
}
