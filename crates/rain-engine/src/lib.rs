//! Tile-to-rainfall decoding engine.
//!
//! Estimates precipitation intensity (mm/h) at a geographic point by
//! decoding the nowcast product's slippy-map tiles:
//!
//! ```text
//! RainfallEstimator
//!   -> TimeResolver      (lead minutes -> basetime/validtime, 60 s cache)
//!   -> TileFetcher       (fallback URL templates, transport retry)
//!   -> GeoCoord mapping  (tile + pixel at the requested zoom)
//!   -> decoder           (alpha-authoritative step, windowed aggregation)
//!   -> classifier        (step table vs. color bins, cross-checked)
//! ```
//!
//! Debug overlays ([`snapshot`]) and their retention ([`retention`]) are
//! optional side channels for calibration.

pub mod classifier;
pub mod decoder;
pub mod estimator;
pub mod fetcher;
pub mod resolver;
pub mod retention;
pub mod snapshot;
pub mod transport;

pub use classifier::{Classification, StepMapping};
pub use decoder::AggregationMethod;
pub use estimator::{
    EstimatorConfig, FixedPreview, PreviewEntry, RainfallEstimate, RainfallEstimator,
    PREVIEW_LEADS,
};
pub use fetcher::{FetchedTile, TileFetcher};
pub use resolver::{TimeCache, TimeIndex, TimeResolver};
pub use retention::{prune_directory, PruneStats, RetentionPolicy};
pub use snapshot::SnapshotWriter;
pub use transport::{HttpResponse, ReqwestTransport, RetryPolicy, RetryingClient, Transport};
