//! Step and color to rainfall-rate mapping.
//!
//! Two independent estimates exist for every location: the palette step
//! (mapped through a step table) and the rendered color (matched against
//! the legend bins). The color wins when available since the legend is
//! what the agency publishes; the step is the fallback.

use metrics::counter;
use nowcast_common::PixelCoord;
use serde::{Deserialize, Serialize};
use tile_raster::TileImage;
use tracing::warn;

/// Per-channel slack when matching legend colors.
pub const COLOR_TOLERANCE: u8 = 2;

/// Value reported for the open-ended top bin.
pub const OPEN_BIN_VALUE: f64 = 80.0;

/// Step and color estimates further apart than this are logged.
pub const DISAGREEMENT_MM_PER_HOUR: f64 = 10.0;

/// Edges the binned step table rounds up to.
const BIN_EDGES: [f64; 7] = [1.0, 5.0, 10.0, 20.0, 30.0, 50.0, 80.0];

/// Step-to-rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMapping {
    /// Steps 1..=60 read as mm/h directly; the top steps are widened.
    Identity,
    /// Identity values rounded up to the legend bin edges.
    #[default]
    Binned,
}

/// Identity table: steps 1..=60 map to themselves, 61..=65 to the heavy tail.
pub fn identity_mm_per_hour(step: u8) -> f64 {
    match step {
        1..=60 => step as f64,
        61 => 80.0,
        62 => 100.0,
        63 => 150.0,
        64 => 200.0,
        65 => 300.0,
        _ => 0.0,
    }
}

fn bin_up(value: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    BIN_EDGES
        .iter()
        .copied()
        .find(|&edge| value <= edge)
        .unwrap_or(value)
}

/// Rate for a step under the chosen table. A missing step reads as no rain.
pub fn step_to_mm_per_hour(step: Option<u8>, mapping: StepMapping) -> f64 {
    let Some(step) = step else {
        return 0.0;
    };
    let value = identity_mm_per_hour(step);
    match mapping {
        StepMapping::Identity => value,
        StepMapping::Binned => bin_up(value),
    }
}

/// One legend entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBin {
    pub rgb: [u8; 3],
    pub mm_per_hour: f64,
}

/// Legend colors, lightest first. The last bin is open-ended (80 and up).
pub const COLOR_BINS: [ColorBin; 8] = [
    ColorBin { rgb: [242, 242, 255], mm_per_hour: 1.0 },
    ColorBin { rgb: [160, 210, 255], mm_per_hour: 5.0 },
    ColorBin { rgb: [33, 140, 255], mm_per_hour: 10.0 },
    ColorBin { rgb: [0, 65, 255], mm_per_hour: 20.0 },
    ColorBin { rgb: [250, 245, 0], mm_per_hour: 30.0 },
    ColorBin { rgb: [255, 153, 0], mm_per_hour: 50.0 },
    ColorBin { rgb: [255, 40, 0], mm_per_hour: 80.0 },
    ColorBin { rgb: [180, 0, 104], mm_per_hour: OPEN_BIN_VALUE },
];

/// First legend bin within [`COLOR_TOLERANCE`] on every channel.
pub fn match_color_bin(rgb: [u8; 3]) -> Option<&'static ColorBin> {
    COLOR_BINS.iter().find(|bin| {
        bin.rgb
            .iter()
            .zip(rgb.iter())
            .all(|(&a, &b)| a.abs_diff(b) <= COLOR_TOLERANCE)
    })
}

/// Color-based estimate at the center pixel.
///
/// Transparent pixels read as 0.0; colors off the legend give no estimate.
pub fn color_estimate_at(image: &TileImage, pixel: PixelCoord) -> Option<f64> {
    let x = pixel.px.min(image.width().saturating_sub(1));
    let y = pixel.py.min(image.height().saturating_sub(1));
    if image.alpha_at(x, y) == 0 {
        return Some(0.0);
    }
    match_color_bin(image.rgb_at(x, y)).map(|bin| bin.mm_per_hour)
}

/// Both estimates for one location and the value reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub step: u8,
    pub step_estimate: f64,
    pub color_estimate: Option<f64>,
    pub mm_per_hour: f64,
}

impl Classification {
    /// Whether the two estimates differ by at least [`DISAGREEMENT_MM_PER_HOUR`].
    pub fn disagrees(&self) -> bool {
        self.color_estimate
            .map_or(false, |color| (color - self.step_estimate).abs() >= DISAGREEMENT_MM_PER_HOUR)
    }
}

/// Classify an aggregated step together with the color at `center`.
pub fn classify(image: &TileImage, center: PixelCoord, step: u8, mapping: StepMapping) -> Classification {
    let step_estimate = step_to_mm_per_hour(Some(step), mapping);
    let color_estimate = color_estimate_at(image, center);
    let classification = Classification {
        step,
        step_estimate,
        color_estimate,
        mm_per_hour: color_estimate.unwrap_or(step_estimate),
    };

    if classification.disagrees() {
        warn!(
            step,
            step_estimate,
            color_estimate = ?color_estimate,
            px = center.px,
            py = center.py,
            "Step and color estimates disagree"
        );
        counter!("nowcast_color_step_disagreements_total").increment(1);
    }
    classification
}
