//! Per-pixel step extraction and neighborhood aggregation.
//!
//! Nowcast tiles are palette images whose index is the intensity step.
//! Aggregation methods combine the steps of a small window around the
//! target pixel to trade locality for robustness near rain-cell edges.

use std::fmt;
use std::str::FromStr;

use nowcast_common::{NowcastError, PixelCoord};
use serde::{Deserialize, Serialize};
use tile_raster::TileImage;

/// How the step at a location is derived from the surrounding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationMethod {
    /// The target pixel only.
    #[serde(rename = "single")]
    Single,
    /// Mean of the 2×2 block anchored at the target pixel.
    #[serde(rename = "average_2x2")]
    Average2x2,
    #[serde(rename = "max_2x2")]
    Max2x2,
    #[serde(rename = "max_3x3")]
    Max3x3,
    #[serde(rename = "max_4x4")]
    Max4x4,
    #[serde(rename = "max_8x8")]
    Max8x8,
    /// Single pixel read from the tile one zoom level deeper.
    #[serde(rename = "high_zoom")]
    HighZoom,
}

impl AggregationMethod {
    pub const ALL: [AggregationMethod; 7] = [
        AggregationMethod::Single,
        AggregationMethod::Average2x2,
        AggregationMethod::Max2x2,
        AggregationMethod::Max3x3,
        AggregationMethod::Max4x4,
        AggregationMethod::Max8x8,
        AggregationMethod::HighZoom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Single => "single",
            AggregationMethod::Average2x2 => "average_2x2",
            AggregationMethod::Max2x2 => "max_2x2",
            AggregationMethod::Max3x3 => "max_3x3",
            AggregationMethod::Max4x4 => "max_4x4",
            AggregationMethod::Max8x8 => "max_8x8",
            AggregationMethod::HighZoom => "high_zoom",
        }
    }

    /// Edge length of the sampled window at the working zoom.
    pub fn window_size(&self) -> u32 {
        match self {
            AggregationMethod::Single | AggregationMethod::HighZoom => 1,
            AggregationMethod::Average2x2 | AggregationMethod::Max2x2 => 2,
            AggregationMethod::Max3x3 => 3,
            AggregationMethod::Max4x4 => 4,
            AggregationMethod::Max8x8 => 8,
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = NowcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregationMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| NowcastError::UnknownMethod(s.to_string()))
    }
}

/// Intensity step of one pixel.
///
/// Transparent pixels carry no rain. Opaque pixels of an indexed tile use
/// their palette index; truecolor tiles only tell us that it rains, which
/// maps to the lowest step.
pub fn step_at(image: &TileImage, x: u32, y: u32) -> u8 {
    if image.alpha_at(x, y) == 0 {
        return 0;
    }
    image.index_at(x, y).unwrap_or(1)
}

/// First coordinate of an `n`-wide window around `t` that stays inside `size`.
fn window_start(t: u32, n: u32, size: u32) -> u32 {
    let lead = (n / 2).saturating_sub(1);
    t.saturating_sub(lead).min(size.saturating_sub(n))
}

fn window_axis(t: u32, n: u32, size: u32) -> Vec<u32> {
    let last = size.saturating_sub(1);
    match n {
        1 => vec![t.min(last)],
        3 => (t.saturating_sub(1)..=t + 1).map(|v| v.min(last)).collect(),
        _ => {
            let start = window_start(t, n, size);
            (start..start + n).map(|v| v.min(last)).collect()
        }
    }
}

fn average_axis(t: u32, size: u32) -> [u32; 2] {
    let last = size.saturating_sub(1);
    [t.min(last), (t + 1).min(last)]
}

/// Pixels a method samples around `pixel`, all within the image bounds.
pub fn sample_coords(method: AggregationMethod, pixel: PixelCoord, width: u32, height: u32) -> Vec<(u32, u32)> {
    let (xs, ys): (Vec<u32>, Vec<u32>) = match method {
        AggregationMethod::Average2x2 => (
            average_axis(pixel.px, width).to_vec(),
            average_axis(pixel.py, height).to_vec(),
        ),
        other => {
            let n = other.window_size();
            (window_axis(pixel.px, n, width), window_axis(pixel.py, n, height))
        }
    };
    ys.iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect()
}

/// Inclusive bounding box `(x0, y0, x1, y1)` of the sampled window.
pub fn sample_bounds(method: AggregationMethod, pixel: PixelCoord, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let coords = sample_coords(method, pixel, width, height);
    coords
        .iter()
        .fold((u32::MAX, u32::MAX, 0, 0), |(x0, y0, x1, y1), &(x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        })
}

/// Integer mean rounded half to even.
fn mean_half_even(sum: u32, count: u32) -> u8 {
    let q = sum / count;
    let r = sum % count;
    let twice = r * 2;
    let rounded = if twice < count {
        q
    } else if twice > count {
        q + 1
    } else {
        q + (q & 1)
    };
    rounded.min(u8::MAX as u32) as u8
}

/// Aggregate the step around `pixel` with `method`.
///
/// [`AggregationMethod::HighZoom`] reads a single pixel here; the caller is
/// responsible for handing in the finer tile.
pub fn aggregate_step(image: &TileImage, pixel: PixelCoord, method: AggregationMethod) -> u8 {
    let coords = sample_coords(method, pixel, image.width(), image.height());
    let mut steps = coords.iter().map(|&(x, y)| step_at(image, x, y));
    match method {
        AggregationMethod::Single | AggregationMethod::HighZoom => steps.next().unwrap_or(0),
        AggregationMethod::Average2x2 => {
            let sum: u32 = steps.map(u32::from).sum();
            mean_half_even(sum, coords.len().max(1) as u32)
        }
        _ => steps.max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Vec<(u8, u8, u8, u8)> {
        let mut p = vec![(0, 0, 0, 0)];
        for step in 1..=65u8 {
            p.push((step, step, step, 255));
        }
        p
    }

    fn tile(size: u32, steps: &[(u32, u32, u8)]) -> TileImage {
        let mut indices = vec![0u8; (size * size) as usize];
        for &(x, y, s) in steps {
            indices[(y * size + x) as usize] = s;
        }
        TileImage::from_indexed(size, size, indices, &palette()).unwrap()
    }

    #[test]
    fn test_method_names_roundtrip() {
        for method in AggregationMethod::ALL {
            assert_eq!(method.as_str().parse::<AggregationMethod>().unwrap(), method);
        }
        assert!(matches!(
            "median_5x5".parse::<AggregationMethod>(),
            Err(NowcastError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_method_serde_names() {
        let json = serde_json::to_string(&AggregationMethod::Max4x4).unwrap();
        assert_eq!(json, "\"max_4x4\"");
        let parsed: AggregationMethod = serde_json::from_str("\"average_2x2\"").unwrap();
        assert_eq!(parsed, AggregationMethod::Average2x2);
    }

    #[test]
    fn test_windows_stay_in_bounds_at_corners() {
        for method in AggregationMethod::ALL {
            for &(px, py) in &[(0, 0), (255, 255), (0, 255), (255, 0), (128, 3)] {
                let coords = sample_coords(method, PixelCoord::new(px, py), 256, 256);
                assert!(!coords.is_empty());
                assert!(coords.iter().all(|&(x, y)| x < 256 && y < 256), "{method} at {px},{py}");
            }
        }
    }

    #[test]
    fn test_window_shapes() {
        let center = PixelCoord::new(100, 100);
        assert_eq!(sample_bounds(AggregationMethod::Single, center, 256, 256), (100, 100, 100, 100));
        assert_eq!(sample_bounds(AggregationMethod::Average2x2, center, 256, 256), (100, 100, 101, 101));
        assert_eq!(sample_bounds(AggregationMethod::Max2x2, center, 256, 256), (100, 100, 101, 101));
        assert_eq!(sample_bounds(AggregationMethod::Max3x3, center, 256, 256), (99, 99, 101, 101));
        assert_eq!(sample_bounds(AggregationMethod::Max4x4, center, 256, 256), (99, 99, 102, 102));
        assert_eq!(sample_bounds(AggregationMethod::Max8x8, center, 256, 256), (97, 97, 104, 104));
    }

    #[test]
    fn test_windows_shift_inward_at_edge() {
        let corner = PixelCoord::new(255, 0);
        assert_eq!(sample_bounds(AggregationMethod::Max8x8, corner, 256, 256), (248, 0, 255, 7));
        assert_eq!(sample_bounds(AggregationMethod::Max3x3, corner, 256, 256), (254, 0, 255, 1));
        // The average clamps rather than shifts.
        assert_eq!(sample_bounds(AggregationMethod::Average2x2, corner, 256, 256), (255, 0, 255, 1));
    }

    #[test]
    fn test_transparent_pixel_is_zero() {
        let image = tile(8, &[]);
        for method in AggregationMethod::ALL {
            assert_eq!(aggregate_step(&image, PixelCoord::new(4, 4), method), 0);
        }
    }

    #[test]
    fn test_max_picks_neighbor() {
        let image = tile(16, &[(7, 7, 12), (9, 9, 40)]);
        let center = PixelCoord::new(8, 8);
        assert_eq!(aggregate_step(&image, center, AggregationMethod::Single), 0);
        assert_eq!(aggregate_step(&image, center, AggregationMethod::Max2x2), 40);
        assert_eq!(aggregate_step(&image, center, AggregationMethod::Max3x3), 40);
        assert_eq!(aggregate_step(&image, PixelCoord::new(6, 6), AggregationMethod::Max3x3), 12);
    }

    #[test]
    fn test_average_rounds_half_to_even() {
        // 10 + 11 + 0 + 0 = 21 -> 5.25 -> 5
        let image = tile(4, &[(0, 0, 10), (1, 0, 11)]);
        assert_eq!(aggregate_step(&image, PixelCoord::new(0, 0), AggregationMethod::Average2x2), 5);
        // 10 + 0 + 0 + 0 = 10 -> 2.5 -> 2
        let image = tile(4, &[(0, 0, 10)]);
        assert_eq!(aggregate_step(&image, PixelCoord::new(0, 0), AggregationMethod::Average2x2), 2);
        // 14 -> 3.5 -> 4
        let image = tile(4, &[(0, 0, 14)]);
        assert_eq!(aggregate_step(&image, PixelCoord::new(0, 0), AggregationMethod::Average2x2), 4);
        // 29 -> 7.25 -> 7
        let image = tile(4, &[(0, 0, 7), (1, 0, 7), (0, 1, 7), (1, 1, 8)]);
        assert_eq!(aggregate_step(&image, PixelCoord::new(0, 0), AggregationMethod::Average2x2), 7);
    }

    #[test]
    fn test_truecolor_opaque_is_step_one() {
        let image = TileImage::from_rgba(2, 1, vec![200, 0, 0, 255, 0, 0, 0, 0]).unwrap();
        assert_eq!(step_at(&image, 0, 0), 1);
        assert_eq!(step_at(&image, 1, 0), 0);
    }
}
