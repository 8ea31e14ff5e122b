//! Slippy-map tile math.
//!
//! Converts geographic coordinates into the (z, x, y) tile that contains
//! them and the pixel inside that 256×256 tile, using the standard Web
//! Mercator tiling scheme.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tile edge length in pixels.
pub const TILE_SIZE: u32 = 256;

/// Ground resolution at the equator for zoom 0, in meters per pixel.
const EQUATOR_METERS_PER_PIXEL: f64 = 156_543.033_92;

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Continuous tile-space position `(x, y)` at the given zoom.
    ///
    /// The integer part is the tile index and the fractional part the
    /// position inside the tile.
    pub fn tile_position(&self, zoom: u32) -> (f64, f64) {
        let n = 2f64.powi(zoom as i32);
        let lat_rad = self.lat.to_radians();
        let x = (self.lon + 180.0) / 360.0 * n;
        let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;
        (x, y)
    }

    /// The tile containing this point.
    pub fn to_tile(&self, zoom: u32) -> TileCoord {
        let (x, y) = self.tile_position(zoom);
        TileCoord::new(zoom, x.floor() as u32, y.floor() as u32)
    }

    /// The pixel inside [`GeoCoord::to_tile`] that contains this point.
    pub fn to_pixel(&self, zoom: u32) -> PixelCoord {
        let (x, y) = self.tile_position(zoom);
        PixelCoord::new(fraction_to_pixel(x), fraction_to_pixel(y))
    }

    /// Ground distance covered by one pixel at this latitude.
    pub fn meters_per_pixel(&self, zoom: u32) -> f64 {
        meters_per_pixel(self.lat, zoom)
    }
}

fn fraction_to_pixel(v: f64) -> u32 {
    let offset = ((v - v.floor()) * TILE_SIZE as f64).floor() as u32;
    offset.min(TILE_SIZE - 1)
}

/// Meters per pixel for a tile rendered at `zoom`, corrected for latitude.
pub fn meters_per_pixel(lat: f64, zoom: u32) -> f64 {
    EQUATOR_METERS_PER_PIXEL * lat.to_radians().cos() / 2f64.powi(zoom as i32)
}

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// `z/x/y` path fragment, as used in tile URLs and log fields.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}

/// A pixel position inside a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub px: u32,
    pub py: u32,
}

impl PixelCoord {
    pub fn new(px: u32, py: u32) -> Self {
        Self { px, py }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISHIMA: GeoCoord = GeoCoord {
        lat: 35.126475,
        lon: 138.911094,
    };

    #[test]
    fn test_tile_for_known_point() {
        assert_eq!(MISHIMA.to_tile(10), TileCoord::new(10, 907, 405));
        assert_eq!(MISHIMA.to_pixel(10), PixelCoord::new(31, 42));
    }

    #[test]
    fn test_origin_tile() {
        let origin = GeoCoord::new(0.0, 0.0);
        assert_eq!(origin.to_tile(1), TileCoord::new(1, 1, 1));
        assert_eq!(origin.to_pixel(1), PixelCoord::new(0, 0));
    }

    #[test]
    fn test_meters_per_pixel() {
        assert!((meters_per_pixel(0.0, 0) - 156_543.033_92).abs() < 1e-6);
        let mpp = MISHIMA.meters_per_pixel(10);
        assert!((mpp - 125.033).abs() < 0.01, "got {}", mpp);
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(TileCoord::new(10, 907, 405).cache_key(), "10/907/405");
    }
}
