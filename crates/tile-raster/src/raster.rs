//! Decoded tile raster with optional palette-index channel.

use tracing::debug;

use crate::png::{self, PngError};

/// A decoded map tile.
///
/// RGBA is always available. Indexed tiles additionally keep the raw
/// palette index per pixel, which for nowcast tiles is the intensity step.
#[derive(Debug, Clone)]
pub struct TileImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    indices: Option<Vec<u8>>,
}

impl TileImage {
    /// Build a truecolor tile from RGBA bytes.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, PngError> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(PngError::Corrupt(format!(
                "{} RGBA bytes for {}x{}",
                rgba.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
            indices: None,
        })
    }

    /// Build an indexed tile from palette indices and an RGBA palette.
    pub fn from_indexed(
        width: u32,
        height: u32,
        indices: Vec<u8>,
        palette: &[(u8, u8, u8, u8)],
    ) -> Result<Self, PngError> {
        if indices.len() != width as usize * height as usize {
            return Err(PngError::Corrupt(format!(
                "{} indices for {}x{}",
                indices.len(),
                width,
                height
            )));
        }
        let mut rgba = Vec::with_capacity(indices.len() * 4);
        for &idx in &indices {
            let (r, g, b, a) = *palette
                .get(idx as usize)
                .ok_or_else(|| PngError::Corrupt(format!("palette index {} out of range", idx)))?;
            rgba.extend_from_slice(&[r, g, b, a]);
        }
        Ok(Self {
            width,
            height,
            rgba,
            indices: Some(indices),
        })
    }

    /// Decode PNG bytes, keeping palette indices for indexed tiles.
    pub fn decode(bytes: &[u8]) -> Result<Self, PngError> {
        let decoded = png::decode(bytes)?;
        debug!(
            width = decoded.width,
            height = decoded.height,
            indexed = decoded.indices.is_some(),
            "Decoded tile"
        );
        Ok(Self {
            width: decoded.width,
            height: decoded.height,
            rgba: decoded.rgba,
            indices: decoded.indices,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the tile carries a palette-index channel.
    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// RGBA bytes, row-major.
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    /// RGBA at a pixel. Coordinates must lie inside the image.
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.rgba_at(x, y)[3]
    }

    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let [r, g, b, _] = self.rgba_at(x, y);
        [r, g, b]
    }

    /// Palette index at a pixel, or `None` for truecolor tiles.
    pub fn index_at(&self, x: u32, y: u32) -> Option<u8> {
        let i = self.offset(x, y);
        self.indices.as_ref().map(|idx| idx[i])
    }

    /// Count of pixels with non-zero alpha and the (min, max) alpha among them.
    pub fn alpha_stats(&self) -> (usize, Option<(u8, u8)>) {
        let mut count = 0;
        let mut range: Option<(u8, u8)> = None;
        for px in self.rgba.chunks_exact(4) {
            let a = px[3];
            if a == 0 {
                continue;
            }
            count += 1;
            range = Some(match range {
                None => (a, a),
                Some((lo, hi)) => (lo.min(a), hi.max(a)),
            });
        }
        (count, range)
    }
}
