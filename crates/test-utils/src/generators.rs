//! Synthetic tile generators.
//!
//! Tiles are built as palette indices (the intensity step per pixel) and
//! encoded with the same PNG codec the decoder reads, either as an indexed
//! PNG or flattened to RGBA.

use tile_raster::png::{create_png, create_png_indexed};

use crate::fixtures::BIN_COLORS;

/// Default tile edge length.
pub const TILE_EDGE: u32 = 256;

/// Palette in the agency's style: step 0 transparent, every other step
/// colored with the bin its identity value falls into.
pub fn agency_palette() -> Vec<(u8, u8, u8, u8)> {
    let mut palette = vec![(0, 0, 0, 0)];
    for step in 1..=65u8 {
        let bin = match step {
            1 => 0,
            2..=5 => 1,
            6..=10 => 2,
            11..=20 => 3,
            21..=30 => 4,
            31..=50 => 5,
            51..=60 => 6,
            _ => 7,
        };
        let (r, g, b) = BIN_COLORS[bin];
        palette.push((r, g, b, 255));
    }
    palette
}

/// Palette whose opaque colors match none of the agency bins, forcing the
/// classifier onto the step table.
pub fn off_palette() -> Vec<(u8, u8, u8, u8)> {
    let mut palette = vec![(0, 0, 0, 0)];
    for step in 1..=65u8 {
        palette.push((step * 2, 100, 50, 255));
    }
    palette
}

/// Builder for synthetic step-encoded tiles.
#[derive(Debug, Clone)]
pub struct TileBuilder {
    width: u32,
    height: u32,
    steps: Vec<u8>,
    palette: Vec<(u8, u8, u8, u8)>,
}

impl Default for TileBuilder {
    fn default() -> Self {
        Self::transparent()
    }
}

impl TileBuilder {
    /// A fully transparent 256×256 tile using [`agency_palette`].
    pub fn transparent() -> Self {
        Self::sized(TILE_EDGE, TILE_EDGE)
    }

    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            steps: vec![0; (width * height) as usize],
            palette: agency_palette(),
        }
    }

    pub fn palette(mut self, palette: Vec<(u8, u8, u8, u8)>) -> Self {
        self.palette = palette;
        self
    }

    /// Set every pixel to `step`.
    pub fn fill(mut self, step: u8) -> Self {
        self.steps.iter_mut().for_each(|s| *s = step);
        self
    }

    /// Set a single pixel.
    pub fn step(mut self, x: u32, y: u32, step: u8) -> Self {
        let i = (y * self.width + x) as usize;
        self.steps[i] = step;
        self
    }

    /// Set a rectangle, clipped to the tile.
    pub fn rect(mut self, x0: u32, y0: u32, w: u32, h: u32, step: u8) -> Self {
        for y in y0..(y0 + h).min(self.height) {
            for x in x0..(x0 + w).min(self.width) {
                self.steps[(y * self.width + x) as usize] = step;
            }
        }
        self
    }

    /// Encode as an indexed PNG; the palette index is the step.
    pub fn to_png(&self) -> Vec<u8> {
        create_png_indexed(
            self.width as usize,
            self.height as usize,
            &self.palette,
            &self.steps,
        )
        .expect("encode indexed tile")
    }

    /// Encode as an RGBA PNG, discarding the step channel.
    pub fn to_rgba_png(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.steps.len() * 4);
        for &s in &self.steps {
            let (r, g, b, a) = self.palette[s as usize];
            rgba.extend_from_slice(&[r, g, b, a]);
        }
        create_png(&rgba, self.width as usize, self.height as usize).expect("encode rgba tile")
    }
}
