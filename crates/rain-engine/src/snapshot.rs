//! Annotated debug snapshots of decoded tiles.
//!
//! Each snapshot is the fetched tile with a cross on the target pixel, a
//! banner strip and the outline of the aggregation window, written as PNG
//! for manual calibration against the agency's viewer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use nowcast_common::{NowcastError, NowcastResult, PixelCoord, TileCoord};
use tile_raster::png::create_png;
use tile_raster::TileImage;
use tracing::{debug, info};

use crate::decoder::{sample_bounds, AggregationMethod};

const LINE_THICKNESS: i32 = 4;
const CROSS_HALF: i32 = 6;
const BANNER_WIDTH: u32 = 360;
const BANNER_HEIGHT: u32 = 17;

const CROSS_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BANNER_COLOR: Rgba<u8> = Rgba([0, 0, 0, 160]);

/// What a snapshot depicts.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub validtime: String,
    pub method: AggregationMethod,
    pub tile: TileCoord,
    pub pixel: PixelCoord,
    pub step: u8,
    pub mm_per_hour: f64,
}

impl SnapshotInfo {
    /// Caption describing the decoded value.
    pub fn caption(&self) -> String {
        format!(
            "{} px={},py={} step={} ({:.1}mm/h)",
            self.method, self.pixel.px, self.pixel.py, self.step, self.mm_per_hour
        )
    }
}

/// Outline color for a method's window, if it has one.
fn window_color(method: AggregationMethod) -> Option<Rgba<u8>> {
    match method {
        AggregationMethod::Average2x2 | AggregationMethod::Max2x2 => Some(Rgba([255, 0, 255, 255])),
        AggregationMethod::Max3x3 => Some(Rgba([0, 255, 255, 255])),
        AggregationMethod::Max4x4 => Some(Rgba([0, 255, 0, 255])),
        AggregationMethod::Max8x8 => Some(Rgba([0, 0, 255, 255])),
        AggregationMethod::Single | AggregationMethod::HighZoom => None,
    }
}

/// Writes annotated tiles into a directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `tile_{stamp}_{validtime}_{method}_z{z}_x{x}_y{y}_px{px}_py{py}.png`
    pub fn file_name(info: &SnapshotInfo, stamp: DateTime<Local>) -> String {
        format!(
            "tile_{}_{}_{}_z{}_x{}_y{}_px{}_py{}.png",
            stamp.format("%Y%m%d_%H%M%S"),
            info.validtime,
            info.method,
            info.tile.z,
            info.tile.x,
            info.tile.y,
            info.pixel.px,
            info.pixel.py
        )
    }

    /// Draw the overlay onto a copy of the tile.
    pub fn render(image: &TileImage, info: &SnapshotInfo) -> RgbaImage {
        let (w, h) = (image.width(), image.height());
        let mut canvas = RgbaImage::from_raw(w, h, image.rgba().to_vec())
            .unwrap_or_else(|| RgbaImage::new(w, h));

        let banner = Rect::at(0, 0).of_size(BANNER_WIDTH.min(w).max(1), BANNER_HEIGHT.min(h).max(1));
        draw_filled_rect_mut(&mut canvas, banner, BANNER_COLOR);

        let (cx, cy) = (info.pixel.px as i32, info.pixel.py as i32);
        let span = (CROSS_HALF * 2 + 1) as u32;
        let half_line = LINE_THICKNESS / 2;
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(cx - CROSS_HALF, cy - half_line).of_size(span, LINE_THICKNESS as u32),
            CROSS_COLOR,
        );
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(cx - half_line, cy - CROSS_HALF).of_size(LINE_THICKNESS as u32, span),
            CROSS_COLOR,
        );

        if let Some(color) = window_color(info.method) {
            let (x0, y0, x1, y1) = sample_bounds(info.method, info.pixel, w, h);
            // Rings grow outward from the window edge.
            for i in 0..LINE_THICKNESS {
                let rect = Rect::at(x0 as i32 - i, y0 as i32 - i)
                    .of_size(x1 - x0 + 1 + 2 * i as u32, y1 - y0 + 1 + 2 * i as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }
        canvas
    }

    /// Render and write a snapshot, returning its path.
    pub async fn write(&self, image: &TileImage, info: &SnapshotInfo) -> NowcastResult<PathBuf> {
        let canvas = Self::render(image, info);
        let png = create_png(canvas.as_raw(), canvas.width() as usize, canvas.height() as usize)
            .map_err(NowcastError::InternalError)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(info, Local::now()));
        tokio::fs::write(&path, &png).await?;

        debug!(caption = %info.caption(), "Snapshot caption");
        info!(path = ?path, bytes = png.len(), "Saved decode snapshot");
        Ok(path)
    }
}
