//! Raster access for nowcast map tiles.
//!
//! - [`png`]: PNG decode that keeps palette indices, plus tile encoders
//! - [`raster`]: [`TileImage`], pixel accessors used by the intensity decoder

pub mod png;
pub mod raster;

pub use png::PngError;
pub use raster::TileImage;
