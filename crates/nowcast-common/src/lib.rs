//! Common types and utilities shared across the nowcast rainfall crates.

pub mod error;
pub mod geo;
pub mod time;

pub use error::{NowcastError, NowcastResult};
pub use geo::{GeoCoord, PixelCoord, TileCoord, TILE_SIZE};
pub use time::{FeedKind, TimePair};
