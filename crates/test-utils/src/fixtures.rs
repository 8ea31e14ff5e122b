//! Common test fixtures for nowcast decoding tests.
//!
//! Locations, agency bin colors and time-index documents that represent
//! the scenarios the decoder has to handle.

/// Reference locations as `(lat, lon)`.
pub mod locations {
    /// Mishima Station; lands in tile 10/907/405 at pixel (31, 42).
    pub const MISHIMA: (f64, f64) = (35.126475, 138.911094);

    /// Sapporo Station.
    pub const SAPPORO: (f64, f64) = (43.068661, 141.350755);

    /// Naha Airport.
    pub const NAHA: (f64, f64) = (26.195800, 127.645800);
}

/// Agency rendering colors, in bin order from weakest to strongest.
pub const BIN_COLORS: [(u8, u8, u8); 8] = [
    (242, 242, 255),
    (160, 210, 255),
    (33, 140, 255),
    (0, 65, 255),
    (250, 245, 0),
    (255, 153, 0),
    (255, 40, 0),
    (180, 0, 104),
];

/// A time-index document in record form (`{basetime, validtime}` objects).
///
/// `frames` are `(basetime, validtime)` pairs, freshest first.
pub fn record_time_index(frames: &[(&str, &str)]) -> String {
    let items: Vec<serde_json::Value> = frames
        .iter()
        .map(|(b, v)| {
            serde_json::json!({
                "basetime": b,
                "validtime": v,
                "elements": ["hrpns", "hrpns_nd"],
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

/// A time-index document in bare basetime-list form.
pub fn basetime_list_index(basetimes: &[&str]) -> String {
    serde_json::to_string(basetimes).expect("serialize basetimes")
}
