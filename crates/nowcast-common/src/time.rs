//! Forecast time handling for nowcast frames.
//!
//! Feeds publish times as fixed 14-digit UTC strings (`YYYYmmddHHMMSS`).

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{NowcastError, NowcastResult};

/// Timestamp layout used by the time-index feeds and tile URLs.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Longest lead the nowcast publishes, in minutes.
pub const MAX_LEAD_MINUTES: i64 = 60;

/// Lead times are published on a 5-minute grid.
pub const LEAD_STEP_MINUTES: i64 = 5;

/// Parse a 14-digit feed timestamp as UTC.
pub fn parse_timestamp(s: &str) -> NowcastResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|_| NowcastError::InvalidTimestamp(s.to_string()))
}

/// Format a UTC instant as a 14-digit feed timestamp.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Round a requested lead to the 5-minute grid and clamp it to [0, 60].
pub fn clamp_lead_minutes(lead_minutes: i64) -> i64 {
    let rounded = (lead_minutes as f64 / LEAD_STEP_MINUTES as f64).round() as i64 * LEAD_STEP_MINUTES;
    rounded.clamp(0, MAX_LEAD_MINUTES)
}

/// The two forecast horizons, published as separate time-index feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedKind {
    /// Analysis / current frame.
    N1,
    /// Forecast frames up to an hour ahead.
    N2,
}

impl FeedKind {
    /// Feed to consult for an already clamped lead.
    pub fn for_lead(clamped_minutes: i64) -> Self {
        if clamped_minutes == 0 {
            FeedKind::N1
        } else {
            FeedKind::N2
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::N1 => "N1",
            FeedKind::N2 => "N2",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuance and target time of one nowcast frame.
///
/// `validtime >= basetime` holds for every frame with a non-negative lead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimePair {
    pub basetime: String,
    pub validtime: String,
}

impl TimePair {
    pub fn new(basetime: impl Into<String>, validtime: impl Into<String>) -> Self {
        Self {
            basetime: basetime.into(),
            validtime: validtime.into(),
        }
    }

    /// Build a pair from a basetime and a lead in minutes.
    pub fn from_basetime(basetime: &str, lead_minutes: i64) -> NowcastResult<Self> {
        let base = parse_timestamp(basetime)?;
        let valid = base + Duration::minutes(lead_minutes);
        Ok(Self::new(basetime, format_timestamp(valid)))
    }

    pub fn valid_datetime(&self) -> NowcastResult<DateTime<Utc>> {
        parse_timestamp(&self.validtime)
    }

    /// Valid time expressed in the observer's local offset.
    pub fn valid_local(&self, offset: FixedOffset) -> NowcastResult<DateTime<FixedOffset>> {
        Ok(self.valid_datetime()?.with_timezone(&offset))
    }
}
