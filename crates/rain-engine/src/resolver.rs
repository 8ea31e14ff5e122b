//! Forecast time resolution.
//!
//! Maps a requested lead (minutes ahead) onto a concrete nowcast frame by
//! consulting the published time-index feed for the matching horizon. Feed
//! documents are cached per horizon for [`TIME_CACHE_TTL_SECS`] so that a
//! burst of estimates within one check cycle hits the network once.
//!
//! There is no fallback to a stale or synthesized time on failure: a wrong
//! frame would skew every estimate derived from it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use nowcast_common::time::clamp_lead_minutes;
use nowcast_common::{FeedKind, NowcastError, NowcastResult, TimePair};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::transport::RetryingClient;

/// How long a fetched time index stays valid.
pub const TIME_CACHE_TTL_SECS: i64 = 60;

/// A time-index document, freshest entry first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeIndex {
    /// `[{"basetime": ..., "validtime": ...}, ...]`
    Frames(Vec<TimePair>),
    /// `["basetime", ...]`
    Basetimes(Vec<String>),
}

impl TimeIndex {
    pub fn len(&self) -> usize {
        match self {
            TimeIndex::Frames(frames) => frames.len(),
            TimeIndex::Basetimes(times) => times.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the frame for an already clamped lead.
    ///
    /// Frame lists yield the entry whose validtime is closest to `target`
    /// (first one on ties). Basetime lists yield the first basetime with
    /// the lead added to form the validtime.
    pub fn select(&self, clamped_minutes: i64, target: DateTime<Utc>) -> NowcastResult<TimePair> {
        match self {
            TimeIndex::Frames(frames) => {
                let mut best: Option<(i64, &TimePair)> = None;
                for frame in frames {
                    let distance = (frame.valid_datetime()? - target).num_seconds().abs();
                    if best.map_or(true, |(d, _)| distance < d) {
                        best = Some((distance, frame));
                    }
                }
                best.map(|(_, frame)| frame.clone())
                    .ok_or_else(|| NowcastError::InternalError("empty frame list".to_string()))
            }
            TimeIndex::Basetimes(times) => {
                let basetime = times
                    .first()
                    .ok_or_else(|| NowcastError::InternalError("empty basetime list".to_string()))?;
                TimePair::from_basetime(basetime, clamped_minutes)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: DateTime<Utc>,
    payload: Arc<TimeIndex>,
}

/// One time-index document per feed kind, invalidated by age.
#[derive(Debug, Clone)]
pub struct TimeCache {
    ttl: Duration,
    entries: HashMap<FeedKind, CacheEntry>,
}

impl Default for TimeCache {
    fn default() -> Self {
        Self::new(Duration::seconds(TIME_CACHE_TTL_SECS))
    }
}

impl TimeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Cached payload if it is younger than the TTL at `now`.
    pub fn get(&self, kind: FeedKind, now: DateTime<Utc>) -> Option<Arc<TimeIndex>> {
        self.entries
            .get(&kind)
            .filter(|entry| now - entry.fetched_at < self.ttl)
            .map(|entry| Arc::clone(&entry.payload))
    }

    pub fn insert(&mut self, kind: FeedKind, fetched_at: DateTime<Utc>, payload: Arc<TimeIndex>) {
        self.entries.insert(kind, CacheEntry { fetched_at, payload });
    }
}

/// Resolves lead minutes to a (basetime, validtime) pair.
///
/// Owns the process-wide [`TimeCache`]; resolution takes `&mut self`, so
/// sharing a resolver between tasks requires wrapping it in a lock.
pub struct TimeResolver {
    client: RetryingClient,
    base_url: String,
    cache: TimeCache,
}

impl TimeResolver {
    pub fn new(client: RetryingClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: TimeCache::default(),
        }
    }

    /// URL of the time-index document for a feed.
    pub fn index_url(&self, kind: FeedKind) -> String {
        format!("{}/targetTimes_{}.json", self.base_url, kind)
    }

    /// Resolve against the current wall clock.
    pub async fn resolve(&mut self, lead_minutes: i64) -> NowcastResult<TimePair> {
        self.resolve_at(lead_minutes, Utc::now()).await
    }

    /// Resolve as if the current instant were `now`.
    #[instrument(skip(self, now), level = "debug")]
    pub async fn resolve_at(&mut self, lead_minutes: i64, now: DateTime<Utc>) -> NowcastResult<TimePair> {
        let clamped = clamp_lead_minutes(lead_minutes);
        let kind = FeedKind::for_lead(clamped);
        let index = self.time_index(kind, now).await?;

        let target = now + Duration::minutes(clamped);
        let pair = index.select(clamped, target)?;

        debug!(
            kind = %kind,
            basetime = %pair.basetime,
            validtime = %pair.validtime,
            target = %target.format("%H:%M"),
            "Resolved forecast time"
        );
        Ok(pair)
    }

    /// Cached or freshly fetched index for `kind`.
    pub async fn time_index(&mut self, kind: FeedKind, now: DateTime<Utc>) -> NowcastResult<Arc<TimeIndex>> {
        if let Some(cached) = self.cache.get(kind, now) {
            return Ok(cached);
        }

        let url = self.index_url(kind);
        debug!(kind = %kind, url = %url, "Fetching time index");
        counter!("nowcast_time_index_fetches_total", "kind" => kind.as_str()).increment(1);

        let unavailable = |message: String| NowcastError::TimeIndexUnavailable {
            kind: kind.to_string(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.is_success() {
            return Err(unavailable(format!("HTTP {}", response.status)));
        }

        let index: TimeIndex = serde_json::from_slice(&response.body)
            .map_err(|e| unavailable(format!("invalid document: {}", e)))?;
        if index.is_empty() {
            return Err(NowcastError::EmptyTimeIndex(kind.to_string()));
        }

        let payload = Arc::new(index);
        self.cache.insert(kind, now, Arc::clone(&payload));
        Ok(payload)
    }
}
