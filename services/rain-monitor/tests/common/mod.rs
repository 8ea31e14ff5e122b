//! Common test utilities for rain-monitor integration tests
//!
//! A URL-substring transport for the tile feed and a notifier that records
//! what it was asked to send.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use nowcast_common::NowcastResult;
use rain_engine::{HttpResponse, Transport};
use rain_monitor::config::{LocationConfig, MonitorConfig};
use rain_monitor::Notifier;

/// Base URL used by every scripted route.
pub const BASE_URL: &str = "https://nowcast.test/nowc";

/// Serves fixed bodies for URLs containing a pattern; anything else is 404.
#[derive(Clone, Default)]
pub struct FeedTransport {
    routes: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FeedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, pattern: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.routes.lock().unwrap().push((pattern.to_string(), body.into()));
        self
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.contains(pattern)).count()
    }

    pub fn as_transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Transport for FeedTransport {
    async fn get(&self, url: &str) -> NowcastResult<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        let routes = self.routes.lock().unwrap();
        match routes.iter().find(|(pattern, _)| url.contains(pattern.as_str())) {
            Some((_, body)) => Ok(HttpResponse::new(200, Bytes::from(body.clone()))),
            None => Ok(HttpResponse::new(404, Bytes::new())),
        }
    }
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Notifier that keeps every message.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub fn location(name: &str, (lat, lon): (f64, f64), email_to: &str) -> LocationConfig {
    LocationConfig {
        name: name.to_string(),
        lat,
        lon,
        email_to: email_to.to_string(),
        ..LocationConfig::default()
    }
}

/// Enabled config against [`BASE_URL`] with no retries and no heartbeat.
pub fn test_config(snapshot_dir: &std::path::Path, locations: Vec<LocationConfig>) -> MonitorConfig {
    let mut config = MonitorConfig {
        locations,
        ..MonitorConfig::default()
    };
    config.monitoring.enabled = true;
    config.heartbeat.enabled = false;
    config.source.base_url = BASE_URL.to_string();
    config.source.max_retries = 0;
    config.source.backoff_ms = 0;
    config.source.snapshot_dir = snapshot_dir.to_path_buf();
    config
}
