//! Common test utilities for rain-engine integration tests
//!
//! Provides an in-memory [`Transport`] that answers by URL substring, so
//! tests can script time-index documents, tiles and failure sequences
//! without a network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use nowcast_common::{NowcastError, NowcastResult};
use rain_engine::{HttpResponse, Transport};

/// Base URL used by every scripted route.
pub const BASE_URL: &str = "https://nowcast.test/nowc";

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Status with an empty body
    Status(u16),
    /// 200 with a body
    Body(Vec<u8>),
    /// Transport-level timeout
    Timeout,
}

impl FakeReply {
    pub fn json(doc: impl Into<String>) -> Self {
        FakeReply::Body(doc.into().into_bytes())
    }

    fn to_outcome(&self) -> NowcastResult<HttpResponse> {
        match self {
            FakeReply::Status(status) => Ok(HttpResponse::new(*status, Bytes::new())),
            FakeReply::Body(body) => Ok(HttpResponse::new(200, Bytes::from(body.clone()))),
            FakeReply::Timeout => Err(NowcastError::Timeout("scripted timeout".to_string())),
        }
    }
}

struct Route {
    pattern: String,
    replies: Vec<FakeReply>,
    served: usize,
}

#[derive(Default)]
struct State {
    routes: Vec<Route>,
    calls: Vec<String>,
}

/// Scripted transport.
///
/// The first route whose pattern is a substring of the URL answers. A route
/// plays its replies in order and then keeps repeating the last one.
/// Unmatched URLs get a 404.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer URLs containing `pattern` with `replies`.
    pub fn route(&self, pattern: &str, replies: Vec<FakeReply>) -> &Self {
        self.state.lock().unwrap().routes.push(Route {
            pattern: pattern.to_string(),
            replies,
            served: 0,
        });
        self
    }

    /// Every URL requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|url| url.contains(pattern)).count()
    }

    pub fn as_transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str) -> NowcastResult<HttpResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(url.to_string());
        let reply = state
            .routes
            .iter_mut()
            .find(|route| url.contains(&route.pattern))
            .and_then(|route| {
                let index = route.served.min(route.replies.len().saturating_sub(1));
                route.served += 1;
                route.replies.get(index).cloned()
            });
        match reply {
            Some(reply) => reply.to_outcome(),
            None => Ok(HttpResponse::new(404, Bytes::new())),
        }
    }
}
