//! Tests for tile download, URL fallback and transport retry.

mod common;

use std::time::Duration;

use common::{FakeReply, FakeTransport, BASE_URL};
use nowcast_common::{NowcastError, TileCoord, TimePair};
use rain_engine::{RetryPolicy, RetryingClient, TileFetcher};
use test_utils::generators::TileBuilder;

const TILE: TileCoord = TileCoord { z: 10, x: 907, y: 405 };

fn pair() -> TimePair {
    TimePair::new("20250806120000", "20250806123000")
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        backoff_base: Duration::ZERO,
    }
}

fn fetcher(fake: &FakeTransport, policy: RetryPolicy) -> TileFetcher {
    TileFetcher::new(RetryingClient::new(fake.as_transport(), policy), BASE_URL)
}

fn rain_tile() -> Vec<u8> {
    TileBuilder::transparent().rect(20, 30, 20, 20, 12).to_png()
}

#[tokio::test]
async fn test_first_layout_wins() {
    let fake = FakeTransport::new();
    fake.route("/none/20250806123000/surf/hrpns/", vec![FakeReply::Body(rain_tile())]);

    let fetched = fetcher(&fake, RetryPolicy::none()).fetch(&pair(), &TILE).await.unwrap();
    assert_eq!(
        fetched.url,
        format!("{}/20250806120000/none/20250806123000/surf/hrpns/10/907/405.png", BASE_URL)
    );
    assert_eq!(fetched.image.index_at(31, 42), Some(12));
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn test_not_found_falls_through_in_order() {
    let fake = FakeTransport::new();
    fake.route("/surf/rasrf/", vec![FakeReply::Body(rain_tile())]);

    let fetched = fetcher(&fake, RetryPolicy::none()).fetch(&pair(), &TILE).await.unwrap();
    assert!(fetched.url.contains("/surf/rasrf/"));

    let calls = fake.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].contains("/none/20250806123000/surf/hrpns/"));
    assert!(calls[1].contains("/20250806120000/20250806123000/surf/hrpns/"));
    assert!(calls[2].contains("/surf/rasrf/"));
}

#[tokio::test]
async fn test_retry_then_success_on_same_url() {
    let fake = FakeTransport::new();
    fake.route(
        "/none/20250806123000/surf/hrpns/",
        vec![
            FakeReply::Status(429),
            FakeReply::Status(502),
            FakeReply::Body(rain_tile()),
        ],
    );

    let fetched = fetcher(&fake, fast_retry()).fetch(&pair(), &TILE).await.unwrap();
    assert!(fetched.url.contains("/none/"));
    assert_eq!(fake.calls().len(), 3);
}

#[tokio::test]
async fn test_all_missing_is_aggregated_failure() {
    let fake = FakeTransport::new();

    let err = fetcher(&fake, fast_retry()).fetch(&pair(), &TILE).await.unwrap_err();
    match err {
        NowcastError::TileFetchFailed { tile, last_error } => {
            assert_eq!(tile, "10/907/405");
            assert!(last_error.contains("rasrf"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // 404 is never retried
    assert_eq!(fake.calls().len(), 3);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_retries() {
    let fake = FakeTransport::new();
    fake.route("nowcast.test", vec![FakeReply::Status(500)]);

    let err = fetcher(&fake, fast_retry()).fetch(&pair(), &TILE).await.unwrap_err();
    assert!(matches!(err, NowcastError::TileFetchFailed { ref last_error, .. } if last_error.contains("500")));
    // 1 attempt + 3 retries per candidate
    assert_eq!(fake.calls().len(), 12);
}

#[tokio::test]
async fn test_timeouts_are_retried() {
    let fake = FakeTransport::new();
    fake.route(
        "/none/20250806123000/surf/hrpns/",
        vec![FakeReply::Timeout, FakeReply::Body(rain_tile())],
    );

    let fetched = fetcher(&fake, fast_retry()).fetch(&pair(), &TILE).await.unwrap();
    assert!(fetched.url.contains("/none/"));
    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn test_undecodable_body_moves_to_next_layout() {
    let fake = FakeTransport::new();
    fake.route("/none/20250806123000/surf/hrpns/", vec![FakeReply::Body(b"<html>busy</html>".to_vec())]);
    fake.route("/20250806120000/20250806123000/", vec![FakeReply::Body(rain_tile())]);

    let fetched = fetcher(&fake, RetryPolicy::none()).fetch(&pair(), &TILE).await.unwrap();
    assert!(!fetched.url.contains("/none/"));
    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn test_undecodable_everywhere_reports_decode_failure() {
    let fake = FakeTransport::new();
    fake.route("nowcast.test", vec![FakeReply::Body(b"<html>maintenance</html>".to_vec())]);

    let err = fetcher(&fake, fast_retry()).fetch(&pair(), &TILE).await.unwrap_err();
    match err {
        NowcastError::TileFetchFailed { last_error, .. } => {
            assert!(last_error.contains("/surf/rasrf/"), "got {last_error}");
            assert!(last_error.contains("Tile decode failed"), "got {last_error}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Decode failures are not retried
    assert_eq!(fake.calls().len(), 3);
}
