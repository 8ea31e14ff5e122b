//! Tile download with candidate URL fallback.
//!
//! The nowcast tile server has published frames under several path layouts
//! over time. A fetch walks the candidates in order: a 404 moves on to the
//! next layout, transient failures are retried by the transport layer, and
//! the first tile that downloads and decodes wins.

use metrics::counter;
use nowcast_common::{NowcastError, NowcastResult, TileCoord, TimePair};
use tile_raster::TileImage;
use tracing::{debug, instrument, warn};

use crate::transport::RetryingClient;

/// Public root of the nowcast tile tree.
pub const DEFAULT_BASE_URL: &str = "https://www.jma.go.jp/bosai/jmatile/data/nowc";

/// Candidate tile layouts, most specific first.
pub const TILE_URL_TEMPLATES: [&str; 3] = [
    "{base}/{basetime}/none/{validtime}/surf/hrpns/{z}/{x}/{y}.png",
    "{base}/{basetime}/{validtime}/surf/hrpns/{z}/{x}/{y}.png",
    "{base}/{basetime}/none/{validtime}/surf/rasrf/{z}/{x}/{y}.png",
];

/// A decoded tile and the URL it came from.
#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub image: TileImage,
    pub url: String,
}

/// Downloads and decodes nowcast tiles.
#[derive(Clone)]
pub struct TileFetcher {
    client: RetryingClient,
    base_url: String,
}

impl TileFetcher {
    pub fn new(client: RetryingClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Candidate URLs for one tile, in the order they are tried.
    pub fn candidate_urls(&self, pair: &TimePair, tile: &TileCoord) -> Vec<String> {
        TILE_URL_TEMPLATES
            .iter()
            .map(|template| {
                template
                    .replace("{base}", &self.base_url)
                    .replace("{basetime}", &pair.basetime)
                    .replace("{validtime}", &pair.validtime)
                    .replace("{z}", &tile.z.to_string())
                    .replace("{x}", &tile.x.to_string())
                    .replace("{y}", &tile.y.to_string())
            })
            .collect()
    }

    /// Fetch the first candidate that downloads and decodes.
    #[instrument(skip(self, pair, tile), fields(tile = %tile, validtime = %pair.validtime))]
    pub async fn fetch(&self, pair: &TimePair, tile: &TileCoord) -> NowcastResult<FetchedTile> {
        let mut last_error = String::from("no candidate URLs");

        for url in self.candidate_urls(pair, tile) {
            let response = match self.client.get(&url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, error = %e, "Tile request failed");
                    counter!("nowcast_tile_requests_total", "outcome" => "error").increment(1);
                    last_error = format!("{}: {}", url, e);
                    continue;
                }
            };

            if response.is_not_found() {
                debug!(url = %url, "Tile not found, trying next layout");
                counter!("nowcast_tile_requests_total", "outcome" => "not_found").increment(1);
                last_error = format!("{}: HTTP 404", url);
                continue;
            }
            if !response.is_success() {
                warn!(url = %url, status = response.status, "Tile request rejected");
                counter!("nowcast_tile_requests_total", "outcome" => "error").increment(1);
                last_error = format!("{}: HTTP {}", url, response.status);
                continue;
            }

            match TileImage::decode(&response.body) {
                Ok(image) => {
                    let (opaque, alpha_range) = image.alpha_stats();
                    debug!(
                        url = %url,
                        width = image.width(),
                        height = image.height(),
                        indexed = image.is_indexed(),
                        opaque_pixels = opaque,
                        alpha_range = ?alpha_range,
                        "Fetched tile"
                    );
                    counter!("nowcast_tile_requests_total", "outcome" => "ok").increment(1);
                    return Ok(FetchedTile { image, url });
                }
                Err(e) => {
                    let err = NowcastError::DecodeError(e.to_string());
                    warn!(url = %url, error = %err, "Tile body failed to decode");
                    counter!("nowcast_tile_requests_total", "outcome" => "decode_error").increment(1);
                    last_error = format!("{}: {}", url, err);
                }
            }
        }

        Err(NowcastError::TileFetchFailed {
            tile: tile.to_string(),
            last_error,
        })
    }
}
