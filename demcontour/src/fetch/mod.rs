//! Tile fetching: the injectable HTTP port and the URL-template sources.
//!
//! The engine never talks to the network directly; it goes through the
//! [`TileFetcher`] trait so hosts can substitute their own transport and
//! tests can script responses. [`HttpTileFetcher`] is the default
//! implementation on `reqwest`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::coord::TileCoord;
use crate::dem::DemEncoding;
use crate::error::ContourError;

/// Default per-fetch deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// A fetched tile payload plus the response's caching metadata.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub bytes: Bytes,
    pub expires: Option<String>,
    pub cache_control: Option<String>,
}

impl FetchResponse {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            expires: None,
            cache_control: None,
        }
    }
}

/// Port for fetching tile bytes.
///
/// Returns `Ok(None)` when the server reports that no tile exists at the
/// requested coordinates (HTTP 404 or 204); transport and server errors map
/// to `ContourError::FetchFailed`, deadline expiry to `Timeout`, and
/// cancellation to `Cancelled`.
pub trait TileFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<FetchResponse>, ContourError>> + Send;
}

impl<T: TileFetcher> TileFetcher for Arc<T> {
    fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<FetchResponse>, ContourError>> + Send {
        T::fetch(self, url, cancel)
    }
}

/// Real fetcher backed by a pooled `reqwest` client.
#[derive(Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTileFetcher {
    /// Creates a fetcher with the given per-request deadline.
    pub fn new(timeout_ms: u64) -> Result<Self, ContourError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| ContourError::Internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl TileFetcher for HttpTileFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<FetchResponse>, ContourError> {
        let request = async {
            let response = self.client.get(url).send().await.map_err(|e| {
                ContourError::FetchFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            })?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND
                || status == reqwest::StatusCode::NO_CONTENT
            {
                debug!(url, status = status.as_u16(), "tile absent");
                return Ok(None);
            }
            if !status.is_success() {
                warn!(url, status = status.as_u16(), "tile fetch failed");
                return Err(ContourError::FetchFailed {
                    url: url.to_string(),
                    message: format!("HTTP {}", status),
                });
            }

            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let expires = header("expires");
            let cache_control = header("cache-control");

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ContourError::FetchFailed {
                    url: url.to_string(),
                    message: format!("failed to read body: {}", e),
                })?;

            Ok(Some(FetchResponse {
                bytes,
                expires,
                cache_control,
            }))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(ContourError::Cancelled),
            result = tokio::time::timeout(self.timeout, request) => match result {
                Ok(r) => r,
                Err(_) => Err(ContourError::Timeout(self.timeout.as_millis() as u64)),
            },
        }
    }
}

/// Expands a `{z}/{x}/{y}` URL template for a tile.
fn expand_template(template: &str, coord: &TileCoord) -> String {
    template
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
}

/// A raster DEM source: URL template, encoding, and supported zoom range.
#[derive(Debug, Clone)]
pub struct DemSource {
    url_pattern: String,
    encoding: DemEncoding,
    min_zoom: u8,
    max_zoom: u8,
}

impl DemSource {
    pub fn new(url_pattern: impl Into<String>, encoding: DemEncoding, max_zoom: u8) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            encoding,
            min_zoom: 0,
            max_zoom,
        }
    }

    pub fn encoding(&self) -> DemEncoding {
        self.encoding
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// URL of the DEM image for `coord`.
    pub fn tile_url(&self, coord: &TileCoord) -> String {
        expand_template(&self.url_pattern, coord)
    }
}

/// A terrain-polygon vector tile source.
///
/// Each polygon feature of `source_layer` carries a `type_key` string
/// attribute; values listed in `rock_values` / `glacier_values` select the
/// terrain classification.
#[derive(Debug, Clone)]
pub struct VectorSource {
    url_pattern: String,
    pub source_layer: String,
    pub type_key: String,
    pub glacier_values: Vec<String>,
    pub rock_values: Vec<String>,
    max_zoom: u8,
}

impl VectorSource {
    pub fn new(url_pattern: impl Into<String>, source_layer: impl Into<String>, max_zoom: u8) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            source_layer: source_layer.into(),
            type_key: "type".to_string(),
            glacier_values: vec!["ice".to_string(), "glacier".to_string()],
            rock_values: vec![
                "rock".to_string(),
                "bare_rock".to_string(),
                "scree".to_string(),
            ],
            max_zoom,
        }
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// URL of the vector tile for `coord`.
    pub fn tile_url(&self, coord: &TileCoord) -> String {
        expand_template(&self.url_pattern, coord)
    }
}
