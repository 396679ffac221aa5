//! The `dem-contour://` request URL grammar and the handler factory.
//!
//! Host renderers register URL-scheme handlers; the core exposes a single
//! factory that parses `dem-contour://{z}/{x}/{y}?key=value…` requests and
//! closes over a [`ContourService`]. Renderer integration itself lives
//! outside this crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::coord::TileCoord;
use crate::dem::DemDecoder;
use crate::error::ContourError;
use crate::fetch::TileFetcher;
use crate::options::ContourTileOptions;
use crate::orchestrator::ContourService;

/// URL scheme served by the handler.
pub const SCHEME: &str = "dem-contour://";

/// A parsed `dem-contour://` request.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub coord: TileCoord,
    pub options: ContourTileOptions,
}

/// Parses a `dem-contour://{z}/{x}/{y}?k=v…` URL, overlaying recognized
/// query keys onto `defaults`. Unknown keys are rejected.
pub fn parse_tile_url(
    url: &str,
    defaults: &ContourTileOptions,
) -> Result<TileRequest, ContourError> {
    let invalid = |key: &str, reason: String| ContourError::InvalidOptions {
        key: key.to_string(),
        reason,
    };

    let rest = url
        .strip_prefix(SCHEME)
        .ok_or_else(|| invalid("url", format!("expected {} scheme", SCHEME)))?;
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut segments = path.split('/');
    let mut segment = |name: &str| {
        segments
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| invalid(name, format!("bad tile path '{}'", path)))
    };
    let z = segment("z")?;
    let x = segment("x")?;
    let y = segment("y")?;
    if z > 30 {
        return Err(invalid("z", format!("zoom {} out of range", z)));
    }
    let coord = TileCoord::new(z as u8, x, y);

    let mut options = defaults.clone();
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(pair, "expected key=value".to_string()))?;
            let float = || {
                value
                    .parse::<f64>()
                    .map_err(|_| invalid(key, format!("'{}' is not a number", value)))
            };
            match key {
                "thresholds" => {
                    options.thresholds = ContourTileOptions::parse_thresholds(value)?;
                }
                "multiplier" => options.multiplier = float()?,
                "overzoom" => options.overzoom = float()? as u8,
                "buffer" => options.buffer = float()? as u32,
                "extent" => options.extent = float()? as u16,
                "subsampleBelow" => options.subsample_below = float()? as u32,
                "simplify" => options.simplify = float()?,
                "contourLayer" => options.contour_layer = value.to_string(),
                "elevationKey" => options.elevation_key = value.to_string(),
                "levelKey" => options.level_key = value.to_string(),
                "splitMode" => options.split_mode = value.parse()?,
                other => {
                    return Err(invalid(other, "unrecognized option".to_string()));
                }
            }
        }
    }

    Ok(TileRequest { coord, options })
}

/// Future returned by a protocol handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Bytes, ContourError>> + Send>>;

/// Builds the host-protocol handler: a function from request URL and
/// cancellation token to the encoded tile bytes.
pub fn make_handler<F, D>(
    service: Arc<ContourService<F, D>>,
    defaults: ContourTileOptions,
) -> impl Fn(&str, CancellationToken) -> HandlerFuture
where
    F: TileFetcher,
    D: DemDecoder,
{
    move |url: &str, cancel: CancellationToken| {
        let request = parse_tile_url(url, &defaults);
        let service = Arc::clone(&service);
        Box::pin(async move {
            let request = request?;
            service
                .fetch_contour_tile(request.coord, &request.options, &cancel)
                .await
        })
    }
}
