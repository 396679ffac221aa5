//! End-to-end orchestration of one contour tile request.
//!
//! [`ContourService`] owns the shared caches and composes the pipeline:
//! fetch the 3×3 DEM neighborhood (deduplicated and cancellable), stitch and
//! resample a height grid, extract isolines, simplify, classify against
//! terrain polygons, and encode the MVT. Everything past the fetches is pure
//! compute and can be offloaded to the blocking executor.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cache::{AsyncCache, DEFAULT_CACHE_CAPACITY};
use crate::coord::TileCoord;
use crate::dem::{DemDecoder, DemTile};
use crate::error::ContourError;
use crate::fetch::{DemSource, FetchResponse, TileFetcher, VectorSource};
use crate::height::HeightTile;
use crate::isoline::{generate_isolines, IsolineSet};
use crate::mvt::{encode_contour_tile, parse_terrain_polygons};
use crate::options::{ContourTileOptions, SplitMode};
use crate::simplify::simplify_lines;
use crate::terrain::{preprocess_polygons, split_contours, PolygonSimplification, TerrainPolygon};

/// Construction-time configuration of a [`ContourService`].
pub struct ContourServiceConfig {
    /// The raster DEM source.
    pub dem: DemSource,
    /// Optional terrain-polygon source; without one, splitting is skipped.
    pub vector: Option<VectorSource>,
    /// Capacity of each shared cache.
    pub cache_capacity: usize,
    /// Offload compute to the blocking executor (on by default); when off,
    /// the request task computes cooperatively.
    pub background_compute: bool,
    /// How terrain polygons are approximated before splitting.
    pub polygon_simplification: PolygonSimplification,
}

impl ContourServiceConfig {
    pub fn new(dem: DemSource) -> Self {
        Self {
            dem,
            vector: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            background_compute: true,
            polygon_simplification: PolygonSimplification::default(),
        }
    }

    pub fn with_vector(mut self, vector: VectorSource) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// Serves contour tile requests end-to-end.
///
/// Cloning is cheap; clones share the caches, so concurrent requests for
/// the same resources coalesce.
pub struct ContourService<F, D> {
    fetcher: Arc<F>,
    decoder: Arc<D>,
    dem: Arc<DemSource>,
    vector: Option<Arc<VectorSource>>,
    background_compute: bool,
    polygon_simplification: PolygonSimplification,
    raw_cache: Arc<AsyncCache<Option<FetchResponse>>>,
    dem_cache: Arc<AsyncCache<Option<Arc<DemTile>>>>,
    polygon_cache: Arc<AsyncCache<Arc<Vec<TerrainPolygon>>>>,
    result_cache: Arc<AsyncCache<Bytes>>,
}

impl<F, D> Clone for ContourService<F, D> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            decoder: Arc::clone(&self.decoder),
            dem: Arc::clone(&self.dem),
            vector: self.vector.clone(),
            background_compute: self.background_compute,
            polygon_simplification: self.polygon_simplification,
            raw_cache: Arc::clone(&self.raw_cache),
            dem_cache: Arc::clone(&self.dem_cache),
            polygon_cache: Arc::clone(&self.polygon_cache),
            result_cache: Arc::clone(&self.result_cache),
        }
    }
}

impl<F, D> ContourService<F, D>
where
    F: TileFetcher,
    D: DemDecoder,
{
    pub fn new(config: ContourServiceConfig, fetcher: F, decoder: D) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            decoder: Arc::new(decoder),
            dem: Arc::new(config.dem),
            vector: config.vector.map(Arc::new),
            background_compute: config.background_compute,
            polygon_simplification: config.polygon_simplification,
            raw_cache: Arc::new(AsyncCache::new(config.cache_capacity)),
            dem_cache: Arc::new(AsyncCache::new(config.cache_capacity)),
            polygon_cache: Arc::new(AsyncCache::new(config.cache_capacity)),
            result_cache: Arc::new(AsyncCache::new(config.cache_capacity)),
        }
    }

    /// Produces the encoded contour tile for `coord`.
    ///
    /// Returns an empty buffer when no thresholds apply at this zoom or the
    /// center DEM tile is absent. Results are cached under the canonical
    /// option key; concurrent identical requests share one computation.
    #[instrument(skip(self, options, cancel), fields(tile = %coord))]
    pub async fn fetch_contour_tile(
        &self,
        coord: TileCoord,
        options: &ContourTileOptions,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ContourError> {
        if options.thresholds_for(coord.z).is_none() {
            debug!("no thresholds at this zoom");
            return Ok(Bytes::new());
        }

        let key = options.cache_key(&coord);
        let service = self.clone();
        let options = options.clone();
        self.result_cache
            .get(
                &key,
                move |_, token| async move { service.generate_tile(coord, options, token).await },
                cancel,
            )
            .await
    }

    /// Runs the full pipeline once; results are fanned out by the cache.
    async fn generate_tile(
        self,
        coord: TileCoord,
        options: ContourTileOptions,
        cancel: CancellationToken,
    ) -> Result<Bytes, ContourError> {
        let thresholds: Vec<f64> = options
            .thresholds_for(coord.z)
            .expect("thresholds checked by caller")
            .to_vec();

        // Overzoom: fetch a coarser ancestor when the request is deeper
        // than the source (or asked for explicitly).
        let dem_z = coord
            .z
            .saturating_sub(options.overzoom)
            .min(self.dem.max_zoom());
        let sub_z = coord.z - dem_z;
        let ancestor = coord.ancestor(sub_z);
        let (sub_x, sub_y) = coord.offset_in_ancestor(sub_z);

        let fetches = ancestor.neighborhood().into_iter().map(|slot| {
            let service = self.clone();
            let token = cancel.clone();
            async move {
                match slot {
                    Some(neighbor) => service.dem_tile(neighbor, &token).await,
                    None => Ok(None),
                }
            }
        });
        let results = futures::future::join_all(fetches).await;

        let mut tiles: [Option<Arc<DemTile>>; 9] = Default::default();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(tile) => tiles[i] = tile,
                Err(e @ (ContourError::Cancelled | ContourError::Timeout(_))) if i == 4 => {
                    return Err(e);
                }
                Err(e) if i == 4 => {
                    warn!(error = %e, "center DEM tile failed, returning empty tile");
                    return Ok(Bytes::new());
                }
                Err(e) => {
                    debug!(error = %e, neighbor = i, "neighbor DEM unavailable");
                }
            }
        }
        if tiles[4].is_none() {
            debug!("center DEM tile absent");
            return Ok(Bytes::new());
        }

        // Terrain polygons come from the companion vector tile at the
        // request coordinates, fetched before the compute hop.
        let polygons = match (&self.vector, options.split_mode) {
            (Some(vector), SplitMode::Classic) if coord.z <= vector.max_zoom() => {
                self.terrain_polygons(coord, &cancel).await?
            }
            _ => Arc::new(Vec::new()),
        };

        if cancel.is_cancelled() {
            return Err(ContourError::Cancelled);
        }

        let simplification = self.polygon_simplification;
        let compute = move || {
            compute_tile(
                tiles,
                sub_z,
                sub_x,
                sub_y,
                coord.z,
                &thresholds,
                &options,
                &polygons,
                simplification,
            )
        };
        if self.background_compute {
            tokio::task::spawn_blocking(compute)
                .await
                .map_err(|e| ContourError::Internal(format!("compute task failed: {}", e)))?
        } else {
            compute()
        }
    }

    /// Decoded DEM tile for `coord`, deduplicated across requests.
    async fn dem_tile(
        &self,
        coord: TileCoord,
        parent: &CancellationToken,
    ) -> Result<Option<Arc<DemTile>>, ContourError> {
        let url = self.dem.tile_url(&coord);
        let service = self.clone();
        self.dem_cache
            .get(
                &url,
                move |url, token| async move {
                    let Some(response) = service.raw_tile(url, &token).await? else {
                        return Ok(None);
                    };
                    if token.is_cancelled() {
                        return Err(ContourError::Cancelled);
                    }
                    let decoder = Arc::clone(&service.decoder);
                    let encoding = service.dem.encoding();
                    let tile = tokio::task::spawn_blocking(move || {
                        decoder.decode(&response.bytes, encoding)
                    })
                    .await
                    .map_err(|e| ContourError::Internal(format!("decode task failed: {}", e)))??;
                    Ok(Some(Arc::new(tile)))
                },
                parent,
            )
            .await
    }

    /// Raw response bytes for `url`, deduplicated across requests.
    async fn raw_tile(
        &self,
        url: String,
        parent: &CancellationToken,
    ) -> Result<Option<FetchResponse>, ContourError> {
        let fetcher = Arc::clone(&self.fetcher);
        self.raw_cache
            .get(
                &url,
                move |url, token| async move { fetcher.fetch(&url, &token).await },
                parent,
            )
            .await
    }

    /// Parsed terrain polygons for `coord`; parse failures degrade to an
    /// empty set.
    async fn terrain_polygons(
        &self,
        coord: TileCoord,
        parent: &CancellationToken,
    ) -> Result<Arc<Vec<TerrainPolygon>>, ContourError> {
        let vector = self.vector.as_ref().expect("vector source configured");
        let url = vector.tile_url(&coord);
        let service = self.clone();
        self.polygon_cache
            .get(
                &url,
                move |url, token| async move {
                    let vector = service.vector.as_ref().expect("vector source configured");
                    match service.raw_tile(url, &token).await {
                        Ok(Some(response)) => {
                            Ok(Arc::new(parse_terrain_polygons(&response.bytes, vector)))
                        }
                        Ok(None) => Ok(Arc::new(Vec::new())),
                        Err(e @ (ContourError::Cancelled | ContourError::Timeout(_))) => Err(e),
                        Err(e) => {
                            warn!(error = %e, "terrain tile fetch failed, splitting skipped");
                            Ok(Arc::new(Vec::new()))
                        }
                    }
                },
                parent,
            )
            .await
    }
}

/// The pure-compute tail of the pipeline (steps past the fetches).
#[allow(clippy::too_many_arguments)]
fn compute_tile(
    tiles: [Option<Arc<DemTile>>; 9],
    sub_z: u8,
    sub_x: u32,
    sub_y: u32,
    z: u8,
    thresholds: &[f64],
    options: &ContourTileOptions,
    polygons: &[TerrainPolygon],
    simplification: PolygonSimplification,
) -> Result<Bytes, ContourError> {
    let Some(stitched) = HeightTile::combine_neighbors(tiles) else {
        return Ok(Bytes::new());
    };
    let mut tile = stitched.split(sub_z, sub_x, sub_y);

    if (tile.width() as u32) >= options.subsample_below {
        tile = tile.materialize(2);
    } else {
        while (tile.width() as u32) < options.subsample_below {
            tile = tile.subsample_pixel_centers(2).materialize(2);
        }
    }

    let grid = tile
        .average_pixel_centers_to_grid()
        .scale_elevation(options.multiplier as f32)
        .materialize(1);

    let mut lines = generate_isolines(thresholds[0], &grid, options.extent, options.buffer);
    if options.simplify > 0.0 {
        lines = simplify_lines(lines, options.simplify, options.extent);
    }

    let set = if options.split_mode == SplitMode::Classic && !polygons.is_empty() {
        let indexed = preprocess_polygons(polygons.to_vec(), z, simplification);
        IsolineSet::Classified(split_contours(lines, &indexed, options.extent, z))
    } else {
        IsolineSet::Unclassified(lines)
    };

    Ok(Bytes::from(encode_contour_tile(&set, thresholds, options)))
}
