//! demcontour - on-demand topographic contour vector tiles.
//!
//! Given a tile request `(z, x, y)` plus contour parameters, the engine
//! fetches the surrounding raster DEM tiles, stitches them into a seamless
//! elevation sampler, runs marching squares at the configured thresholds,
//! optionally simplifies and classifies the lines against terrain polygons
//! (glaciers, bare rock), and encodes the result as a Mapbox Vector Tile.
//!
//! # High-Level API
//!
//! ```ignore
//! use demcontour::dem::{DemEncoding, ImageDemDecoder};
//! use demcontour::fetch::{DemSource, HttpTileFetcher};
//! use demcontour::options::ContourTileOptions;
//! use demcontour::orchestrator::{ContourService, ContourServiceConfig};
//!
//! let dem = DemSource::new("https://dem.example.com/{z}/{x}/{y}.png",
//!                          DemEncoding::Terrarium, 12);
//! let config = ContourServiceConfig::new(dem);
//! let service = ContourService::new(
//!     config,
//!     HttpTileFetcher::new(10_000)?,
//!     ImageDemDecoder,
//! );
//!
//! let mut options = ContourTileOptions::default();
//! options.thresholds = ContourTileOptions::parse_thresholds("9*500*1000~12*100*500")?;
//! let bytes = service.fetch_contour_tile(coord, &options, &cancel).await?;
//! ```

pub mod cache;
pub mod coord;
pub mod dem;
pub mod error;
pub mod fetch;
pub mod height;
pub mod isoline;
pub mod logging;
pub mod mvt;
pub mod options;
pub mod orchestrator;
pub mod protocol;
pub mod simplify;
pub mod terrain;

/// Version of the demcontour library and CLI.
///
/// Synchronized across the workspace; injected from the manifest at compile
/// time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
