//! `demcontour fetch` - generate a single contour tile.

use std::path::PathBuf;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use demcontour::coord::TileCoord;
use demcontour::dem::{DemEncoding, ImageDemDecoder};
use demcontour::fetch::{DemSource, HttpTileFetcher, VectorSource, DEFAULT_TIMEOUT_MS};
use demcontour::options::{ContourTileOptions, SplitMode};
use demcontour::orchestrator::{ContourService, ContourServiceConfig};

use crate::error::CliError;

#[derive(Args)]
pub struct FetchArgs {
    /// DEM URL template with {z}/{x}/{y} placeholders.
    #[arg(long)]
    pub dem_url: String,

    /// DEM RGB encoding (terrarium or mapbox).
    #[arg(long, default_value = "terrarium")]
    pub encoding: String,

    /// Maximum zoom the DEM source serves.
    #[arg(long, default_value_t = 12)]
    pub dem_max_zoom: u8,

    /// Terrain-polygon vector tile URL template (optional).
    #[arg(long)]
    pub vector_url: Option<String>,

    /// Source layer holding terrain polygons.
    #[arg(long, default_value = "landcover")]
    pub vector_layer: String,

    /// Tile zoom.
    pub z: u8,
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub y: u32,

    /// Thresholds grammar, e.g. "9*500*1000~12*100*500".
    #[arg(long, default_value = "9*500*1000~11*200*1000~13*100*500~15*20*100")]
    pub thresholds: String,

    /// Elevation multiplier (e.g. 3.28084 for feet).
    #[arg(long, default_value_t = 1.0)]
    pub multiplier: f64,

    /// Fetch the DEM this many zoom levels coarser.
    #[arg(long, default_value_t = 0)]
    pub overzoom: u8,

    /// Douglas-Peucker tolerance in tile units; 0 disables.
    #[arg(long, default_value_t = 1.0)]
    pub simplify: f64,

    /// Disable terrain splitting.
    #[arg(long)]
    pub no_split: bool,

    /// Per-fetch deadline in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Output file.
    #[arg(long, short, default_value = "tile.mvt")]
    pub output: PathBuf,
}

pub async fn run(args: FetchArgs) -> Result<(), CliError> {
    let encoding: DemEncoding = args.encoding.parse()?;
    let dem = DemSource::new(&args.dem_url, encoding, args.dem_max_zoom);
    let mut config = ContourServiceConfig::new(dem);
    if let Some(vector_url) = &args.vector_url {
        config = config.with_vector(VectorSource::new(vector_url, &args.vector_layer, 14));
    }

    let fetcher = HttpTileFetcher::new(args.timeout_ms)?;
    let service = ContourService::new(config, fetcher, ImageDemDecoder);

    let mut options = ContourTileOptions::default();
    options.thresholds = ContourTileOptions::parse_thresholds(&args.thresholds)?;
    options.multiplier = args.multiplier;
    options.overzoom = args.overzoom;
    options.simplify = args.simplify;
    if args.no_split {
        options.split_mode = SplitMode::NoSplit;
    }

    let coord = TileCoord::new(args.z, args.x, args.y);
    let cancel = CancellationToken::new();
    let bytes = service.fetch_contour_tile(coord, &options, &cancel).await?;

    info!(tile = %coord, bytes = bytes.len(), output = %args.output.display(), "tile generated");
    std::fs::write(&args.output, &bytes).map_err(|source| CliError::Output {
        path: args.output.display().to_string(),
        source,
    })?;
    println!(
        "wrote {} bytes for tile {} to {}",
        bytes.len(),
        coord,
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: FetchArgs,
    }

    #[test]
    fn test_fetch_args_parse() {
        let cli = TestCli::parse_from([
            "test",
            "--dem-url",
            "https://dem.example.com/{z}/{x}/{y}.png",
            "12",
            "2176",
            "1460",
            "--simplify",
            "2",
        ]);
        assert_eq!(cli.args.z, 12);
        assert_eq!(cli.args.x, 2176);
        assert_eq!(cli.args.y, 1460);
        assert_eq!(cli.args.simplify, 2.0);
        assert_eq!(cli.args.encoding, "terrarium");
        assert!(!cli.args.no_split);
    }
}
