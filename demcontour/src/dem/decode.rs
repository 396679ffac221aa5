//! Image decoding for raster DEM tiles.
//!
//! Decoding is an injectable port so hosts can substitute their own image
//! stack; [`ImageDemDecoder`] is the default implementation on the `image`
//! crate (PNG and WebP).

use tracing::trace;

use crate::dem::{DemEncoding, DemTile};
use crate::error::ContourError;

/// Port for turning raw image bytes into an elevation grid.
///
/// Implementations run on a blocking executor; they should be pure CPU work.
pub trait DemDecoder: Send + Sync + 'static {
    /// Decodes `bytes` (a PNG or WebP image) into a DEM tile.
    fn decode(&self, bytes: &[u8], encoding: DemEncoding) -> Result<DemTile, ContourError>;
}

/// Default decoder backed by the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct ImageDemDecoder;

impl DemDecoder for ImageDemDecoder {
    fn decode(&self, bytes: &[u8], encoding: DemEncoding) -> Result<DemTile, ContourError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ContourError::DecodeFailed(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        let mut data = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            let [r, g, b, _] = pixel.0;
            data.push(encoding.elevation(r, g, b));
        }

        trace!(width, height, %encoding, "decoded DEM tile");
        Ok(DemTile::new(width as usize, height as usize, data))
    }
}
