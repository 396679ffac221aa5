//! Raster DEM tiles and their RGB elevation encodings.

mod decode;

pub use decode::{DemDecoder, ImageDemDecoder};

use std::fmt;
use std::str::FromStr;

use crate::error::ContourError;

/// How a DEM image's RGB channels map to elevation in meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemEncoding {
    /// Terrarium tiles: `(R·256 + G + B/256) − 32768`.
    Terrarium,
    /// Mapbox terrain-rgb tiles: `−10000 + (R·65536 + G·256 + B)·0.1`.
    Mapbox,
}

impl DemEncoding {
    /// Decodes a single RGB pixel to an elevation in meters.
    #[inline]
    pub fn elevation(&self, r: u8, g: u8, b: u8) -> f32 {
        match self {
            DemEncoding::Terrarium => {
                (r as f32) * 256.0 + (g as f32) + (b as f32) / 256.0 - 32768.0
            }
            DemEncoding::Mapbox => {
                -10000.0
                    + ((r as f32) * 65536.0 + (g as f32) * 256.0 + (b as f32)) * 0.1
            }
        }
    }
}

impl fmt::Display for DemEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemEncoding::Terrarium => write!(f, "terrarium"),
            DemEncoding::Mapbox => write!(f, "mapbox"),
        }
    }
}

impl FromStr for DemEncoding {
    type Err = ContourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terrarium" => Ok(DemEncoding::Terrarium),
            "mapbox" => Ok(DemEncoding::Mapbox),
            other => Err(ContourError::InvalidOptions {
                key: "encoding".to_string(),
                reason: format!("unknown DEM encoding '{}'", other),
            }),
        }
    }
}

/// A decoded DEM tile: a dense row-major grid of elevations in meters.
///
/// Immutable after creation; shared between height tiles via `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct DemTile {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl DemTile {
    /// Creates a tile from a row-major elevation grid.
    ///
    /// Panics if `data.len() != width * height`.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height, "elevation grid size mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Elevation at pixel `(x, y)`, NaN outside the grid.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            f32::NAN
        } else {
            self.data[y as usize * self.width + x as usize]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrarium_encoding() {
        // 0 m: R=128, G=0, B=0 (32768 offset).
        let enc = DemEncoding::Terrarium;
        assert_eq!(enc.elevation(128, 0, 0), 0.0);
        assert_eq!(enc.elevation(0, 0, 0), -32768.0);
        // 100 m above the offset.
        assert_eq!(enc.elevation(128, 100, 0), 100.0);
        // Fractional part carried by B.
        assert_eq!(enc.elevation(128, 0, 128), 0.5);
    }

    #[test]
    fn test_mapbox_encoding() {
        let enc = DemEncoding::Mapbox;
        assert_eq!(enc.elevation(0, 0, 0), -10000.0);
        // -10000 + 100000*0.1 = 0.
        assert_eq!(enc.elevation(1, 134, 160), 0.0);
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!(
            "terrarium".parse::<DemEncoding>().unwrap(),
            DemEncoding::Terrarium
        );
        assert_eq!("mapbox".parse::<DemEncoding>().unwrap(), DemEncoding::Mapbox);
        assert!("srtm".parse::<DemEncoding>().is_err());
    }

    #[test]
    fn test_dem_tile_get() {
        let tile = DemTile::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tile.get(0, 0), 1.0);
        assert_eq!(tile.get(1, 0), 2.0);
        assert_eq!(tile.get(0, 1), 3.0);
        assert_eq!(tile.get(1, 1), 4.0);
        assert!(tile.get(-1, 0).is_nan());
        assert!(tile.get(0, 2).is_nan());
    }

    #[test]
    #[should_panic(expected = "elevation grid size mismatch")]
    fn test_dem_tile_size_mismatch() {
        DemTile::new(2, 2, vec![0.0; 3]);
    }
}
