//! Request-scoped contour tile options.
//!
//! Options arrive either programmatically or as query parameters of the
//! `dem-contour://` URL grammar. Two option sets that are semantically equal
//! must produce the same canonical cache key, so serialization sorts keys
//! and stringifies values deterministically.

use std::fmt;
use std::str::FromStr;

use crate::coord::TileCoord;
use crate::error::ContourError;

/// Tolerance for float divisibility checks on elevation thresholds.
const DIVISIBILITY_EPSILON: f64 = 1e-9;

/// Whether contour lines are split against terrain polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    #[default]
    Classic,
    NoSplit,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Classic => write!(f, "classic"),
            SplitMode::NoSplit => write!(f, "no-split"),
        }
    }
}

impl FromStr for SplitMode {
    type Err = ContourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(SplitMode::Classic),
            "no-split" => Ok(SplitMode::NoSplit),
            other => Err(ContourError::InvalidOptions {
                key: "splitMode".to_string(),
                reason: format!("expected 'classic' or 'no-split', got '{}'", other),
            }),
        }
    }
}

/// Per-request configuration of the contour pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourTileOptions {
    /// Elevation thresholds per zoom: `(zoom, [minor, major, …])`, sorted by
    /// zoom. A request selects the entry with the largest zoom ≤ its own.
    pub thresholds: Vec<(u8, Vec<f64>)>,
    /// Elevation scale factor.
    pub multiplier: f64,
    /// How many zoom levels coarser than the request the DEM is fetched.
    pub overzoom: u8,
    /// Halo width in sample-grid cells swept past the tile edge.
    pub buffer: u32,
    /// Destination integer resolution of the tile.
    pub extent: u16,
    /// Subsample the virtual tile until its width reaches this many samples.
    pub subsample_below: u32,
    /// Name of the emitted MVT layer.
    pub contour_layer: String,
    /// Feature attribute carrying the elevation in meters.
    pub elevation_key: String,
    /// Feature attribute carrying the contour importance level.
    pub level_key: String,
    /// Douglas-Peucker tolerance in destination units; 0 disables.
    pub simplify: f64,
    pub split_mode: SplitMode,
}

impl Default for ContourTileOptions {
    fn default() -> Self {
        Self {
            thresholds: Vec::new(),
            multiplier: 1.0,
            overzoom: 0,
            buffer: 1,
            extent: 4096,
            subsample_below: 100,
            contour_layer: "contours".to_string(),
            elevation_key: "ele".to_string(),
            level_key: "level".to_string(),
            simplify: 1.0,
            split_mode: SplitMode::Classic,
        }
    }
}

impl ContourTileOptions {
    /// Thresholds applying at zoom `z`: the entry with the largest zoom
    /// ≤ `z`, or `None` when no entry applies.
    pub fn thresholds_for(&self, z: u8) -> Option<&[f64]> {
        self.thresholds
            .iter()
            .filter(|(zoom, _)| *zoom <= z)
            .max_by_key(|(zoom, _)| *zoom)
            .map(|(_, levels)| levels.as_slice())
    }

    /// Parses the `z1*minor1*major1~z2*minor2*major2…` thresholds grammar.
    ///
    /// Every threshold beyond the first must be an integer multiple of its
    /// predecessor, otherwise level computation would be undefined.
    pub fn parse_thresholds(input: &str) -> Result<Vec<(u8, Vec<f64>)>, ContourError> {
        let invalid = |reason: String| ContourError::InvalidOptions {
            key: "thresholds".to_string(),
            reason,
        };
        let mut out = Vec::new();
        for entry in input.split('~') {
            let mut parts = entry.split('*');
            let zoom = parts
                .next()
                .and_then(|z| z.parse::<u8>().ok())
                .ok_or_else(|| invalid(format!("bad zoom in entry '{}'", entry)))?;
            let levels: Vec<f64> = parts
                .map(|p| {
                    p.parse::<f64>()
                        .map_err(|_| invalid(format!("bad threshold '{}'", p)))
                })
                .collect::<Result<_, _>>()?;
            if levels.is_empty() || levels[0] <= 0.0 {
                return Err(invalid(format!("entry '{}' has no positive minor", entry)));
            }
            validate_nested(&levels)?;
            out.push((zoom, levels));
        }
        out.sort_by_key(|(zoom, _)| *zoom);
        Ok(out)
    }

    /// Canonical cache key for a request: coordinates plus every option in
    /// sorted-key order.
    pub fn cache_key(&self, coord: &TileCoord) -> String {
        let thresholds = self
            .thresholds
            .iter()
            .map(|(zoom, levels)| {
                let levels = levels
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join("*");
                format!("{}*{}", zoom, levels)
            })
            .collect::<Vec<_>>()
            .join("~");

        let mut pairs = vec![
            ("buffer", self.buffer.to_string()),
            ("contourLayer", self.contour_layer.clone()),
            ("elevationKey", self.elevation_key.clone()),
            ("extent", self.extent.to_string()),
            ("levelKey", self.level_key.clone()),
            ("multiplier", self.multiplier.to_string()),
            ("overzoom", self.overzoom.to_string()),
            ("simplify", self.simplify.to_string()),
            ("splitMode", self.split_mode.to_string()),
            ("subsampleBelow", self.subsample_below.to_string()),
            ("thresholds", thresholds),
        ];
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let options = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{}", coord, options)
    }
}

/// Validates that each threshold is an integer multiple of its predecessor.
fn validate_nested(levels: &[f64]) -> Result<(), ContourError> {
    for pair in levels.windows(2) {
        let ratio = pair[1] / pair[0];
        if pair[1] <= 0.0 || (ratio - ratio.round()).abs() > DIVISIBILITY_EPSILON {
            return Err(ContourError::InvalidOptions {
                key: "thresholds".to_string(),
                reason: format!("{} does not divide {}", pair[0], pair[1]),
            });
        }
    }
    Ok(())
}

/// Importance level of an elevation: the largest index i such that
/// `thresholds[i]` divides it, or 0 when only the minor interval does.
pub fn level_for(elevation: f64, thresholds: &[f64]) -> u32 {
    for (i, threshold) in thresholds.iter().enumerate().rev() {
        if *threshold > 0.0 {
            let ratio = elevation / threshold;
            if (ratio - ratio.round()).abs() <= DIVISIBILITY_EPSILON * ratio.abs().max(1.0) {
                return i as u32;
            }
        }
    }
    0
}
