//! Terrain classification of contour lines.
//!
//! Polygons extracted from a companion vector tile (glaciers, bare rock)
//! reclassify the contour polylines that cross them; everything else stays
//! `normal`. Polygons go through a zoom-dependent area filter and shape
//! simplification before being indexed and applied.

mod grid;
mod split;

pub use grid::{grid_dimension, GridIndex};
pub use split::split_contours;

use std::fmt;

use geo::{BoundingRect, ConvexHull, MultiPolygon, Polygon, Rect, Simplify};
use tracing::debug;

/// Discrete classification of a contour segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainType {
    Normal,
    Glacier,
    Rock,
}

impl fmt::Display for TerrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainType::Normal => write!(f, "normal"),
            TerrainType::Glacier => write!(f, "glacier"),
            TerrainType::Rock => write!(f, "rock"),
        }
    }
}

/// A contour polyline piece with its terrain classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSegment {
    /// Flat `[x0, y0, x1, y1, …]` tile coordinates.
    pub geometry: Vec<i32>,
    pub terrain: TerrainType,
}

/// A terrain polygon in coordinates normalized to [0, 1] over the tile.
#[derive(Debug, Clone)]
pub struct TerrainPolygon {
    pub shape: MultiPolygon<f64>,
    pub terrain: TerrainType,
}

/// A preprocessed polygon with its bounding box, ready for the grid index.
#[derive(Debug, Clone)]
pub struct IndexedPolygon {
    pub shape: MultiPolygon<f64>,
    pub terrain: TerrainType,
    pub bbox: Rect<f64>,
}

/// How polygon outlines are approximated before splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolygonSimplification {
    /// Replace each polygon by its convex hull (cheapest predicates).
    /// Automatically downgraded to `None` at z ≥ 13 where hulls get too
    /// coarse.
    #[default]
    ConvexHull,
    /// Douglas-Peucker with a zoom-dependent tolerance.
    DouglasPeucker,
    /// Keep the original outlines.
    None,
}

/// Minimum polygon area (normalized units) considered at zoom `z`.
fn area_threshold(z: u8) -> f64 {
    match z {
        0..=11 => 5e-5,
        12 => 2e-5,
        13 => 1e-5,
        _ => 5e-6,
    }
}

/// Douglas-Peucker tolerance (normalized units) at zoom `z`.
fn dp_tolerance(z: u8) -> f64 {
    match z {
        0..=11 => 0.01,
        12 => 0.005,
        13 => 0.002,
        _ => 0.001,
    }
}

/// Shoelace area of a ring given as normalized coordinates.
fn ring_area(ring: &[geo::Coord<f64>]) -> f64 {
    let mut sum = 0.0;
    for pair in ring.windows(2) {
        sum += pair[0].x * pair[1].y - pair[1].x * pair[0].y;
    }
    (sum / 2.0).abs()
}

/// Approximate polygon area: the shoelace sum over exterior rings only.
fn polygon_area(shape: &MultiPolygon<f64>) -> f64 {
    shape.0.iter().map(|p| ring_area(&p.exterior().0)).sum()
}

/// Filters, simplifies, and indexes terrain polygons for zoom `z`.
///
/// Input order is preserved so that callers control classification
/// precedence (rock polygons first means rock wins over glacier).
pub fn preprocess_polygons(
    polygons: Vec<TerrainPolygon>,
    z: u8,
    method: PolygonSimplification,
) -> Vec<IndexedPolygon> {
    let threshold = area_threshold(z);
    let method = match method {
        // Convex hulls over-approximate badly once tiles get small.
        PolygonSimplification::ConvexHull if z >= 13 => PolygonSimplification::None,
        other => other,
    };

    let mut out = Vec::with_capacity(polygons.len());
    for polygon in polygons {
        if polygon_area(&polygon.shape) < threshold {
            continue;
        }
        let shape = match method {
            PolygonSimplification::ConvexHull => MultiPolygon(vec![polygon.shape.convex_hull()]),
            PolygonSimplification::DouglasPeucker => {
                polygon.shape.simplify(&dp_tolerance(z))
            }
            PolygonSimplification::None => polygon.shape,
        };
        // Simplification can degenerate a ring past usefulness.
        let shape = MultiPolygon(
            shape
                .0
                .into_iter()
                .filter(|p: &Polygon<f64>| p.exterior().0.len() >= 4)
                .collect::<Vec<_>>(),
        );
        if shape.0.is_empty() {
            continue;
        }
        let Some(bbox) = shape.bounding_rect() else {
            continue;
        };
        out.push(IndexedPolygon {
            shape,
            terrain: polygon.terrain,
            bbox,
        });
    }
    debug!(kept = out.len(), zoom = z, "preprocessed terrain polygons");
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    /// Axis-aligned square polygon in normalized coordinates.
    pub(crate) fn square(min: f64, max: f64, terrain: TerrainType) -> TerrainPolygon {
        let shape = polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
            (x: min, y: min),
        ];
        TerrainPolygon {
            shape: MultiPolygon(vec![shape]),
            terrain,
        }
    }

    #[test]
    fn test_terrain_type_display() {
        assert_eq!(TerrainType::Normal.to_string(), "normal");
        assert_eq!(TerrainType::Glacier.to_string(), "glacier");
        assert_eq!(TerrainType::Rock.to_string(), "rock");
    }

    #[test]
    fn test_area_filter_drops_small_polygons() {
        // 0.001 × 0.001 square: area 1e-6, below every threshold up to z 13.
        let tiny = square(0.5, 0.501, TerrainType::Glacier);
        let big = square(0.2, 0.8, TerrainType::Rock);
        let kept = preprocess_polygons(vec![tiny, big], 11, PolygonSimplification::None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].terrain, TerrainType::Rock);
    }

    #[test]
    fn test_area_threshold_scales_with_zoom() {
        // Area 2.5e-5 passes at z 12 (2e-5) but not z 11 (5e-5).
        let polygon = square(0.0, 0.005, TerrainType::Glacier);
        assert_eq!(
            preprocess_polygons(vec![polygon.clone()], 11, PolygonSimplification::None).len(),
            0
        );
        assert_eq!(
            preprocess_polygons(vec![polygon], 12, PolygonSimplification::None).len(),
            1
        );
    }

    #[test]
    fn test_convex_hull_downgraded_at_high_zoom() {
        // An L-shape's hull gains the missing corner; at z >= 13 the hull
        // must not be applied.
        let l_shape = TerrainPolygon {
            shape: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 0.6, y: 0.0),
                (x: 0.6, y: 0.3),
                (x: 0.3, y: 0.3),
                (x: 0.3, y: 0.6),
                (x: 0.0, y: 0.6),
                (x: 0.0, y: 0.0),
            ]]),
            terrain: TerrainType::Rock,
        };
        let hulled =
            preprocess_polygons(vec![l_shape.clone()], 11, PolygonSimplification::ConvexHull);
        assert_eq!(hulled[0].shape.0[0].exterior().0.len(), 6); // hull: 5 corners + close
        let kept = preprocess_polygons(vec![l_shape], 13, PolygonSimplification::ConvexHull);
        assert_eq!(kept[0].shape.0[0].exterior().0.len(), 7); // original ring
    }

    #[test]
    fn test_input_order_preserved() {
        let rock = square(0.1, 0.9, TerrainType::Rock);
        let glacier = square(0.2, 0.8, TerrainType::Glacier);
        let kept = preprocess_polygons(vec![rock, glacier], 12, PolygonSimplification::None);
        assert_eq!(kept[0].terrain, TerrainType::Rock);
        assert_eq!(kept[1].terrain, TerrainType::Glacier);
    }

    #[test]
    fn test_bbox_computed() {
        let kept = preprocess_polygons(
            vec![square(0.25, 0.75, TerrainType::Glacier)],
            12,
            PolygonSimplification::None,
        );
        let bbox = kept[0].bbox;
        assert_eq!(bbox.min().x, 0.25);
        assert_eq!(bbox.max().y, 0.75);
    }
}
