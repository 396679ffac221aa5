//! Uniform grid index over normalized tile space.

use std::collections::{BTreeSet, HashMap};

use super::IndexedPolygon;

/// Grid dimension for zoom `z`; `None` disables the index (scan all).
pub fn grid_dimension(z: u8) -> Option<usize> {
    match z {
        0..=12 => Some(8),
        13 => Some(4),
        _ => None,
    }
}

/// N×N uniform grid over [0, 1]² mapping cells to polygon indices.
///
/// Polygons are registered in every cell their bounding box touches;
/// lookups union the cells touched by query points.
#[derive(Debug)]
pub struct GridIndex {
    n: usize,
    cells: HashMap<(usize, usize), Vec<usize>>,
}

impl GridIndex {
    /// Builds an index of `polygons` with `n` cells per axis.
    pub fn new(n: usize, polygons: &[IndexedPolygon]) -> Self {
        let mut cells: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (idx, polygon) in polygons.iter().enumerate() {
            let (min_cx, min_cy) = cell_of(n, polygon.bbox.min().x, polygon.bbox.min().y);
            let (max_cx, max_cy) = cell_of(n, polygon.bbox.max().x, polygon.bbox.max().y);
            for cy in min_cy..=max_cy {
                for cx in min_cx..=max_cx {
                    cells.entry((cx, cy)).or_default().push(idx);
                }
            }
        }
        Self { n, cells }
    }

    /// Indices of polygons whose cells are touched by any of `points`
    /// (normalized coordinates), in ascending order.
    pub fn candidates<'a>(
        &self,
        points: impl IntoIterator<Item = &'a (f64, f64)>,
    ) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for &(x, y) in points {
            if let Some(indices) = self.cells.get(&cell_of(self.n, x, y)) {
                out.extend(indices.iter().copied());
            }
        }
        out
    }
}

/// Cell containing a normalized point, clamped onto the grid.
fn cell_of(n: usize, x: f64, y: f64) -> (usize, usize) {
    let clamp = |v: f64| ((v * n as f64).floor().max(0.0) as usize).min(n - 1);
    (clamp(x), clamp(y))
}
