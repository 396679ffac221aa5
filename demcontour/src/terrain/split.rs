//! Splits contour polylines against terrain polygons.
//!
//! Every polyline is covered end-to-end by classified segments with no gap
//! and no overlap: the vertex where the classification changes is shared by
//! both adjacent segments. Polygons are applied in input order and only ever
//! split segments that are still `normal`, so the first polygon containing a
//! vertex wins.

use geo::{Contains, Point};
use tracing::debug;

use super::{grid_dimension, GridIndex, IndexedPolygon, ClassifiedSegment, TerrainType};
use crate::isoline::{LevelLines, LevelSegments, Polyline};

/// Runs of fewer vertices than this fold back into the surrounding segment,
/// suppressing flip-flops caused by polygon slivers.
const MIN_RUN_VERTICES: usize = 10;

/// Most vertices probed to pre-classify a polyline against one polygon.
const MAX_PROBE_VERTICES: usize = 20;

/// Classifies every polyline of `lines` against `polygons`.
///
/// `polygons` must already be preprocessed for `z` (area filter and
/// simplification applied); an empty set marks everything `normal`.
pub fn split_contours(
    lines: LevelLines,
    polygons: &[IndexedPolygon],
    extent: u16,
    z: u8,
) -> LevelSegments {
    let grid = grid_dimension(z)
        .filter(|_| !polygons.is_empty())
        .map(|n| GridIndex::new(n, polygons));

    lines
        .into_iter()
        .map(|(level, level_lines)| {
            let segments = level_lines
                .into_iter()
                .flat_map(|line| split_polyline(line, polygons, grid.as_ref(), extent))
                .collect();
            (level, segments)
        })
        .collect()
}

/// One classified piece of a polyline, as an inclusive vertex range.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    terrain: TerrainType,
}

fn split_polyline(
    line: Polyline,
    polygons: &[IndexedPolygon],
    grid: Option<&GridIndex>,
    extent: u16,
) -> Vec<ClassifiedSegment> {
    let vertex_count = line.len() / 2;
    if vertex_count < 2 {
        return Vec::new();
    }

    let extent = extent as f64;
    let normalized: Vec<(f64, f64)> = line
        .chunks(2)
        .map(|c| (c[0] as f64 / extent, c[1] as f64 / extent))
        .collect();

    let candidates: Vec<usize> = match grid {
        Some(grid) => grid.candidates(normalized.iter()).into_iter().collect(),
        None => (0..polygons.len()).collect(),
    };

    let mut pieces = vec![Piece {
        start: 0,
        end: vertex_count - 1,
        terrain: TerrainType::Normal,
    }];

    if !candidates.is_empty() {
        let bbox = polyline_bbox(&normalized);
        for &idx in &candidates {
            let polygon = &polygons[idx];
            if !bbox_intersects(&bbox, polygon) {
                continue;
            }
            pieces = pieces
                .into_iter()
                .flat_map(|piece| {
                    if piece.terrain == TerrainType::Normal {
                        split_piece(piece, &normalized, polygon)
                    } else {
                        vec![piece]
                    }
                })
                .collect();
        }
    }

    pieces
        .into_iter()
        .map(|piece| ClassifiedSegment {
            geometry: line[piece.start * 2..(piece.end + 1) * 2].to_vec(),
            terrain: piece.terrain,
        })
        .collect()
}

/// Splits one still-`normal` piece against one polygon.
///
/// A probe pass over at most [`MAX_PROBE_VERTICES`] evenly spaced vertices
/// (plus the last) classifies the piece as all-inside, all-outside, or
/// crossing; only crossing pieces pay for the full vertex walk.
fn split_piece(piece: Piece, points: &[(f64, f64)], polygon: &IndexedPolygon) -> Vec<Piece> {
    let contains =
        |i: usize| -> bool { polygon.shape.contains(&Point::new(points[i].0, points[i].1)) };

    let len = piece.end - piece.start + 1;
    let stride = len.div_ceil(MAX_PROBE_VERTICES).max(1);
    let mut any_inside = false;
    let mut any_outside = false;
    for i in (piece.start..=piece.end)
        .step_by(stride)
        .chain(std::iter::once(piece.end))
    {
        if contains(i) {
            any_inside = true;
        } else {
            any_outside = true;
        }
        if any_inside && any_outside {
            break;
        }
    }

    match (any_inside, any_outside) {
        (false, _) => return vec![piece],
        (true, false) => {
            return vec![Piece {
                terrain: polygon.terrain,
                ..piece
            }]
        }
        (true, true) => {}
    }

    // Walk every vertex, collecting runs of equal classification.
    let mut runs: Vec<(usize, usize, bool)> = Vec::new();
    for i in piece.start..=piece.end {
        let inside = contains(i);
        match runs.last_mut() {
            Some((_, end, last)) if *last == inside => *end = i,
            _ => runs.push((i, i, inside)),
        }
    }

    // Fold short runs into their predecessor; a short leading run adopts
    // the classification of what follows it instead.
    let mut merged: Vec<(usize, usize, bool)> = Vec::new();
    for (start, end, inside) in runs {
        let len = end - start + 1;
        match merged.last_mut() {
            Some((_, prev_end, _)) if len < MIN_RUN_VERTICES => *prev_end = end,
            _ => merged.push((start, end, inside)),
        }
    }
    if merged.len() >= 2 && merged[0].1 - merged[0].0 + 1 < MIN_RUN_VERTICES {
        let (start, _, _) = merged[0];
        let (_, end, inside) = merged[1];
        merged.splice(0..2, [(start, end, inside)]);
    }
    // Folding can leave equal neighbors; collapse them.
    let mut collapsed: Vec<(usize, usize, bool)> = Vec::new();
    for run in merged {
        match collapsed.last_mut() {
            Some((_, end, inside)) if *inside == run.2 => *end = run.1,
            _ => collapsed.push(run),
        }
    }

    // Each transition closes the current piece at the first vertex of the
    // next run and opens the new piece at that same vertex, so the crossing
    // vertex is shared.
    let last = collapsed.len() - 1;
    let out: Vec<Piece> = collapsed
        .iter()
        .enumerate()
        .map(|(i, &(start, end, inside))| Piece {
            start,
            end: if i < last { end + 1 } else { end },
            terrain: if inside {
                polygon.terrain
            } else {
                TerrainType::Normal
            },
        })
        .collect();
    debug!(pieces = out.len(), "split contour piece against polygon");
    out
}

fn polyline_bbox(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    let mut bbox = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        bbox.0 = bbox.0.min(x);
        bbox.1 = bbox.1.min(y);
        bbox.2 = bbox.2.max(x);
        bbox.3 = bbox.3.max(y);
    }
    bbox
}

fn bbox_intersects(bbox: &(f64, f64, f64, f64), polygon: &IndexedPolygon) -> bool {
    bbox.0 <= polygon.bbox.max().x
        && bbox.2 >= polygon.bbox.min().x
        && bbox.1 <= polygon.bbox.max().y
        && bbox.3 >= polygon.bbox.min().y
}
