//! Marching-squares isoline extraction.
//!
//! Sweeps the sample grid of a materialized [`HeightTile`] once, emitting a
//! directed line segment for every cell edge a threshold crosses, and links
//! the segments into polylines on the fly. For every threshold T the region
//! with `value > T` lies on the left of the direction of travel; samples
//! exactly equal to a threshold count as below it, which keeps the case
//! analysis total. Saddle cells are disambiguated by the bilinear center
//! value so the high region stays connected consistently.
//!
//! Coordinates are emitted in destination units: grid index ·
//! `extent / (width − 1)`, rounded to integers. The sweep covers `buffer`
//! extra cells of halo on every side, so polylines either close on
//! themselves (first point repeated) or terminate on the sweep boundary.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::height::HeightTile;
use crate::terrain::ClassifiedSegment;

/// A polyline as a flat `[x0, y0, x1, y1, …]` sequence in tile units.
pub type Polyline = Vec<i32>;

/// Polylines per threshold, keyed by the integer multiple of the minor
/// interval (elevation = key · interval). Levels with no lines are absent.
pub type LevelLines = BTreeMap<i64, Vec<Polyline>>;

/// Classified segments per threshold, keyed like [`LevelLines`].
pub type LevelSegments = BTreeMap<i64, Vec<ClassifiedSegment>>;

/// Contour geometry for one tile, before or after terrain classification.
///
/// The MVT encoder dispatches on the variant; unclassified lines are written
/// with the `normal` terrain type.
pub enum IsolineSet {
    Unclassified(LevelLines),
    Classified(LevelSegments),
}

/// Exact-coordinate key for linking segment endpoints across cells.
///
/// Crossing positions on a shared edge are computed from the same two corner
/// samples in the same order in both adjacent cells, so the f64 bit patterns
/// match exactly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct PointKey(u64, u64);

fn key(p: (f64, f64)) -> PointKey {
    PointKey(p.0.to_bits(), p.1.to_bits())
}

/// Open polyline fragments for one threshold, indexed by both endpoints.
#[derive(Default)]
struct LevelBuilder {
    fragments: Vec<Option<Vec<(f64, f64)>>>,
    by_start: HashMap<PointKey, usize>,
    by_end: HashMap<PointKey, usize>,
    closed: Vec<Vec<(f64, f64)>>,
}

impl LevelBuilder {
    /// Adds the directed segment `a → b`, linking onto existing fragments.
    fn add_segment(&mut self, a: (f64, f64), b: (f64, f64)) {
        let (ka, kb) = (key(a), key(b));
        match (self.by_end.remove(&ka), self.by_start.remove(&kb)) {
            (Some(head), Some(tail)) if head == tail => {
                // The segment closes a ring; repeat the first vertex.
                let mut ring = self.fragments[head].take().unwrap();
                let first = ring[0];
                ring.push(b);
                debug_assert_eq!(key(first), kb);
                self.closed.push(ring);
            }
            (Some(head), Some(tail)) => {
                // Bridges two fragments; splice tail onto head.
                let mut points = self.fragments[head].take().unwrap();
                let tail_points = self.fragments[tail].take().unwrap();
                points.extend(tail_points);
                let end = key(*points.last().unwrap());
                self.fragments[head] = Some(points);
                self.by_end.insert(end, head);
            }
            (Some(head), None) => {
                let points = self.fragments[head].as_mut().unwrap();
                points.push(b);
                self.by_end.insert(kb, head);
            }
            (None, Some(tail)) => {
                let points = self.fragments[tail].as_mut().unwrap();
                points.insert(0, a);
                self.by_start.insert(ka, tail);
            }
            (None, None) => {
                let id = self.fragments.len();
                self.fragments.push(Some(vec![a, b]));
                self.by_start.insert(ka, id);
                self.by_end.insert(kb, id);
            }
        }
    }

    /// Emits every finished polyline, scaled and rounded to tile units.
    fn finish(self, multiplier: f64) -> Vec<Polyline> {
        let scale = |points: Vec<(f64, f64)>| -> Polyline {
            let mut out = Vec::with_capacity(points.len() * 2);
            for (x, y) in points {
                out.push((x * multiplier).round() as i32);
                out.push((y * multiplier).round() as i32);
            }
            out
        };
        self.closed
            .into_iter()
            .chain(self.fragments.into_iter().flatten())
            .map(scale)
            .collect()
    }
}

/// Extracts isolines for every multiple of `interval` present in the data.
///
/// `tile` must be materialized with a border of at least `buffer + 1` grid
/// samples (NaN samples simply truncate lines). `extent` is the destination
/// integer resolution; `buffer` is the halo width in grid cells.
pub fn generate_isolines(
    interval: f64,
    tile: &HeightTile,
    extent: u16,
    buffer: u32,
) -> LevelLines {
    let mut levels: BTreeMap<i64, LevelBuilder> = BTreeMap::new();
    if interval <= 0.0 || tile.width() < 2 {
        return LevelLines::new();
    }

    let width = tile.width() as i32;
    let height = tile.height() as i32;
    let buffer = buffer as i32;
    let multiplier = extent as f64 / (width - 1) as f64;

    for cy in -buffer..height - 1 + buffer {
        for cx in -buffer..width - 1 + buffer {
            let tl = tile.get(cx, cy);
            let tr = tile.get(cx + 1, cy);
            let br = tile.get(cx + 1, cy + 1);
            let bl = tile.get(cx, cy + 1);
            if tl.is_nan() || tr.is_nan() || br.is_nan() || bl.is_nan() {
                continue;
            }

            let lo = tl.min(tr).min(br).min(bl) as f64;
            let hi = tl.max(tr).max(br).max(bl) as f64;
            let first = (lo / interval).ceil() as i64;
            let last = (hi / interval).ceil() as i64 - 1;

            for level in first..=last {
                let t = level as f32 * interval as f32;
                let builder = levels.entry(level).or_default();
                emit_cell(builder, cx as f64, cy as f64, tl, tr, br, bl, t);
            }
        }
    }

    let lines: LevelLines = levels
        .into_iter()
        .map(|(level, builder)| (level, builder.finish(multiplier)))
        .filter(|(_, lines)| !lines.is_empty())
        .collect();
    trace!(levels = lines.len(), "generated isolines");
    lines
}

/// Fractional position of threshold `t` between samples `a` and `b`.
#[inline]
fn cross(a: f32, b: f32, t: f32) -> f64 {
    ((t - a) / (b - a)) as f64
}

/// Emits the marching-squares segments for one cell.
///
/// Corner bits: 1 = top-left, 2 = top-right, 4 = bottom-right,
/// 8 = bottom-left, set when the corner is strictly above `t`. Directions
/// keep the above-threshold region on the left in y-down coordinates.
#[allow(clippy::too_many_arguments)]
fn emit_cell(
    builder: &mut LevelBuilder,
    x: f64,
    y: f64,
    tl: f32,
    tr: f32,
    br: f32,
    bl: f32,
    t: f32,
) {
    let mut case = 0u8;
    if tl > t {
        case |= 1;
    }
    if tr > t {
        case |= 2;
    }
    if br > t {
        case |= 4;
    }
    if bl > t {
        case |= 8;
    }

    let top = || (x + cross(tl, tr, t), y);
    let right = || (x + 1.0, y + cross(tr, br, t));
    let bottom = || (x + cross(bl, br, t), y + 1.0);
    let left = || (x, y + cross(tl, bl, t));

    match case {
        0 | 15 => {}
        1 => builder.add_segment(left(), top()),
        2 => builder.add_segment(top(), right()),
        3 => builder.add_segment(left(), right()),
        4 => builder.add_segment(right(), bottom()),
        6 => builder.add_segment(top(), bottom()),
        7 => builder.add_segment(top(), left()),
        8 => builder.add_segment(bottom(), left()),
        9 => builder.add_segment(bottom(), top()),
        11 => builder.add_segment(right(), top()),
        12 => builder.add_segment(right(), left()),
        13 => builder.add_segment(bottom(), right()),
        14 => builder.add_segment(left(), bottom()),
        5 => {
            // Saddle: top-left and bottom-right above. The center decides
            // whether the high corners connect diagonally.
            if (tl + tr + br + bl) / 4.0 > t {
                builder.add_segment(right(), top());
                builder.add_segment(left(), bottom());
            } else {
                builder.add_segment(left(), top());
                builder.add_segment(right(), bottom());
            }
        }
        10 => {
            // Saddle: top-right and bottom-left above.
            if (tl + tr + br + bl) / 4.0 > t {
                builder.add_segment(top(), left());
                builder.add_segment(bottom(), right());
            } else {
                builder.add_segment(top(), right());
                builder.add_segment(bottom(), left());
            }
        }
        _ => unreachable!("marching squares case {}", case),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dem::DemTile;
    use std::sync::Arc;

    fn height_tile(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> HeightTile {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        HeightTile::from_raw_dem(Arc::new(DemTile::new(width, height, data)))
    }

    fn points(line: &Polyline) -> Vec<(i32, i32)> {
        line.chunks(2).map(|c| (c[0], c[1])).collect()
    }

    #[test]
    fn test_flat_field_has_no_isolines() {
        let tile = height_tile(5, 5, |_, _| 42.0).materialize(1);
        let lines = generate_isolines(10.0, &tile, 4096, 0);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_value_equal_to_threshold_is_below() {
        // Constant field exactly on a threshold: no corner is strictly
        // above, so nothing is emitted.
        let tile = height_tile(4, 4, |_, _| 100.0).materialize(1);
        let lines = generate_isolines(100.0, &tile, 4096, 0);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_ramp_emits_vertical_lines() {
        // Values 0, 10, 20, 30, 40 per column; threshold 15 crosses between
        // columns 1 and 2.
        let tile = height_tile(5, 5, |x, _| x as f32 * 10.0).materialize(1);
        let lines = generate_isolines(15.0, &tile, 4096, 0);

        assert_eq!(lines.len(), 2); // levels 15 and 30
        let level1 = &lines[&1];
        assert_eq!(level1.len(), 1);
        let pts = points(&level1[0]);
        // multiplier = 4096 / 4 = 1024; crossing at x = 1.5 -> 1536.
        for (x, _) in &pts {
            assert_eq!(*x, 1536);
        }
        // Open line spans the full sweep in y.
        assert_eq!(pts.first().unwrap().1, 0);
        assert_eq!(pts.last().unwrap().1, 4096);
    }

    #[test]
    fn test_ramp_orientation_keeps_high_side_left() {
        let tile = height_tile(5, 5, |x, _| x as f32 * 10.0).materialize(1);
        let lines = generate_isolines(15.0, &tile, 4096, 0);
        let pts = points(&lines[&1][0]);
        // High side is +x (east); with y down, east-on-left means travel
        // toward +y.
        assert!(pts.last().unwrap().1 > pts.first().unwrap().1);
    }

    #[test]
    fn test_peak_emits_closed_ring() {
        let tile = height_tile(5, 5, |x, y| {
            if x == 2 && y == 2 {
                100.0
            } else {
                0.0
            }
        })
        .materialize(1);
        let lines = generate_isolines(50.0, &tile, 4096, 0);

        assert_eq!(lines.len(), 1);
        let level1 = &lines[&1];
        assert_eq!(level1.len(), 1);
        let pts = points(&level1[0]);
        // Closed ring: first vertex repeated at the end.
        assert_eq!(pts.first(), pts.last());
        assert!(pts.len() >= 5);
    }

    #[test]
    fn test_closure_invariant() {
        // Every polyline is closed or both endpoints lie on the sweep
        // boundary.
        let tile = height_tile(6, 6, |x, y| (x * y) as f32).materialize(1);
        let extent = 4096;
        let lines = generate_isolines(3.0, &tile, extent, 0);
        assert!(!lines.is_empty());

        for lines_at_level in lines.values() {
            for line in lines_at_level {
                let pts = points(line);
                let first = *pts.first().unwrap();
                let last = *pts.last().unwrap();
                if first == last {
                    continue;
                }
                for p in [first, last] {
                    let on_boundary = p.0 == 0
                        || p.1 == 0
                        || p.0 == extent as i32
                        || p.1 == extent as i32;
                    assert!(on_boundary, "open endpoint {:?} not on boundary", p);
                }
            }
        }
    }

    #[test]
    fn test_nan_truncates_lines() {
        // A NaN column splits the field; lines stop at the last valid cell.
        let tile = height_tile(5, 5, |x, _| {
            if x == 3 {
                f32::NAN
            } else {
                x as f32 * 10.0
            }
        })
        .materialize(1);
        let lines = generate_isolines(15.0, &tile, 4096, 0);
        // The crossing between columns 1 and 2 still exists.
        assert!(lines.contains_key(&1));
    }

    #[test]
    fn test_buffer_extends_sweep_into_halo() {
        // 3×3 neighborhood forming one continuous north-south ramp of
        // 10 m per row, so the halo rows carry real data.
        let mut tiles: [Option<Arc<DemTile>>; 9] = Default::default();
        for (i, slot) in tiles.iter_mut().enumerate() {
            let row_offset = (i as i32 / 3 - 1) * 5;
            let mut data = Vec::with_capacity(25);
            for y in 0..5i32 {
                for _ in 0..5 {
                    data.push(((y + row_offset) * 10) as f32);
                }
            }
            *slot = Some(Arc::new(DemTile::new(5, 5, data)));
        }
        let tile = HeightTile::combine_neighbors(tiles).unwrap().materialize(2);

        let without = generate_isolines(15.0, &tile, 4096, 0);
        let with = generate_isolines(15.0, &tile, 4096, 1);

        let span = |lines: &LevelLines| {
            assert_eq!(lines[&1].len(), 1);
            let pts = points(&lines[&1][0]);
            let xs: Vec<i32> = pts.iter().map(|p| p.0).collect();
            (*xs.iter().min().unwrap(), *xs.iter().max().unwrap())
        };
        // The level-1 line is horizontal (between rows 1 and 2); with a
        // buffer it reaches one cell (1024 units) past the tile edge.
        assert_eq!(span(&without), (0, 4096));
        assert_eq!(span(&with), (-1024, 5120));
    }
}
