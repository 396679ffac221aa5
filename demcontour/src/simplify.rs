//! Douglas-Peucker simplification of contour polylines.
//!
//! Geometric predicates work best near unit scale, so vertices are rescaled
//! to [0, 1]² before simplification and rounded back to tile integers after.

use geo::{LineString, Simplify};
use tracing::trace;

use crate::isoline::{LevelLines, Polyline};

/// Simplifies every polyline of every level.
///
/// A non-positive `tolerance` (in destination units) returns the input
/// unchanged. Polylines that would collapse below 2 vertices are dropped;
/// a polyline that cannot be simplified is retained as-is.
pub fn simplify_lines(lines: LevelLines, tolerance: f64, extent: u16) -> LevelLines {
    if tolerance <= 0.0 {
        return lines;
    }
    let before: usize = lines.values().map(|l| l.iter().map(Vec::len).sum::<usize>()).sum();
    let out: LevelLines = lines
        .into_iter()
        .map(|(level, level_lines)| {
            let simplified = level_lines
                .into_iter()
                .filter_map(|line| simplify_polyline(line, tolerance, extent))
                .collect();
            (level, simplified)
        })
        .collect();
    let after: usize = out.values().map(|l| l.iter().map(Vec::len).sum::<usize>()).sum();
    trace!(before, after, tolerance, "simplified contour lines");
    out
}

/// Simplifies one polyline; `None` when fewer than 2 vertices survive.
fn simplify_polyline(line: Polyline, tolerance: f64, extent: u16) -> Option<Polyline> {
    if line.len() <= 4 {
        // A 2-vertex line is already minimal; anything shorter carries no
        // geometry worth keeping.
        return if line.len() == 4 { Some(line) } else { None };
    }

    let extent = extent as f64;
    let normalized: LineString<f64> = line
        .chunks(2)
        .map(|c| (c[0] as f64 / extent, c[1] as f64 / extent))
        .collect();
    let simplified = normalized.simplify(&(tolerance / extent));

    if simplified.0.len() < 2 {
        return None;
    }
    let mut out = Vec::with_capacity(simplified.0.len() * 2);
    for coord in &simplified.0 {
        out.push((coord.x * extent).round() as i32);
        out.push((coord.y * extent).round() as i32);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn level_lines(lines: Vec<Polyline>) -> LevelLines {
        let mut map = BTreeMap::new();
        map.insert(1, lines);
        map
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let input = level_lines(vec![vec![0, 0, 10, 1, 20, 0, 30, 1, 40, 0]]);
        let output = simplify_lines(input.clone(), 0.0, 4096);
        assert_eq!(output, input);
    }

    #[test]
    fn test_two_vertex_line_unchanged() {
        let input = level_lines(vec![vec![0, 0, 4096, 4096]]);
        let output = simplify_lines(input.clone(), 5.0, 4096);
        assert_eq!(output, input);
    }

    #[test]
    fn test_collinear_vertices_removed() {
        let input = level_lines(vec![vec![0, 0, 1024, 0, 2048, 0, 3072, 0, 4096, 0]]);
        let output = simplify_lines(input, 1.0, 4096);
        assert_eq!(output[&1], vec![vec![0, 0, 4096, 0]]);
    }

    #[test]
    fn test_deviation_above_tolerance_kept() {
        // Middle vertex deviates 100 units; tolerance 10 keeps it.
        let input = level_lines(vec![vec![0, 0, 2048, 100, 4096, 0]]);
        let output = simplify_lines(input.clone(), 10.0, 4096);
        assert_eq!(output, input);
        // Tolerance 200 removes it.
        let output = simplify_lines(input, 200.0, 4096);
        assert_eq!(output[&1], vec![vec![0, 0, 4096, 0]]);
    }

    #[test]
    fn test_fidelity_within_tolerance() {
        // A zigzag 3 units tall collapses under an 8-unit tolerance but
        // survives a 1-unit one.
        let line: Polyline = (0..50)
            .flat_map(|i| vec![i * 80, if i % 2 == 0 { 0 } else { 3 }])
            .collect();
        let flattened = simplify_lines(level_lines(vec![line.clone()]), 8.0, 4096);
        assert_eq!(flattened[&1][0].len(), 4);
        let kept = simplify_lines(level_lines(vec![line.clone()]), 1.0, 4096);
        assert_eq!(kept[&1][0], line);
    }
}
