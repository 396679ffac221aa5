//! Terrain polygon extraction from MVT bytes.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geozero::mvt::tile::GeomType;
use geozero::mvt::{Message, Tile};
use tracing::{debug, warn};

use super::{unzigzag, CMD_CLOSE_PATH, CMD_LINE_TO, CMD_MOVE_TO};
use crate::fetch::VectorSource;
use crate::terrain::{TerrainPolygon, TerrainType};

/// Parses the terrain polygons out of a vector tile.
///
/// Failures are non-fatal by contract: a missing layer or a parse error
/// yields an empty list. Rock polygons are returned before glacier ones so
/// that order-of-application gives rock precedence.
pub fn parse_terrain_polygons(bytes: &[u8], source: &VectorSource) -> Vec<TerrainPolygon> {
    let tile = match Tile::decode(bytes) {
        Ok(tile) => tile,
        Err(e) => {
            warn!(error = %e, "failed to parse terrain vector tile");
            return Vec::new();
        }
    };

    let Some(layer) = tile.layers.into_iter().find(|l| l.name == source.source_layer) else {
        debug!(layer = %source.source_layer, "terrain source layer absent");
        return Vec::new();
    };

    let extent = layer.extent.unwrap_or(4096) as f64;
    let mut rock = Vec::new();
    let mut glacier = Vec::new();

    for feature in &layer.features {
        if feature.r#type != Some(GeomType::Polygon as i32) {
            continue;
        }
        let Some(value) = string_property(feature, &layer.keys, &layer.values, &source.type_key)
        else {
            continue;
        };
        let terrain = if source.rock_values.iter().any(|v| v == value) {
            TerrainType::Rock
        } else if source.glacier_values.iter().any(|v| v == value) {
            TerrainType::Glacier
        } else {
            continue;
        };

        let shape = decode_polygon_rings(&feature.geometry, extent);
        if shape.0.is_empty() {
            continue;
        }
        match terrain {
            TerrainType::Rock => rock.push(TerrainPolygon { shape, terrain }),
            _ => glacier.push(TerrainPolygon { shape, terrain }),
        }
    }

    debug!(
        rock = rock.len(),
        glacier = glacier.len(),
        "parsed terrain polygons"
    );
    rock.extend(glacier);
    rock
}

/// Looks up a string property through the layer's tag/key/value tables.
fn string_property<'a>(
    feature: &geozero::mvt::tile::Feature,
    keys: &[String],
    values: &'a [geozero::mvt::tile::Value],
    name: &str,
) -> Option<&'a str> {
    for pair in feature.tags.chunks_exact(2) {
        let key = keys.get(pair[0] as usize)?;
        if key == name {
            return values.get(pair[1] as usize)?.string_value.as_deref();
        }
    }
    None
}

/// Cursor-walks the MVT command stream into normalized polygon rings and
/// groups them by winding: a positive-area ring opens a new polygon,
/// negative-area rings are holes in the preceding one.
fn decode_polygon_rings(commands: &[u32], extent: f64) -> MultiPolygon<f64> {
    let mut rings: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut ring: Vec<Coord<f64>> = Vec::new();
    let (mut cx, mut cy) = (0i32, 0i32);

    let mut i = 0;
    while i < commands.len() {
        let id = commands[i] & 0x7;
        let count = (commands[i] >> 3) as usize;
        i += 1;
        match id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                for _ in 0..count {
                    let Some(&px) = commands.get(i) else { break };
                    let Some(&py) = commands.get(i + 1) else { break };
                    i += 2;
                    cx += unzigzag(px);
                    cy += unzigzag(py);
                    if id == CMD_MOVE_TO && !ring.is_empty() {
                        rings.push(std::mem::take(&mut ring));
                    }
                    ring.push(Coord {
                        x: cx as f64 / extent,
                        y: cy as f64 / extent,
                    });
                }
            }
            CMD_CLOSE_PATH => {
                if !ring.is_empty() {
                    let first = ring[0];
                    if ring.last() != Some(&first) {
                        ring.push(first);
                    }
                    rings.push(std::mem::take(&mut ring));
                }
            }
            _ => break,
        }
    }
    if !ring.is_empty() {
        rings.push(ring);
    }

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        if ring.len() < 4 {
            continue;
        }
        if signed_area(&ring) > 0.0 || polygons.is_empty() {
            polygons.push(Polygon::new(LineString(ring), vec![]));
        } else if let Some(last) = polygons.last_mut() {
            last.interiors_push(LineString(ring));
        }
    }
    MultiPolygon(polygons)
}

/// Shoelace area; positive for MVT exterior winding.
fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let mut sum = 0.0;
    for pair in ring.windows(2) {
        sum += pair[0].x * pair[1].y - pair[1].x * pair[0].y;
    }
    sum / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::{command, zigzag};
    use geozero::mvt::tile::{Feature, Layer, Value};

    fn string_value(s: &str) -> Value {
        Value {
            string_value: Some(s.to_string()),
            ..Default::default()
        }
    }

    /// Square ring from (1024,1024) to (3072,3072) in a 4096 extent.
    fn square_geometry() -> Vec<u32> {
        vec![
            command(CMD_MOVE_TO, 1),
            zigzag(1024),
            zigzag(1024),
            command(CMD_LINE_TO, 3),
            zigzag(2048),
            zigzag(0),
            zigzag(0),
            zigzag(2048),
            zigzag(-2048),
            zigzag(0),
            command(CMD_CLOSE_PATH, 1),
        ]
    }

    fn terrain_tile(type_value: &str, geom_type: GeomType) -> Vec<u8> {
        let layer = Layer {
            version: 2,
            name: "landcover".to_string(),
            features: vec![Feature {
                id: Some(1),
                tags: vec![0, 0],
                r#type: Some(geom_type as i32),
                geometry: square_geometry(),
            }],
            keys: vec!["type".to_string()],
            values: vec![string_value(type_value)],
            extent: Some(4096),
        };
        Tile { layers: vec![layer] }.encode_to_vec()
    }

    fn source() -> VectorSource {
        VectorSource::new("http://v/{z}/{x}/{y}.mvt", "landcover", 14)
    }

    #[test]
    fn test_parse_glacier_polygon() {
        let polygons = parse_terrain_polygons(&terrain_tile("glacier", GeomType::Polygon), &source());
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].terrain, TerrainType::Glacier);

        let exterior = &polygons[0].shape.0[0].exterior().0;
        assert_eq!(exterior.len(), 5);
        assert_eq!(exterior[0], Coord { x: 0.25, y: 0.25 });
        assert_eq!(exterior[2], Coord { x: 0.75, y: 0.75 });
    }

    #[test]
    fn test_rock_values_classify() {
        for value in ["rock", "bare_rock", "scree"] {
            let polygons = parse_terrain_polygons(&terrain_tile(value, GeomType::Polygon), &source());
            assert_eq!(polygons[0].terrain, TerrainType::Rock, "value {}", value);
        }
    }

    #[test]
    fn test_unrelated_type_skipped() {
        let polygons = parse_terrain_polygons(&terrain_tile("forest", GeomType::Polygon), &source());
        assert!(polygons.is_empty());
    }

    #[test]
    fn test_non_polygon_features_skipped() {
        let polygons =
            parse_terrain_polygons(&terrain_tile("glacier", GeomType::Linestring), &source());
        assert!(polygons.is_empty());
    }

    #[test]
    fn test_missing_layer_is_empty() {
        let mut source = source();
        source.source_layer = "somewhere_else".to_string();
        let polygons = parse_terrain_polygons(&terrain_tile("glacier", GeomType::Polygon), &source);
        assert!(polygons.is_empty());
    }

    #[test]
    fn test_garbage_bytes_are_empty() {
        let polygons = parse_terrain_polygons(b"definitely not protobuf", &source());
        assert!(polygons.is_empty());
    }

    #[test]
    fn test_rock_ordered_before_glacier() {
        let layer = Layer {
            version: 2,
            name: "landcover".to_string(),
            features: vec![
                Feature {
                    id: Some(1),
                    tags: vec![0, 0],
                    r#type: Some(GeomType::Polygon as i32),
                    geometry: square_geometry(),
                },
                Feature {
                    id: Some(2),
                    tags: vec![0, 1],
                    r#type: Some(GeomType::Polygon as i32),
                    geometry: square_geometry(),
                },
            ],
            keys: vec!["type".to_string()],
            values: vec![string_value("ice"), string_value("scree")],
            extent: Some(4096),
        };
        let bytes = Tile { layers: vec![layer] }.encode_to_vec();
        let polygons = parse_terrain_polygons(&bytes, &source());
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].terrain, TerrainType::Rock);
        assert_eq!(polygons[1].terrain, TerrainType::Glacier);
    }
}
