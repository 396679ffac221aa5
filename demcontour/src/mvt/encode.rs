//! Contour layer encoding to MVT bytes.

use std::collections::HashMap;

use geozero::mvt::tile::{Feature, GeomType, Layer, Value};
use geozero::mvt::{Message, Tile};
use tracing::debug;

use super::{command, zigzag, CMD_LINE_TO, CMD_MOVE_TO};
use crate::isoline::IsolineSet;
use crate::options::{level_for, ContourTileOptions};
use crate::terrain::TerrainType;

/// Interns attribute values, deduplicating them as the MVT layout requires.
#[derive(Default)]
struct ValueTable {
    values: Vec<Value>,
    ints: HashMap<i64, u32>,
    strings: HashMap<String, u32>,
}

impl ValueTable {
    fn int(&mut self, v: i64) -> u32 {
        if let Some(&idx) = self.ints.get(&v) {
            return idx;
        }
        let idx = self.values.len() as u32;
        self.values.push(Value {
            int_value: Some(v),
            ..Default::default()
        });
        self.ints.insert(v, idx);
        idx
    }

    fn string(&mut self, v: &str) -> u32 {
        if let Some(&idx) = self.strings.get(v) {
            return idx;
        }
        let idx = self.values.len() as u32;
        self.values.push(Value {
            string_value: Some(v.to_string()),
            ..Default::default()
        });
        self.strings.insert(v.to_string(), idx);
        idx
    }
}

/// Key table indices; the order is fixed by `keys()` below.
const KEY_ELEVATION: u32 = 0;
const KEY_LEVEL: u32 = 1;
const KEY_TERRAIN: u32 = 2;

/// Encodes a flat coordinate sequence as a LINESTRING command stream.
fn encode_geometry(geometry: &[i32]) -> Vec<u32> {
    let vertex_count = geometry.len() / 2;
    if vertex_count < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(geometry.len() + 2);
    out.push(command(CMD_MOVE_TO, 1));
    out.push(zigzag(geometry[0]));
    out.push(zigzag(geometry[1]));
    out.push(command(CMD_LINE_TO, vertex_count as u32 - 1));
    let (mut cx, mut cy) = (geometry[0], geometry[1]);
    for pair in geometry[2..].chunks_exact(2) {
        out.push(zigzag(pair[0] - cx));
        out.push(zigzag(pair[1] - cy));
        cx = pair[0];
        cy = pair[1];
    }
    out
}

/// Encodes classified contours into a single-layer MVT byte buffer.
///
/// `thresholds` is the zoom-selected threshold list; elevations are
/// `level multiple × thresholds[0]` and the level attribute is the highest
/// threshold index dividing the elevation.
pub fn encode_contour_tile(
    set: &IsolineSet,
    thresholds: &[f64],
    options: &ContourTileOptions,
) -> Vec<u8> {
    let interval = thresholds[0];
    let mut values = ValueTable::default();
    let mut features = Vec::new();

    let mut push_feature = |values: &mut ValueTable,
                            features: &mut Vec<Feature>,
                            multiple: i64,
                            geometry: &[i32],
                            terrain: TerrainType| {
        let encoded = encode_geometry(geometry);
        if encoded.is_empty() {
            return;
        }
        let elevation = multiple as f64 * interval;
        let tags = vec![
            KEY_ELEVATION,
            values.int(elevation.round() as i64),
            KEY_LEVEL,
            values.int(level_for(elevation, thresholds) as i64),
            KEY_TERRAIN,
            values.string(&terrain.to_string()),
        ];
        features.push(Feature {
            id: None,
            tags,
            r#type: Some(GeomType::Linestring as i32),
            geometry: encoded,
        });
    };

    match set {
        IsolineSet::Unclassified(lines) => {
            for (multiple, level_lines) in lines {
                for line in level_lines {
                    push_feature(
                        &mut values,
                        &mut features,
                        *multiple,
                        line,
                        TerrainType::Normal,
                    );
                }
            }
        }
        IsolineSet::Classified(segments) => {
            for (multiple, level_segments) in segments {
                for segment in level_segments {
                    push_feature(
                        &mut values,
                        &mut features,
                        *multiple,
                        &segment.geometry,
                        segment.terrain,
                    );
                }
            }
        }
    }

    debug!(features = features.len(), layer = %options.contour_layer, "encoded contour tile");
    let layer = Layer {
        version: 2,
        name: options.contour_layer.clone(),
        features,
        keys: vec![
            options.elevation_key.clone(),
            options.level_key.clone(),
            "terrain_type".to_string(),
        ],
        values: values.values,
        extent: Some(options.extent as u32),
    };
    Tile { layers: vec![layer] }.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isoline::LevelLines;
    use crate::terrain::ClassifiedSegment;
    use std::collections::BTreeMap;

    fn options() -> ContourTileOptions {
        ContourTileOptions::default()
    }

    fn decode(bytes: &[u8]) -> Tile {
        Tile::decode(bytes).unwrap()
    }

    fn tag_value<'a>(layer: &'a Layer, feature: &Feature, key: &str) -> &'a Value {
        let key_idx = layer.keys.iter().position(|k| k == key).unwrap() as u32;
        let pair = feature
            .tags
            .chunks_exact(2)
            .find(|pair| pair[0] == key_idx)
            .unwrap();
        &layer.values[pair[1] as usize]
    }

    #[test]
    fn test_encode_unclassified_lines() {
        let mut lines: LevelLines = BTreeMap::new();
        lines.insert(1, vec![vec![0, 0, 100, 0, 100, 100]]);
        lines.insert(5, vec![vec![10, 10, 20, 20]]);
        let set = IsolineSet::Unclassified(lines);

        let bytes = encode_contour_tile(&set, &[100.0, 500.0], &options());
        let tile = decode(&bytes);
        assert_eq!(tile.layers.len(), 1);
        let layer = &tile.layers[0];
        assert_eq!(layer.name, "contours");
        assert_eq!(layer.extent, Some(4096));
        assert_eq!(layer.keys, vec!["ele", "level", "terrain_type"]);
        assert_eq!(layer.features.len(), 2);

        let first = &layer.features[0];
        assert_eq!(first.r#type, Some(GeomType::Linestring as i32));
        assert_eq!(tag_value(layer, first, "ele").int_value, Some(100));
        assert_eq!(tag_value(layer, first, "level").int_value, Some(0));
        assert_eq!(
            tag_value(layer, first, "terrain_type").string_value.as_deref(),
            Some("normal")
        );

        let second = &layer.features[1];
        assert_eq!(tag_value(layer, second, "ele").int_value, Some(500));
        assert_eq!(tag_value(layer, second, "level").int_value, Some(1));
    }

    #[test]
    fn test_encode_classified_segments() {
        let mut segments = BTreeMap::new();
        segments.insert(
            2,
            vec![
                ClassifiedSegment {
                    geometry: vec![0, 2048, 1024, 2048],
                    terrain: TerrainType::Normal,
                },
                ClassifiedSegment {
                    geometry: vec![1024, 2048, 3072, 2048],
                    terrain: TerrainType::Glacier,
                },
            ],
        );
        let set = IsolineSet::Classified(segments);

        let bytes = encode_contour_tile(&set, &[100.0, 500.0], &options());
        let tile = decode(&bytes);
        let layer = &tile.layers[0];
        assert_eq!(layer.features.len(), 2);
        assert_eq!(
            tag_value(layer, &layer.features[1], "terrain_type")
                .string_value
                .as_deref(),
            Some("glacier")
        );
        assert_eq!(
            tag_value(layer, &layer.features[0], "ele").int_value,
            Some(200)
        );
    }

    #[test]
    fn test_geometry_command_stream() {
        let encoded = encode_geometry(&[10, 20, 30, 20, 30, 40]);
        assert_eq!(
            encoded,
            vec![
                command(CMD_MOVE_TO, 1),
                zigzag(10),
                zigzag(20),
                command(CMD_LINE_TO, 2),
                zigzag(20),
                zigzag(0),
                zigzag(0),
                zigzag(20),
            ]
        );
    }

    #[test]
    fn test_values_deduplicated() {
        let mut lines: LevelLines = BTreeMap::new();
        // Two lines at the same level share every attribute value.
        lines.insert(1, vec![vec![0, 0, 10, 10], vec![20, 20, 30, 30]]);
        let set = IsolineSet::Unclassified(lines);
        let bytes = encode_contour_tile(&set, &[100.0], &options());
        let tile = decode(&bytes);
        // 100 (ele), 0 (level), "normal": three values for two features.
        assert_eq!(tile.layers[0].values.len(), 3);
    }

    #[test]
    fn test_empty_set_encodes_empty_layer() {
        let set = IsolineSet::Unclassified(BTreeMap::new());
        let bytes = encode_contour_tile(&set, &[100.0], &options());
        let tile = decode(&bytes);
        assert_eq!(tile.layers.len(), 1);
        assert!(tile.layers[0].features.is_empty());
    }

    #[test]
    fn test_degenerate_geometry_skipped() {
        let mut lines: LevelLines = BTreeMap::new();
        lines.insert(1, vec![vec![5, 5]]);
        let set = IsolineSet::Unclassified(lines);
        let bytes = encode_contour_tile(&set, &[100.0], &options());
        let tile = decode(&bytes);
        assert!(tile.layers[0].features.is_empty());
    }
}
