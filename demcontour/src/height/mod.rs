//! Virtual elevation samplers composed from DEM tiles.
//!
//! A [`HeightTile`] is a lazy `get(x, y) -> f32` over integer coordinates.
//! Transformations (neighbor stitching, overzoom cropping, subsampling,
//! center-to-corner re-gridding, elevation scaling) compose lazily and are
//! realized by [`HeightTile::materialize`], which produces a dense grid with
//! a halo of the requested border width. NaN is the "no data" sentinel
//! everywhere: sampling outside any domain yields NaN, never an error.

use std::sync::Arc;

use crate::dem::DemTile;

/// Lazy elevation sampler over a `width` × `height` grid.
///
/// Coordinates may range outside `[0, width) × [0, height)`; how far depends
/// on the variant (stitched tiles expose a full neighbor halo, dense tiles
/// their materialized border). Out-of-domain samples are NaN.
pub struct HeightTile {
    width: usize,
    height: usize,
    source: Source,
}

enum Source {
    /// Directly backed by a single DEM tile; no halo.
    Backed { tile: Arc<DemTile> },
    /// Dense grid with `border` extra samples on every side.
    Dense { data: Vec<f32>, border: usize },
    /// Center tile plus up to 8 neighbors, row-major, center at index 4.
    Stitched { tiles: Box<[Option<Arc<DemTile>>; 9]> },
    /// Crop to a sub-region of the parent (overzoom).
    Split {
        parent: Box<HeightTile>,
        offset_x: usize,
        offset_y: usize,
    },
    /// Upsample by `factor`, sampling the parent at virtual pixel centers.
    Subsampled { parent: Box<HeightTile>, factor: usize },
    /// Average the four surrounding pixel centers onto the pixel corners.
    GridAveraged { parent: Box<HeightTile> },
    /// Multiply every elevation by `factor`.
    Scaled { parent: Box<HeightTile>, factor: f32 },
}

impl HeightTile {
    /// Wraps a decoded DEM tile without copying.
    pub fn from_raw_dem(tile: Arc<DemTile>) -> Self {
        Self {
            width: tile.width(),
            height: tile.height(),
            source: Source::Backed { tile },
        }
    }

    /// Stitches a 3×3 neighborhood into a sampler the size of the center
    /// tile whose domain extends one full tile in every direction.
    ///
    /// Returns `None` iff the center (index 4) is missing; missing cardinals
    /// become NaN holes. All present tiles are assumed to share the center's
    /// dimensions.
    pub fn combine_neighbors(tiles: [Option<Arc<DemTile>>; 9]) -> Option<Self> {
        let center = tiles[4].as_ref()?;
        let (width, height) = (center.width(), center.height());
        Some(Self {
            width,
            height,
            source: Source::Stitched {
                tiles: Box::new(tiles),
            },
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Elevation sample at `(x, y)`; NaN outside the variant's domain.
    pub fn get(&self, x: i32, y: i32) -> f32 {
        match &self.source {
            Source::Backed { tile } => tile.get(x, y),
            Source::Dense { data, border } => {
                let b = *border as i32;
                let w = self.width as i32;
                let h = self.height as i32;
                if x < -b || y < -b || x >= w + b || y >= h + b {
                    f32::NAN
                } else {
                    let stride = (w + 2 * b) as usize;
                    data[(y + b) as usize * stride + (x + b) as usize]
                }
            }
            Source::Stitched { tiles } => {
                let w = self.width as i32;
                let h = self.height as i32;
                if x < -w || y < -h || x >= 2 * w || y >= 2 * h {
                    return f32::NAN;
                }
                let col = ((x + w) / w) as usize;
                let row = ((y + h) / h) as usize;
                match &tiles[row * 3 + col] {
                    Some(tile) => tile.get(x - (col as i32 - 1) * w, y - (row as i32 - 1) * h),
                    None => f32::NAN,
                }
            }
            Source::Split {
                parent,
                offset_x,
                offset_y,
            } => parent.get(x + *offset_x as i32, y + *offset_y as i32),
            Source::Subsampled { parent, factor } => {
                let factor = *factor as f32;
                let vx = (x as f32 + 0.5) / factor - 0.5;
                let vy = (y as f32 + 0.5) / factor - 0.5;
                let left = vx.floor();
                let top = vy.floor();
                let fx = vx - left;
                let fy = vy - top;
                let (left, top) = (left as i32, top as i32);
                let tl = parent.get(left, top);
                let tr = parent.get(left + 1, top);
                let bl = parent.get(left, top + 1);
                let br = parent.get(left + 1, top + 1);
                (1.0 - fy) * ((1.0 - fx) * tl + fx * tr) + fy * ((1.0 - fx) * bl + fx * br)
            }
            Source::GridAveraged { parent } => {
                let sum = parent.get(x - 1, y - 1)
                    + parent.get(x, y - 1)
                    + parent.get(x - 1, y)
                    + parent.get(x, y);
                sum / 4.0
            }
            Source::Scaled { parent, factor } => parent.get(x, y) * factor,
        }
    }

    /// Crops to the `(sub_x, sub_y)` sub-tile of a `2^sub_z` grid, enabling
    /// overzoom: fetch a coarser ancestor and sample inside it.
    ///
    /// Samples outside the crop delegate to the parent, so a stitched
    /// parent's halo remains reachable for border materialization.
    pub fn split(self, sub_z: u8, sub_x: u32, sub_y: u32) -> Self {
        if sub_z == 0 {
            return self;
        }
        let width = self.width >> sub_z;
        let height = self.height >> sub_z;
        Self {
            width,
            height,
            source: Source::Split {
                offset_x: sub_x as usize * width,
                offset_y: sub_y as usize * height,
                parent: Box::new(self),
            },
        }
    }

    /// Upsamples so each source cell becomes `factor²` cells, interpolating
    /// between the surrounding pixel centers (for factor 2 the new samples
    /// sit on the exact midpoints of the 2×2 neighborhood).
    pub fn subsample_pixel_centers(self, factor: usize) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
            source: Source::Subsampled {
                parent: Box::new(self),
                factor,
            },
        }
    }

    /// Shifts measurements from pixel centers to pixel corners by averaging
    /// the four surrounding centers; the result is one sample wider and
    /// taller. NaN in any input propagates.
    pub fn average_pixel_centers_to_grid(self) -> Self {
        Self {
            width: self.width + 1,
            height: self.height + 1,
            source: Source::GridAveraged {
                parent: Box::new(self),
            },
        }
    }

    /// Multiplies every elevation by `factor` (lazy).
    pub fn scale_elevation(self, factor: f32) -> Self {
        if factor == 1.0 {
            return self;
        }
        Self {
            width: self.width,
            height: self.height,
            source: Source::Scaled {
                parent: Box::new(self),
                factor,
            },
        }
    }

    /// Forces the lazy composition into a dense grid covering
    /// `[-border, width + border) × [-border, height + border)`.
    ///
    /// After materialization, `get` inside the halo is O(1) and anything
    /// past it is NaN.
    pub fn materialize(&self, border: usize) -> Self {
        let b = border as i32;
        let w = self.width as i32;
        let h = self.height as i32;
        let mut data = Vec::with_capacity(((w + 2 * b) * (h + 2 * b)) as usize);
        for y in -b..h + b {
            for x in -b..w + b {
                data.push(self.get(x, y));
            }
        }
        Self {
            width: self.width,
            height: self.height,
            source: Source::Dense { data, border },
        }
    }
}
