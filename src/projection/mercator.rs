//! Spherical Mercator tile math.
//!
//! All functions here are pure: the same input always yields bit-identical
//! output. Tile corners are computed as `-EXTENT + i * size` from the integer
//! index, never by accumulating offsets, so adjacent tiles share their edges
//! exactly and the four children of a tile partition it without gaps.

use std::f64::consts::PI;

use crate::error::ProjectionError;

/// Half the circumference of the Web Mercator sphere, in meters.
pub const WORLD_EXTENT: f64 = 20_037_508.342_789_244;

/// Radius of the sphere used by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which the Mercator square ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// Size of a tile in pixels for pixel-space conversions.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level accepted by the tile math.
pub const MAX_ZOOM: u8 = 30;

// =============================================================================
// Bounding Box
// =============================================================================

/// Rectangular extent in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.min_x + self.width() / 2.0,
            self.min_y + self.height() / 2.0,
        )
    }

    /// Whether the box has positive width and height.
    pub fn is_valid(&self) -> bool {
        self.min_x < self.max_x && self.min_y < self.max_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow the box on every side by `amount` in its own units.
    pub fn expand(&self, amount: f64) -> Self {
        Self::new(
            self.min_x - amount,
            self.min_y - amount,
            self.max_x + amount,
            self.max_y + amount,
        )
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

// =============================================================================
// Tile Index
// =============================================================================

/// A validated `(z, x, y)` tile address.
///
/// Only constructed through [`TileIndex::new`] or derived from a valid index,
/// so `x, y < 2^z` and `z <= MAX_ZOOM` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    z: u8,
    x: u32,
    y: u32,
}

impl TileIndex {
    /// Create a tile index, checking the zoom and that `x, y < 2^z`.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, ProjectionError> {
        let limit = tiles_at_zoom(z)?;
        if u64::from(x) >= limit || u64::from(y) >= limit {
            return Err(ProjectionError::InvalidIndex { z, x, y, limit });
        }
        Ok(Self { z, x, y })
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Bounding box of this tile in EPSG:3857 meters.
    pub fn bbox(&self, transpose_rows: bool) -> BoundingBox {
        corners(self.z, self.x, self.y, transpose_rows)
    }

    /// The four tiles one zoom level down, row-major from the first row.
    pub fn children(&self) -> Option<[TileIndex; 4]> {
        if self.z >= MAX_ZOOM {
            return None;
        }
        // x, y < 2^29 here, so doubling stays within u32
        let (z, x, y) = (self.z + 1, self.x * 2, self.y * 2);
        Some([
            TileIndex { z, x, y },
            TileIndex { z, x: x + 1, y },
            TileIndex { z, x, y: y + 1 },
            TileIndex {
                z,
                x: x + 1,
                y: y + 1,
            },
        ])
    }

    pub fn parent(&self) -> Option<TileIndex> {
        if self.z == 0 {
            return None;
        }
        Some(TileIndex {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }
}

/// Number of tiles along one axis at zoom `z`.
pub fn tiles_at_zoom(z: u8) -> Result<u64, ProjectionError> {
    if z > MAX_ZOOM {
        return Err(ProjectionError::InvalidZoom { z, max: MAX_ZOOM });
    }
    Ok(1u64 << z)
}

/// Compute the projected bounding box of tile `(z, x, y)`.
///
/// Projected `y` grows northward. With `transpose_rows = true` rows run the
/// other way, XYZ style (row 0 at the north edge); with `transpose_rows =
/// false` they follow projected `y`, TMS style (row 0 at the south edge).
///
/// # Errors
///
/// `InvalidZoom` above [`MAX_ZOOM`], `InvalidIndex` when `x` or `y` fall
/// outside `[0, 2^z)`.
pub fn tile_to_bbox(
    z: u8,
    x: u32,
    y: u32,
    transpose_rows: bool,
) -> Result<BoundingBox, ProjectionError> {
    TileIndex::new(z, x, y).map(|tile| tile.bbox(transpose_rows))
}

fn corners(z: u8, x: u32, y: u32, transpose_rows: bool) -> BoundingBox {
    // Division by a power of two is exact, so size carries no rounding error
    let size = 2.0 * WORLD_EXTENT / (1u64 << z) as f64;

    let min_x = -WORLD_EXTENT + f64::from(x) * size;
    let max_x = -WORLD_EXTENT + f64::from(x + 1) * size;

    let (min_y, max_y) = if transpose_rows {
        (
            WORLD_EXTENT - (f64::from(y) + 1.0) * size,
            WORLD_EXTENT - f64::from(y) * size,
        )
    } else {
        (
            -WORLD_EXTENT + f64::from(y) * size,
            -WORLD_EXTENT + (f64::from(y) + 1.0) * size,
        )
    };

    BoundingBox::new(min_x, min_y, max_x, max_y)
}

// =============================================================================
// Pixel Space
// =============================================================================

/// Map a projected point to global pixel coordinates at zoom `z`.
///
/// Pixel space has its origin at the north-west corner of the world and
/// spans `256 * 2^z` pixels on each axis.
pub fn point_to_pixel(point: (f64, f64), z: u8) -> (f64, f64) {
    let world_px = world_pixels(z);
    let px = (point.0 + WORLD_EXTENT) / (2.0 * WORLD_EXTENT) * world_px;
    let py = (WORLD_EXTENT - point.1) / (2.0 * WORLD_EXTENT) * world_px;
    (px, py)
}

/// Inverse of [`point_to_pixel`].
pub fn pixel_to_point(pixel: (f64, f64), z: u8) -> (f64, f64) {
    let world_px = world_pixels(z);
    let x = pixel.0 / world_px * (2.0 * WORLD_EXTENT) - WORLD_EXTENT;
    let y = WORLD_EXTENT - pixel.1 / world_px * (2.0 * WORLD_EXTENT);
    (x, y)
}

fn world_pixels(z: u8) -> f64 {
    f64::from(TILE_SIZE) * 2f64.powi(i32::from(z))
}

/// XYZ tile containing a projected point, clamped to the world.
pub fn point_to_tile(point: (f64, f64), z: u8) -> Result<TileIndex, ProjectionError> {
    let limit = tiles_at_zoom(z)?;
    let (px, py) = point_to_pixel(point, z);
    let clamp = |v: f64| -> u32 {
        let tile = (v / f64::from(TILE_SIZE)).floor();
        tile.clamp(0.0, (limit - 1) as f64) as u32
    };
    Ok(TileIndex {
        z,
        x: clamp(px),
        y: clamp(py),
    })
}

// =============================================================================
// Geographic Conversions
// =============================================================================

/// Forward Spherical Mercator: WGS84 degrees to EPSG:3857 meters.
///
/// Latitude is clamped to the Mercator square.
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon * WORLD_EXTENT / 180.0;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

/// Inverse Spherical Mercator: EPSG:3857 meters to WGS84 degrees.
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 180.0 / WORLD_EXTENT;
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Bounding box of a tile in WGS84 degrees `(west, south, east, north)`.
pub fn tile_to_lon_lat_bbox(
    z: u8,
    x: u32,
    y: u32,
    transpose_rows: bool,
) -> Result<BoundingBox, ProjectionError> {
    let bbox = tile_to_bbox(z, x, y, transpose_rows)?;
    let (west, south) = mercator_to_lon_lat(bbox.min_x, bbox.min_y);
    let (east, north) = mercator_to_lon_lat(bbox.max_x, bbox.max_y);
    Ok(BoundingBox::new(west, south, east, north))
}

// =============================================================================
// Tests
// =============================================================================
