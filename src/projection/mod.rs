//! Tile projection layer.
//!
//! Converts XYZ/TMS tile indices to Spherical Mercator bounding boxes and
//! back, and reprojects extents into other reference systems.
//!
//! # Example
//!
//! ```
//! use tile_pool::projection::{tile_to_bbox, WORLD_EXTENT};
//!
//! let world = tile_to_bbox(0, 0, 0, true).unwrap();
//! assert_eq!(world.max_x, WORLD_EXTENT);
//!
//! // Out-of-range indices are rejected
//! assert!(tile_to_bbox(1, 2, 0, true).is_err());
//! ```

mod mercator;
mod reproject;

pub use mercator::{
    lon_lat_to_mercator, mercator_to_lon_lat, pixel_to_point, point_to_pixel, point_to_tile,
    tile_to_bbox, tile_to_lon_lat_bbox, tiles_at_zoom, BoundingBox, TileIndex, EARTH_RADIUS,
    MAX_LATITUDE, MAX_ZOOM, TILE_SIZE, WORLD_EXTENT,
};
pub use reproject::{reproject_bbox, Proj4Transform, ProjectionTransform, Srs};
