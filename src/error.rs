use std::time::Duration;

use thiserror::Error;

/// Errors raised by the tile projection functions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// Column or row outside `[0, 2^z)` for the requested zoom
    #[error("Invalid tile index {z}/{x}/{y}: x and y must be in [0, {limit})")]
    InvalidIndex { z: u8, x: u32, y: u32, limit: u64 },

    /// Zoom level above the supported maximum
    #[error("Invalid zoom level {z}: maximum supported zoom is {max}")]
    InvalidZoom { z: u8, max: u8 },

    /// Spatial reference identifier that could not be parsed or resolved
    #[error("Unsupported spatial reference: {0}")]
    UnsupportedSrs(String),

    /// Failure reported by the coordinate transform capability
    #[error("Coordinate transform failed: {0}")]
    Transform(String),
}

/// Errors returned by the keyed resource pool
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// No resource became available within the acquire timeout
    #[error("Pool exhausted for key '{key}': no resource available after {}ms", waited.as_millis())]
    Exhausted { key: String, waited: Duration },

    /// The pool has been shut down
    #[error("Pool is closed")]
    Closed,

    /// The manager failed to construct a new resource
    #[error("Failed to construct resource for key '{key}': {message}")]
    Construction { key: String, message: String },
}

/// Errors raised while loading styles at startup
#[derive(Debug, Error)]
pub enum StyleError {
    /// Style file could not be read
    #[error("Failed to read style '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Style file is not valid JSON for the style schema
    #[error("Failed to parse style '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Style parsed but describes an unusable configuration
    #[error("Invalid style '{name}': {message}")]
    Invalid { name: String, message: String },
}

/// Errors that can occur while serving a tile
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Client supplied a malformed or out-of-range tile index
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Requested style is not registered
    #[error("Style not found: {style}")]
    StyleNotFound { style: String },

    /// No renderer became available within the acquire timeout
    #[error("Renderer pool exhausted for style '{style}'")]
    PoolExhausted { style: String },

    /// The renderer pool is shutting down
    #[error("Renderer pool is closed")]
    PoolClosed,

    /// Renderer construction failed
    #[error("Failed to construct renderer for style '{style}': {message}")]
    Construction { style: String, message: String },

    /// Rendering failed
    #[error("Render failed: {message}")]
    Render { message: String },

    /// Image encoding failed
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },
}

impl From<ProjectionError> for TileError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::InvalidIndex { .. } | ProjectionError::InvalidZoom { .. } => {
                TileError::BadRequest {
                    message: err.to_string(),
                }
            }
            // A reprojection failure is a server-side fault, not a client error
            ProjectionError::UnsupportedSrs(_) | ProjectionError::Transform(_) => {
                TileError::Render {
                    message: err.to_string(),
                }
            }
        }
    }
}

impl From<PoolError> for TileError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { key, .. } => TileError::PoolExhausted { style: key },
            PoolError::Closed => TileError::PoolClosed,
            PoolError::Construction { key, message } => TileError::Construction {
                style: key,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_error_maps_to_bad_request() {
        let err = ProjectionError::InvalidIndex {
            z: 1,
            x: 2,
            y: 0,
            limit: 2,
        };
        assert!(matches!(TileError::from(err), TileError::BadRequest { .. }));

        let err = ProjectionError::InvalidZoom { z: 40, max: 30 };
        assert!(matches!(TileError::from(err), TileError::BadRequest { .. }));
    }

    #[test]
    fn test_transform_error_is_internal() {
        let err = ProjectionError::Transform("boom".to_string());
        assert!(matches!(TileError::from(err), TileError::Render { .. }));
    }

    #[test]
    fn test_pool_error_mapping() {
        let err = PoolError::Exhausted {
            key: "osm".to_string(),
            waited: Duration::from_millis(50),
        };
        assert!(err.to_string().contains("50ms"));
        match TileError::from(err) {
            TileError::PoolExhausted { style } => assert_eq!(style, "osm"),
            e => panic!("Expected PoolExhausted, got {:?}", e),
        }

        assert!(matches!(
            TileError::from(PoolError::Closed),
            TileError::PoolClosed
        ));

        let err = PoolError::Construction {
            key: "osm".to_string(),
            message: "bad style".to_string(),
        };
        match TileError::from(err) {
            TileError::Construction { style, message } => {
                assert_eq!(style, "osm");
                assert_eq!(message, "bad style");
            }
            e => panic!("Expected Construction, got {:?}", e),
        }
    }
}
