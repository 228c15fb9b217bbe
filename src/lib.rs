//! # tile-pool
//!
//! An XYZ map tile server that renders tiles on demand through a bounded,
//! per-style pool of renderers.
//!
//! A request `/{z}/{x}/{y}.png` is turned into a Spherical Mercator bounding
//! box, a renderer for the style is borrowed from the pool (waiting in FIFO
//! order when all are busy), the tile is rendered and encoded, and the
//! renderer goes back to the pool for the next request.
//!
//! ## Architecture
//!
//! - [`projection`] - Tile index to EPSG:3857 bounding box math and reprojection
//! - [`pool`] - Keyed, bounded, FIFO resource pool with idle expiry
//! - [`render`] - Renderer capability, built-in raster renderer and styles
//! - [`tile`] - Tile service and image encoding
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tile_pool::{
//!     create_router, KeyedPool, PoolConfig, RouterConfig, Style, StyleRendererFactory,
//!     StyleSet, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let styles = StyleSet::from_styles(vec![("osm".to_string(), Style::default())])?;
//!     let factory = StyleRendererFactory::new(styles, 256, 256, 0);
//!     let pool = KeyedPool::new(factory, PoolConfig::default());
//!
//!     let service = TileService::new(pool, "osm");
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod projection;
pub mod render;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use config::Config;
pub use error::{PoolError, ProjectionError, StyleError, TileError};
pub use pool::{KeyedPool, Manager, PoolConfig, PoolStatus, PooledResource};
pub use projection::{
    reproject_bbox, tile_to_bbox, BoundingBox, Proj4Transform, ProjectionTransform, Srs,
    TileIndex,
};
pub use render::{RasterRenderer, Renderer, Style, StyleRendererFactory, StyleSet, StyleSource};
pub use server::{create_router, AppState, HealthResponse, RouterConfig};
pub use tile::{TileEncoder, TileFormat, TileRequest, TileResponse, TileService};
