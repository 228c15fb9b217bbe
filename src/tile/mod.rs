//! Tile service layer.
//!
//! # Architecture
//!
//! The tile service sits between the HTTP layer and the renderer pool:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  projection  │  │  TileEncoder    │  │
//! │  │  (z/x/y ->   │  │  (RGBA ->       │  │
//! │  │   bbox)      │  │   PNG / JPEG)   │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        KeyedPool<renderer factory>      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point for tile requests, orchestrates the full pipeline
//! - [`TileRequest`]: Parsed `z/x/y.ext` request plus optional style
//! - [`TileResponse`]: Encoded image and its metadata
//! - [`TileEncoder`]: Encodes rendered RGBA images as PNG or JPEG

mod encoder;
mod service;

pub use encoder::{
    clamp_quality, is_valid_quality, TileEncoder, TileFormat, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use service::{TileRequest, TileResponse, TileService};
