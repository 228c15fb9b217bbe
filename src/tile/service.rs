//! Tile Service for orchestrating tile rendering.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Tile -> bbox      4. Set viewport + render          │    │
//! │  │  2. Check style       5. Release renderer               │    │
//! │  │  3. Acquire renderer  6. Encode                         │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌────────────┐      ┌──────────────┐     ┌──────────────┐    │
//! │    │ projection │      │  KeyedPool   │     │ TileEncoder  │    │
//! │    └────────────┘      └──────────────┘     └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 4-6 run on a blocking worker so rendering never stalls the async
//! runtime. The renderer is released exactly once on that worker, whether
//! rendering succeeds or fails and whether or not the client is still
//! waiting.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::error::{PoolError, TileError};
use crate::pool::{KeyedPool, Manager};
use crate::projection::{reproject_bbox, tile_to_bbox, Proj4Transform, ProjectionTransform, Srs};
use crate::render::Renderer;

use super::encoder::{TileEncoder, TileFormat};

// =============================================================================
// Tile Request
// =============================================================================

/// A request for one map tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Style name; `None` selects the default style
    pub style: Option<String>,

    /// Zoom level
    pub z: u8,

    /// Tile column
    pub x: u32,

    /// Tile row
    pub y: u32,

    /// Output image format
    pub format: TileFormat,
}

impl TileRequest {
    /// Create a PNG request against the default style.
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self {
            style: None,
            z,
            x,
            y,
            format: TileFormat::Png,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    /// Parse raw path segments, where `filename` is `{y}.{ext}`.
    ///
    /// Only checks syntax. Whether the index exists at zoom `z` is decided
    /// when the tile is projected.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for non-numeric or overflowing components and
    /// for a missing or unsupported extension.
    pub fn parse(z: &str, x: &str, filename: &str) -> Result<Self, TileError> {
        let (y, ext) = filename
            .rsplit_once('.')
            .ok_or_else(|| TileError::BadRequest {
                message: format!("tile '{}' has no file extension", filename),
            })?;

        let format = TileFormat::from_extension(ext).ok_or_else(|| TileError::BadRequest {
            message: format!("unsupported tile format '{}', expected png or jpg", ext),
        })?;

        Ok(Self {
            style: None,
            z: parse_component("z", z)?,
            x: parse_component("x", x)?,
            y: parse_component("y", y)?,
            format,
        })
    }
}

fn parse_component<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, TileError> {
    let bad = || TileError::BadRequest {
        message: format!("tile {} '{}' is not a valid integer", name, value),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    value.parse().map_err(|_| bad())
}

// =============================================================================
// Tile Response
// =============================================================================

/// A rendered, encoded tile.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Encoded image bytes
    pub data: Bytes,

    pub format: TileFormat,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,
}

impl TileResponse {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service turning tile requests into encoded images.
///
/// # Type Parameters
///
/// * `M` - Pool manager producing renderers keyed by style name
///
/// # Example
///
/// ```ignore
/// let pool = KeyedPool::new(factory, PoolConfig::default());
/// let service = TileService::new(pool, "osm").with_transpose_rows(true);
///
/// let response = service.get_tile(TileRequest::new(14, 4959, 6060)).await?;
/// println!("{} bytes of {}", response.data.len(), response.content_type());
/// ```
pub struct TileService<M>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    pool: KeyedPool<M>,

    /// Style served when the request names none
    default_style: String,

    /// Every style that may be requested
    styles: HashSet<String>,

    /// `true` counts rows from the north (XYZ), `false` from the south (TMS)
    transpose_rows: bool,

    /// Projection the renderers draw in
    srs: Srs,

    transform: Arc<dyn ProjectionTransform>,

    encoder: TileEncoder,
}

impl<M> TileService<M>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    /// Create a service serving `default_style` in XYZ row order, EPSG:3857.
    pub fn new(pool: KeyedPool<M>, default_style: impl Into<String>) -> Self {
        let default_style = default_style.into();
        let styles = HashSet::from([default_style.clone()]);
        Self {
            pool,
            default_style,
            styles,
            transpose_rows: true,
            srs: Srs::WEB_MERCATOR,
            transform: Arc::new(Proj4Transform::new()),
            encoder: TileEncoder::default(),
        }
    }

    /// Register additional requestable styles.
    pub fn with_styles<I, S>(mut self, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.styles.extend(styles.into_iter().map(Into::into));
        self
    }

    pub fn with_transpose_rows(mut self, transpose_rows: bool) -> Self {
        self.transpose_rows = transpose_rows;
        self
    }

    /// Reproject viewports into `srs` before rendering.
    pub fn with_srs(mut self, srs: Srs) -> Self {
        self.srs = srs;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ProjectionTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_encoder(mut self, encoder: TileEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn pool(&self) -> &KeyedPool<M> {
        &self.pool
    }

    pub fn default_style(&self) -> &str {
        &self.default_style
    }

    pub fn has_style(&self, style: &str) -> bool {
        self.styles.contains(style)
    }

    /// Requestable styles, sorted by name.
    pub fn styles(&self) -> Vec<String> {
        let mut styles: Vec<_> = self.styles.iter().cloned().collect();
        styles.sort();
        styles
    }

    /// Render and encode one tile.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if the index is out of range for its zoom
    /// - `StyleNotFound` for an unregistered style; the pool is not touched
    /// - `PoolExhausted`, `PoolClosed` or `Construction` from the pool
    /// - `Render` or `Encode` if producing the image fails
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let TileRequest {
            style,
            z,
            x,
            y,
            format,
        } = request;

        let bbox = tile_to_bbox(z, x, y, self.transpose_rows)?;

        let style = style.unwrap_or_else(|| self.default_style.clone());
        if !self.has_style(&style) {
            return Err(TileError::StyleNotFound { style });
        }

        let viewport = reproject_bbox(&bbox, Srs::WEB_MERCATOR, self.srs, self.transform.as_ref())?;

        let start = Instant::now();
        let renderer = match self.pool.acquire(&style).await {
            Ok(renderer) => renderer,
            Err(e) => {
                let wait_ms = start.elapsed().as_millis() as u64;
                if matches!(e, PoolError::Construction { .. }) {
                    error!(
                        style = %style,
                        z,
                        x,
                        y,
                        wait_ms,
                        error = %e,
                        "Renderer construction failed"
                    );
                } else {
                    warn!(style = %style, z, x, y, wait_ms, error = %e, "No renderer for tile");
                }
                return Err(e.into());
            }
        };
        let wait_ms = start.elapsed().as_millis() as u64;

        let encoder = self.encoder;
        let render_start = Instant::now();

        let rendered = tokio::task::spawn_blocking(move || {
            let mut renderer = renderer;
            renderer.set_viewport(viewport);
            let rendered = renderer.render();
            // Return the renderer before the comparatively slow encode
            drop(renderer);

            let image = rendered?;
            let data = encoder.encode(&image, format)?;
            Ok::<_, TileError>((data, image.width(), image.height()))
        })
        .await
        .map_err(|e| TileError::Render {
            message: format!("render task failed: {}", e),
        })
        .and_then(|result| result);

        let (data, width, height) = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(
                    style = %style,
                    z,
                    x,
                    y,
                    format = %format,
                    wait_ms,
                    error = %e,
                    "Tile render failed"
                );
                return Err(e);
            }
        };

        debug!(
            style = %style,
            z,
            x,
            y,
            format = %format,
            wait_ms,
            render_ms = render_start.elapsed().as_millis() as u64,
            bytes = data.len(),
            "Rendered tile"
        );

        Ok(TileResponse {
            data,
            format,
            width,
            height,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
