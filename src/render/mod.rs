//! Renderers and the styles they draw.
//!
//! # Components
//!
//! - [`Renderer`]: Capability the tile service drives (viewport in, pixels out)
//! - [`RasterRenderer`]: Built-in renderer painting a [`Style`]
//! - [`StyleSet`]: Styles loaded at startup, the first one is the default
//! - [`StyleRendererFactory`]: Pool [`Manager`](crate::pool::Manager) creating
//!   renderers per style

mod factory;
mod raster;
mod style;

pub use factory::StyleRendererFactory;
pub use raster::RasterRenderer;
pub use style::{Area, Color, Graticule, Style, StyleSet, StyleSource};

use image::RgbaImage;

use crate::error::TileError;
use crate::projection::BoundingBox;

/// A stateful map renderer.
///
/// A renderer is used by one request at a time: the tile service sets the
/// viewport and renders while holding it exclusively from the pool.
pub trait Renderer: Send + 'static {
    /// Output size in pixels, `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Set the extent, in the renderer's projection, of the next render.
    fn set_viewport(&mut self, bbox: BoundingBox);

    /// Render the current viewport.
    fn render(&mut self) -> Result<RgbaImage, TileError>;
}
