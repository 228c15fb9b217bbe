//! Built-in raster renderer.
//!
//! Paints a [`Style`] into an RGBA canvas covering the current viewport.
//! With a non-zero `buffer_size` the canvas is rendered `buffer_size` pixels
//! larger on every side and cropped back, so features just outside the tile
//! are drawn consistently across tile edges.

use std::ops::RangeInclusive;
use std::sync::Arc;

use image::{imageops, Rgba, RgbaImage};

use super::style::{Color, Style};
use super::Renderer;
use crate::error::TileError;
use crate::projection::BoundingBox;

/// Renders one style at a fixed pixel size. Not shared between renders.
#[derive(Debug)]
pub struct RasterRenderer {
    style: Arc<Style>,
    width: u32,
    height: u32,
    buffer_size: u32,
    viewport: Option<BoundingBox>,
    canvas: RgbaImage,
}

impl RasterRenderer {
    pub fn new(style: Arc<Style>, width: u32, height: u32, buffer_size: u32) -> Self {
        let canvas = RgbaImage::new(width + 2 * buffer_size, height + 2 * buffer_size);
        Self {
            style,
            width,
            height,
            buffer_size,
            viewport: None,
            canvas,
        }
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn viewport(&self) -> Option<BoundingBox> {
        self.viewport
    }

    /// Release the canvas. The renderer cannot render afterwards.
    pub fn clear(&mut self) {
        self.canvas = RgbaImage::new(0, 0);
        self.viewport = None;
    }

    /// The viewport grown by `buffer_size` pixels on every side.
    fn buffered_extent(&self, viewport: &BoundingBox) -> BoundingBox {
        let pad_x = viewport.width() / f64::from(self.width) * f64::from(self.buffer_size);
        let pad_y = viewport.height() / f64::from(self.height) * f64::from(self.buffer_size);
        BoundingBox::new(
            viewport.min_x - pad_x,
            viewport.min_y - pad_y,
            viewport.max_x + pad_x,
            viewport.max_y + pad_y,
        )
    }

    fn paint(&mut self, extent: &BoundingBox) {
        let style = Arc::clone(&self.style);
        let mut painter = Painter::new(&mut self.canvas, extent);

        painter.fill(style.background);

        for area in &style.areas {
            let [min_x, min_y, max_x, max_y] = area.bbox;
            painter.fill_rect(&BoundingBox::new(min_x, min_y, max_x, max_y), area.color);
        }

        if let Some(graticule) = &style.graticule {
            let (canvas_w, canvas_h) = painter.dimensions();

            let columns = grid_lines(extent.min_x, extent.max_x, graticule.spacing, canvas_w);
            for i in columns.into_iter().flatten() {
                painter.vertical_line(
                    i as f64 * graticule.spacing,
                    graticule.width,
                    graticule.color,
                );
            }

            let rows = grid_lines(extent.min_y, extent.max_y, graticule.spacing, canvas_h);
            for i in rows.into_iter().flatten() {
                painter.horizontal_line(
                    i as f64 * graticule.spacing,
                    graticule.width,
                    graticule.color,
                );
            }
        }
    }
}

/// Multiples of `spacing` within `[min, max]`.
///
/// `None` when there would be more lines than pixels along the axis; lines
/// that dense would fill the canvas, so the graticule is left out at that
/// scale.
fn grid_lines(min: f64, max: f64, spacing: f64, pixels: u32) -> Option<RangeInclusive<i64>> {
    let first = (min / spacing).ceil();
    let last = (max / spacing).floor();
    if !first.is_finite() || !last.is_finite() || last - first + 1.0 > f64::from(pixels) {
        return None;
    }
    Some(first as i64..=last as i64)
}

impl Renderer for RasterRenderer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_viewport(&mut self, bbox: BoundingBox) {
        self.viewport = Some(bbox);
    }

    fn render(&mut self) -> Result<RgbaImage, TileError> {
        let viewport = self.viewport.ok_or_else(|| TileError::Render {
            message: "viewport not set".to_string(),
        })?;

        if !viewport.is_valid() {
            return Err(TileError::Render {
                message: format!("invalid viewport {:?}", viewport),
            });
        }

        let expected = (
            self.width + 2 * self.buffer_size,
            self.height + 2 * self.buffer_size,
        );
        if self.canvas.dimensions() != expected {
            return Err(TileError::Render {
                message: "renderer canvas has been released".to_string(),
            });
        }

        let extent = self.buffered_extent(&viewport);
        self.paint(&extent);

        Ok(imageops::crop_imm(
            &self.canvas,
            self.buffer_size,
            self.buffer_size,
            self.width,
            self.height,
        )
        .to_image())
    }
}

// =============================================================================
// Painter
// =============================================================================

/// Maps projected coordinates onto canvas pixels.
struct Painter<'a> {
    canvas: &'a mut RgbaImage,
    extent: BoundingBox,
    scale_x: f64,
    scale_y: f64,
}

impl<'a> Painter<'a> {
    fn new(canvas: &'a mut RgbaImage, extent: &BoundingBox) -> Self {
        let scale_x = f64::from(canvas.width()) / extent.width();
        let scale_y = f64::from(canvas.height()) / extent.height();
        Self {
            canvas,
            extent: *extent,
            scale_x,
            scale_y,
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn column(&self, x: f64) -> f64 {
        (x - self.extent.min_x) * self.scale_x
    }

    // Image rows grow downwards, projected y grows upwards
    fn row(&self, y: f64) -> f64 {
        (self.extent.max_y - y) * self.scale_y
    }

    fn fill(&mut self, color: Color) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba(color.0);
        }
    }

    /// Blend `color` over the pixels whose centres fall in the pixel range.
    fn blend_span(&mut self, x0: f64, x1: f64, y0: f64, y1: f64, color: Color) {
        let clamp_x = |v: f64| v.round().clamp(0.0, f64::from(self.canvas.width())) as u32;
        let clamp_y = |v: f64| v.round().clamp(0.0, f64::from(self.canvas.height())) as u32;

        let (col_start, col_end) = (clamp_x(x0.min(x1)), clamp_x(x0.max(x1)));
        let (row_start, row_end) = (clamp_y(y0.min(y1)), clamp_y(y0.max(y1)));

        for row in row_start..row_end {
            for col in col_start..col_end {
                let pixel = self.canvas.get_pixel_mut(col, row);
                *pixel = blend(*pixel, color);
            }
        }
    }

    fn fill_rect(&mut self, bbox: &BoundingBox, color: Color) {
        if !bbox.intersects(&self.extent) {
            return;
        }
        let (x0, x1) = (self.column(bbox.min_x), self.column(bbox.max_x));
        let (y0, y1) = (self.row(bbox.max_y), self.row(bbox.min_y));
        self.blend_span(x0, x1, y0, y1, color);
    }

    fn vertical_line(&mut self, x: f64, width: u32, color: Color) {
        let centre = self.column(x);
        let half = f64::from(width) / 2.0;
        let height = f64::from(self.canvas.height());
        self.blend_span(centre - half, centre + half, 0.0, height, color);
    }

    fn horizontal_line(&mut self, y: f64, width: u32, color: Color) {
        let centre = self.row(y);
        let half = f64::from(width) / 2.0;
        let width_px = f64::from(self.canvas.width());
        self.blend_span(0.0, width_px, centre - half, centre + half, color);
    }
}

/// Source-over compositing of `src` onto `dst`.
fn blend(dst: Rgba<u8>, src: Color) -> Rgba<u8> {
    let [sr, sg, sb, sa] = src.0;
    if sa == 255 {
        return Rgba(src.0);
    }
    if sa == 0 {
        return dst;
    }

    let sa_f = f32::from(sa) / 255.0;
    let da_f = f32::from(dst.0[3]) / 255.0;
    let out_a = sa_f + da_f * (1.0 - sa_f);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |s: u8, d: u8| {
        let v = (f32::from(s) * sa_f + f32::from(d) * da_f * (1.0 - sa_f)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(sr, dst.0[0]),
        channel(sg, dst.0[1]),
        channel(sb, dst.0[2]),
        (out_a * 255.0).round() as u8,
    ])
}
