//! Pool manager that builds renderers from the loaded styles.

use async_trait::async_trait;
use tracing::debug;

use super::raster::RasterRenderer;
use super::style::StyleSet;
use crate::error::StyleError;
use crate::pool::Manager;

/// Creates one [`RasterRenderer`] per pool slot, keyed by style name.
#[derive(Debug, Clone)]
pub struct StyleRendererFactory {
    styles: StyleSet,
    width: u32,
    height: u32,
    buffer_size: u32,
}

impl StyleRendererFactory {
    pub fn new(styles: StyleSet, width: u32, height: u32, buffer_size: u32) -> Self {
        Self {
            styles,
            width,
            height,
            buffer_size,
        }
    }

    pub fn styles(&self) -> &StyleSet {
        &self.styles
    }
}

#[async_trait]
impl Manager for StyleRendererFactory {
    type Key = String;
    type Resource = RasterRenderer;
    type Error = StyleError;

    async fn create(&self, key: &String) -> Result<RasterRenderer, StyleError> {
        let style = self.styles.get(key).ok_or_else(|| StyleError::Invalid {
            name: key.clone(),
            message: "style is not loaded".to_string(),
        })?;

        debug!(
            style = %key,
            width = self.width,
            height = self.height,
            buffer_size = self.buffer_size,
            "Creating renderer"
        );
        Ok(RasterRenderer::new(
            style,
            self.width,
            self.height,
            self.buffer_size,
        ))
    }

    fn destroy(&self, _key: &String, mut renderer: RasterRenderer) -> Result<(), StyleError> {
        renderer.clear();
        Ok(())
    }
}
