//! Test utilities for integration tests.
//!
//! Mock renderer managers that count lifecycle calls and can be made slow or
//! failing, plus helpers for building routers and reading responses.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tile_pool::projection::BoundingBox;
use tile_pool::{
    create_router, KeyedPool, Manager, PoolConfig, Renderer, RouterConfig, TileError, TileService,
};

// =============================================================================
// Mock Renderer
// =============================================================================

/// Counters shared between a manager and every renderer it creates.
#[derive(Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub renders: AtomicUsize,
    /// Renders currently executing
    pub rendering: AtomicUsize,
    /// Highest value `rendering` has reached
    pub max_rendering: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn max_rendering(&self) -> usize {
        self.max_rendering.load(Ordering::SeqCst)
    }
}

/// Renderer producing a solid tile, optionally slowly or with an error.
pub struct MockRenderer {
    counters: Arc<Counters>,
    viewport: Option<BoundingBox>,
    render_delay: Duration,
    fail: bool,
}

impl Renderer for MockRenderer {
    fn dimensions(&self) -> (u32, u32) {
        (256, 256)
    }

    fn set_viewport(&mut self, bbox: BoundingBox) {
        self.viewport = Some(bbox);
    }

    fn render(&mut self) -> Result<RgbaImage, TileError> {
        let active = self.counters.rendering.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_rendering
            .fetch_max(active, Ordering::SeqCst);

        if !self.render_delay.is_zero() {
            // Renders run on a blocking worker
            std::thread::sleep(self.render_delay);
        }

        self.counters.rendering.fetch_sub(1, Ordering::SeqCst);
        self.counters.renders.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(TileError::Render {
                message: "mock renderer failure".to_string(),
            });
        }
        if self.viewport.is_none() {
            return Err(TileError::Render {
                message: "viewport not set".to_string(),
            });
        }

        Ok(RgbaImage::from_pixel(256, 256, Rgba([40, 90, 160, 255])))
    }
}

// =============================================================================
// Mock Manager
// =============================================================================

/// Manager creating [`MockRenderer`]s for a fixed set of styles.
pub struct MockManager {
    pub counters: Arc<Counters>,
    create_delay: Duration,
    render_delay: Duration,
    fail_create: AtomicBool,
    fail_render: AtomicBool,
}

impl MockManager {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            create_delay: Duration::ZERO,
            render_delay: Duration::ZERO,
            fail_create: AtomicBool::new(false),
            fail_render: AtomicBool::new(false),
        }
    }

    /// Constructor sleeps for `delay` before returning.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Each render blocks its worker for `delay`.
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn failing_create(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_render(self) -> Self {
        self.fail_render.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Manager for MockManager {
    type Key = String;
    type Resource = MockRenderer;
    type Error = String;

    async fn create(&self, key: &String) -> Result<MockRenderer, String> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(format!("style '{}' failed to load", key));
        }

        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockRenderer {
            counters: Arc::clone(&self.counters),
            viewport: None,
            render_delay: self.render_delay,
            fail: self.fail_render.load(Ordering::SeqCst),
        })
    }

    fn destroy(&self, _key: &String, _resource: MockRenderer) -> Result<(), String> {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Pool config with short timeouts suitable for tests.
pub fn pool_config(max_size: usize) -> PoolConfig {
    PoolConfig::new(max_size, Duration::from_secs(5), Duration::from_secs(5))
}

/// Build a service serving `osm` (default) and `dark`.
pub fn service(manager: MockManager, config: PoolConfig) -> TileService<MockManager> {
    let pool = KeyedPool::new(manager, config);
    TileService::new(pool, "osm").with_styles(["dark"])
}

/// Build a router over [`service`], returning the pool for inspection.
pub fn router(manager: MockManager, config: PoolConfig) -> (Router, KeyedPool<MockManager>) {
    let service = service(manager, config);
    let pool = service.pool().clone();
    (create_router(service, RouterConfig::new()), pool)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Check for the PNG file signature.
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

/// Check for JPEG SOI and EOI markers.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data.starts_with(&[0xFF, 0xD8]) && data.ends_with(&[0xFF, 0xD9])
}
