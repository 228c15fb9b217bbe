//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile retrieval for the default and named styles, PNG and JPEG
//! - Error cases (malformed index, out of range, unknown style, pool and
//!   renderer failures)
//! - HTTP response codes, headers and plain-text error bodies

use axum::http::StatusCode;
use image::ImageReader;
use std::io::Cursor;
use std::time::Duration;
use tower::ServiceExt;

use tile_pool::{
    create_router, KeyedPool, PoolConfig, RouterConfig, Style, StyleRendererFactory, StyleSet,
    TileService,
};

use super::test_utils::{
    body_bytes, body_text, get, is_valid_jpeg, is_valid_png, pool_config, router, MockManager,
};

// =============================================================================
// Basic Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body), "Response should be a valid PNG");

    // One renderer built and returned to the pool
    assert_eq!(pool.manager().counters.created(), 1);
    let status = pool.status(&"osm".to_string()).unwrap();
    assert_eq!((status.idle, status.in_use), (1, 0));
}

#[tokio::test]
async fn test_tile_retrieval_jpeg() {
    let (router, _pool) = router(MockManager::new(), pool_config(5));

    let response = router.oneshot(get("/2/1/3.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert!(is_valid_jpeg(&body_bytes(response).await));
}

#[tokio::test]
async fn test_named_style_route() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    let response = router
        .oneshot(get("/styles/dark/3/2/1.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(pool.keys(), vec!["dark".to_string()]);
}

#[tokio::test]
async fn test_renderer_reused_across_requests() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    for uri in ["/0/0/0.png", "/1/0/0.png", "/1/1/1.png", "/14/4959/6060.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }

    let counters = &pool.manager().counters;
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.renders(), 4);
}

// =============================================================================
// Client Errors
// =============================================================================

#[tokio::test]
async fn test_non_numeric_zoom_rejected_before_pool() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    let response = router.oneshot(get("/abc/0/0.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(body_text(response).await.contains("'abc'"));

    assert_eq!(pool.manager().counters.created(), 0);
    assert!(pool.keys().is_empty());
}

#[tokio::test]
async fn test_malformed_requests_rejected() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    for uri in [
        "/0/x/0.png",
        "/0/0/y.png",
        "/0/0/0",
        "/0/0/0.gif",
        "/-1/0/0.png",
        "/300/0/0.png",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    assert_eq!(pool.manager().counters.created(), 0);
}

#[tokio::test]
async fn test_out_of_range_tile() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    for uri in ["/0/0/1.png", "/0/1/0.png", "/3/8/0.png", "/31/0/0.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    assert!(pool.keys().is_empty());
}

#[tokio::test]
async fn test_unknown_style() {
    let (router, pool) = router(MockManager::new(), pool_config(5));

    let response = router
        .oneshot(get("/styles/satellite/0/0/0.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Style not found: satellite");
    assert!(pool.keys().is_empty());
}

#[tokio::test]
async fn test_unknown_route() {
    let (router, _pool) = router(MockManager::new(), pool_config(5));

    let response = router.oneshot(get("/0/0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Server Errors
// =============================================================================

#[tokio::test]
async fn test_construction_failure() {
    let (router, pool) = router(MockManager::new().failing_create(), pool_config(1));

    let response = router.clone().oneshot(get("/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("failed to load"));

    // The failed construction did not occupy the only slot
    assert_eq!(pool.status(&"osm".to_string()).unwrap().size, 0);
    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_render_failure() {
    let (router, pool) = router(MockManager::new().failing_render(), pool_config(1));

    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_text(response).await,
        "Render failed: mock renderer failure"
    );

    // Released, not leaked
    let status = pool.status(&"osm".to_string()).unwrap();
    assert_eq!((status.idle, status.in_use), (1, 0));
}

#[tokio::test]
async fn test_pool_exhausted() {
    let config = PoolConfig::new(1, Duration::from_secs(5), Duration::from_millis(50));
    let (router, pool) = router(MockManager::new(), config);

    let _held = pool.acquire(&"osm".to_string()).await.unwrap();

    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn test_pool_closed() {
    let (router, pool) = router(MockManager::new(), pool_config(1));
    pool.shutdown();

    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(response).await, "Renderer pool is closed");
}

// =============================================================================
// Health Endpoint
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (router, _pool) = router(MockManager::new(), pool_config(3));

    router.clone().oneshot(get("/0/0/0.png")).await.unwrap();

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["version"].is_string());
    assert_eq!(health["default_style"], "osm");
    assert_eq!(health["styles"], serde_json::json!(["dark", "osm"]));
    assert_eq!(health["pools"][0]["style"], "osm");
    assert_eq!(health["pools"][0]["idle"], 1);
    assert_eq!(health["pools"][0]["max_size"], 3);
}

#[tokio::test]
async fn test_health_after_shutdown() {
    let (router, pool) = router(MockManager::new(), pool_config(1));
    pool.shutdown();

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(health["status"], "shutting_down");
}

// =============================================================================
// Built-in Renderer
// =============================================================================

#[tokio::test]
async fn test_raster_renderer_end_to_end() {
    let style: Style = serde_json::from_str(
        r##"{
            "background": "#0000ff",
            "areas": [{ "bbox": [0, 0, 20037508.342789244, 20037508.342789244], "color": "#ff0000" }]
        }"##,
    )
    .unwrap();
    let styles = StyleSet::from_styles(vec![("osm".to_string(), style)]).unwrap();
    let factory = StyleRendererFactory::new(styles, 256, 256, 0);
    let service = TileService::new(KeyedPool::new(factory, PoolConfig::default()), "osm");
    let router = create_router(service, RouterConfig::new().with_cache_max_age(60));

    // North-east quadrant is covered by the area
    let response = router.clone().oneshot(get("/1/1/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );

    let png = body_bytes(response).await;
    let image = ImageReader::new(Cursor::new(png))
        .with_guessed_format()
        .unwrap()
        .decode()
        .unwrap()
        .to_rgba8();
    assert_eq!(image.dimensions(), (256, 256));
    assert_eq!(image.get_pixel(128, 128).0, [255, 0, 0, 255]);

    // South-west quadrant shows only the background
    let response = router.oneshot(get("/1/0/1.png")).await.unwrap();
    let png = body_bytes(response).await;
    let image = ImageReader::new(Cursor::new(png))
        .with_guessed_format()
        .unwrap()
        .decode()
        .unwrap()
        .to_rgba8();
    assert_eq!(image.get_pixel(128, 128).0, [0, 0, 255, 255]);
}
