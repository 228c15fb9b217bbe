//! Concurrency tests for the renderer pool behind the HTTP layer.
//!
//! Tests verify:
//! - Concurrent requests beyond `max_size` wait for a released renderer
//!   instead of failing
//! - No more than `max_size` renders run at once per style
//! - A busy style does not block another style
//! - Every constructed renderer is destroyed exactly once by shutdown

use axum::http::StatusCode;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use tile_pool::PoolConfig;

use super::test_utils::{get, pool_config, router, MockManager};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_constructor_serialises_second_request() {
    let manager = MockManager::new()
        .with_create_delay(Duration::from_millis(100))
        .with_render_delay(Duration::from_millis(20));
    let (router, pool) = router(manager, pool_config(1));

    let start = Instant::now();
    let first = tokio::spawn(router.clone().oneshot(get("/0/0/0.png")));
    let second = tokio::spawn(router.clone().oneshot(get("/1/0/1.png")));

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    // The second request reused the first renderer after its release
    let counters = &pool.manager().counters;
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.renders(), 2);
    assert_eq!(counters.max_rendering(), 1);
    assert!(start.elapsed() >= Duration::from_millis(140));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bounded_by_max_size() {
    let manager = MockManager::new().with_render_delay(Duration::from_millis(30));
    let (router, pool) = router(manager, pool_config(2));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let uri = format!("/3/{}/{}.png", i, 7 - i);
        handles.push(tokio::spawn(router.clone().oneshot(get(&uri))));
    }

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let counters = &pool.manager().counters;
    assert_eq!(counters.renders(), 8);
    assert!(counters.created() <= 2);
    assert!(counters.max_rendering() <= 2);

    let status = pool.status(&"osm".to_string()).unwrap();
    assert_eq!(status.in_use, 0);
    assert!(status.size <= 2);
}

#[tokio::test]
async fn test_styles_do_not_share_renderers() {
    let config = PoolConfig::new(1, Duration::from_secs(5), Duration::from_millis(100));
    let (router, pool) = router(MockManager::new(), config);

    // Every default-style renderer is busy
    let _held = pool.acquire(&"osm".to_string()).await.unwrap();

    let response = router
        .clone()
        .oneshot(get("/styles/dark/0/0/0.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(pool.manager().counters.created(), 2);
}

#[tokio::test]
async fn test_constructed_equals_destroyed_after_shutdown() {
    let (router, pool) = router(MockManager::new(), pool_config(3));

    for uri in ["/0/0/0.png", "/styles/dark/1/1/1.png", "/2/3/3.jpg"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let held = pool.acquire(&"osm".to_string()).await.unwrap();
    let extra = pool.acquire(&"osm".to_string()).await.unwrap();
    drop(extra);

    pool.shutdown();
    let counters = &pool.manager().counters;
    assert!(counters.destroyed() < counters.created());

    drop(held);
    assert_eq!(counters.destroyed(), counters.created());
}
