//! tile-pool - XYZ map tile server.
//!
//! This binary loads the styles, starts the renderer pool and serves tiles
//! until interrupted.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_pool::{
    config::Config,
    pool::KeyedPool,
    render::{StyleRendererFactory, StyleSet},
    server::{create_router, RouterConfig},
    tile::{TileEncoder, TileService},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    // Styles must all load before anything is served
    let styles = match StyleSet::load(&config.styles) {
        Ok(styles) => styles,
        Err(e) => {
            error!("Failed to load styles: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!(
        "  Styles: {} (default: {})",
        styles.names().join(", "),
        styles.default_name()
    );
    info!(
        "  Pool: {} renderers/style, idle timeout {}ms, acquire timeout {}ms",
        config.pool_max_size, config.idle_timeout_ms, config.acquire_timeout_ms
    );
    info!(
        "  Tiles: {}x{} px, buffer {} px, {}, {}",
        config.tile_width,
        config.tile_height,
        config.buffer_size,
        config.srs,
        if config.tms { "TMS rows" } else { "XYZ rows" }
    );

    let default_style = styles.default_name().to_string();
    let style_names = styles.names().to_vec();

    let factory = StyleRendererFactory::new(
        styles,
        config.tile_width,
        config.tile_height,
        config.buffer_size,
    );
    let pool = KeyedPool::new(factory, config.pool_config());
    let reaper = pool.spawn_reaper(config.reap_interval());

    let tile_service = TileService::new(pool.clone(), default_style.as_str())
        .with_styles(style_names)
        .with_transpose_rows(config.transpose_rows())
        .with_srs(config.srs)
        .with_encoder(TileEncoder::new(config.jpeg_quality));

    let router = create_router(tile_service, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            pool.shutdown();
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl -o tile.png http://{}/0/0/0.png", addr);

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    pool.shutdown();
    reaper.abort();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining requests");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_pool=debug,tower_http=debug"
    } else {
        "tile_pool=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
