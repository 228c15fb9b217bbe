//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /{z}/{x}/{y}.png` - Tile in the default style (`.jpg` for JPEG)
//! - `GET /styles/{style}/{z}/{x}/{y}.png` - Tile in a named style
//! - `GET /health` - Health check with renderer pool statistics

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::TileError;
use crate::pool::Manager;
use crate::render::Renderer;
use crate::tile::{TileRequest, TileResponse, TileService};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<M>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<M>>,

    /// Cache-Control max-age in seconds for tile responses
    pub cache_max_age: u32,
}

impl<M> AppState<M>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    /// Create a new application state with the default max-age of one hour.
    pub fn new(tile_service: TileService<M>) -> Self {
        Self::with_cache_max_age(tile_service, 3600)
    }

    pub fn with_cache_max_age(tile_service: TileService<M>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<M> Clone for AppState<M>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Pool statistics for one style.
#[derive(Debug, Serialize)]
pub struct PoolHealth {
    pub style: String,
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "shutting_down" once the pool is closed
    pub status: String,

    /// Service version
    pub version: String,

    /// Style served by the unprefixed tile route
    pub default_style: String,

    /// Requestable styles
    pub styles: Vec<String>,

    /// Renderer pools created so far
    pub pools: Vec<PoolHealth>,
}

// =============================================================================
// Error Mapping
// =============================================================================

impl TileError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TileError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            TileError::StyleNotFound { .. } => StatusCode::NOT_FOUND,
            TileError::PoolExhausted { .. } | TileError::PoolClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TileError::Construction { .. } | TileError::Render { .. } | TileError::Encode { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            TileError::BadRequest { .. } => "bad_request",
            TileError::StyleNotFound { .. } => "style_not_found",
            TileError::PoolExhausted { .. } => "pool_exhausted",
            TileError::PoolClosed => "pool_closed",
            TileError::Construction { .. } => "construction_error",
            TileError::Render { .. } => "render_error",
            TileError::Encode { .. } => "encode_error",
        }
    }
}

/// Convert TileError to a plain-text HTTP response.
///
/// 5xx errors are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let mut response = (status, message).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
        }
        response
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn tile_response(response: TileResponse, cache_max_age: u32) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, response.content_type().to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cache_max_age),
            ),
        ],
        response.data,
    )
        .into_response()
}

/// Handle tile requests against the default style.
///
/// # Endpoint
///
/// `GET /{z}/{x}/{y}.png` or `GET /{z}/{x}/{y}.jpg`
///
/// # Response
///
/// - `200 OK`: Tile image with `Content-Type: image/png` or `image/jpeg`
/// - `400 Bad Request`: Malformed or out-of-range tile index
/// - `500 Internal Server Error`: Renderer construction, render or encode failure
/// - `503 Service Unavailable`: No renderer available in time, or shutting down
///
/// Error bodies are plain text.
pub async fn tile_handler<M>(
    State(state): State<AppState<M>>,
    Path((z, x, filename)): Path<(String, String, String)>,
) -> Result<Response, TileError>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    let request = TileRequest::parse(&z, &x, &filename)?;
    let response = state.tile_service.get_tile(request).await?;
    Ok(tile_response(response, state.cache_max_age))
}

/// Handle tile requests against a named style.
///
/// # Endpoint
///
/// `GET /styles/{style}/{z}/{x}/{y}.png`
///
/// Same responses as [`tile_handler`], plus `404 Not Found` for a style that
/// was not loaded at startup.
pub async fn style_tile_handler<M>(
    State(state): State<AppState<M>>,
    Path((style, z, x, filename)): Path<(String, String, String, String)>,
) -> Result<Response, TileError>
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    let request = TileRequest::parse(&z, &x, &filename)?.with_style(style);
    let response = state.tile_service.get_tile(request).await?;
    Ok(tile_response(response, state.cache_max_age))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` (or `503` while shutting down) with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "default_style": "osm",
///   "styles": ["osm"],
///   "pools": [{"style": "osm", "size": 2, "idle": 1, "in_use": 1, "max_size": 5}]
/// }
/// ```
pub async fn health_handler<M>(State(state): State<AppState<M>>) -> Response
where
    M: Manager<Key = String>,
    M::Resource: Renderer,
{
    let service = &state.tile_service;
    let closed = service.pool().is_closed();

    let mut pools: Vec<_> = service
        .pool()
        .statuses()
        .into_iter()
        .map(|(style, status)| PoolHealth {
            style,
            size: status.size,
            idle: status.idle,
            in_use: status.in_use,
            max_size: status.max_size,
        })
        .collect();
    pools.sort_by(|a, b| a.style.cmp(&b.style));

    let body = HealthResponse {
        status: if closed { "shutting_down" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_style: service.default_style().to_string(),
        styles: service.styles(),
        pools,
    };

    let status = if closed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(body)).into_response()
}

// =============================================================================
// Tests
// =============================================================================
