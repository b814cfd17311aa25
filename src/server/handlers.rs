//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /{database}/tile/{level}/{column}/{row}?index=&z=` - Serve a tile
//! - `GET /{database}/info/{level}/{column}/{row}?index=&z=` - Describe a slice
//! - `GET /health` - Health check endpoint
//!
//! Everything else is answered with `400 Bad Request`.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderName, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::ServeError;
use crate::tile::{TileRequest, TileService};

/// Response header telling whether the tile came from the in-memory cache.
pub const TILE_CACHE_HIT_HEADER: &str = "x-tile-cache-hit";

/// Nginx-style status for requests the client abandoned.
const CLIENT_CLOSED_REQUEST: u16 = 499;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl AppState {
    /// State with a 1 hour cache max-age.
    pub fn new(tile_service: TileService) -> Self {
        Self::with_cache_max_age(tile_service, 3600)
    }

    pub fn with_cache_max_age(tile_service: TileService, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters: `/{database}/{operation}/{level}/{column}/{row}`.
///
/// Coordinates are kept as strings so malformed values produce a JSON
/// `400` naming the offending segment.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub database: String,
    pub operation: String,
    pub level: String,
    pub column: String,
    pub row: String,
}

impl TilePathParams {
    fn coordinates(&self) -> Result<(u32, u32, u32), ServeError> {
        Ok((
            parse_coordinate("level", &self.level)?,
            parse_coordinate("column", &self.column)?,
            parse_coordinate("row", &self.row)?,
        ))
    }
}

fn parse_coordinate(name: &str, value: &str) -> Result<u32, ServeError> {
    value.parse().map_err(|_| {
        ServeError::bad_request(format!("{} must be a non-negative integer, got {:?}", name, value))
    })
}

/// Query parameters selecting the slice.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// Stack index (default 0)
    #[serde(default)]
    pub index: u32,

    /// Depth plane (default 0); `nz` is accepted too
    #[serde(default, alias = "nz")]
    pub z: u32,
}

/// Operation named by the second path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Tile,
    Info,
}

impl Operation {
    pub fn parse(name: &str) -> Result<Self, ServeError> {
        match name {
            "tile" => Ok(Operation::Tile),
            "info" => Ok(Operation::Info),
            other => Err(ServeError::bad_request(format!(
                "unknown operation: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable kind, e.g. `tile_not_found`
    pub error: &'static str,

    pub message: String,
    pub status: u16,
}

impl ErrorResponse {
    fn new(error: &'static str, message: String, status: StatusCode) -> Self {
        Self {
            error,
            message,
            status: status.as_u16(),
        }
    }
}

/// Liveness report of `/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,

    /// Database lookups running right now
    pub busy_readers: usize,

    pub cached_tiles: usize,
    pub cache_bytes: usize,
    pub cache_capacity: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert ServeError to an HTTP response.
///
/// 5xx errors are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
/// Cancelled requests get an empty body nobody reads.
impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ServeError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            ServeError::TilesetNotFound { .. } => (StatusCode::NOT_FOUND, "tileset_not_found"),
            ServeError::TileNotFound { .. } => (StatusCode::NOT_FOUND, "tile_not_found"),
            ServeError::SliceNotFound { .. } => (StatusCode::NOT_FOUND, "slice_not_found"),
            ServeError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ServeError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServeError::Cancelled => {
                debug!("request cancelled");
                let status =
                    StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST);
                return status.into_response();
            }
        };
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

        (status, Json(ErrorResponse::new(error_type, message, status))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile and info requests.
///
/// # Endpoint
///
/// `GET /{database}/{operation}/{level}/{column}/{row}`
///
/// # Query Parameters
///
/// - `index`: stack index (default 0)
/// - `z` or `nz`: depth plane (default 0)
///
/// # Response
///
/// - `200 OK`: tile bytes, or a JSON slice summary for `info`
/// - `400 Bad Request`: unknown operation, bad coordinate or query
/// - `404 Not Found`: unknown tileset, tile or slice
/// - `500 Internal Server Error`: database failure
///
/// # Headers (tile)
///
/// - `Content-Type` from the tileset's `format` metadata
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tileset_handler(
    State(state): State<AppState>,
    path: Result<Path<TilePathParams>, PathRejection>,
    query: Result<Query<TileQueryParams>, QueryRejection>,
) -> Result<Response, ServeError> {
    let Path(params) = path.map_err(|e| ServeError::bad_request(e.body_text()))?;
    let Query(query) = query.map_err(|e| ServeError::bad_request(e.body_text()))?;

    let operation = Operation::parse(&params.operation)?;
    let (level, column, row) = params.coordinates()?;
    let request = TileRequest::new(params.database, level, column, row).with_slice(query.index, query.z);

    match operation {
        Operation::Tile => {
            let tile = state.tile_service.get_tile(request).await?;
            let headers = [
                (header::CONTENT_TYPE, tile.format.content_type().to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", state.cache_max_age),
                ),
                (
                    HeaderName::from_static(TILE_CACHE_HIT_HEADER),
                    tile.cache_hit.to_string(),
                ),
            ];
            Ok((StatusCode::OK, headers, tile.data).into_response())
        }
        Operation::Info => {
            let info = state.tile_service.get_info(request).await?;
            Ok(Json(info).into_response())
        }
    }
}

/// `GET /health`: always `200` while the process can answer.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let pool = state.tile_service.pool();
    let (cache_bytes, cache_capacity, cached_tiles) = state.tile_service.cache_stats().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        busy_readers: pool.workers().saturating_sub(pool.available()),
        cached_tiles,
        cache_bytes,
        cache_capacity,
    })
}

/// Answer unmatched routes, including wrong segment counts, with `400`.
pub async fn fallback_handler(uri: Uri) -> ServeError {
    ServeError::bad_request(format!("unrecognized request path: {}", uri.path()))
}
