//! Router assembly for the tile server.
//!
//! # Route Structure
//!
//! ```text
//! /health                                         - Health check
//! /{database}/{operation}/{level}/{column}/{row}  - Tile and info API
//! anything else                                   - 400 Bad Request
//! ```
//!
//! # Example
//!
//! ```ignore
//! use emtiles::server::{create_router, CorsPolicy, RouterConfig};
//! use emtiles::tile::TileService;
//!
//! let config = RouterConfig::new()
//!     .with_cors(CorsPolicy::origins(["https://viewer.example.org"]))
//!     .with_cache_max_age(600);
//! let app = create_router(TileService::new("/srv/tiles"), config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::handlers::{fallback_handler, health_handler, tileset_handler, AppState};
use crate::tile::TileService;

/// How long browsers may cache a CORS preflight answer.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Router Configuration
// =============================================================================

/// Which browser origins may fetch tiles cross-origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CorsPolicy {
    /// Any origin (viewers are usually served from elsewhere)
    #[default]
    AnyOrigin,

    /// Only the listed origins; an empty list turns cross-origin access off
    Origins(Vec<String>),
}

impl CorsPolicy {
    pub fn origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CorsPolicy::Origins(origins.into_iter().map(Into::into).collect())
    }

    fn layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
            .max_age(PREFLIGHT_MAX_AGE);

        match self {
            CorsPolicy::AnyOrigin => layer.allow_origin(AllowOrigin::any()),
            CorsPolicy::Origins(origins) if origins.is_empty() => layer,
            CorsPolicy::Origins(origins) => {
                let allowed: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|origin| match origin.parse() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!(origin = %origin, "ignoring unparsable CORS origin");
                            None
                        }
                    })
                    .collect();
                layer.allow_origin(AllowOrigin::list(allowed))
            }
        }
    }
}

/// Settings of the HTTP layer around a [`TileService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub cors: CorsPolicy,

    /// `Cache-Control: public, max-age=N` sent with every tile
    pub cache_max_age: u32,

    /// Log every request through `TraceLayer`
    pub request_tracing: bool,
}

impl RouterConfig {
    /// Any origin, 1 hour max-age, request tracing on.
    pub fn new() -> Self {
        Self {
            cors: CorsPolicy::AnyOrigin,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            request_tracing: true,
        }
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_request_tracing(mut self, enabled: bool) -> Self {
        self.request_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Wire the tile API, health check and fallback around `tile_service`.
pub fn create_router(tile_service: TileService, config: RouterConfig) -> Router {
    let state = AppState::with_cache_max_age(tile_service, config.cache_max_age);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/{database}/{operation}/{level}/{column}/{row}",
            get(tileset_handler),
        )
        .fallback(fallback_handler)
        .with_state(state)
        .layer(config.cors.layer());

    match config.request_tracing {
        true => app.layer(TraceLayer::new_for_http()),
        false => app,
    }
}
