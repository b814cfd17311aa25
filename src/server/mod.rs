//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /{database}/{tile|info}/{level}/{column}/{row}          │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (parsing, error mapping) │  │ (router, CORS, tracing)     │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    fallback_handler, health_handler, tileset_handler, AppState, ErrorResponse, HealthResponse,
    Operation, TilePathParams, TileQueryParams, TILE_CACHE_HIT_HEADER,
};
pub use routes::{create_router, CorsPolicy, RouterConfig};
