//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile retrieval with the row-flip convention
//! - Stack index and depth selection through query parameters
//! - Error cases (missing tileset, missing tile, malformed requests)
//! - HTTP response codes and headers

use std::path::Path;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use emtiles::server::TILE_CACHE_HIT_HEADER;
use emtiles::store::{TileKey, TileStore};
use emtiles::{create_router, RouterConfig, TileService};

use super::test_utils::{
    build_tileset, is_valid_jpeg, is_valid_png, mean_luma, test_config, MockProcessor,
};

// =============================================================================
// Helpers
// =============================================================================

fn router_for(dir: &Path) -> Router {
    let service = TileService::new(dir).with_read_workers(4);
    create_router(service, RouterConfig::new().with_request_tracing(false))
}

async fn get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(router, uri).await;
    let json = serde_json::from_slice(&body).expect("response is not JSON");
    (status, json)
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "sample",
        &MockProcessor::new().with_image(256, 256),
        &test_config(256),
    );
    let router = router_for(dir.path());

    let (status, headers, body) = get(&router, "/sample/tile/0/0/0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert_eq!(
        headers.get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(headers.get(TILE_CACHE_HIT_HEADER).unwrap(), "false");
    assert!(is_valid_png(&body), "Response should be a valid PNG");
}

#[tokio::test]
async fn test_jpeg_tileset_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(64).with_tile_format(emtiles::TileFormat::Jpeg);
    build_tileset(
        dir.path(),
        "jpeg",
        &MockProcessor::new().with_image(64, 64),
        &config,
    );
    let router = router_for(dir.path());

    let (status, headers, body) = get(&router, "/jpeg/tile/0/0/0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
    assert!(is_valid_jpeg(&body));
}

#[tokio::test]
async fn test_row_is_flipped_before_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = build_tileset(
        dir.path(),
        "square",
        &MockProcessor::new().with_image(1024, 1024),
        &test_config(256),
    );
    let store = TileStore::open_read_only(&path).unwrap();
    let router = router_for(dir.path());

    // Level 2 has 4 rows: requested row r is stored row 3 - r
    for row in 0..4 {
        let (status, _, body) = get(&router, &format!("/square/tile/2/1/{}", row)).await;
        assert_eq!(status, StatusCode::OK);
        let stored = store.read_tile(&TileKey::new(0, 0, 2, 1, 3 - row)).unwrap();
        assert_eq!(body, stored, "row {}", row);
    }
}

#[tokio::test]
async fn test_row_zero_is_top_of_image() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "halves",
        &MockProcessor::new().with_image(512, 512).with_bright_top(),
        &test_config(256),
    );
    let router = router_for(dir.path());

    let (status, _, top) = get(&router, "/halves/tile/1/0/0").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, bottom) = get(&router, "/halves/tile/1/0/1").await;
    assert_eq!(status, StatusCode::OK);

    let (top, bottom) = (mean_luma(&top, 0, 256), mean_luma(&bottom, 0, 256));
    assert!(top > bottom + 50.0, "top {} bottom {}", top, bottom);

    // The single coarsest tile is upright too
    let (_, _, whole) = get(&router, "/halves/tile/0/0/0").await;
    assert!(mean_luma(&whole, 0, 128) > mean_luma(&whole, 128, 256) + 50.0);
}

#[tokio::test]
async fn test_stack_index_selects_pyramid() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = build_tileset(
        dir.path(),
        "stack",
        &MockProcessor::stack(5, 256, 256),
        &test_config(256),
    );
    let store = TileStore::open_read_only(&path).unwrap();
    let router = router_for(dir.path());

    let (status, _, body) = get(&router, "/stack/tile/0/0/0?index=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, store.read_tile(&TileKey::new(3, 0, 0, 0, 0)).unwrap());
    assert_ne!(body, store.read_tile(&TileKey::new(0, 0, 0, 0, 0)).unwrap());

    let (status, _, body) = get(&router, "/stack/tile/0/0/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, store.read_tile(&TileKey::new(0, 0, 0, 0, 0)).unwrap());
}

#[tokio::test]
async fn test_depth_selected_by_z_or_nz() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = build_tileset(
        dir.path(),
        "volume",
        &MockProcessor::new().with_volume(64, 64, 3),
        &test_config(64),
    );
    let store = TileStore::open_read_only(&path).unwrap();
    let expected = store.read_tile(&TileKey::new(0, 2, 0, 0, 0)).unwrap();
    let router = router_for(dir.path());

    let (status, _, by_z) = get(&router, "/volume/tile/0/0/0?index=0&z=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_z, expected);

    let (status, _, by_nz) = get(&router, "/volume/tile/0/0/0?nz=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_nz, expected);
}

#[tokio::test]
async fn test_second_request_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "cached",
        &MockProcessor::new().with_image(64, 64),
        &test_config(64),
    );
    let router = router_for(dir.path());

    let (_, first_headers, first) = get(&router, "/cached/tile/0/0/0").await;
    let (status, second_headers, second) = get(&router, "/cached/tile/0/0/0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_headers.get(TILE_CACHE_HIT_HEADER).unwrap(), "false");
    assert_eq!(second_headers.get(TILE_CACHE_HIT_HEADER).unwrap(), "true");
    assert_eq!(first, second);

    let (_, health) = get_json(&router, "/health").await;
    assert_eq!(health["cached_tiles"], 1);
    assert_eq!(health["cache_bytes"], first.len());
}

#[tokio::test]
async fn test_deleted_tileset_returns_404_after_cache_hit() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = build_tileset(
        dir.path(),
        "gone",
        &MockProcessor::new().with_image(64, 64),
        &test_config(64),
    );
    let router = router_for(dir.path());

    let (status, _, _) = get(&router, "/gone/tile/0/0/0").await;
    assert_eq!(status, StatusCode::OK);

    std::fs::remove_file(&path).unwrap();
    let (status, json) = get_json(&router, "/gone/tile/0/0/0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "tileset_not_found");

    let (_, health) = get_json(&router, "/health").await;
    assert_eq!(health["cached_tiles"], 0);
}

#[tokio::test]
async fn test_concurrent_requests_across_tilesets() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["one", "two", "three"] {
        build_tileset(
            dir.path(),
            name,
            &MockProcessor::new().with_image(512, 512),
            &test_config(128),
        );
    }
    let router = router_for(dir.path());

    let mut handles = Vec::new();
    for name in ["one", "two", "three"] {
        for column in 0..4 {
            for row in 0..4 {
                let router = router.clone();
                let uri = format!("/{}/tile/2/{}/{}", name, column, row);
                handles.push(tokio::spawn(async move { get(&router, &uri).await.0 }));
            }
        }
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
}

// =============================================================================
// Info
// =============================================================================

#[tokio::test]
async fn test_info_summarizes_slice() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "described",
        &MockProcessor::new().with_image(256, 256),
        &test_config(128),
    );
    let router = router_for(dir.path());

    let (status, json) = get_json(&router, "/described/info/0/0/0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tileset"], "described");
    assert_eq!(json["metadata"]["format"], "png");
    assert_eq!(json["levels"].as_array().unwrap().len(), 2);
    assert_eq!(json["levels"][1]["tiles"], 4);
    assert_eq!(json["infos"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_info_missing_slice() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "described",
        &MockProcessor::new().with_image(64, 64),
        &test_config(64),
    );
    let router = router_for(dir.path());

    let (status, json) = get_json(&router, "/described/info/0/0/0?index=7").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "slice_not_found");
}

// =============================================================================
// Error Cases
// =============================================================================

#[tokio::test]
async fn test_missing_tileset_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let router = router_for(dir.path());

    let (status, json) = get_json(&router, "/nonexistent/tile/0/0/0").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "tileset_not_found");
    assert_eq!(json["status"], 404);

    // The server keeps answering
    let (status, _, _) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_tile_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "small",
        &MockProcessor::new().with_image(256, 256),
        &test_config(128),
    );
    let router = router_for(dir.path());

    for uri in [
        "/small/tile/5/0/0",
        "/small/tile/1/2/0",
        "/small/tile/1/0/2",
        "/small/tile/0/0/0?index=1",
    ] {
        let (status, json) = get_json(&router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(json["error"], "tile_not_found", "{}", uri);
    }
}

#[tokio::test]
async fn test_malformed_requests_return_400() {
    let dir = tempfile::tempdir().unwrap();
    build_tileset(
        dir.path(),
        "sample",
        &MockProcessor::new().with_image(64, 64),
        &test_config(64),
    );
    let router = router_for(dir.path());

    for uri in [
        "/sample/view/0/0/0",
        "/sample/tile/zero/0/0",
        "/sample/tile/0/-1/0",
        "/sample/tile/0/0/1.5",
        "/sample/tile/0/0/0?index=abc",
        "/sample/tile/0/0",
        "/sample/tile/0/0/0/0",
        "/.sample/tile/0/0/0",
        "/",
    ] {
        let (status, json) = get_json(&router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["error"], "bad_request", "{}", uri);
    }
}

#[tokio::test]
async fn test_corrupt_tileset_returns_500() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corrupt.mbtiles"), b"not a database").unwrap();
    let router = router_for(dir.path());

    let (status, json) = get_json(&router, "/corrupt/tile/0/0/0").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "database_error");
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let router = router_for(dir.path());

    let (status, json) = get_json(&router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["busy_readers"], 0);
}
