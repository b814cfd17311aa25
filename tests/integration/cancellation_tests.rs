//! Cancellation tests for the read pool and the tile route.
//!
//! A request whose client went away must not crash its worker, must not
//! deliver a result anywhere, and must leave the pool usable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::oneshot;
use tower::ServiceExt;

use emtiles::error::ServeError;
use emtiles::{create_router, ReadPool, RouterConfig, TileService};

use super::test_utils::{build_tileset, test_config, MockProcessor};

/// Wait until the pool has counted `expected` discarded results.
async fn wait_for_discarded(pool: &ReadPool, expected: u64) {
    for _ in 0..200 {
        if pool.discarded() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_result_discarded_when_request_cancelled_mid_lookup() {
    let pool = ReadPool::new(1);
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let request = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.run(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                Ok::<_, ServeError>(vec![1u8, 2, 3])
            })
            .await
        })
    };

    started_rx.await.unwrap();
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    release_tx.send(()).unwrap();
    wait_for_discarded(&pool, 1).await;
    assert_eq!(pool.discarded(), 1);

    // The worker survived and the permit came back
    let value = pool.run(|| Ok(7)).await.unwrap();
    assert_eq!(value, 7);
}

#[tokio::test]
async fn test_queued_request_cancelled_before_lookup_runs() {
    let pool = ReadPool::new(1);
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    // Occupy the only worker
    let blocker = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.run(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                Ok(())
            })
            .await
        })
    };
    started_rx.await.unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let queued = {
        let pool = pool.clone();
        let ran = Arc::clone(&ran);
        tokio::spawn(async move {
            pool.run(move || {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queued.abort();
    assert!(queued.await.unwrap_err().is_cancelled());

    release_tx.send(()).unwrap();
    blocker.await.unwrap().unwrap();

    pool.run(|| Ok(())).await.unwrap();
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(pool.discarded(), 0);
}

#[tokio::test]
async fn test_closed_pool_rejects_new_requests() {
    let pool = ReadPool::new(2);
    pool.close();

    let err = pool.run(|| Ok(())).await.unwrap_err();
    assert!(matches!(err, ServeError::Cancelled));
}

#[tokio::test]
async fn test_tile_request_dropped_while_database_is_locked() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = build_tileset(
        dir.path(),
        "held",
        &MockProcessor::new().with_image(64, 64),
        &test_config(64),
    );

    let service = TileService::new(dir.path()).with_read_workers(1);
    let pool = service.pool().clone();
    let router = create_router(service, RouterConfig::new().with_request_tracing(false));

    // An exclusive writer lock stalls the lookup inside SQLite's busy wait
    let lock = rusqlite::Connection::open(&path).unwrap();
    lock.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let request = {
        let router = router.clone();
        tokio::spawn(async move {
            let request = Request::get("/held/tile/0/0/0").body(Body::empty()).unwrap();
            router.oneshot(request).await
        })
    };

    for _ in 0..200 {
        if pool.available() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.available(), 0, "lookup never started");
    tokio::time::sleep(Duration::from_millis(50)).await;

    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    lock.execute_batch("ROLLBACK").unwrap();
    drop(lock);

    wait_for_discarded(&pool, 1).await;
    assert_eq!(pool.discarded(), 1);

    let response = router
        .oneshot(Request::get("/held/tile/0/0/0").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
