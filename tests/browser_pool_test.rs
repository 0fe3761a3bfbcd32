// Keyed pool: single launch per key, key independence, failure fan-out

mod common;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use common::{FakeDriver, owner};
use testrig::{
    BrowserKind, BrowserPool, BrowserPoolConfig, PoolKey, Request, RequestError, RequestEventBus,
    RequestKind, TestPlan,
};

fn pool_request(key: &PoolKey, scratch: &TempDir) -> Arc<Request> {
    Request::new(
        RequestKind::RunTests {
            plan: TestPlan {
                name: "noop".into(),
                steps: Vec::new(),
            },
            key: key.clone(),
        },
        owner("tester"),
        scratch.path().join("logs"),
        Duration::from_secs(600),
        Arc::new(RequestEventBus::default()),
    )
}

fn slow_pool(launch_ms: u64, max_active: usize) -> Arc<BrowserPool<FakeDriver>> {
    BrowserPool::new(
        Arc::new(FakeDriver::with_launch_delay(Duration::from_millis(
            launch_ms,
        ))),
        BrowserPoolConfig {
            max_active_browsers: max_active,
        },
    )
}

#[tokio::test]
async fn concurrent_same_key_requests_trigger_one_launch() {
    let scratch = TempDir::new().expect("scratch dir");
    let pool = slow_pool(100, 4);
    let key = PoolKey::new(BrowserKind::Chrome, "120");

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            let request = pool_request(&key, &scratch);
            tokio::spawn(async move { pool.acquire(&request, &key).await })
        })
        .collect();

    for task in tasks {
        let browser = task
            .await
            .expect("acquire task panicked")
            .expect("acquire failed");
        drop(browser);
    }

    // Exactly one creation, not two.
    assert_eq!(pool.launch_count(), 1);
    assert_eq!(pool.driver().launch_count(), 1);
}

#[tokio::test]
async fn fast_path_reuses_live_browser() {
    let scratch = TempDir::new().expect("scratch dir");
    let pool = slow_pool(10, 4);
    let key = PoolKey::new(BrowserKind::Chrome, "120");

    let request = pool_request(&key, &scratch);
    pool.acquire(&request, &key).await.expect("first acquire");
    pool.acquire(&request, &key).await.expect("second acquire");
    assert_eq!(pool.launch_count(), 1);
}

#[tokio::test]
async fn different_keys_do_not_block_each_other() {
    let scratch = TempDir::new().expect("scratch dir");
    // Key A launches very slowly; key B must still come up fast.
    let pool = slow_pool(2_000, 4);
    let slow_key = PoolKey::new(BrowserKind::Chrome, "120");
    let fast_key = PoolKey::new(BrowserKind::Chrome, "121");

    let slow_task = {
        let pool = Arc::clone(&pool);
        let request = pool_request(&slow_key, &scratch);
        let key = slow_key.clone();
        tokio::spawn(async move { pool.acquire(&request, &key).await })
    };
    // Let the slow launch get in flight first.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Both keys pay the same 2s launch. If they proceed independently the
    // second acquire finishes in ~one launch time; serialized behind the
    // first key it would take ~two.
    let started = tokio::time::Instant::now();
    let fast_request = pool_request(&fast_key, &scratch);
    let fast = pool.acquire(&fast_request, &fast_key).await;
    assert!(fast.is_ok());
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(3_000),
        "independent key was serialized behind another key's launch: {elapsed:?}"
    );

    slow_task
        .await
        .expect("slow acquire panicked")
        .expect("slow acquire failed");
    assert_eq!(pool.launch_count(), 2);
}

#[tokio::test]
async fn launch_failure_fans_out_to_every_waiter() {
    let scratch = TempDir::new().expect("scratch dir");
    let driver = FakeDriver::with_launch_delay(Duration::from_millis(100));
    driver
        .fail_launches
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let pool = BrowserPool::new(
        Arc::new(driver),
        BrowserPoolConfig {
            max_active_browsers: 4,
        },
    );
    let key = PoolKey::new(BrowserKind::Edge, "118");

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let key = key.clone();
            let request = pool_request(&key, &scratch);
            tokio::spawn(async move { pool.acquire(&request, &key).await })
        })
        .collect();

    for task in tasks {
        let result = task.await.expect("acquire task panicked");
        match result {
            Err(RequestError::Pool(e)) => {
                assert!(e.to_string().contains("simulated launch failure"));
            }
            other => panic!("expected pool launch error, got {other:?}"),
        }
    }
    assert_eq!(pool.launch_count(), 0);
}

#[tokio::test]
async fn cancelled_waiter_unblocks_while_queued() {
    let scratch = TempDir::new().expect("scratch dir");
    let pool = slow_pool(5_000, 4);
    let key = PoolKey::new(BrowserKind::Chromium, "119");

    let request = pool_request(&key, &scratch);
    let acquire_task = {
        let pool = Arc::clone(&pool);
        let key = key.clone();
        let request = Arc::clone(&request);
        tokio::spawn(async move { pool.acquire(&request, &key).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(request.cancel());

    // The queued request must resume promptly, long before the 5s launch.
    let result = tokio::time::timeout(Duration::from_millis(500), acquire_task)
        .await
        .expect("cancelled waiter stayed parked")
        .expect("acquire task panicked");
    assert!(matches!(
        result,
        Err(e) if e.is_cancellation()
    ));
}

#[tokio::test]
async fn capacity_cap_bounds_total_browsers() {
    let scratch = TempDir::new().expect("scratch dir");
    let pool = slow_pool(50, 1);
    let key_a = PoolKey::new(BrowserKind::Chrome, "120");
    let key_b = PoolKey::new(BrowserKind::Chrome, "121");

    let request_a = pool_request(&key_a, &scratch);
    pool.acquire(&request_a, &key_a).await.expect("key A");

    // Key B needs a second process but the cap is one; its launch waits on
    // capacity until shutdown releases A's permit.
    let b_task = {
        let pool = Arc::clone(&pool);
        let key = key_b.clone();
        let request = pool_request(&key_b, &scratch);
        tokio::spawn(async move { pool.acquire(&request, &key).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!b_task.is_finished(), "capacity cap was not enforced");
    assert_eq!(pool.launch_count(), 1);

    pool.shutdown().await;
    let result = tokio::time::timeout(Duration::from_secs(2), b_task)
        .await
        .expect("waiter leaked past shutdown")
        .expect("acquire task panicked");
    assert!(result.is_err());
}
