// Graceful shutdown: every tracked request resolves before return

mod common;

use std::time::Duration;

use common::{FakeDriver, fake_engine, owner, wait_plan};
use testrig::{BrowserKind, EngineConfig, SubmitRequest};

#[tokio::test]
async fn shutdown_waits_for_running_requests() {
    let driver = FakeDriver::with_launch_delay(Duration::from_millis(10));
    let (engine, _scratch) = fake_engine(EngineConfig::default(), driver).await;

    // Two long runs that would otherwise take ~50s each.
    let first = engine
        .submit(
            SubmitRequest::RunTests {
                plan: wait_plan(1_000, 50),
                browser: BrowserKind::Chrome,
                version: "120".into(),
            },
            owner("tester"),
        )
        .await;
    let second = engine
        .submit(
            SubmitRequest::RunTests {
                plan: wait_plan(1_000, 50),
                browser: BrowserKind::Chrome,
                version: "121".into(),
            },
            owner("tester"),
        )
        .await;

    // Let both get past validation and into their run loops.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let first_request = engine.registry().get(first.id).expect("first tracked");
    let second_request = engine.registry().get(second.id).expect("second tracked");

    // Shutdown must cancel both and only return once they resolved.
    tokio::time::timeout(Duration::from_secs(10), engine.shutdown())
        .await
        .expect("shutdown did not drain in time");

    assert!(first_request.completion().peek().await.is_some());
    assert!(second_request.completion().peek().await.is_some());
}

#[tokio::test]
async fn shutdown_resolves_requests_still_queued_for_pool_capacity() {
    let driver = FakeDriver::with_launch_delay(Duration::from_millis(100));
    let config = EngineConfig::default().with_max_active_browsers(1);
    let (engine, _scratch) = fake_engine(config, driver).await;

    // First run occupies the only browser slot; the second needs a second
    // process and stays queued on pool capacity.
    let first = engine
        .submit(
            SubmitRequest::RunTests {
                plan: wait_plan(1_000, 50),
                browser: BrowserKind::Chrome,
                version: "120".into(),
            },
            owner("tester"),
        )
        .await;
    let queued = engine
        .submit(
            SubmitRequest::RunTests {
                plan: wait_plan(1_000, 50),
                browser: BrowserKind::Chromium,
                version: "119".into(),
            },
            owner("tester"),
        )
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let first_request = engine.registry().get(first.id).expect("first tracked");
    let queued_request = engine.registry().get(queued.id).expect("queued tracked");

    tokio::time::timeout(Duration::from_secs(10), engine.shutdown())
        .await
        .expect("shutdown hung on a capacity-queued request");

    assert!(first_request.completion().peek().await.is_some());
    assert!(queued_request.completion().peek().await.is_some());
    assert!(
        queued_request.completion().wait().await.is_cancelled(),
        "queued request should resolve cancelled at shutdown"
    );
}
