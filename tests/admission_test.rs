// Admission control: fail-fast slots, backpressure receipts, slot reuse

mod common;

use std::time::Duration;

use common::{FakeDriver, await_finished, fake_engine, owner, wait_plan};
use testrig::{BrowserKind, EngineConfig, RequestRegistry, RequestState, SubmitRequest};

#[tokio::test]
async fn zero_timeout_fails_fast_at_capacity() {
    let registry = RequestRegistry::new(2);

    let first = registry.try_acquire_slot(Duration::ZERO).await;
    let second = registry.try_acquire_slot(Duration::ZERO).await;
    assert!(first.is_some());
    assert!(second.is_some());

    // Capacity N: the (N+1)th fail-fast attempt returns immediately empty.
    assert!(registry.try_acquire_slot(Duration::ZERO).await.is_none());

    // Releasing one slot admits exactly one more.
    drop(first);
    assert!(registry.try_acquire_slot(Duration::ZERO).await.is_some());
    assert!(registry.try_acquire_slot(Duration::ZERO).await.is_none());
}

#[tokio::test]
async fn waiting_acquire_times_out() {
    let registry = RequestRegistry::new(1);
    let held = registry.try_acquire_slot(Duration::ZERO).await;
    assert!(held.is_some());

    let started = tokio::time::Instant::now();
    let denied = registry.try_acquire_slot(Duration::from_millis(100)).await;
    assert!(denied.is_none());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn overloaded_engine_rejects_with_busy_receipt() {
    let driver = FakeDriver::with_launch_delay(Duration::from_millis(10));
    let config = EngineConfig::default().with_max_concurrent_requests(2);
    let (engine, _scratch) = fake_engine(config, driver).await;
    let mut events = engine.events().subscribe();

    let long_run = |engine: &std::sync::Arc<testrig::Engine<FakeDriver>>| {
        let engine = std::sync::Arc::clone(engine);
        async move {
            engine
                .submit(
                    SubmitRequest::RunTests {
                        plan: wait_plan(20, 50),
                        browser: BrowserKind::Chrome,
                        version: "120".into(),
                    },
                    owner("tester"),
                )
                .await
        }
    };

    let first = long_run(&engine).await;
    let second = long_run(&engine).await;
    assert_ne!(first.state, RequestState::Rejected);
    assert_ne!(second.state, RequestState::Rejected);

    // Both slots are held by live runs; the third submission bounces.
    let third = long_run(&engine).await;
    assert_eq!(third.state, RequestState::Rejected);
    assert!(third.message.contains("busy"));

    // Lightweight kinds are not gated by admission.
    let lookup = engine
        .submit(SubmitRequest::RetrieveAccounts, owner("tester"))
        .await;
    assert_ne!(lookup.state, RequestState::Rejected);

    // Cancel one heavy run; once its slot frees, a new submission is
    // admitted again.
    engine.cancel(first.id, owner("tester")).await;
    let state = await_finished(&mut events, first.id).await;
    assert_eq!(state, RequestState::Cancelled);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let retry = long_run(&engine).await;
        if retry.state != RequestState::Rejected {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "slot was never released back to admission"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
