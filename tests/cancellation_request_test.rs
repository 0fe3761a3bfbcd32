// Cross-request cancellation: lookup failures and the completion race

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeDriver, await_finished, fake_engine, owner, wait_plan};
use testrig::{
    BrowserKind, EngineConfig, Request, RequestEventBus, RequestId, RequestKind, RequestState,
    SubmitRequest,
};

#[tokio::test]
async fn cancelling_unknown_id_fails_with_not_found() {
    let (engine, _scratch) = fake_engine(EngineConfig::default(), FakeDriver::new()).await;
    let mut events = engine.events().subscribe();

    let bogus = RequestId::generate();
    let receipt = engine.cancel(bogus, owner("tester")).await;

    let state = await_finished(&mut events, receipt.id).await;
    assert_eq!(state, RequestState::Failed);

    let request_message = engine
        .registry()
        .get(receipt.id)
        .map(|r| async move { r.message().await });
    // The canceller is already deregistered; its terminal message traveled
    // over the event bus, which is what transports consume.
    assert!(request_message.is_none());
}

#[tokio::test]
async fn cancelling_a_non_cancellable_request_fails() {
    let (engine, scratch) = fake_engine(EngineConfig::default(), FakeDriver::new()).await;
    let mut events = engine.events().subscribe();

    // Park a non-cancellable request in the registry the way a live one
    // would be tracked mid-flight.
    let target = Request::new(
        RequestKind::GetSecret {
            account: "qa".into(),
        },
        owner("someone"),
        scratch.path().join("logs"),
        Duration::from_secs(600),
        Arc::new(RequestEventBus::default()),
    );
    engine.registry().register(Arc::clone(&target));

    let receipt = engine.cancel(target.id(), owner("tester")).await;
    let state = await_finished(&mut events, receipt.id).await;
    assert_eq!(state, RequestState::Failed);

    engine.registry().deregister(target.id());
}

#[tokio::test]
async fn cancellation_race_resolves_to_exactly_one_outcome() {
    let driver = FakeDriver::with_launch_delay(Duration::from_millis(5));
    let (engine, _scratch) = fake_engine(EngineConfig::default(), driver).await;
    // One receiver per watched id; each sees every event, so neither drain
    // can swallow the other's terminal notification.
    let mut run_events = engine.events().subscribe();
    let mut cancel_events = engine.events().subscribe();

    // A short run: the cancel request races its natural completion.
    let run = engine
        .submit(
            SubmitRequest::RunTests {
                plan: wait_plan(3, 20),
                browser: BrowserKind::Chrome,
                version: "120".into(),
            },
            owner("tester"),
        )
        .await;
    let canceller = engine.cancel(run.id, owner("tester")).await;

    let run_state = await_finished(&mut run_events, run.id).await;
    let cancel_state = await_finished(&mut cancel_events, canceller.id).await;

    // Deterministic: exactly one of the two shapes, never both, never
    // neither.
    match run_state {
        RequestState::Cancelled => assert_eq!(cancel_state, RequestState::Completed),
        RequestState::Completed => assert_eq!(cancel_state, RequestState::Failed),
        other => panic!("run ended in unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn successful_cancellation_reports_target() {
    let driver = FakeDriver::with_launch_delay(Duration::from_millis(5));
    let (engine, _scratch) = fake_engine(EngineConfig::default(), driver).await;
    let mut events = engine.events().subscribe();

    // A long run we are certain to catch mid-flight.
    let run = engine
        .submit(
            SubmitRequest::RunTests {
                plan: wait_plan(100, 50),
                browser: BrowserKind::Chrome,
                version: "120".into(),
            },
            owner("tester"),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let run_request = engine.registry().get(run.id).expect("run still tracked");
    let mut cancel_events = engine.events().subscribe();
    let canceller = engine.cancel(run.id, owner("tester")).await;

    let run_state = await_finished(&mut events, run.id).await;
    assert_eq!(run_state, RequestState::Cancelled);
    assert!(run_request.completion().wait().await.is_cancelled());

    let cancel_state = await_finished(&mut cancel_events, canceller.id).await;
    assert_eq!(cancel_state, RequestState::Completed);
}
