//! Test utilities and fixtures for the testrig test suite

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

use testrig::{
    BrowserDriver, Engine, EngineConfig, EventPayload, Owner, PoolKey, RequestEvent, RequestId,
    RequestState, TestAction, TestPlan, TestStep,
};

/// In-memory browser driver: no processes, just counters and delays.
///
/// Launch and step behavior are tunable so tests can hold requests in the
/// queued or processing phases deterministically.
#[derive(Debug)]
pub struct FakeDriver {
    pub launches: AtomicUsize,
    pub sessions: AtomicUsize,
    pub closed_sessions: AtomicUsize,
    pub launch_delay: Duration,
    pub fail_launches: AtomicBool,
}

impl FakeDriver {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::with_launch_delay(Duration::from_millis(50))
    }

    pub fn with_launch_delay(launch_delay: Duration) -> Self {
        Self {
            launches: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
            closed_sessions: AtomicUsize::new(0),
            launch_delay,
            fail_launches: AtomicBool::new(false),
        }
    }

    #[allow(dead_code)]
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct FakeBrowser {
    #[allow(dead_code)]
    pub key: PoolKey,
}

#[derive(Debug, Default)]
pub struct FakeSession {
    pub steps_run: Vec<String>,
}

impl BrowserDriver for FakeDriver {
    type Browser = FakeBrowser;
    type Session = FakeSession;

    async fn launch(&self, key: &PoolKey) -> anyhow::Result<Self::Browser> {
        tokio::time::sleep(self.launch_delay).await;
        if self.fail_launches.load(Ordering::SeqCst) {
            anyhow::bail!("simulated launch failure for {key}");
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBrowser { key: key.clone() })
    }

    async fn open_session(&self, _browser: &Self::Browser) -> anyhow::Result<Self::Session> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession::default())
    }

    async fn close_session(&self, _session: Self::Session) {
        self.closed_sessions.fetch_add(1, Ordering::SeqCst);
    }

    async fn run_step(
        &self,
        session: &mut Self::Session,
        step: &TestStep,
    ) -> anyhow::Result<serde_json::Value> {
        if let TestAction::WaitMillis { millis } = &step.action {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
        session.steps_run.push(step.name.clone());
        Ok(serde_json::json!({ "step": step.name }))
    }

    async fn shutdown_browser(&self, _browser: Self::Browser) {}
}

/// Engine over a `FakeDriver`, with scratch log and account store dirs.
///
/// The `TempDir` must stay alive for the duration of the test.
#[allow(dead_code)]
pub async fn fake_engine(
    config: EngineConfig,
    driver: FakeDriver,
) -> (Arc<Engine<FakeDriver>>, TempDir) {
    let scratch = TempDir::new().expect("create scratch dir");
    let config = config
        .with_log_dir(scratch.path().join("logs"))
        .with_account_store_path(scratch.path().join("accounts.json"));
    let engine = Engine::new(config, driver).await.expect("build engine");
    (engine, scratch)
}

#[allow(dead_code)]
pub fn owner(name: &str) -> Owner {
    Owner::new(name)
}

/// A plan of `count` wait steps, `millis` each.
#[allow(dead_code)]
pub fn wait_plan(count: usize, millis: u64) -> TestPlan {
    TestPlan {
        name: format!("wait_plan_{count}x{millis}"),
        steps: (0..count)
            .map(|i| TestStep {
                name: format!("wait_{i}"),
                action: TestAction::WaitMillis { millis },
            })
            .collect(),
    }
}

/// Drain the event bus until `id` finishes; returns its terminal state.
///
/// Panics if nothing arrives within five seconds.
#[allow(dead_code)]
pub async fn await_finished(
    receiver: &mut broadcast::Receiver<RequestEvent>,
    id: RequestId,
) -> RequestState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout_at(deadline, receiver.recv())
            .await
            .expect("timed out waiting for terminal event")
            .expect("event bus closed");
        if event.request_id == id
            && let EventPayload::RunFinished { state } = event.payload
        {
            return state;
        }
    }
}
