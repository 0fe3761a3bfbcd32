//! Per-request log sink with exactly-once flush
//!
//! Each request owns a dedicated log that buffers timestamped lines in
//! memory, tees them to `tracing` for operators, and pushes them onto the
//! event bus for live viewers. `flush` persists the buffer to the request's
//! log file exactly once per lifecycle; later calls are no-ops.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::warn;

use crate::events::{LogLevel, RequestEvent, RequestEventBus};
use crate::request::types::RequestId;

#[derive(Debug)]
pub struct RequestLog {
    request_id: RequestId,
    /// Opaque per-request log folder handed to us by configuration
    log_dir: PathBuf,
    lines: Mutex<Vec<String>>,
    flushed: AtomicBool,
    events: Arc<RequestEventBus>,
}

impl RequestLog {
    #[must_use]
    pub fn new(request_id: RequestId, log_dir: PathBuf, events: Arc<RequestEventBus>) -> Self {
        Self {
            request_id,
            log_dir,
            lines: Mutex::new(Vec::new()),
            flushed: AtomicBool::new(false),
            events,
        }
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Info, message.as_ref()).await;
    }

    pub async fn warning(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Warning, message.as_ref()).await;
    }

    pub async fn error(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Error, message.as_ref()).await;
    }

    pub async fn critical(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Critical, message.as_ref()).await;
    }

    async fn record(&self, level: LogLevel, message: &str) {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let line = format!("{timestamp} [{}] {message}", level.as_str());

        match level {
            LogLevel::Info => tracing::info!(request_id = %self.request_id, "{message}"),
            LogLevel::Warning => tracing::warn!(request_id = %self.request_id, "{message}"),
            LogLevel::Error | LogLevel::Critical => {
                tracing::error!(request_id = %self.request_id, "{message}");
            }
        }

        self.events
            .publish(RequestEvent::log(self.request_id, level, line.clone()));
        self.lines.lock().await.push(line);
    }

    /// Number of buffered lines (lines keep accumulating after flush but
    /// are no longer persisted).
    pub async fn len(&self) -> usize {
        self.lines.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lines.lock().await.is_empty()
    }

    /// True once `flush` has run.
    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }

    /// Persist the buffered lines to `<log_dir>/<request_id>.log`.
    ///
    /// Runs at most once per request lifecycle; subsequent calls return
    /// without touching the filesystem. Write failures are reported to the
    /// operator log but never fail the request itself.
    pub async fn flush(&self) {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return;
        }

        let lines = self.lines.lock().await;
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        drop(lines);

        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            warn!(
                "failed to create log directory {}: {e}",
                self.log_dir.display()
            );
            return;
        }
        let path = self.log_dir.join(format!("{}.log", self.request_id));
        if let Err(e) = tokio::fs::write(&path, contents).await {
            warn!("failed to write request log {}: {e}", path.display());
        }
    }
}
