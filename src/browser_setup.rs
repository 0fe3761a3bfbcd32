//! chromiumoxide-backed browser driver
//!
//! Launches CDP browsers for pool keys and drives per-request pages. The
//! executable for a key is resolved from a versioned install root first
//! (test rigs pin browser builds per version), then environment override,
//! then the usual system locations.

use anyhow::{Context, Result, anyhow};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::browser_pool::{BrowserDriver, BrowserKind, PoolKey};
use crate::browser_profile::create_unique_profile;
use crate::request::kind::{TestAction, TestStep};

/// Root directory for version-pinned browser installs:
/// `<root>/<kind>/<version>/<binary>`.
const VERSIONED_INSTALL_ROOT: &str = "/opt/testrig/browsers";

/// Find the executable for a pool key.
///
/// Resolution order: version-pinned install root, `TESTRIG_BROWSER_PATH`
/// environment override, platform-specific system paths.
pub fn find_browser_executable(key: &PoolKey) -> Result<PathBuf> {
    let binary = match key.browser {
        BrowserKind::Chrome => "chrome",
        BrowserKind::Chromium => "chromium",
        BrowserKind::Edge => "msedge",
    };

    let pinned = PathBuf::from(VERSIONED_INSTALL_ROOT)
        .join(key.browser.as_str())
        .join(&key.version)
        .join(binary);
    if pinned.exists() {
        info!("using pinned browser install: {}", pinned.display());
        return Ok(pinned);
    }

    if let Ok(path) = std::env::var("TESTRIG_BROWSER_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(
                "using browser from TESTRIG_BROWSER_PATH environment variable: {}",
                path.display()
            );
            return Ok(path);
        }
        warn!(
            "TESTRIG_BROWSER_PATH points to non-existent file: {}",
            path.display()
        );
    }

    let candidates: Vec<&str> = match key.browser {
        BrowserKind::Chrome => vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/opt/google/chrome/chrome",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ],
        BrowserKind::Chromium => vec![
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ],
        BrowserKind::Edge => vec![
            "/usr/bin/microsoft-edge",
            "/usr/bin/microsoft-edge-stable",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ],
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(anyhow!("no executable found for {key}"))
}

/// A launched browser process plus its CDP event handler task.
///
/// The handler task MUST be aborted when the browser goes away, otherwise
/// it runs forever against a dead websocket.
#[derive(Debug)]
pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl ChromiumBrowser {
    #[must_use]
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Remove the profile directory. Must run after the process has exited
    /// so all file handles are released.
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "failed to clean up browser profile {}: {e}",
                    path.display()
                );
            }
        }
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler.abort();
        if self.user_data_dir.is_some() {
            self.cleanup_temp_dir();
        }
    }
}

/// Launch the browser process for a pool key.
pub async fn launch_browser(key: &PoolKey, headless: bool) -> Result<ChromiumBrowser> {
    let executable = find_browser_executable(key)?;
    let user_data_dir = create_unique_profile(&format!("testrig_{}", key.browser))?.into_path();

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(executable);

    if headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-notifications")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-networking")
        .arg("--disable-hang-monitor")
        .arg("--password-store=basic")
        .arg("--mute-audio");

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

    info!(key = %key, "launching browser");
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let message = e.to_string();
                // Chrome emits CDP events chromiumoxide doesn't recognize;
                // those deserialization misses are noise, not failures.
                let benign = message
                    .contains("data did not match any variant of untagged enum Message")
                    || message.contains("Failed to deserialize WS response");
                if benign {
                    trace!("suppressed benign CDP serialization error: {message}");
                } else {
                    error!("browser handler error: {e:?}");
                }
            }
        }
        trace!("browser handler task completed");
    });

    Ok(ChromiumBrowser {
        browser,
        handler: handler_task,
        user_data_dir: Some(user_data_dir),
    })
}

/// Production driver: real CDP browsers, one page per request session.
#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    headless: bool,
}

impl ChromiumDriver {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

impl Default for ChromiumDriver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl BrowserDriver for ChromiumDriver {
    type Browser = ChromiumBrowser;
    type Session = Page;

    async fn launch(&self, key: &PoolKey) -> Result<Self::Browser> {
        launch_browser(key, self.headless).await
    }

    async fn open_session(&self, browser: &Self::Browser) -> Result<Self::Session> {
        let page = browser
            .browser()
            .new_page("about:blank")
            .await
            .context("failed to open page")?;
        Ok(page)
    }

    async fn close_session(&self, session: Self::Session) {
        if let Err(e) = session.close().await {
            warn!("failed to close page: {e}");
        }
    }

    async fn run_step(
        &self,
        session: &mut Self::Session,
        step: &TestStep,
    ) -> Result<serde_json::Value> {
        match &step.action {
            TestAction::Navigate { url } => {
                session
                    .goto(url.as_str())
                    .await
                    .with_context(|| format!("navigate to {url}"))?;
                Ok(serde_json::json!({ "navigated": url }))
            }
            TestAction::Click { selector } => {
                let element = session
                    .find_element(selector.as_str())
                    .await
                    .with_context(|| format!("find element {selector}"))?;
                element
                    .click()
                    .await
                    .with_context(|| format!("click {selector}"))?;
                Ok(serde_json::json!({ "clicked": selector }))
            }
            TestAction::Type { selector, text } => {
                let element = session
                    .find_element(selector.as_str())
                    .await
                    .with_context(|| format!("find element {selector}"))?;
                element.click().await.ok();
                element
                    .type_str(text.as_str())
                    .await
                    .with_context(|| format!("type into {selector}"))?;
                Ok(serde_json::json!({ "typed": selector }))
            }
            TestAction::Evaluate { script } => {
                let result = session
                    .evaluate(script.as_str())
                    .await
                    .context("evaluate script")?;
                Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
            }
            TestAction::WaitMillis { millis } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
                Ok(serde_json::json!({ "waited_ms": millis }))
            }
        }
    }

    async fn shutdown_browser(&self, mut wrapper: Self::Browser) {
        if let Err(e) = wrapper.browser.close().await {
            warn!("failed to close browser cleanly: {e}");
        }
        if let Err(e) = wrapper.browser.wait().await {
            warn!("failed to wait for browser exit: {e}");
        }
        wrapper.cleanup_temp_dir();
    }
}
