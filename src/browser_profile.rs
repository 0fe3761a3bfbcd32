//! Browser profile directory management
//!
//! Every browser process gets its own UUID-named user-data directory so
//! concurrent launches never fight over a profile SingletonLock. Cleanup is
//! RAII unless ownership is transferred to the launch wrapper.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// RAII wrapper for a browser profile directory.
///
/// Removes the directory on drop unless `into_path()` transferred ownership
/// to another cleanup mechanism.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume and return the path, disabling auto-cleanup.
    ///
    /// Use this when transferring ownership to another cleanup mechanism
    /// (the launch wrapper removes the directory after the process exits).
    #[must_use]
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    "failed to clean up profile directory {}: {e}",
                    self.path.display()
                );
            }
        }
    }
}

/// Create a unique profile directory under the system temp dir.
///
/// Uses `create_dir` (not `create_dir_all`) so a UUID collision fails loudly
/// instead of silently sharing a profile.
pub fn create_unique_profile(prefix: &str) -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4()));
    debug!("creating browser profile: {}", path.display());
    std::fs::create_dir(&path)
        .with_context(|| format!("failed to create profile directory {}", path.display()))?;
    Ok(BrowserProfile::new(path))
}
