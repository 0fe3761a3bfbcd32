//! Test-account credential store
//!
//! Backing store for the secret-retrieval and password-reset request kinds.
//! A JSON file on disk, loaded once and kept under an async `RwLock`; every
//! touch goes through the process-wide I/O throttle so credential traffic
//! and file validation share one ceiling.

use anyhow::{Context, Result};
use log::debug;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::{RequestError, RequestResult};
use crate::runtime::{CancelToken, IoThrottle};

/// Characters in a generated password.
const GENERATED_SECRET_LEN: usize = 20;

/// One stored test account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub username: String,
    pub secret: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Listing view with the secret redacted.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub name: String,
    pub username: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    accounts: RwLock<HashMap<String, AccountRecord>>,
    throttle: IoThrottle,
}

impl AccountStore {
    /// Load the store from `path`; a missing file is an empty store.
    pub async fn load(path: PathBuf, throttle: IoThrottle) -> Result<Self> {
        let accounts = if path.exists() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read account store {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("malformed account store {}", path.display()))?
        } else {
            HashMap::new()
        };
        debug!("account store loaded with {} accounts", accounts.len());
        Ok(Self {
            path,
            accounts: RwLock::new(accounts),
            throttle,
        })
    }

    /// Insert or replace an account and persist. Seed/admin path, not a
    /// request kind.
    pub async fn upsert(&self, record: AccountRecord) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(record.name.clone(), record);
        self.persist(&accounts).await
    }

    /// Fetch one account with its secret. Owner-only by the engine's rules.
    pub async fn get_secret(
        &self,
        account: &str,
        cancel: Option<&CancelToken>,
    ) -> RequestResult<AccountRecord> {
        let _permit = self.throttle.acquire(cancel).await?;
        let accounts = self.accounts.read().await;
        accounts
            .get(account)
            .cloned()
            .ok_or_else(|| RequestError::Validation(format!("unknown account '{account}'")))
    }

    /// Rotate an account's secret to a freshly generated password and
    /// persist the store. Returns the new secret.
    pub async fn reset_password(
        &self,
        account: &str,
        cancel: Option<&CancelToken>,
    ) -> RequestResult<String> {
        let _permit = self.throttle.acquire(cancel).await?;
        let mut accounts = self.accounts.write().await;
        let record = accounts
            .get_mut(account)
            .ok_or_else(|| RequestError::Validation(format!("unknown account '{account}'")))?;

        record.secret = generate_secret();
        record.updated_at = chrono::Utc::now();
        let secret = record.secret.clone();

        self.persist(&accounts)
            .await
            .map_err(|e| RequestError::Execution(format!("{e:#}")))?;
        debug!("rotated secret for account '{account}'");
        Ok(secret)
    }

    /// List all accounts, secrets redacted.
    pub async fn list(&self, cancel: Option<&CancelToken>) -> RequestResult<Vec<AccountSummary>> {
        let _permit = self.throttle.acquire(cancel).await?;
        let accounts = self.accounts.read().await;
        let mut summaries: Vec<AccountSummary> = accounts
            .values()
            .map(|record| AccountSummary {
                name: record.name.clone(),
                username: record.username.clone(),
                updated_at: record.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn persist(&self, accounts: &HashMap<String, AccountRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(accounts).context("serialize account store")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write account store {}", self.path.display()))
    }
}

fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}
