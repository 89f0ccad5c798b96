//! Token store contract and the in-memory backend
//!
//! One row per derived identity key: `{value, expires}` with `expires` in
//! epoch milliseconds. Writes are upserts, so a key never holds more than one
//! row. Expired rows are not purged; lookups skip them and the caller
//! re-authenticates.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// Boxed future returned by store operations (keeps `Arc<dyn TokenStore>` usable).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A cached bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub value: String,
    /// Expiration as unix timestamp in milliseconds
    pub expires: u64,
}

impl CachedToken {
    /// Build a row expiring `ttl_secs` after `now` (epoch millis).
    pub fn new(value: String, ttl_secs: u64, now: u64) -> Self {
        Self {
            value,
            expires: now.saturating_add(ttl_secs.saturating_mul(1000)),
        }
    }

    pub fn is_live(&self, now: u64) -> bool {
        self.expires > now
    }
}

/// Keyed persistence for cached access tokens.
pub trait TokenStore: Send + Sync {
    /// Backend name for logging ("memory", "file")
    fn id(&self) -> &str;

    /// Token for `key` if its row has not expired at `now` (epoch millis).
    fn lookup<'a>(&'a self, key: &'a str, now: u64) -> StoreFuture<'a, Option<String>>;

    /// Insert or replace the row for `key`, expiring `ttl_secs` after `now`.
    fn store<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl_secs: u64,
        now: u64,
    ) -> StoreFuture<'a, ()>;
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Process-local store. Tokens are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    rows: Mutex<HashMap<String, CachedToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, live or expired.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn id(&self) -> &str {
        "memory"
    }

    fn lookup<'a>(&'a self, key: &'a str, now: u64) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let rows = self.rows.lock().await;
            Ok(rows
                .get(key)
                .filter(|row| row.is_live(now))
                .map(|row| row.value.clone()))
        })
    }

    fn store<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl_secs: u64,
        now: u64,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let row = CachedToken::new(token.to_owned(), ttl_secs, now);
            debug!(expires = row.expires, "storing token in memory");
            self.rows.lock().await.insert(key.to_owned(), row);
            Ok(())
        })
    }
}
