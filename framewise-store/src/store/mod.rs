//! Record store accessor
//!
//! Records are flat string hashes addressed by key, each with a TTL.
//! Implementations must make `create_if_absent` and `compare_and_set`
//! atomic with respect to every other operation on the same key.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

/// Field name/value pairs of a stored record
pub type Fields = BTreeMap<String, String>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("unexpected store reply: {0}")]
    Reply(String),
}

/// Result of a conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// Updates were written; carries the full record after the write
    Applied(Fields),
    /// Guard field did not hold an expected value; carries what it held
    Mismatch(Option<String>),
    /// No record under the key (never created, deleted or expired)
    Missing,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write `fields` under `key` only if nothing lives there yet
    ///
    /// Returns `false` when the key was already taken.
    async fn create_if_absent(&self, key: &str, fields: &Fields, ttl: Duration)
    -> StoreResult<bool>;

    /// Apply `updates` if `field` currently holds one of `expected`
    ///
    /// The TTL is refreshed whenever the update is applied.
    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &[&str],
        updates: &Fields,
        ttl: Duration,
    ) -> StoreResult<CasOutcome>;

    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>>;

    /// Remove a record; `false` if there was nothing to remove
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Up to `limit` live keys starting with `prefix`, in no particular order
    async fn scan(&self, prefix: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Round trip to the backing server
    async fn ping(&self) -> StoreResult<()>;
}
