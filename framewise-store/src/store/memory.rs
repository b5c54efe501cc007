//! In-process record store
//!
//! Backs tests and single-process deployments. Expiry uses tokio's clock so
//! paused-time tests can fast-forward past a TTL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CasOutcome, Fields, RecordStore, StoreResult};

#[derive(Debug)]
struct Entry {
    fields: Fields,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the map after dropping expired entries
    fn live(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        entries
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_if_absent(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut entries = self.live();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                fields: fields.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &[&str],
        updates: &Fields,
        ttl: Duration,
    ) -> StoreResult<CasOutcome> {
        let mut entries = self.live();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(CasOutcome::Missing);
        };

        let current = entry.fields.get(field);
        if !current.is_some_and(|value| expected.contains(&value.as_str())) {
            return Ok(CasOutcome::Mismatch(current.cloned()));
        }

        entry
            .fields
            .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        entry.expires_at = Instant::now() + ttl;
        Ok(CasOutcome::Applied(entry.fields.clone()))
    }

    async fn get_all(&self, key: &str) -> StoreResult<Option<Fields>> {
        Ok(self.live().get(key).map(|entry| entry.fields.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live().remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        match self.live().get_mut(key) {
            Some(entry) => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, prefix: &str, limit: usize) -> StoreResult<Vec<String>> {
        Ok(self
            .live()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
