//! Process-local cache store emulating the Redis hash semantics.
//!
//! Suitable for single-instance deployments and tests. Deadlines are taken
//! from the tokio clock, so `tokio::time::pause` and `advance` drive expiry.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use waybill_core::{WaybillError, WaybillResult};

use super::cache_aside::{DEFAULT_NAMESPACE, MAX_TTL};
use super::traits::{CacheStore, ExpiryTarget};

#[derive(Debug)]
struct Field {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct HashState {
    fields: HashMap<String, Field>,
    expires_at: Option<Instant>,
}

impl HashState {
    /// Drop everything whose deadline has passed.
    fn purge(&mut self, now: Instant) {
        if self.expires_at.is_some_and(|deadline| deadline <= now) {
            self.fields.clear();
            self.expires_at = None;
        }
        self.fields
            .retain(|_, field| field.expires_at.map_or(true, |deadline| deadline > now));
        if self.fields.is_empty() {
            // An emptied hash no longer exists, and neither does its TTL.
            self.expires_at = None;
        }
    }
}

/// In-memory [`CacheStore`] with namespace-wide and per-field expiry.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    namespace: String,
    state: RwLock<HashState>,
}

impl InMemoryCacheStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: RwLock::new(HashState::default()),
        }
    }

    fn lock(&self) -> WaybillResult<RwLockWriteGuard<'_, HashState>> {
        self.state
            .write()
            .map_err(|_| WaybillError::cache("in-memory cache lock poisoned"))
    }

    /// Number of live fields.
    pub fn len(&self) -> WaybillResult<usize> {
        let mut state = self.lock()?;
        state.purge(Instant::now());
        Ok(state.fields.len())
    }

    pub fn is_empty(&self) -> WaybillResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remaining lifetime of the whole hash, if an expiry is set.
    pub fn namespace_ttl(&self) -> WaybillResult<Option<Duration>> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.purge(now);
        Ok(state.expires_at.map(|deadline| deadline - now))
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> WaybillResult<Option<Vec<u8>>> {
        let mut state = self.lock()?;
        state.purge(Instant::now());
        Ok(state.fields.get(key).map(|field| field.value.clone()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> WaybillResult<()> {
        let mut state = self.lock()?;
        state.purge(Instant::now());
        state.fields.insert(
            key.to_string(),
            Field {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_expiry(&self, target: ExpiryTarget<'_>, ttl: Duration) -> WaybillResult<()> {
        let now = Instant::now();
        let deadline = Some(ttl)
            .filter(|ttl| *ttl <= MAX_TTL)
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| WaybillError::cache(format!("cache TTL out of range: {:?}", ttl)))?;
        let mut state = self.lock()?;
        state.purge(now);

        match target {
            ExpiryTarget::Namespace => {
                if ttl.is_zero() {
                    state.fields.clear();
                    state.expires_at = None;
                } else if !state.fields.is_empty() {
                    state.expires_at = Some(deadline);
                }
            }
            ExpiryTarget::Entry(key) => {
                if ttl.is_zero() {
                    state.fields.remove(key);
                } else if let Some(field) = state.fields.get_mut(key) {
                    field.expires_at = Some(deadline);
                }
            }
        }
        state.purge(now);
        Ok(())
    }

    async fn ping(&self) -> WaybillResult<()> {
        self.lock().map(|_| ())
    }
}
