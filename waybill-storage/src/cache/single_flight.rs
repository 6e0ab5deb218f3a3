//! Per-key in-flight guard for cache misses.
//!
//! Concurrent misses for the same tracking number queue on one async mutex,
//! so only the first caller reaches the assembler; the others re-check the
//! cache once they get the guard.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of keys currently being filled.
#[derive(Debug, Default, Clone)]
pub struct InFlight {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other caller holds `key`, then hold it until the
    /// returned guard is dropped.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        FlightGuard {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Number of keys with a holder or waiters.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive hold on one key. Releases on drop and forgets the key once
/// nobody else is waiting on it.
#[derive(Debug)]
pub struct FlightGuard {
    key: String,
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts toward waiters.
        self.guard.take();
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_releases_and_forgets_key() {
        let flights = InFlight::new();
        {
            let _guard = flights.acquire("TW1").await;
            assert_eq!(flights.len(), 1);
        }
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let flights = InFlight::new();
        let _a = flights.acquire("TW1").await;
        let b = tokio::time::timeout(Duration::from_millis(50), flights.acquire("TW2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_exclusive() {
        let flights = InFlight::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = flights.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = flights.acquire("TW1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(flights.is_empty());
    }
}
