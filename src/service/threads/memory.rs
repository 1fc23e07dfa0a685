//! In-memory implementation of the thread store.
//!
//! Entries live for the lifetime of the process and are never persisted.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::base::types::Res;

use super::{BoxedThreadFactory, GenericThreadStore, ThreadStore};

// Type aliases.

/// A per-user slot; its lock serializes thread resolution for that user.
type Slot = Arc<Mutex<Option<String>>>;

// Extra methods on `ThreadStore` applied by the memory implementation.

impl ThreadStore {
    /// Creates a new in-memory thread store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryThreadStore::default()))
    }
}

// Specific implementations.

/// In-memory thread store.
#[derive(Default)]
pub struct MemoryThreadStore {
    slots: DashMap<String, Slot>,
}

impl MemoryThreadStore {
    /// Get the slot for the user, inserting an empty one if needed.
    ///
    /// The map shard lock is released before returning, so callers may hold the slot across `.await`.
    fn slot(&self, user_id: &str) -> Slot {
        self.slots.entry(user_id.to_string()).or_default().clone()
    }
}

#[async_trait]
impl GenericThreadStore for MemoryThreadStore {
    async fn get(&self, user_id: &str) -> Option<String> {
        let slot = self.slots.get(user_id).map(|s| s.value().clone())?;

        slot.lock().await.clone()
    }

    #[instrument(name = "MemoryThreadStore::get_or_create", skip(self, create))]
    async fn get_or_create(&self, user_id: &str, create: BoxedThreadFactory) -> Res<String> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;

        if let Some(thread_id) = guard.as_ref() {
            debug!("Reusing thread {thread_id}.");
            return Ok(thread_id.clone());
        }

        let thread_id = create().await?;
        info!("Mapped user {user_id} to new thread {thread_id}.");

        *guard = Some(thread_id.clone());

        Ok(thread_id)
    }

    #[instrument(name = "MemoryThreadStore::invalidate", skip(self))]
    async fn invalidate(&self, user_id: &str, thread_id: &str) -> bool {
        let Some(slot) = self.slots.get(user_id).map(|s| s.value().clone()) else {
            return false;
        };

        let mut guard = slot.lock().await;

        if guard.as_deref() == Some(thread_id) {
            *guard = None;
            info!("Removed stale thread {thread_id} for user {user_id}.");
            return true;
        }

        false
    }

    async fn len(&self) -> usize {
        let slots = self.slots.iter().map(|s| s.value().clone()).collect::<Vec<_>>();

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }

        count
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::service::threads::thread_factory;

    fn factory(thread_id: &'static str, counter: Arc<AtomicUsize>) -> BoxedThreadFactory {
        thread_factory(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(thread_id.to_string())
        })
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_thread() {
        let store = ThreadStore::memory();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = store.get_or_create("U1", factory("thread_abc", counter.clone())).await.unwrap();
        let second = store.get_or_create("U1", factory("thread_other", counter.clone())).await.unwrap();

        assert_eq!(first, "thread_abc");
        assert_eq!(second, "thread_abc");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_users_get_distinct_threads() {
        let store = ThreadStore::memory();
        let counter = Arc::new(AtomicUsize::new(0));

        store.get_or_create("U1", factory("thread_1", counter.clone())).await.unwrap();
        store.get_or_create("U2", factory("thread_2", counter.clone())).await.unwrap();

        assert_eq!(store.get("U1").await.as_deref(), Some("thread_1"));
        assert_eq!(store.get("U2").await.as_deref(), Some("thread_2"));
        assert_eq!(store.get("U3").await, None);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_creates_one_thread() {
        let store = ThreadStore::memory();
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8)
            .map(|_| {
                let store = store.clone();
                let counter = counter.clone();
                tokio::spawn(async move { store.get_or_create("U1", factory("thread_abc", counter)).await })
            })
            .collect::<Vec<_>>();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), "thread_abc");
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_maps_nothing() {
        let store = ThreadStore::memory();

        let result = store.get_or_create("U1", thread_factory(|| async { Err(anyhow::anyhow!("service unavailable")) })).await;

        assert!(result.is_err());
        assert_eq!(store.get("U1").await, None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_only_matching_thread() {
        let store = ThreadStore::memory();
        let counter = Arc::new(AtomicUsize::new(0));

        store.get_or_create("U1", factory("thread_abc", counter.clone())).await.unwrap();

        assert!(!store.invalidate("U1", "thread_other").await);
        assert!(!store.invalidate("U2", "thread_abc").await);
        assert_eq!(store.get("U1").await.as_deref(), Some("thread_abc"));

        assert!(store.invalidate("U1", "thread_abc").await);
        assert_eq!(store.get("U1").await, None);

        let recreated = store.get_or_create("U1", factory("thread_new", counter.clone())).await.unwrap();
        assert_eq!(recreated, "thread_new");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
