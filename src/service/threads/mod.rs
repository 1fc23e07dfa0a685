//! Storage for the mapping between chat users and assistant threads.
//!
//! Each chat user owns at most one assistant thread. The store is the single
//! source of truth for that correlation, and it must guarantee that concurrent
//! first messages from the same user create exactly one thread.

pub mod memory;

use std::{ops::Deref, pin::Pin, sync::Arc};

use async_trait::async_trait;

use crate::base::types::Res;

// Types.

/// A boxed future resolving to a newly created thread ID.
pub type BoxedThreadFuture = Pin<Box<dyn Future<Output = Res<String>> + Send>>;

/// Creates a new assistant thread and resolves to its ID.
pub type BoxedThreadFactory = Box<dyn FnOnce() -> BoxedThreadFuture + Send>;

/// Box an async closure as a [`BoxedThreadFactory`].
pub fn thread_factory<F, Fut>(create: F) -> BoxedThreadFactory
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Res<String>> + Send + 'static,
{
    Box::new(move || -> BoxedThreadFuture { Box::pin(create()) })
}

// Traits.

/// Generic thread store trait that stores must implement.
#[async_trait]
pub trait GenericThreadStore: Send + Sync + 'static {
    /// Gets the thread mapped to the user, if any.
    async fn get(&self, user_id: &str) -> Option<String>;

    /// Gets the thread mapped to the user; or, creates one with `create` and maps it.
    ///
    /// This is atomic per user: while `create` runs, other callers for the same user
    /// wait and then observe the created thread. If `create` fails, nothing is mapped.
    async fn get_or_create(&self, user_id: &str, create: BoxedThreadFactory) -> Res<String>;

    /// Removes the user's mapping if it still points at `thread_id`.
    ///
    /// Returns whether an entry was removed.
    async fn invalidate(&self, user_id: &str, thread_id: &str) -> bool;

    /// The number of users with a mapped thread.
    async fn len(&self) -> usize;
}

// Structs.

/// Thread store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ThreadStore {
    inner: Arc<dyn GenericThreadStore>,
}

impl Deref for ThreadStore {
    type Target = dyn GenericThreadStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ThreadStore {
    pub fn new(inner: Arc<dyn GenericThreadStore>) -> Self {
        Self { inner }
    }
}
