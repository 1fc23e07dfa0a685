//! Integration with hosted conversational-assistant services.
//!
//! This module provides a thin wrapper around assistant clients (e.g., the OpenAI
//! Assistants API) for managing conversation threads, starting runs, answering
//! tool calls, and uploading files.
//!
//! The module defines the `GenericAssistantClient` trait that can be implemented
//! for different providers, with a default implementation for OpenAI.

pub mod openai;

use std::{ops::Deref, path::Path, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, RunState, ThreadMessage, ToolDefinition, ToolOutput};

// Errors.

/// Errors returned when submitting a message to a thread.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// The thread no longer exists on the assistant service.
    #[error("Assistant thread `{0}` was not found.")]
    ThreadNotFound(String),
    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// Traits.

/// Generic assistant client trait that clients must implement.
///
/// This trait defines the subset of a thread/run/message assistant API the relay uses.
/// Implementing this trait allows different assistant providers to be used with the relay.
#[async_trait]
pub trait GenericAssistantClient: Send + Sync + 'static {
    /// Create a new, empty conversation thread and return its ID.
    async fn create_thread(&self) -> Res<String>;

    /// Add a user message to a thread, attaching the given uploaded files, and return the message ID.
    ///
    /// Fails with [`AssistantError::ThreadNotFound`] if the thread no longer exists.
    async fn create_message(&self, thread_id: &str, text: &str, file_ids: &[String]) -> Result<String, AssistantError>;

    /// Start a run of the assistant over the thread.
    ///
    /// When `tools` is non-empty, it replaces the assistant's tools for this run.
    async fn create_run(&self, thread_id: &str, assistant_id: &str, tools: &[ToolDefinition]) -> Res<RunState>;

    /// Get the current state of a run.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Res<RunState>;

    /// Submit the outputs of every pending tool call of a run in a single request.
    async fn submit_tool_outputs(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> Res<RunState>;

    /// List the messages on a thread, most recent first.
    async fn list_messages(&self, thread_id: &str) -> Res<Vec<ThreadMessage>>;

    /// Upload a local file for assistant use and return its file ID.
    async fn upload_file(&self, path: &Path) -> Res<String>;
}

// Structs.

/// Assistant client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct AssistantClient {
    inner: Arc<dyn GenericAssistantClient>,
}

impl Deref for AssistantClient {
    type Target = dyn GenericAssistantClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl AssistantClient {
    pub fn new(inner: Arc<dyn GenericAssistantClient>) -> Self {
        Self { inner }
    }
}
