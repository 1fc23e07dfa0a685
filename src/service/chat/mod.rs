//! Chat service integration for the relay.
//!
//! This module provides functionality for interacting with chat platforms like Discord:
//! - Receiving direct messages
//! - Sending replies
//! - Downloading message attachments
//!
//! It defines the `GenericChatClient` trait that can be implemented for different
//! chat services, with a default implementation for Discord.

pub mod discord;

use std::{ops::Deref, path::Path, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::base::types::{ChatAttachment, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Discord. Implementing this trait allows different chat services to be used
/// with the relay.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Messages authored by this user are the relay's own replies, and are never relayed.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// This connects to the chat platform and dispatches incoming messages until `shutdown` is cancelled.
    async fn start(&self, shutdown: CancellationToken) -> Void;

    /// Send a plain-text message to a channel.
    async fn send_message(&self, channel_id: &str, text: &str) -> Void;

    /// Download an attachment's bytes to `path`.
    async fn save_attachment(&self, attachment: &ChatAttachment, path: &Path) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
