//! Library root for `assistant-relay`.
//!
//! Assistant-relay connects a Discord bot to an OpenAI assistant:
//! - Each user's direct messages go to that user's own assistant thread
//! - Attachments are uploaded to the assistant alongside the message
//! - Tool calls requested during a run are answered through MCP servers
//! - The assistant's reply is sent back to the user's channel
//!
//! The architecture is built around extensible traits that allow for
//! different implementations of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Res};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the relay in the background:
/// - Initializes the crypto provider
/// - Creates the runtime context with assistant, thread, tool, and chat services
/// - Spawns the chat listener, returning a handle to stop it
pub async fn start(config: Config) -> Res<runtime::RelayHandle> {
    info!("Starting assistant-relay ...");

    // Start the crypto provider (a provider installed earlier is fine).
    let _ = crypto::ring::default_provider().install_default();

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    Ok(runtime.spawn())
}
