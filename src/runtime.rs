//! Runtime services and shared state for the relay.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{assistant::AssistantClient, chat::ChatClient, threads::ThreadStore, tools::ToolTable},
};

/// How long a shutdown waits for messages that are still being handled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime service context that can be shared across the application.
///
/// This struct holds the configuration and every service client.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The assistant client instance.
    pub assistant: AssistantClient,
    /// The user to thread mapping.
    pub threads: ThreadStore,
    /// The tools offered to the assistant.
    pub tools: ToolTable,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The message handlers in flight; the chat client spawns through it.
    pub tasks: TaskTracker,
}

/// A relay running in the background.
pub struct RelayHandle {
    shutdown: CancellationToken,
    task: JoinHandle<Void>,
    tasks: TaskTracker,
}

impl RelayHandle {
    /// Signal the relay to stop, and wait for it and the messages it is still handling.
    pub async fn shutdown(mut self) -> Void {
        self.shutdown.cancel();

        let result = (&mut self.task).await;
        self.drain().await;

        result?
    }

    /// Run until either the relay stops on its own or `signal` resolves, then stop it.
    pub async fn shutdown_on(mut self, signal: impl Future<Output = ()>) -> Void {
        let stopped = tokio::select! {
            result = &mut self.task => Some(result),
            _ = signal => None,
        };

        match stopped {
            Some(result) => {
                self.drain().await;
                result?
            }
            None => {
                info!("Stopping the relay ...");
                self.shutdown().await
            }
        }
    }

    /// Wait, up to a bound, for the tracked message handlers to finish.
    async fn drain(&self) {
        self.tasks.close();

        if !self.tasks.is_empty() {
            info!("Waiting for {} message(s) still being handled ...", self.tasks.len());
        }

        if tokio::time::timeout(DRAIN_TIMEOUT, self.tasks.wait()).await.is_err() {
            warn!("Gave up on {} message(s) still being handled.", self.tasks.len());
        }
    }
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the assistant client.
        let assistant = AssistantClient::openai(&config)?;

        // Initialize the thread mapping.
        let threads = ThreadStore::memory();

        // Initialize the tools.
        let tools = ToolTable::mcp(&config.mcp_config_path).await?;

        // Initialize the chat client.
        let tasks = TaskTracker::new();
        let chat = ChatClient::discord(&config, assistant.clone(), threads.clone(), tools.clone(), tasks.clone()).await?;

        Ok(Self {
            config,
            assistant,
            threads,
            tools,
            chat,
            tasks,
        })
    }

    /// Start the chat listener on a background task.
    pub fn spawn(&self) -> RelayHandle {
        let shutdown = CancellationToken::new();
        let chat = self.chat.clone();
        let token = shutdown.clone();

        let task = tokio::spawn(
            async move {
                info!("Relay listening ...");

                let result = chat.start(token).await;

                if let Err(err) = &result {
                    error!("Relay stopped with an error: {}", err);
                }

                result
            }
            .in_current_span(),
        );

        RelayHandle {
            shutdown,
            task,
            tasks: self.tasks.clone(),
        }
    }
}
