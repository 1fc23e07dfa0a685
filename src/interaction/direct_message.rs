//! The direct-message relay: forwards a user's private message to their assistant
//! thread, runs the assistant, and sends the reply back to the user.

use std::path::Path;

use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ChatMessage, ContentBlock, MessageRole, Res},
    },
    interaction::{attachments, tool_calls},
    service::{
        assistant::{AssistantClient, AssistantError},
        chat::ChatClient,
        threads::{ThreadStore, thread_factory},
        tools::ToolTable,
    },
};

// Types.

/// Why a message was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The bot wrote the message.
    SelfMessage,
    /// The message is not on a private one-to-one channel.
    NotPrivate,
}

/// What became of a relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The message was filtered out before anything was sent to the assistant.
    Ignored(IgnoreReason),
    /// The user's thread no longer exists; the mapping was cleared and no reply was sent.
    ThreadNotFound { thread_id: String },
    /// The assistant's reply was delivered to the user.
    Replied { thread_id: String, reply: String },
}

// Handlers.

/// Relay the message in a background task tracked by `tasks`, logging any error.
#[instrument(skip_all, fields(author_id = %message.author_id, channel_id = %message.channel_id))]
pub fn handle_direct_message(tasks: &TaskTracker, message: ChatMessage, config: Config, chat: ChatClient, assistant: AssistantClient, threads: ThreadStore, tools: ToolTable) {
    tasks.spawn(
        async move {
            let result = relay_direct_message(&message, &config, &chat, &assistant, &threads, &tools).await;

            match result {
                Ok(outcome) => debug!("Relay finished: {:?}", outcome),
                Err(err) => error!("Error while handling: {}", err),
            }
        }
        .in_current_span(),
    );
}

/// Relay one direct message and return what happened to it.
///
/// At most one message is sent back to the user. A stale thread clears the user's mapping so the
/// next message starts a new thread; every other failure is returned to the caller.
#[instrument(skip_all)]
pub async fn relay_direct_message(message: &ChatMessage, config: &Config, chat: &ChatClient, assistant: &AssistantClient, threads: &ThreadStore, tools: &ToolTable) -> Res<RelayOutcome> {
    if message.author_id == chat.bot_user_id() {
        debug!("Skipping message from the bot itself.");
        return Ok(RelayOutcome::Ignored(IgnoreReason::SelfMessage));
    }

    if !message.is_private {
        debug!("Skipping message outside of a private channel.");
        return Ok(RelayOutcome::Ignored(IgnoreReason::NotPrivate));
    }

    info!("Relaying direct message ...");

    // Upload the attachments first, so the message can reference them.

    let file_ids = attachments::ingest_attachments(&message.attachments, Path::new(&config.temp_dir), chat, assistant).await?;

    // Resolve the user's thread.

    let creator = assistant.clone();
    let thread_id = threads.get_or_create(&message.author_id, thread_factory(move || async move { creator.create_thread().await })).await?;

    // Submit the message.

    match assistant.create_message(&thread_id, &message.text, &file_ids).await {
        Ok(message_id) => debug!("Added message {message_id} to thread {thread_id}."),
        Err(AssistantError::ThreadNotFound(_)) => {
            threads.invalidate(&message.author_id, &thread_id).await;
            warn!("Thread {thread_id} no longer exists; the next message will start a new one.");
            return Ok(RelayOutcome::ThreadNotFound { thread_id });
        }
        Err(AssistantError::Other(err)) => return Err(err),
    }

    // Run the assistant, answering any tool calls along the way.

    let run = assistant.create_run(&thread_id, &config.openai_assistant_id, &tools.definitions()).await?;
    let run = tool_calls::process_tool_calls(assistant, &thread_id, &run.id, tools, config).await?;

    if run.status.is_unsuccessful() {
        return Err(anyhow::anyhow!(
            "Run {} ended with status {:?}: {}",
            run.id,
            run.status,
            run.last_error.as_deref().unwrap_or("no error was reported")
        ));
    }

    // Extract and deliver the reply.

    let messages = assistant.list_messages(&thread_id).await?;

    let reply = messages
        .first()
        .filter(|m| m.role == MessageRole::Assistant)
        .and_then(|m| m.content.first())
        .and_then(ContentBlock::text)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow::anyhow!("The latest message on thread {thread_id} is not an assistant reply with text."))?
        .to_string();

    chat.send_message(&message.channel_id, &reply).await?;

    info!("Replied on thread {thread_id}.");

    Ok(RelayOutcome::Replied { thread_id, reply })
}
