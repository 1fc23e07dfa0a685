//! Discord implementation of the chat client, built on `serenity`.
//!
//! Direct messages arrive over the gateway, are converted into platform-neutral
//! [`ChatMessage`]s, and are handed to the relay pipeline.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use serenity::all::{ChannelId, Context, EventHandler, GatewayIntents, Http, Message, Ready};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ChatAttachment, ChatMessage, Res, Void},
    },
    interaction,
    service::{assistant::AssistantClient, threads::ThreadStore, tools::ToolTable},
};

use super::{ChatClient, GenericChatClient};

// Constants.

/// The longest message Discord accepts, in characters.
const MAX_MESSAGE_LENGTH: usize = 2000;

// Extra methods on `ChatClient` applied by the Discord implementation.

impl ChatClient {
    /// Creates a new Discord chat client.
    ///
    /// Message handlers are spawned through `tasks`, so a shutdown can wait for them.
    pub async fn discord(config: &Config, assistant: AssistantClient, threads: ThreadStore, tools: ToolTable, tasks: TaskTracker) -> Res<Self> {
        let client = DiscordChatClient::new(config, assistant, threads, tools, tasks).await?;
        Ok(Self::new(Arc::new(client)))
    }
}

impl From<DiscordChatClient> for ChatClient {
    fn from(client: DiscordChatClient) -> Self {
        Self::new(Arc::new(client))
    }
}

// Structs.

/// Discord client implementation.
#[derive(Clone)]
struct DiscordChatClient {
    token: String,
    bot_user_id: String,
    http: Arc<Http>,
    downloader: reqwest::Client,
    config: Config,
    assistant: AssistantClient,
    threads: ThreadStore,
    tools: ToolTable,
    tasks: TaskTracker,
}

impl DiscordChatClient {
    /// Create a new Discord chat client.
    #[instrument(name = "DiscordChatClient::new", skip_all)]
    async fn new(config: &Config, assistant: AssistantClient, threads: ThreadStore, tools: ToolTable, tasks: TaskTracker) -> Res<Self> {
        let token = config.discord_token.clone();
        let http = Arc::new(Http::new(&token));

        // Get the bot's user ID.

        let bot_user = http.get_current_user().await?;
        let bot_user_id = bot_user.id.to_string();

        info!("Discord bot user ID: {}", bot_user_id);

        Ok(Self {
            token,
            bot_user_id,
            http,
            downloader: reqwest::Client::new(),
            config: config.clone(),
            assistant,
            threads,
            tools,
            tasks,
        })
    }
}

#[async_trait]
impl GenericChatClient for DiscordChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self, shutdown: CancellationToken) -> Void {
        let handler = DiscordHandler {
            config: self.config.clone(),
            chat: ChatClient::from(self.clone()),
            assistant: self.assistant.clone(),
            threads: self.threads.clone(),
            tools: self.tools.clone(),
            tasks: self.tasks.clone(),
        };

        let mut client = serenity::Client::builder(&self.token, DiscordHandler::intents()).event_handler(handler).await?;
        let shard_manager = client.shard_manager.clone();

        tokio::select! {
            result = client.start() => result?,
            _ = shutdown.cancelled() => {
                info!("Shutting down the Discord gateway ...");
                shard_manager.shutdown_all().await;
            }
        }

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, text: &str) -> Void {
        let channel = ChannelId::new(channel_id.parse::<u64>().map_err(|e| anyhow::anyhow!("Invalid channel ID `{channel_id}`: {e}"))?);

        channel.say(self.http.as_ref(), truncate_message(text)).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, attachment), fields(filename = %attachment.filename))]
    async fn save_attachment(&self, attachment: &ChatAttachment, path: &Path) -> Void {
        let response = self.downloader.get(&attachment.url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        tokio::fs::write(path, &bytes).await?;

        Ok(())
    }
}

// Gateway event handler.

/// Handler for Discord gateway events.
struct DiscordHandler {
    config: Config,
    chat: ChatClient,
    assistant: AssistantClient,
    threads: ThreadStore,
    tools: ToolTable,
    tasks: TaskTracker,
}

impl DiscordHandler {
    /// Required gateway intents for the bot.
    fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot `{}` is connected.", ready.user.name);
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.content.is_empty() && msg.attachments.is_empty() {
            warn!("Received a message without content; is the message content intent enabled?");
        }

        interaction::direct_message::handle_direct_message(
            &self.tasks,
            to_chat_message(&msg),
            self.config.clone(),
            self.chat.clone(),
            self.assistant.clone(),
            self.threads.clone(),
            self.tools.clone(),
        );
    }
}

// Helpers.

/// Convert a gateway message into a [`ChatMessage`].
fn to_chat_message(msg: &Message) -> ChatMessage {
    ChatMessage {
        author_id: msg.author.id.to_string(),
        channel_id: msg.channel_id.to_string(),
        is_private: msg.guild_id.is_none(),
        text: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| ChatAttachment {
                filename: a.filename.clone(),
                url: a.url.clone(),
                size: a.size as u64,
            })
            .collect(),
    }
}

/// Cut the text down to the longest message Discord accepts.
fn truncate_message(text: &str) -> String {
    match text.char_indices().nth(MAX_MESSAGE_LENGTH) {
        Some((index, _)) => {
            warn!("Truncating a reply of {} characters.", text.chars().count());
            text[..index].to_string()
        }
        None => text.to_string(),
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_short() {
        assert_eq!(truncate_message("Hi there!"), "Hi there!");
        assert_eq!(truncate_message(""), "");
    }

    #[test]
    fn test_truncate_message_exact_limit() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH);

        assert_eq!(truncate_message(&text), text);
    }

    #[test]
    fn test_truncate_message_long() {
        let text = "é".repeat(MAX_MESSAGE_LENGTH + 10);
        let truncated = truncate_message(&text);

        assert_eq!(truncated.chars().count(), MAX_MESSAGE_LENGTH);
        assert!(text.starts_with(&truncated));
    }
}
