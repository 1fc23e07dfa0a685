//! Shared result aliases and the platform-neutral data model.

use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Chat types.

/// A message received by the bot on the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The chat platform's identity of the sender.
    pub author_id: String,
    /// The channel the message arrived on, which is also where the reply goes.
    pub channel_id: String,
    /// Whether the channel is a private one-to-one channel with the bot.
    pub is_private: bool,
    /// The text content of the message.
    pub text: String,
    /// The attachments, in the order the platform delivered them.
    pub attachments: Vec<ChatAttachment>,
}

/// A file attached to a [`ChatMessage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAttachment {
    pub filename: String,
    pub url: String,
    pub size: u64,
}

// Assistant types.

/// The status of an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Whether the run is still being worked on by the service.
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling)
    }

    /// Whether the run ended without producing a usable reply.
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, RunStatus::Cancelled | RunStatus::Failed | RunStatus::Expired)
    }
}

/// A snapshot of an assistant run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub id: String,
    pub status: RunStatus,
    /// The tool calls the run is blocked on (only populated for `RequiresAction`).
    pub tool_calls: Vec<ToolCall>,
    /// The service's description of the last error, if any.
    pub last_error: Option<String>,
}

/// A function call requested by the assistant during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// The raw JSON arguments, as generated by the model.
    pub arguments: String,
}

/// The output of a [`ToolCall`], submitted back to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// A function the assistant may call during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    /// A JSON schema object describing the arguments.
    pub parameters: serde_json::Value,
}

/// The author of a [`ThreadMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One content block of a [`ThreadMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { value: String },
    ImageFile { file_id: String },
    ImageUrl { url: String },
    Refusal { value: String },
}

impl ContentBlock {
    /// The text value of the block, if it carries one.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { value } => Some(value),
            _ => None,
        }
    }
}

/// A message on an assistant thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl ThreadMessage {
    /// Convenience constructor for a single-block text message.
    pub fn text(id: impl Into<String>, role: MessageRole, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: vec![ContentBlock::Text { value: value.into() }],
        }
    }
}

// Tests.
