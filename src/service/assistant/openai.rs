//! OpenAI Assistants API implementation of the assistant client.

use std::{path::Path, sync::Arc, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        AssistantTools, AssistantToolsFunction, CreateFileRequestArgs, CreateMessageRequestArgs, CreateRunRequestArgs, CreateThreadRequest, FilePurpose, FunctionObject, MessageAttachment,
        MessageAttachmentTool, MessageContent, MessageObject, MessageRole as OpenAiMessageRole, RunObject, RunStatus as OpenAiRunStatus, SubmitToolOutputsRunRequest, ToolsOutputs,
    },
};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::base::{
    config::Config,
    types::{ContentBlock, MessageRole, Res, RunState, RunStatus, ThreadMessage, ToolCall, ToolDefinition, ToolOutput},
};

use super::{AssistantClient, AssistantError, GenericAssistantClient};

// Extra methods on `AssistantClient` applied by the openai implementation.

impl AssistantClient {
    pub fn openai(config: &Config) -> Res<Self> {
        let client = OpenAiAssistantClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// OpenAI assistant client implementation.
#[derive(Clone)]
pub struct OpenAiAssistantClient {
    client: Client<OpenAIConfig>,
    attachment_tool: MessageAttachmentTool,
}

impl OpenAiAssistantClient {
    /// Create a new OpenAI assistant client.
    #[instrument(name = "OpenAiAssistantClient::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Ok(Self {
            client: Client::with_config(cfg),
            attachment_tool: parse_attachment_tool(&config.openai_attachment_tool)?,
        })
    }

    /// Helper function to make idempotent OpenAI API calls with retry logic and timeout handling.
    ///
    /// Only transport failures and timeouts are retried; errors reported by the API are returned as-is.
    async fn call_with_retries<T, F, Fut>(&self, operation: &str, mut call: F) -> Res<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, OpenAIError>> + Send,
    {
        const MAX_RETRIES: u32 = 3;
        const TIMEOUT: u64 = 60;
        const RETRY_DELAY_MS: u64 = 1000;

        let mut retries = 0;

        loop {
            let result = timeout(Duration::from_secs(TIMEOUT), call()).await;

            match result {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err @ OpenAIError::Reqwest(_))) => {
                    if retries >= MAX_RETRIES {
                        return Err(anyhow::anyhow!("OpenAI {operation} failed after {MAX_RETRIES} retries: {err}"));
                    }
                    retries += 1;
                    warn!("OpenAI {operation} failed, retrying {retries}/{MAX_RETRIES}: {err}");
                }
                Ok(Err(err)) => return Err(anyhow::anyhow!("OpenAI {operation} failed: {err}")),
                Err(_) => {
                    if retries >= MAX_RETRIES {
                        return Err(anyhow::anyhow!("OpenAI {operation} timed out after {MAX_RETRIES} attempts"));
                    }
                    retries += 1;
                    warn!("OpenAI {operation} timed out, retrying {retries}/{MAX_RETRIES}");
                }
            }

            // Exponential backoff.
            let delay = Duration::from_millis(RETRY_DELAY_MS * 2_u64.pow(retries - 1));
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GenericAssistantClient for OpenAiAssistantClient {
    #[instrument(name = "OpenAiAssistantClient::create_thread", skip_all)]
    async fn create_thread(&self) -> Res<String> {
        // Not retried: a request that times out may still have created the thread.
        let thread = self.client.threads().create(CreateThreadRequest::default()).await?;

        info!("Created thread {}.", thread.id);

        Ok(thread.id)
    }

    #[instrument(name = "OpenAiAssistantClient::create_message", skip(self, text))]
    async fn create_message(&self, thread_id: &str, text: &str, file_ids: &[String]) -> Result<String, AssistantError> {
        let mut request = CreateMessageRequestArgs::default();
        request.role(OpenAiMessageRole::User).content(text);

        if !file_ids.is_empty() {
            let attachments = file_ids
                .iter()
                .map(|file_id| MessageAttachment {
                    file_id: file_id.clone(),
                    tools: vec![self.attachment_tool.clone()],
                })
                .collect::<Vec<_>>();

            request.attachments(attachments);
        }

        let request = request.build().map_err(|e| AssistantError::Other(e.into()))?;

        match self.client.threads().messages(thread_id).create(request).await {
            Ok(message) => Ok(message.id),
            Err(err) if is_thread_not_found(&err) => Err(AssistantError::ThreadNotFound(thread_id.to_string())),
            Err(err) => Err(AssistantError::Other(anyhow::anyhow!("OpenAI create message failed: {err}"))),
        }
    }

    #[instrument(name = "OpenAiAssistantClient::create_run", skip(self, tools))]
    async fn create_run(&self, thread_id: &str, assistant_id: &str, tools: &[ToolDefinition]) -> Res<RunState> {
        let mut request = CreateRunRequestArgs::default();
        request.assistant_id(assistant_id);

        if !tools.is_empty() {
            request.tools(tools.iter().map(to_openai_tool).collect::<Vec<_>>());
        }

        let run = self.client.threads().runs(thread_id).create(request.build()?).await?;

        info!("Started run {} with status {:?}.", run.id, run.status);

        Ok(to_run_state(run))
    }

    #[instrument(name = "OpenAiAssistantClient::retrieve_run", skip(self))]
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Res<RunState> {
        let run = self.call_with_retries("retrieve run", || async move { self.client.threads().runs(thread_id).retrieve(run_id).await }).await?;

        Ok(to_run_state(run))
    }

    #[instrument(name = "OpenAiAssistantClient::submit_tool_outputs", skip(self, outputs))]
    async fn submit_tool_outputs(&self, thread_id: &str, run_id: &str, outputs: Vec<ToolOutput>) -> Res<RunState> {
        let request = SubmitToolOutputsRunRequest {
            tool_outputs: outputs
                .into_iter()
                .map(|o| ToolsOutputs {
                    tool_call_id: Some(o.tool_call_id),
                    output: Some(o.output),
                })
                .collect(),
            stream: None,
        };

        let run = self.client.threads().runs(thread_id).submit_tool_outputs(run_id, request).await?;

        Ok(to_run_state(run))
    }

    #[instrument(name = "OpenAiAssistantClient::list_messages", skip(self))]
    async fn list_messages(&self, thread_id: &str) -> Res<Vec<ThreadMessage>> {
        let response = self.call_with_retries("list messages", || async move { self.client.threads().messages(thread_id).list(&[("order", "desc")]).await }).await?;

        Ok(response.data.into_iter().map(to_thread_message).collect())
    }

    #[instrument(name = "OpenAiAssistantClient::upload_file", skip(self))]
    async fn upload_file(&self, path: &Path) -> Res<String> {
        let request = CreateFileRequestArgs::default().file(path).purpose(FilePurpose::Assistants).build()?;

        let file = self.client.files().create(request).await?;

        info!("Uploaded {} ({} bytes) as {}.", file.filename, file.bytes, file.id);

        Ok(file.id)
    }
}

// Helpers.

/// Whether the error is the API's report of a missing thread.
fn is_thread_not_found(err: &OpenAIError) -> bool {
    matches!(err, OpenAIError::ApiError(api) if api.message.starts_with("No thread found"))
}

/// Convert a configured tool name to the tool attached files are added to.
fn parse_attachment_tool(tool: &str) -> Res<MessageAttachmentTool> {
    match tool {
        "file_search" => Ok(MessageAttachmentTool::FileSearch),
        "code_interpreter" => Ok(MessageAttachmentTool::CodeInterpreter),
        _ => Err(anyhow::anyhow!("Invalid attachment tool: {tool}. Must be one of: file_search, code_interpreter")),
    }
}

fn to_openai_tool(tool: &ToolDefinition) -> AssistantTools {
    AssistantTools::Function(AssistantToolsFunction {
        function: FunctionObject {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: Some(tool.parameters.clone()),
            strict: None,
        },
    })
}

fn to_run_status(status: OpenAiRunStatus) -> RunStatus {
    match status {
        OpenAiRunStatus::Queued => RunStatus::Queued,
        OpenAiRunStatus::InProgress => RunStatus::InProgress,
        OpenAiRunStatus::RequiresAction => RunStatus::RequiresAction,
        OpenAiRunStatus::Cancelling => RunStatus::Cancelling,
        OpenAiRunStatus::Cancelled => RunStatus::Cancelled,
        OpenAiRunStatus::Failed => RunStatus::Failed,
        OpenAiRunStatus::Completed => RunStatus::Completed,
        OpenAiRunStatus::Incomplete => RunStatus::Incomplete,
        OpenAiRunStatus::Expired => RunStatus::Expired,
    }
}

fn to_run_state(run: RunObject) -> RunState {
    let tool_calls = run
        .required_action
        .map(|action| {
            action
                .submit_tool_outputs
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect()
        })
        .unwrap_or_default();

    RunState {
        id: run.id,
        status: to_run_status(run.status),
        tool_calls,
        last_error: run.last_error.map(|e| e.message),
    }
}

fn to_thread_message(message: MessageObject) -> ThreadMessage {
    let role = match message.role {
        OpenAiMessageRole::User => MessageRole::User,
        OpenAiMessageRole::Assistant => MessageRole::Assistant,
    };

    let content = message
        .content
        .into_iter()
        .map(|block| match block {
            MessageContent::Text(text) => ContentBlock::Text { value: text.text.value },
            MessageContent::ImageFile(image) => ContentBlock::ImageFile { file_id: image.image_file.file_id },
            MessageContent::ImageUrl(image) => ContentBlock::ImageUrl { url: image.image_url.url },
            MessageContent::Refusal(refusal) => ContentBlock::Refusal { value: refusal.refusal },
        })
        .collect();

    ThreadMessage { id: message.id, role, content }
}

// Tests.

#[cfg(test)]
mod tests {
    use async_openai::error::ApiError;
    use serde_json::json;

    use super::*;

    fn api_error(message: &str) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: None,
        })
    }

    #[test]
    fn test_is_thread_not_found() {
        assert!(is_thread_not_found(&api_error("No thread found with id 'thread_abc'.")));
        assert!(!is_thread_not_found(&api_error("No assistant found with id 'asst_abc'.")));
        assert!(!is_thread_not_found(&OpenAIError::InvalidArgument("bad".to_string())));
    }

    #[tokio::test]
    async fn test_create_thread_fails_without_retrying() {
        let client = OpenAiAssistantClient {
            client: Client::with_config(OpenAIConfig::new().with_api_key("sk-test").with_api_base("http://127.0.0.1:1/v1")),
            attachment_tool: MessageAttachmentTool::FileSearch,
        };

        let started = std::time::Instant::now();
        let result = client.create_thread().await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(900), "create_thread backed off before failing");
    }

    #[tokio::test]
    async fn test_call_with_retries_does_not_retry_api_errors() {
        let client = OpenAiAssistantClient {
            client: Client::with_config(OpenAIConfig::new().with_api_key("sk-test")),
            attachment_tool: MessageAttachmentTool::FileSearch,
        };
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let result: Res<()> = client
            .call_with_retries("list messages", || {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err::<(), _>(api_error("No thread found with id 'thread_abc'.")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_attachment_tool() {
        assert_eq!(parse_attachment_tool("file_search").unwrap(), MessageAttachmentTool::FileSearch);
        assert_eq!(parse_attachment_tool("code_interpreter").unwrap(), MessageAttachmentTool::CodeInterpreter);
        assert!(parse_attachment_tool("retrieval").is_err());
    }

    #[test]
    fn test_to_run_state_with_tool_calls() {
        let run: RunObject = serde_json::from_value(json!({
            "id": "run_123",
            "object": "thread.run",
            "created_at": 1700000000,
            "thread_id": "thread_abc",
            "assistant_id": "asst_123",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        { "id": "call_1", "type": "function", "function": { "name": "echo", "arguments": "{\"message\":\"hi\"}" } }
                    ]
                }
            },
            "last_error": null,
            "expires_at": null,
            "started_at": null,
            "cancelled_at": null,
            "failed_at": null,
            "completed_at": null,
            "incomplete_details": null,
            "model": "gpt-4o",
            "instructions": "",
            "tools": [],
            "metadata": null,
            "usage": null,
            "temperature": null,
            "top_p": null,
            "max_prompt_tokens": null,
            "max_completion_tokens": null,
            "truncation_strategy": null,
            "tool_choice": null,
            "parallel_tool_calls": true,
            "response_format": null
        }))
        .unwrap();

        let state = to_run_state(run);

        assert_eq!(state.id, "run_123");
        assert_eq!(state.status, RunStatus::RequiresAction);
        assert_eq!(state.tool_calls.len(), 1);
        assert_eq!(state.tool_calls[0].name, "echo");
        assert_eq!(state.tool_calls[0].arguments, "{\"message\":\"hi\"}");
    }

    #[test]
    fn test_to_thread_message() {
        let message: MessageObject = serde_json::from_value(json!({
            "id": "msg_1",
            "object": "thread.message",
            "created_at": 1700000000,
            "thread_id": "thread_abc",
            "status": "completed",
            "incomplete_details": null,
            "completed_at": null,
            "incomplete_at": null,
            "role": "assistant",
            "content": [
                { "type": "text", "text": { "value": "Hi there!", "annotations": [] } },
                { "type": "image_file", "image_file": { "file_id": "file_1", "detail": null } }
            ],
            "assistant_id": "asst_123",
            "run_id": "run_123",
            "attachments": null,
            "metadata": null
        }))
        .unwrap();

        let message = to_thread_message(message);

        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content[0].text(), Some("Hi there!"));
        assert_eq!(message.content[1], ContentBlock::ImageFile { file_id: "file_1".to_string() });
    }

    #[test]
    fn test_to_openai_tool() {
        let tool = ToolDefinition {
            name: "echo".to_string(),
            description: Some("Echo a message.".to_string()),
            parameters: json!({ "type": "object", "properties": { "message": { "type": "string" } } }),
        };

        let AssistantTools::Function(function) = to_openai_tool(&tool) else {
            panic!("Expected a function tool.");
        };

        assert_eq!(function.function.name, "echo");
        assert_eq!(function.function.parameters, Some(tool.parameters));
    }
}
