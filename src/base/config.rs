//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::Path, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default tool that uploaded attachments are added to.
fn default_openai_attachment_tool() -> String {
    "file_search".to_string()
}

/// Default interval between run status polls.
fn default_run_poll_interval_ms() -> u64 {
    500
}

/// Default run timeout (zero disables the timeout).
fn default_run_timeout_secs() -> u64 {
    600
}

/// Default scratch directory for attachments.
fn default_temp_dir() -> String {
    "./temp".to_string()
}

/// Default location of the MCP server declarations.
fn default_mcp_config_path() -> String {
    ".hidden/mcp.json".to_string()
}

/// Configuration for the assistant-relay application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Discord bot token (`ASSISTANT_RELAY_DISCORD_TOKEN`).
    pub discord_token: String,
    /// OpenAI API key (`ASSISTANT_RELAY_OPENAI_API_KEY`).
    pub openai_api_key: String,
    /// The assistant that every run is executed with (`ASSISTANT_RELAY_OPENAI_ASSISTANT_ID`).
    pub openai_assistant_id: String,
    /// The tool attached files are added to, either `file_search` or `code_interpreter` (`ASSISTANT_RELAY_OPENAI_ATTACHMENT_TOOL`).
    #[serde(default = "default_openai_attachment_tool")]
    pub openai_attachment_tool: String,
    /// Interval between run status polls, in milliseconds (`ASSISTANT_RELAY_RUN_POLL_INTERVAL_MS`).
    #[serde(default = "default_run_poll_interval_ms")]
    pub run_poll_interval_ms: u64,
    /// Maximum time a run may take, in seconds; `0` waits forever (`ASSISTANT_RELAY_RUN_TIMEOUT_SECS`).
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Directory where attachments are staged before upload (`ASSISTANT_RELAY_TEMP_DIR`).
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// Path to the `mcp.json` that declares the tool servers (`ASSISTANT_RELAY_MCP_CONFIG_PATH`).
    #[serde(default = "default_mcp_config_path")]
    pub mcp_config_path: String,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("ASSISTANT_RELAY"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the values that deserialization alone cannot.
    fn validate(&self) -> Res<()> {
        if self.discord_token.trim().is_empty() {
            return Err(anyhow::anyhow!("No Discord token found in the configuration."));
        }

        if self.openai_api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("No OpenAI API key found in the configuration."));
        }

        if self.openai_assistant_id.trim().is_empty() {
            return Err(anyhow::anyhow!("No OpenAI assistant ID found in the configuration."));
        }

        if !matches!(self.openai_attachment_tool.as_str(), "file_search" | "code_interpreter") {
            return Err(anyhow::anyhow!("OpenAI attachment tool must be one of: file_search, code_interpreter."));
        }

        if self.run_poll_interval_ms < 1 || self.run_poll_interval_ms > 60000 {
            return Err(anyhow::anyhow!("Run poll interval must be between 1 and 60000 milliseconds."));
        }

        Ok(())
    }
}

// Tests.
