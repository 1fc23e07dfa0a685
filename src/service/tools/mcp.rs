//! MCP (Model Context Protocol) implementation of the tool table.
//!
//! Servers are read from an `mcp.json` file (either the `servers` or the `mcpServers` key),
//! connected at startup, and their tools are offered to the assistant as function tools.

use std::{path::Path, str::FromStr, sync::Arc};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, Tool},
    service::RunningService,
    transport::{StreamableHttpClientTransport, TokioChildProcess, streamable_http_client::StreamableHttpClientTransportConfig},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::base::types::{Res, ToolDefinition};

use super::{GenericToolTable, ToolTable};

// Types.

/// A server entry in the MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub config: McpServerConfig,
}

/// The configuration of an MCP server, which is either a local child process or a remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Local {
        command: String,
        args: Vec<String>,
        envs: Option<Vec<(String, String)>>,
    },
    Remote {
        url: String,
        headers: Option<Vec<(String, String)>>,
    },
}

/// A connected MCP server and the tools it exposes.
#[derive(Debug, Clone)]
pub struct Mcp {
    pub name: String,
    pub client: Arc<RunningService<RoleClient, ()>>,
    pub tools: Vec<Tool>,
}

// Extra methods on `ToolTable` applied by the MCP implementation.

impl ToolTable {
    /// Connects to every server listed in the `mcp.json` at `path`.
    ///
    /// A missing file yields an empty table.
    pub async fn mcp(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();

        let json_servers = load_mcp_json(path)?;
        let servers = get_servers_from_mcp_json(json_servers)?;
        let mcps = hydrate_mcps(servers.iter()).await?;

        info!("Loaded {} tool(s) from {} MCP server(s) in `{}`.", mcps.iter().map(|m| m.tools.len()).sum::<usize>(), mcps.len(), path.display());

        Ok(Self::new(Arc::new(McpToolTable { mcps })))
    }
}

// Specific implementations.

/// Tool table backed by connected MCP servers.
pub struct McpToolTable {
    mcps: Vec<Mcp>,
}

impl McpToolTable {
    /// Find the server that exposes the named tool.
    fn find(&self, name: &str) -> Option<&Mcp> {
        self.mcps.iter().find(|mcp| mcp.tools.iter().any(|tool| tool.name == name))
    }
}

#[async_trait]
impl GenericToolTable for McpToolTable {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.mcps.iter().flat_map(|mcp| mcp.tools.iter()).filter_map(|tool| to_tool_definition(tool).ok()).collect()
    }

    #[instrument(name = "McpToolTable::call", skip(self, arguments))]
    async fn call(&self, name: &str, arguments: &str) -> Res<String> {
        let mcp = self.find(name).ok_or_else(|| anyhow::anyhow!("Unknown tool: {name}."))?;

        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: parse_arguments(arguments)?,
        };

        let result = mcp.client.call_tool(request).await?;

        let output = result.content.iter().filter_map(|c| c.as_text()).map(|t| t.text.as_str()).collect::<Vec<_>>().join("\n");

        if result.is_error.unwrap_or(false) {
            warn!("Tool `{name}` on `{}` reported an error.", mcp.name);
            return Err(anyhow::anyhow!("Tool `{name}` failed: {output}"));
        }

        Ok(output)
    }
}

// Helpers.

/// Load the server entries of the `mcp.json` at `path`, merging the `servers` and `mcpServers` keys.
pub fn load_mcp_json(path: &Path) -> Res<Map<String, Value>> {
    let Ok(json) = std::fs::read_to_string(path) else {
        info!("No MCP configuration found at `{}`.", path.display());
        return Ok(Map::new());
    };

    let json = serde_json::from_str::<Value>(&json)?;

    let mut json_servers = Map::new();
    for key in ["servers", "mcpServers"] {
        match json.get(key) {
            Some(Value::Object(servers)) => json_servers.extend(servers.clone()),
            Some(_) => return Err(anyhow::anyhow!("The `{key}` entry in `{}` must be an object.", path.display())),
            None => {}
        }
    }

    Ok(json_servers)
}

/// Parse the server entries into [`McpServer`]s.
pub fn get_servers_from_mcp_json(json_servers: Map<String, Value>) -> Res<Vec<McpServer>> {
    json_servers
        .into_iter()
        .map(|(name, value)| {
            let config = serde_json::from_value::<McpServerConfig>(value).map_err(|e| anyhow::anyhow!("Invalid MCP server `{name}`: {e}"))?;
            Ok(McpServer { name, config })
        })
        .collect::<Res<Vec<_>>>()
}

/// Connect to an [`McpServer`].
pub async fn get_mcp_server_client(server: &McpServer) -> Res<RunningService<RoleClient, ()>> {
    match &server.config {
        McpServerConfig::Local { command, args, envs } => {
            let mut command = Command::new(command);

            command.args(args);

            if let Some(envs) = envs {
                for (key, value) in envs {
                    command.env(key, value);
                }
            }

            let transport = TokioChildProcess::new(command)?;

            Ok(().serve(transport).await?)
        }
        McpServerConfig::Remote { url, headers } => {
            let mut header_map = HeaderMap::new();
            if let Some(headers) = headers {
                for (key, value) in headers {
                    header_map.insert(HeaderName::from_str(key)?, HeaderValue::from_str(value)?);
                }
            }

            let client = reqwest::Client::builder().default_headers(header_map).build()?;
            let config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
            let transport = StreamableHttpClientTransport::with_client(client, config);

            Ok(().serve(transport).await?)
        }
    }
}

/// Connect to every server concurrently and list their tools.
pub async fn hydrate_mcps(servers: impl IntoIterator<Item = &McpServer>) -> Res<Vec<Mcp>> {
    let tasks = servers
        .into_iter()
        .map(|server| async move {
            let client = Arc::new(get_mcp_server_client(server).await?);
            let tools = client.list_all_tools().await?;

            Ok(Mcp { name: server.name.clone(), client, tools })
        })
        .collect::<Vec<_>>();

    futures::future::join_all(tasks).await.into_iter().collect::<Res<Vec<_>>>()
}

/// Convert an MCP tool into a function tool definition.
fn to_tool_definition(tool: &Tool) -> Res<ToolDefinition> {
    let value = serde_json::to_value(tool)?;

    let name = value.get("name").and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("MCP tool without a name."))?.to_string();
    let description = value.get("description").and_then(Value::as_str).map(str::to_string);
    let parameters = value.get("inputSchema").cloned().unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));

    Ok(ToolDefinition { name, description, parameters })
}

/// Parse model-generated arguments into the object MCP expects.
fn parse_arguments(arguments: &str) -> Res<Option<Map<String, Value>>> {
    if arguments.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(arguments)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(anyhow::anyhow!("Tool arguments must be a JSON object, got `{other}`.")),
    }
}

// Tests.
