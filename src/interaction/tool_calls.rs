//! The tool-call processor: drives a run until it is past any tool-call phase.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, RunState, RunStatus, ToolCall, ToolOutput},
    },
    service::{assistant::AssistantClient, tools::ToolTable},
};

/// Poll the run, answering every `requires_action` through the tool table, and return the run
/// once it reaches a status other than pending or requiring action.
///
/// Fails if the run takes longer than the configured run timeout (a timeout of zero waits forever).
#[instrument(skip(assistant, tools, config))]
pub async fn process_tool_calls(assistant: &AssistantClient, thread_id: &str, run_id: &str, tools: &ToolTable, config: &Config) -> Res<RunState> {
    let poll_interval = Duration::from_millis(config.run_poll_interval_ms);
    let work = drive_run(assistant, thread_id, run_id, tools, poll_interval);

    if config.run_timeout_secs == 0 {
        return work.await;
    }

    tokio::time::timeout(Duration::from_secs(config.run_timeout_secs), work)
        .await
        .map_err(|_| anyhow::anyhow!("Run {run_id} did not finish within {} seconds.", config.run_timeout_secs))?
}

async fn drive_run(assistant: &AssistantClient, thread_id: &str, run_id: &str, tools: &ToolTable, poll_interval: Duration) -> Res<RunState> {
    let mut run = assistant.retrieve_run(thread_id, run_id).await?;

    loop {
        match run.status {
            status if status.is_pending() => {
                debug!("Run {run_id} is {status:?}; polling again.");
                tokio::time::sleep(poll_interval).await;
                run = assistant.retrieve_run(thread_id, run_id).await?;
            }
            RunStatus::RequiresAction => {
                if run.tool_calls.is_empty() {
                    return Err(anyhow::anyhow!("Run {run_id} requires action, but requested no tool calls."));
                }

                info!("Run {run_id} requested {} tool call(s).", run.tool_calls.len());

                let outputs = call_tools(tools, &run.tool_calls).await;
                run = assistant.submit_tool_outputs(thread_id, run_id, outputs).await?;
            }
            _ => return Ok(run),
        }
    }
}

/// Call every tool concurrently, turning failures into error outputs for the model.
async fn call_tools(tools: &ToolTable, calls: &[ToolCall]) -> Vec<ToolOutput> {
    let tasks = calls.iter().map(|call| async move {
        let output = match tools.call(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(err) => {
                warn!("Tool `{}` failed: {}", call.name, err);
                format!("Error: {err}")
            }
        };

        ToolOutput {
            tool_call_id: call.id.clone(),
            output,
        }
    });

    futures::future::join_all(tasks).await
}

// Tests.
