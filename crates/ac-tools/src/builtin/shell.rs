// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::warn;

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::truncate::truncate_for_model;

/// Runs a shell command through `/bin/sh -c`, capturing combined
/// stdout+stderr and enforcing a hard timeout.
pub struct ShellTool {
    pub max_timeout_secs: u64,
}

impl ShellTool {
    pub fn new(max_timeout_secs: u64) -> Self {
        Self { max_timeout_secs }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its combined stdout/stderr."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to run" },
                "timeout_secs": { "type": "integer", "description": "Override the default timeout" }
            },
            "required": ["command"]
        })
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(command) = call.args.get("command").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'command'");
        };
        let requested = call.args.get("timeout_secs").and_then(Value::as_u64).unwrap_or(ctx.shell_timeout_secs);
        let secs = requested.min(self.max_timeout_secs);

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output();

        match timeout(Duration::from_secs(secs), child).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                if !output.status.success() {
                    text.push_str(&format!("\n(exit code: {})", output.status.code().unwrap_or(-1)));
                }
                let text = truncate_for_model(ctx, self.name(), &call.id, self.output_category(), &text);
                if output.status.success() {
                    ToolOutput::ok(call, text)
                } else {
                    ToolOutput::err(call, text)
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "failed to spawn shell command");
                ToolOutput::err(call, format!("failed to spawn: {e}"))
            }
            Err(_) => ToolOutput::err(call, format!("command timed out after {secs}s")),
        }
    }
}
