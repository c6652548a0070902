// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use ac_model::{Message, ToolStatus};

use crate::context::ToolContext;

/// One tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Which offload/truncation routine a tool's output should go through.
/// Dispatch happens by category, never by tool name, so a new tool only
/// needs to pick the right bucket rather than write its own truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    /// Keep head and tail, drop the middle (file reads, shell stdout).
    HeadTail,
    /// A list of matches; keep the first N, note how many were dropped
    /// (glob/grep results).
    MatchList,
    /// Whole-file content with a path/stats note prefixed.
    FileContent,
    /// No special structure; plain head/tail fallback.
    Generic,
}

/// Builder for the `ToolResult` message a tool's `execute` returns. Tools
/// never raise: every failure is represented here as `status: Error`.
pub struct ToolOutput;

impl ToolOutput {
    pub fn ok(call: &ToolCall, text: impl Into<String>) -> Message {
        Message::ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::Success,
            output_text: text.into(),
            parts: Vec::new(),
            ui_extra: None,
            id: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn err(call: &ToolCall, text: impl Into<String>) -> Message {
        Message::ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::Error,
            output_text: text.into(),
            parts: Vec::new(),
            ui_extra: None,
            id: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn aborted(call: &ToolCall) -> Message {
        Message::ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolStatus::Aborted,
            output_text: "<cancelled>".into(),
            parts: Vec::new(),
            ui_extra: None,
            id: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// A tool the model can invoke. Implementations must never panic or return
/// `Err` out of `execute` for ordinary failures — those become
/// `ToolOutput::err` instead, so the model sees a structured result it can
/// react to.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    /// Whether calls to this tool may run concurrently with other
    /// `parallel_safe` calls in the same batch. Tools with side effects on
    /// shared state (file writes, mode switches) must return `false`.
    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({ "type": "object" })
        }
        fn parallel_safe(&self) -> bool {
            true
        }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> Message {
            ToolOutput::ok(call, call.args.get("text").and_then(Value::as_str).unwrap_or(""))
        }
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: "echo".into(), args }
    }

    #[tokio::test]
    async fn echo_tool_returns_success_status() {
        let tool = EchoTool;
        let ctx = ToolContext::for_tests();
        let result = tool.execute(&call(serde_json::json!({"text":"hi"})), &ctx).await;
        match result {
            Message::ToolResult { status, output_text, .. } => {
                assert_eq!(status, ToolStatus::Success);
                assert_eq!(output_text, "hi");
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[test]
    fn tool_output_never_carries_a_text_part() {
        let msg = ToolOutput::ok(&call(Value::Null), "text");
        assert!(msg.parts().is_empty());
    }
}
