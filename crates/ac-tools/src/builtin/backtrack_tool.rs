// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Queues a jump back to an earlier checkpoint, discarding everything the
/// task has done since. Applied by the task loop at its next iteration
/// boundary, not immediately (SPEC_FULL.md §4.E).
pub struct BacktrackTool;

#[async_trait]
impl Tool for BacktrackTool {
    fn name(&self) -> &str {
        "Backtrack"
    }

    fn description(&self) -> &str {
        "Roll the conversation back to an earlier checkpoint, discarding everything since."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "checkpoint_id": { "type": "integer", "minimum": 0 },
                "note": { "type": "string" }
            },
            "required": ["checkpoint_id", "note"]
        })
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(checkpoint_id) = call.args.get("checkpoint_id").and_then(Value::as_u64) else {
            return ToolOutput::err(call, "missing 'checkpoint_id'");
        };
        let note = call.args.get("note").and_then(Value::as_str).unwrap_or_default().to_string();

        let Some(trigger) = &ctx.trigger_backtrack else {
            return ToolOutput::err(call, "backtracking is not available in this context");
        };

        match trigger(checkpoint_id, note).await {
            Ok(()) => ToolOutput::ok(call, format!("queued backtrack to checkpoint {checkpoint_id}")),
            Err(e) => ToolOutput::err(call, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn call_with(checkpoint_id: u64) -> ToolCall {
        ToolCall { id: "c1".into(), name: "Backtrack".into(), args: json!({"checkpoint_id": checkpoint_id, "note": "retry"}) }
    }

    #[tokio::test]
    async fn queues_a_backtrack_through_the_injected_trigger() {
        let mut ctx = ToolContext::for_tests();
        ctx.trigger_backtrack = Some(std::sync::Arc::new(|_id: u64, note: String| {
            async move {
                assert_eq!(note, "retry");
                Ok(())
            }
            .boxed()
        }));

        let tool = BacktrackTool;
        let result = tool.execute(&call_with(3), &ctx).await;
        match result {
            Message::ToolResult { status, output_text, .. } => {
                assert_eq!(status, ac_model::ToolStatus::Success);
                assert!(output_text.contains('3'));
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[tokio::test]
    async fn missing_trigger_is_an_error_not_a_panic() {
        let ctx = ToolContext::for_tests();
        let tool = BacktrackTool;
        let result = tool.execute(&call_with(0), &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Error, .. }));
    }

    #[tokio::test]
    async fn a_refused_request_surfaces_the_trigger_s_error() {
        let mut ctx = ToolContext::for_tests();
        ctx.trigger_backtrack = Some(std::sync::Arc::new(|_id, _note| async move { Err("checkpoint 9 is inside a compacted region".to_string()) }.boxed()));

        let tool = BacktrackTool;
        let result = tool.execute(&call_with(9), &ctx).await;
        match result {
            Message::ToolResult { status, output_text, .. } => {
                assert_eq!(status, ac_model::ToolStatus::Error);
                assert!(output_text.contains("compacted region"));
            }
            _ => panic!("expected ToolResult"),
        }
    }
}
