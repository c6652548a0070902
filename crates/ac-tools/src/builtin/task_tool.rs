// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::{SubTaskRequest, ToolContext};
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Delegates a focused sub-task to a fresh, depth-bounded sub-agent session
/// and waits for its result. Only wired into a top-level session's registry;
/// `ctx.run_subtask` is absent for sub-agents, which cannot delegate further
/// than the sub-agent manager's own depth limit allows (SPEC_FULL.md §4.H).
pub struct TaskTool;

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "Task"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent and return its final result."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" },
                "output_schema": { "type": "object" }
            },
            "required": ["prompt"]
        })
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(prompt) = call.args.get("prompt").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'prompt'");
        };
        let output_schema = call.args.get("output_schema").cloned();

        let Some(run_subtask) = &ctx.run_subtask else {
            return ToolOutput::err(call, "sub-agent delegation is not available in this context");
        };

        let result = run_subtask(SubTaskRequest { prompt: prompt.to_string(), output_schema }).await;
        if let Some(error) = result.error {
            return ToolOutput::err(call, error);
        }
        ToolOutput::ok(call, result.task_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn call_with(prompt: &str) -> ToolCall {
        ToolCall { id: "c1".into(), name: "Task".into(), args: json!({"prompt": prompt}) }
    }

    #[tokio::test]
    async fn delegates_to_run_subtask_and_returns_its_result() {
        let mut ctx = ToolContext::for_tests();
        ctx.run_subtask = Some(std::sync::Arc::new(|request: SubTaskRequest| {
            async move {
                crate::context::SubTaskResult {
                    task_result: format!("handled: {}", request.prompt),
                    structured_output: None,
                    session_id: "sub-1".into(),
                    error: None,
                }
            }
            .boxed()
        }));

        let tool = TaskTool;
        let result = tool.execute(&call_with("summarize the repo"), &ctx).await;
        match result {
            Message::ToolResult { status, output_text, .. } => {
                assert_eq!(status, ac_model::ToolStatus::Success);
                assert_eq!(output_text, "handled: summarize the repo");
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[tokio::test]
    async fn missing_run_subtask_is_an_error_not_a_panic() {
        let ctx = ToolContext::for_tests();
        let tool = TaskTool;
        let result = tool.execute(&call_with("do it"), &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Error, .. }));
    }

    #[tokio::test]
    async fn missing_prompt_is_an_error_not_a_panic() {
        let ctx = ToolContext::for_tests();
        let tool = TaskTool;
        let call = ToolCall { id: "c1".into(), name: "Task".into(), args: json!({}) };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Error, .. }));
    }
}
