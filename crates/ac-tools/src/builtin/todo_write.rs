// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::ToolContext;
use crate::events::TodoItem;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Replaces the session's todo list wholesale. The UI-facing
/// [`crate::events::ToolEvent::TodoUpdate`] is the channel that carries the
/// new list out; the tool result text is just a short confirmation.
pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "TodoWrite"
    }

    fn description(&self) -> &str {
        "Replace the current todo list with a new set of items."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] }
                        },
                        "required": ["id", "content", "status"]
                    }
                }
            },
            "required": ["items"]
        })
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(items) = call.args.get("items").and_then(Value::as_array) else {
            return ToolOutput::err(call, "missing 'items'");
        };
        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = item.get("id").and_then(Value::as_str) else {
                return ToolOutput::err(call, "todo item missing 'id'");
            };
            let Some(content) = item.get("content").and_then(Value::as_str) else {
                return ToolOutput::err(call, "todo item missing 'content'");
            };
            let status = item.get("status").and_then(Value::as_str).unwrap_or("pending");
            parsed.push(TodoItem { id: id.to_string(), content: content.to_string(), status: status.to_string() });
        }

        let count = parsed.len();
        *ctx.todo_context.lock().unwrap() = parsed;
        ToolOutput::ok(call, format!("todo list updated ({count} item(s))"))
    }
}
