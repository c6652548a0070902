// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A structured todo item managed by the `todo_write` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    /// One of: "pending", "in_progress", "completed", "cancelled".
    pub status: String,
}

/// Out-of-band signal a tool emits alongside its `ToolResult`, for state the
/// UI needs to react to but that doesn't belong in the model-facing text.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    TodoUpdate(Vec<TodoItem>),
    UserInteractionRequest { request_id: String, prompt: serde_json::Value },
}
