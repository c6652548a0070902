// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;
use uuid::Uuid;

use ac_model::{StopReason, Usage};

/// Everything the orchestrator emits toward a UI. Never persisted — the
/// durable record is the `HistoryEvent` log in `ac-store`; this is the live
/// commentary on top of it.
#[derive(Debug, Clone)]
pub struct CoreEvent {
    pub session_id: Uuid,
    pub kind: CoreEventKind,
}

impl CoreEvent {
    pub fn new(session_id: Uuid, kind: CoreEventKind) -> Self {
        Self { session_id, kind }
    }
}

#[derive(Debug, Clone)]
pub enum CoreEventKind {
    // Lifecycle
    TaskStart,
    TurnStart,
    TurnEnd,
    TaskFinish { task_result: String, structured_output: Option<Value> },

    // Streaming
    ThinkingStart,
    ThinkingDelta(String),
    ThinkingEnd,
    AssistantTextStart,
    AssistantTextDelta(String),
    AssistantTextEnd,
    AssistantImageDelta { file_path: String },
    ToolCallStart { call_id: String, tool_name: String },

    // Tool execution
    ToolCall { call_id: String, tool_name: String, arguments_json: String },
    ToolResult { call_id: String, status: ToolResultStatus, ui_extra: Option<Value> },

    // Metadata
    ResponseMetadata { response_id: Option<String>, stop_reason: Option<StopReason> },
    Usage(Usage),

    // System
    UserMessage(String),
    DeveloperMessage(String),
    Error(String),
    Interrupt,
    CompactionStart,
    CompactionEnd { tokens_before: u64, tokens_after: u64 },
    Backtrack { checkpoint_id: u64, original_user_message: Option<String> },
    UserInteractionRequest { request_id: String, prompt: Value },
}

/// Internal `"aborted"` tool status is surfaced to the UI as `"error"` plus
/// a separate [`CoreEventKind::Interrupt`] (§6 Wire protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResultStatus {
    Success,
    Error,
}
