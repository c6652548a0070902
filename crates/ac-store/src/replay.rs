// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use ac_model::{join_text_parts, Message, Part, StopReason, ToolStatus};
use serde_json::Value;
use uuid::Uuid;

use crate::history::HistoryEvent;

/// A UI-facing event reconstructed from persisted history on session
/// resume. Distinct from the live `CoreEvent` stream: replay never carries
/// streaming deltas, only the settled shape of each turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    UserMessage { text: String },
    DeveloperMessage { text: String },
    ThinkingText { text: String },
    AssistantText { text: String },
    AssistantImage { file_path: String },
    ToolCall { call_id: String, tool_name: String, arguments_json: String },
    ToolResult { call_id: String, tool_name: String, status: ToolResultStatus, output_text: String, ui_extra: Option<Value> },
    Interrupt,
    CompactionStart { end_index: usize },
    CompactionEnd { summary_text: String },
    Backtrack { checkpoint_id: u64, note: String, original_user_message: Option<String> },
}

/// Replay collapses the tool-level `aborted` status into `error` plus a
/// separate [`ReplayEvent::Interrupt`], matching the live event stream's
/// surface (§6 Wire protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// Translate one persisted [`HistoryEvent`] into the ordered sequence of
/// replay events the UI renders for it.
pub fn to_replay_events(event: &HistoryEvent) -> Vec<ReplayEvent> {
    if let Some(message) = event.as_message() {
        return message_to_replay_events(message);
    }
    match event {
        HistoryEvent::StreamError(item) => vec![ReplayEvent::AssistantText { text: format!("[error: {}]", item.message) }],
        HistoryEvent::TaskMetadata(_) => Vec::new(),
        HistoryEvent::Compaction(entry) => vec![
            ReplayEvent::CompactionStart { end_index: entry.end_index },
            ReplayEvent::CompactionEnd { summary_text: entry.summary_text.clone() },
        ],
        HistoryEvent::Backtrack(entry) => vec![ReplayEvent::Backtrack {
            checkpoint_id: entry.checkpoint_id,
            note: entry.note.clone(),
            original_user_message: entry.original_user_message.clone(),
        }],
        HistoryEvent::UserMessage(_)
        | HistoryEvent::DeveloperMessage(_)
        | HistoryEvent::AssistantMessage(_)
        | HistoryEvent::SystemMessage(_)
        | HistoryEvent::ToolResult(_) => unreachable!("as_message() above handles every message-shaped variant"),
    }
}

fn message_to_replay_events(message: &Message) -> Vec<ReplayEvent> {
    match message {
        Message::User { parts, .. } => {
            vec![ReplayEvent::UserMessage { text: join_text_parts(parts) }]
        }
        Message::Developer { parts, .. } => {
            vec![ReplayEvent::DeveloperMessage { text: join_text_parts(parts) }]
        }
        Message::System { .. } => Vec::new(),
        Message::Assistant { parts, stop_reason, .. } => {
            let mut out = Vec::new();
            for part in parts {
                match part {
                    Part::ThinkingText { text, .. } => out.push(ReplayEvent::ThinkingText { text: text.clone() }),
                    Part::ThinkingSignature { .. } => {}
                    Part::Text { text } => out.push(ReplayEvent::AssistantText { text: text.clone() }),
                    Part::ImageFile { file_path, .. } => out.push(ReplayEvent::AssistantImage { file_path: file_path.clone() }),
                    Part::ImageUrl { url, .. } => out.push(ReplayEvent::AssistantImage { file_path: url.clone() }),
                    Part::ToolCall { call_id, tool_name, arguments_json } => out.push(ReplayEvent::ToolCall {
                        call_id: call_id.clone(),
                        tool_name: tool_name.clone(),
                        arguments_json: arguments_json.clone(),
                    }),
                }
            }
            if *stop_reason == Some(StopReason::Aborted) {
                out.push(ReplayEvent::Interrupt);
            }
            out
        }
        Message::ToolResult { call_id, tool_name, status, output_text, ui_extra, .. } => {
            let mapped = match status {
                ToolStatus::Success => ToolResultStatus::Success,
                ToolStatus::Error | ToolStatus::Aborted => ToolResultStatus::Error,
            };
            let mut out = vec![ReplayEvent::ToolResult {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                status: mapped,
                output_text: output_text.clone(),
                ui_extra: ui_extra.clone(),
            }];
            if *status == ToolStatus::Aborted {
                out.push(ReplayEvent::Interrupt);
            }
            out
        }
    }
}

/// Replay an entire session's history in order. `_session_id` is accepted
/// for symmetry with the live event stream, where every event carries one;
/// replay events themselves stay session-agnostic since the caller already
/// knows which session it asked to resume.
pub fn replay_session(_session_id: Uuid, history: &[HistoryEvent]) -> Vec<ReplayEvent> {
    history.iter().flat_map(to_replay_events).collect()
}
