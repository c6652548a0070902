// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use ac_model::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A transient stream failure that ended a turn without a final assistant
/// message (fatal LLM errors; authentication, quota, invalid request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamErrorItem {
    pub message: String,
    pub provider_error_code: Option<String>,
}

/// The terminal result of a task, recorded once the loop ends via
/// `report_back` or exhausts its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadataItem {
    pub task_result: Option<String>,
    pub structured_output: Option<Value>,
}

/// A pointer into history marking a region replaced during LLM replay by a
/// single summarizing developer message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionEntry {
    pub end_index: usize,
    pub summary_text: String,
}

/// Records that the session was truncated back to a prior checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktrackEntry {
    pub checkpoint_id: u64,
    pub note: String,
    pub original_user_message: Option<String>,
}

/// One persisted unit of session history. Streaming deltas, tool-call-start
/// signals, and interrupt notifications are runtime-only and never appear
/// here.
///
/// A `Message` is split across five tags by its own role rather than wrapped
/// under one generic `"message"` tag, so the `"t"` discriminator alone tells
/// a reader what kind of line this is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum HistoryEvent {
    #[serde(rename = "user_message")]
    UserMessage(Message),
    #[serde(rename = "developer_message")]
    DeveloperMessage(Message),
    #[serde(rename = "assistant_message")]
    AssistantMessage(Message),
    #[serde(rename = "system_message")]
    SystemMessage(Message),
    #[serde(rename = "tool_result")]
    ToolResult(Message),
    #[serde(rename = "stream_error")]
    StreamError(StreamErrorItem),
    #[serde(rename = "task_metadata")]
    TaskMetadata(TaskMetadataItem),
    #[serde(rename = "compaction")]
    Compaction(CompactionEntry),
    #[serde(rename = "backtrack")]
    Backtrack(BacktrackEntry),
}

impl HistoryEvent {
    /// Wrap a `Message` in the `HistoryEvent` tag matching its own role.
    pub fn message(m: Message) -> Self {
        match &m {
            Message::User { .. } => HistoryEvent::UserMessage(m),
            Message::Developer { .. } => HistoryEvent::DeveloperMessage(m),
            Message::Assistant { .. } => HistoryEvent::AssistantMessage(m),
            Message::System { .. } => HistoryEvent::SystemMessage(m),
            Message::ToolResult { .. } => HistoryEvent::ToolResult(m),
        }
    }

    /// Borrow the inner `Message`, if this event is one of the five
    /// message-shaped variants.
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            HistoryEvent::UserMessage(m)
            | HistoryEvent::DeveloperMessage(m)
            | HistoryEvent::AssistantMessage(m)
            | HistoryEvent::SystemMessage(m)
            | HistoryEvent::ToolResult(m) => Some(m),
            _ => None,
        }
    }

    /// Consume the event, returning the inner `Message` if it was one of the
    /// five message-shaped variants.
    pub fn into_message(self) -> Option<Message> {
        match self {
            HistoryEvent::UserMessage(m)
            | HistoryEvent::DeveloperMessage(m)
            | HistoryEvent::AssistantMessage(m)
            | HistoryEvent::SystemMessage(m)
            | HistoryEvent::ToolResult(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed history line: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode one event as a single JSON line (no trailing newline).
pub fn encode_line(event: &HistoryEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode one line back into an event. An unrecognized `"t"` discriminator
/// is a fatal decode error, never a silent skip.
pub fn decode_line(line: &str) -> Result<HistoryEvent, CodecError> {
    Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_model::ToolStatus;
    use chrono::Utc;

    #[test]
    fn codec_round_trips_a_message_event() {
        let event = HistoryEvent::message(Message::ToolResult {
            call_id: "c1".into(),
            tool_name: "Bash".into(),
            status: ToolStatus::Success,
            output_text: "ok".into(),
            parts: Vec::new(),
            ui_extra: None,
            id: None,
            created_at: Utc::now(),
        });
        let line = encode_line(&event).unwrap();
        let decoded = decode_line(&line).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn message_tag_matches_the_role_not_a_generic_wrapper() {
        let event = HistoryEvent::message(Message::user_text("hi"));
        let line = encode_line(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["t"], "user_message");
    }

    #[test]
    fn codec_round_trips_a_compaction_entry() {
        let event = HistoryEvent::Compaction(CompactionEntry { end_index: 12, summary_text: "summary".into() });
        let line = encode_line(&event).unwrap();
        assert_eq!(decode_line(&line).unwrap(), event);
    }

    #[test]
    fn unknown_discriminator_is_a_fatal_decode_error() {
        let err = decode_line(r#"{"t":"not_a_real_tag"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
