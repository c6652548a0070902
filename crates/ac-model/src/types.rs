// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One piece of content inside a [`Message`]. Tagged by `type` so the codec
/// can dispatch on a stable discriminator rather than positional shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ImageUrl {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ImageFile {
        file_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        byte_size: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    ThinkingText {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model_id: Option<String>,
    },
    ThinkingSignature {
        signature: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model_id: Option<String>,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments_json: String,
    },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text { text: s.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Why an [`AssistantMessage`] stopped producing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    /// Reserved strictly for user interrupt / task cancellation.
    Aborted,
}

/// Outcome of a [`ToolResultMessage`]. Distinct from [`StopReason::Aborted`]
/// only in that it is scoped to a single tool call rather than a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

/// A single conversation message. Tagged by `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        parts: Vec<Part>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        created_at: DateTime<Utc>,
    },
    Developer {
        parts: Vec<Part>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        created_at: DateTime<Utc>,
    },
    User {
        parts: Vec<Part>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        created_at: DateTime<Utc>,
    },
    Assistant {
        parts: Vec<Part>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        created_at: DateTime<Utc>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        status: ToolStatus,
        output_text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        parts: Vec<Part>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ui_extra: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        created_at: DateTime<Utc>,
    },
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Message::User {
            parts: vec![Part::text(text)],
            id: None,
            created_at: Utc::now(),
        }
    }

    pub fn developer_text(text: impl Into<String>) -> Self {
        Message::Developer {
            parts: vec![Part::text(text)],
            id: None,
            created_at: Utc::now(),
        }
    }

    pub fn parts(&self) -> &[Part] {
        match self {
            Message::System { parts, .. }
            | Message::Developer { parts, .. }
            | Message::User { parts, .. }
            | Message::Assistant { parts, .. } => parts,
            Message::ToolResult { parts, .. } => parts,
        }
    }

    /// Every tool call part carried by an assistant message, in order.
    pub fn tool_calls(&self) -> Vec<(&str, &str, &str)> {
        match self {
            Message::Assistant { parts, .. } => parts
                .iter()
                .filter_map(|p| match p {
                    Part::ToolCall { call_id, tool_name, arguments_json } => {
                        Some((call_id.as_str(), tool_name.as_str(), arguments_json.as_str()))
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Concatenate all text parts of a message, in order.
pub fn join_text_parts(parts: &[Part]) -> String {
    parts.iter().filter_map(Part::as_text).collect::<Vec<_>>().join("")
}

/// Rough token-count heuristic: ~4 characters per token, with a fixed
/// surcharge per image part to account for vision-token overhead that chars
/// alone never capture.
pub fn approx_tokens(message: &Message) -> u64 {
    let mut chars = 0usize;
    let mut image_count = 0usize;
    for part in message.parts() {
        match part {
            Part::Text { text } => chars += text.chars().count(),
            Part::ThinkingText { text, .. } => chars += text.chars().count(),
            Part::ThinkingSignature { signature, .. } => chars += signature.chars().count(),
            Part::ToolCall { arguments_json, .. } => chars += arguments_json.chars().count(),
            Part::ImageUrl { .. } | Part::ImageFile { .. } => image_count += 1,
        }
    }
    if let Message::ToolResult { output_text, .. } = message {
        chars += output_text.chars().count();
    }
    (chars as u64 / 4) + (image_count as u64 * 1_500)
}

/// Fold `DeveloperMessage`s into the preceding user/tool-result message as an
/// out-of-band attachment, since no wire format in this system sends a
/// developer role as its own turn. A developer message with nothing
/// preceding it is attached to the next user message, or promoted to a
/// synthesized user message if the conversation ends before one arrives.
pub fn attach_developer_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut pending_dev: Vec<Part> = Vec::new();

    for msg in messages {
        match msg {
            Message::Developer { parts, .. } => {
                pending_dev.extend(parts);
            }
            Message::User { mut parts, id, created_at } => {
                if !pending_dev.is_empty() {
                    parts.extend(std::mem::take(&mut pending_dev));
                }
                out.push(Message::User { parts, id, created_at });
            }
            Message::ToolResult { mut parts, call_id, tool_name, status, output_text, ui_extra, id, created_at } => {
                if !pending_dev.is_empty() {
                    parts.extend(std::mem::take(&mut pending_dev));
                }
                out.push(Message::ToolResult {
                    call_id, tool_name, status, output_text, parts, ui_extra, id, created_at,
                });
            }
            other => out.push(other),
        }
    }

    if !pending_dev.is_empty() {
        out.push(Message::User {
            parts: pending_dev,
            id: None,
            created_at: Utc::now(),
        });
    }

    out
}

/// A tool's advertised name, description, and JSON-schema arguments shape,
/// as handed to a provider's request builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Everything a provider adapter needs to build one streaming completion
/// request.
#[derive(Debug, Clone)]
pub struct LLMCallParameter {
    pub input: Vec<Message>,
    pub system: Option<String>,
    pub tools: Vec<ToolSchema>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}
