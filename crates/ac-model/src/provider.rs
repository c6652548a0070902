// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::oneshot;

use crate::types::{LLMCallParameter, Message, Part, StopReason, Usage};

/// One item out of a provider's streaming response. See SPEC_FULL.md §4.B
/// for the full ordering contract.
#[derive(Debug, Clone)]
pub enum StreamItem {
    ResponseStart { response_id: String },
    ThinkingDelta { text: String },
    ThinkingSignature { signature: String, format: Option<String> },
    AssistantTextDelta { text: String },
    ImageDelta { part: Part },
    ToolCallStart { call_id: String, tool_name: String },
    ToolCallArgsDelta { call_id: String, json_fragment: String },
    ToolCall { part: Part },
    AssistantMessage { message: Message },
    StreamError { fatal: bool, message: String },
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamItem>> + Send>>;

/// Uniform streaming contract every provider adapter implements. A provider
/// owns only the mapping from its wire format to [`StreamItem`]s; turn/task
/// orchestration lives entirely in `ac-core`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable driver id, e.g. `"anthropic"`.
    fn id(&self) -> &str;

    /// Begin a streaming completion call. `abort` resolves when the caller
    /// wants the stream cancelled; implementations must still yield a final
    /// `AssistantMessage` with `stop_reason = Aborted` reflecting whatever
    /// partial content had been produced (SPEC_FULL.md §4.B cancellation
    /// contract), then end the stream.
    async fn stream(
        &self,
        params: LLMCallParameter,
        abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream>;
}

/// Shared helper: build the synthetic cancelled `AssistantMessage` every
/// provider must emit when `abort` fires mid-stream.
pub fn aborted_message(parts: Vec<Part>, usage: Option<Usage>) -> Message {
    Message::Assistant {
        parts,
        usage,
        stop_reason: Some(StopReason::Aborted),
        response_id: None,
        id: None,
        created_at: chrono::Utc::now(),
    }
}
