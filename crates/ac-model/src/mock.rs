// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::provider::{ModelProvider, ResponseStream, StreamItem};
use crate::types::{LLMCallParameter, Message, Part, StopReason, Usage};

/// A provider that always answers with a fixed, canned assistant message.
/// Used by tests that exercise the turn/task loop without any network
/// dependency.
pub struct MockProvider {
    pub reply_text: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self { reply_text: "ok".into() }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    async fn stream(
        &self,
        _params: LLMCallParameter,
        _abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream> {
        let text = self.reply_text.clone();
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(Ok(StreamItem::ResponseStart { response_id: "mock-1".into() })).await;
            let _ = tx.send(Ok(StreamItem::AssistantTextDelta { text: text.clone() })).await;
            let message = Message::Assistant {
                parts: vec![Part::text(text)],
                usage: Some(Usage { input_tokens: 1, output_tokens: 1, ..Default::default() }),
                stop_reason: Some(StopReason::Stop),
                response_id: Some("mock-1".into()),
                id: None,
                created_at: chrono::Utc::now(),
            };
            let _ = tx.send(Ok(StreamItem::AssistantMessage { message })).await;
        });
        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

/// A step in a [`ScriptedMockProvider`]'s canned response sequence: either a
/// final text answer, or a tool call that the test expects the executor to
/// run before the next step is consumed.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Text(String),
    ToolCall { call_id: String, tool_name: String, arguments_json: String },
}

/// Replays a fixed, ordered script of [`ScriptStep`]s, one per `stream()`
/// call, regardless of what the caller's `params` contain. Lets task/turn
/// loop tests assert on a deterministic multi-round tool-use sequence.
pub struct ScriptedMockProvider {
    steps: Vec<ScriptStep>,
    next: AtomicUsize,
    calls: Mutex<Vec<LLMCallParameter>>,
}

impl ScriptedMockProvider {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps, next: AtomicUsize::new(0), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls_made(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn id(&self) -> &str {
        "scripted-mock"
    }

    async fn stream(
        &self,
        params: LLMCallParameter,
        _abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream> {
        self.calls.lock().unwrap().push(params);
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .get(idx)
            .cloned()
            .unwrap_or_else(|| ScriptStep::Text("(script exhausted)".into()));

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(Ok(StreamItem::ResponseStart { response_id: format!("script-{idx}") })).await;
            let (parts, stop_reason) = match step {
                ScriptStep::Text(text) => {
                    let _ = tx.send(Ok(StreamItem::AssistantTextDelta { text: text.clone() })).await;
                    (vec![Part::text(text)], StopReason::Stop)
                }
                ScriptStep::ToolCall { call_id, tool_name, arguments_json } => {
                    let _ = tx.send(Ok(StreamItem::ToolCallStart { call_id: call_id.clone(), tool_name: tool_name.clone() })).await;
                    let part = Part::ToolCall { call_id, tool_name, arguments_json };
                    let _ = tx.send(Ok(StreamItem::ToolCall { part: part.clone() })).await;
                    (vec![part], StopReason::ToolUse)
                }
            };
            let message = Message::Assistant {
                parts,
                usage: Some(Usage::default()),
                stop_reason: Some(stop_reason),
                response_id: Some(format!("script-{idx}")),
                id: None,
                created_at: chrono::Utc::now(),
            };
            let _ = tx.send(Ok(StreamItem::AssistantMessage { message })).await;
        });
        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}
