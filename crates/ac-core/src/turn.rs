// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{instrument, warn};
use uuid::Uuid;

use ac_model::{LLMCallParameter, Message, ModelProvider, Part, StreamItem, ToolSchema};
use ac_tools::{parse_call, ToolCall, ToolContext, ToolRegistry};

use crate::events::{CoreEvent, CoreEventKind, ToolResultStatus};

/// Everything one turn needs beyond the message input it's given.
pub struct TurnContext {
    pub provider: Arc<dyn ModelProvider>,
    pub model: String,
    pub system: Option<String>,
    pub tools: Vec<ToolSchema>,
    pub registry: Arc<ToolRegistry>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Outcome of one LLM call plus its tool batch.
pub struct TurnResult {
    pub assistant_message: Option<Message>,
    pub tool_results: Vec<Message>,
    pub has_tool_call: bool,
    pub transient_error: bool,
    pub report_back_result: Option<Value>,
}

/// One turn: one LLM call, and — if the model asked for any — one tool
/// batch. Never raises out to the task loop; failures before a final
/// `AssistantMessage` is seen become `transient_error: true`.
#[instrument(skip(ctx, input, tool_ctx, events, cancelled))]
pub async fn run_turn(
    ctx: &TurnContext,
    input: Vec<Message>,
    tool_ctx: &ToolContext,
    session_id: Uuid,
    events: &mpsc::Sender<CoreEvent>,
    cancelled: watch::Receiver<bool>,
) -> TurnResult {
    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnStart)).await;

    let params = LLMCallParameter {
        input,
        system: ctx.system.clone(),
        tools: ctx.tools.clone(),
        model: ctx.model.clone(),
        max_tokens: ctx.max_tokens,
        temperature: ctx.temperature,
    };

    let (abort_tx, abort_rx) = oneshot::channel();
    let mut watch_for_abort = cancelled.clone();
    tokio::spawn(async move {
        if watch_for_abort.changed().await.is_ok() && *watch_for_abort.borrow() {
            let _ = abort_tx.send(());
        }
    });

    let mut stream = match ctx.provider.stream(params, abort_rx).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to start provider stream");
            let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnEnd)).await;
            return TurnResult {
                assistant_message: None,
                tool_results: Vec::new(),
                has_tool_call: false,
                transient_error: true,
                report_back_result: None,
            };
        }
    };

    let mut assistant_message = None;
    let mut thinking_open = false;
    let mut text_open = false;

    while let Some(item) = stream.next().await {
        let item = match item {
            Ok(i) => i,
            Err(e) => {
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::Error(e.to_string()))).await;
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnEnd)).await;
                return TurnResult {
                    assistant_message: None,
                    tool_results: Vec::new(),
                    has_tool_call: false,
                    transient_error: true,
                    report_back_result: None,
                };
            }
        };

        match item {
            StreamItem::ResponseStart { .. } => {}
            StreamItem::ThinkingDelta { text } => {
                if !thinking_open {
                    thinking_open = true;
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::ThinkingStart)).await;
                }
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::ThinkingDelta(text))).await;
            }
            StreamItem::ThinkingSignature { .. } => {}
            StreamItem::AssistantTextDelta { text } => {
                if thinking_open {
                    thinking_open = false;
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::ThinkingEnd)).await;
                }
                if !text_open {
                    text_open = true;
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::AssistantTextStart)).await;
                }
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::AssistantTextDelta(text))).await;
            }
            StreamItem::ImageDelta { part } => {
                if let Part::ImageFile { file_path, .. } = part {
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::AssistantImageDelta { file_path })).await;
                }
            }
            StreamItem::ToolCallStart { call_id, tool_name } => {
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::ToolCallStart { call_id, tool_name })).await;
            }
            StreamItem::ToolCallArgsDelta { .. } => {}
            StreamItem::ToolCall { .. } => {}
            StreamItem::AssistantMessage { message } => {
                if text_open {
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::AssistantTextEnd)).await;
                }
                let _ = events
                    .send(CoreEvent::new(
                        session_id,
                        CoreEventKind::ResponseMetadata {
                            response_id: match &message {
                                Message::Assistant { response_id, .. } => response_id.clone(),
                                _ => None,
                            },
                            stop_reason: match &message {
                                Message::Assistant { stop_reason, .. } => *stop_reason,
                                _ => None,
                            },
                        },
                    ))
                    .await;
                if let Message::Assistant { usage: Some(usage), .. } = &message {
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::Usage(*usage))).await;
                }
                assistant_message = Some(message);
            }
            StreamItem::StreamError { fatal, message } => {
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::Error(message))).await;
                if fatal {
                    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnEnd)).await;
                    return TurnResult {
                        assistant_message,
                        tool_results: Vec::new(),
                        has_tool_call: false,
                        transient_error: true,
                        report_back_result: None,
                    };
                }
            }
        }
    }

    let Some(message) = assistant_message else {
        let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnEnd)).await;
        return TurnResult {
            assistant_message: None,
            tool_results: Vec::new(),
            has_tool_call: false,
            transient_error: true,
            report_back_result: None,
        };
    };

    let calls: Vec<ToolCall> = message
        .tool_calls()
        .into_iter()
        .map(|(call_id, tool_name, arguments_json)| parse_call(call_id, tool_name, arguments_json))
        .collect();

    if calls.is_empty() {
        let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnEnd)).await;
        return TurnResult {
            assistant_message: Some(message),
            tool_results: Vec::new(),
            has_tool_call: false,
            transient_error: false,
            report_back_result: None,
        };
    }

    for call in &calls {
        let _ = events
            .send(CoreEvent::new(
                session_id,
                CoreEventKind::ToolCall {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments_json: call.args.to_string(),
                },
            ))
            .await;
    }

    let call_args: std::collections::HashMap<String, Value> =
        calls.iter().map(|c| (c.id.clone(), c.args.clone())).collect();
    let tool_results = ctx.registry.execute_batch(calls, tool_ctx, cancelled.clone()).await;

    let mut report_back_result = None;
    for result in &tool_results {
        if let Message::ToolResult { call_id, tool_name, status, ui_extra, .. } = result {
            let mapped = match status {
                ac_model::ToolStatus::Success => ToolResultStatus::Success,
                ac_model::ToolStatus::Error | ac_model::ToolStatus::Aborted => ToolResultStatus::Error,
            };
            let _ = events
                .send(CoreEvent::new(
                    session_id,
                    CoreEventKind::ToolResult { call_id: call_id.clone(), status: mapped, ui_extra: ui_extra.clone() },
                ))
                .await;
            if *status == ac_model::ToolStatus::Aborted {
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::Interrupt)).await;
            }
            if tool_name == "report_back" && *status == ac_model::ToolStatus::Success {
                report_back_result = call_args.get(call_id).cloned();
            }
        }
    }

    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TurnEnd)).await;

    TurnResult {
        assistant_message: Some(message),
        tool_results,
        has_tool_call: true,
        transient_error: false,
        report_back_result,
    }
}
