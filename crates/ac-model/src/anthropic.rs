// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::provider::{aborted_message, ModelProvider, ResponseStream, StreamItem};
use crate::sse::sse_data_lines;
use crate::types::{LLMCallParameter, Message, Part, StopReason, ToolStatus, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Anthropic allows at most 4 `cache_control` breakpoints per request.
const MAX_CACHE_BREAKPOINTS: usize = 4;

/// Messages-style provider (Anthropic's wire format).
pub struct AnthropicProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    cache_system_prompt: bool,
    cache_tools: bool,
    cache_conversation: bool,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self::with_cache(model, api_key, base_url, max_tokens, temperature, true, true, false)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_cache(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        cache_system_prompt: bool,
        cache_tools: bool,
        cache_conversation: bool,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature,
            cache_system_prompt,
            cache_tools,
            cache_conversation,
            client: reqwest::Client::new(),
        }
    }

    fn build_request_body(&self, params: &LLMCallParameter) -> Value {
        let mut breakpoints_used = 0usize;
        let mut cache_control = || -> Option<Value> {
            if breakpoints_used < MAX_CACHE_BREAKPOINTS {
                breakpoints_used += 1;
                Some(json!({ "type": "ephemeral" }))
            } else {
                None
            }
        };

        let system = params.system.as_ref().map(|text| {
            let mut block = json!({ "type": "text", "text": text });
            if self.cache_system_prompt {
                if let Some(cc) = cache_control() {
                    block["cache_control"] = cc;
                }
            }
            json!([block])
        });

        let tools: Vec<Value> = params
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut v = json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                });
                if self.cache_tools && i == params.tools.len().saturating_sub(1) {
                    if let Some(cc) = cache_control() {
                        v["cache_control"] = cc;
                    }
                }
                v
            })
            .collect();

        let messages: Vec<Value> = params
            .input
            .iter()
            .filter_map(|m| self.encode_message(m))
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = system;
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }

    fn encode_message(&self, message: &Message) -> Option<Value> {
        match message {
            Message::User { parts, .. } => Some(json!({
                "role": "user",
                "content": parts.iter().map(encode_part).collect::<Vec<_>>(),
            })),
            Message::Assistant { parts, .. } => Some(json!({
                "role": "assistant",
                "content": parts.iter().map(encode_part).collect::<Vec<_>>(),
            })),
            Message::ToolResult { call_id, status, output_text, .. } => Some(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": output_text,
                    "is_error": matches!(status, ToolStatus::Error),
                }],
            })),
            // System/Developer are folded elsewhere; never sent as own turn.
            Message::System { .. } | Message::Developer { .. } => None,
        }
    }
}

fn encode_part(part: &Part) -> Value {
    match part {
        Part::Text { text } => json!({ "type": "text", "text": text }),
        Part::ImageUrl { url, .. } => json!({
            "type": "image",
            "source": { "type": "url", "url": url },
        }),
        Part::ImageFile { file_path, mime_type, .. } => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime_type.clone().unwrap_or_default(), "data": file_path },
        }),
        Part::ThinkingText { text, .. } => json!({ "type": "thinking", "thinking": text }),
        Part::ThinkingSignature { signature, .. } => json!({ "type": "thinking", "signature": signature }),
        Part::ToolCall { call_id, tool_name, arguments_json } => json!({
            "type": "tool_use",
            "id": call_id,
            "name": tool_name,
            "input": serde_json::from_str::<Value>(arguments_json).unwrap_or(Value::Null),
        }),
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    async fn stream(
        &self,
        params: LLMCallParameter,
        mut abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream> {
        let body = self.build_request_body(&params);
        let mut req = self
            .client
            .post(&self.base_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        let resp = req.json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("anthropic request failed ({status}): {text}");
        }

        let (tx, rx) = mpsc::channel::<anyhow::Result<StreamItem>>(64);
        let byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            use futures::StreamExt;
            let mut lines = Box::pin(sse_data_lines(byte_stream));
            let mut parts: Vec<Part> = Vec::new();
            let mut current_text = String::new();
            let mut current_thinking = String::new();
            let mut current_tool: Option<(String, String, String)> = None;
            let mut usage = Usage::default();
            let mut stop_reason: Option<StopReason> = None;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut abort => {
                        let msg = aborted_message(finish_open_blocks(&mut parts, &mut current_text, &mut current_thinking, &mut current_tool), Some(usage));
                        let _ = tx.send(Ok(StreamItem::AssistantMessage { message: msg })).await;
                        return;
                    }
                    item = lines.next() => {
                        let Some(item) = item else { break };
                        let line = match item {
                            Ok(l) => l,
                            Err(e) => {
                                let _ = tx.send(Err(anyhow::anyhow!("stream read error: {e}"))).await;
                                return;
                            }
                        };
                        let event: Value = match serde_json::from_str(&line) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!(error = %e, "skipping malformed SSE frame");
                                continue;
                            }
                        };
                        match event.get("type").and_then(Value::as_str) {
                            Some("message_start") => {
                                let id = event["message"]["id"].as_str().unwrap_or_default().to_string();
                                let _ = tx.send(Ok(StreamItem::ResponseStart { response_id: id })).await;
                            }
                            Some("content_block_start") => {
                                let block = &event["content_block"];
                                match block["type"].as_str() {
                                    Some("tool_use") => {
                                        let call_id = block["id"].as_str().unwrap_or_default().to_string();
                                        let tool_name = block["name"].as_str().unwrap_or_default().to_string();
                                        current_tool = Some((call_id.clone(), tool_name.clone(), String::new()));
                                        let _ = tx.send(Ok(StreamItem::ToolCallStart { call_id, tool_name })).await;
                                    }
                                    Some("thinking") => { current_thinking.clear(); }
                                    Some("text") => { current_text.clear(); }
                                    _ => {}
                                }
                            }
                            Some("content_block_delta") => {
                                let delta = &event["delta"];
                                match delta["type"].as_str() {
                                    Some("text_delta") => {
                                        let text = delta["text"].as_str().unwrap_or_default().to_string();
                                        current_text.push_str(&text);
                                        let _ = tx.send(Ok(StreamItem::AssistantTextDelta { text })).await;
                                    }
                                    Some("thinking_delta") => {
                                        let text = delta["thinking"].as_str().unwrap_or_default().to_string();
                                        current_thinking.push_str(&text);
                                        let _ = tx.send(Ok(StreamItem::ThinkingDelta { text })).await;
                                    }
                                    Some("signature_delta") => {
                                        let sig = delta["signature"].as_str().unwrap_or_default().to_string();
                                        if !current_thinking.is_empty() {
                                            parts.push(Part::ThinkingText { text: std::mem::take(&mut current_thinking), id: None, model_id: None });
                                        }
                                        parts.push(Part::ThinkingSignature { signature: sig.clone(), format: None, id: None, model_id: None });
                                        let _ = tx.send(Ok(StreamItem::ThinkingSignature { signature: sig, format: None })).await;
                                    }
                                    Some("input_json_delta") => {
                                        let frag = delta["partial_json"].as_str().unwrap_or_default().to_string();
                                        if let Some((call_id, _, args)) = current_tool.as_mut() {
                                            args.push_str(&frag);
                                            let _ = tx.send(Ok(StreamItem::ToolCallArgsDelta { call_id: call_id.clone(), json_fragment: frag })).await;
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            Some("content_block_stop") => {
                                if !current_text.is_empty() {
                                    parts.push(Part::Text { text: std::mem::take(&mut current_text) });
                                } else if let Some((call_id, tool_name, args)) = current_tool.take() {
                                    let part = Part::ToolCall { call_id, tool_name, arguments_json: if args.is_empty() { "{}".into() } else { args } };
                                    let _ = tx.send(Ok(StreamItem::ToolCall { part: part.clone() })).await;
                                    parts.push(part);
                                }
                            }
                            Some("message_delta") => {
                                if let Some(u) = event["usage"].as_object() {
                                    usage.output_tokens = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(usage.output_tokens);
                                }
                                stop_reason = event["delta"]["stop_reason"].as_str().map(map_stop_reason);
                            }
                            Some("message_stop") => {
                                let message = Message::Assistant {
                                    parts: parts.clone(),
                                    usage: Some(usage),
                                    stop_reason: Some(stop_reason.unwrap_or(StopReason::Stop)),
                                    response_id: None,
                                    id: None,
                                    created_at: chrono::Utc::now(),
                                };
                                let _ = tx.send(Ok(StreamItem::AssistantMessage { message })).await;
                            }
                            Some("error") => {
                                let msg = event["error"]["message"].as_str().unwrap_or("unknown error").to_string();
                                let _ = tx.send(Ok(StreamItem::StreamError { fatal: true, message: msg })).await;
                                return;
                            }
                            other => debug!(?other, "ignoring unrecognised anthropic SSE event"),
                        }
                    }
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

fn finish_open_blocks(
    parts: &mut Vec<Part>,
    current_text: &mut String,
    current_thinking: &mut String,
    current_tool: &mut Option<(String, String, String)>,
) -> Vec<Part> {
    if !current_text.is_empty() {
        parts.push(Part::Text { text: std::mem::take(current_text) });
    }
    if !current_thinking.is_empty() {
        parts.push(Part::ThinkingText { text: std::mem::take(current_thinking), id: None, model_id: None });
    }
    if let Some((call_id, tool_name, args)) = current_tool.take() {
        parts.push(Part::ToolCall { call_id, tool_name, arguments_json: if args.is_empty() { "{}".into() } else { args } });
    }
    std::mem::take(parts)
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::Stop,
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("claude-opus-4-5".into(), None, None, None, None)
    }

    #[test]
    fn cache_control_is_capped_at_four_breakpoints() {
        let p = AnthropicProvider::with_cache(
            "claude-opus-4-5".into(), None, None, None, None, true, true, true,
        );
        let params = LLMCallParameter {
            input: vec![],
            system: Some("sys".into()),
            tools: vec![crate::types::ToolSchema { name: "t".into(), description: "d".into(), parameters: json!({}) }],
            model: "claude-opus-4-5".into(),
            max_tokens: None,
            temperature: None,
        };
        let body = p.build_request_body(&params);
        // At most: 1 system + 1 tools block can carry cache_control here.
        let mut count = 0;
        if body["system"][0].get("cache_control").is_some() { count += 1; }
        if body["tools"][0].get("cache_control").is_some() { count += 1; }
        assert!(count <= MAX_CACHE_BREAKPOINTS);
    }

    #[test]
    fn tool_result_encodes_as_user_turn() {
        let p = provider();
        let msg = Message::ToolResult {
            call_id: "c1".into(),
            tool_name: "Bash".into(),
            status: ToolStatus::Success,
            output_text: "ok".into(),
            parts: vec![],
            ui_extra: None,
            id: None,
            created_at: chrono::Utc::now(),
        };
        let encoded = p.encode_message(&msg).unwrap();
        assert_eq!(encoded["role"], "user");
        assert_eq!(encoded["content"][0]["type"], "tool_result");
    }

    #[test]
    fn developer_and_system_messages_are_not_sent_as_turns() {
        let p = provider();
        assert!(p.encode_message(&Message::developer_text("x")).is_none());
    }

    #[test]
    fn map_stop_reason_tool_use() {
        assert_eq!(map_stop_reason("tool_use"), StopReason::ToolUse);
    }
}
