// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::provider::{aborted_message, ModelProvider, ResponseStream, StreamItem};
use crate::sse::sse_data_lines;
use crate::types::{join_text_parts, LLMCallParameter, Message, Part, StopReason, ToolStatus, Usage};

/// Chat-completions-style provider: OpenAI itself and the long tail of
/// OpenAI-compatible gateways (Groq, DeepSeek, OpenRouter, local servers).
pub struct OpenAiCompatProvider {
    driver_id: String,
    model: String,
    api_key: Option<String>,
    chat_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    extra_headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver_id: impl Into<String>,
        model: String,
        api_key: Option<String>,
        base_url: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            driver_id: driver_id.into(),
            model,
            api_key,
            chat_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            max_tokens,
            temperature,
            extra_headers,
            client: reqwest::Client::new(),
        }
    }

    fn build_request_body(&self, params: &LLMCallParameter) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &params.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for m in &params.input {
            if let Some(encoded) = encode_message(m) {
                messages.push(encoded);
            }
        }
        let tools: Vec<Value> = params
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": { "name": t.name, "description": t.description, "parameters": t.parameters },
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        if let Some(mt) = self.max_tokens {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

fn encode_message(message: &Message) -> Option<Value> {
    match message {
        Message::User { parts, .. } => Some(json!({ "role": "user", "content": join_text_parts(parts) })),
        Message::Assistant { parts, .. } => {
            let text = join_text_parts(parts);
            let tool_calls: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    Part::ToolCall { call_id, tool_name, arguments_json } => Some(json!({
                        "id": call_id,
                        "type": "function",
                        "function": { "name": tool_name, "arguments": arguments_json },
                    })),
                    _ => None,
                })
                .collect();
            let mut v = json!({ "role": "assistant", "content": text });
            if !tool_calls.is_empty() {
                v["tool_calls"] = Value::Array(tool_calls);
            }
            Some(v)
        }
        Message::ToolResult { call_id, output_text, .. } => Some(json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": output_text,
        })),
        Message::System { .. } | Message::Developer { .. } => None,
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.driver_id
    }

    async fn stream(
        &self,
        params: LLMCallParameter,
        mut abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream> {
        let body = self.build_request_body(&params);
        let mut req = self.client.post(&self.chat_url).header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        for (k, v) in &self.extra_headers {
            req = req.header(k, v);
        }
        let resp = req.json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} request failed ({status}): {text}", self.driver_id);
        }

        let (tx, rx) = mpsc::channel::<anyhow::Result<StreamItem>>(64);
        let byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            use futures::StreamExt;
            let mut lines = Box::pin(sse_data_lines(byte_stream));
            let mut text = String::new();
            // index -> (call_id, tool_name, partial args)
            let mut tool_calls: Vec<(String, String, String)> = Vec::new();
            let mut usage = Usage::default();
            let mut stop_reason: Option<StopReason> = None;
            let mut sent_start = false;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut abort => {
                        let mut parts = Vec::new();
                        if !text.is_empty() { parts.push(Part::Text { text: std::mem::take(&mut text) }); }
                        for (call_id, tool_name, args) in tool_calls.drain(..) {
                            parts.push(Part::ToolCall { call_id, tool_name, arguments_json: if args.is_empty() { "{}".into() } else { args } });
                        }
                        let msg = aborted_message(parts, Some(usage));
                        let _ = tx.send(Ok(StreamItem::AssistantMessage { message: msg })).await;
                        return;
                    }
                    item = lines.next() => {
                        let Some(item) = item else { break };
                        let line = match item {
                            Ok(l) => l,
                            Err(e) => { let _ = tx.send(Err(anyhow::anyhow!("stream read error: {e}"))).await; return; }
                        };
                        if !sent_start {
                            sent_start = true;
                            let _ = tx.send(Ok(StreamItem::ResponseStart { response_id: String::new() })).await;
                        }
                        let event: Value = match serde_json::from_str(&line) {
                            Ok(v) => v,
                            Err(e) => { warn!(error = %e, "skipping malformed chunk"); continue; }
                        };
                        if let Some(u) = event.get("usage").and_then(Value::as_object) {
                            usage.input_tokens = u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(usage.input_tokens);
                            usage.output_tokens = u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(usage.output_tokens);
                        }
                        let Some(choice) = event["choices"].get(0) else { continue };
                        let delta = &choice["delta"];
                        if let Some(content) = delta["content"].as_str() {
                            text.push_str(content);
                            let _ = tx.send(Ok(StreamItem::AssistantTextDelta { text: content.to_string() })).await;
                        }
                        if let Some(calls) = delta["tool_calls"].as_array() {
                            for call in calls {
                                let idx = call["index"].as_u64().unwrap_or(0) as usize;
                                while tool_calls.len() <= idx {
                                    tool_calls.push((String::new(), String::new(), String::new()));
                                }
                                if let Some(id) = call["id"].as_str() {
                                    tool_calls[idx].0 = id.to_string();
                                }
                                if let Some(name) = call["function"]["name"].as_str() {
                                    tool_calls[idx].1 = name.to_string();
                                    let _ = tx.send(Ok(StreamItem::ToolCallStart {
                                        call_id: tool_calls[idx].0.clone(),
                                        tool_name: name.to_string(),
                                    })).await;
                                }
                                if let Some(frag) = call["function"]["arguments"].as_str() {
                                    tool_calls[idx].2.push_str(frag);
                                    let _ = tx.send(Ok(StreamItem::ToolCallArgsDelta {
                                        call_id: tool_calls[idx].0.clone(),
                                        json_fragment: frag.to_string(),
                                    })).await;
                                }
                            }
                        }
                        if let Some(reason) = choice["finish_reason"].as_str() {
                            stop_reason = Some(map_finish_reason(reason));
                        }
                    }
                }
            }

            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(Part::Text { text });
            }
            for (call_id, tool_name, args) in tool_calls {
                if call_id.is_empty() {
                    continue;
                }
                let part = Part::ToolCall { call_id, tool_name, arguments_json: if args.is_empty() { "{}".into() } else { args } };
                let _ = tx.send(Ok(StreamItem::ToolCall { part: part.clone() })).await;
                parts.push(part);
            }
            let message = Message::Assistant {
                parts,
                usage: Some(usage),
                stop_reason: Some(stop_reason.unwrap_or(StopReason::Stop)),
                response_id: None,
                id: None,
                created_at: chrono::Utc::now(),
            };
            let _ = tx.send(Ok(StreamItem::AssistantMessage { message })).await;
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::Stop,
        "length" => StopReason::Length,
        "tool_calls" => StopReason::ToolUse,
        _ => StopReason::Error,
    }
}
