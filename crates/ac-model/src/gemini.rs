// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::provider::{aborted_message, ModelProvider, ResponseStream, StreamItem};
use crate::sse::sse_data_lines;
use crate::types::{join_text_parts, LLMCallParameter, Message, Part, StopReason, Usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini-style provider: parts map to `Content.parts`, tool calls map to
/// `function_call`/`function_response`, thinking signature maps to
/// `thought_signature`.
pub struct GeminiProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(model: String, api_key: Option<String>, base_url: Option<String>, temperature: Option<f32>) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/{}:streamGenerateContent?alt=sse", self.base_url, self.model)
    }

    fn build_request_body(&self, params: &LLMCallParameter) -> Value {
        let contents: Vec<Value> = params.input.iter().filter_map(encode_message).collect();
        let tools: Vec<Value> = if params.tools.is_empty() {
            Vec::new()
        } else {
            vec![json!({
                "function_declarations": params.tools.iter().map(|t| json!({
                    "name": t.name, "description": t.description, "parameters": t.parameters,
                })).collect::<Vec<_>>(),
            })]
        };

        let mut body = json!({ "contents": contents });
        if let Some(sys) = &params.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": sys }] });
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        if let Some(t) = self.temperature {
            body["generationConfig"] = json!({ "temperature": t });
        }
        body
    }
}

fn encode_message(message: &Message) -> Option<Value> {
    match message {
        Message::User { parts, .. } => Some(json!({ "role": "user", "parts": [{ "text": join_text_parts(parts) }] })),
        Message::Assistant { parts, .. } => {
            let mut encoded = Vec::new();
            let text = join_text_parts(parts);
            if !text.is_empty() {
                encoded.push(json!({ "text": text }));
            }
            for p in parts {
                if let Part::ToolCall { tool_name, arguments_json, .. } = p {
                    encoded.push(json!({
                        "functionCall": { "name": tool_name, "args": serde_json::from_str::<Value>(arguments_json).unwrap_or(Value::Null) },
                    }));
                }
            }
            Some(json!({ "role": "model", "parts": encoded }))
        }
        Message::ToolResult { tool_name, output_text, .. } => Some(json!({
            "role": "user",
            "parts": [{ "functionResponse": { "name": tool_name, "response": { "result": output_text } } }],
        })),
        Message::System { .. } | Message::Developer { .. } => None,
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn stream(
        &self,
        params: LLMCallParameter,
        mut abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream> {
        let body = self.build_request_body(&params);
        let mut req = self.client.post(self.url()).header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("x-goog-api-key", key);
        }
        let resp = req.json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("gemini request failed ({status}): {text}");
        }

        let (tx, rx) = mpsc::channel::<anyhow::Result<StreamItem>>(64);
        let byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            use futures::StreamExt;
            let mut lines = Box::pin(sse_data_lines(byte_stream));
            let mut parts: Vec<Part> = Vec::new();
            let mut text = String::new();
            let mut usage = Usage::default();
            let mut sent_start = false;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut abort => {
                        if !text.is_empty() { parts.push(Part::Text { text: std::mem::take(&mut text) }); }
                        let msg = aborted_message(std::mem::take(&mut parts), Some(usage));
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
                        if let Some(u) = event["usageMetadata"].as_object() {
                            usage.input_tokens = u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(usage.input_tokens);
                            usage.output_tokens = u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(usage.output_tokens);
                        }
                        let Some(candidate) = event["candidates"].get(0) else { continue };
                        for part in candidate["content"]["parts"].as_array().unwrap_or(&Vec::new()) {
                            if let Some(t) = part["text"].as_str() {
                                text.push_str(t);
                                let _ = tx.send(Ok(StreamItem::AssistantTextDelta { text: t.to_string() })).await;
                            }
                            if let Some(fc) = part.get("functionCall") {
                                let tool_name = fc["name"].as_str().unwrap_or_default().to_string();
                                let call_id = format!("call_{}", parts.len());
                                let args = fc["args"].to_string();
                                let p = Part::ToolCall { call_id: call_id.clone(), tool_name: tool_name.clone(), arguments_json: args };
                                let _ = tx.send(Ok(StreamItem::ToolCallStart { call_id, tool_name })).await;
                                let _ = tx.send(Ok(StreamItem::ToolCall { part: p.clone() })).await;
                                parts.push(p);
                            }
                            if let Some(sig) = part["thoughtSignature"].as_str() {
                                parts.push(Part::ThinkingSignature { signature: sig.to_string(), format: None, id: None, model_id: None });
                                let _ = tx.send(Ok(StreamItem::ThinkingSignature { signature: sig.to_string(), format: None })).await;
                            }
                        }
                        if candidate["finishReason"].as_str().is_some() {
                            if !text.is_empty() {
                                parts.insert(0, Part::Text { text: std::mem::take(&mut text) });
                            }
                            let stop_reason = match candidate["finishReason"].as_str() {
                                Some("STOP") => StopReason::Stop,
                                Some("MAX_TOKENS") => StopReason::Length,
                                _ if parts.iter().any(|p| matches!(p, Part::ToolCall { .. })) => StopReason::ToolUse,
                                _ => StopReason::Stop,
                            };
                            let message = Message::Assistant {
                                parts: std::mem::take(&mut parts),
                                usage: Some(usage),
                                stop_reason: Some(stop_reason),
                                response_id: None,
                                id: None,
                                created_at: chrono::Utc::now(),
                            };
                            let _ = tx.send(Ok(StreamItem::AssistantMessage { message })).await;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}
