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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/responses";

/// Responses-style provider: messages+parts expand to a flat `input` list of
/// typed items (`message`, `function_call`, `function_call_output`).
pub struct OpenAiResponsesProvider {
    model: String,
    api_key: Option<String>,
    url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiResponsesProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model,
            api_key,
            url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn build_request_body(&self, params: &LLMCallParameter) -> Value {
        let mut input = Vec::new();
        for m in &params.input {
            match m {
                Message::User { parts, .. } => input.push(json!({
                    "type": "message", "role": "user", "content": join_text_parts(parts),
                })),
                Message::Assistant { parts, .. } => {
                    let text = join_text_parts(parts);
                    if !text.is_empty() {
                        input.push(json!({ "type": "message", "role": "assistant", "content": text }));
                    }
                    for p in parts {
                        if let Part::ToolCall { call_id, tool_name, arguments_json } = p {
                            input.push(json!({
                                "type": "function_call",
                                "call_id": call_id,
                                "name": tool_name,
                                "arguments": arguments_json,
                            }));
                        }
                    }
                }
                Message::ToolResult { call_id, output_text, .. } => input.push(json!({
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": output_text,
                })),
                Message::System { .. } | Message::Developer { .. } => {}
            }
        }

        let tools: Vec<Value> = params
            .tools
            .iter()
            .map(|t| json!({ "type": "function", "name": t.name, "description": t.description, "parameters": t.parameters }))
            .collect();

        let mut body = json!({ "model": self.model, "input": input, "stream": true });
        if let Some(sys) = &params.system {
            body["instructions"] = json!(sys);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        if let Some(mt) = self.max_tokens {
            body["max_output_tokens"] = json!(mt);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAiResponsesProvider {
    fn id(&self) -> &str {
        "openai-responses"
    }

    async fn stream(
        &self,
        params: LLMCallParameter,
        mut abort: oneshot::Receiver<()>,
    ) -> anyhow::Result<ResponseStream> {
        let body = self.build_request_body(&params);
        let mut req = self.client.post(&self.url).header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("openai responses request failed ({status}): {text}");
        }

        let (tx, rx) = mpsc::channel::<anyhow::Result<StreamItem>>(64);
        let byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            use futures::StreamExt;
            let mut lines = Box::pin(sse_data_lines(byte_stream));
            let mut text = String::new();
            let mut parts: Vec<Part> = Vec::new();
            let mut usage = Usage::default();

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
                        let event: Value = match serde_json::from_str(&line) {
                            Ok(v) => v,
                            Err(e) => { warn!(error = %e, "skipping malformed event"); continue; }
                        };
                        match event["type"].as_str() {
                            Some("response.created") => {
                                let id = event["response"]["id"].as_str().unwrap_or_default().to_string();
                                let _ = tx.send(Ok(StreamItem::ResponseStart { response_id: id })).await;
                            }
                            Some("response.output_text.delta") => {
                                let delta = event["delta"].as_str().unwrap_or_default().to_string();
                                text.push_str(&delta);
                                let _ = tx.send(Ok(StreamItem::AssistantTextDelta { text: delta })).await;
                            }
                            Some("response.function_call_arguments.done") => {
                                let call_id = event["item_id"].as_str().unwrap_or_default().to_string();
                                let name = event["name"].as_str().unwrap_or_default().to_string();
                                let args = event["arguments"].as_str().unwrap_or("{}").to_string();
                                let part = Part::ToolCall { call_id, tool_name: name, arguments_json: args };
                                let _ = tx.send(Ok(StreamItem::ToolCall { part: part.clone() })).await;
                                parts.push(part);
                            }
                            Some("response.completed") => {
                                if let Some(u) = event["response"]["usage"].as_object() {
                                    usage.input_tokens = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                                    usage.output_tokens = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
                                }
                                if !text.is_empty() {
                                    parts.insert(0, Part::Text { text: std::mem::take(&mut text) });
                                }
                                let message = Message::Assistant {
                                    parts: std::mem::take(&mut parts),
                                    usage: Some(usage),
                                    stop_reason: Some(StopReason::Stop),
                                    response_id: None,
                                    id: None,
                                    created_at: chrono::Utc::now(),
                                };
                                let _ = tx.send(Ok(StreamItem::AssistantMessage { message })).await;
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_body_flattens_tool_call_pair() {
        let p = OpenAiResponsesProvider::new("gpt-5".into(), None, None, None, None);
        let params = LLMCallParameter {
            input: vec![
                Message::Assistant {
                    parts: vec![Part::ToolCall { call_id: "c1".into(), tool_name: "Bash".into(), arguments_json: "{}".into() }],
                    usage: None, stop_reason: None, response_id: None, id: None, created_at: chrono::Utc::now(),
                },
                Message::ToolResult {
                    call_id: "c1".into(), tool_name: "Bash".into(),
                    status: crate::types::ToolStatus::Success, output_text: "ok".into(),
                    parts: vec![], ui_extra: None, id: None, created_at: chrono::Utc::now(),
                },
            ],
            system: None, tools: vec![], model: "gpt-5".into(), max_tokens: None, temperature: None,
        };
        let body = p.build_request_body(&params);
        let input = body["input"].as_array().unwrap();
        assert_eq!(input[0]["type"], "function_call");
        assert_eq!(input[1]["type"], "function_call_output");
    }
}
