// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::truncate::truncate_for_model;

/// Fetches a URL and converts HTML responses to plain text so the model
/// isn't fed raw markup.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "WebFetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its text content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" }
            },
            "required": ["url"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(url) = call.args.get("url").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'url'");
        };

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(call, format!("request failed: {e}")),
        };
        if !response.status().is_success() {
            return ToolOutput::err(call, format!("{url} returned status {}", response.status()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(call, format!("failed to read response body: {e}")),
        };

        let text = if content_type.contains("html") {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        let text = truncate_for_model(ctx, self.name(), &call.id, self.output_category(), &text);
        ToolOutput::ok(call, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_with_tags_converts_to_text() {
        let html = "<html><body><h1>Title</h1><p>hello</p></body></html>";
        let text = html2text::from_read(html.as_bytes(), 80);
        assert!(text.contains("Title"));
        assert!(text.contains("hello"));
        assert!(!text.contains("<p>"));
    }

    #[tokio::test]
    async fn missing_url_is_an_error_not_a_panic() {
        let tool = WebFetchTool::default();
        let ctx = ToolContext::for_tests();
        let call = ToolCall { id: "c1".into(), name: "WebFetch".into(), args: json!({}) };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Error, .. }));
    }
}
