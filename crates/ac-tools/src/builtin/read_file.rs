// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::truncate::truncate_for_model;

/// Reads a file, optionally windowed by line range, and records its content
/// hash in the shared [`crate::context::FileTracker`] so a later edit can
/// detect if the file changed underneath the session.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "ReadFile"
    }

    fn description(&self) -> &str {
        "Read a file from disk, optionally restricted to a line range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "start_line": { "type": "integer" },
                "end_line": { "type": "integer" }
            },
            "required": ["path"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(path_str) = call.args.get("path").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'path'");
        };
        let path = std::path::Path::new(path_str);

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(call, format!("could not read {path_str}: {e}")),
        };
        ctx.file_tracker.record(path, &content);

        let start = call.args.get("start_line").and_then(Value::as_u64).map(|n| n as usize);
        let end = call.args.get("end_line").and_then(Value::as_u64).map(|n| n as usize);

        let windowed = match (start, end) {
            (None, None) => content.clone(),
            (start, end) => {
                let lines: Vec<&str> = content.lines().collect();
                let from = start.unwrap_or(1).max(1) - 1;
                let to = end.unwrap_or(lines.len()).min(lines.len());
                if from >= to {
                    String::new()
                } else {
                    lines[from..to]
                        .iter()
                        .enumerate()
                        .map(|(i, l)| format!("{:>6}\t{l}", from + i + 1))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
        };

        let text = truncate_for_model(ctx, self.name(), &call.id, self.output_category(), &windowed);
        ToolOutput::ok(call, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_whole_file_and_records_hash() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "line one\nline two").unwrap();
        let tool = ReadFileTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall {
            id: "c1".into(),
            name: "ReadFile".into(),
            args: json!({"path": f.path().to_str().unwrap()}),
        };
        let result = tool.execute(&call, &ctx).await;
        match result {
            Message::ToolResult { output_text, .. } => assert!(output_text.contains("line one")),
            _ => panic!("expected ToolResult"),
        }
        assert!(ctx.file_tracker.check_unmodified(f.path(), "line one\nline two\n").is_ok());
    }

    #[tokio::test]
    async fn windows_by_line_range() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "a\nb\nc\nd").unwrap();
        let tool = ReadFileTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall {
            id: "c1".into(),
            name: "ReadFile".into(),
            args: json!({"path": f.path().to_str().unwrap(), "start_line": 2, "end_line": 3}),
        };
        let result = tool.execute(&call, &ctx).await;
        match result {
            Message::ToolResult { output_text, .. } => {
                assert!(output_text.contains("b"));
                assert!(output_text.contains("c"));
                assert!(!output_text.contains("\ta") && !output_text.contains("\td"));
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_error_not_a_panic() {
        let tool = ReadFileTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall { id: "c1".into(), name: "ReadFile".into(), args: json!({"path": "/nonexistent/x"}) };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Error, .. }));
    }
}
