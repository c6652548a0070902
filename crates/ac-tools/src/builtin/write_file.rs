// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Writes a full file to disk, creating parent directories as needed, and
/// records the new content's hash so a later edit sees this write as the
/// baseline.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "WriteFile"
    }

    fn description(&self) -> &str {
        "Write content to a file, overwriting it if it exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(path_str) = call.args.get("path").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'path'");
        };
        let Some(content) = call.args.get("content").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'content'");
        };
        let path = std::path::Path::new(path_str);

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutput::err(call, format!("could not create {}: {e}", parent.display()));
            }
        }
        if let Err(e) = std::fs::write(path, content) {
            return ToolOutput::err(call, format!("could not write {path_str}: {e}"));
        }
        ctx.file_tracker.record(path, content);
        ToolOutput::ok(call, format!("wrote {} bytes to {path_str}", content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_and_records_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let tool = WriteFileTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall {
            id: "c1".into(),
            name: "WriteFile".into(),
            args: json!({"path": path.to_str().unwrap(), "content": "hello"}),
        };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Success, .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert!(ctx.file_tracker.check_unmodified(&path, "hello").is_ok());
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");
        let tool = WriteFileTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall {
            id: "c1".into(),
            name: "WriteFile".into(),
            args: json!({"path": path.to_str().unwrap(), "content": "x"}),
        };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Success, .. }));
        assert!(path.exists());
    }
}
