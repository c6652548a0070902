// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Replaces one occurrence of `old_string` with `new_string` in a file,
/// refusing to proceed if the file was modified since the session last read
/// or wrote it (SPEC_FULL.md §8 scenario 5).
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "EditFile"
    }

    fn description(&self) -> &str {
        "Replace an exact string occurrence in a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" },
                "replace_all": { "type": "boolean" }
            },
            "required": ["path", "old_string", "new_string"]
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
        let Some(old_string) = call.args.get("old_string").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'old_string'");
        };
        let Some(new_string) = call.args.get("new_string").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'new_string'");
        };
        let replace_all = call.args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);
        let path = std::path::Path::new(path_str);

        let on_disk = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(call, format!("could not read {path_str}: {e}")),
        };

        if let Err(e) = ctx.file_tracker.check_unmodified(path, &on_disk) {
            return ToolOutput::err(call, e.to_string());
        }

        let occurrences = on_disk.matches(old_string).count();
        if occurrences == 0 {
            return ToolOutput::err(call, format!("'{old_string}' not found in {path_str}"));
        }
        if occurrences > 1 && !replace_all {
            return ToolOutput::err(
                call,
                format!("'{old_string}' occurs {occurrences} times in {path_str}; pass replace_all or narrow the match"),
            );
        }

        let updated = if replace_all {
            on_disk.replace(old_string, new_string)
        } else {
            on_disk.replacen(old_string, new_string, 1)
        };

        if let Err(e) = std::fs::write(path, &updated) {
            return ToolOutput::err(call, format!("could not write {path_str}: {e}"));
        }
        ctx.file_tracker.record(path, &updated);
        ToolOutput::ok(call, format!("replaced {} occurrence(s) in {path_str}", if replace_all { occurrences } else { 1 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{content}").unwrap();
        f
    }

    #[tokio::test]
    async fn replaces_single_occurrence() {
        let f = write_temp("hello world");
        let tool = EditFileTool;
        let ctx = ToolContext::for_tests();
        ctx.file_tracker.record(f.path(), "hello world");
        let call = ToolCall {
            id: "c1".into(),
            name: "EditFile".into(),
            args: json!({"path": f.path().to_str().unwrap(), "old_string": "world", "new_string": "rust"}),
        };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Success, .. }));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn rejects_edit_of_externally_modified_file() {
        let f = write_temp("hello world");
        let tool = EditFileTool;
        let ctx = ToolContext::for_tests();
        ctx.file_tracker.record(f.path(), "stale content that no longer matches");
        let call = ToolCall {
            id: "c1".into(),
            name: "EditFile".into(),
            args: json!({"path": f.path().to_str().unwrap(), "old_string": "world", "new_string": "rust"}),
        };
        let result = tool.execute(&call, &ctx).await;
        match result {
            Message::ToolResult { status, output_text, .. } => {
                assert_eq!(status, ac_model::ToolStatus::Error);
                assert!(output_text.contains("modified"));
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[tokio::test]
    async fn ambiguous_match_requires_replace_all() {
        let f = write_temp("x x x");
        let tool = EditFileTool;
        let ctx = ToolContext::for_tests();
        ctx.file_tracker.record(f.path(), "x x x");
        let call = ToolCall {
            id: "c1".into(),
            name: "EditFile".into(),
            args: json!({"path": f.path().to_str().unwrap(), "old_string": "x", "new_string": "y"}),
        };
        let result = tool.execute(&call, &ctx).await;
        assert!(matches!(result, Message::ToolResult { status: ac_model::ToolStatus::Error, .. }));
    }
}
