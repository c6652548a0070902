// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};
use crate::truncate::truncate_for_model;

const MAX_RESULTS: usize = 500;

/// Finds files under a root directory whose relative path matches a glob
/// pattern, newest-modified first.
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "Glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern under a root directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "root": { "type": "string" }
            },
            "required": ["pattern"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Message {
        let Some(pattern) = call.args.get("pattern").and_then(Value::as_str) else {
            return ToolOutput::err(call, "missing 'pattern'");
        };
        let root = call.args.get("root").and_then(Value::as_str).unwrap_or(".");
        let re = match glob_to_regex(pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(call, format!("invalid pattern: {e}")),
        };

        let mut matches: Vec<(std::time::SystemTime, String)> = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_string_lossy().into_owned();
            if re.is_match(&rel) {
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(std::time::UNIX_EPOCH);
                matches.push((modified, entry.path().display().to_string()));
            }
        }
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        let total = matches.len();
        matches.truncate(MAX_RESULTS);

        let mut text = matches.into_iter().map(|(_, p)| p).collect::<Vec<_>>().join("\n");
        if total > MAX_RESULTS {
            text.push_str(&format!("\n... and {} more (showing newest {MAX_RESULTS})", total - MAX_RESULTS));
        }
        if text.is_empty() {
            text = "(no matches)".to_string();
        }
        let text = truncate_for_model(ctx, self.name(), &call.id, self.output_category(), &text);
        ToolOutput::ok(call, text)
    }
}

/// Translates a small glob subset (`*`, `**`, `?`) into an anchored regex.
/// Shared with [`super::grep_tool`]'s `glob` filename filter.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' | '(' | ')' | '+' | '|' | '^' | '$' | '[' | ']' | '{' | '}' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    Regex::new(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        let tool = GlobTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall {
            id: "c1".into(),
            name: "Glob".into(),
            args: json!({"pattern": "*.rs", "root": dir.path().to_str().unwrap()}),
        };
        let result = tool.execute(&call, &ctx).await;
        match result {
            Message::ToolResult { output_text, .. } => {
                assert!(output_text.contains("a.rs"));
                assert!(!output_text.contains("b.txt"));
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[tokio::test]
    async fn no_matches_says_so_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let tool = GlobTool;
        let ctx = ToolContext::for_tests();
        let call = ToolCall {
            id: "c1".into(),
            name: "Glob".into(),
            args: json!({"pattern": "*.nope", "root": dir.path().to_str().unwrap()}),
        };
        let result = tool.execute(&call, &ctx).await;
        match result {
            Message::ToolResult { status, output_text, .. } => {
                assert_eq!(status, ac_model::ToolStatus::Success);
                assert!(output_text.contains("no matches"));
            }
            _ => panic!("expected ToolResult"),
        }
    }

    #[test]
    fn double_star_matches_across_directories() {
        let re = glob_to_regex("**/*.rs").unwrap();
        assert!(re.is_match("a/b/c.rs"));
        assert!(!re.is_match("a/b/c.txt"));
    }
}
