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

const MAX_MATCHES: usize = 300;

/// Searches file contents under a root directory for a regular expression,
/// returning `path:line:text` per match.
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "Grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a regular expression."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "root": { "type": "string" },
                "glob": { "type": "string", "description": "Only search files whose name matches this glob" },
                "case_insensitive": { "type": "boolean" }
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
        let case_insensitive = call.args.get("case_insensitive").and_then(Value::as_bool).unwrap_or(false);
        let name_glob = call.args.get("glob").and_then(Value::as_str);

        let re = match Regex::new(&if case_insensitive { format!("(?i){pattern}") } else { pattern.to_string() }) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(call, format!("invalid pattern: {e}")),
        };
        let name_re = match name_glob.map(super::glob_tool::glob_to_regex) {
            Some(Ok(r)) => Some(r),
            Some(Err(e)) => return ToolOutput::err(call, format!("invalid glob: {e}")),
            None => None,
        };

        let mut lines_out: Vec<String> = Vec::new();
        let mut total = 0usize;
        'walk: for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name_re) = &name_re {
                let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_string_lossy().into_owned();
                if !name_re.is_match(&rel) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
            for (lineno, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    total += 1;
                    if lines_out.len() < MAX_MATCHES {
                        lines_out.push(format!("{}:{}:{}", entry.path().display(), lineno + 1, line));
                    } else {
                        break 'walk;
                    }
                }
            }
        }

        let mut text = lines_out.join("\n");
        if total > MAX_MATCHES {
            text.push_str(&format!("\n... stopped after {MAX_MATCHES} matches"));
        }
        if text.is_empty() {
            text = "(no matches)".to_string();
        }
        let text = truncate_for_model(ctx, self.name(), &call.id, self.output_category(), &text);
        ToolOutput::ok(call, text)
    }
}
