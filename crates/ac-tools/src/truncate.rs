// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use crate::context::ToolContext;
use crate::tool::OutputCategory;

/// Truncate `text` for the model if it exceeds `ctx.tool_output_char_cap`,
/// writing the full content to a side file under `ctx.side_files_dir` and
/// prefixing the truncated text with a note pointing at it. Dispatch is by
/// [`OutputCategory`], not by tool name, so new tools only need to pick the
/// right bucket.
pub fn truncate_for_model(
    ctx: &ToolContext,
    tool_name: &str,
    call_id: &str,
    category: OutputCategory,
    text: &str,
) -> String {
    if text.chars().count() <= ctx.tool_output_char_cap {
        return text.to_string();
    }

    let side_path = offload(ctx, tool_name, call_id, text);
    let chars: Vec<char> = text.chars().collect();
    let head: String = chars[..ctx.tool_output_head_chars.min(chars.len())].iter().collect();
    let tail_start = chars.len().saturating_sub(ctx.tool_output_tail_chars);
    let tail: String = chars[tail_start..].iter().collect();
    let dropped = chars.len().saturating_sub(head.chars().count() + tail.chars().count());

    let note = match category {
        OutputCategory::MatchList => format!(
            "[truncated: {dropped} chars omitted, full match list saved to {}]\n",
            side_path.display()
        ),
        OutputCategory::FileContent => format!(
            "[{} — {dropped} chars omitted from the middle, full file saved to {}]\n",
            tool_name,
            side_path.display()
        ),
        OutputCategory::HeadTail | OutputCategory::Generic => format!(
            "[truncated: {dropped} chars omitted, full output saved to {}]\n",
            side_path.display()
        ),
    };

    format!("{note}{head}\n...\n{tail}")
}

fn offload(ctx: &ToolContext, tool_name: &str, call_id: &str, text: &str) -> PathBuf {
    let filename = format!("{tool_name}-{call_id}-{}.txt", chrono::Utc::now().timestamp_millis());
    let path = ctx.side_files_dir.join(filename);
    if std::fs::create_dir_all(&ctx.side_files_dir).is_ok() {
        let _ = std::fs::write(&path, text);
    }
    path
}
