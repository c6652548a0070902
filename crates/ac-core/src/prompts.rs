// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Base system prompt for a top-level session.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a terminal coding assistant. \
You have access to tools for reading, writing, and searching files, running \
shell commands, and fetching web pages. Use them to accomplish the user's \
request directly; narrate only when it helps the user follow along.";

/// Sent as the sole user turn of a dedicated compaction call: summarize
/// everything before the kept tail into a developer-message-sized block the
/// task loop can substitute for `history[0..k]`.
pub const COMPACTION_PROMPT: &str = "Summarize the conversation above into a concise \
briefing for your own future self: what the user asked for, what has been done so \
far, important file paths and decisions, and what remains. Do not include pleasantries \
or repeat file contents verbatim. Write only the summary, no preamble.";

/// Build the system prompt for a sub-agent profile: the base prompt plus an
/// optional task-specific addendum.
pub fn sub_agent_system_prompt(addendum: Option<&str>) -> String {
    match addendum {
        Some(extra) if !extra.is_empty() => format!("{DEFAULT_SYSTEM_PROMPT}\n\n{extra}"),
        _ => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}
