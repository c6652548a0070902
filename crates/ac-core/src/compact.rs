// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use ac_model::{approx_tokens, join_text_parts, Message, ModelProvider, Part, StreamItem};
use ac_store::{CompactionEntry, HistoryEvent};

const STRUCTURED_COMPACTION_PROMPT: &str = "\
Produce a structured state checkpoint from the conversation history below. \
Use EXACTLY these Markdown sections: Active Task, Key Decisions, Files & Artifacts, \
Constraints, Pending Items, Session Narrative. Preserve file paths, function names, \
error messages, and technical decisions verbatim where they matter.";

const NARRATIVE_COMPACTION_PROMPT: &str = "\
Summarize the following conversation history in a concise, information-dense way. \
Preserve every technical detail, decision, file name, and tool outcome that may be \
relevant to future work. This summary will replace the original history.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    Structured,
    Narrative,
}

/// Estimated total token count across every `Message` event in history,
/// compared against the configured threshold.
pub fn needs_compaction(history: &[HistoryEvent], threshold: u64) -> bool {
    total_tokens(history) > threshold
}

fn total_tokens(history: &[HistoryEvent]) -> u64 {
    history.iter().filter_map(|e| e.as_message().map(approx_tokens)).sum()
}

/// Run a dedicated, non-interactive LLM call that summarizes
/// `history[0..end_index]` and returns the `CompactionEntry` the task loop
/// appends. `keep_recent` turns are excluded from `end_index` by the caller.
pub async fn run_compaction(
    provider: Arc<dyn ModelProvider>,
    model: &str,
    history: &[HistoryEvent],
    end_index: usize,
    strategy: CompactionStrategy,
) -> anyhow::Result<CompactionEntry> {
    let prompt = match strategy {
        CompactionStrategy::Structured => STRUCTURED_COMPACTION_PROMPT,
        CompactionStrategy::Narrative => NARRATIVE_COMPACTION_PROMPT,
    };
    let history_text = serialize_region(&history[..end_index]);
    let request = Message::User {
        parts: vec![Part::text(format!("{prompt}\n\n---\n\n{history_text}"))],
        id: None,
        created_at: chrono::Utc::now(),
    };

    let params = ac_model::LLMCallParameter {
        input: vec![request],
        system: Some(crate::prompts::COMPACTION_PROMPT.to_string()),
        tools: Vec::new(),
        model: model.to_string(),
        max_tokens: None,
        temperature: None,
    };
    let (_tx, rx) = tokio::sync::oneshot::channel();
    let mut stream = provider.stream(params, rx).await?;

    let mut summary = String::new();
    use futures::StreamExt;
    while let Some(item) = stream.next().await {
        match item? {
            StreamItem::AssistantMessage { message } => {
                summary = join_text_parts(message.parts());
                break;
            }
            StreamItem::AssistantTextDelta { text } => summary.push_str(&text),
            _ => {}
        }
    }

    Ok(CompactionEntry { end_index, summary_text: summary })
}

/// Deterministic fallback used when the session is too large to fit even a
/// compaction prompt: drop everything but the last `keep_n` message events,
/// with a canned notice instead of a model-written summary. Always
/// succeeds; makes no model call.
pub fn emergency_compact(history: &[HistoryEvent], keep_n: usize) -> CompactionEntry {
    let message_count = history.iter().filter(|e| e.as_message().is_some()).count();
    let end_index = history.len().saturating_sub(keep_n.min(message_count));
    CompactionEntry {
        end_index,
        summary_text: "[Context emergency-compacted: earlier history was dropped to avoid a \
            context-window overflow. Proceed carefully; ask the user to re-state any \
            requirements you can no longer see.]"
            .to_string(),
    }
}

fn serialize_region(history: &[HistoryEvent]) -> String {
    history
        .iter()
        .filter_map(|e| {
            let text = join_text_parts(e.as_message()?.parts());
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
