// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::instrument;
use uuid::Uuid;

use ac_config::AgentConfig;
use ac_model::{join_text_parts, Message};
use ac_store::{BacktrackEntry, HistoryEvent, Session, SessionStore};
use ac_tools::ToolContext;

use crate::backtrack::BacktrackManager;
use crate::compact::{emergency_compact, needs_compaction, run_compaction, CompactionStrategy};
use crate::events::{CoreEvent, CoreEventKind};
use crate::turn::{run_turn, TurnContext};

/// Everything one task needs beyond the session it runs against.
pub struct TaskContext {
    pub turn: TurnContext,
    pub tool: ToolContext,
    pub agent: AgentConfig,
    pub backtrack: Arc<BacktrackManager>,
    /// Disabled for sub-agent tasks: sub-agents never take checkpoints or
    /// accept backtrack requests of their own.
    pub checkpoints_enabled: bool,
}

/// Terminal outcome of a task: either a `report_back` payload, the model's
/// final plain-text answer, or a forced stop (retry budget exhausted).
pub struct TaskResult {
    pub task_result: String,
    pub structured_output: Option<Value>,
    pub cancelled: bool,
}

/// Run one user input through the turn loop until it produces a final
/// result, backs off and retries transient failures up to
/// `agent.turn_retry_budget` times in a row, and applies compaction and
/// backtrack requests at each loop boundary (SPEC_FULL.md §4.E).
#[instrument(skip(store, session, ctx, events, cancelled))]
pub async fn run_task(
    store: &SessionStore,
    session: &mut Session,
    input_text: String,
    input_images: Vec<ac_model::Part>,
    ctx: &TaskContext,
    events: &mpsc::Sender<CoreEvent>,
    mut cancelled: watch::Receiver<bool>,
) -> anyhow::Result<TaskResult> {
    let session_id = session.id;
    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::UserMessage(input_text.clone()))).await;
    let _ = events.send(CoreEvent::new(session_id, CoreEventKind::TaskStart)).await;

    let mut user_parts = vec![ac_model::Part::text(input_text)];
    user_parts.extend(input_images);
    let user_message = Message::User { parts: user_parts, id: None, created_at: chrono::Utc::now() };
    store.append_history(session, vec![HistoryEvent::message(user_message)])?;

    let mut consecutive_transient_errors = 0u32;

    let task_result = loop {
        if *cancelled.borrow() {
            break TaskResult { task_result: "task cancelled".into(), structured_output: None, cancelled: true };
        }

        if ctx.checkpoints_enabled {
            let checkpoint_id = session.take_checkpoint();
            ctx.backtrack.record_checkpoint(checkpoint_id, session.conversation_history.len());
            let note = Message::developer_text(format!("<system>Checkpoint {checkpoint_id}</system>"));
            store.append_history(session, vec![HistoryEvent::message(note)])?;
        }

        if needs_compaction(&session.conversation_history, ctx.agent.compaction_token_threshold) {
            let _ = events.send(CoreEvent::new(session_id, CoreEventKind::CompactionStart)).await;
            let tokens_before = total_tokens(session);
            let end_index = compaction_end_index(session, ctx.agent.compaction_keep_recent_turns as usize);
            let entry = match run_compaction(
                ctx.turn.provider.clone(),
                &ctx.turn.model,
                &session.conversation_history,
                end_index,
                CompactionStrategy::Narrative,
            )
            .await
            {
                Ok(entry) => entry,
                Err(_) => emergency_compact(&session.conversation_history, ctx.agent.compaction_keep_recent_turns as usize),
            };
            store.append_history(session, vec![HistoryEvent::Compaction(entry)])?;
            ctx.backtrack.record_compaction(end_index);
            let tokens_after = total_tokens(session);
            let _ = events
                .send(CoreEvent::new(session_id, CoreEventKind::CompactionEnd { tokens_before, tokens_after }))
                .await;
        }

        maybe_append_reminder(store, session, ctx, events).await?;

        let turn_result = run_turn_with_retry(store, session, ctx, events, cancelled.clone(), &mut consecutive_transient_errors).await;
        let Some(turn_result) = turn_result else {
            let _ = events.send(CoreEvent::new(session_id, CoreEventKind::Error("retry budget exhausted".into()))).await;
            break TaskResult { task_result: "task failed: retry budget exhausted".into(), structured_output: None, cancelled: false };
        };

        if let Some(message) = turn_result.assistant_message.clone() {
            store.append_history(session, vec![HistoryEvent::message(message)])?;
        }
        if !turn_result.tool_results.is_empty() {
            store.append_history(
                session,
                turn_result.tool_results.clone().into_iter().map(HistoryEvent::message).collect(),
            )?;
        }

        if let Some(payload) = turn_result.report_back_result {
            break TaskResult {
                task_result: payload.to_string(),
                structured_output: Some(payload),
                cancelled: false,
            };
        }

        if !turn_result.has_tool_call {
            let text = turn_result
                .assistant_message
                .as_ref()
                .map(|m| join_text_parts(m.parts()))
                .unwrap_or_default();
            break TaskResult { task_result: text, structured_output: None, cancelled: false };
        }

        if let Some(request) = ctx.backtrack.take_pending() {
            session.conversation_history.truncate(request.checkpoint_index);
            let original_user_message = last_user_text(session);
            let entry = BacktrackEntry {
                checkpoint_id: request.checkpoint_index as u64,
                note: request.note,
                original_user_message,
            };
            store.append_history(session, vec![HistoryEvent::Backtrack(entry.clone())])?;
            let _ = events
                .send(CoreEvent::new(
                    session_id,
                    CoreEventKind::Backtrack { checkpoint_id: entry.checkpoint_id, original_user_message: entry.original_user_message },
                ))
                .await;
        }
    };

    let metadata = ac_store::HistoryEvent::TaskMetadata(ac_store::TaskMetadataItem {
        task_result: Some(task_result.task_result.clone()),
        structured_output: task_result.structured_output.clone(),
    });
    store.append_history(session, vec![metadata])?;

    let _ = events
        .send(CoreEvent::new(
            session_id,
            CoreEventKind::TaskFinish {
                task_result: task_result.task_result.clone(),
                structured_output: task_result.structured_output.clone(),
            },
        ))
        .await;

    Ok(task_result)
}

/// Run one turn, retrying transient failures with linear backoff up to the
/// configured budget. Returns `None` once the budget is exhausted.
async fn run_turn_with_retry(
    store: &SessionStore,
    session: &mut Session,
    ctx: &TaskContext,
    events: &mpsc::Sender<CoreEvent>,
    cancelled: watch::Receiver<bool>,
    consecutive_transient_errors: &mut u32,
) -> Option<crate::turn::TurnResult> {
    loop {
        let input = ac_model::attach_developer_messages(build_llm_input(&session.conversation_history));
        let result = run_turn(&ctx.turn, input, &ctx.tool, session.id, events, cancelled.clone()).await;

        if !result.transient_error {
            *consecutive_transient_errors = 0;
            return Some(result);
        }

        *consecutive_transient_errors += 1;
        if *consecutive_transient_errors > ctx.agent.turn_retry_budget {
            return None;
        }
        let backoff = std::time::Duration::from_millis(250 * (*consecutive_transient_errors as u64));
        tokio::time::sleep(backoff).await;
        let _ = store; // backoff retries only re-read session.conversation_history, nothing to persist here
    }
}

async fn maybe_append_reminder(
    store: &SessionStore,
    session: &mut Session,
    ctx: &TaskContext,
    events: &mpsc::Sender<CoreEvent>,
) -> anyhow::Result<()> {
    let Some(reminder) = &ctx.agent.reminder_text else { return Ok(()) };
    if ctx.agent.reminder_every_n_turns == 0 {
        return Ok(());
    }
    let turn_count = session
        .conversation_history
        .iter()
        .filter(|e| matches!(e.as_message(), Some(Message::Assistant { .. })))
        .count();
    if turn_count > 0 && turn_count as u32 % ctx.agent.reminder_every_n_turns == 0 {
        let message = Message::developer_text(reminder.clone());
        let _ = events.send(CoreEvent::new(session.id, CoreEventKind::DeveloperMessage(reminder.clone()))).await;
        store.append_history(session, vec![HistoryEvent::message(message)])?;
    }
    Ok(())
}

/// Translate persisted history into the message list a provider call sends.
/// Whenever a `CompactionEntry` is present, `history[0..end_index]` is
/// replaced by a single developer message carrying its summary rather than
/// being replayed verbatim (SPEC_FULL.md §4.F).
fn build_llm_input(history: &[HistoryEvent]) -> Vec<Message> {
    let cutover = history.iter().rev().find_map(|e| match e {
        HistoryEvent::Compaction(entry) => Some(entry.clone()),
        _ => None,
    });

    let Some(entry) = cutover else {
        return history.iter().filter_map(|e| e.as_message().cloned()).collect();
    };

    let mut messages = vec![Message::developer_text(entry.summary_text)];
    messages.extend(history[entry.end_index..].iter().filter_map(|e| e.as_message().cloned()));
    messages
}

fn total_tokens(session: &Session) -> u64 {
    session.conversation_history.iter().filter_map(|e| e.as_message().map(ac_model::approx_tokens)).sum()
}

/// History index the compaction call should summarize up to: everything
/// except the last `keep_recent_turns` assistant-message turns.
fn compaction_end_index(session: &Session, keep_recent_turns: usize) -> usize {
    let assistant_indices: Vec<usize> = session
        .conversation_history
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.as_message(), Some(Message::Assistant { .. })))
        .map(|(i, _)| i)
        .collect();
    if assistant_indices.len() <= keep_recent_turns {
        return 0;
    }
    assistant_indices[assistant_indices.len() - keep_recent_turns] + 1
}

fn last_user_text(session: &Session) -> Option<String> {
    session.conversation_history.iter().rev().find_map(|e| {
        let m @ Message::User { .. } = e.as_message()? else { return None };
        let text = join_text_parts(m.parts());
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_config::AgentConfig;
    use ac_model::{MockProvider, ScriptStep, ScriptedMockProvider};
    use ac_tools::{BacktrackTool, ReportBackTool, ToolRegistry};

    fn task_ctx(provider: Arc<dyn ac_model::ModelProvider>, registry: ToolRegistry, agent: AgentConfig) -> TaskContext {
        TaskContext {
            turn: TurnContext {
                provider,
                model: "mock-model".into(),
                system: None,
                tools: Vec::new(),
                registry: Arc::new(registry),
                max_tokens: None,
                temperature: None,
            },
            tool: ToolContext::for_tests(),
            agent,
            backtrack: Arc::new(BacktrackManager::new()),
            checkpoints_enabled: true,
        }
    }

    #[tokio::test]
    async fn task_without_tool_calls_finishes_with_final_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("t", "mock-model").unwrap();

        let provider: Arc<dyn ac_model::ModelProvider> = Arc::new(MockProvider { reply_text: "done".into() });
        let ctx = task_ctx(provider, ToolRegistry::new(), AgentConfig::default());
        let (tx, _rx) = mpsc::channel(256);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let result = run_task(&store, &mut session, "hello".into(), Vec::new(), &ctx, &tx, cancel_rx).await.unwrap();
        assert_eq!(result.task_result, "done");
        assert!(!result.cancelled);
        assert!(session.messages_count() >= 3);
    }

    #[tokio::test]
    async fn user_message_event_precedes_task_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("t", "mock-model").unwrap();

        let provider: Arc<dyn ac_model::ModelProvider> = Arc::new(MockProvider { reply_text: "done".into() });
        let ctx = task_ctx(provider, ToolRegistry::new(), AgentConfig::default());
        let (tx, mut rx) = mpsc::channel(256);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        run_task(&store, &mut session, "2+2?".into(), Vec::new(), &ctx, &tx, cancel_rx).await.unwrap();
        drop(tx);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.kind);
        }
        assert!(matches!(&received[0], CoreEventKind::UserMessage(text) if text == "2+2?"));
        assert!(matches!(&received[1], CoreEventKind::TaskStart));
    }

    #[tokio::test]
    async fn backtrack_tool_call_is_applied_at_the_next_loop_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("t", "mock-model").unwrap();

        let provider: Arc<dyn ac_model::ModelProvider> = Arc::new(ScriptedMockProvider::new(vec![
            ScriptStep::ToolCall {
                call_id: "c1".into(),
                tool_name: "Backtrack".into(),
                arguments_json: r#"{"checkpoint_id":0,"note":"retry"}"#.into(),
            },
            ScriptStep::Text("after backtrack".into()),
        ]));

        let mut registry = ToolRegistry::new();
        registry.register(BacktrackTool);

        let backtrack = Arc::new(BacktrackManager::new());
        let mut tool = ToolContext::for_tests();
        tool.trigger_backtrack = Some({
            let backtrack = backtrack.clone();
            Arc::new(move |id: u64, note: String| {
                let backtrack = backtrack.clone();
                Box::pin(async move { backtrack.request_by_checkpoint(id, note).map_err(|e| e.to_string()) })
            })
        });

        let ctx = TaskContext {
            turn: TurnContext {
                provider,
                model: "mock-model".into(),
                system: None,
                tools: registry.schemas(),
                registry: Arc::new(registry),
                max_tokens: None,
                temperature: None,
            },
            tool,
            agent: AgentConfig::default(),
            backtrack,
            checkpoints_enabled: true,
        };

        let (tx, _rx) = mpsc::channel(256);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let result = run_task(&store, &mut session, "do something".into(), Vec::new(), &ctx, &tx, cancel_rx).await.unwrap();
        assert_eq!(result.task_result, "after backtrack");
        assert!(session.conversation_history.iter().any(|e| matches!(e, HistoryEvent::Backtrack(_))));
    }

    #[tokio::test]
    async fn task_ending_in_report_back_returns_structured_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("t", "mock-model").unwrap();

        let provider: Arc<dyn ac_model::ModelProvider> = Arc::new(ScriptedMockProvider::new(vec![ScriptStep::ToolCall {
            call_id: "c1".into(),
            tool_name: "report_back".into(),
            arguments_json: r#"{"summary":"wrapped up"}"#.into(),
        }]));
        let (report_back, _handle) = ReportBackTool::new(None);
        let mut registry = ToolRegistry::new();
        registry.register(report_back);
        let ctx = task_ctx(provider, registry, AgentConfig::default());
        let (tx, _rx) = mpsc::channel(256);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let result = run_task(&store, &mut session, "do it".into(), Vec::new(), &ctx, &tx, cancel_rx).await.unwrap();
        assert_eq!(result.structured_output.unwrap()["summary"], "wrapped up");
    }

    #[tokio::test]
    async fn cancelled_before_the_first_turn_reports_a_cancelled_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("t", "mock-model").unwrap();

        let provider: Arc<dyn ac_model::ModelProvider> = Arc::new(MockProvider::default());
        let ctx = task_ctx(provider, ToolRegistry::new(), AgentConfig::default());
        let (tx, _rx) = mpsc::channel(256);
        let (_cancel_tx, cancel_rx) = watch::channel(true);

        let result = run_task(&store, &mut session, "hi".into(), Vec::new(), &ctx, &tx, cancel_rx).await.unwrap();
        assert!(result.cancelled);
    }

    #[test]
    fn build_llm_input_substitutes_compacted_region_with_summary() {
        let history = vec![
            HistoryEvent::message(Message::user_text("one")),
            HistoryEvent::message(Message::user_text("two")),
            HistoryEvent::Compaction(ac_store::CompactionEntry { end_index: 2, summary_text: "summary".into() }),
            HistoryEvent::message(Message::user_text("three")),
        ];
        let input = build_llm_input(&history);
        assert_eq!(input.len(), 2);
        assert_eq!(join_text_parts(input[0].parts()), "summary");
        assert_eq!(join_text_parts(input[1].parts()), "three");
    }

    #[test]
    fn compaction_end_index_keeps_the_configured_tail() {
        let mut session = Session::new(Uuid::new_v4(), "t", "mock-model");
        for i in 0..5 {
            session.conversation_history.push(HistoryEvent::message(Message::Assistant {
                parts: vec![ac_model::Part::text(format!("reply {i}"))],
                usage: None,
                stop_reason: None,
                response_id: None,
                id: None,
                created_at: chrono::Utc::now(),
            }));
        }
        assert_eq!(compaction_end_index(&session, 2), 4);
        assert_eq!(compaction_end_index(&session, 10), 0);
    }
}
