// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::debug;
use uuid::Uuid;

use ac_config::{AgentConfig, ToolsConfig};
use ac_model::ModelProvider;
use ac_store::SessionStore;
use ac_tools::{ReportBackTool, RequestInteractionFn, RunSubtaskFn, SubTaskRequest, SubTaskResult, ToolContext};

use crate::backtrack::BacktrackManager;
use crate::events::{CoreEvent, CoreEventKind};
use crate::prompts::sub_agent_system_prompt;
use crate::task::{run_task, TaskContext};
use crate::turn::TurnContext;

/// Sub-agents may themselves call a `task`-style tool up to this many levels
/// deep before the manager refuses to spawn another one.
const MAX_DEPTH: usize = 3;

/// Spawns child sessions in the same process for tools that delegate a
/// focused sub-task (e.g. a `task` tool). Holds one depth counter shared by
/// every level of recursion so nesting is bounded regardless of which tool
/// requested it (SPEC_FULL.md §4.H).
pub struct SubAgentManager {
    provider: Arc<dyn ModelProvider>,
    model: String,
    store: Arc<SessionStore>,
    agent_config: AgentConfig,
    tools_config: ToolsConfig,
    depth: Arc<AtomicUsize>,
    pending_interactions: AsyncMutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl SubAgentManager {
    pub fn new(provider: Arc<dyn ModelProvider>, model: String, store: Arc<SessionStore>, agent_config: AgentConfig, tools_config: ToolsConfig) -> Arc<Self> {
        Arc::new(Self {
            provider,
            model,
            store,
            agent_config,
            tools_config,
            depth: Arc::new(AtomicUsize::new(0)),
            pending_interactions: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Resolves a sub-agent's pending interaction request, returning `true` if
    /// `request_id` matched one. The orchestrator falls back to this after
    /// failing to find the id among its own top-level requests.
    pub async fn respond_to_interaction(&self, request_id: &str, response: Value) -> bool {
        match self.pending_interactions.lock().await.remove(request_id) {
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Build the closure a sub-agent's [`ToolContext`] wires in as
    /// `request_user_interaction`: emits the same `UserInteractionRequest`
    /// event a top-level session would, on the sub-agent's own session id,
    /// then suspends until a matching `Operation::UserInteractionRespond`
    /// resolves it through [`Self::respond_to_interaction`].
    fn make_request_interaction_fn(self: &Arc<Self>, events: mpsc::Sender<CoreEvent>, session_id: Uuid) -> RequestInteractionFn {
        let manager = self.clone();
        Arc::new(move |prompt: Value| {
            let manager = manager.clone();
            let events = events.clone();
            Box::pin(async move {
                let request_id = Uuid::new_v4().to_string();
                let (tx, rx) = oneshot::channel();
                manager.pending_interactions.lock().await.insert(request_id.clone(), tx);
                let _ = events.send(CoreEvent::new(session_id, CoreEventKind::UserInteractionRequest { request_id, prompt })).await;
                rx.await.unwrap_or(Value::Null)
            })
        })
    }

    /// Build the closure a [`ToolContext`] wires in as `run_subtask`. Captures
    /// `events` so nested task/turn/tool events reach the same sink as the
    /// parent's, distinguished only by their own `session_id`.
    pub fn make_run_subtask_fn(self: &Arc<Self>, events: mpsc::Sender<CoreEvent>) -> RunSubtaskFn {
        let manager = self.clone();
        Arc::new(move |request: SubTaskRequest| {
            let manager = manager.clone();
            let events = events.clone();
            Box::pin(async move { manager.run_subtask(request, events).await })
        })
    }

    pub async fn run_subtask(self: &Arc<Self>, request: SubTaskRequest, events: mpsc::Sender<CoreEvent>) -> SubTaskResult {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth >= MAX_DEPTH {
            return SubTaskResult {
                task_result: String::new(),
                structured_output: None,
                session_id: String::new(),
                error: Some(format!("maximum sub-agent depth ({MAX_DEPTH}) reached")),
            };
        }

        self.depth.fetch_add(1, Ordering::Relaxed);
        debug!(depth = depth + 1, "spawning sub-agent task");
        let result = self.run_subtask_inner(request, events).await;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn run_subtask_inner(self: &Arc<Self>, request: SubTaskRequest, events: mpsc::Sender<CoreEvent>) -> SubTaskResult {
        let mut session = match self.store.create("sub-agent", self.model.clone()) {
            Ok(s) => s,
            Err(e) => {
                return SubTaskResult {
                    task_result: String::new(),
                    structured_output: None,
                    session_id: String::new(),
                    error: Some(format!("failed to create sub-agent session: {e}")),
                }
            }
        };
        let session_id = session.id.to_string();

        let (report_back, _handle) = ReportBackTool::new(request.output_schema.clone());
        let mut registry = ac_tools::default_registry(&self.tools_config);
        registry.register(report_back);
        let schemas = registry.schemas();

        let turn = TurnContext {
            provider: self.provider.clone(),
            model: self.model.clone(),
            system: Some(sub_agent_system_prompt(None)),
            tools: schemas,
            registry: Arc::new(registry),
            max_tokens: None,
            temperature: None,
        };

        let side_files_dir = self.store.files_dir(session.id);
        let tool = ToolContext {
            session_id: session_id.clone(),
            file_tracker: session.file_tracker.clone(),
            todo_context: session.todo_context.clone(),
            shell_timeout_secs: self.tools_config.shell_timeout_secs,
            tool_output_char_cap: self.agent_config.tool_output_char_cap,
            tool_output_head_chars: self.agent_config.tool_output_head_chars,
            tool_output_tail_chars: self.agent_config.tool_output_tail_chars,
            side_files_dir,
            run_subtask: None,
            request_user_interaction: Some(self.make_request_interaction_fn(events.clone(), session.id)),
            trigger_backtrack: None,
        };

        let task_ctx = TaskContext {
            turn,
            tool,
            agent: self.agent_config.clone(),
            backtrack: Arc::new(BacktrackManager::new()),
            checkpoints_enabled: false,
        };

        let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
        match run_task(&self.store, &mut session, request.prompt, Vec::new(), &task_ctx, &events, cancel_rx).await {
            Ok(result) => SubTaskResult {
                task_result: result.task_result,
                structured_output: result.structured_output,
                session_id,
                error: None,
            },
            Err(e) => SubTaskResult {
                task_result: String::new(),
                structured_output: None,
                session_id,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_model::MockProvider;

    fn manager() -> (Arc<SubAgentManager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path().to_path_buf()));
        let provider: Arc<dyn ModelProvider> = Arc::new(MockProvider { reply_text: "sub-agent done".into() });
        let manager = SubAgentManager::new(provider, "mock-model".into(), store, AgentConfig::default(), ToolsConfig::default());
        (manager, dir)
    }

    #[tokio::test]
    async fn run_subtask_returns_the_sub_agents_final_text() {
        let (manager, _dir) = manager();
        let (tx, _rx) = mpsc::channel(256);
        let request = SubTaskRequest { prompt: "summarize this".into(), output_schema: None };
        let result = manager.run_subtask(request, tx).await;
        assert_eq!(result.error, None);
        assert_eq!(result.task_result, "sub-agent done");
    }

    #[tokio::test]
    async fn run_subtask_refuses_past_max_depth() {
        let (manager, _dir) = manager();
        manager.depth.store(MAX_DEPTH, Ordering::Relaxed);
        let (tx, _rx) = mpsc::channel(256);
        let request = SubTaskRequest { prompt: "go deeper".into(), output_schema: None };
        let result = manager.run_subtask(request, tx).await;
        assert!(result.error.unwrap().contains("maximum sub-agent depth"));
    }

    #[tokio::test]
    async fn depth_counter_returns_to_zero_after_a_successful_run() {
        let (manager, _dir) = manager();
        let (tx, _rx) = mpsc::channel(256);
        let request = SubTaskRequest { prompt: "task".into(), output_schema: None };
        manager.run_subtask(request, tx).await;
        assert_eq!(manager.depth.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn sub_agent_interaction_request_resolves_when_responded_to() {
        let (manager, _dir) = manager();
        let (tx, _rx) = mpsc::channel(256);
        let request_fn = manager.make_request_interaction_fn(tx, Uuid::new_v4());
        let manager2 = manager.clone();
        let pending = tokio::spawn(async move { request_fn(serde_json::json!({"question": "ok?"})).await });

        tokio::task::yield_now().await;
        let request_id = manager2.pending_interactions.lock().await.keys().next().cloned().unwrap();
        assert!(manager2.respond_to_interaction(&request_id, serde_json::json!("go ahead")).await);

        assert_eq!(pending.await.unwrap(), serde_json::json!("go ahead"));
    }

    #[tokio::test]
    async fn responding_to_an_unknown_sub_agent_interaction_is_a_no_op() {
        let (manager, _dir) = manager();
        assert!(!manager.respond_to_interaction("no-such-id", serde_json::json!(null)).await);
    }
}
