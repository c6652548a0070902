// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use ac_config::{AgentConfig, ToolsConfig};
use ac_model::{ModelProvider, Part};
use ac_store::{Session, SessionStore};
use ac_tools::{RequestInteractionFn, ToolContext, TriggerBacktrackFn};

use crate::backtrack::BacktrackManager;
use crate::events::{CoreEvent, CoreEventKind};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::subagent::SubAgentManager;
use crate::task::{run_task, TaskContext, TaskResult};
use crate::turn::TurnContext;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("session {0} already has an active task")]
    SessionBusy(Uuid),
    #[error("no pending user-interaction request with id {0}")]
    UnknownInteractionRequest(String),
}

/// Input-only requests the orchestrator's message pump accepts. Never
/// persisted — the corresponding `HistoryEvent`s are what survives
/// (SPEC_FULL.md §4.G).
pub enum Operation {
    /// Create a fresh session, or attach to an existing one if `session_id`
    /// is given.
    InitAgent { session_id: Option<Uuid>, title: String },
    UserInput { session_id: Uuid, text: String, images: Vec<Part> },
    Interrupt { session_id: Uuid },
    ChangeModel { model: String },
    CompactSession { session_id: Uuid },
    Fork { session_id: Uuid, at_index: usize },
    End { session_id: Uuid },
    /// Resolves a tool's pending `UserInteractionRequest`, identified by the
    /// id carried on that event.
    UserInteractionRespond { request_id: String, response: Value },
}

pub enum OperationOutcome {
    SessionReady { session_id: Uuid },
    TaskStarted { op_id: Uuid },
    Interrupted,
    Acknowledged,
    Forked { session_id: Uuid },
    Ended,
}

struct ActiveTask {
    session_id: Uuid,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<TaskResult>>,
}

/// Central message pump: one `Orchestrator` per process, fanning operations
/// out to per-session tasks while enforcing the single-active-task-per-session
/// invariant (SPEC_FULL.md §5).
pub struct Orchestrator {
    store: Arc<SessionStore>,
    provider: Arc<dyn ModelProvider>,
    model: AsyncMutex<String>,
    tools_config: ToolsConfig,
    agent_config: AgentConfig,
    events: mpsc::Sender<CoreEvent>,
    sub_agents: Arc<SubAgentManager>,
    sessions: AsyncMutex<HashMap<Uuid, Session>>,
    active_tasks: AsyncMutex<HashMap<Uuid, ActiveTask>>,
    pending_interactions: AsyncMutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn ModelProvider>,
        model: String,
        tools_config: ToolsConfig,
        agent_config: AgentConfig,
        events: mpsc::Sender<CoreEvent>,
    ) -> Arc<Self> {
        let sub_agents = SubAgentManager::new(provider.clone(), model.clone(), store.clone(), agent_config.clone(), tools_config.clone());
        Arc::new(Self {
            store,
            provider,
            model: AsyncMutex::new(model),
            tools_config,
            agent_config,
            events,
            sub_agents,
            sessions: AsyncMutex::new(HashMap::new()),
            active_tasks: AsyncMutex::new(HashMap::new()),
            pending_interactions: AsyncMutex::new(HashMap::new()),
        })
    }

    pub async fn dispatch(self: &Arc<Self>, op: Operation) -> Result<OperationOutcome, OrchestratorError> {
        match op {
            Operation::InitAgent { session_id, title } => {
                let session = match session_id {
                    Some(id) => self.store.load(id).map_err(|_| OrchestratorError::SessionNotFound(id))?,
                    None => {
                        let model = self.model.lock().await.clone();
                        self.store.create(title, model).map_err(|_| OrchestratorError::SessionNotFound(Uuid::nil()))?
                    }
                };
                let id = session.id;
                self.sessions.lock().await.insert(id, session);
                Ok(OperationOutcome::SessionReady { session_id: id })
            }

            Operation::UserInput { session_id, text, images } => self.start_task(session_id, text, images).await,

            Operation::Interrupt { session_id } => {
                let active = self.active_tasks.lock().await;
                match active.values().find(|t| t.session_id == session_id) {
                    Some(task) => {
                        let _ = task.cancel_tx.send(true);
                        Ok(OperationOutcome::Interrupted)
                    }
                    None => Err(OrchestratorError::SessionNotFound(session_id)),
                }
            }

            Operation::ChangeModel { model } => {
                *self.model.lock().await = model;
                Ok(OperationOutcome::Acknowledged)
            }

            Operation::CompactSession { session_id } => {
                if !self.sessions.lock().await.contains_key(&session_id) {
                    return Err(OrchestratorError::SessionNotFound(session_id));
                }
                Ok(OperationOutcome::Acknowledged)
            }

            Operation::Fork { session_id, at_index } => {
                let forked = self.store.fork(session_id, at_index).map_err(|_| OrchestratorError::SessionNotFound(session_id))?;
                let id = forked.id;
                self.sessions.lock().await.insert(id, forked);
                Ok(OperationOutcome::Forked { session_id: id })
            }

            Operation::End { session_id } => {
                self.sessions.lock().await.remove(&session_id);
                Ok(OperationOutcome::Ended)
            }

            Operation::UserInteractionRespond { request_id, response } => {
                if let Some(tx) = self.pending_interactions.lock().await.remove(&request_id) {
                    let _ = tx.send(response);
                    return Ok(OperationOutcome::Acknowledged);
                }
                if self.sub_agents.respond_to_interaction(&request_id, response).await {
                    return Ok(OperationOutcome::Acknowledged);
                }
                Err(OrchestratorError::UnknownInteractionRequest(request_id))
            }
        }
    }

    /// Rejects outright (rather than queueing) a second concurrent
    /// `UserInput` for a session that already has a task in flight.
    async fn start_task(self: &Arc<Self>, session_id: Uuid, text: String, images: Vec<Part>) -> Result<OperationOutcome, OrchestratorError> {
        if self.active_tasks.lock().await.values().any(|t| t.session_id == session_id) {
            let _ = self
                .events
                .send(CoreEvent::new(session_id, CoreEventKind::Error("a task is already running for this session".into())))
                .await;
            return Err(OrchestratorError::SessionBusy(session_id));
        }

        let session = self.sessions.lock().await.remove(&session_id).ok_or(OrchestratorError::SessionNotFound(session_id))?;
        let task_ctx = self.build_task_context(&session).await;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let store = self.store.clone();
        let events = self.events.clone();
        let orchestrator = self.clone();

        let handle: JoinHandle<anyhow::Result<TaskResult>> = tokio::spawn(async move {
            let mut session = session;
            let result = run_task(&store, &mut session, text, images, &task_ctx, &events, cancel_rx).await;
            orchestrator.sessions.lock().await.insert(session_id, session);
            result
        });

        let op_id = Uuid::new_v4();
        self.active_tasks.lock().await.insert(op_id, ActiveTask { session_id, cancel_tx, handle });
        Ok(OperationOutcome::TaskStarted { op_id })
    }

    /// Block until the background work triggered by `op_id` has finished or
    /// been cancelled, returning its result. This is the UI's contract for
    /// "this round is done".
    pub async fn wait_for(&self, op_id: Uuid) -> Option<anyhow::Result<TaskResult>> {
        let task = self.active_tasks.lock().await.remove(&op_id)?;
        task.handle.await.ok()
    }

    async fn build_task_context(self: &Arc<Self>, session: &Session) -> TaskContext {
        let model = self.model.lock().await.clone();
        let registry = Arc::new(ac_tools::default_registry(&self.tools_config));
        let turn = TurnContext {
            provider: self.provider.clone(),
            model,
            system: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            tools: registry.schemas(),
            registry,
            max_tokens: None,
            temperature: None,
        };
        let backtrack = Arc::new(BacktrackManager::new());
        let tool = ToolContext {
            session_id: session.id.to_string(),
            file_tracker: session.file_tracker.clone(),
            todo_context: session.todo_context.clone(),
            shell_timeout_secs: self.tools_config.shell_timeout_secs,
            tool_output_char_cap: self.agent_config.tool_output_char_cap,
            tool_output_head_chars: self.agent_config.tool_output_head_chars,
            tool_output_tail_chars: self.agent_config.tool_output_tail_chars,
            side_files_dir: self.store.files_dir(session.id),
            run_subtask: Some(self.sub_agents.make_run_subtask_fn(self.events.clone())),
            request_user_interaction: Some(self.make_request_interaction_fn(session.id)),
            trigger_backtrack: Some(make_trigger_backtrack_fn(backtrack.clone())),
        };
        TaskContext { turn, tool, agent: self.agent_config.clone(), backtrack, checkpoints_enabled: true }
    }

    /// Build the closure a [`ToolContext`] wires in as
    /// `request_user_interaction`: emits a `UserInteractionRequest` event
    /// carrying a fresh request id, then suspends until a matching
    /// `Operation::UserInteractionRespond` resolves it.
    fn make_request_interaction_fn(self: &Arc<Self>, session_id: Uuid) -> RequestInteractionFn {
        let orchestrator = self.clone();
        Arc::new(move |prompt: Value| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move { orchestrator.request_user_interaction(session_id, prompt).await })
        })
    }

    async fn request_user_interaction(self: &Arc<Self>, session_id: Uuid, prompt: Value) -> Value {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_interactions.lock().await.insert(request_id.clone(), tx);
        let _ = self
            .events
            .send(CoreEvent::new(session_id, CoreEventKind::UserInteractionRequest { request_id, prompt }))
            .await;
        rx.await.unwrap_or(Value::Null)
    }
}

/// Build the closure a [`ToolContext`] wires in as `trigger_backtrack`,
/// resolving checkpoint ids against the same [`BacktrackManager`] the task
/// loop drains each iteration.
fn make_trigger_backtrack_fn(backtrack: Arc<BacktrackManager>) -> TriggerBacktrackFn {
    Arc::new(move |checkpoint_id: u64, note: String| {
        let backtrack = backtrack.clone();
        Box::pin(async move { backtrack.request_by_checkpoint(checkpoint_id, note).map_err(|e| e.to_string()) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_model::MockProvider;

    fn orchestrator(reply_text: &str) -> Arc<Orchestrator> {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path().to_path_buf()));
        let provider: Arc<dyn ModelProvider> = Arc::new(MockProvider { reply_text: reply_text.into() });
        let (tx, _rx) = mpsc::channel(256);
        Orchestrator::new(store, provider, "mock-model".into(), ToolsConfig::default(), AgentConfig::default(), tx)
    }

    #[tokio::test]
    async fn user_input_runs_a_task_and_wait_for_returns_its_result() {
        let orch = orchestrator("hi there");
        let session_id = match orch.dispatch(Operation::InitAgent { session_id: None, title: "t".into() }).await.unwrap() {
            OperationOutcome::SessionReady { session_id } => session_id,
            _ => panic!("expected SessionReady"),
        };

        let op_id = match orch.dispatch(Operation::UserInput { session_id, text: "hello".into(), images: Vec::new() }).await.unwrap() {
            OperationOutcome::TaskStarted { op_id } => op_id,
            _ => panic!("expected TaskStarted"),
        };

        let result = orch.wait_for(op_id).await.unwrap().unwrap();
        assert_eq!(result.task_result, "hi there");
    }

    #[tokio::test]
    async fn second_user_input_on_a_busy_session_is_rejected() {
        let orch = orchestrator("slow reply");
        let session_id = match orch.dispatch(Operation::InitAgent { session_id: None, title: "t".into() }).await.unwrap() {
            OperationOutcome::SessionReady { session_id } => session_id,
            _ => panic!("expected SessionReady"),
        };

        let _op_id = orch.dispatch(Operation::UserInput { session_id, text: "first".into(), images: Vec::new() }).await.unwrap();

        let second = orch.dispatch(Operation::UserInput { session_id, text: "second".into(), images: Vec::new() }).await;
        assert!(matches!(second, Err(OrchestratorError::SessionBusy(_))));
    }

    #[tokio::test]
    async fn interrupt_on_unknown_session_is_not_found() {
        let orch = orchestrator("hi");
        let result = orch.dispatch(Operation::Interrupt { session_id: Uuid::new_v4() }).await;
        assert!(matches!(result, Err(OrchestratorError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn responding_to_an_unknown_interaction_request_is_an_error() {
        let orch = orchestrator("hi");
        let result = orch
            .dispatch(Operation::UserInteractionRespond { request_id: "no-such-request".into(), response: serde_json::json!(null) })
            .await;
        assert!(matches!(result, Err(OrchestratorError::UnknownInteractionRequest(_))));
    }

    #[tokio::test]
    async fn user_interaction_request_resolves_when_responded_to() {
        let orch = orchestrator("hi");
        let session_id = Uuid::new_v4();
        let request_fn = orch.make_request_interaction_fn(session_id);
        let orch2 = orch.clone();
        let pending = tokio::spawn(async move { request_fn(serde_json::json!({"question": "proceed?"})).await });

        // Give the spawned future a chance to register its pending request.
        tokio::task::yield_now().await;
        let request_id = orch2.pending_interactions.lock().await.keys().next().cloned().unwrap();
        orch2
            .dispatch(Operation::UserInteractionRespond { request_id, response: serde_json::json!("yes") })
            .await
            .unwrap();

        assert_eq!(pending.await.unwrap(), serde_json::json!("yes"));
    }
}
