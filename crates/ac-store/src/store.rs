// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;
use uuid::Uuid;

use crate::history::{decode_line, encode_line, HistoryEvent};
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("history codec error: {0}")]
    Codec(#[from] crate::history::CodecError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("meta codec error: {0}")]
    Meta(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    model: String,
    next_checkpoint_id: u64,
    messages_count: usize,
    user_messages_count: usize,
}

/// A session's disk footprint, and a summary row for a session picker.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub messages_count: usize,
}

/// Append-only session persistence under a user-scoped data directory.
/// `history.jsonl` is the source of truth; `meta.json` is a denormalized,
/// atomically-written snapshot recoverable from history alone.
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Resolve the default base directory the way the corpus resolves its
    /// own data directory: `dirs::data_dir()`, falling back to
    /// `~/.local/share`, under a project-specific subdirectory.
    pub fn default_base_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".local/share"))
            .join("agentcore")
            .join("sessions")
    }

    fn session_dir(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    fn history_path(&self, id: Uuid) -> PathBuf {
        self.session_dir(id).join("history.jsonl")
    }

    fn meta_path(&self, id: Uuid) -> PathBuf {
        self.session_dir(id).join("meta.json")
    }

    pub fn files_dir(&self, id: Uuid) -> PathBuf {
        self.session_dir(id).join("files")
    }

    pub fn create(&self, title: impl Into<String>, model: impl Into<String>) -> Result<Session, StoreError> {
        let session = Session::new(Uuid::new_v4(), title, model);
        fs::create_dir_all(self.session_dir(session.id))?;
        fs::create_dir_all(self.files_dir(session.id))?;
        fs::write(self.history_path(session.id), "")?;
        self.write_meta(&session)?;
        Ok(session)
    }

    /// Append each event as one flushed line, then rewrite `meta.json`
    /// atomically. A crash between the two leaves `meta.json` stale but
    /// recoverable: [`Self::load`] re-derives counts from history.
    pub fn append_history(&self, session: &mut Session, events: Vec<HistoryEvent>) -> Result<(), StoreError> {
        let path = self.history_path(session.id);
        let mut file = fs::OpenOptions::new().append(true).open(&path)?;
        for event in &events {
            writeln!(file, "{}", encode_line(event)?)?;
        }
        file.flush()?;
        session.conversation_history.extend(events);
        session.updated_at = Utc::now();
        self.write_meta(session)?;
        Ok(())
    }

    fn write_meta(&self, session: &Session) -> Result<(), StoreError> {
        let meta = SessionMeta {
            id: session.id,
            title: session.title.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            model: session.model.clone(),
            next_checkpoint_id: session.next_checkpoint_id,
            messages_count: session.messages_count(),
            user_messages_count: session.user_messages_count(),
        };
        let dir = self.session_dir(session.id);
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.meta_path(session.id)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Load a session, re-decoding history line by line and rebuilding
    /// `file_tracker`/`todo_context` as if every historical tool result had
    /// just been executed.
    pub fn load(&self, id: Uuid) -> Result<Session, StoreError> {
        let meta_path = self.meta_path(id);
        if !meta_path.exists() {
            return Err(StoreError::NotFound(id));
        }
        let meta: SessionMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;

        let mut session = Session::new(id, meta.title, meta.model);
        session.created_at = meta.created_at;
        session.updated_at = meta.updated_at;
        session.next_checkpoint_id = meta.next_checkpoint_id;

        let raw = fs::read_to_string(self.history_path(id))?;
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            session.conversation_history.push(decode_line(line)?);
        }
        rebuild_runtime_state(&session);
        Ok(session)
    }

    /// Copy `history[0..at_index]` into a freshly-minted session id.
    pub fn fork(&self, id: Uuid, at_index: usize) -> Result<Session, StoreError> {
        let source = self.load(id)?;
        let forked = self.create(format!("{} (forked)", source.title), source.model.clone())?;
        let prefix: Vec<HistoryEvent> = source.conversation_history.into_iter().take(at_index).collect();
        let mut forked = forked;
        self.append_history(&mut forked, prefix)?;
        Ok(forked)
    }

    pub fn iter_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut summaries = Vec::new();
        if !self.base_dir.exists() {
            return Ok(summaries);
        }
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let Ok(id) = entry.file_name().to_string_lossy().parse::<Uuid>() else { continue };
            match self.load(id) {
                Ok(session) => summaries.push(SessionSummary {
                    id: session.id,
                    title: session.title,
                    updated_at: session.updated_at,
                    messages_count: session.messages_count(),
                }),
                Err(e) => warn!(session_id = %id, error = %e, "skipping unreadable session while indexing"),
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// Re-derive `file_tracker` and `todo_context` from the replayed history: for
/// every successful `ReadFile`/`WriteFile`/`EditFile` call, re-hash the file's
/// current on-disk content; for the latest successful `TodoWrite` call,
/// reinstall its item list. Matches a tool call to its result by `call_id`.
fn rebuild_runtime_state(session: &Session) {
    let mut calls: std::collections::HashMap<String, (String, String)> = std::collections::HashMap::new();
    for event in &session.conversation_history {
        if let Some(ac_model::Message::Assistant { parts, .. }) = event.as_message() {
            for part in parts {
                if let ac_model::Part::ToolCall { call_id, tool_name, arguments_json } = part {
                    calls.insert(call_id.clone(), (tool_name.clone(), arguments_json.clone()));
                }
            }
        }
    }

    for event in &session.conversation_history {
        let Some(ac_model::Message::ToolResult { call_id, status, .. }) = event.as_message() else { continue };
        if *status != ac_model::ToolStatus::Success {
            continue;
        }
        let Some((tool_name, arguments_json)) = calls.get(call_id) else { continue };
        let Ok(args) = serde_json::from_str::<serde_json::Value>(arguments_json) else { continue };

        match tool_name.as_str() {
            "ReadFile" | "WriteFile" | "EditFile" => {
                if let Some(path_str) = args.get("path").and_then(serde_json::Value::as_str) {
                    let path = std::path::Path::new(path_str);
                    if let Ok(content) = fs::read_to_string(path) {
                        session.file_tracker.record(path, &content);
                    }
                }
            }
            "TodoWrite" => {
                if let Some(items) = args.get("items").and_then(serde_json::Value::as_array) {
                    let parsed: Vec<ac_tools::TodoItem> = items
                        .iter()
                        .filter_map(|item| {
                            Some(ac_tools::TodoItem {
                                id: item.get("id")?.as_str()?.to_string(),
                                content: item.get("content")?.as_str()?.to_string(),
                                status: item
                                    .get("status")
                                    .and_then(serde_json::Value::as_str)
                                    .unwrap_or("pending")
                                    .to_string(),
                            })
                        })
                        .collect();
                    *session.todo_context.lock().unwrap() = parsed;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_load_round_trips_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let session = store.create("untitled", "mock-model").unwrap();
        let loaded = store.load(session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.conversation_history.len(), 0);
    }

    #[test]
    fn append_history_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("untitled", "mock-model").unwrap();
        let event = HistoryEvent::message(ac_model::Message::user_text("hello"));
        store.append_history(&mut session, vec![event]).unwrap();

        let loaded = store.load(session.id).unwrap();
        assert_eq!(loaded.conversation_history.len(), 1);
        assert_eq!(loaded.user_messages_count(), 1);
    }

    #[test]
    fn load_of_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let err = store.load(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn fork_copies_only_the_requested_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("untitled", "mock-model").unwrap();
        store
            .append_history(
                &mut session,
                vec![
                    HistoryEvent::message(ac_model::Message::user_text("one")),
                    HistoryEvent::message(ac_model::Message::user_text("two")),
                ],
            )
            .unwrap();

        let forked = store.fork(session.id, 1).unwrap();
        assert_eq!(forked.conversation_history.len(), 1);
        assert_ne!(forked.id, session.id);
    }

    #[test]
    fn iter_sessions_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let a = store.create("a", "mock-model").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut b = store.create("b", "mock-model").unwrap();
        store.append_history(&mut b, vec![HistoryEvent::message(ac_model::Message::user_text("x"))]).unwrap();

        let summaries = store.iter_sessions().unwrap();
        assert_eq!(summaries.first().unwrap().id, b.id);
        assert!(summaries.iter().any(|s| s.id == a.id));
    }

    #[test]
    fn load_reconstructs_file_tracker_from_tool_results() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("untitled", "mock-model").unwrap();
        let path_str = file.to_str().unwrap();
        store
            .append_history(
                &mut session,
                vec![
                    HistoryEvent::message(ac_model::Message::Assistant {
                        parts: vec![ac_model::Part::ToolCall {
                            call_id: "c1".into(),
                            tool_name: "ReadFile".into(),
                            arguments_json: format!(r#"{{"path":"{path_str}"}}"#),
                        }],
                        usage: None,
                        stop_reason: None,
                        response_id: None,
                        id: None,
                        created_at: Utc::now(),
                    }),
                    HistoryEvent::message(ac_model::Message::ToolResult {
                        call_id: "c1".into(),
                        tool_name: "ReadFile".into(),
                        status: ac_model::ToolStatus::Success,
                        output_text: "hello".into(),
                        parts: Vec::new(),
                        ui_extra: None,
                        id: None,
                        created_at: Utc::now(),
                    }),
                ],
            )
            .unwrap();

        let loaded = store.load(session.id).unwrap();
        assert!(loaded.file_tracker.check_unmodified(&file, "hello").is_ok());
        assert!(loaded.file_tracker.check_unmodified(&file, "tampered").is_err());
    }

    #[test]
    fn load_reconstructs_todo_context_from_the_latest_todo_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf());
        let mut session = store.create("untitled", "mock-model").unwrap();
        store
            .append_history(
                &mut session,
                vec![
                    HistoryEvent::message(ac_model::Message::Assistant {
                        parts: vec![ac_model::Part::ToolCall {
                            call_id: "c1".into(),
                            tool_name: "TodoWrite".into(),
                            arguments_json: r#"{"items":[{"id":"1","content":"ship it","status":"pending"}]}"#.into(),
                        }],
                        usage: None,
                        stop_reason: None,
                        response_id: None,
                        id: None,
                        created_at: Utc::now(),
                    }),
                    HistoryEvent::message(ac_model::Message::ToolResult {
                        call_id: "c1".into(),
                        tool_name: "TodoWrite".into(),
                        status: ac_model::ToolStatus::Success,
                        output_text: "todo list updated (1 item(s))".into(),
                        parts: Vec::new(),
                        ui_extra: None,
                        id: None,
                        created_at: Utc::now(),
                    }),
                ],
            )
            .unwrap();

        let loaded = store.load(session.id).unwrap();
        let todos = loaded.todo_context.lock().unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].content, "ship it");
    }
}
