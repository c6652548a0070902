// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ac_tools::{FileTracker, TodoItem};

use crate::history::HistoryEvent;

/// In-memory session state. Mutated only through [`crate::store::SessionStore`]
/// so every mutation is paired with a durable write.
#[derive(Clone)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: String,
    pub conversation_history: Vec<HistoryEvent>,
    pub next_checkpoint_id: u64,
    pub file_tracker: FileTracker,
    pub todo_context: Arc<Mutex<Vec<TodoItem>>>,
}

impl Session {
    pub fn new(id: Uuid, title: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            created_at: now,
            updated_at: now,
            model: model.into(),
            conversation_history: Vec::new(),
            next_checkpoint_id: 0,
            file_tracker: FileTracker::new(),
            todo_context: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn messages_count(&self) -> usize {
        self.conversation_history.iter().filter(|e| e.as_message().is_some()).count()
    }

    pub fn user_messages_count(&self) -> usize {
        self.conversation_history.iter().filter(|e| matches!(e, HistoryEvent::UserMessage(_))).count()
    }

    /// Allocate and return the next checkpoint id, used by the backtrack
    /// manager to tag resumable points in the history.
    pub fn take_checkpoint(&mut self) -> u64 {
        let id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        id
    }
}
