// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::events::TodoItem;

/// Tracks the last-known content hash of every file a session has read or
/// written, so edits can detect external modification before clobbering
/// them (SPEC_FULL.md §8 scenario 5).
#[derive(Clone, Default)]
pub struct FileTracker {
    hashes: Arc<Mutex<HashMap<PathBuf, String>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StaleFileError {
    #[error("{path} was modified externally since it was last read; re-read it before editing")]
    Modified { path: String },
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &Path, content: &str) {
        let hash = hash_content(content);
        self.hashes.lock().unwrap().insert(path.to_path_buf(), hash);
    }

    /// Verify `path`'s on-disk content still matches the last recorded hash
    /// before an edit is allowed to proceed.
    pub fn check_unmodified(&self, path: &Path, on_disk_content: &str) -> Result<(), StaleFileError> {
        let current = hash_content(on_disk_content);
        let guard = self.hashes.lock().unwrap();
        match guard.get(path) {
            Some(recorded) if recorded != &current => Err(StaleFileError::Modified {
                path: path.display().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// What a `task`-style tool asks the sub-agent manager to run.
#[derive(Debug, Clone)]
pub struct SubTaskRequest {
    pub prompt: String,
    pub output_schema: Option<Value>,
}

/// What the sub-agent manager hands back to the calling tool.
#[derive(Debug, Clone)]
pub struct SubTaskResult {
    pub task_result: String,
    pub structured_output: Option<Value>,
    pub session_id: String,
    pub error: Option<String>,
}

pub type RunSubtaskFn = Arc<dyn Fn(SubTaskRequest) -> BoxFuture<'static, SubTaskResult> + Send + Sync>;
pub type RequestInteractionFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;
/// Queues a jump back to an earlier checkpoint; `Err` carries why the
/// request was refused (unknown checkpoint id, or target inside a region
/// that has since been compacted away).
pub type TriggerBacktrackFn = Arc<dyn Fn(u64, String) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Everything a tool invocation needs beyond its own arguments. Constructed
/// once per task and shared (via `Arc`/clone) across every tool call in
/// that task.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub file_tracker: FileTracker,
    pub todo_context: Arc<Mutex<Vec<TodoItem>>>,
    pub shell_timeout_secs: u64,
    pub tool_output_char_cap: usize,
    pub tool_output_head_chars: usize,
    pub tool_output_tail_chars: usize,
    pub side_files_dir: PathBuf,
    /// Present only for top-level tasks; sub-agents cannot spawn further
    /// sub-agents past the configured nesting limit (caller enforces depth).
    pub run_subtask: Option<RunSubtaskFn>,
    /// Populated for both top-level and sub-agent tasks; `None` only in test
    /// contexts that never exercise interactive tools.
    pub request_user_interaction: Option<RequestInteractionFn>,
    /// Present only where checkpoints are taken; sub-agents don't take
    /// checkpoints of their own and so have nothing to backtrack to.
    pub trigger_backtrack: Option<TriggerBacktrackFn>,
}

impl ToolContext {
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            session_id: "test-session".into(),
            file_tracker: FileTracker::new(),
            todo_context: Arc::new(Mutex::new(Vec::new())),
            shell_timeout_secs: 120,
            tool_output_char_cap: 16_000,
            tool_output_head_chars: 4_000,
            tool_output_tail_chars: 2_000,
            side_files_dir: std::env::temp_dir(),
            run_subtask: None,
            request_user_interaction: None,
            trigger_backtrack: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_tracker_allows_edit_when_unmodified() {
        let tracker = FileTracker::new();
        let path = PathBuf::from("/tmp/a.md");
        tracker.record(&path, "hello");
        assert!(tracker.check_unmodified(&path, "hello").is_ok());
    }

    #[test]
    fn file_tracker_rejects_edit_after_external_modification() {
        let tracker = FileTracker::new();
        let path = PathBuf::from("/tmp/a.md");
        tracker.record(&path, "hello");
        let err = tracker.check_unmodified(&path, "hello, modified").unwrap_err();
        assert!(matches!(err, StaleFileError::Modified { .. }));
    }

    #[test]
    fn file_tracker_allows_edit_of_never_recorded_file() {
        let tracker = FileTracker::new();
        let path = PathBuf::from("/tmp/never-read.md");
        assert!(tracker.check_unmodified(&path, "anything").is_ok());
    }
}
