// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;

use ac_store::HistoryEvent;

/// A requested jump back to an earlier checkpoint, queued by a tool (or the
/// orchestrator) for the task loop to apply at its next iteration boundary.
#[derive(Debug, Clone)]
pub struct BacktrackRequest {
    pub checkpoint_index: usize,
    pub note: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BacktrackError {
    #[error("checkpoint {0} is inside a compacted region and can no longer be restored")]
    InsideCompactedRegion(usize),
    #[error("no recorded checkpoint with id {0}")]
    UnknownCheckpoint(u64),
}

/// Tracks at most one pending backtrack request per task. Rejects any
/// target at or before the latest `CompactionEntry`'s `end_index`, since
/// that history no longer exists in a form the loop can restore (Open
/// Question 3).
#[derive(Default)]
pub struct BacktrackManager {
    pending: Mutex<Option<BacktrackRequest>>,
    checkpoints: Mutex<HashMap<u64, usize>>,
    compaction_boundary: Mutex<Option<usize>>,
}

impl BacktrackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, history: &[HistoryEvent], checkpoint_index: usize, note: impl Into<String>) -> Result<(), BacktrackError> {
        if let Some(boundary) = latest_compaction_boundary(history) {
            if checkpoint_index <= boundary {
                return Err(BacktrackError::InsideCompactedRegion(checkpoint_index));
            }
        }
        *self.pending.lock().unwrap() = Some(BacktrackRequest { checkpoint_index, note: note.into() });
        Ok(())
    }

    /// Records that checkpoint `id`'s note lives at `history_index`, so a
    /// later [`Self::request_by_checkpoint`] call (from a tool, which only
    /// knows the id a checkpoint was announced under) can resolve it.
    pub fn record_checkpoint(&self, id: u64, history_index: usize) {
        self.checkpoints.lock().unwrap().insert(id, history_index);
    }

    /// Records the task loop's latest compaction boundary, mirroring what
    /// [`request`](Self::request) would otherwise scan `history` for.
    pub fn record_compaction(&self, end_index: usize) {
        *self.compaction_boundary.lock().unwrap() = Some(end_index);
    }

    /// Same as [`request`](Self::request), but takes a checkpoint id
    /// (as surfaced to the model) instead of a raw history index.
    pub fn request_by_checkpoint(&self, checkpoint_id: u64, note: impl Into<String>) -> Result<(), BacktrackError> {
        let checkpoint_index = *self
            .checkpoints
            .lock()
            .unwrap()
            .get(&checkpoint_id)
            .ok_or(BacktrackError::UnknownCheckpoint(checkpoint_id))?;
        if let Some(boundary) = *self.compaction_boundary.lock().unwrap() {
            if checkpoint_index <= boundary {
                return Err(BacktrackError::InsideCompactedRegion(checkpoint_index));
            }
        }
        *self.pending.lock().unwrap() = Some(BacktrackRequest { checkpoint_index, note: note.into() });
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    pub fn take_pending(&self) -> Option<BacktrackRequest> {
        self.pending.lock().unwrap().take()
    }
}

fn latest_compaction_boundary(history: &[HistoryEvent]) -> Option<usize> {
    history.iter().rev().find_map(|e| match e {
        HistoryEvent::Compaction(entry) => Some(entry.end_index),
        _ => None,
    })
}
