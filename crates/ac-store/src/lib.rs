// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod history;
pub mod replay;
pub mod session;
pub mod store;

pub use history::{BacktrackEntry, CodecError, CompactionEntry, HistoryEvent, StreamErrorItem, TaskMetadataItem};
pub use replay::{replay_session, to_replay_events, ReplayEvent, ToolResultStatus};
pub use session::Session;
pub use store::{SessionStore, SessionSummary, StoreError};
