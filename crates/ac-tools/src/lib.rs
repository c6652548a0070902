// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod context;
pub mod events;
pub mod registry;
pub mod tool;
pub mod truncate;

pub use builtin::{
    BacktrackTool, EditFileTool, GlobTool, GrepTool, ReadFileTool, ReportBackTool, ShellTool, TaskTool, TodoWriteTool,
    WebFetchTool, WriteFileTool,
};
pub use context::{
    FileTracker, RequestInteractionFn, RunSubtaskFn, StaleFileError, SubTaskRequest, SubTaskResult, ToolContext,
    TriggerBacktrackFn,
};
pub use events::{TodoItem, ToolEvent};
pub use registry::{parse_call, ToolRegistry};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput};

use ac_config::ToolsConfig;

/// Build the registry a top-level session uses: every built-in tool except
/// `report_back`, which is only ever injected into a sub-agent's own
/// restricted registry.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ShellTool::new(config.shell_max_timeout_secs));
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(EditFileTool);
    registry.register(GlobTool);
    registry.register(GrepTool);
    registry.register(WebFetchTool::default());
    registry.register(TodoWriteTool);
    registry.register(TaskTool);
    registry.register(BacktrackTool);
    registry
}
