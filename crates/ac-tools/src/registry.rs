// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use ac_model::{Message, ToolSchema};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Registers every available [`Tool`] by name and drives batched,
/// concurrency-aware execution of a turn's tool calls.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Run a turn's tool calls, batching consecutive `parallel_safe` calls
    /// together and giving every other call its own batch, while preserving
    /// the original call order in the returned results (SPEC_FULL.md §4.C).
    #[instrument(skip(self, calls, ctx, cancelled))]
    pub async fn execute_batch(
        &self,
        calls: Vec<ToolCall>,
        ctx: &ToolContext,
        cancelled: watch::Receiver<bool>,
    ) -> Vec<Message> {
        let total = calls.len();
        let mut batches: Vec<Vec<(usize, ToolCall)>> = Vec::new();
        let mut current: Vec<(usize, ToolCall)> = Vec::new();

        for (idx, call) in calls.into_iter().enumerate() {
            let parallel_safe = self.tools.get(&call.name).map(|t| t.parallel_safe()).unwrap_or(false);
            if parallel_safe {
                current.push((idx, call));
            } else {
                if !current.is_empty() {
                    batches.push(std::mem::take(&mut current));
                }
                batches.push(vec![(idx, call)]);
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }

        let mut results: Vec<Option<Message>> = (0..total).map(|_| None).collect();
        for batch in batches {
            let futures = batch.into_iter().map(|(idx, call)| {
                let ctx = ctx.clone();
                let cancelled = cancelled.clone();
                let registry = self.clone();
                async move {
                    let msg = registry.execute_one(call, &ctx, cancelled).await;
                    (idx, msg)
                }
            });
            for (idx, msg) in futures::future::join_all(futures).await {
                results[idx] = Some(msg);
            }
        }

        results.into_iter().map(|m| m.expect("every call index is filled exactly once")).collect()
    }

    async fn execute_one(&self, call: ToolCall, ctx: &ToolContext, mut cancelled: watch::Receiver<bool>) -> Message {
        if *cancelled.borrow() {
            return ToolOutput::aborted(&call);
        }
        let Some(tool) = self.tools.get(&call.name).cloned() else {
            return ToolOutput::err(&call, format!("unknown tool: {}", call.name));
        };
        tokio::select! {
            biased;
            _ = cancelled.changed() => ToolOutput::aborted(&call),
            result = tool.execute(&call, ctx) => result,
        }
    }
}

/// Parse a tool call's raw JSON argument string. Parse failures never raise
/// — they become an error `ToolResult` the model can recover from.
pub fn parse_call(call_id: &str, tool_name: &str, arguments_json: &str) -> ToolCall {
    let args: Value = serde_json::from_str(arguments_json).unwrap_or_else(|e| {
        debug!(call_id, tool_name, error = %e, "malformed tool-call arguments, using null");
        Value::Null
    });
    ToolCall { id: call_id.to_string(), name: tool_name.to_string(), args }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ac_model::ToolStatus;

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "echo" }
        fn parameters_schema(&self) -> Value { serde_json::json!({}) }
        fn parallel_safe(&self) -> bool { true }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> Message {
            ToolOutput::ok(call, "echoed")
        }
    }

    struct WriteTool;
    #[async_trait]
    impl Tool for WriteTool {
        fn name(&self) -> &str { "write" }
        fn description(&self) -> &str { "write" }
        fn parameters_schema(&self) -> Value { serde_json::json!({}) }
        fn parallel_safe(&self) -> bool { false }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> Message {
            ToolOutput::ok(call, "written")
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(EchoTool);
        r.register(WriteTool);
        r
    }

    #[tokio::test]
    async fn execute_batch_preserves_call_order() {
        let r = registry();
        let ctx = ToolContext::for_tests();
        let (_tx, rx) = watch::channel(false);
        let calls = vec![
            ToolCall { id: "1".into(), name: "echo".into(), args: Value::Null },
            ToolCall { id: "2".into(), name: "write".into(), args: Value::Null },
            ToolCall { id: "3".into(), name: "echo".into(), args: Value::Null },
        ];
        let results = r.execute_batch(calls, &ctx, rx).await;
        let ids: Vec<&str> = results.iter().map(|m| match m {
            Message::ToolResult { call_id, .. } => call_id.as_str(),
            _ => unreachable!(),
        }).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_not_panic() {
        let r = registry();
        let ctx = ToolContext::for_tests();
        let (_tx, rx) = watch::channel(false);
        let calls = vec![ToolCall { id: "1".into(), name: "nonexistent".into(), args: Value::Null }];
        let results = r.execute_batch(calls, &ctx, rx).await;
        match &results[0] {
            Message::ToolResult { status, .. } => assert_eq!(*status, ToolStatus::Error),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn cancelled_calls_return_aborted_status() {
        let r = registry();
        let ctx = ToolContext::for_tests();
        let (tx, rx) = watch::channel(true);
        drop(tx);
        let calls = vec![ToolCall { id: "1".into(), name: "echo".into(), args: Value::Null }];
        let results = r.execute_batch(calls, &ctx, rx).await;
        match &results[0] {
            Message::ToolResult { status, .. } => assert_eq!(*status, ToolStatus::Aborted),
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_call_falls_back_to_null_on_malformed_json() {
        let call = parse_call("c1", "echo", "{not json");
        assert!(call.args.is_null());
    }
}
