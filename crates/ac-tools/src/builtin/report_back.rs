// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use ac_model::Message;

use crate::context::ToolContext;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Sentinel tool injected only into sub-agent registries. Calling it ends
/// the sub-agent's task loop; its argument becomes the sub-agent's
/// structured result. It is never registered in a top-level session's
/// registry.
///
/// `schema` is the caller-supplied output shape the sub-agent was asked to
/// produce; it's advisory here (schema conformance is the model's job, not
/// this tool's) but is surfaced back to the task runner alongside the
/// payload so a malformed result can be reported rather than silently
/// accepted.
pub struct ReportBackTool {
    schema: Option<Value>,
    result: Arc<Mutex<Option<Value>>>,
}

impl ReportBackTool {
    pub fn new(schema: Option<Value>) -> (Self, Arc<Mutex<Option<Value>>>) {
        let result = Arc::new(Mutex::new(None));
        (Self { schema, result: result.clone() }, result)
    }
}

#[async_trait]
impl Tool for ReportBackTool {
    fn name(&self) -> &str {
        "report_back"
    }

    fn description(&self) -> &str {
        "Call this exactly once, with your final answer, to end the task."
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": { "summary": { "type": "string" } },
                "required": ["summary"]
            })
        })
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> Message {
        *self.result.lock().unwrap() = Some(call.args.clone());
        ToolOutput::ok(call, "result recorded")
    }
}
