// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use ac_core::{CoreEventKind, Operation, OperationOutcome, Orchestrator};

/// Reads one line of stdin per round, submits it as a `UserInput` operation,
/// and streams the resulting events to stdout as plain text. Exits when
/// stdin is closed. Mirrors the teacher's CI runner, which deliberately
/// avoids TUI escape codes so the output stays pipeable.
pub async fn run(orchestrator: Arc<Orchestrator>, session_id: Option<Uuid>, title: String, mut events: mpsc::Receiver<ac_core::CoreEvent>) -> anyhow::Result<()> {
    let session_id = match orchestrator.dispatch(Operation::InitAgent { session_id, title }).await? {
        OperationOutcome::SessionReady { session_id } => session_id,
        _ => unreachable!("InitAgent always returns SessionReady"),
    };
    println!("# session {session_id}");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while let Some(line) = lines.next().transpose()? {
        let text = line.trim().to_string();
        if text.is_empty() {
            continue;
        }

        let op_id = match orchestrator.dispatch(Operation::UserInput { session_id, text, images: Vec::new() }).await {
            Ok(OperationOutcome::TaskStarted { op_id }) => op_id,
            Ok(_) => unreachable!("UserInput always returns TaskStarted"),
            Err(e) => {
                println!("## error\n{e}");
                continue;
            }
        };

        render_until_finished(&mut events, op_id).await;

        match orchestrator.wait_for(op_id).await {
            Some(Ok(result)) => {
                if let Some(structured) = result.structured_output {
                    println!("## result (structured)\n{}", serde_json::to_string_pretty(&structured)?);
                } else {
                    println!("## result\n{}", result.task_result);
                }
            }
            Some(Err(e)) => println!("## error\n{e}"),
            None => {}
        }
        io::stdout().flush()?;
    }

    Ok(())
}

/// Drains events for this session until a terminal event (`TaskFinish` or
/// `Error`) is observed, rendering each as a line of plain text.
async fn render_until_finished(events: &mut mpsc::Receiver<ac_core::CoreEvent>, _op_id: Uuid) {
    while let Some(event) = events.recv().await {
        let done = matches!(event.kind, CoreEventKind::TaskFinish { .. } | CoreEventKind::Error(_));
        render_event(&event.kind);
        if done {
            break;
        }
    }
}

fn render_event(kind: &CoreEventKind) {
    match kind {
        CoreEventKind::AssistantTextDelta(text) => print!("{text}"),
        CoreEventKind::AssistantTextEnd => println!(),
        CoreEventKind::ToolCallStart { call_id, tool_name } => println!("## tool call {tool_name} ({call_id})"),
        CoreEventKind::ToolResult { call_id, status, .. } => println!("## tool result {call_id}: {status:?}"),
        CoreEventKind::CompactionStart => println!("## compacting session"),
        CoreEventKind::CompactionEnd { tokens_before, tokens_after } => println!("## compacted {tokens_before} -> {tokens_after} tokens"),
        CoreEventKind::Backtrack { checkpoint_id, .. } => println!("## backtrack to checkpoint {checkpoint_id}"),
        CoreEventKind::Error(msg) => println!("## error\n{msg}"),
        _ => {}
    }
    let _ = io::stdout().flush();
}
