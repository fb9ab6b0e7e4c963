// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Ingestion Pipeline
//!
//! Translates each inbound [`StreamEvent`] into store mutations. The
//! pipeline itself is synchronous and stateless; the process-wide single
//! subscriber that feeds it lives in [`crate::service`].
//!
//! Every handler checks the closed-by-user tombstone first. A dismissed
//! execution is never recreated or extended by later server traffic.

use crate::store::ExecutionStore;
use ccw_domain_types::{ExecutionPatch, ExecutionStatus, OutputLine, OutputType};
use ccw_stream_contract::{
    ActiveExecution, ExecutionCompleted, ExecutionFailed, ExecutionOutput, ExecutionStarted,
    StreamEvent,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// What happened to one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The store was mutated
    Applied,
    /// The execution was dismissed by the user
    IgnoredClosed,
    /// No record exists for the referenced execution
    IgnoredUnknown,
    /// A terminal event for an execution that already ended
    IgnoredTerminal,
}

impl IngestOutcome {
    pub fn is_applied(self) -> bool {
        self == IngestOutcome::Applied
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped_closed: usize,
}

#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    store: Arc<ExecutionStore>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<ExecutionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    pub fn apply(&self, event: &StreamEvent) -> IngestOutcome {
        let id = event.execution_id();
        if self.store.is_closed_by_user(id) {
            trace!(execution_id = id, event = event.event_type(), "ignoring event for closed execution");
            return IngestOutcome::IgnoredClosed;
        }

        match event {
            StreamEvent::Started(started) => self.on_started(started),
            StreamEvent::Output(output) => self.on_output(output),
            StreamEvent::Completed(completed) => self.on_completed(completed),
            StreamEvent::Error(failed) => self.on_error(failed),
        }
    }

    fn on_started(&self, started: &ExecutionStarted) -> IngestOutcome {
        let summary = format!("Execution started: {} ({})", started.tool, started.mode);
        let patch = ExecutionPatch::new()
            .tool(started.tool.clone())
            .mode(started.mode)
            .status(ExecutionStatus::Running)
            .start_time(started.timestamp)
            .line(OutputLine::system(summary, started.timestamp));

        self.store.upsert_execution(&started.execution_id, patch);
        self.store.focus_if_unset(&started.execution_id);
        debug!(execution_id = %started.execution_id, tool = %started.tool, "execution started");
        IngestOutcome::Applied
    }

    fn on_output(&self, output: &ExecutionOutput) -> IngestOutcome {
        if !self.store.contains(&output.execution_id) {
            trace!(execution_id = %output.execution_id, "dropping output for unknown execution");
            return IngestOutcome::IgnoredUnknown;
        }

        for line in output_lines(output) {
            // One append per line keeps the log in arrival order
            self.store.add_output(&output.execution_id, line);
        }
        IngestOutcome::Applied
    }

    fn on_completed(&self, completed: &ExecutionCompleted) -> IngestOutcome {
        let id = &completed.execution_id;
        match self.store.with_execution(id, |e| e.is_terminal()) {
            None => return IngestOutcome::IgnoredUnknown,
            Some(true) => return IngestOutcome::IgnoredTerminal,
            Some(false) => {}
        }

        let status = if completed.success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Error
        };
        let patch = ExecutionPatch::new()
            .status(status)
            .end_time(completed.timestamp)
            .line(OutputLine::system(
                completion_summary(completed.success, completed.duration),
                completed.timestamp,
            ));
        self.store.upsert_execution(id, patch);
        debug!(execution_id = %id, %status, "execution finished");
        IngestOutcome::Applied
    }

    fn on_error(&self, failed: &ExecutionFailed) -> IngestOutcome {
        let id = &failed.execution_id;
        match self.store.with_execution(id, |e| e.is_terminal()) {
            None => return IngestOutcome::IgnoredUnknown,
            Some(true) => return IngestOutcome::IgnoredTerminal,
            Some(false) => {}
        }

        let message = failed
            .error
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or("Unknown error");
        let patch = ExecutionPatch::new()
            .status(ExecutionStatus::Error)
            .end_time(failed.timestamp)
            .line(OutputLine::stderr(message, failed.timestamp));
        self.store.upsert_execution(id, patch);
        debug!(execution_id = %id, error = message, "execution errored");
        IngestOutcome::Applied
    }

    /// Fold a server-side list of active executions into the store.
    ///
    /// Tombstoned ids are skipped. Unknown ids are created with their
    /// buffered output. Known ids only take the reported status, since
    /// their log is already being built from live events.
    pub fn resync(&self, executions: &[ActiveExecution]) -> ResyncSummary {
        let now = Utc::now();
        let mut summary = ResyncSummary::default();

        for active in executions {
            if self.store.is_closed_by_user(&active.id) {
                summary.skipped_closed += 1;
                continue;
            }

            let status = active.parsed_status();
            if self.store.contains(&active.id) {
                let mut patch = ExecutionPatch::new().status(status);
                if status.is_terminal() {
                    patch = patch.end_time(now);
                }
                self.store.upsert_execution(&active.id, patch);
                summary.updated += 1;
                continue;
            }

            let mut patch = ExecutionPatch::new()
                .mode(active.parsed_mode())
                .status(status)
                .start_time(active.parsed_start_time().unwrap_or(now))
                .lines(
                    split_lines(active.output.as_deref().unwrap_or_default())
                        .into_iter()
                        .filter(|l| !l.is_empty())
                        .map(|l| OutputLine::stdout(l, now)),
                );
            if let Some(tool) = active.tool.as_deref().filter(|t| !t.is_empty()) {
                patch = patch.tool(tool);
            }
            if status.is_terminal() {
                patch = patch.end_time(now);
            }
            self.store.upsert_execution(&active.id, patch);
            summary.created += 1;
        }

        debug!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped_closed,
            "resynchronized active executions"
        );
        summary
    }
}

pub fn completion_summary(success: bool, duration_ms: Option<u64>) -> String {
    let base = if success {
        "Execution completed successfully"
    } else {
        "Execution failed"
    };
    match duration_ms {
        Some(ms) => format!("{base} ({:.1}s)", ms as f64 / 1000.0),
        None => base.to_string(),
    }
}

/// Lines produced by one OUTPUT chunk.
///
/// Empty lines inside a multi-line chunk are dropped; a chunk that is
/// empty as a whole still produces one empty line.
pub fn output_lines(output: &ExecutionOutput) -> Vec<OutputLine> {
    let wire_type = output
        .unit
        .as_ref()
        .and_then(|u| u.unit_type.as_deref())
        .unwrap_or(&output.chunk_type);
    let line_type = OutputType::from_wire(wire_type);
    let content = chunk_content(output, wire_type);

    let at = output.received_at;

    if content.is_empty() {
        return vec![OutputLine::new(line_type, "", at)];
    }
    split_lines(&content)
        .into_iter()
        .filter(|l| !l.is_empty())
        .map(|l| OutputLine::new(line_type, l, at))
        .collect()
}

fn split_lines(content: &str) -> Vec<&str> {
    content.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
}

fn chunk_content(output: &ExecutionOutput, wire_type: &str) -> String {
    let tool_kind = ToolRecordKind::from_wire(wire_type);
    match (&output.unit, tool_kind) {
        (Some(unit), Some(kind)) => render_tool_record(kind, &unit.content),
        (Some(unit), None) if output.data.is_null() => stringify(&unit.content),
        _ => stringify(&output.data),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolRecordKind {
    Call,
    Result,
}

impl ToolRecordKind {
    fn from_wire(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tool_call" | "tool_use" => Some(ToolRecordKind::Call),
            "tool_result" => Some(ToolRecordKind::Result),
            _ => None,
        }
    }
}

fn first_field<'a>(content: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| content.get(*k).filter(|v| !v.is_null()))
}

/// Render a structured tool record as the `[Tool]` / `[Tool Result]`
/// shorthand the classifier recognizes
fn render_tool_record(kind: ToolRecordKind, content: &Value) -> String {
    if let Value::String(s) = content {
        return s.clone();
    }

    match kind {
        ToolRecordKind::Call => {
            let name = first_field(content, &["toolName", "name", "tool"])
                .map(stringify)
                .unwrap_or_else(|| "unknown".to_string());
            let params = first_field(content, &["parameters", "input", "args", "arguments"])
                .map(stringify)
                .unwrap_or_else(|| "{}".to_string());
            format!("[Tool] {name}({params})")
        }
        ToolRecordKind::Result => {
            let status = first_field(content, &["status"])
                .map(stringify)
                .unwrap_or_else(|| "success".to_string());
            let output = first_field(content, &["output", "result", "content"])
                .map(stringify)
                .unwrap_or_default();
            format!("[Tool Result] {status}: {output}")
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
