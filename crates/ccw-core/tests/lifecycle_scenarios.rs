// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use ccw_core::{ExecutionStore, IngestOutcome, IngestionPipeline};
use ccw_domain_types::{ExecutionMode, ExecutionPatch, ExecutionStatus, OutputLine, OutputType};
use ccw_stream_contract::{
    ActiveExecution, ExecutionCompleted, ExecutionFailed, ExecutionOutput, ExecutionStarted,
    StreamEvent,
};
use chrono::Utc;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn pipeline() -> IngestionPipeline {
    IngestionPipeline::new(Arc::new(ExecutionStore::default()))
}

fn started(id: &str) -> StreamEvent {
    StreamEvent::Started(ExecutionStarted {
        execution_id: id.into(),
        tool: "gemini".into(),
        mode: ExecutionMode::Analysis,
        timestamp: Utc::now(),
    })
}

fn output(id: &str, data: Value) -> StreamEvent {
    StreamEvent::Output(ExecutionOutput {
        execution_id: id.into(),
        chunk_type: "stdout".into(),
        data,
        unit: None,
        received_at: Utc::now(),
    })
}

fn completed(id: &str, success: bool) -> StreamEvent {
    StreamEvent::Completed(ExecutionCompleted {
        execution_id: id.into(),
        success,
        duration: Some(2500),
        timestamp: Utc::now(),
    })
}

fn errored(id: &str, error: Option<&str>) -> StreamEvent {
    StreamEvent::Error(ExecutionFailed {
        execution_id: id.into(),
        error: error.map(str::to_string),
        timestamp: Utc::now(),
    })
}

#[test]
fn test_full_lifecycle() {
    let pipeline = pipeline();
    let store = pipeline.store();

    assert_eq!(pipeline.apply(&started("execA")), IngestOutcome::Applied);
    let exec = store.get("execA").unwrap();
    assert_eq!(exec.status, ExecutionStatus::Running);
    assert_eq!(exec.output().len(), 1);
    assert_eq!(exec.output()[0].output_type, OutputType::System);
    assert_eq!(store.current_execution().as_deref(), Some("execA"));

    pipeline.apply(&output("execA", json!("line1\nline2")));
    assert_eq!(store.get("execA").unwrap().output().len(), 3);

    pipeline.apply(&completed("execA", true));
    let exec = store.get("execA").unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.output().len(), 4);
    assert!(exec.end_time.is_some());
    assert_eq!(exec.output()[3].content, "Execution completed successfully (2.5s)");
}

#[test]
fn test_stale_output_after_close() {
    let pipeline = pipeline();
    let store = pipeline.store();

    pipeline.apply(&started("execB"));
    pipeline.apply(&output("execB", json!("working")));
    store.remove_execution("execB");
    store.mark_closed_by_user("execB");

    assert_eq!(pipeline.apply(&output("execB", json!("late"))), IngestOutcome::IgnoredClosed);
    assert!(store.get("execB").is_none());
}

#[test]
fn test_closed_execution_ignores_every_event_kind() {
    let pipeline = pipeline();
    let store = pipeline.store();
    store.mark_closed_by_user("gone");

    for event in [
        started("gone"),
        output("gone", json!("x")),
        completed("gone", true),
        errored("gone", Some("boom")),
    ] {
        assert_eq!(pipeline.apply(&event), IngestOutcome::IgnoredClosed);
    }
    assert!(store.is_empty());
}

#[test]
fn test_second_view_does_not_change_focus() {
    let pipeline = pipeline();
    pipeline.apply(&started("first"));
    pipeline.apply(&started("second"));
    assert_eq!(pipeline.store().current_execution().as_deref(), Some("first"));
}

#[test]
fn test_failed_completion_sets_error() {
    let pipeline = pipeline();
    pipeline.apply(&started("e"));
    pipeline.apply(&completed("e", false));

    let exec = pipeline.store().get("e").unwrap();
    assert_eq!(exec.status, ExecutionStatus::Error);
    assert_eq!(exec.output().last().unwrap().content, "Execution failed (2.5s)");
}

#[test]
fn test_error_event_appends_stderr_line() {
    let pipeline = pipeline();
    pipeline.apply(&started("e"));
    pipeline.apply(&errored("e", None));

    let exec = pipeline.store().get("e").unwrap();
    assert_eq!(exec.status, ExecutionStatus::Error);
    let last = exec.output().last().unwrap();
    assert_eq!(last.output_type, OutputType::Stderr);
    assert_eq!(last.content, "Unknown error");
}

#[test]
fn test_terminal_events_for_unknown_or_finished_executions() {
    let pipeline = pipeline();
    assert_eq!(pipeline.apply(&completed("nobody", true)), IngestOutcome::IgnoredUnknown);
    assert_eq!(pipeline.apply(&errored("nobody", Some("x"))), IngestOutcome::IgnoredUnknown);
    assert_eq!(pipeline.apply(&output("nobody", json!("x"))), IngestOutcome::IgnoredUnknown);
    assert!(pipeline.store().is_empty());

    pipeline.apply(&started("done"));
    pipeline.apply(&completed("done", true));
    assert_eq!(pipeline.apply(&errored("done", Some("late"))), IngestOutcome::IgnoredTerminal);

    let exec = pipeline.store().get("done").unwrap();
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.output().len(), 2);
}

#[test]
fn test_resync_creates_updates_and_skips_closed() {
    let pipeline = pipeline();
    let store = pipeline.store();
    pipeline.apply(&started("live"));
    store.mark_closed_by_user("dismissed");

    let mut fresh = ActiveExecution::new("fresh");
    fresh.tool = Some("codex".into());
    fresh.mode = Some("write".into());
    fresh.output = Some("first\n\nsecond".into());
    let mut live = ActiveExecution::new("live");
    live.status = Some("completed".into());
    let mut dismissed = ActiveExecution::new("dismissed");
    dismissed.output = Some("should not appear".into());

    let summary = pipeline.resync(&[fresh, live, dismissed]);
    assert_eq!((summary.created, summary.updated, summary.skipped_closed), (1, 1, 1));

    let fresh = store.get("fresh").unwrap();
    assert_eq!(fresh.tool, "codex");
    assert_eq!(fresh.mode, ExecutionMode::Write);
    let contents: Vec<&str> = fresh.output().iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);

    let live = store.get("live").unwrap();
    assert_eq!(live.status, ExecutionStatus::Completed);
    assert_eq!(live.output().len(), 1);
    assert!(!store.contains("dismissed"));
}

#[test]
fn test_upsert_twice_appends_twice() {
    let store = ExecutionStore::default();
    let now = Utc::now();
    store.upsert_execution("e", ExecutionPatch::new().line(OutputLine::system("base", now)));
    let patch = ExecutionPatch::new().line(OutputLine::stdout("p", now));
    store.upsert_execution("e", patch.clone());
    store.upsert_execution("e", patch);

    let exec = store.get("e").unwrap();
    let contents: Vec<&str> = exec.output().iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["base", "p", "p"]);
}

proptest! {
    #[test]
    fn test_add_output_preserves_call_order(lines in prop::collection::vec(".{0,20}", 0..40)) {
        let store = ExecutionStore::default();
        store.upsert_execution("e", ExecutionPatch::new());
        let now = Utc::now();

        for content in &lines {
            prop_assert!(store.add_output("e", OutputLine::stdout(content.clone(), now)));
        }

        let exec = store.get("e").unwrap();
        let stored: Vec<String> = exec.output().iter().map(|l| l.content.clone()).collect();
        prop_assert_eq!(stored, lines);
    }
}

#[test]
fn test_wrong_typed_fields_do_not_lose_the_execution() {
    let pipeline = pipeline();
    let store = pipeline.store();
    let frames = [
        r#"{"type":"CLI_EXECUTION_STARTED","payload":{"executionId":"odd","tool":7,"mode":3}}"#,
        r#"{"type":"CLI_OUTPUT","payload":{"executionId":"odd","chunkType":1,"unit":"text","data":"still here"}}"#,
        r#"{"type":"CLI_EXECUTION_COMPLETED","payload":{"executionId":"odd","success":"true"}}"#,
    ];

    for frame in frames {
        let event = StreamEvent::from_json_str(frame).unwrap();
        assert_eq!(pipeline.apply(&event), IngestOutcome::Applied, "{frame}");
    }

    let exec = store.get("odd").unwrap();
    assert_eq!(exec.tool, "cli");
    assert_eq!(exec.mode, ExecutionMode::Analysis);
    assert_eq!(exec.status, ExecutionStatus::Completed);
    let stdout: Vec<&str> = exec
        .output()
        .iter()
        .filter(|l| l.output_type == OutputType::Stdout)
        .map(|l| l.content.as_str())
        .collect();
    assert_eq!(stdout, vec!["still here"]);
}
