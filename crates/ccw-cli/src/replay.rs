// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `ccw replay`: feed a captured event stream through the engine offline
//!
//! Each input line is one wire envelope. Blank lines are skipped and lines
//! that fail to decode are counted and logged, never fatal.

use anyhow::{ensure, Context, Result};
use ccw_classifier::ClassificationCache;
use ccw_config::EngineConfig;
use ccw_core::{EngineContext, PaneAllocator};
use ccw_domain_types::{Execution, PaneLayout};
use ccw_stream_contract::StreamEvent;
use clap::Args;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// JSONL file with one `{type, payload}` event per line
    #[arg(long)]
    pub file: PathBuf,

    /// Number of panes to distribute executions over (default: panes.count)
    #[arg(long)]
    pub panes: Option<usize>,

    /// Close an execution as the user would. `ID` closes it after the
    /// replay; `ID@N` closes it right after the N-th event.
    #[arg(long, value_name = "ID[@N]")]
    pub close: Vec<String>,
}

impl ReplayArgs {
    pub fn run(&self, mut config: EngineConfig) -> Result<()> {
        if let Some(panes) = self.panes {
            config.panes.count = panes;
        }
        ensure!(config.panes.count > 0, "at least one pane is required");

        let closes = self
            .close
            .iter()
            .map(|raw| raw.parse::<CloseRequest>())
            .collect::<Result<Vec<_>>>()?;

        let file = File::open(&self.file)
            .with_context(|| format!("Failed to open {}", self.file.display()))?;
        let context = EngineContext::new(config);
        let report = replay(BufReader::new(file), &context, &closes)?;

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(report.render(context.classifier()).as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

/// A user close, optionally scheduled after a given event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub execution_id: String,
    /// 1-based event index; `None` means after the whole replay
    pub after_event: Option<usize>,
}

impl FromStr for CloseRequest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Ids may contain `@` themselves; only a numeric suffix is an index
        let (id, after) = match s
            .rsplit_once('@')
            .filter(|(_, index)| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        {
            Some((id, index)) => {
                let index: usize = index
                    .parse()
                    .with_context(|| format!("invalid event index in --close {s}"))?;
                (id, Some(index))
            }
            None => (s, None),
        };
        ensure!(!id.is_empty(), "--close needs an execution id");
        Ok(Self {
            execution_id: id.to_string(),
            after_event: after,
        })
    }
}

#[derive(Debug)]
pub struct ReplayReport {
    pub events: usize,
    pub applied: usize,
    pub ignored: usize,
    pub decode_errors: usize,
    pub closed: Vec<String>,
    pub layout: PaneLayout,
    /// Executions still in the store, in creation order
    pub executions: Vec<Execution>,
}

pub fn replay<R: BufRead>(
    input: R,
    context: &EngineContext,
    closes: &[CloseRequest],
) -> Result<ReplayReport> {
    let pipeline = context.pipeline();
    let store = context.store();
    let (mut layout, mut allocator) = context.default_layout();

    let mut report = ReplayReport {
        events: 0,
        applied: 0,
        ignored: 0,
        decode_errors: 0,
        closed: Vec::new(),
        layout: PaneLayout::default(),
        executions: Vec::new(),
    };

    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        match StreamEvent::from_json_str(&line) {
            Ok(event) => {
                report.events += 1;
                if pipeline.apply(&event).is_applied() {
                    report.applied += 1;
                } else {
                    report.ignored += 1;
                }
            }
            Err(err) => {
                tracing::warn!(line = index + 1, error = %err, "Skipping undecodable event");
                report.decode_errors += 1;
                continue;
            }
        }

        // Tabs appear as executions appear, like a live view would place them
        allocator.allocate_from_store(&mut layout, store);
        let events_so_far = report.events;
        for close in closes.iter().filter(|c| c.after_event == Some(events_so_far)) {
            close_execution(context, &mut allocator, &mut layout, &close.execution_id, &mut report);
        }
    }

    for close in closes.iter().filter(|c| c.after_event.is_none()) {
        close_execution(context, &mut allocator, &mut layout, &close.execution_id, &mut report);
    }

    report.layout = layout;
    report.executions = store.snapshot();
    Ok(report)
}

fn close_execution(
    context: &EngineContext,
    allocator: &mut PaneAllocator,
    layout: &mut PaneLayout,
    execution_id: &str,
    report: &mut ReplayReport,
) {
    context.store().close_execution(execution_id);
    allocator.close_tab(layout, execution_id);
    if !report.closed.iter().any(|id| id == execution_id) {
        report.closed.push(execution_id.to_string());
    }
}

impl ReplayReport {
    pub fn execution(&self, id: &str) -> Option<&Execution> {
        self.executions.iter().find(|e| e.id == id)
    }

    /// Panes with their tabs and every output line annotated with its
    /// classification
    pub fn render(&self, classifier: &ClassificationCache) -> String {
        let mut out = String::new();
        for pane in &self.layout.panes {
            let _ = writeln!(out, "{} ({} tabs)", pane.id.as_str(), pane.tabs.len());
            for tab in &pane.tabs {
                let Some(execution) = self.execution(&tab.execution_id) else {
                    continue;
                };
                let _ = writeln!(out, "  [{}] {} {}", tab.label, execution.id, execution.status);
                for line in execution.output() {
                    let result = classifier.classify(&line.content);
                    let _ = write!(out, "    {:<9}{}", line.output_type.to_string(), line.content);
                    match (&result.heuristic, result.is_json, &result.error) {
                        (Some(heuristic), true, _) => match result.recovery {
                            Some(recovery) => {
                                let _ = write!(out, "  <{heuristic}, recovered: {recovery}>");
                            }
                            None => {
                                let _ = write!(out, "  <{heuristic}>");
                            }
                        },
                        (_, false, Some(error)) => {
                            let _ = write!(out, "  <invalid: {error}>");
                        }
                        _ => {}
                    }
                    out.push('\n');
                }
            }
        }
        let _ = writeln!(
            out,
            "events={} applied={} ignored={} decode_errors={} closed={}",
            self.events,
            self.applied,
            self.ignored,
            self.decode_errors,
            self.closed.len()
        );
        out
    }
}
