// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Execution Stream Store
//!
//! The store is the single source of truth for execution state. All
//! mutation goes through the operations defined here; readers get cloned
//! snapshots and a [`StoreChange`] notification feed.
//!
//! ## Invariants
//!
//! - An execution's output log only ever grows at the end.
//! - Once an execution reaches a terminal status, its `status` and
//!   `end_time` no longer change.
//! - The closed-by-user set is independent of the execution map: an id can
//!   be tombstoned whether or not a record for it exists.
//!
//! Lines from different executions carry no relative ordering guarantee.

use ccw_config::StoreConfig;
use ccw_domain_types::{Execution, ExecutionMode, ExecutionPatch, OutputLine};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Notification emitted after every successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Upserted {
        id: String,
        created: bool,
        appended: usize,
    },
    OutputAppended {
        id: String,
    },
    Removed {
        id: String,
    },
    ClosedByUser {
        id: String,
    },
    FocusChanged {
        id: Option<String>,
    },
}

impl StoreChange {
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            StoreChange::Upserted { id, .. }
            | StoreChange::OutputAppended { id }
            | StoreChange::Removed { id }
            | StoreChange::ClosedByUser { id } => Some(id),
            StoreChange::FocusChanged { id } => id.as_deref(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    executions: IndexMap<String, Execution>,
    closed_by_user: HashSet<String>,
    current: Option<String>,
}

pub struct ExecutionStore {
    state: RwLock<StoreState>,
    changes: broadcast::Sender<StoreChange>,
    default_tool: String,
    default_mode: ExecutionMode,
}

impl std::fmt::Debug for ExecutionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ExecutionStore")
            .field("executions", &state.executions.len())
            .field("closed_by_user", &state.closed_by_user.len())
            .field("current", &state.current)
            .finish()
    }
}

impl Default for ExecutionStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl ExecutionStore {
    pub fn new(config: &StoreConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_channel_capacity.max(1));
        Self {
            state: RwLock::new(StoreState::default()),
            changes,
            default_tool: config.default_tool.clone(),
            default_mode: config.default_mode,
        }
    }

    /// Receive a [`StoreChange`] for every mutation made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is the normal headless case
        let _ = self.changes.send(change);
    }

    /// Create the execution if absent, otherwise merge `patch` into it.
    ///
    /// `patch.output` is appended on every call; the store does not detect
    /// repeated content. Returns whether the record was created.
    pub fn upsert_execution(&self, id: &str, patch: ExecutionPatch) -> bool {
        let ExecutionPatch {
            tool,
            mode,
            status,
            start_time,
            end_time,
            output,
        } = patch;
        let appended = output.len();

        let created = {
            let mut state = self.state.write();
            let created = !state.executions.contains_key(id);
            let execution = state.executions.entry(id.to_string()).or_insert_with(|| {
                Execution::new(
                    id,
                    tool.clone().unwrap_or_else(|| self.default_tool.clone()),
                    mode.unwrap_or(self.default_mode),
                    start_time.unwrap_or_else(Utc::now),
                )
            });

            if !created {
                if let Some(tool) = tool {
                    execution.tool = tool;
                }
                if let Some(mode) = mode {
                    execution.mode = mode;
                }
                if let Some(start_time) = start_time {
                    execution.start_time = start_time;
                }
            }

            if execution.is_terminal() {
                if status.is_some_and(|s| s != execution.status) {
                    debug!(
                        execution_id = id,
                        current = %execution.status,
                        "ignoring status change on terminal execution"
                    );
                }
            } else {
                if let Some(status) = status {
                    execution.status = status;
                }
                if end_time.is_some() {
                    execution.end_time = end_time;
                }
            }

            execution.append(output);
            created
        };

        trace!(execution_id = id, created, appended, "upserted execution");
        self.notify(StoreChange::Upserted {
            id: id.to_string(),
            created,
            appended,
        });
        created
    }

    /// Append one line to an existing execution.
    ///
    /// Unknown ids are dropped silently: output may still be in flight for a
    /// tab that was already closed.
    pub fn add_output(&self, id: &str, line: OutputLine) -> bool {
        let appended = {
            let mut state = self.state.write();
            match state.executions.get_mut(id) {
                Some(execution) => {
                    execution.push(line);
                    true
                }
                None => false,
            }
        };

        if appended {
            self.notify(StoreChange::OutputAppended { id: id.to_string() });
        } else {
            trace!(execution_id = id, "dropping output for unknown execution");
        }
        appended
    }

    /// Delete the record entirely. Clears focus if it pointed at `id`.
    pub fn remove_execution(&self, id: &str) -> Option<Execution> {
        let (removed, focus_cleared) = {
            let mut state = self.state.write();
            let removed = state.executions.shift_remove(id);
            let focus_cleared = removed.is_some() && state.current.as_deref() == Some(id);
            if focus_cleared {
                state.current = None;
            }
            (removed, focus_cleared)
        };

        if removed.is_some() {
            debug!(execution_id = id, "removed execution");
            self.notify(StoreChange::Removed { id: id.to_string() });
        }
        if focus_cleared {
            self.notify(StoreChange::FocusChanged { id: None });
        }
        removed
    }

    /// Tombstone `id` whether or not a record exists for it
    pub fn mark_closed_by_user(&self, id: &str) {
        {
            let mut state = self.state.write();
            state.closed_by_user.insert(id.to_string());
            if let Some(execution) = state.executions.get_mut(id) {
                execution.closed_by_user = true;
            }
        }
        debug!(execution_id = id, "marked closed by user");
        self.notify(StoreChange::ClosedByUser { id: id.to_string() });
    }

    pub fn is_closed_by_user(&self, id: &str) -> bool {
        self.state.read().closed_by_user.contains(id)
    }

    /// The user "close tab" action: tombstone first, then remove
    pub fn close_execution(&self, id: &str) -> Option<Execution> {
        self.mark_closed_by_user(id);
        self.remove_execution(id)
    }

    /// Move the UI focus pointer. Has no effect on any log.
    pub fn set_current_execution(&self, id: Option<&str>) {
        let changed = {
            let mut state = self.state.write();
            let next = id.map(str::to_string);
            let changed = state.current != next;
            state.current = next;
            changed
        };
        if changed {
            self.notify(StoreChange::FocusChanged {
                id: id.map(str::to_string),
            });
        }
    }

    /// Focus `id` only when nothing is focused yet
    pub fn focus_if_unset(&self, id: &str) -> bool {
        let focused = {
            let mut state = self.state.write();
            if state.current.is_none() {
                state.current = Some(id.to_string());
                true
            } else {
                false
            }
        };
        if focused {
            self.notify(StoreChange::FocusChanged {
                id: Some(id.to_string()),
            });
        }
        focused
    }

    pub fn current_execution(&self) -> Option<String> {
        self.state.read().current.clone()
    }

    pub fn get(&self, id: &str) -> Option<Execution> {
        self.state.read().executions.get(id).cloned()
    }

    /// Run `f` against the record without cloning it
    pub fn with_execution<R>(&self, id: &str, f: impl FnOnce(&Execution) -> R) -> Option<R> {
        self.state.read().executions.get(id).map(f)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().executions.contains_key(id)
    }

    /// All executions, in the order they were first created
    pub fn snapshot(&self) -> Vec<Execution> {
        self.state.read().executions.values().cloned().collect()
    }

    pub fn execution_ids(&self) -> Vec<String> {
        self.state.read().executions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccw_domain_types::{ExecutionStatus, OutputType};

    fn line(content: &str) -> OutputLine {
        OutputLine::stdout(content, Utc::now())
    }

    #[test]
    fn test_upsert_creates_with_defaults() {
        let store = ExecutionStore::default();
        assert!(store.upsert_execution("a", ExecutionPatch::new()));

        let exec = store.get("a").unwrap();
        assert_eq!(exec.tool, "cli");
        assert_eq!(exec.mode, ExecutionMode::Analysis);
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.output().is_empty());
    }

    #[test]
    fn test_upsert_appends_output_every_call() {
        let store = ExecutionStore::default();
        store.upsert_execution("a", ExecutionPatch::new().line(line("base")));
        let patch = ExecutionPatch::new().line(line("x")).line(line("y"));
        assert!(!store.upsert_execution("a", patch.clone()));
        store.upsert_execution("a", patch);

        let contents: Vec<String> =
            store.get("a").unwrap().output().iter().map(|l| l.content.clone()).collect();
        assert_eq!(contents, vec!["base", "x", "y", "x", "y"]);
    }

    #[test]
    fn test_upsert_merges_fields() {
        let store = ExecutionStore::default();
        store.upsert_execution("a", ExecutionPatch::new());
        store.upsert_execution("a", ExecutionPatch::new().tool("gemini").mode(ExecutionMode::Write));

        let exec = store.get("a").unwrap();
        assert_eq!(exec.tool, "gemini");
        assert_eq!(exec.mode, ExecutionMode::Write);
    }

    #[test]
    fn test_terminal_status_is_frozen() {
        let store = ExecutionStore::default();
        let end = Utc::now();
        store.upsert_execution("a", ExecutionPatch::new());
        store.upsert_execution("a", ExecutionPatch::new().status(ExecutionStatus::Completed).end_time(end));
        store.upsert_execution(
            "a",
            ExecutionPatch::new()
                .status(ExecutionStatus::Running)
                .end_time(end + chrono::Duration::seconds(5)),
        );

        let exec = store.get("a").unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.end_time, Some(end));
    }

    #[test]
    fn test_add_output_unknown_is_noop() {
        let store = ExecutionStore::default();
        assert!(!store.add_output("ghost", line("late")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_mark_closed_without_record() {
        let store = ExecutionStore::default();
        store.mark_closed_by_user("never-seen");
        assert!(store.is_closed_by_user("never-seen"));
        assert!(!store.contains("never-seen"));
    }

    #[test]
    fn test_close_execution_removes_and_tombstones() {
        let store = ExecutionStore::default();
        store.upsert_execution("a", ExecutionPatch::new());
        store.set_current_execution(Some("a"));

        let removed = store.close_execution("a").unwrap();
        assert!(removed.closed_by_user);
        assert!(!store.contains("a"));
        assert!(store.is_closed_by_user("a"));
        assert_eq!(store.current_execution(), None);
    }

    #[test]
    fn test_focus_pointer() {
        let store = ExecutionStore::default();
        assert!(store.focus_if_unset("a"));
        assert!(!store.focus_if_unset("b"));
        assert_eq!(store.current_execution().as_deref(), Some("a"));
        store.set_current_execution(None);
        assert_eq!(store.current_execution(), None);
    }

    #[test]
    fn test_snapshot_keeps_creation_order() {
        let store = ExecutionStore::default();
        for id in ["c", "a", "b"] {
            store.upsert_execution(id, ExecutionPatch::new());
        }
        store.upsert_execution("c", ExecutionPatch::new().line(line("again")));
        assert_eq!(store.execution_ids(), vec!["c", "a", "b"]);
        store.remove_execution("a");
        assert_eq!(store.execution_ids(), vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = ExecutionStore::default();
        let mut rx = store.subscribe();

        store.upsert_execution("a", ExecutionPatch::new().line(OutputLine::system("hi", Utc::now())));
        store.add_output("a", OutputLine::new(OutputType::Thought, "hmm", Utc::now()));
        store.close_execution("a");

        assert_eq!(
            rx.recv().await.unwrap(),
            StoreChange::Upserted {
                id: "a".into(),
                created: true,
                appended: 1
            }
        );
        assert_eq!(rx.recv().await.unwrap(), StoreChange::OutputAppended { id: "a".into() });
        assert_eq!(rx.recv().await.unwrap(), StoreChange::ClosedByUser { id: "a".into() });
        assert_eq!(rx.recv().await.unwrap(), StoreChange::Removed { id: "a".into() });
    }
}
