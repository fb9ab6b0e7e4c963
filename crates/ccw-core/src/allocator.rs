// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pane Allocator
//!
//! Assigns every newly observed execution to exactly one pane, round-robin.
//! The allocator remembers every id it has ever placed (or found already
//! placed in the layout) and never places it again, so a reload that
//! restores a persisted layout does not duplicate tabs.

use crate::store::ExecutionStore;
use ccw_domain_types::{Execution, PaneId, PaneLayout, Tab};
use std::collections::HashSet;
use tracing::{debug, trace};

/// An execution that may need a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabCandidate {
    pub execution_id: String,
    pub label: String,
}

impl TabCandidate {
    pub fn new(execution_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            label: label.into(),
        }
    }
}

impl From<&Execution> for TabCandidate {
    fn from(execution: &Execution) -> Self {
        Self::new(execution.id.clone(), format!("{} · {}", execution.tool, execution.mode))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub execution_id: String,
    pub pane_id: PaneId,
}

#[derive(Debug, Clone, Default)]
pub struct PaneAllocator {
    assigned: HashSet<String>,
}

impl PaneAllocator {
    /// Seed the assigned set from every tab already present in `layout`
    pub fn seeded(layout: &PaneLayout) -> Self {
        let assigned: HashSet<String> = layout.execution_ids().map(str::to_string).collect();
        debug!(seeded = assigned.len(), "pane allocator seeded from layout");
        Self { assigned }
    }

    pub fn is_assigned(&self, execution_id: &str) -> bool {
        self.assigned.contains(execution_id)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    /// Place every not-yet-assigned candidate, round-robin across panes.
    ///
    /// The i-th newly seen id in `candidates` goes to `panes[i % pane_count]`.
    /// With no panes nothing is placed and the ids stay unassigned.
    pub fn allocate(&mut self, layout: &mut PaneLayout, candidates: &[TabCandidate]) -> Vec<Assignment> {
        // Tabs may have been added to the layout behind our back
        for id in layout.execution_ids() {
            if !self.assigned.contains(id) {
                self.assigned.insert(id.to_string());
            }
        }

        let pane_count = layout.panes.len();
        if pane_count == 0 {
            if !candidates.is_empty() {
                trace!(candidates = candidates.len(), "no panes available for allocation");
            }
            return Vec::new();
        }

        let mut assignments = Vec::new();
        for candidate in candidates {
            if self.assigned.contains(&candidate.execution_id) {
                continue;
            }

            let pane = &mut layout.panes[assignments.len() % pane_count];
            pane.tabs.push(Tab {
                execution_id: candidate.execution_id.clone(),
                label: candidate.label.clone(),
            });
            self.assigned.insert(candidate.execution_id.clone());
            assignments.push(Assignment {
                execution_id: candidate.execution_id.clone(),
                pane_id: pane.id.clone(),
            });
        }

        if !assignments.is_empty() {
            debug!(assigned = assignments.len(), panes = pane_count, "allocated new tabs");
        }
        assignments
    }

    /// Allocate every execution currently in the store, in creation order
    pub fn allocate_from_store(&mut self, layout: &mut PaneLayout, store: &ExecutionStore) -> Vec<Assignment> {
        let candidates: Vec<TabCandidate> = store.snapshot().iter().map(TabCandidate::from).collect();
        self.allocate(layout, &candidates)
    }

    /// Remove a tab from the layout. The id stays assigned.
    pub fn close_tab(&mut self, layout: &mut PaneLayout, execution_id: &str) -> Option<PaneId> {
        self.assigned.insert(execution_id.to_string());
        layout.close_tab(execution_id)
    }
}
