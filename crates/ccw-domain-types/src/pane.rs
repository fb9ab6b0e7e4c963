// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pane and tab layout types
//!
//! The layout is persisted by the hosting application between reloads; the
//! allocator reads it back to learn which executions already have a tab.

use serde::{Deserialize, Serialize};

/// Identifier of a viewing surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneId(pub String);

impl PaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binding of one execution's log to a pane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub execution_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pane {
    pub id: PaneId,
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

impl Pane {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PaneId::new(id),
            tabs: Vec::new(),
        }
    }

    pub fn has_execution(&self, execution_id: &str) -> bool {
        self.tabs.iter().any(|t| t.execution_id == execution_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneLayout {
    #[serde(default)]
    pub panes: Vec<Pane>,
}

impl PaneLayout {
    /// Layout with `count` empty panes named `pane-0`, `pane-1`, ...
    pub fn with_panes(count: usize) -> Self {
        Self {
            panes: (0..count).map(|i| Pane::new(format!("pane-{i}"))).collect(),
        }
    }

    pub fn contains_execution(&self, execution_id: &str) -> bool {
        self.panes.iter().any(|p| p.has_execution(execution_id))
    }

    /// Every execution id bound to a tab, pane by pane in tab order
    pub fn execution_ids(&self) -> impl Iterator<Item = &str> {
        self.panes.iter().flat_map(|p| p.tabs.iter().map(|t| t.execution_id.as_str()))
    }

    pub fn tab_count(&self) -> usize {
        self.panes.iter().map(|p| p.tabs.len()).sum()
    }

    pub fn pane(&self, id: &PaneId) -> Option<&Pane> {
        self.panes.iter().find(|p| &p.id == id)
    }

    /// Remove the tab for `execution_id`, returning the pane it lived in
    pub fn close_tab(&mut self, execution_id: &str) -> Option<PaneId> {
        for pane in &mut self.panes {
            if let Some(pos) = pane.tabs.iter().position(|t| t.execution_id == execution_id) {
                pane.tabs.remove(pos);
                return Some(pane.id.clone());
            }
        }
        None
    }
}
