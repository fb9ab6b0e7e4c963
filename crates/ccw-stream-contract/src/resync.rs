// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Records returned by the "list active executions" endpoint

use crate::events::{parse_timestamp, require_id, text_field};
use ccw_domain_types::{ExecutionMode, ExecutionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-side view of an execution, used to resynchronize after reconnect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawActiveExecution")]
pub struct ActiveExecution {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Value>,
    /// Buffered output accumulated on the server so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawActiveExecution {
    id: Option<Value>,
    tool: Option<Value>,
    mode: Option<Value>,
    status: Option<Value>,
    start_time: Option<Value>,
    output: Option<Value>,
}

impl TryFrom<RawActiveExecution> for ActiveExecution {
    type Error = String;

    fn try_from(raw: RawActiveExecution) -> Result<Self, Self::Error> {
        let id = require_id(raw.id, "active execution").map_err(|e| e.to_string())?;
        Ok(Self {
            id,
            tool: text_field(raw.tool),
            mode: text_field(raw.mode),
            status: text_field(raw.status),
            start_time: raw.start_time.filter(|v| !v.is_null()),
            output: text_field(raw.output),
        })
    }
}

impl ActiveExecution {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: None,
            mode: None,
            status: None,
            start_time: None,
            output: None,
        }
    }

    pub fn parsed_mode(&self) -> ExecutionMode {
        self.mode.as_deref().and_then(|m| m.parse().ok()).unwrap_or_default()
    }

    /// Unrecognized statuses are treated as still running
    pub fn parsed_status(&self) -> ExecutionStatus {
        self.status.as_deref().and_then(|s| s.parse().ok()).unwrap_or_default()
    }

    pub fn parsed_start_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.start_time.as_ref())
    }
}

/// The endpoint answers with either a bare array or a wrapped list.
///
/// Records are kept raw until [`into_executions`](Self::into_executions) so
/// one unusable record does not fail the whole list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ActiveExecutionsResponse {
    Bare(Vec<Value>),
    Wrapped { executions: Vec<Value> },
}

impl ActiveExecutionsResponse {
    /// Decoded records; entries without a usable id are dropped
    pub fn into_executions(self) -> Vec<ActiveExecution> {
        let records = match self {
            ActiveExecutionsResponse::Bare(list) => list,
            ActiveExecutionsResponse::Wrapped { executions } => executions,
        };
        records
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect()
    }
}
