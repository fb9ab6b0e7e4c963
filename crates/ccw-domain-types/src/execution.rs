// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Execution-related domain types
//!
//! An [`Execution`] is one run of an external CLI tool, tracked from its
//! start event until a terminal status. Its output log is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// How the external tool was asked to operate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Analysis,
    Write,
    Review,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Analysis => write!(f, "analysis"),
            ExecutionMode::Write => write!(f, "write"),
            ExecutionMode::Review => write!(f, "review"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analysis" => Ok(ExecutionMode::Analysis),
            "write" => Ok(ExecutionMode::Write),
            "review" => Ok(ExecutionMode::Review),
            _ => Err(format!("Unknown execution mode: {}", s)),
        }
    }
}

/// Lifecycle status of an execution
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Error,
}

impl ExecutionStatus {
    /// Completed and error are terminal; nothing moves an execution out of them
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Error)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "error" | "failed" => Ok(ExecutionStatus::Error),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

/// Kind of a single output line
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    #[default]
    Stdout,
    Stderr,
    Metadata,
    Thought,
    System,
    ToolCall,
}

impl OutputType {
    /// Lenient mapping used for chunk and unit types coming off the wire.
    ///
    /// Tool results share the tool-call line type; anything unrecognized is stdout.
    pub fn from_wire(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "stderr" => OutputType::Stderr,
            "metadata" => OutputType::Metadata,
            "thought" => OutputType::Thought,
            "system" => OutputType::System,
            "tool_call" | "tool_result" => OutputType::ToolCall,
            _ => OutputType::Stdout,
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputType::Stdout => write!(f, "stdout"),
            OutputType::Stderr => write!(f, "stderr"),
            OutputType::Metadata => write!(f, "metadata"),
            OutputType::Thought => write!(f, "thought"),
            OutputType::System => write!(f, "system"),
            OutputType::ToolCall => write!(f, "tool_call"),
        }
    }
}

impl std::str::FromStr for OutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdout" => Ok(OutputType::Stdout),
            "stderr" => Ok(OutputType::Stderr),
            "metadata" => Ok(OutputType::Metadata),
            "thought" => Ok(OutputType::Thought),
            "system" => Ok(OutputType::System),
            "tool_call" => Ok(OutputType::ToolCall),
            _ => Err(format!("Unknown output type: {}", s)),
        }
    }
}

/// One line of an execution's log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    #[serde(rename = "type")]
    pub output_type: OutputType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl OutputLine {
    pub fn new(output_type: OutputType, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            output_type,
            content: content.into(),
            timestamp,
        }
    }

    pub fn system(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(OutputType::System, content, timestamp)
    }

    pub fn stderr(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(OutputType::Stderr, content, timestamp)
    }

    pub fn stdout(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(OutputType::Stdout, content, timestamp)
    }
}

/// Execution record held by the stream store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub tool: String,
    pub mode: ExecutionMode,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    output: Vec<OutputLine>,
    #[serde(default)]
    pub closed_by_user: bool,
}

impl Execution {
    /// Create a running execution with an empty log
    pub fn new(
        id: impl Into<String>,
        tool: impl Into<String>,
        mode: ExecutionMode,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            mode,
            status: ExecutionStatus::Running,
            start_time,
            end_time: None,
            output: Vec::new(),
            closed_by_user: false,
        }
    }

    /// The ordered output log
    pub fn output(&self) -> &[OutputLine] {
        &self.output
    }

    /// Append lines to the end of the log. This is the only way the log changes.
    pub fn append<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = OutputLine>,
    {
        self.output.extend(lines);
    }

    pub fn push(&mut self, line: OutputLine) {
        self.output.push(line);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration, once the execution has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// Partial update applied by `upsert_execution`.
///
/// Every scalar field is optional; `output` is always appended to the
/// existing log, never substituted for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPatch {
    pub tool: Option<String>,
    pub mode: Option<ExecutionMode>,
    pub status: Option<ExecutionStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: Vec<OutputLine>,
}

impl ExecutionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    pub fn end_time(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self
    }

    pub fn line(mut self, line: OutputLine) -> Self {
        self.output.push(line);
        self
    }

    pub fn lines<I>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = OutputLine>,
    {
        self.output.extend(lines);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_status_terminal() {
        let terminal: Vec<ExecutionStatus> =
            ExecutionStatus::iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![ExecutionStatus::Completed, ExecutionStatus::Error]);
    }

    #[test]
    fn test_display_roundtrip() {
        for mode in ExecutionMode::iter() {
            assert_eq!(mode.to_string().parse::<ExecutionMode>().unwrap(), mode);
        }
        for ty in OutputType::iter() {
            assert_eq!(ty.to_string().parse::<OutputType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_output_type_from_wire() {
        assert_eq!(OutputType::from_wire("tool_result"), OutputType::ToolCall);
        assert_eq!(OutputType::from_wire("STDERR"), OutputType::Stderr);
        assert_eq!(OutputType::from_wire("progress"), OutputType::Stdout);
    }

    #[test]
    fn test_execution_append_preserves_order() {
        let now = Utc::now();
        let mut exec = Execution::new("exec-1", "gemini", ExecutionMode::Write, now);
        exec.push(OutputLine::system("first", now));
        exec.append(vec![OutputLine::stdout("second", now), OutputLine::stderr("third", now)]);

        let contents: Vec<&str> = exec.output().iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.duration().is_none());
    }

    #[test]
    fn test_execution_serializes_camel_case() {
        let now = Utc::now();
        let exec = Execution::new("exec-1", "cli", ExecutionMode::Analysis, now);
        let json = serde_json::to_value(&exec).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["closedByUser"], false);
        assert!(json.get("startTime").is_some());
        assert!(json.get("endTime").is_none());
    }
}
