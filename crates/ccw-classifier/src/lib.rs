// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Classification of streamed CLI output lines
//!
//! [`classify`] turns one raw line of text into a [`ClassificationResult`]:
//! either a structured mapping (a JSON object, a tool-call or tool-result
//! record) or "not structured", in which case callers render the line as
//! plain text. Lines are often the tail end of a network frame, so direct
//! JSON input gets a bounded set of truncation recovery attempts before the
//! remaining heuristics are consulted.
//!
//! The heuristics run in the fixed order given by [`Heuristic::ORDER`] and
//! the first one that matches decides the result.

pub mod cache;
mod heuristics;
pub mod recovery;

pub use cache::{CacheStats, ClassificationCache};
pub use recovery::RecoveryStrategy;

use serde::Serialize;
use serde_json::{Map, Value};

/// Named detection heuristics, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// Line is a JSON object or array, possibly truncated
    DirectJson,
    /// `[Tool] name(params)`
    ToolCall,
    /// `[Tool Result] status: output`
    ToolResult,
    /// Free text ending in a complete `{...}` object
    TrailingObject,
    /// A fenced code block, optionally tagged `json`
    FencedBlock,
}

impl Heuristic {
    pub const ORDER: [Heuristic; 5] = [
        Heuristic::DirectJson,
        Heuristic::ToolCall,
        Heuristic::ToolResult,
        Heuristic::TrailingObject,
        Heuristic::FencedBlock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Heuristic::DirectJson => "direct_json",
            Heuristic::ToolCall => "tool_call",
            Heuristic::ToolResult => "tool_result",
            Heuristic::TrailingObject => "trailing_object",
            Heuristic::FencedBlock => "fenced_block",
        }
    }

    fn detect(self, text: &str) -> Option<ClassificationResult> {
        match self {
            Heuristic::DirectJson => heuristics::direct_json(text),
            Heuristic::ToolCall => heuristics::tool_call(text),
            Heuristic::ToolResult => heuristics::tool_result(text),
            Heuristic::TrailingObject => heuristics::trailing_object(text),
            Heuristic::FencedBlock => heuristics::fenced_block(text),
        }
    }
}

impl std::fmt::Display for Heuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Which heuristic produced the result, if any matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heuristic: Option<Heuristic>,
    /// Set when the structure had to be completed from a truncated line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryStrategy>,
}

impl ClassificationResult {
    /// Plain text, no heuristic matched
    pub fn plain() -> Self {
        Self {
            is_json: false,
            parsed: None,
            error: None,
            heuristic: None,
            recovery: None,
        }
    }

    pub(crate) fn structured(heuristic: Heuristic, parsed: Map<String, Value>) -> Self {
        Self {
            is_json: true,
            parsed: Some(parsed),
            error: None,
            heuristic: Some(heuristic),
            recovery: None,
        }
    }

    pub(crate) fn failed(heuristic: Heuristic, error: impl Into<String>) -> Self {
        Self {
            is_json: false,
            parsed: None,
            error: Some(error.into()),
            heuristic: Some(heuristic),
            recovery: None,
        }
    }

    pub(crate) fn with_recovery(mut self, strategy: RecoveryStrategy) -> Self {
        self.recovery = Some(strategy);
        self
    }

    /// Shorthand for looking up a top-level field of the parsed mapping
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.parsed.as_ref().and_then(|m| m.get(key))
    }
}

/// Classify one line of streamed output.
///
/// Total and deterministic: the same input always yields the same result and
/// no input causes a panic.
pub fn classify(line: &str) -> ClassificationResult {
    let text = line.trim();
    if text.is_empty() {
        return ClassificationResult::plain();
    }

    Heuristic::ORDER
        .iter()
        .find_map(|heuristic| heuristic.detect(text))
        .unwrap_or_else(ClassificationResult::plain)
}

/// Turn a parsed JSON value into the mapping exposed by [`ClassificationResult`].
///
/// Top-level arrays are wrapped as `{"items": [...]}`; scalars are not structured.
pub(crate) fn into_mapping(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert("items".to_string(), Value::Array(items));
            Some(map)
        }
        _ => None,
    }
}
