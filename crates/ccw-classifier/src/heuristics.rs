// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{into_mapping, recovery, ClassificationResult, Heuristic};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static TOOL_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\[Tool\]\s+([^\s(]+)\((.*)\)$").expect("valid regex"));

static TOOL_RESULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\[Tool Result\]\s+([^:]+?):\s*(.*)$").expect("valid regex"));

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([A-Za-z0-9_+-]*)(.*?)```").expect("valid regex"));

/// Upper bound on the `{` positions, counted back from the end of the line,
/// tried when the structural scan does not locate the trailing object
const MAX_TRAILING_CANDIDATES: usize = 64;

pub(crate) fn direct_json(text: &str) -> Option<ClassificationResult> {
    if !(text.starts_with('{') || text.starts_with('[')) {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return into_mapping(value).map(|map| ClassificationResult::structured(Heuristic::DirectJson, map));
    }

    recovery::recover(text).map(|(map, strategy)| {
        ClassificationResult::structured(Heuristic::DirectJson, map).with_recovery(strategy)
    })
}

pub(crate) fn tool_call(text: &str) -> Option<ClassificationResult> {
    let caps = TOOL_CALL.captures(text)?;
    let name = caps.get(1)?.as_str();
    let raw = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

    let parameters =
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let mut map = Map::new();
    map.insert("action".into(), Value::String("invoke".into()));
    map.insert("toolName".into(), Value::String(name.to_string()));
    map.insert("parameters".into(), parameters);
    Some(ClassificationResult::structured(Heuristic::ToolCall, map))
}

pub(crate) fn tool_result(text: &str) -> Option<ClassificationResult> {
    let caps = TOOL_RESULT.captures(text)?;
    let status = caps.get(1)?.as_str().trim();
    let raw = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

    let output = if raw.starts_with('{') {
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    } else {
        Value::String(raw.to_string())
    };

    let mut map = Map::new();
    map.insert("action".into(), Value::String("result".into()));
    map.insert("status".into(), Value::String(status.to_string()));
    map.insert("output".into(), output);
    Some(ClassificationResult::structured(Heuristic::ToolResult, map))
}

/// Position of the opener closed by the final `}`, ignoring braces in strings
fn matched_opener(text: &str) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push((i, b)),
            b'}' | b']' => last = stack.pop(),
            _ => {}
        }
    }

    match last {
        Some((start, b'{')) if !in_string => Some(start),
        _ => None,
    }
}

pub(crate) fn trailing_object(text: &str) -> Option<ClassificationResult> {
    if !text.ends_with('}') {
        return None;
    }

    let openers: Vec<usize> = text.match_indices('{').map(|(i, _)| i).collect();
    let tail = &openers[openers.len().saturating_sub(MAX_TRAILING_CANDIDATES)..];

    // Prose may carry stray quotes or braces; then the widest parseable suffix wins
    matched_opener(text)
        .into_iter()
        .chain(tail.iter().copied())
        .find_map(|start| match serde_json::from_str::<Value>(&text[start..]) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .map(|map| ClassificationResult::structured(Heuristic::TrailingObject, map))
}

pub(crate) fn fenced_block(text: &str) -> Option<ClassificationResult> {
    let caps = FENCED_BLOCK.captures(text)?;
    let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    let tagged_json = tag.eq_ignore_ascii_case("json");

    match serde_json::from_str::<Value>(body) {
        Ok(value) => match into_mapping(value) {
            Some(map) => Some(ClassificationResult::structured(Heuristic::FencedBlock, map)),
            None if tagged_json => Some(ClassificationResult::failed(
                Heuristic::FencedBlock,
                "Fenced json block does not contain an object or array",
            )),
            None => None,
        },
        Err(err) if tagged_json => Some(ClassificationResult::failed(
            Heuristic::FencedBlock,
            format!("Invalid JSON in fenced block: {err}"),
        )),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_raw_parameters() {
        let result = tool_call("[Tool] shell(ls -la /tmp)").unwrap();
        assert_eq!(result.field("parameters"), Some(&json!("ls -la /tmp")));
        assert_eq!(result.field("toolName"), Some(&json!("shell")));
    }

    #[test]
    fn test_tool_call_requires_prefix() {
        assert!(tool_call("[Tool Result] ok: done").is_none());
        assert!(tool_call("Tool search({})").is_none());
    }

    #[test]
    fn test_tool_result_json_output() {
        let result = tool_result(r#"[Tool Result] success: {"files":3}"#).unwrap();
        assert_eq!(
            Value::Object(result.parsed.unwrap()),
            json!({"action": "result", "status": "success", "output": {"files": 3}})
        );
    }

    #[test]
    fn test_tool_result_array_output_stays_text() {
        let result = tool_result("[Tool Result] success: [1,2]").unwrap();
        assert_eq!(result.field("output"), Some(&json!("[1,2]")));
    }

    #[test]
    fn test_tool_result_broken_json_output_stays_text() {
        let result = tool_result(r#"[Tool Result] error: {"partial"#).unwrap();
        assert_eq!(result.field("status"), Some(&json!("error")));
        assert_eq!(result.field("output"), Some(&json!(r#"{"partial"#)));
    }

    #[test]
    fn test_trailing_object() {
        let result = trailing_object(r#"Usage summary: {"tokens":{"in":3,"out":4}}"#).unwrap();
        assert_eq!(result.field("tokens"), Some(&json!({"in": 3, "out": 4})));
    }

    #[test]
    fn test_trailing_object_skips_unbalanced_prefix() {
        let result = trailing_object(r#"oops { not json {"ok":true}"#).unwrap();
        assert_eq!(Value::Object(result.parsed.unwrap()), json!({"ok": true}));
    }

    #[test]
    fn test_trailing_object_after_many_prose_braces() {
        let line = format!("{} done {{\"ok\":{{\"n\":1}}}}", "{ ".repeat(100));
        let result = trailing_object(&line).unwrap();
        assert_eq!(Value::Object(result.parsed.unwrap()), json!({"ok": {"n": 1}}));
    }

    #[test]
    fn test_trailing_object_after_stray_quote() {
        let result = trailing_object(r#"he said "wait {"ok":true}"#).unwrap();
        assert_eq!(Value::Object(result.parsed.unwrap()), json!({"ok": true}));
    }

    #[test]
    fn test_trailing_object_must_end_line() {
        assert!(trailing_object(r#"{"a":1} and more"#).is_none());
    }

    #[test]
    fn test_fenced_block_tagged() {
        let result = fenced_block(r#"```json {"a":1} ```"#).unwrap();
        assert!(result.is_json);
        assert_eq!(result.field("a"), Some(&json!(1)));
    }

    #[test]
    fn test_fenced_block_tagged_failure_reports_error() {
        let result = fenced_block("```json {broken ```").unwrap();
        assert!(!result.is_json);
        assert!(result.error.unwrap().starts_with("Invalid JSON in fenced block"));
    }

    #[test]
    fn test_fenced_block_untagged_text_falls_through() {
        assert!(fenced_block("```text hello world```").is_none());
        assert!(fenced_block("``` not json ```").is_none());
    }
}
