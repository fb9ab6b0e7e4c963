// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Truncated JSON recovery
//!
//! Streamed JSON is routinely cut at a frame boundary. The strategies here
//! try to turn such a prefix back into a parseable document, in order:
//!
//! 1. [`RecoveryStrategy::CloseContainers`]: close a dangling string, then
//!    close every open `{` / `[` in reverse order.
//! 2. [`RecoveryStrategy::UsageStats`]: only when the text looks like a
//!    token/usage summary. Drop the trailing partial member at any nesting
//!    depth and close what remains, so the nested `stats` object survives.
//! 3. [`RecoveryStrategy::TrimTopLevel`]: cut at the last top-level comma
//!    and close the root container. Without a usable top-level comma, cut at
//!    the last comma at any depth and close everything; failing that, keep the
//!    bare root (`{}` or `[]`) when the prefix still reads as the start of a
//!    JSON document. Only the last few nested commas are tried.
//!
//! A backslash always escapes exactly the next byte. A prefix that ends
//! between a backslash and the byte it escapes is not repaired: the
//! closing quote added by strategy 1 is itself escaped and the attempt
//! fails like any other.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

/// Which recovery attempt produced a parseable document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    CloseContainers,
    UsageStats,
    TrimTopLevel,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryStrategy::CloseContainers => write!(f, "close_containers"),
            RecoveryStrategy::UsageStats => write!(f, "usage_stats"),
            RecoveryStrategy::TrimTopLevel => write!(f, "trim_top_level"),
        }
    }
}

/// Upper bound on comma positions the usage-stats strategy walks back through
const MAX_USAGE_TRIMS: usize = 8;

/// Upper bound on nested comma positions the top-level strategy falls back to
const MAX_NESTED_TRIMS: usize = 8;

/// Minimum number of usage signals required before the usage strategy runs
const USAGE_SIGNAL_THRESHOLD: usize = 3;

static USAGE_SIGNALS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r#""type"\s*:\s*"result""#).expect("valid regex"),
        Regex::new(r#""status"\s*:\s*"success""#).expect("valid regex"),
        Regex::new(r#""stats"\s*:\s*\{"#).expect("valid regex"),
        Regex::new(r#""total_tokens"\s*:\s*\d+"#).expect("valid regex"),
    ]
});

/// Single-pass structural scan of a JSON prefix
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanState {
    /// Scan ended inside a quoted string
    pub in_string: bool,
    /// Scan ended right after a backslash inside a string
    pub escape_pending: bool,
    /// Unmatched openers outside strings, innermost last
    pub open: Vec<u8>,
    /// Byte offsets of commas outside strings, with the depth they sit at
    pub commas: Vec<(usize, usize)>,
    /// A closer did not match its opener
    pub mismatched: bool,
    /// The outermost container was closed at some point during the scan
    pub root_closed: bool,
}

impl ScanState {
    pub fn last_comma_at_depth(&self, depth: usize) -> Option<usize> {
        self.commas.iter().rev().find(|(_, d)| *d == depth).map(|(pos, _)| *pos)
    }
}

pub fn scan(text: &str) -> ScanState {
    let mut state = ScanState::default();

    // Structural characters are all ASCII, so a byte walk never splits them
    for (i, b) in text.bytes().enumerate() {
        if state.in_string {
            if state.escape_pending {
                state.escape_pending = false;
            } else if b == b'\\' {
                state.escape_pending = true;
            } else if b == b'"' {
                state.in_string = false;
            }
            continue;
        }

        match b {
            b'"' => state.in_string = true,
            b'{' | b'[' => state.open.push(b),
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                match state.open.pop() {
                    Some(opener) if opener == expected => {
                        if state.open.is_empty() {
                            state.root_closed = true;
                        }
                    }
                    _ => state.mismatched = true,
                }
            }
            b',' => state.commas.push((i, state.open.len())),
            _ => {}
        }
    }

    state
}

fn closer(opener: u8) -> char {
    if opener == b'[' {
        ']'
    } else {
        '}'
    }
}

/// Append whatever the prefix needs to become balanced
fn close_all(prefix: &str) -> Option<String> {
    let state = scan(prefix);
    if state.mismatched {
        return None;
    }

    let mut completed = String::with_capacity(prefix.len() + state.open.len() + 1);
    completed.push_str(prefix);
    if state.in_string {
        completed.push('"');
    }
    for &opener in state.open.iter().rev() {
        completed.push(closer(opener));
    }
    Some(completed)
}

fn parse_mapping(candidate: &str) -> Option<Map<String, Value>> {
    serde_json::from_str::<Value>(candidate).ok().and_then(crate::into_mapping)
}

/// Whether the text carries enough usage-summary signals
pub fn looks_like_usage_stats(text: &str) -> bool {
    USAGE_SIGNALS.iter().filter(|re| re.is_match(text)).count() >= USAGE_SIGNAL_THRESHOLD
}

fn close_containers(text: &str) -> Option<Map<String, Value>> {
    let state = scan(text);
    if state.open.is_empty() && !state.in_string {
        return None;
    }
    close_all(text).and_then(|candidate| parse_mapping(&candidate))
}

fn usage_stats(text: &str) -> Option<Map<String, Value>> {
    let state = scan(text);
    state
        .commas
        .iter()
        .rev()
        .take(MAX_USAGE_TRIMS)
        .find_map(|(pos, _)| close_all(&text[..*pos]).and_then(|c| parse_mapping(&c)))
}

/// Whether the text after the root opener starts like a member or element
fn opens_document(text: &str, root: u8) -> bool {
    let rest = text.get(1..).unwrap_or_default().trim_start();
    match (root, rest.chars().next()) {
        (_, None) => true,
        (b'{', Some(c)) => c == '"',
        (_, Some(c)) => matches!(c, '{' | '[' | '"' | '-' | '0'..='9' | 't' | 'f' | 'n'),
    }
}

fn trim_top_level(text: &str) -> Option<Map<String, Value>> {
    let state = scan(text);
    let root = *state.open.first()?;

    if let Some(cut) = state.last_comma_at_depth(1) {
        let mut candidate = text[..cut].to_string();
        candidate.push(closer(root));
        if let Some(map) = parse_mapping(&candidate) {
            return Some(map);
        }
    }

    let nested = state
        .commas
        .iter()
        .rev()
        .filter(|(_, depth)| *depth > 1)
        .take(MAX_NESTED_TRIMS)
        .find_map(|(pos, _)| close_all(&text[..*pos]).and_then(|c| parse_mapping(&c)));
    if nested.is_some() {
        return nested;
    }

    if state.in_string || state.mismatched || state.root_closed || !opens_document(text, root) {
        return None;
    }
    let mut bare = String::with_capacity(2);
    bare.push(char::from(root));
    bare.push(closer(root));
    parse_mapping(&bare)
}

/// Try every strategy in order on a line that failed a strict parse
pub fn recover(text: &str) -> Option<(Map<String, Value>, RecoveryStrategy)> {
    if let Some(map) = close_containers(text) {
        trace!(strategy = "close_containers", "recovered truncated JSON");
        return Some((map, RecoveryStrategy::CloseContainers));
    }

    if looks_like_usage_stats(text) {
        if let Some(map) = usage_stats(text) {
            trace!(strategy = "usage_stats", "recovered truncated JSON");
            return Some((map, RecoveryStrategy::UsageStats));
        }
    }

    if let Some(map) = trim_top_level(text) {
        trace!(strategy = "trim_top_level", "recovered truncated JSON");
        return Some((map, RecoveryStrategy::TrimTopLevel));
    }

    None
}
