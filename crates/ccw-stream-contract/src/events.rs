// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Execution stream events
//!
//! Inbound frames are JSON envelopes of the form
//! `{"type": "CLI_OUTPUT", "payload": {...}}`. Decoding is lenient about
//! optional fields (missing or wrong-typed tool, mode, success or timestamp
//! fall back to defaults) but strict about the discriminator and the execution id.

use crate::error::{ContractError, ContractResult};
use ccw_domain_types::ExecutionMode;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool name used when a start event does not carry one
pub const DEFAULT_TOOL: &str = "cli";

/// Chunk type used when an output event does not carry one
pub const DEFAULT_CHUNK_TYPE: &str = "stdout";

/// Wire discriminators
pub mod event_type {
    pub const STARTED: &str = "CLI_EXECUTION_STARTED";
    pub const OUTPUT: &str = "CLI_OUTPUT";
    pub const COMPLETED: &str = "CLI_EXECUTION_COMPLETED";
    pub const ERROR: &str = "CLI_EXECUTION_ERROR";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStarted {
    pub execution_id: String,
    pub tool: String,
    pub mode: ExecutionMode,
    pub timestamp: DateTime<Utc>,
}

/// Structured unit attached to an output chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputUnit {
    #[serde(default)]
    pub content: Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub execution_id: String,
    pub chunk_type: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<OutputUnit>,
    /// Receive time; output payloads carry no timestamp of their own
    #[serde(skip)]
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCompleted {
    pub execution_id: String,
    pub success: bool,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailed {
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One inbound event, one variant per wire discriminator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum StreamEvent {
    #[serde(rename = "CLI_EXECUTION_STARTED")]
    Started(ExecutionStarted),
    #[serde(rename = "CLI_OUTPUT")]
    Output(ExecutionOutput),
    #[serde(rename = "CLI_EXECUTION_COMPLETED")]
    Completed(ExecutionCompleted),
    #[serde(rename = "CLI_EXECUTION_ERROR")]
    Error(ExecutionFailed),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: Value,
}

// Every payload field is decoded as a raw value so a single wrong-typed
// field falls back to its default instead of rejecting the event
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawStarted {
    execution_id: Option<Value>,
    tool: Option<Value>,
    mode: Option<Value>,
    timestamp: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawOutput {
    execution_id: Option<Value>,
    chunk_type: Option<Value>,
    data: Value,
    unit: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawCompleted {
    execution_id: Option<Value>,
    success: Option<Value>,
    duration: Option<Value>,
    timestamp: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawFailed {
    execution_id: Option<Value>,
    error: Option<Value>,
    timestamp: Option<Value>,
}

impl StreamEvent {
    /// Decode a text frame, stamping missing timestamps with the current time
    pub fn from_json_str(text: &str) -> ContractResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value, Utc::now())
    }

    /// Decode an already-parsed envelope
    pub fn from_value(value: Value, received_at: DateTime<Utc>) -> ContractResult<Self> {
        let envelope: Envelope = serde_json::from_value(value)?;
        // Arrays would bind positionally to the raw structs; treat any
        // non-object payload as empty
        let payload = match envelope.payload {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Default::default()),
        };

        match envelope.event_type.as_str() {
            event_type::STARTED => {
                let raw: RawStarted = decode_payload(payload, event_type::STARTED)?;
                Ok(StreamEvent::Started(ExecutionStarted {
                    execution_id: require_id(raw.execution_id, event_type::STARTED)?,
                    tool: text_field(raw.tool)
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_TOOL.to_string()),
                    mode: text_field(raw.mode).and_then(|m| m.parse().ok()).unwrap_or_default(),
                    timestamp: parse_timestamp(raw.timestamp.as_ref()).unwrap_or(received_at),
                }))
            }
            event_type::OUTPUT => {
                let raw: RawOutput = decode_payload(payload, event_type::OUTPUT)?;
                Ok(StreamEvent::Output(ExecutionOutput {
                    execution_id: require_id(raw.execution_id, event_type::OUTPUT)?,
                    chunk_type: text_field(raw.chunk_type)
                        .unwrap_or_else(|| DEFAULT_CHUNK_TYPE.to_string()),
                    data: raw.data,
                    unit: unit_field(raw.unit),
                    received_at,
                }))
            }
            event_type::COMPLETED => {
                let raw: RawCompleted = decode_payload(payload, event_type::COMPLETED)?;
                Ok(StreamEvent::Completed(ExecutionCompleted {
                    execution_id: require_id(raw.execution_id, event_type::COMPLETED)?,
                    success: flag_field(raw.success.as_ref()).unwrap_or(false),
                    duration: raw.duration.as_ref().and_then(parse_duration_ms),
                    timestamp: parse_timestamp(raw.timestamp.as_ref()).unwrap_or(received_at),
                }))
            }
            event_type::ERROR => {
                let raw: RawFailed = decode_payload(payload, event_type::ERROR)?;
                Ok(StreamEvent::Error(ExecutionFailed {
                    execution_id: require_id(raw.execution_id, event_type::ERROR)?,
                    error: raw.error.and_then(|e| match e {
                        Value::Null => None,
                        Value::String(s) => Some(s),
                        other => Some(other.to_string()),
                    }),
                    timestamp: parse_timestamp(raw.timestamp.as_ref()).unwrap_or(received_at),
                }))
            }
            other => Err(ContractError::UnknownEventType(other.to_string())),
        }
    }

    /// Encode back into the wire envelope
    pub fn to_json_string(&self) -> ContractResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn execution_id(&self) -> &str {
        match self {
            StreamEvent::Started(e) => &e.execution_id,
            StreamEvent::Output(e) => &e.execution_id,
            StreamEvent::Completed(e) => &e.execution_id,
            StreamEvent::Error(e) => &e.execution_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Started(_) => event_type::STARTED,
            StreamEvent::Output(_) => event_type::OUTPUT,
            StreamEvent::Completed(_) => event_type::COMPLETED,
            StreamEvent::Error(_) => event_type::ERROR,
        }
    }
}

fn decode_payload<T>(payload: Value, event: &'static str) -> ContractResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(payload).map_err(|e| ContractError::InvalidPayload {
        event,
        reason: e.to_string(),
    })
}

pub(crate) fn require_id(raw: Option<Value>, event: &'static str) -> ContractResult<String> {
    match raw {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ContractError::MissingField {
            event,
            field: "executionId",
        }),
    }
}

/// String fields accept only strings; anything else counts as absent
pub(crate) fn text_field(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Booleans, plus the strings "true"/"false" and 0/1
fn flag_field(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Only an object is a unit; its `type` follows the same string rule
fn unit_field(value: Option<Value>) -> Option<OutputUnit> {
    let Value::Object(mut map) = value? else {
        return None;
    };
    Some(OutputUnit {
        content: map.remove("content").unwrap_or(Value::Null),
        unit_type: text_field(map.remove("type")),
    })
}

/// Accepts RFC 3339 strings and epoch milliseconds
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_duration_ms(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
