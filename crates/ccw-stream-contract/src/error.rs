// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for stream contract decoding

use thiserror::Error;

/// Errors that can occur while decoding an inbound frame
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Missing field `{field}` in {event} payload")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

pub type ContractResult<T> = std::result::Result<T, ContractError>;
