// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the ccw network clients

use ccw_core::TransportError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server returned {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type RestClientResult<T> = Result<T, RestClientError>;

impl From<RestClientError> for TransportError {
    fn from(err: RestClientError) -> Self {
        match err {
            RestClientError::WebSocket(e) => TransportError::Io(e.to_string()),
            RestClientError::Url(_) | RestClientError::UnsupportedScheme(_) => {
                TransportError::Connect(err.to_string())
            }
            other => TransportError::Resync(other.to_string()),
        }
    }
}
