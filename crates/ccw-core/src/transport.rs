// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Transport seams consumed by the ingestion service
//!
//! The core never talks to the network itself. A concrete transport
//! (WebSocket in `ccw-rest-client`, a scripted channel in tests) produces a
//! stream of decoded events, and an optional resync source lists executions
//! the server still considers active.

use async_trait::async_trait;
use ccw_stream_contract::{ActiveExecution, ContractError, StreamEvent};
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A single frame could not be decoded; the stream itself is still usable
    #[error("Decode error: {0}")]
    Decode(#[from] ContractError),

    #[error("Transport I/O error: {0}")]
    Io(String),

    #[error("Resync request failed: {0}")]
    Resync(String),
}

impl TransportError {
    /// Whether the stream should be abandoned and reconnected
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Decode(_))
    }
}

pub type EventStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open a fresh subscription. Each call is one live connection.
    async fn subscribe(&self) -> Result<EventStream, TransportError>;
}

#[async_trait]
pub trait ActiveExecutionSource: Send + Sync {
    async fn list_active(&self) -> Result<Vec<ActiveExecution>, TransportError>;
}
