// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Network clients for the ccw execution server
//!
//! [`RestClient`] lists the executions the server still considers active
//! and [`WsEventTransport`] streams live execution events. Both plug into
//! the ingestion service through the transport traits in `ccw-core`.

pub mod client;
pub mod error;
pub mod ws;

pub use client::{RestClient, ACTIVE_EXECUTIONS_PATH};
pub use error::{RestClientError, RestClientResult};
pub use ws::{decode_message, ws_url_from_base, Frame, WsEventStream, WsEventTransport};
