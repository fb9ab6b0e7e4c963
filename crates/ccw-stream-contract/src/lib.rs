// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stream contract for CLI execution events
//!
//! This crate defines the wire shapes consumed by the ccw engine: the
//! `{type, payload}` envelope carried over the WebSocket transport, the
//! tagged [`StreamEvent`] union it decodes into, and the
//! [`ActiveExecution`] records returned by the resync endpoint.

pub mod error;
pub mod events;
pub mod resync;

pub use error::*;
pub use events::*;
pub use resync::*;
