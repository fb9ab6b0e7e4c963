// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Domain types for the ccw stream engine
//!
//! This crate contains the data model shared by the classifier, the
//! execution store, the pane allocator and the transport adapters.
//! The types are UI-agnostic and carry no behavior beyond their own
//! invariants.

pub mod execution;
pub mod pane;

// Re-export commonly used types
pub use execution::*;
pub use pane::*;
