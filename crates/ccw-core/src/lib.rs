// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Multi-execution state engine for ccw.
//!
//! This crate keeps per-execution ordered logs built from a live event
//! stream and decides which pane shows which execution:
//!
//! - [`store`]: the execution store and its mutation API
//! - [`ingest`]: translation of stream events into store mutations
//! - [`service`]: the single process-wide subscriber feeding the pipeline
//! - [`allocator`]: round-robin pane/tab assignment without duplicates
//!
//! Nothing in the store, pipeline or allocator returns an error; bad or
//! late input is absorbed and only ever shows up as data.

pub mod allocator;
pub mod context;
pub mod ingest;
pub mod service;
pub mod store;
pub mod transport;

pub use allocator::{Assignment, PaneAllocator, TabCandidate};
pub use context::EngineContext;
pub use ingest::{completion_summary, output_lines, IngestOutcome, IngestionPipeline, ResyncSummary};
pub use service::{IngestStats, IngestionHandle, IngestionService};
pub use store::{ExecutionStore, StoreChange};
pub use transport::{ActiveExecutionSource, EventStream, EventTransport, TransportError};
