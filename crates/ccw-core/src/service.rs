// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Single-subscriber ingestion service
//!
//! Any number of views may ask for ingestion to be running, but only the
//! first request opens a subscription. Every later caller gets a clone of
//! the same [`IngestionHandle`], so each inbound event is translated into
//! store mutations exactly once regardless of how many consumers exist.
//!
//! The worker task owns the connection lifecycle: subscribe, resync,
//! consume in arrival order, and reconnect with exponential backoff when
//! the stream ends or fails. It stops when the handle is shut down.

use crate::ingest::{IngestOutcome, IngestionPipeline};
use crate::transport::{ActiveExecutionSource, EventTransport};
use ccw_config::IngestConfig;
use futures::StreamExt;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicU64,
    applied: AtomicU64,
    ignored: AtomicU64,
    decode_errors: AtomicU64,
}

/// Point-in-time counters for the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub connects: u64,
    pub applied: u64,
    pub ignored: u64,
    pub decode_errors: u64,
}

/// Shared handle to the running worker
#[derive(Clone)]
pub struct IngestionHandle {
    cancel: CancellationToken,
    counters: Arc<Counters>,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for IngestionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("stats", &self.stats())
            .finish()
    }
}

impl IngestionHandle {
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            connects: self.counters.connects.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the worker to exit. Only the first caller actually awaits it.
    pub async fn join(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "ingestion worker terminated abnormally");
            }
        }
    }

    /// Cancel and wait
    pub async fn stop(&self) {
        self.shutdown();
        self.join().await;
    }
}

pub struct IngestionService {
    pipeline: Arc<IngestionPipeline>,
    config: IngestConfig,
    handle: OnceCell<IngestionHandle>,
}

impl IngestionService {
    pub fn new(pipeline: Arc<IngestionPipeline>, config: IngestConfig) -> Self {
        Self {
            pipeline,
            config,
            handle: OnceCell::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Start the worker if it is not running yet and return its handle.
    ///
    /// Calls after the first one return the existing handle and never
    /// subscribe again; their `transport` and `resync` arguments are dropped.
    /// Must be called from within a Tokio runtime.
    pub fn ensure_started(
        &self,
        transport: Arc<dyn EventTransport>,
        resync: Option<Arc<dyn ActiveExecutionSource>>,
    ) -> IngestionHandle {
        let mut started_now = false;
        let handle = self.handle.get_or_init(|| {
            started_now = true;
            let cancel = CancellationToken::new();
            let counters = Arc::new(Counters::default());
            let worker = Worker {
                pipeline: Arc::clone(&self.pipeline),
                transport,
                resync,
                config: self.config.clone(),
                cancel: cancel.clone(),
                counters: Arc::clone(&counters),
            };
            let task = tokio::spawn(worker.run());
            IngestionHandle {
                cancel,
                counters,
                task: Arc::new(tokio::sync::Mutex::new(Some(task))),
            }
        });

        if !started_now {
            debug!("ingestion already running; reusing existing subscription");
        }
        handle.clone()
    }

    /// The running worker, if one was started
    pub fn handle(&self) -> Option<IngestionHandle> {
        self.handle.get().cloned()
    }

    pub fn is_started(&self) -> bool {
        self.handle.get().is_some()
    }
}

struct Worker {
    pipeline: Arc<IngestionPipeline>,
    transport: Arc<dyn EventTransport>,
    resync: Option<Arc<dyn ActiveExecutionSource>>,
    config: IngestConfig,
    cancel: CancellationToken,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self) {
        let mut backoff = self.config.reconnect_initial();
        info!("ingestion worker started");

        while !self.cancel.is_cancelled() {
            let subscribed = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.transport.subscribe() => result,
            };

            match subscribed {
                Ok(stream) => {
                    self.counters.connects.fetch_add(1, Ordering::Relaxed);
                    backoff = self.config.reconnect_initial();
                    self.resync_if_enabled().await;
                    if !self.consume(stream).await {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to subscribe to execution stream"),
            }

            debug!(delay_ms = backoff.as_millis() as u64, "reconnecting after backoff");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff, self.config.reconnect_max());
        }

        info!("ingestion worker stopped");
    }

    async fn resync_if_enabled(&self) {
        if !self.config.resync_on_connect {
            return;
        }
        let Some(source) = &self.resync else {
            return;
        };
        match source.list_active().await {
            Ok(active) => {
                self.pipeline.resync(&active);
            }
            Err(err) => warn!(error = %err, "resync of active executions failed"),
        }
    }

    /// Returns false when cancelled, true when the stream should be reopened
    async fn consume(&self, mut stream: crate::transport::EventStream) -> bool {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => match self.pipeline.apply(&event) {
                    IngestOutcome::Applied => {
                        self.counters.applied.fetch_add(1, Ordering::Relaxed);
                    }
                    outcome => {
                        debug!(?outcome, execution_id = event.execution_id(), "event produced no mutation");
                        self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Some(Err(err)) if !err.is_fatal() => {
                    warn!(error = %err, "skipping undecodable frame");
                    self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                }
                Some(Err(err)) => {
                    warn!(error = %err, "execution stream failed");
                    return true;
                }
                None => {
                    info!("execution stream ended");
                    return true;
                }
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
