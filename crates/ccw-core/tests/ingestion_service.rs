// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use async_trait::async_trait;
use ccw_config::EngineConfig;
use ccw_core::{
    ActiveExecutionSource, EngineContext, EventStream, EventTransport, TransportError,
};
use ccw_stream_contract::{ActiveExecution, ContractError, StreamEvent};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type Item = Result<StreamEvent, TransportError>;

/// Hands out one scripted stream, then streams that never yield
struct ScriptedTransport {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Item>>>,
    subscribes: AtomicUsize,
}

impl ScriptedTransport {
    fn new() -> (Arc<Self>, mpsc::UnboundedSender<Item>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            receiver: Mutex::new(Some(rx)),
            subscribes: AtomicUsize::new(0),
        });
        (transport, tx)
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn subscribe(&self) -> Result<EventStream, TransportError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        match self.receiver.lock().take() {
            Some(rx) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

struct FixedActive(Vec<ActiveExecution>);

#[async_trait]
impl ActiveExecutionSource for FixedActive {
    async fn list_active(&self) -> Result<Vec<ActiveExecution>, TransportError> {
        Ok(self.0.clone())
    }
}

fn frame(text: &str) -> Item {
    StreamEvent::from_json_str(text).map_err(TransportError::from)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_multiple_consumers_share_one_subscription() {
    let context = EngineContext::new(EngineConfig::default());
    let (transport, tx) = ScriptedTransport::new();

    let first = context.service().ensure_started(transport.clone(), None);
    // A second and third view mounting must not subscribe again
    let second = context.service().ensure_started(transport.clone(), None);
    let _third = context.service().ensure_started(transport.clone(), None);

    tx.send(frame(r#"{"type":"CLI_EXECUTION_STARTED","payload":{"executionId":"a"}}"#)).unwrap();
    tx.send(frame(r#"{"type":"CLI_OUTPUT","payload":{"executionId":"a","data":"one\ntwo"}}"#)).unwrap();

    let store = context.store().clone();
    wait_until(|| store.with_execution("a", |e| e.output().len()) == Some(3)).await;
    wait_until(|| first.stats().applied == 2).await;

    assert_eq!(transport.subscribes.load(Ordering::SeqCst), 1);
    assert_eq!(first.stats(), second.stats());
    assert_eq!(first.stats().applied, 2);

    first.stop().await;
    assert!(second.is_shutdown());
}

#[tokio::test]
async fn test_decode_errors_are_skipped() {
    let context = EngineContext::new(EngineConfig::default());
    let (transport, tx) = ScriptedTransport::new();
    let handle = context.service().ensure_started(transport, None);

    tx.send(Err(TransportError::Decode(ContractError::UnknownEventType("CLI_PING".into()))))
        .unwrap();
    tx.send(frame(r#"{"type":"CLI_EXECUTION_STARTED","payload":{"executionId":"b","tool":"qwen"}}"#))
        .unwrap();

    let store = context.store().clone();
    wait_until(|| store.contains("b")).await;
    assert_eq!(handle.stats().decode_errors, 1);
    assert_eq!(store.get("b").unwrap().tool, "qwen");

    handle.stop().await;
}

#[tokio::test]
async fn test_resync_runs_on_connect_and_respects_closed() {
    let context = EngineContext::new(EngineConfig::default());
    context.store().mark_closed_by_user("closed");
    let (transport, _tx) = ScriptedTransport::new();

    let mut buffered = ActiveExecution::new("buffered");
    buffered.output = Some("from server".into());
    let source = Arc::new(FixedActive(vec![buffered, ActiveExecution::new("closed")]));

    let handle = context.service().ensure_started(transport, Some(source));
    let store = context.store().clone();
    wait_until(|| store.contains("buffered")).await;

    assert!(!store.contains("closed"));
    assert_eq!(store.get("buffered").unwrap().output()[0].content, "from server");
    handle.stop().await;
}

#[tokio::test]
async fn test_stream_end_triggers_reconnect() {
    let mut config = EngineConfig::default();
    config.ingest.reconnect_initial_ms = 10;
    config.ingest.resync_on_connect = false;
    let context = EngineContext::new(config);

    let (transport, tx) = ScriptedTransport::new();
    let handle = context.service().ensure_started(transport.clone(), None);
    drop(tx);

    wait_until(|| handle.stats().connects >= 2).await;
    assert_eq!(transport.subscribes.load(Ordering::SeqCst), 2);
    handle.stop().await;
}
