// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `ccw watch`: follow a live execution server

use anyhow::{Context, Result};
use ccw_config::EngineConfig;
use ccw_core::{ActiveExecutionSource, EngineContext, ExecutionStore, StoreChange};
use ccw_rest_client::{RestClient, WsEventTransport};
use clap::Args;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// WebSocket URL of the event stream (default: derived from the server URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Base HTTP URL of the execution server (overrides server.base-url)
    #[arg(long)]
    pub server: Option<String>,
}

impl WatchArgs {
    pub fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
    }

    pub fn transport(&self, config: &EngineConfig) -> Result<WsEventTransport> {
        match &self.url {
            Some(url) => {
                let url = Url::parse(url).with_context(|| format!("Invalid --url {url}"))?;
                Ok(WsEventTransport::new(url))
            }
            None => WsEventTransport::from_config(&config.server).with_context(|| {
                format!("Cannot derive a WebSocket URL from {}", config.server.base_url)
            }),
        }
    }

    pub async fn run(&self, mut config: EngineConfig) -> Result<()> {
        self.apply_overrides(&mut config);
        let transport = Arc::new(self.transport(&config)?);
        let resync: Option<Arc<dyn ActiveExecutionSource>> = if config.ingest.resync_on_connect {
            let client = RestClient::from_url(&config.server.base_url)
                .with_context(|| format!("Invalid server URL {}", config.server.base_url))?;
            Some(Arc::new(client))
        } else {
            None
        };
        tracing::info!(url = %transport.url(), "Watching execution server");

        let context = EngineContext::init_global(config);
        let store = context.store();
        let mut changes = store.subscribe();
        let handle = context.service().ensure_started(transport, resync);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut stdout = std::io::stdout();
        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                change = changes.recv() => match change {
                    Ok(change) => {
                        if let Some(line) = describe_change(&change, store) {
                            writeln!(stdout, "{line}")?;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change feed lagged; some updates were not printed");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        handle.stop().await;
        let stats = handle.stats();
        tracing::info!(
            connects = stats.connects,
            applied = stats.applied,
            ignored = stats.ignored,
            decode_errors = stats.decode_errors,
            "Stopped watching"
        );
        Ok(())
    }
}

/// One printable line per store change. Changes about records that are
/// already gone print nothing.
pub fn describe_change(change: &StoreChange, store: &ExecutionStore) -> Option<String> {
    match change {
        StoreChange::Upserted { id, created: true, .. } => store.with_execution(id, |exec| {
            format!("+ {id} {} ({}) {}", exec.tool, exec.mode, exec.status)
        }),
        StoreChange::Upserted { id, created: false, appended } => {
            store.with_execution(id, |exec| format!("~ {id} {} (+{appended} lines)", exec.status))
        }
        StoreChange::OutputAppended { id } => store.with_execution(id, |exec| {
            let line = exec.output().last()?;
            Some(format!("  {id} {}: {}", line.output_type, line.content))
        })?,
        StoreChange::Removed { id } => Some(format!("- {id}")),
        StoreChange::ClosedByUser { id } => Some(format!("x {id} closed")),
        StoreChange::FocusChanged { id: Some(id) } => Some(format!("> {id}")),
        StoreChange::FocusChanged { id: None } => Some("> (no focus)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccw_domain_types::{ExecutionPatch, OutputLine};
    use chrono::Utc;

    #[test]
    fn test_transport_prefers_explicit_url() {
        let args = WatchArgs {
            url: Some("ws://example.com:9000/stream".into()),
            server: Some("http://ignored:1".into()),
        };
        let mut config = EngineConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.server.base_url, "http://ignored:1");
        assert_eq!(args.transport(&config).unwrap().url().as_str(), "ws://example.com:9000/stream");
    }

    #[test]
    fn test_transport_derives_from_server() {
        let args = WatchArgs {
            url: None,
            server: Some("https://dash.example.com".into()),
        };
        let mut config = EngineConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(args.transport(&config).unwrap().url().as_str(), "wss://dash.example.com/ws");
    }

    #[test]
    fn test_describe_change() {
        let store = ExecutionStore::default();
        store.upsert_execution("e1", ExecutionPatch::new().tool("gemini"));
        store.add_output("e1", OutputLine::stdout("hello", Utc::now()));

        let created = StoreChange::Upserted {
            id: "e1".into(),
            created: true,
            appended: 0,
        };
        assert_eq!(describe_change(&created, &store).unwrap(), "+ e1 gemini (analysis) running");

        let appended = StoreChange::OutputAppended { id: "e1".into() };
        assert_eq!(describe_change(&appended, &store).unwrap(), "  e1 stdout: hello");

        let gone = StoreChange::OutputAppended { id: "missing".into() };
        assert_eq!(describe_change(&gone, &store), None);

        let closed = StoreChange::ClosedByUser { id: "e1".into() };
        assert_eq!(describe_change(&closed, &store).unwrap(), "x e1 closed");
    }
}
