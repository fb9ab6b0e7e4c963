// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! WebSocket transport for the execution event stream
//!
//! Each [`EventTransport::subscribe`] call opens one socket. A background
//! task reads frames and forwards decoded events over a bounded channel;
//! dropping the returned stream aborts that task and closes the socket.

use async_trait::async_trait;
use ccw_config::ServerConfig;
use ccw_core::{EventStream, EventTransport, TransportError};
use ccw_stream_contract::{ContractError, StreamEvent};
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::{RestClientError, RestClientResult};

const FRAME_BUFFER: usize = 64;

/// Derive the socket URL from the HTTP base URL: `http` becomes `ws`,
/// `https` becomes `wss`, and `ws_path` replaces the path
pub fn ws_url_from_base(base: &Url, ws_path: &str) -> RestClientResult<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(RestClientError::UnsupportedScheme(other.to_string())),
    };
    let mut url = base.join(ws_path)?;
    url.set_scheme(scheme)
        .map_err(|_| RestClientError::UnsupportedScheme(scheme.to_string()))?;
    Ok(url)
}

/// What a single socket frame means for the event stream
#[derive(Debug)]
pub enum Frame {
    Event(Result<StreamEvent, ContractError>),
    /// Control or empty frame with nothing to deliver
    Skip,
    Close,
}

pub fn decode_message(message: Message) -> Frame {
    let text = match message {
        Message::Text(text) => text,
        Message::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                tracing::debug!("Dropping non UTF-8 binary frame");
                return Frame::Skip;
            }
        },
        Message::Close(_) => return Frame::Close,
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Frame::Skip,
    };
    if text.trim().is_empty() {
        return Frame::Skip;
    }
    Frame::Event(StreamEvent::from_json_str(&text))
}

#[derive(Debug, Clone)]
pub struct WsEventTransport {
    url: Url,
}

impl WsEventTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn from_config(server: &ServerConfig) -> RestClientResult<Self> {
        let base = Url::parse(&server.base_url)?;
        Ok(Self::new(ws_url_from_base(&base, &server.ws_path)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn connect(&self) -> RestClientResult<WsEventStream> {
        let (mut socket, _) = connect_async(self.url.as_str()).await?;
        tracing::info!(url = %self.url, "Connected to execution event stream");

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let handle = tokio::spawn(async move {
            while let Some(message) = socket.next().await {
                let item = match message {
                    Ok(message) => match decode_message(message) {
                        Frame::Event(result) => result.map_err(TransportError::from),
                        Frame::Skip => continue,
                        Frame::Close => break,
                    },
                    Err(err) => {
                        let _ = tx.send(Err(TransportError::Io(err.to_string()))).await;
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            tracing::debug!("Execution event socket closed");
        });

        Ok(WsEventStream {
            receiver: rx,
            handle,
        })
    }
}

#[async_trait]
impl EventTransport for WsEventTransport {
    async fn subscribe(&self) -> Result<EventStream, TransportError> {
        let stream = self
            .connect()
            .await
            .map_err(|err| TransportError::Connect(format!("{}: {err}", self.url)))?;
        Ok(stream.boxed())
    }
}

/// Decoded events from one socket connection
pub struct WsEventStream {
    receiver: mpsc::Receiver<Result<StreamEvent, TransportError>>,
    handle: tokio::task::JoinHandle<()>,
}

impl Stream for WsEventStream {
    type Item = Result<StreamEvent, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for WsEventStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
