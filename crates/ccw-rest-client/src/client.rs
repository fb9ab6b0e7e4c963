// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HTTP client for the execution server's resync endpoint

use async_trait::async_trait;
use ccw_core::{ActiveExecutionSource, TransportError};
use ccw_stream_contract::{ActiveExecution, ActiveExecutionsResponse};
use reqwest::{Client as HttpClient, Response};
use url::Url;

use crate::error::{RestClientError, RestClientResult};

pub const ACTIVE_EXECUTIONS_PATH: &str = "/api/cli/active";

#[derive(Debug, Clone)]
pub struct RestClient {
    http_client: HttpClient,
    base_url: Url,
}

impl RestClient {
    pub fn new(base_url: Url) -> RestClientResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("ccw/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn from_url(base_url: &str) -> RestClientResult<Self> {
        Self::new(Url::parse(base_url)?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Executions the server still considers active, with their buffered output
    pub async fn list_active_executions(&self) -> RestClientResult<Vec<ActiveExecution>> {
        let url = self.base_url.join(ACTIVE_EXECUTIONS_PATH)?;
        tracing::debug!(%url, "Requesting active executions");
        let response = self.http_client.get(url).send().await?;
        let body: ActiveExecutionsResponse = Self::handle_response(response).await?;
        Ok(body.into_executions())
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> RestClientResult<T> {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            Ok(serde_json::from_str(&text)?)
        } else {
            Err(RestClientError::UnexpectedStatus { status, body: text })
        }
    }
}

#[async_trait]
impl ActiveExecutionSource for RestClient {
    async fn list_active(&self) -> Result<Vec<ActiveExecution>, TransportError> {
        self.list_active_executions().await.map_err(TransportError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves exactly one HTTP response and returns the request line it saw
    async fn serve_once(status: &'static str, body: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request.lines().next().unwrap_or_default().to_string()
        });
        (Url::parse(&format!("http://{addr}")).unwrap(), handle)
    }

    #[tokio::test]
    async fn test_list_active_accepts_wrapped_response() {
        let (base, server) =
            serve_once("200 OK", r#"{"executions":[{"id":"a","tool":"gemini","output":"hi"}]}"#).await;
        let client = RestClient::new(base).unwrap();

        let active = client.list_active_executions().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
        assert_eq!(active[0].output.as_deref(), Some("hi"));
        assert_eq!(server.await.unwrap(), "GET /api/cli/active HTTP/1.1");
    }

    #[tokio::test]
    async fn test_list_active_accepts_bare_array() {
        let (base, _server) = serve_once("200 OK", r#"[{"id":"x"},{"id":"y"}]"#).await;
        let client = RestClient::new(base).unwrap();
        let ids: Vec<String> =
            client.list_active().await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (base, _server) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
        let client = RestClient::new(base).unwrap();

        match client.list_active_executions().await {
            Err(RestClientError::UnexpectedStatus { status, body }) => {
                assert_eq!(status.as_u16(), 503);
                assert!(body.contains("busy"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_from_url_rejects_garbage() {
        assert!(matches!(RestClient::from_url("not a url"), Err(RestClientError::Url(_))));
    }
}
