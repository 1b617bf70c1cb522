//! HTTP transport implementation.
//!
//! Queued operations are pushed to a REST API (see [`RemoteRequest`] for the
//! endpoint mapping). The HTTP client is abstracted via a trait so tests can
//! answer requests in-process; [`ReqwestClient`] is the production client.

use crate::error::{SyncError, SyncResult};
use crate::transport::OperationTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::time::Duration;
use tillsync_protocol::{HttpMethod, RemoteRequest};

/// A response as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body, possibly empty.
    pub body: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request with an optional JSON body.
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
    ) -> SyncResult<HttpResponse>;
}

/// HTTP-based operation transport.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the API (e.g., "https://pos.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the full URL for a request.
    pub fn url_for(&self, request: &RemoteRequest) -> String {
        format!("{}{}", self.base_url, request.path)
    }

    fn record(&self, result: SyncResult<()>) -> SyncResult<()> {
        *self.last_error.write() = result.as_ref().err().map(ToString::to_string);
        result
    }
}

#[async_trait]
impl<C: HttpClient> OperationTransport for HttpTransport<C> {
    async fn send(&self, request: &RemoteRequest) -> SyncResult<()> {
        let url = self.url_for(request);
        tracing::debug!(%request, %url, "sending operation");

        let result = match self
            .client
            .send(request.method, &url, request.body.as_ref())
            .await
        {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(SyncError::Http {
                status: response.status,
                message: response.body,
            }),
            Err(e) => Err(e),
        };
        self.record(result)
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a fatal transport error if the TLS backend cannot be set up.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
    ) -> SyncResult<HttpResponse> {
        let mut builder = match method {
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout
            } else {
                SyncError::transport_retryable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}
