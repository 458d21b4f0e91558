//! HTTP transport seam.
//!
//! [`MiroClient`](crate::MiroClient) never touches `reqwest` directly; it
//! sends [`HttpRequest`]s through an [`HttpTransport`]. Production code uses
//! [`ReqwestTransport`]; tests script responses with an in-memory mock.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{AccessToken, DeliveryError};
use serde_json::Value;

/// HTTP verbs the Miro client needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Reads, e.g. board lookup.
    Get,
    /// Item creation.
    Post,
}

impl Method {
    /// Upper-case verb as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A request the transport should send with the caller's access token.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Verb.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// JSON body, sent only with `Post`.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Body-less GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    /// POST with a JSON body.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// A buffered response. Header names are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers keyed by lower-case name.
    pub headers: BTreeMap<String, String>,
    /// Raw body text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Executes authenticated HTTP requests.
///
/// # Errors
///
/// Network failures and timeouts are [`DeliveryError::Transient`]. Non-2xx
/// statuses are *not* errors at this layer; they come back as a normal
/// [`HttpResponse`] for the client to classify.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        token: &AccessToken,
    ) -> Result<HttpResponse, DeliveryError>;
}

// ============================================================================
// Production implementation using reqwest
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(skip(self, request, token), fields(method = request.method.as_str(), url = %request.url))]
    async fn send(
        &self,
        request: &HttpRequest,
        token: &AccessToken,
    ) -> Result<HttpResponse, DeliveryError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .timeout(self.timeout)
        .bearer_auth(token.secret())
        .header("Accept", "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "HTTP request failed");
            DeliveryError::transient(format!("{} {} failed: {e}", request.method.as_str(), request.url))
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::transient(format!("Failed to read response body: {e}")))?;

        tracing::debug!(status, response_len = body.len(), "HTTP request completed");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ============================================================================
// Test implementation
// ============================================================================
