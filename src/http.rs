//! HTTP client abstraction for provider calls.
//!
//! This module defines the `HttpClient` trait to abstract HTTP request
//! execution, enabling testability with mock implementations. The dispatcher
//! is agnostic to the payload shape: it only inspects HTTP status and body
//! text, so responses are surfaced as plain `(status, body)` pairs.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::credential::Credential;
use crate::error::Result;

/// How a credential is attached to an outgoing request.
///
/// Upstream providers differ here: some take `Authorization: Bearer`, others
/// take the key as a query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialPlacement {
    /// `Authorization: Bearer <credential>` header.
    Bearer,
    /// `?<param>=<credential>` appended to the query string.
    Query { param: String },
}

/// A single logical request to an upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRequest {
    /// The base URL of the target endpoint (e.g., <https://generativelanguage.googleapis.com>)
    pub endpoint: String,

    /// HTTP method (e.g., "POST", "GET")
    pub method: String,

    /// The path portion of the URL (e.g., "/v1beta/models/gemini:generateContent")
    pub path: String,

    /// The request body as a JSON string
    pub body: String,

    /// How the credential is attached to the request
    pub placement: CredentialPlacement,
}

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for executing HTTP requests.
///
/// This abstraction allows for different implementations (production vs.
/// testing) and makes the dispatch logic testable without real HTTP calls.
///
/// Transport-level failures (connect errors, timeouts) surface as `Err`;
/// non-2xx provider responses surface as `Ok` with the status, so the caller
/// can classify them as retryable or fatal.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute an HTTP request with the given credential attached.
    ///
    /// # Errors
    /// Returns an error if the request fails at the transport level
    /// (network issues, timeout, invalid URL or method).
    async fn execute(
        &self,
        request: &ProviderRequest,
        credential: &Credential,
        timeout_ms: u64,
    ) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new reqwest-based HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request, credential), fields(method = %request.method, path = %request.path))]
    async fn execute(
        &self,
        request: &ProviderRequest,
        credential: &Credential,
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        let url = format!("{}{}", request.endpoint, request.path);

        tracing::debug!(
            url = %url,
            timeout_ms = timeout_ms,
            "Executing provider request"
        );

        let mut req = self
            .client
            .request(
                request.method.parse().map_err(|e| {
                    tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
                    anyhow::anyhow!("Invalid HTTP method '{}': {}", request.method, e)
                })?,
                &url,
            )
            .timeout(Duration::from_millis(timeout_ms));

        req = match &request.placement {
            CredentialPlacement::Bearer => {
                req.header("Authorization", format!("Bearer {}", credential.expose()))
            }
            CredentialPlacement::Query { param } => {
                req.query(&[(param.as_str(), credential.expose())])
            }
        };

        // Only add body and Content-Type for methods that support a body
        let method_upper = request.method.to_uppercase();
        if method_upper != "GET"
            && method_upper != "HEAD"
            && method_upper != "DELETE"
            && !request.body.is_empty()
        {
            req = req
                .header("Content-Type", "application/json")
                .body(request.body.clone());
            tracing::trace!(body_len = request.body.len(), "Added request body");
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Provider request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            status = status,
            response_len = body.len(),
            "Provider request completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls. Responses are keyed by `"{method} {path}"` and
/// returned in FIFO order, so credential-fallback sequences can be scripted
/// as "429, 429, 200".
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<HttpResponse>>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub endpoint: String,
    pub path: String,
    pub body: String,
    pub credential: String,
    pub timeout_ms: u64,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predetermined response for a specific method and path.
    ///
    /// The key is formatted as "{method} {path}". Multiple responses can be
    /// added for the same key - they will be returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The credential attached to each recorded call, in call order.
    pub fn credentials_used(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.credential.clone()).collect()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        request: &ProviderRequest,
        credential: &Credential,
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        // Record this call
        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            endpoint: request.endpoint.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
            credential: credential.expose().to_string(),
            timeout_ms,
        });

        // Look up the response
        let key = format!("{} {}", request.method, request.path);
        let mock_response = {
            let mut responses = self.responses.lock();
            responses.get_mut(&key).and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
        };

        match mock_response {
            Some(response) => response,
            None => Err(crate::error::KeyfallError::Other(anyhow::anyhow!(
                "No mock response configured for {} {}",
                request.method,
                request.path
            ))),
        }
    }
}
