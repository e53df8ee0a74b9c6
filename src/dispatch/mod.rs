//! Credential-fallback dispatch against flaky upstream providers.
//!
//! A [`Dispatcher`] executes a single logical request against a provider
//! that may reject a given credential (quota exhausted, invalid key,
//! transient 5xx) by retrying the identical request with the next credential
//! in the pool. Attempts are strictly sequential and in pool order (trying
//! two credentials at once would double-spend quota) and restart from
//! index 0 on every call: there is no sticky "last known good" credential.
//!
//! Within one dispatch there is no backoff or delay between attempts; any
//! pacing between whole operations belongs to the [batch runner](crate::batch).

use metrics::counter;

use crate::credential::{Credential, CredentialPool};
use crate::error::{KeyfallError, Result};
use crate::http::{HttpClient, HttpResponse, ProviderRequest};

pub mod policy;

pub use policy::{RetryClass, RetryPolicy};

/// Default per-attempt timeout. Generative providers can be slow.
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Outcome of a single (credential, request) attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The provider returned a 2xx response.
    Success(HttpResponse),
    /// The attempt failed but the next credential should be tried.
    /// Covers transport errors and responses the policy classed retryable.
    RetryableFailure {
        /// Human-readable description of the failure
        message: String,
    },
    /// The policy classed this response non-retryable; dispatch aborts.
    FatalFailure {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body text
        body: String,
    },
}

/// Executes requests against a credential pool with sequential fallback.
///
/// # Example
/// ```ignore
/// let pool = CredentialPool::from_env("gemini", &["GEMINI_KEY_1", "GEMINI_KEY_2"])?;
/// let dispatcher = Dispatcher::new(ReqwestHttpClient::new());
/// let response = dispatcher.dispatch(&pool, &request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher<H: HttpClient> {
    client: H,
    policy: RetryPolicy,
    timeout_ms: u64,
}

impl<H: HttpClient> Dispatcher<H> {
    /// Create a dispatcher with the default (lenient) retry policy.
    pub fn new(client: H) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Replace the retry classification policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-attempt timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Execute `request` against the pool, trying each credential in order.
    ///
    /// Returns the payload from the first credential that succeeds. Exactly
    /// one error surfaces per call:
    ///
    /// - [`KeyfallError::FatalProviderFailure`] if the policy classes a
    ///   response non-retryable; remaining credentials are not attempted
    /// - [`KeyfallError::PoolExhausted`] if every credential failed retryably
    ///
    /// Each attempt emits one structured log line naming the credential
    /// index and outcome; the credential value itself is never logged.
    pub async fn dispatch(
        &self,
        pool: &CredentialPool,
        request: &ProviderRequest,
    ) -> Result<HttpResponse> {
        let service = pool.service();
        let mut last_error = None;

        for (index, credential) in pool.iter() {
            counter!(
                "keyfall_dispatch_attempts_total",
                "service" => service.to_string()
            )
            .increment(1);

            match self.attempt(credential, request).await {
                AttemptOutcome::Success(response) => {
                    tracing::info!(
                        service = %service,
                        credential_index = index,
                        status = response.status,
                        "Credential attempt succeeded"
                    );
                    return Ok(response);
                }
                AttemptOutcome::RetryableFailure { message } => {
                    tracing::warn!(
                        service = %service,
                        credential_index = index,
                        pool_size = pool.len(),
                        error = %message,
                        "Credential attempt failed, trying next credential"
                    );
                    last_error = Some(message);
                }
                AttemptOutcome::FatalFailure { status, body } => {
                    tracing::error!(
                        service = %service,
                        credential_index = index,
                        status = status,
                        "Fatal provider failure, aborting dispatch"
                    );
                    counter!(
                        "keyfall_dispatch_fatal_total",
                        "service" => service.to_string()
                    )
                    .increment(1);
                    return Err(KeyfallError::FatalProviderFailure { status, body });
                }
            }
        }

        counter!(
            "keyfall_pool_exhausted_total",
            "service" => service.to_string()
        )
        .increment(1);
        tracing::error!(
            service = %service,
            pool_size = pool.len(),
            "All credentials exhausted"
        );

        Err(KeyfallError::PoolExhausted {
            service: service.to_string(),
            pool_size: pool.len(),
            last_error: last_error.unwrap_or_else(|| "no attempts made".to_string()),
        })
    }

    /// Perform one (credential, request) attempt and classify the result.
    ///
    /// Transport errors (network failure, timeout, malformed response) are
    /// always retryable; only non-2xx provider responses reach the policy.
    async fn attempt(
        &self,
        credential: &Credential,
        request: &ProviderRequest,
    ) -> AttemptOutcome {
        match self.client.execute(request, credential, self.timeout_ms).await {
            Ok(response) if response.is_success() => AttemptOutcome::Success(response),
            Ok(response) => match self.policy.classify(response.status, &response.body) {
                RetryClass::Retryable => AttemptOutcome::RetryableFailure {
                    message: format!("HTTP {}: {}", response.status, response.body),
                },
                RetryClass::Fatal => AttemptOutcome::FatalFailure {
                    status: response.status,
                    body: response.body,
                },
            },
            Err(e) => AttemptOutcome::RetryableFailure {
                message: e.to_string(),
            },
        }
    }
}
