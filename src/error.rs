//! Error types for the dispatch and batch subsystems.

use thiserror::Error;

/// Result type alias using the keyfall error type.
pub type Result<T> = std::result::Result<T, KeyfallError>;

/// Main error type for dispatch and batch operations.
#[derive(Error, Debug)]
pub enum KeyfallError {
    /// No usable credentials remained after construction dropped empty entries
    #[error("credential pool for service '{service}' has no usable credentials")]
    EmptyPool {
        /// Logical service name the pool was built for
        service: String,
    },

    /// Every credential in the pool was tried and failed
    #[error(
        "all {pool_size} credentials for service '{service}' exhausted; last error: {last_error}"
    )]
    PoolExhausted {
        /// Logical service name the pool was built for
        service: String,
        /// Number of credentials that were attempted
        pool_size: usize,
        /// Message from the final failed attempt
        last_error: String,
    },

    /// Provider failure the retry policy classified as non-retryable.
    /// Remaining credentials are deliberately not attempted.
    #[error("fatal provider failure (HTTP {status}): {body}")]
    FatalProviderFailure {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body text
        body: String,
    },

    /// A batch was started with no work items
    #[error("batch has no items")]
    EmptyBatch,

    /// A second batch was started while one was already running on the same runner
    #[error("a batch is already running on this runner")]
    BatchAlreadyRunning,

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
