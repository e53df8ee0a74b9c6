//! Retry classification for provider failures.
//!
//! The dispatcher asks a [`RetryPolicy`] to decide, for each non-2xx
//! response, whether the next credential in the pool should be tried
//! (retryable) or the whole dispatch should abort (fatal). Transport-level
//! errors never reach the policy; they are always retryable.

use std::fmt;
use std::sync::Arc;

/// Classification of a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Try the next credential in the pool.
    Retryable,
    /// Abort the dispatch immediately, without touching remaining credentials.
    Fatal,
}

/// Response-body markers that indicate quota/resource exhaustion.
///
/// Matched case-insensitively. These mirror the error bodies seen from
/// generative-AI providers when a key has run out of quota.
const QUOTA_MARKERS: &[&str] = &["quota", "resource_exhausted", "rate limit"];

/// Predicate over `(status, body)` deciding whether a failure is retryable.
///
/// Two stock policies are provided:
/// - [`RetryPolicy::lenient`] treats every non-2xx response as retryable -
///   "try everything before giving up". This is the default.
/// - [`RetryPolicy::strict`] retries rate limits (429), timeouts (408),
///   server errors (5xx), and quota-marker bodies, and treats other 4xx
///   client errors as fatal (a malformed request will not be fixed by
///   switching keys).
#[derive(Clone)]
pub struct RetryPolicy {
    classify: Arc<dyn Fn(u16, &str) -> RetryClass + Send + Sync>,
}

impl RetryPolicy {
    /// Every non-2xx response is retryable.
    pub fn lenient() -> Self {
        Self {
            classify: Arc::new(|_, _| RetryClass::Retryable),
        }
    }

    /// Retry 429/408/5xx and quota-exhaustion bodies; other failures are fatal.
    pub fn strict() -> Self {
        Self {
            classify: Arc::new(|status, body| {
                if status == 429 || status == 408 || status >= 500 {
                    return RetryClass::Retryable;
                }
                let body_lower = body.to_ascii_lowercase();
                if QUOTA_MARKERS.iter().any(|m| body_lower.contains(m)) {
                    return RetryClass::Retryable;
                }
                RetryClass::Fatal
            }),
        }
    }

    /// Build a policy from an arbitrary predicate.
    pub fn custom<F>(classify: F) -> Self
    where
        F: Fn(u16, &str) -> RetryClass + Send + Sync + 'static,
    {
        Self {
            classify: Arc::new(classify),
        }
    }

    /// Classify a non-2xx response.
    pub fn classify(&self, status: u16, body: &str) -> RetryClass {
        (self.classify)(status, body)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::lenient()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryPolicy")
    }
}
