//! Credential-fallback dispatch and sequential batch running for flaky HTTP providers.
//!
//! This crate provides two small, reusable control-flow patterns for calling
//! rate-limited upstream APIs (AI text/image/speech providers and the like):
//!
//! - A [`Dispatcher`] that executes one logical request against an ordered
//!   pool of interchangeable credentials, trying each in turn until one
//!   succeeds, a fatal failure aborts the call, or the pool is exhausted.
//! - A [`BatchRunner`] that applies an async per-item operation to a list of
//!   work items sequentially, with a fixed inter-item delay, observable
//!   progress, and cooperative cancellation.
//!
//! Neither pattern persists anything or opens a listening surface; both are
//! meant to be embedded in a host application that owns the UI and the
//! credential configuration.

pub mod batch;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod http;

// Re-export commonly used types
pub use batch::{
    BatchConfig, BatchId, BatchOutcome, BatchProgress, BatchReport, BatchRunner, BatchSnapshot,
    BatchState, ItemFailure,
};
pub use credential::{Credential, CredentialPool};
pub use dispatch::{AttemptOutcome, Dispatcher, RetryClass, RetryPolicy};
pub use error::{KeyfallError, Result};
pub use http::{
    CredentialPlacement, HttpClient, HttpResponse, MockHttpClient, ProviderRequest,
    ReqwestHttpClient,
};
