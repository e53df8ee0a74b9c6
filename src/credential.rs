//! Credential pools for upstream providers.
//!
//! A [`CredentialPool`] is an ordered, immutable list of interchangeable API
//! keys for one logical upstream service. Dispatch always walks the pool from
//! index 0 in construction order; no credential is promoted, demoted, or
//! removed based on past outcomes.

use std::fmt;

use crate::error::{KeyfallError, Result};

/// An opaque API credential.
///
/// `Debug` never reveals the key material; logs identify credentials by their
/// pool index instead. Use [`Credential::expose`] at the point where the value
/// is actually attached to an outgoing request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Create a credential from a raw string, rejecting empty/blank values.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Credential(raw))
        }
    }

    /// Access the underlying key material.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***)")
    }
}

/// An ordered pool of credentials for one logical upstream service.
///
/// Immutable after construction. Duplicates are permitted (they are simply
/// attempted twice). Order is deterministic: every dispatch starts from
/// index 0, even if a later credential succeeded on a previous call.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    service: String,
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// Build a pool from raw key strings, dropping empty/blank entries.
    ///
    /// # Errors
    /// Returns [`KeyfallError::EmptyPool`] if no usable credential remains.
    pub fn new<I, S>(service: impl Into<String>, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let service = service.into();
        let credentials: Vec<Credential> =
            keys.into_iter().filter_map(Credential::new).collect();

        if credentials.is_empty() {
            return Err(KeyfallError::EmptyPool { service });
        }

        tracing::debug!(
            service = %service,
            pool_size = credentials.len(),
            "Constructed credential pool"
        );

        Ok(CredentialPool {
            service,
            credentials,
        })
    }

    /// Build a pool from environment variables, read in the given order.
    ///
    /// Missing or empty variables are dropped, matching how the host
    /// application's configuration treats partially populated key sets.
    ///
    /// # Errors
    /// Returns [`KeyfallError::EmptyPool`] if none of the variables held a value.
    pub fn from_env(service: impl Into<String>, var_names: &[&str]) -> Result<Self> {
        let keys: Vec<String> = var_names
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .collect();
        Self::new(service, keys)
    }

    /// Logical service name, used in logs and aggregated errors.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Number of credentials in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false for a constructed pool.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Iterate credentials in pool order, with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Credential)> {
        self.credentials.iter().enumerate()
    }
}
