//! Credential indirection.
//!
//! Handlers never read raw secrets out of flow config; config carries
//! credential *ids*, and the engine resolves them through the
//! [`CredentialResolver`] capability at execution time. The store itself
//! (persistence, at-rest encryption) is an external collaborator behind
//! this trait.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::{CredentialId, PrincipalId};
use parking_lot::RwLock;

/// A string that redacts its contents in `Debug` and `Display`.
///
/// Used for credential values to prevent accidental logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Access the underlying value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// A resolved credential: named secret fields (e.g. `user`, `password`,
/// `token`).
#[derive(Debug, Clone, Default)]
pub struct CredentialPayload {
    values: BTreeMap<String, SecureString>,
}

impl CredentialPayload {
    /// Build a payload from field pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), SecureString::new(v)))
                .collect(),
        }
    }

    /// Get a secret field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SecureString> {
        self.values.get(key)
    }

    /// Field names present in this payload.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Errors from credential resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// No credential with that id exists.
    #[error("credential {0} not found")]
    NotFound(CredentialId),
    /// The credential exists but is not visible to the principal.
    #[error("credential {0} is not authorized for this principal")]
    Unauthorized(CredentialId),
    /// The backing store failed.
    #[error("credential store error: {0}")]
    Store(String),
}

/// Capability to fetch credentials for a principal.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve a credential's secret payload.
    async fn resolve(
        &self,
        principal: PrincipalId,
        id: CredentialId,
    ) -> Result<CredentialPayload, CredentialError>;

    /// Plan-time check: is the credential visible to the principal?
    ///
    /// Defaults to attempting a resolve and discarding the payload.
    async fn is_visible(
        &self,
        principal: PrincipalId,
        id: CredentialId,
    ) -> Result<bool, CredentialError> {
        match self.resolve(principal, id).await {
            Ok(_) => Ok(true),
            Err(CredentialError::NotFound(_) | CredentialError::Unauthorized(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// In-memory resolver used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: RwLock<BTreeMap<(PrincipalId, CredentialId), Arc<CredentialPayload>>>,
}

impl MemoryCredentials {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a credential visible to one principal.
    pub fn insert(&self, principal: PrincipalId, id: CredentialId, payload: CredentialPayload) {
        self.entries
            .write()
            .insert((principal, id), Arc::new(payload));
    }
}

#[async_trait]
impl CredentialResolver for MemoryCredentials {
    async fn resolve(
        &self,
        principal: PrincipalId,
        id: CredentialId,
    ) -> Result<CredentialPayload, CredentialError> {
        self.entries
            .read()
            .get(&(principal, id))
            .map(|payload| (**payload).clone())
            .ok_or(CredentialError::NotFound(id))
    }
}
