//! Derived idempotency keys.
//!
//! Each `(execution, node, attempt)` gets a deterministic key handlers can
//! forward to external APIs that support at-most-once writes. Derivation is
//! a content hash, so replaying the same attempt yields the same key
//! without any coordination.

use cascade_core::{ExecutionId, NodeKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An at-most-once key for one node attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for one attempt.
    #[must_use]
    pub fn derive(execution_id: ExecutionId, node_id: &NodeKey, attempt: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(execution_id.get().as_bytes());
        hasher.update(node_id.as_str().as_bytes());
        hasher.update(attempt.to_be_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
