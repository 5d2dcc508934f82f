//! The pooled-resource trait.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ResourceError;

/// A client type the broker can pool.
///
/// `Params` is the connection configuration; equal parameter values share a
/// pool (keyed by content hash), so `Params` must serialize
/// deterministically.
#[async_trait]
pub trait PooledResource: Send + Sync + Sized + 'static {
    /// Connection parameters identifying one pool.
    type Params: Serialize + Send + Sync + 'static;

    /// Open a new client. Called lazily when the pool has no idle client.
    async fn create(params: &Self::Params) -> Result<Self, ResourceError>;

    /// Whether the client is still usable. Invalid clients are destroyed
    /// instead of being handed out again.
    fn is_valid(&self) -> bool {
        true
    }

    /// Close the client. Called on pool shutdown and idle eviction.
    async fn close(self) {}
}
