//! Resource errors.

/// Errors from pools and brokers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// Invalid pool or broker configuration.
    #[error("resource configuration error: {0}")]
    Configuration(String),

    /// Creating a client failed.
    #[error("resource creation failed: {0}")]
    Creation(String),

    /// The acquire timeout elapsed before a client became available.
    ///
    /// Surfaces to nodes as `ErrorKind::ResourceExhausted`.
    #[error("resource pool exhausted: no client available within {0:?}")]
    Exhausted(std::time::Duration),

    /// The pool or broker is shut down.
    #[error("resource pool is shut down")]
    Shutdown,
}

impl ResourceError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a creation error.
    pub fn creation(message: impl Into<String>) -> Self {
        Self::Creation(message.into())
    }
}
