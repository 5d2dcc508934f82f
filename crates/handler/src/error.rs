//! Handler failure type.

use cascade_core::{ErrorInfo, ErrorKind};
use cascade_expression::ExpressionError;

/// A handler failure, classified by the stable [`ErrorKind`] taxonomy.
///
/// This is the only error channel out of `Handler::execute`; the engine
/// records it on the node's journal row verbatim. Handlers attach a stack
/// trace only when they want it user-visible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HandlerError {
    /// Stable failure classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional handler-supplied stack trace.
    pub stack: Option<String>,
}

impl HandlerError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    /// Node config is invalid.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Credential missing, unauthorized, or rejected.
    pub fn credential(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Credential, message)
    }

    /// The node ran out of time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// The node was cooperatively cancelled.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled")
    }

    /// An external service returned a failure.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    /// Pool or worker acquisition failed.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    /// Handler-internal fault.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Input or resolved data was malformed.
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    /// Attach a stack trace for the journal.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<HandlerError> for ErrorInfo {
    fn from(err: HandlerError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            stack: err.stack,
        }
    }
}

// Evaluator failures inside a handler are data errors: the path or template
// the flow references does not match the data that arrived.
impl From<ExpressionError> for HandlerError {
    fn from(err: ExpressionError) -> Self {
        Self::data(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kinds() {
        assert_eq!(HandlerError::config("x").kind, ErrorKind::Config);
        assert_eq!(HandlerError::credential("x").kind, ErrorKind::Credential);
        assert_eq!(HandlerError::timeout("x").kind, ErrorKind::Timeout);
        assert_eq!(HandlerError::cancelled().kind, ErrorKind::Cancelled);
        assert_eq!(HandlerError::upstream("x").kind, ErrorKind::Upstream);
        assert_eq!(
            HandlerError::resource_exhausted("x").kind,
            ErrorKind::ResourceExhausted
        );
        assert_eq!(HandlerError::runtime("x").kind, ErrorKind::Runtime);
        assert_eq!(HandlerError::data("x").kind, ErrorKind::Data);
    }

    #[test]
    fn converts_to_error_info() {
        let info: ErrorInfo = HandlerError::upstream("503").with_stack("trace").into();
        assert_eq!(info.kind, ErrorKind::Upstream);
        assert_eq!(info.message, "503");
        assert_eq!(info.stack.as_deref(), Some("trace"));
    }

    #[test]
    fn expression_error_is_data() {
        let expr_err = ExpressionError::MissingPath { path: "a.b".into() };
        let err: HandlerError = expr_err.into();
        assert_eq!(err.kind, ErrorKind::Data);
        assert!(err.message.contains("a.b"));
    }
}
