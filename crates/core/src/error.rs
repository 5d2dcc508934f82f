//! The stable error taxonomy surfaced to journal consumers.
//!
//! Every failure recorded on a node execution carries an [`ErrorKind`] from
//! this closed set. The wire names are stable for consumers; adding a kind
//! is a versioned change.

use serde::{Deserialize, Serialize};

/// Classification of a node or execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Plan-time or per-node config invalid; unrecoverable without editing
    /// the flow.
    Config,
    /// Credential missing, unauthorized, or rejected by the remote service.
    Credential,
    /// Node or execution exceeded its allowed time.
    Timeout,
    /// Cooperatively halted by the engine or the caller.
    Cancelled,
    /// An external service returned a failure response.
    Upstream,
    /// Broker or worker-pool acquisition failed.
    ResourceExhausted,
    /// Handler internal error (bug, unexpected shape, script fault).
    Runtime,
    /// No value at a required path, or a handler rejected malformed input.
    Data,
}

impl ErrorKind {
    /// Returns `true` for kinds a declared retry policy may retry on.
    ///
    /// Only transient external conditions qualify; config, data, and
    /// cancellation failures repeat deterministically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream | Self::ResourceExhausted)
    }

    /// Returns `true` if the failure was caused by the engine halting the
    /// node rather than the node itself failing.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Timeout | Self::Cancelled)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Config => "CONFIG",
            Self::Credential => "CREDENTIAL",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Upstream => "UPSTREAM",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Runtime => "RUNTIME",
            Self::Data => "DATA",
        };
        f.write_str(s)
    }
}

/// The serializable error payload stored on journal rows.
///
/// `stack` is only present when a handler chose to include one; the engine
/// never writes its own backtraces here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional handler-supplied stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorInfo {
    /// Create an error payload.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a handler-supplied stack trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// The payload recorded when the engine itself faults.
    ///
    /// The real cause goes to the operator log only.
    #[must_use]
    pub fn engine_internal() -> Self {
        Self::new(ErrorKind::Runtime, "engine internal error")
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Upstream.is_retryable());
        assert!(ErrorKind::ResourceExhausted.is_retryable());

        assert!(!ErrorKind::Config.is_retryable());
        assert!(!ErrorKind::Credential.is_retryable());
        assert!(!ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::Runtime.is_retryable());
        assert!(!ErrorKind::Data.is_retryable());
    }

    #[test]
    fn interruption_kinds() {
        assert!(ErrorKind::Timeout.is_interruption());
        assert!(ErrorKind::Cancelled.is_interruption());
        assert!(!ErrorKind::Upstream.is_interruption());
    }

    #[test]
    fn wire_names_are_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ResourceExhausted).unwrap();
        assert_eq!(json, "\"RESOURCE_EXHAUSTED\"");
        let json = serde_json::to_string(&ErrorKind::Config).unwrap();
        assert_eq!(json, "\"CONFIG\"");
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(ErrorKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(
            ErrorKind::ResourceExhausted.to_string(),
            "RESOURCE_EXHAUSTED"
        );
    }

    #[test]
    fn info_without_stack_omits_field() {
        let info = ErrorInfo::new(ErrorKind::Upstream, "503 from api.example.com");
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("stack").is_none());
    }

    #[test]
    fn info_with_stack_roundtrips() {
        let info = ErrorInfo::new(ErrorKind::Runtime, "boom").with_stack("at line 3");
        let json = serde_json::to_string(&info).unwrap();
        let back: ErrorInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn engine_internal_is_opaque() {
        let info = ErrorInfo::engine_internal();
        assert_eq!(info.kind, ErrorKind::Runtime);
        assert_eq!(info.message, "engine internal error");
        assert!(info.stack.is_none());
    }
}
