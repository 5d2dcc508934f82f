//! Handler output.

use cascade_value::{Object, Value};

/// The successful result of one handler execution.
///
/// The engine journals the output, stamps the duration itself (a duration
/// reported by a handler is ignored), and propagates the value to
/// successors as a shared read-only reference.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    /// The produced value. By convention an object, but the engine does not
    /// enforce a shape.
    pub output: Value,
}

impl HandlerOutput {
    /// Wrap a value.
    #[must_use]
    pub fn new(output: Value) -> Self {
        Self { output }
    }

    /// An empty object output.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            output: Value::empty_object(),
        }
    }

    /// Build an object output from entries.
    #[must_use]
    pub fn object(entries: Object) -> Self {
        Self {
            output: Value::Object(entries),
        }
    }
}

impl From<Value> for HandlerOutput {
    fn from(output: Value) -> Self {
        Self { output }
    }
}
