//! Static handler metadata.

use std::time::Duration;

use cascade_core::HandlerKey;
use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// An input or output connection point on a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port key (e.g. `"input"`, `"output"`).
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Short description of what flows through this port.
    #[serde(default)]
    pub description: String,
}

impl Port {
    /// Create a port whose name equals its key.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            description: String::new(),
        }
    }

    /// The default input port.
    #[must_use]
    pub fn input() -> Self {
        Self::new("input")
    }

    /// The default output port.
    #[must_use]
    pub fn output() -> Self {
        Self::new("output")
    }
}

/// Port interface of a handler: what it accepts and produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDefinition {
    /// Input ports.
    pub inputs: Vec<Port>,
    /// Output ports.
    pub outputs: Vec<Port>,
}

impl Default for InterfaceDefinition {
    /// One default input, one default output.
    fn default() -> Self {
        Self {
            inputs: vec![Port::input()],
            outputs: vec![Port::output()],
        }
    }
}

/// Handler-declared retry policy, honored by the engine's node runner.
///
/// Retries apply only to transient failures (`Upstream`,
/// `ResourceExhausted`); every attempt is journaled as its own row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (≥ 1).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    #[serde(with = "backoff_millis")]
    pub backoff: Duration,
}

mod backoff_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Static metadata describing a handler type.
///
/// Used by the plan builder for validation, by the scheduler for dispatch
/// decisions, and by the editor for discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerMetadata {
    /// Registry key; matches `node.type` in flow documents.
    pub key: HandlerKey,
    /// Human-readable display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Category for UI grouping (e.g. `"core"`, `"database"`).
    pub category: String,
    /// Whether this handler may be a flow's start node.
    pub is_trigger: bool,
    /// Hint that `execute` performs I/O and suspends; the scheduler must not
    /// let its waits block other nodes.
    pub supports_async: bool,
    /// Handler-declared ceiling on its own execution time.
    pub max_timeout: Option<Duration>,
    /// Declared retry policy, if the handler opts into retries.
    pub retry: Option<RetryPolicy>,
    /// Acceptable config shape.
    pub config_schema: Schema,
    /// Port interface.
    pub interface: InterfaceDefinition,
}

impl HandlerMetadata {
    /// Create metadata with the minimum required fields.
    pub fn new(key: HandlerKey, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            description: description.into(),
            category: String::new(),
            is_trigger: false,
            supports_async: false,
            max_timeout: None,
            retry: None,
            config_schema: Schema::empty(),
            interface: InterfaceDefinition::default(),
        }
    }

    /// Set the UI category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Mark as a trigger (permitted start node).
    #[must_use]
    pub fn trigger(mut self) -> Self {
        self.is_trigger = true;
        // Triggers have no data input.
        self.interface.inputs.clear();
        self
    }

    /// Mark as performing async I/O.
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.supports_async = true;
        self
    }

    /// Declare a ceiling on execution time.
    #[must_use]
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    /// Declare a retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the config schema.
    #[must_use]
    pub fn with_config_schema(mut self, schema: Schema) -> Self {
        self.config_schema = schema;
        self
    }

    /// Set the port interface.
    #[must_use]
    pub fn with_interface(mut self, interface: InterfaceDefinition) -> Self {
        self.interface = interface;
        self
    }
}
