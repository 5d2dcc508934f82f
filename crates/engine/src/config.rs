//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-level engine tunables.
///
/// Flow-level behavior (concurrency mode, execution timeout) comes from the
/// flow document itself; this struct covers everything the operator owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-execution cap on concurrently running nodes under `allow`
    /// concurrency.
    pub max_parallel: usize,
    /// How long after a cancellation broadcast the engine waits for running
    /// handlers before it stops watching them. Non-cooperating handlers
    /// keep their worker beyond this; their output is discarded.
    #[serde(with = "duration_secs")]
    pub cancellation_grace: Duration,
    /// Environment variables the expression function `env()` may read.
    #[serde(default)]
    pub env_whitelist: Vec<String>,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            cancellation_grace: Duration::from_secs(5),
            env_whitelist: Vec::new(),
        }
    }
}
