//! Engine errors.

use cascade_core::{ExecutionId, FlowId};
use cascade_execution::{JournalError, PlanError};

/// Errors surfaced synchronously to engine callers.
///
/// Runtime node failures never appear here; they are recorded in the
/// journal and read back through it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No flow with that id and version is published.
    #[error("flow {flow_id} version {version} not found")]
    FlowNotFound {
        /// The requested flow.
        flow_id: FlowId,
        /// The requested version.
        version: semver::Version,
    },

    /// Plan-time validation failed; carries the full violation list.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The journal refused an operation.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// No running execution with that id.
    #[error("execution {0} is not running")]
    ExecutionNotRunning(ExecutionId),
}
