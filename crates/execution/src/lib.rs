#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Execution
//!
//! The persistent side of running a workflow:
//!
//! - [`ExecutionRecord`] and [`NodeExecutionRecord`] — the journal rows, one
//!   per run and one per scheduled node attempt
//! - [`ExecutionStatus`] / [`NodeStatus`] — the two state machines, with
//!   transitions validated by the [`transition`] module
//! - [`Journal`] — the system-of-record trait, with [`MemoryJournal`] as the
//!   in-process implementation
//! - [`IdempotencyKey`] — derived at-most-once keys exposed to handlers
//! - [`ExecutionPlan`] and [`PlanBuilder`] — the validated, content-addressed
//!   derivation of a flow document that the scheduler runs
//!
//! This crate holds no orchestration; the scheduler lives in
//! `cascade-engine` and drives everything here.

pub mod error;
pub mod idempotency;
pub mod journal;
pub mod memory;
pub mod plan;
pub mod record;
pub mod status;
pub mod transition;

pub use error::JournalError;
pub use idempotency::IdempotencyKey;
pub use journal::{Journal, NodeTransition, Page};
pub use memory::MemoryJournal;
pub use plan::{ExecutionPlan, PlanBuilder, PlanError, PlanNode, PlanViolation, ViolationCode};
pub use record::{ExecutionRecord, NodeExecutionRecord};
pub use status::{ExecutionStatus, NodeStatus};
