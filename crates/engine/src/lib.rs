#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Engine
//!
//! The runtime that accepts a flow document plus an input document,
//! schedules each node in dependency order with bounded parallelism,
//! propagates values along edges, and records every step in the journal.
//!
//! [`Engine`] is the entry point: resolve a flow through the [`FlowStore`],
//! validate it into a plan, then either [`Engine::start_execution`] (returns
//! the new execution id immediately, runs asynchronously) or
//! [`Engine::run_to_completion`] (blocks until terminal status). Progress is
//! observable through journal reads and the [`EventBus`].
//!
//! The scheduler advances a ready set: a node becomes READY the moment its
//! last predecessor succeeds, its fan-in merge is frozen into the journal,
//! and it is dispatched subject to the flow's concurrency policy. Failures
//! prune exactly the subtree behind them; independent branches keep going.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ingress;
mod runner;
mod scheduler;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::EngineError;
pub use events::{EventBus, ExecutionEvent};
pub use ingress::{ExecutionRequest, FlowStore, MemoryFlowStore};
