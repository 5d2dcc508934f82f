#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Core
//!
//! Shared foundation types for the Cascade workflow engine:
//!
//! - [`ExecutionId`], [`FlowId`], [`PrincipalId`], [`CredentialId`] —
//!   strongly-typed UUID identifiers
//! - [`NodeKey`], [`HandlerKey`] — validated string keys used for graph nodes
//!   and handler registry entries
//! - [`ErrorKind`] and [`ErrorInfo`] — the stable, consumer-facing error
//!   taxonomy recorded in the execution journal

pub mod error;
pub mod id;
pub mod key;

pub use error::{ErrorInfo, ErrorKind};
pub use id::{CredentialId, ExecutionId, FlowId, PrincipalId};
pub use key::{HandlerKey, KeyError, NodeKey};
