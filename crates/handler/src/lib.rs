#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Handler
//!
//! The uniform contract every executable node type obeys.
//!
//! A node type registers a [`Handler`]: static [`HandlerMetadata`] (registry
//! key, trigger flag, async hint, config [`Schema`], port interface, optional
//! retry policy) plus an `execute` method driven by the engine. Integration
//! handlers exposing a `(resource, operation)` matrix implement
//! [`OperationHandler`] instead and register through [`OperationAdapter`],
//! which routes on the node config's `resource` / `operation` fields.
//!
//! Handlers receive a [`NodeContext`]: immutable input, opaque config, the
//! expression evaluator, cancellation signal, and capability ports
//! ([`CredentialResolver`], [`NodeLogger`], [`Clock`]). The contract:
//!
//! - inputs are immutable for the duration of the call;
//! - no capability may be retained past `execute`'s return;
//! - ordinary domain failures travel through [`HandlerError`], never panics;
//! - external-service failures carry a stable `ErrorKind` from
//!   `cascade_core`.

pub mod context;
pub mod credential;
pub mod error;
pub mod handler;
pub mod metadata;
pub mod operation;
pub mod registry;
pub mod result;
pub mod schema;
pub mod testing;

pub use context::{Clock, NodeContext, NodeLogger, SystemClock};
pub use credential::{
    CredentialError, CredentialPayload, CredentialResolver, MemoryCredentials, SecureString,
};
pub use error::HandlerError;
pub use handler::Handler;
pub use metadata::{HandlerMetadata, InterfaceDefinition, Port, RetryPolicy};
pub use operation::{OperationAdapter, OperationDef, OperationHandler, ResourceDef};
pub use registry::HandlerRegistry;
pub use result::HandlerOutput;
pub use schema::{FieldDef, FieldFormat, FieldKind, Schema, Violation};
