#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Resource
//!
//! Brokers for external clients with non-trivial setup cost: SQL connection
//! pools, search clients, HTTP clients with bespoke TLS.
//!
//! A [`Broker`] keys bounded [`Pool`]s by a content hash of their connection
//! parameters: pools are created lazily on first request, reaped by a
//! background task once idle past their TTL, and closed together on engine
//! shutdown. Checkouts hand handlers an RAII [`Guard`] that returns the
//! client on drop — handlers never hold a client across nodes and never
//! close broker-owned resources themselves.

pub mod broker;
pub mod error;
pub mod pool;
pub mod resource;

pub use broker::{Broker, BrokerConfig};
pub use error::ResourceError;
pub use pool::{Guard, Pool, PoolConfig, PoolStats};
pub use resource::PooledResource;
