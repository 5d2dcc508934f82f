#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Value
//!
//! The canonical representation of everything that flows along workflow
//! edges: node inputs, node outputs, and the execution's input and output
//! documents.
//!
//! [`Value`] is a recursive variant over `Null`, `Bool`, `Int`, `Float`,
//! `String`, `Bytes`, `List`, and `Object`. Values map losslessly to and
//! from JSON with one documented exception: `Bytes` is base64-encoded on
//! the wire (and therefore deserializes back as `String`). Dates are
//! ISO-8601 strings; the engine does not own a distinct date type.
//!
//! Objects are ordered maps keyed lexicographically, which makes every
//! fan-in merge and output assembly deterministic.

pub mod value;

pub use value::{Object, Value, ValueKind};
