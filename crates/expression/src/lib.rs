#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Expression
//!
//! The expression and template evaluator that binds node outputs into
//! downstream inputs.
//!
//! Two syntaxes, identical semantics:
//!
//! - `{{path.expr}}` — value substitution. Paths are dotted, with `[n]`
//!   indices, `[-n]` from-the-end indices, and `[*]` list projection. The
//!   root namespace exposes `$input`, `$nodes.<id>.output`, `$execution.id`,
//!   `$execution.startedAt`, and a closed set of functions (`now()`,
//!   `uuid()`, `env("NAME")` against a whitelist). Bare paths resolve
//!   against `$input`.
//! - `${name}` — identifier-form paths only, for shell-style templates.
//!
//! A string that is exactly one expression yields the raw typed value;
//! expressions embedded in larger strings render by substitution. Missing
//! paths yield `Null` in [`Mode::Lenient`] (the engine default) and an error
//! in [`Mode::Strict`]. Evaluation is side-effect-free and `Send + Sync`.

pub mod error;
pub mod evaluator;
pub mod functions;
pub mod path;
pub mod scope;
pub mod template;

pub use error::ExpressionError;
pub use evaluator::{Evaluator, Mode};
pub use path::{Expr, PathSegment, parse_expression};
pub use scope::EvaluationScope;
pub use template::{Template, TemplatePart};
