//! The closed function table.
//!
//! Flows serialize function names, so this table is versioned API: adding a
//! function is a versioned change, and nothing outside this module may
//! extend it at runtime.

use std::collections::BTreeSet;

use cascade_value::Value;
use chrono::{SecondsFormat, Utc};

use crate::error::ExpressionError;

/// Names of every callable function, in call order of likelihood.
pub const FUNCTION_NAMES: &[&str] = &["now", "uuid", "env"];

/// Dispatch a function call.
///
/// `env_whitelist` gates `env()`: variables outside the set are refused
/// regardless of whether they exist in the process environment.
pub fn call(
    name: &str,
    args: &[String],
    env_whitelist: &BTreeSet<String>,
) -> Result<Value, ExpressionError> {
    match name {
        "now" => {
            expect_arity(name, args, 0)?;
            Ok(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ))
        }
        "uuid" => {
            expect_arity(name, args, 0)?;
            Ok(Value::String(uuid::Uuid::new_v4().to_string()))
        }
        "env" => {
            expect_arity(name, args, 1)?;
            let var = &args[0];
            if !env_whitelist.contains(var.as_str()) {
                return Err(ExpressionError::EnvNotWhitelisted { name: var.clone() });
            }
            Ok(std::env::var(var).map_or(Value::Null, Value::String))
        }
        other => Err(ExpressionError::UnknownFunction {
            name: other.to_owned(),
        }),
    }
}

fn expect_arity(name: &str, args: &[String], want: usize) -> Result<(), ExpressionError> {
    if args.len() == want {
        Ok(())
    } else {
        Err(ExpressionError::BadArguments {
            name: name.to_owned(),
            message: format!("expected {want} argument(s), got {}", args.len()),
        })
    }
}
