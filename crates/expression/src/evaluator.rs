//! Expression evaluation against a scope.

use std::collections::BTreeSet;

use cascade_value::Value;

use crate::error::ExpressionError;
use crate::functions;
use crate::path::{Expr, PathSegment, parse_expression};
use crate::scope::EvaluationScope;
use crate::template::Template;

/// Missing-path behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Missing paths resolve to `Null`. The engine default.
    #[default]
    Lenient,
    /// Missing paths raise an evaluation error. Handler opt-in.
    Strict,
}

/// The expression evaluator.
///
/// Holds only immutable configuration (the `env()` whitelist), so one
/// evaluator is shared by every concurrent node of every execution.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    env_whitelist: BTreeSet<String>,
}

impl Evaluator {
    /// Create an evaluator with an empty `env()` whitelist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `env()` access to the named variables.
    #[must_use]
    pub fn with_env_whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_whitelist = names.into_iter().map(Into::into).collect();
        self
    }

    /// Evaluate a lone expression (the text between `{{` and `}}`).
    pub fn evaluate(
        &self,
        src: &str,
        scope: &EvaluationScope,
        mode: Mode,
    ) -> Result<Value, ExpressionError> {
        let expr = parse_expression(src)?;
        self.eval_expr(&expr, scope, mode)
    }

    /// Render a template string: `{{...}}` and `${...}` substitution.
    ///
    /// A string that is exactly one expression yields the raw typed value;
    /// anything else renders to a `Value::String`.
    pub fn render(
        &self,
        src: &str,
        scope: &EvaluationScope,
        mode: Mode,
    ) -> Result<Value, ExpressionError> {
        Template::parse(src)?.render(self, scope, mode)
    }

    /// Render a JSON config value: strings go through [`render`](Self::render),
    /// arrays and objects recurse, everything else converts verbatim.
    pub fn render_config_value(
        &self,
        json: &serde_json::Value,
        scope: &EvaluationScope,
        mode: Mode,
    ) -> Result<Value, ExpressionError> {
        match json {
            serde_json::Value::String(s) => self.render(s, scope, mode),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| self.render_config_value(item, scope, mode))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.render_config_value(v, scope, mode)?)))
                .collect::<Result<cascade_value::Object, ExpressionError>>()
                .map(Value::Object),
            other => Ok(Value::from_json(other.clone())),
        }
    }

    pub(crate) fn eval_expr(
        &self,
        expr: &Expr,
        scope: &EvaluationScope,
        mode: Mode,
    ) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Call { name, args } => functions::call(name, args, &self.env_whitelist),
            Expr::Path(segments) => self.resolve_root(segments, scope, mode),
        }
    }

    fn resolve_root(
        &self,
        segments: &[PathSegment],
        scope: &EvaluationScope,
        mode: Mode,
    ) -> Result<Value, ExpressionError> {
        let PathSegment::Key(root) = &segments[0] else {
            // parse_path always emits a leading key
            return Err(ExpressionError::MissingPath {
                path: fmt_segments(segments),
            });
        };

        match root.as_str() {
            "$input" => resolve_segments(&scope.input, &segments[1..], mode, segments),
            "$execution" => {
                let Some(PathSegment::Key(field)) = segments.get(1) else {
                    return missing(segments, mode);
                };
                match scope.execution_value(field) {
                    Some(v) => resolve_segments(&v, &segments[2..], mode, segments),
                    None => missing(segments, mode),
                }
            }
            "$nodes" => {
                // $nodes.<id>.output.<rest>
                let Some(PathSegment::Key(node_id)) = segments.get(1) else {
                    return missing(segments, mode);
                };
                let Some(output) = scope
                    .node_outputs
                    .iter()
                    .find(|(key, _)| key.as_str() == node_id)
                    .map(|(_, v)| v)
                else {
                    return missing(segments, mode);
                };
                match segments.get(2) {
                    Some(PathSegment::Key(field)) if field == "output" => {
                        resolve_segments(output, &segments[3..], mode, segments)
                    }
                    _ => missing(segments, mode),
                }
            }
            other if other.starts_with('$') => missing(segments, mode),
            _ => resolve_segments(&scope.input, segments, mode, segments),
        }
    }
}

fn missing(segments: &[PathSegment], mode: Mode) -> Result<Value, ExpressionError> {
    match mode {
        Mode::Lenient => Ok(Value::Null),
        Mode::Strict => Err(ExpressionError::MissingPath {
            path: fmt_segments(segments),
        }),
    }
}

fn fmt_segments(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        match seg {
            PathSegment::Key(k) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathSegment::Index(n) => {
                out.push('[');
                out.push_str(&n.to_string());
                out.push(']');
            }
            PathSegment::Wildcard => out.push_str("[*]"),
        }
    }
    out
}

fn resolve_segments(
    value: &Value,
    rest: &[PathSegment],
    mode: Mode,
    full: &[PathSegment],
) -> Result<Value, ExpressionError> {
    let Some((segment, tail)) = rest.split_first() else {
        return Ok(value.clone());
    };

    match segment {
        PathSegment::Key(key) => match value.get(key) {
            Some(inner) => resolve_segments(inner, tail, mode, full),
            None => missing(full, mode),
        },
        PathSegment::Index(idx) => {
            if value.as_list().is_none() {
                return match mode {
                    Mode::Lenient => Ok(Value::Null),
                    Mode::Strict => Err(ExpressionError::NotIndexable {
                        kind: value.kind().to_string(),
                        path: fmt_segments(full),
                    }),
                };
            }
            match value.index(*idx) {
                Some(inner) => resolve_segments(inner, tail, mode, full),
                None => missing(full, mode),
            }
        }
        PathSegment::Wildcard => match value.as_list() {
            Some(items) => items
                .iter()
                .map(|item| resolve_segments(item, tail, mode, full))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            None => match mode {
                Mode::Lenient => Ok(Value::Null),
                Mode::Strict => Err(ExpressionError::NotIndexable {
                    kind: value.kind().to_string(),
                    path: fmt_segments(full),
                }),
            },
        },
    }
}
