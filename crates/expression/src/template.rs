//! Template parsing and rendering.
//!
//! A template is split once into static text and expression parts, each
//! part remembering its byte offset for error reporting. Rendering a
//! template that consists of exactly one expression yields the raw typed
//! value; everything else substitutes into a string.

use cascade_value::Value;

use crate::error::ExpressionError;
use crate::evaluator::{Evaluator, Mode};
use crate::path::{Expr, parse_expression, parse_identifier_path};
use crate::scope::EvaluationScope;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text copied through unchanged.
    Static {
        /// The text.
        text: String,
        /// Byte offset in the template source.
        offset: usize,
    },
    /// An expression to evaluate at render time.
    Expression {
        /// Parsed expression.
        expr: Expr,
        /// Original source between the delimiters, for error messages.
        src: String,
        /// Byte offset of the opening delimiter.
        offset: usize,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Parse a template string.
    ///
    /// Recognizes `{{ expr }}` (full expressions) and `${ path }`
    /// (identifier paths). A lone `$` or `{` is literal text.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let bytes = source.as_bytes();
        let mut parts = Vec::new();
        let mut static_start = 0;
        let mut i = 0;

        let flush_static = |parts: &mut Vec<TemplatePart>, from: usize, to: usize| {
            if from < to {
                parts.push(TemplatePart::Static {
                    text: source[from..to].to_owned(),
                    offset: from,
                });
            }
        };

        while i < bytes.len() {
            if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                let close = source[i + 2..]
                    .find("}}")
                    .ok_or(ExpressionError::Unterminated { offset: i })?;
                flush_static(&mut parts, static_start, i);
                let inner = &source[i + 2..i + 2 + close];
                parts.push(TemplatePart::Expression {
                    expr: parse_expression(inner.trim())?,
                    src: inner.trim().to_owned(),
                    offset: i,
                });
                i += 2 + close + 2;
                static_start = i;
            } else if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                let close = source[i + 2..]
                    .find('}')
                    .ok_or(ExpressionError::Unterminated { offset: i })?;
                flush_static(&mut parts, static_start, i);
                let inner = &source[i + 2..i + 2 + close];
                parts.push(TemplatePart::Expression {
                    expr: parse_identifier_path(inner.trim())?,
                    src: inner.trim().to_owned(),
                    offset: i,
                });
                i += 2 + close + 1;
                static_start = i;
            } else {
                i += 1;
            }
        }
        flush_static(&mut parts, static_start, bytes.len());

        Ok(Self { parts })
    }

    /// The parsed parts.
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Returns `true` if the template is exactly one expression with no
    /// surrounding text — the case that yields a raw typed value.
    #[must_use]
    pub fn is_single_expression(&self) -> bool {
        matches!(self.parts.as_slice(), [TemplatePart::Expression { .. }])
    }

    /// Render against a scope.
    pub fn render(
        &self,
        evaluator: &Evaluator,
        scope: &EvaluationScope,
        mode: Mode,
    ) -> Result<Value, ExpressionError> {
        if let [TemplatePart::Expression { expr, .. }] = self.parts.as_slice() {
            return evaluator.eval_expr(expr, scope, mode);
        }

        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Static { text, .. } => out.push_str(text),
                TemplatePart::Expression { expr, .. } => {
                    let value = evaluator.eval_expr(expr, scope, mode)?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(Value::String(out))
    }
}
