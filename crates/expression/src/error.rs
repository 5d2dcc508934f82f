//! Evaluation errors with source offsets.

/// Errors from parsing or evaluating an expression or template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// The expression text failed to lex or parse.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// What went wrong.
        message: String,
        /// Byte offset into the expression source.
        offset: usize,
    },

    /// A template had an unterminated `{{` or `${` opener.
    #[error("unterminated expression opened at offset {offset}")]
    Unterminated {
        /// Byte offset of the opener.
        offset: usize,
    },

    /// Strict mode: a path resolved to nothing.
    #[error("no value at path `{path}`")]
    MissingPath {
        /// The dotted path that failed to resolve.
        path: String,
    },

    /// A function outside the closed table was called.
    #[error("unknown function `{name}`")]
    UnknownFunction {
        /// The function name.
        name: String,
    },

    /// A function was called with the wrong arguments.
    #[error("function `{name}`: {message}")]
    BadArguments {
        /// The function name.
        name: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// `env()` was called for a variable outside the whitelist.
    #[error("environment variable `{name}` is not whitelisted")]
    EnvNotWhitelisted {
        /// The requested variable name.
        name: String,
    },

    /// A non-list value was indexed or projected.
    #[error("cannot index into {kind} at path `{path}`")]
    NotIndexable {
        /// Kind of the value that was indexed.
        kind: String,
        /// The path up to the failing segment.
        path: String,
    },
}

impl ExpressionError {
    pub(crate) fn parse(message: impl Into<String>, offset: usize) -> Self {
        Self::Parse {
            message: message.into(),
            offset,
        }
    }
}
