//! Expression lexer and parser.
//!
//! A small hand-written lexer (identifier, dot, `[n]`, `[-n]`, `[*]`,
//! function-call parens, string literal) so parse errors can point at byte
//! offsets instead of the whole expression.

use crate::error::ExpressionError;

/// One segment of a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Member access by key (`user.name`).
    Key(String),
    /// List index; negative counts from the end (`items[-1]`).
    Index(i64),
    /// List projection (`items[*].field`).
    Wildcard,
}

/// A parsed expression: either a path lookup or a function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Dotted path with indices and projections.
    Path(Vec<PathSegment>),
    /// Call into the closed function table.
    Call {
        /// Function name.
        name: String,
        /// String-literal arguments.
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Int(i64),
    Star,
    Str(String),
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn is_ident_start(b: u8) -> bool {
        b.is_ascii_alphabetic() || b == b'_' || b == b'$'
    }

    fn is_ident_continue(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
    }

    /// Produce the next token and its starting offset, or `None` at the end.
    fn next(&mut self) -> Result<Option<(Token, usize)>, ExpressionError> {
        self.skip_ws();
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let start = self.pos;
        let b = self.bytes[self.pos];
        let token = match b {
            b'.' => {
                self.pos += 1;
                Token::Dot
            }
            b'[' => {
                self.pos += 1;
                Token::LBracket
            }
            b']' => {
                self.pos += 1;
                Token::RBracket
            }
            b'(' => {
                self.pos += 1;
                Token::LParen
            }
            b')' => {
                self.pos += 1;
                Token::RParen
            }
            b',' => {
                self.pos += 1;
                Token::Comma
            }
            b'*' => {
                self.pos += 1;
                Token::Star
            }
            b'"' | b'\'' => {
                let quote = b;
                self.pos += 1;
                let content_start = self.pos;
                while self.pos < self.bytes.len() && self.bytes[self.pos] != quote {
                    self.pos += 1;
                }
                if self.pos >= self.bytes.len() {
                    return Err(ExpressionError::parse("unterminated string literal", start));
                }
                let s = self.src[content_start..self.pos].to_owned();
                self.pos += 1;
                Token::Str(s)
            }
            b'-' | b'0'..=b'9' => {
                self.pos += 1;
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let text = &self.src[start..self.pos];
                let n = text.parse::<i64>().map_err(|_| {
                    ExpressionError::parse(format!("invalid integer `{text}`"), start)
                })?;
                Token::Int(n)
            }
            b if Self::is_ident_start(b) => {
                self.pos += 1;
                while self.pos < self.bytes.len() && Self::is_ident_continue(self.bytes[self.pos])
                {
                    self.pos += 1;
                }
                Token::Ident(self.src[start..self.pos].to_owned())
            }
            other => {
                return Err(ExpressionError::parse(
                    format!("unexpected character {:?}", other as char),
                    start,
                ));
            }
        };
        Ok(Some((token, start)))
    }
}

fn lex(src: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next()? {
        tokens.push(tok);
    }
    Ok(tokens)
}

/// Parse one expression (the text between `{{` and `}}`).
pub fn parse_expression(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Err(ExpressionError::parse("empty expression", 0));
    }

    // Function call: ident '(' args ')'
    if let [(Token::Ident(name), _), (Token::LParen, _), rest @ ..] = tokens.as_slice() {
        return parse_call(name, rest, src.len());
    }

    parse_path(&tokens, src.len())
}

/// Parse a `${name}` body: identifier-form paths only.
pub fn parse_identifier_path(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Err(ExpressionError::parse("empty expression", 0));
    }
    for (token, offset) in &tokens {
        if !matches!(token, Token::Ident(_) | Token::Dot) {
            return Err(ExpressionError::parse(
                "only identifier paths are allowed in ${...}",
                *offset,
            ));
        }
    }
    parse_path(&tokens, src.len())
}

fn parse_call(name: &str, rest: &[(Token, usize)], end: usize) -> Result<Expr, ExpressionError> {
    let mut args = Vec::new();
    let mut iter = rest.iter().peekable();
    loop {
        match iter.next() {
            Some((Token::RParen, _)) => break,
            Some((Token::Str(s), _)) => {
                args.push(s.clone());
                match iter.next() {
                    Some((Token::Comma, _)) => {}
                    Some((Token::RParen, _)) => break,
                    Some((_, offset)) => {
                        return Err(ExpressionError::parse(
                            "expected `,` or `)` after argument",
                            *offset,
                        ));
                    }
                    None => return Err(ExpressionError::parse("unterminated call", end)),
                }
            }
            Some((_, offset)) => {
                return Err(ExpressionError::parse(
                    "function arguments must be string literals",
                    *offset,
                ));
            }
            None => return Err(ExpressionError::parse("unterminated call", end)),
        }
    }
    if iter.next().is_some() {
        return Err(ExpressionError::parse("trailing input after call", end));
    }
    Ok(Expr::Call {
        name: name.to_owned(),
        args,
    })
}

fn parse_path(tokens: &[(Token, usize)], end: usize) -> Result<Expr, ExpressionError> {
    let mut segments = Vec::new();
    let mut iter = tokens.iter().peekable();

    match iter.next() {
        Some((Token::Ident(name), _)) => segments.push(PathSegment::Key(name.clone())),
        Some((_, offset)) => {
            return Err(ExpressionError::parse(
                "path must start with an identifier",
                *offset,
            ));
        }
        None => return Err(ExpressionError::parse("empty expression", 0)),
    }

    while let Some((token, offset)) = iter.next() {
        match token {
            Token::Dot => match iter.next() {
                Some((Token::Ident(name), _)) => segments.push(PathSegment::Key(name.clone())),
                Some((_, offset)) => {
                    return Err(ExpressionError::parse("expected identifier after `.`", *offset));
                }
                None => return Err(ExpressionError::parse("path ends with `.`", end)),
            },
            Token::LBracket => {
                match iter.next() {
                    Some((Token::Int(n), _)) => segments.push(PathSegment::Index(*n)),
                    Some((Token::Star, _)) => segments.push(PathSegment::Wildcard),
                    Some((_, offset)) => {
                        return Err(ExpressionError::parse(
                            "expected integer or `*` inside `[...]`",
                            *offset,
                        ));
                    }
                    None => return Err(ExpressionError::parse("unterminated `[`", end)),
                }
                match iter.next() {
                    Some((Token::RBracket, _)) => {}
                    Some((_, offset)) => {
                        return Err(ExpressionError::parse("expected `]`", *offset));
                    }
                    None => return Err(ExpressionError::parse("unterminated `[`", end)),
                }
            }
            _ => {
                return Err(ExpressionError::parse(
                    "expected `.` or `[` in path",
                    *offset,
                ));
            }
        }
    }

    Ok(Expr::Path(segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(parts: &[&str]) -> Vec<PathSegment> {
        parts
            .iter()
            .map(|p| PathSegment::Key((*p).to_owned()))
            .collect()
    }

    #[test]
    fn simple_dotted_path() {
        assert_eq!(
            parse_expression("user.address.city").unwrap(),
            Expr::Path(keys(&["user", "address", "city"]))
        );
    }

    #[test]
    fn namespace_root() {
        assert_eq!(
            parse_expression("$nodes.setKV.output.v").unwrap(),
            Expr::Path(keys(&["$nodes", "setKV", "output", "v"]))
        );
    }

    #[test]
    fn indices_and_wildcard() {
        assert_eq!(
            parse_expression("items[0].name").unwrap(),
            Expr::Path(vec![
                PathSegment::Key("items".into()),
                PathSegment::Index(0),
                PathSegment::Key("name".into()),
            ])
        );
        assert_eq!(
            parse_expression("items[-1]").unwrap(),
            Expr::Path(vec![
                PathSegment::Key("items".into()),
                PathSegment::Index(-1),
            ])
        );
        assert_eq!(
            parse_expression("items[*].field").unwrap(),
            Expr::Path(vec![
                PathSegment::Key("items".into()),
                PathSegment::Wildcard,
                PathSegment::Key("field".into()),
            ])
        );
    }

    #[test]
    fn call_no_args() {
        assert_eq!(
            parse_expression("now()").unwrap(),
            Expr::Call {
                name: "now".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn call_with_string_arg() {
        assert_eq!(
            parse_expression("env(\"HOME\")").unwrap(),
            Expr::Call {
                name: "env".into(),
                args: vec!["HOME".into()],
            }
        );
        // Single quotes too.
        assert_eq!(
            parse_expression("env('PATH')").unwrap(),
            Expr::Call {
                name: "env".into(),
                args: vec!["PATH".into()],
            }
        );
    }

    #[test]
    fn errors_carry_offsets() {
        let err = parse_expression("items[x]").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Parse {
                message: "expected integer or `*` inside `[...]`".into(),
                offset: 6,
            }
        );

        let err = parse_expression("a..b").unwrap_err();
        match err {
            ExpressionError::Parse { offset, .. } => assert_eq!(offset, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_expression_rejected() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("   ").is_err());
    }

    #[test]
    fn identifier_path_rejects_brackets() {
        assert!(parse_identifier_path("user.name").is_ok());
        let err = parse_identifier_path("items[0]").unwrap_err();
        match err {
            ExpressionError::Parse { offset, .. } => assert_eq!(offset, 5),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_literal() {
        let err = parse_expression("env(\"HOME)").unwrap_err();
        match err {
            ExpressionError::Parse { message, .. } => {
                assert!(message.contains("unterminated string"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
