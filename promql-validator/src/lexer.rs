//! Tokenizer for the PromQL subset.
//!
//! Produces a flat token stream with byte positions so parse errors can
//! point at the offending spot in the candidate string.

use crate::error::ParseError;

/// A single token with its starting byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Token kinds. Keywords (`by`, `offset`, `and`, ...) arrive as `Ident` and
/// are recognized by the parser, which keeps the lexer context-free.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    /// Duration literal like `5m`, `90s`, `1h30m`.
    Duration(String),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,

    Assign,        // =
    EqEq,          // ==
    NotEq,         // !=
    RegexMatch,    // =~
    RegexNotMatch, // !~
    Lt,
    Gt,
    Le,
    Ge,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
}

impl TokenKind {
    /// Short rendering used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier `{s}`"),
            TokenKind::Number(n) => format!("number `{n}`"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Duration(d) => format!("duration `{d}`"),
            TokenKind::LParen => "`(`".into(),
            TokenKind::RParen => "`)`".into(),
            TokenKind::LBrace => "`{`".into(),
            TokenKind::RBrace => "`}`".into(),
            TokenKind::LBracket => "`[`".into(),
            TokenKind::RBracket => "`]`".into(),
            TokenKind::Comma => "`,`".into(),
            TokenKind::Assign => "`=`".into(),
            TokenKind::EqEq => "`==`".into(),
            TokenKind::NotEq => "`!=`".into(),
            TokenKind::RegexMatch => "`=~`".into(),
            TokenKind::RegexNotMatch => "`!~`".into(),
            TokenKind::Lt => "`<`".into(),
            TokenKind::Gt => "`>`".into(),
            TokenKind::Le => "`<=`".into(),
            TokenKind::Ge => "`>=`".into(),
            TokenKind::Plus => "`+`".into(),
            TokenKind::Minus => "`-`".into(),
            TokenKind::Star => "`*`".into(),
            TokenKind::Slash => "`/`".into(),
            TokenKind::Percent => "`%`".into(),
            TokenKind::Caret => "`^`".into(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn is_duration_unit(c: char) -> bool {
    matches!(c, 's' | 'm' | 'h' | 'd' | 'w' | 'y')
}

/// Tokenizes `input` into a flat stream.
///
/// # Errors
/// Returns [`ParseError`] on an unterminated string or an unexpected
/// character, positioned at the offending byte.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let pos = i;
        let kind = match c {
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            '{' => {
                i += 1;
                TokenKind::LBrace
            }
            '}' => {
                i += 1;
                TokenKind::RBrace
            }
            '[' => {
                i += 1;
                TokenKind::LBracket
            }
            ']' => {
                i += 1;
                TokenKind::RBracket
            }
            ',' => {
                i += 1;
                TokenKind::Comma
            }
            '+' => {
                i += 1;
                TokenKind::Plus
            }
            '-' => {
                i += 1;
                TokenKind::Minus
            }
            '*' => {
                i += 1;
                TokenKind::Star
            }
            '/' => {
                i += 1;
                TokenKind::Slash
            }
            '%' => {
                i += 1;
                TokenKind::Percent
            }
            '^' => {
                i += 1;
                TokenKind::Caret
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::EqEq
                } else if bytes.get(i + 1) == Some(&b'~') {
                    i += 2;
                    TokenKind::RegexMatch
                } else {
                    i += 1;
                    TokenKind::Assign
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::NotEq
                } else if bytes.get(i + 1) == Some(&b'~') {
                    i += 2;
                    TokenKind::RegexNotMatch
                } else {
                    return Err(ParseError::new(pos, "unexpected `!`; expected `!=` or `!~`"));
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::Le
                } else {
                    i += 1;
                    TokenKind::Lt
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::Ge
                } else {
                    i += 1;
                    TokenKind::Gt
                }
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut value = String::new();
                loop {
                    match bytes.get(i) {
                        None => return Err(ParseError::new(pos, "unterminated string literal")),
                        Some(&b) => {
                            let ch = b as char;
                            i += 1;
                            if ch == quote {
                                break;
                            }
                            if ch == '\\' {
                                match bytes.get(i) {
                                    None => {
                                        return Err(ParseError::new(
                                            pos,
                                            "unterminated string literal",
                                        ));
                                    }
                                    Some(&esc) => {
                                        value.push(esc as char);
                                        i += 1;
                                    }
                                }
                            } else {
                                value.push(ch);
                            }
                        }
                    }
                }
                TokenKind::Str(value)
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }

                // Duration: digits immediately followed by a unit letter,
                // possibly compound (`1h30m`).
                if i < bytes.len() && is_duration_unit(bytes[i] as char) {
                    loop {
                        // consume the unit; `ms` is two letters
                        if bytes.get(i) == Some(&b'm') && bytes.get(i + 1) == Some(&b's') {
                            i += 2;
                        } else {
                            i += 1;
                        }
                        let digits = i;
                        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                            i += 1;
                        }
                        if i > digits && i < bytes.len() && is_duration_unit(bytes[i] as char) {
                            continue;
                        }
                        if i > digits {
                            return Err(ParseError::new(
                                start,
                                "invalid duration: trailing digits without a unit",
                            ));
                        }
                        break;
                    }
                    TokenKind::Duration(input[start..i].to_string())
                } else {
                    // Plain number with optional fraction/exponent.
                    if bytes.get(i) == Some(&b'.') {
                        i += 1;
                        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                            i += 1;
                        }
                    }
                    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
                        i += 1;
                        if matches!(bytes.get(i), Some(b'+') | Some(b'-')) {
                            i += 1;
                        }
                        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                            i += 1;
                        }
                    }
                    let text = &input[start..i];
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| ParseError::new(start, format!("invalid number `{text}`")))?;
                    TokenKind::Number(value)
                }
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < bytes.len() && is_ident_continue(bytes[i] as char) {
                    i += 1;
                }
                TokenKind::Ident(input[start..i].to_string())
            }
            other => {
                return Err(ParseError::new(pos, format!("unexpected character `{other}`")));
            }
        };

        tokens.push(Token { kind, pos });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_selector_with_matcher() {
        let toks = kinds(r#"node_cpu_seconds_total{mode="idle"}"#);
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("node_cpu_seconds_total".into()),
                TokenKind::LBrace,
                TokenKind::Ident("mode".into()),
                TokenKind::Assign,
                TokenKind::Str("idle".into()),
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn lexes_range_duration() {
        let toks = kinds("foo[5m]");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("foo".into()),
                TokenKind::LBracket,
                TokenKind::Duration("5m".into()),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn lexes_compound_duration() {
        let toks = kinds("[1h30m]");
        assert_eq!(
            toks,
            vec![
                TokenKind::LBracket,
                TokenKind::Duration("1h30m".into()),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn distinguishes_number_from_duration() {
        assert_eq!(kinds("42"), vec![TokenKind::Number(42.0)]);
        assert_eq!(kinds("0.95"), vec![TokenKind::Number(0.95)]);
        assert_eq!(kinds("90s"), vec![TokenKind::Duration("90s".into())]);
    }

    #[test]
    fn lexes_comparison_and_regex_operators() {
        assert_eq!(kinds("=~"), vec![TokenKind::RegexMatch]);
        assert_eq!(kinds("!~"), vec![TokenKind::RegexNotMatch]);
        assert_eq!(kinds("!="), vec![TokenKind::NotEq]);
        assert_eq!(kinds(">="), vec![TokenKind::Ge]);
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = tokenize(r#"{job="api"#).unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn rejects_stray_character() {
        let err = tokenize("up @ 5").unwrap_err();
        assert_eq!(err.position, 3);
    }

    #[test]
    fn colons_allowed_in_metric_names() {
        // Recording-rule names use colons.
        let toks = kinds("job:http_errors:rate5m");
        assert_eq!(
            toks,
            vec![TokenKind::Ident("job:http_errors:rate5m".into())]
        );
    }
}
