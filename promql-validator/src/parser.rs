//! Recursive-descent parser for the PromQL subset.
//!
//! Supported syntax:
//! - Vector selectors: `metric`, `metric{label="v", other=~"re"}`, bare `{...}`
//! - Ranges and offsets: `metric[5m]`, `metric[5m] offset 1h`
//! - Functions: `rate(x[5m])`, `histogram_quantile(0.9, x)`
//! - Aggregations: `sum by (job) (x)`, `topk(5, x)`, `count(x) without (mode)`
//! - Binary operators: arithmetic, comparison, `and`/`or`/`unless`
//! - Unary minus, parentheses, number and string literals

use crate::ast::{AggOp, BinOp, Expr, Grouping, LabelMatcher, MatchOp, VectorSelector};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, tokenize};

/// Parses a complete expression; trailing tokens are an error.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::new(0, "empty expression"));
    }
    let tokens = tokenize(input)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = p.parse_expr(0)?;
    if let Some(tok) = p.peek() {
        return Err(ParseError::new(
            tok.pos,
            format!("unexpected {} after expression", tok.kind.describe()),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Byte length of the input, used as the position of end-of-input errors.
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn here(&self) -> usize {
        self.peek().map(|t| t.pos).unwrap_or(self.end)
    }

    fn expect(&mut self, want: &TokenKind, what: &str) -> Result<Token, ParseError> {
        match self.next() {
            Some(t) if t.kind == *want => Ok(t),
            Some(t) => Err(ParseError::new(
                t.pos,
                format!("expected {what}, found {}", t.kind.describe()),
            )),
            None => Err(ParseError::new(self.end, format!("expected {what}, found end of input"))),
        }
    }

    /// Is the upcoming identifier the given lowercase keyword?
    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s == word)
    }

    /* ---------------- expression levels ---------------- */

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, prec, right_assoc)) = self.peek_binop() {
            if prec < min_prec {
                break;
            }
            self.next();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let rhs = self.parse_expr(next_min)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<(BinOp, u8, bool)> {
        let kind = self.peek_kind()?;
        Some(match kind {
            TokenKind::Ident(s) if s == "or" => (BinOp::Or, 1, false),
            TokenKind::Ident(s) if s == "and" => (BinOp::And, 2, false),
            TokenKind::Ident(s) if s == "unless" => (BinOp::Unless, 2, false),
            TokenKind::EqEq => (BinOp::Eq, 3, false),
            TokenKind::NotEq => (BinOp::Ne, 3, false),
            TokenKind::Lt => (BinOp::Lt, 3, false),
            TokenKind::Gt => (BinOp::Gt, 3, false),
            TokenKind::Le => (BinOp::Le, 3, false),
            TokenKind::Ge => (BinOp::Ge, 3, false),
            TokenKind::Plus => (BinOp::Add, 4, false),
            TokenKind::Minus => (BinOp::Sub, 4, false),
            TokenKind::Star => (BinOp::Mul, 5, false),
            TokenKind::Slash => (BinOp::Div, 5, false),
            TokenKind::Percent => (BinOp::Mod, 5, false),
            TokenKind::Caret => (BinOp::Pow, 6, true),
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.next();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary {
                    negative: true,
                    expr: Box::new(expr),
                })
            }
            Some(TokenKind::Plus) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.next() else {
            return Err(ParseError::new(self.end, "expected expression, found end of input"));
        };

        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::NumberLiteral(n)),
            TokenKind::Str(s) => Ok(Expr::StringLiteral(s)),
            TokenKind::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::LBrace => {
                // Bare selector `{job="x"}`; parses, but the structural
                // checks reject it later for missing a metric name.
                let matchers = self.parse_matchers_body()?;
                let (range, offset) = self.parse_range_and_offset()?;
                Ok(Expr::Selector(VectorSelector {
                    metric: None,
                    matchers,
                    range,
                    offset,
                }))
            }
            TokenKind::Ident(name) => self.parse_ident_expr(name),
            other => Err(ParseError::new(
                tok.pos,
                format!("expected expression, found {}", other.describe()),
            )),
        }
    }

    /// Identifier-led expressions: aggregation, function call, or selector.
    fn parse_ident_expr(&mut self, name: String) -> Result<Expr, ParseError> {
        if let Some(op) = AggOp::from_keyword(&name) {
            // Aggregations allow the grouping clause on either side of the
            // argument list; a plain call form is also valid PromQL, so only
            // treat the keyword as an aggregation when arguments follow.
            if matches!(self.peek_kind(), Some(TokenKind::LParen))
                || self.at_keyword("by")
                || self.at_keyword("without")
            {
                return self.parse_aggregation(op);
            }
        }

        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.next();
                let mut args = Vec::new();
                if !matches!(self.peek_kind(), Some(TokenKind::RParen)) {
                    loop {
                        args.push(self.parse_expr(0)?);
                        if matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                            self.next();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(Expr::Function { name, args })
            }
            _ => {
                let matchers = if matches!(self.peek_kind(), Some(TokenKind::LBrace)) {
                    self.next();
                    self.parse_matchers_body()?
                } else {
                    Vec::new()
                };
                let (range, offset) = self.parse_range_and_offset()?;
                Ok(Expr::Selector(VectorSelector {
                    metric: Some(name),
                    matchers,
                    range,
                    offset,
                }))
            }
        }
    }

    fn parse_aggregation(&mut self, op: AggOp) -> Result<Expr, ParseError> {
        let mut grouping = None;

        if self.at_keyword("by") || self.at_keyword("without") {
            grouping = Some(self.parse_grouping()?);
        }

        self.expect(&TokenKind::LParen, "`(`")?;

        let param = if op.takes_param() {
            let p = self.parse_expr(0)?;
            self.expect(&TokenKind::Comma, "`,` after aggregation parameter")?;
            Some(Box::new(p))
        } else {
            None
        };

        let inner = self.parse_expr(0)?;
        self.expect(&TokenKind::RParen, "`)`")?;

        if grouping.is_none() && (self.at_keyword("by") || self.at_keyword("without")) {
            grouping = Some(self.parse_grouping()?);
        }

        Ok(Expr::Aggregation {
            op,
            param,
            expr: Box::new(inner),
            grouping,
        })
    }

    fn parse_grouping(&mut self) -> Result<Grouping, ParseError> {
        let without = self.at_keyword("without");
        self.next(); // consume `by` / `without`
        self.expect(&TokenKind::LParen, "`(` after grouping keyword")?;

        let mut labels = Vec::new();
        if !matches!(self.peek_kind(), Some(TokenKind::RParen)) {
            loop {
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Ident(l),
                        ..
                    }) => labels.push(l),
                    Some(t) => {
                        return Err(ParseError::new(
                            t.pos,
                            format!("expected label name, found {}", t.kind.describe()),
                        ));
                    }
                    None => {
                        return Err(ParseError::new(
                            self.end,
                            "expected label name, found end of input",
                        ));
                    }
                }
                if matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                    self.next();
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)` after grouping labels")?;

        Ok(Grouping { without, labels })
    }

    /// Body of `{...}` after the opening brace has been consumed.
    fn parse_matchers_body(&mut self) -> Result<Vec<LabelMatcher>, ParseError> {
        let mut matchers = Vec::new();

        if matches!(self.peek_kind(), Some(TokenKind::RBrace)) {
            self.next();
            return Ok(matchers);
        }

        loop {
            let label = match self.next() {
                Some(Token {
                    kind: TokenKind::Ident(l),
                    ..
                }) => l,
                Some(t) => {
                    return Err(ParseError::new(
                        t.pos,
                        format!("expected label name, found {}", t.kind.describe()),
                    ));
                }
                None => {
                    return Err(ParseError::new(
                        self.end,
                        "expected label name, found end of input",
                    ));
                }
            };

            let op = match self.next() {
                Some(Token {
                    kind: TokenKind::Assign,
                    ..
                }) => MatchOp::Eq,
                Some(Token {
                    kind: TokenKind::NotEq,
                    ..
                }) => MatchOp::Ne,
                Some(Token {
                    kind: TokenKind::RegexMatch,
                    ..
                }) => MatchOp::Re,
                Some(Token {
                    kind: TokenKind::RegexNotMatch,
                    ..
                }) => MatchOp::NotRe,
                Some(t) => {
                    return Err(ParseError::new(
                        t.pos,
                        format!("expected matcher operator, found {}", t.kind.describe()),
                    ));
                }
                None => {
                    return Err(ParseError::new(
                        self.end,
                        "expected matcher operator, found end of input",
                    ));
                }
            };

            let value = match self.next() {
                Some(Token {
                    kind: TokenKind::Str(v),
                    ..
                }) => v,
                Some(t) => {
                    return Err(ParseError::new(
                        t.pos,
                        format!("expected quoted label value, found {}", t.kind.describe()),
                    ));
                }
                None => {
                    return Err(ParseError::new(
                        self.end,
                        "expected quoted label value, found end of input",
                    ));
                }
            };

            matchers.push(LabelMatcher { label, op, value });

            match self.next() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => {
                    // allow trailing comma before `}`
                    if matches!(self.peek_kind(), Some(TokenKind::RBrace)) {
                        self.next();
                        break;
                    }
                }
                Some(Token {
                    kind: TokenKind::RBrace,
                    ..
                }) => break,
                Some(t) => {
                    return Err(ParseError::new(
                        t.pos,
                        format!("expected `,` or `}}`, found {}", t.kind.describe()),
                    ));
                }
                None => {
                    return Err(ParseError::new(self.end, "expected `}`, found end of input"));
                }
            }
        }

        Ok(matchers)
    }

    /// Optional `[duration]` and `offset duration` suffixes on a selector.
    fn parse_range_and_offset(
        &mut self,
    ) -> Result<(Option<String>, Option<String>), ParseError> {
        let range = if matches!(self.peek_kind(), Some(TokenKind::LBracket)) {
            self.next();
            let d = match self.next() {
                Some(Token {
                    kind: TokenKind::Duration(d),
                    ..
                }) => d,
                Some(t) => {
                    return Err(ParseError::new(
                        t.pos,
                        format!("expected range duration, found {}", t.kind.describe()),
                    ));
                }
                None => {
                    return Err(ParseError::new(
                        self.end,
                        "expected range duration, found end of input",
                    ));
                }
            };
            self.expect(&TokenKind::RBracket, "`]` after range duration")?;
            Some(d)
        } else {
            None
        };

        let offset = if self.at_keyword("offset") {
            self.next();
            match self.next() {
                Some(Token {
                    kind: TokenKind::Duration(d),
                    ..
                }) => Some(d),
                Some(t) => {
                    return Err(ParseError::new(
                        t.pos,
                        format!("expected offset duration, found {}", t.kind.describe()),
                    ));
                }
                None => {
                    return Err(ParseError::new(
                        self.end,
                        "expected offset duration, found end of input",
                    ));
                }
            }
        } else {
            None
        };

        Ok((range, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_metric() {
        let expr = parse("up").unwrap();
        match expr {
            Expr::Selector(sel) => {
                assert_eq!(sel.metric.as_deref(), Some("up"));
                assert!(sel.matchers.is_empty());
                assert!(sel.range.is_none());
            }
            other => panic!("expected selector, got {other:?}"),
        }
    }

    #[test]
    fn parses_selector_with_matchers_and_range() {
        let expr = parse(r#"node_cpu_seconds_total{mode!="idle", job=~"node.*"}[5m]"#).unwrap();
        match expr {
            Expr::Selector(sel) => {
                assert_eq!(sel.metric.as_deref(), Some("node_cpu_seconds_total"));
                assert_eq!(sel.matchers.len(), 2);
                assert_eq!(sel.matchers[0].op, MatchOp::Ne);
                assert_eq!(sel.matchers[1].op, MatchOp::Re);
                assert_eq!(sel.range.as_deref(), Some("5m"));
            }
            other => panic!("expected selector, got {other:?}"),
        }
    }

    #[test]
    fn parses_rate_inside_aggregation_with_grouping() {
        let expr = parse("sum by (instance) (rate(node_cpu_seconds_total[5m]))").unwrap();
        match expr {
            Expr::Aggregation {
                op, grouping, expr, ..
            } => {
                assert_eq!(op, AggOp::Sum);
                let g = grouping.unwrap();
                assert!(!g.without);
                assert_eq!(g.labels, vec!["instance"]);
                assert!(matches!(*expr, Expr::Function { .. }));
            }
            other => panic!("expected aggregation, got {other:?}"),
        }
    }

    #[test]
    fn parses_trailing_grouping_clause() {
        let expr = parse("sum(rate(http_requests_total[1m])) by (code)").unwrap();
        match expr {
            Expr::Aggregation { grouping, .. } => {
                assert_eq!(grouping.unwrap().labels, vec!["code"]);
            }
            other => panic!("expected aggregation, got {other:?}"),
        }
    }

    #[test]
    fn parses_topk_with_parameter() {
        let expr = parse("topk(5, node_filesystem_avail_bytes)").unwrap();
        match expr {
            Expr::Aggregation { op, param, .. } => {
                assert_eq!(op, AggOp::Topk);
                assert!(matches!(param.as_deref(), Some(Expr::NumberLiteral(n)) if *n == 5.0));
            }
            other => panic!("expected aggregation, got {other:?}"),
        }
    }

    #[test]
    fn parses_binary_arithmetic_with_precedence() {
        let expr = parse("a + b * c").unwrap();
        match expr {
            Expr::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected +, got {other:?}"),
        }
    }

    #[test]
    fn parses_comparison_threshold() {
        let expr = parse("node_load1 > 4").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Gt, .. }));
    }

    #[test]
    fn parses_set_operator() {
        let expr = parse("up == 1 or up == 0").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Or, .. }));
    }

    #[test]
    fn parses_offset_modifier() {
        let expr = parse("http_requests_total offset 1h").unwrap();
        match expr {
            Expr::Selector(sel) => assert_eq!(sel.offset.as_deref(), Some("1h")),
            other => panic!("expected selector, got {other:?}"),
        }
    }

    #[test]
    fn parses_histogram_quantile_call() {
        let expr =
            parse("histogram_quantile(0.95, rate(http_request_duration_seconds_bucket[5m]))")
                .unwrap();
        match expr {
            Expr::Function { name, args } => {
                assert_eq!(name, "histogram_quantile");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn error_carries_position() {
        let err = parse("rate(node_cpu_seconds_total[5m]").unwrap_err();
        assert!(err.message.contains("`)`"));
        assert_eq!(err.position, "rate(node_cpu_seconds_total[5m]".len());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse("   ").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let err = parse("up up").unwrap_err();
        assert!(err.message.contains("after expression"));
    }

    #[test]
    fn rejects_matcher_without_value() {
        let err = parse(r#"up{job=}"#).unwrap_err();
        assert!(err.message.contains("quoted label value"));
    }
}
