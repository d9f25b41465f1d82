//! AST for the supported PromQL subset.
//!
//! The shapes mirror the expression grammar: vector selectors with label
//! matchers and optional range/offset, function calls, aggregations with
//! grouping clauses, and binary/unary operator trees.

/// Label matcher operator inside a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `=~`
    Re,
    /// `!~`
    NotRe,
}

/// One `label <op> "value"` pair inside `{...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatcher {
    pub label: String,
    pub op: MatchOp,
    pub value: String,
}

/// A vector selector, instant or ranged.
///
/// `metric` is `None` for the bare `{label="x"}` form, which parses but is
/// rejected later by the structural checks.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSelector {
    pub metric: Option<String>,
    pub matchers: Vec<LabelMatcher>,
    /// Range duration text (e.g. `5m`, `1h30m`) when `[...]` is present.
    pub range: Option<String>,
    /// Offset duration text when `offset <d>` is present.
    pub offset: Option<String>,
}

/// Binary operators, arithmetic through set logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    Unless,
}

/// Aggregation operators over instant vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Min,
    Max,
    Avg,
    Count,
    Stddev,
    Stdvar,
    Topk,
    Bottomk,
    Quantile,
    CountValues,
    Group,
}

impl AggOp {
    /// Maps a lowercase keyword to the operator, if it is one.
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "avg" => Self::Avg,
            "count" => Self::Count,
            "stddev" => Self::Stddev,
            "stdvar" => Self::Stdvar,
            "topk" => Self::Topk,
            "bottomk" => Self::Bottomk,
            "quantile" => Self::Quantile,
            "count_values" => Self::CountValues,
            "group" => Self::Group,
            _ => return None,
        })
    }

    /// Whether the operator takes a leading scalar parameter
    /// (`topk(5, ...)`, `quantile(0.95, ...)`).
    pub fn takes_param(self) -> bool {
        matches!(self, Self::Topk | Self::Bottomk | Self::Quantile | Self::CountValues)
    }
}

/// `by (a, b)` / `without (c)` clause on an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    pub without: bool,
    pub labels: Vec<String>,
}

/// A PromQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Selector(VectorSelector),
    NumberLiteral(f64),
    StringLiteral(String),
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Aggregation {
        op: AggOp,
        /// Leading scalar parameter for `topk`-style operators.
        param: Option<Box<Expr>>,
        expr: Box<Expr>,
        grouping: Option<Grouping>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        negative: bool,
        expr: Box<Expr>,
    },
    Paren(Box<Expr>),
}

impl Expr {
    /// Walks the tree and collects a reference to every vector selector.
    pub fn selectors(&self) -> Vec<&VectorSelector> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a VectorSelector>) {
        match self {
            Expr::Selector(sel) => out.push(sel),
            Expr::NumberLiteral(_) | Expr::StringLiteral(_) => {}
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_selectors(out);
                }
            }
            Expr::Aggregation { param, expr, .. } => {
                if let Some(p) = param {
                    p.collect_selectors(out);
                }
                expr.collect_selectors(out);
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_selectors(out);
                rhs.collect_selectors(out);
            }
            Expr::Unary { expr, .. } | Expr::Paren(expr) => expr.collect_selectors(out),
        }
    }
}
