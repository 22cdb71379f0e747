//! Constraint-language AST.
//!
//! These types are produced by the external constraint compiler and consumed
//! by the evaluator. Every expression node carries the static type the
//! compiler assigned to it plus a source span for diagnostic quoting, so the
//! evaluator never has to re-infer anything.

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigInt;

// ──────────────────────────────────────────────
// Source positions
// ──────────────────────────────────────────────

/// A 1-based line/column position within the constraint source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

/// Half-open span of a subexpression within the constraint source text.
///
/// `start` is the first character of the subexpression; `end.column` points
/// one past its last character. Lines are relative to the constraint text
/// itself (line 1 = first line of the constraint), not to the enclosing
/// file; [`crate::source::ConstraintLocation`] anchors the text in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        SourceSpan {
            start: SourcePosition {
                line: start_line,
                column: start_column,
            },
            end: SourcePosition {
                line: end_line,
                column: end_column,
            },
        }
    }
}

// ──────────────────────────────────────────────
// Static types
// ──────────────────────────────────────────────

/// Static type of a constraint expression or a table key / action parameter.
///
/// Fixed-width and match-kind types are parameterised by their bit-width,
/// which is always >= 1. `Unknown` never appears in a well-typed AST; it
/// exists so a partially-constructed tree has something to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Unknown,
    Boolean,
    /// Mathematical integer, unbounded.
    ArbitraryInt,
    FixedUnsigned { bitwidth: u32 },
    FixedSigned { bitwidth: u32 },
    Exact { bitwidth: u32 },
    Ternary { bitwidth: u32 },
    Lpm { bitwidth: u32 },
    Range { bitwidth: u32 },
    /// Optional match: at runtime a ternary whose mask is all zeros
    /// (absent) or all ones (present).
    Optional { bitwidth: u32 },
}

impl Type {
    /// Bit-width for width-parameterised types, `None` otherwise.
    pub fn bitwidth(&self) -> Option<u32> {
        match self {
            Type::FixedUnsigned { bitwidth }
            | Type::FixedSigned { bitwidth }
            | Type::Exact { bitwidth }
            | Type::Ternary { bitwidth }
            | Type::Lpm { bitwidth }
            | Type::Range { bitwidth }
            | Type::Optional { bitwidth } => Some(*bitwidth),
            Type::Unknown | Type::Boolean | Type::ArbitraryInt => None,
        }
    }

    /// True for the match kinds a table key can have.
    pub fn is_match_kind(&self) -> bool {
        matches!(
            self,
            Type::Exact { .. }
                | Type::Ternary { .. }
                | Type::Lpm { .. }
                | Type::Range { .. }
                | Type::Optional { .. }
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "unknown"),
            Type::Boolean => write!(f, "bool"),
            Type::ArbitraryInt => write!(f, "int"),
            Type::FixedUnsigned { bitwidth } => write!(f, "bit<{}>", bitwidth),
            Type::FixedSigned { bitwidth } => write!(f, "int<{}>", bitwidth),
            Type::Exact { bitwidth } => write!(f, "Exact<{}>", bitwidth),
            Type::Ternary { bitwidth } => write!(f, "Ternary<{}>", bitwidth),
            Type::Lpm { bitwidth } => write!(f, "Lpm<{}>", bitwidth),
            Type::Range { bitwidth } => write!(f, "Range<{}>", bitwidth),
            Type::Optional { bitwidth } => write!(f, "Optional<{}>", bitwidth),
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation on booleans.
    Not,
    /// Arithmetic negation; always yields an unbounded integer.
    Neg,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
    Implies,
    Add,
    Sub,
    Mul,
    /// Bit concatenation of two fixed-width integers; the left operand
    /// lands in the high bits.
    Concat,
}

impl BinaryOp {
    /// True for the connectives that evaluate with short-circuit semantics.
    pub fn is_connective(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Implies)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Implies => "->",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Concat => "::",
        };
        write!(f, "{}", s)
    }
}

/// A type-annotated constraint expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Result type assigned by the external type checker.
    pub ty: Type,
    /// Span of this node in the constraint source text.
    pub span: SourceSpan,
    pub kind: ExprKind,
}

impl Expression {
    pub fn new(ty: Type, span: SourceSpan, kind: ExprKind) -> Self {
        Expression { ty, span, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    BoolLit(bool),
    IntLit(BigInt),
    /// Used only as field selectors and attribute names.
    StringLit(String),
    /// Key or parameter name, resolved against the binding environment.
    /// Reserved attribute names also resolve through here.
    Variable(String),
    /// Reserved entry attribute read, e.g. `::priority`.
    AttributeAccess(String),
    /// Projection of a named field out of a match-key aggregate.
    FieldAccess {
        base: Box<Expression>,
        field: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Conversion to the node's own `ty`.
    TypeCast(Box<Expression>),
}

// ──────────────────────────────────────────────
// Node identity and sizes
// ──────────────────────────────────────────────

/// Address identity of an AST node, used as a cache key.
///
/// Valid only while the owning tree is alive and unmoved. The evaluator
/// builds its caches per call while borrowing the tree, which guarantees
/// both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(expr: &Expression) -> NodeId {
        NodeId(expr as *const Expression as usize)
    }
}

/// Memoised node counts, keyed by node identity.
pub type SizeCache = HashMap<NodeId, usize>;

/// Number of nodes in `expr`, memoised in `cache`.
pub fn size(expr: &Expression, cache: &mut SizeCache) -> usize {
    let id = NodeId::of(expr);
    if let Some(&n) = cache.get(&id) {
        return n;
    }
    let n = match &expr.kind {
        ExprKind::BoolLit(_)
        | ExprKind::IntLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::Variable(_)
        | ExprKind::AttributeAccess(_) => 1,
        ExprKind::FieldAccess { base, .. } => 1 + size(base, cache),
        ExprKind::Unary { operand, .. } => 1 + size(operand, cache),
        ExprKind::Binary { left, right, .. } => 1 + size(left, cache) + size(right, cache),
        ExprKind::TypeCast(operand) => 1 + size(operand, cache),
    };
    cache.insert(id, n);
    n
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
