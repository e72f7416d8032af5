// Expression AST node definitions
//
// Nodes are immutable after construction; evaluation never mutates them.

use crate::span::Span;

/// Expression with source span
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// A synthesized integer literal (for schema attributes given as plain
    /// numbers rather than expression strings).
    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::IntLiteral(value as i128), Span::dummy())
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral(i128),
    FloatLiteral(f64),
    StringLiteral(String),
    BoolLiteral(bool),

    /// Simple identifier, resolved against the evaluation context
    Ident(String),

    /// Enum-scope access: `Enum::member`
    EnumAccess { scope: String, member: String },

    /// Binary operation
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// Ternary: `cond ? then : else`
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Member access: `expr.member`
    Member { expr: Box<Expr>, member: String },

    /// Index access: `expr[index]`
    Index { expr: Box<Expr>, index: Box<Expr> },

    /// Method call, only ever immediately following a member access:
    /// `expr.name(args...)`
    MethodCall {
        expr: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}
