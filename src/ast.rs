//! Syntax tree of the expression language.

use alloc::boxed::Box;
use alloc::vec::Vec;

use compact_str::CompactString;

use crate::runtime::Number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,

    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Number),
    String(CompactString),
    Bool(bool),
    /// A variable, constant, or zero-argument function, resolved in that order.
    Variable(CompactString),
    /// An array literal.
    Array(Vec<Expr>),
    Unary { op: UnaryOp, value: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    /// A call of a named function (or a subchart, in a call component).
    Call { name: CompactString, args: Vec<Expr> },
    /// Indexing of a 1-D or 2-D array.
    Index { target: Box<Expr>, indices: Vec<Expr> },
    /// Assignment to a variable or array element; evaluates to the assigned value.
    Assign { target: Box<Expr>, value: Box<Expr> },
}
impl Expr {
    /// Checks if this expression can be assigned to.
    pub fn is_place(&self) -> bool {
        matches!(self, Expr::Variable(_) | Expr::Index { .. })
    }
}

/// How a procedure parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// By value.
    In,
    /// By reference, for returning a value to the caller.
    Out,
    /// By reference, for passing a value in and returning one.
    InOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: CompactString,
    pub mode: ParamMode,
}

/// The header of a procedure, as written on its entry terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureHeader {
    pub name: CompactString,
    pub params: Vec<Param>,
}
