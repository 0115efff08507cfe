//! Expressions, call payloads and the const-or-expression operand shape.

use crate::operator::Operator;
use crate::symbol::{Callee, Symbol, VarRef};

/// One element of an expression token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Symbol(Symbol),
    Operator(Operator),
    /// A call evaluated in place; its arguments are always expressions.
    Call(Box<Call>),
}

/// An ordered token stream. On disk it is terminated by a sentinel word; in
/// memory termination is implicit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    pub tokens: Vec<Token>,
}

impl Expression {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }
}

impl FromIterator<Token> for Expression {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl From<Vec<Token>> for Expression {
    fn from(tokens: Vec<Token>) -> Self {
        Self::new(tokens)
    }
}

/// The value slot of `Set`, `ReturnVal`, `Wait`, `DoWhile` and friends: either
/// a single variable (encoded with the const flag) or a full expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(VarRef),
    Expr(Expression),
}

impl Operand {
    /// Whether this operand is encoded in the constant shape. An empty
    /// expression also takes the constant shape (a lone terminator word).
    pub fn is_const(&self) -> bool {
        match self {
            Operand::Variable(_) => true,
            Operand::Expr(expr) => expr.is_empty(),
        }
    }
}

impl From<VarRef> for Operand {
    fn from(var: VarRef) -> Self {
        Operand::Variable(var)
    }
}

impl From<Expression> for Operand {
    fn from(expr: Expression) -> Self {
        Operand::Expr(expr)
    }
}

/// One argument passed to a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Symbol(Symbol),
    Expr(Expression),
}

/// Callee plus argument list, shared by the call instructions and nested
/// calls inside expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<CallArg>,
}

impl Call {
    pub fn new(callee: Callee, args: Vec<CallArg>) -> Self {
        Self { callee, args }
    }

    /// Arguments can only be written as bare ids when every one of them is a
    /// bare symbol.
    pub fn is_const(&self) -> bool {
        self.args.iter().all(|arg| matches!(arg, CallArg::Symbol(_)))
    }
}
