//! Expression operators ("intrinsics").
//!
//! Operators appear only inside expression token streams. Each has a fixed
//! numeric code in `0x3F..=0x56`, disjoint from every instruction opcode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An operator, parenthesis marker, or the `next` sentinel inside an
/// expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Next,
    LeftParen,
    RightParen,
    Or,
    And,
    BitOr,
    BitAnd,
    BitXor,
    Shl,
    Shr,
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Inc,
    Dec,
    Mod,
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    /// Every operator, in ascending code order.
    pub const ALL: [Operator; 23] = [
        Operator::Next,
        Operator::LeftParen,
        Operator::RightParen,
        Operator::Or,
        Operator::And,
        Operator::BitOr,
        Operator::BitAnd,
        Operator::BitXor,
        Operator::Shl,
        Operator::Shr,
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::Inc,
        Operator::Dec,
        Operator::Mod,
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
    ];

    /// Numeric code of the operator.
    pub fn code(self) -> u32 {
        match self {
            Operator::Next => 0x3F,
            // 0x40 is the expression terminator
            Operator::LeftParen => 0x41,
            Operator::RightParen => 0x42,
            Operator::Or => 0x43,
            Operator::And => 0x44,
            Operator::BitOr => 0x45,
            Operator::BitAnd => 0x46,
            Operator::BitXor => 0x47,
            Operator::Shl => 0x48,
            Operator::Shr => 0x49,
            Operator::Eq => 0x4A,
            Operator::Neq => 0x4B,
            Operator::Gt => 0x4C,
            Operator::Lt => 0x4D,
            Operator::Gte => 0x4E,
            Operator::Lte => 0x4F,
            Operator::Inc => 0x50,
            Operator::Dec => 0x51,
            Operator::Mod => 0x52,
            Operator::Add => 0x53,
            Operator::Sub => 0x54,
            Operator::Mul => 0x55,
            Operator::Div => 0x56,
        }
    }

    /// Look up an operator by code. Returns `None` for anything that is not an
    /// operator, which callers use to fall back to symbol resolution.
    pub fn from_code(code: u32) -> Option<Operator> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Source-level spelling used by the interchange format.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Next => "next",
            Operator::LeftParen => "(",
            Operator::RightParen => ")",
            Operator::Or => "||",
            Operator::And => "&&",
            Operator::BitOr => "|",
            Operator::BitAnd => "&",
            Operator::BitXor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Inc => "++",
            Operator::Dec => "--",
            Operator::Mod => "%",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    /// Inverse of [`Operator::symbol`].
    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        Self::ALL.iter().copied().find(|op| op.symbol() == symbol)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{Opcode, EXPR_END};

    #[test]
    fn codes_are_contiguous_around_terminator() {
        let codes: Vec<u32> = Operator::ALL.iter().map(|op| op.code()).collect();
        assert_eq!(codes.first(), Some(&0x3F));
        assert_eq!(codes.last(), Some(&0x56));
        assert!(!codes.contains(&EXPR_END));
        assert_eq!(codes.len(), 0x56 - 0x3F);
    }

    #[test]
    fn operators_never_collide_with_opcodes() {
        for op in Operator::ALL {
            assert_eq!(Opcode::from_code(op.code()), None, "{op}");
        }
    }

    #[test]
    fn symbols_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
            assert_eq!(Operator::from_code(op.code()), Some(op));
        }
        assert_eq!(Operator::from_symbol("**"), None);
        assert_eq!(Operator::from_code(0x57), None);
    }
}
