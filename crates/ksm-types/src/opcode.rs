//! Instruction opcodes and the sentinel words of the code stream.
//!
//! Opcodes and expression operators share the same 32-bit word space but use
//! disjoint numeric ranges: operators live in `0x3F..=0x56` (see
//! [`crate::Operator`]), everything else listed here is an instruction.
//!
//! The numbering is the newer superset that includes the table, bitwise,
//! `do-while` and call-as-thread opcodes.

use std::fmt;

/// Bit set in an instruction's opcode word when the "constant operand" shape
/// follows instead of a full expression.
pub const CONST_FLAG: u32 = 0x100;

/// Terminates an expression token stream.
pub const EXPR_END: u32 = 0x40;

/// Terminates a call argument list and a thread's give list.
pub const CALL_END: u32 = 0x11;

/// Terminates a `GetArgs` binding list and a thread's take list.
pub const ARGS_END: u32 = 0x08;

/// Marks the start of a nested call inside an expression.
pub const CALL_START: u32 = Opcode::Call as u32;

/// Opening marker of a `variable`-typed table payload.
pub const TABLE_OPEN_VARIABLE: u32 = 0x63;
/// Opening marker of a `float`-typed table payload.
pub const TABLE_OPEN_FLOAT: u32 = 0x64;
/// Opening marker of `int`- and `byte`-typed table payloads.
pub const TABLE_OPEN_INT: u32 = 0x65;
/// Closing marker of every table payload.
pub const TABLE_CLOSE: u32 = 0x66;

/// Numeric instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Opcode {
    Nop = 0x02,
    ReturnVal = 0x03,
    Label = 0x04,
    GetArgs = 0x05,
    Thread = 0x06,
    Thread2 = 0x07,
    Return = 0x09,
    Goto = 0x0A,
    Call = 0x0C,
    CallAsThread = 0x0D,
    CallAsChildThread = 0x0E,
    DeleteRuntime = 0x12,
    Unsure10 = 0x15,
    Wait = 0x16,
    WaitMs = 0x17,
    If = 0x18,
    Else = 0x26,
    ElseIf = 0x27,
    EndIf = 0x28,
    Switch = 0x29,
    Case = 0x2A,
    Case2 = 0x2F,
    BreakSwitch = 0x37,
    EndSwitch = 0x38,
    DoWhile = 0x39,
    Break = 0x3A,
    EndDoWhile = 0x3C,
    Set = 0x3D,
    ReadTableLength = 0x67,
    GetIndex = 0x6D,
    Unsure0 = 0x6E,
    Unsure1 = 0x6F,
    Unsure2 = 0x76,
    Unsure5 = 0x77,
    Unsure3 = 0x85,
    Unsure4 = 0x86,
    WaitCompleted = 0x89,
    Unsure9 = 0x8A,
    Unsure11 = 0x8E,
    Unsure8 = 0x90,
    Unsure7 = 0x91,
    Unsure6 = 0x92,
}

impl Opcode {
    /// Every opcode in the table, in ascending numeric order.
    pub const ALL: [Opcode; 42] = [
        Opcode::Nop,
        Opcode::ReturnVal,
        Opcode::Label,
        Opcode::GetArgs,
        Opcode::Thread,
        Opcode::Thread2,
        Opcode::Return,
        Opcode::Goto,
        Opcode::Call,
        Opcode::CallAsThread,
        Opcode::CallAsChildThread,
        Opcode::DeleteRuntime,
        Opcode::Unsure10,
        Opcode::Wait,
        Opcode::WaitMs,
        Opcode::If,
        Opcode::Else,
        Opcode::ElseIf,
        Opcode::EndIf,
        Opcode::Switch,
        Opcode::Case,
        Opcode::Case2,
        Opcode::BreakSwitch,
        Opcode::EndSwitch,
        Opcode::DoWhile,
        Opcode::Break,
        Opcode::EndDoWhile,
        Opcode::Set,
        Opcode::ReadTableLength,
        Opcode::GetIndex,
        Opcode::Unsure0,
        Opcode::Unsure1,
        Opcode::Unsure2,
        Opcode::Unsure5,
        Opcode::Unsure3,
        Opcode::Unsure4,
        Opcode::WaitCompleted,
        Opcode::Unsure9,
        Opcode::Unsure11,
        Opcode::Unsure8,
        Opcode::Unsure7,
        Opcode::Unsure6,
    ];

    /// The numeric code written to disk (without the const flag).
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up an opcode by its numeric code. The const flag must already be
    /// masked off.
    pub fn from_code(code: u32) -> Option<Opcode> {
        Self::ALL
            .binary_search_by_key(&code, |op| op.code())
            .ok()
            .map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, self.code())
    }
}
