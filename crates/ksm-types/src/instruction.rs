//! The instruction model.
//!
//! A closed sum type with one variant per opcode. Variants own only the fields
//! their encoding needs; every cross-reference is a resolved handle.
//!
//! Jump-target fields (`target`, `entry`, `exit`, `skip_target`) are word
//! offsets relative to the code region. They are recomputed by the fixup pass
//! on every build, so hand-built instructions may leave them at zero.

use crate::expr::{Call, Expression, Operand};
use crate::opcode::Opcode;
use crate::symbol::{Callee, Id, LabelRef, TableRef, VarRef};

// ══════════════════════════════════════════════════════════════════════════════
// Payloads
// ══════════════════════════════════════════════════════════════════════════════

/// Callee-side binding of the incoming argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct GetArgs {
    pub function: Id,
    pub args: Vec<VarRef>,
}

/// A coroutine spawn whose callee body is embedded right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub callee: Callee,
    /// Raw slots, not resolved.
    pub take: Vec<u32>,
    pub give: Vec<VarRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: Expression,
    pub target: u32,
    pub unknown1: u32,
    pub unknown2: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    /// Written before the condition; the branch target minus two words unless
    /// the chain closes on `EndIf`.
    pub skip_target: u32,
    pub unknown1: u32,
    pub condition: Expression,
    pub target: u32,
    pub unknown3: u32,
    pub unknown4: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Else {
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub value: VarRef,
    pub entry: u32,
    pub exit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub value: VarRef,
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoWhile {
    pub condition: Operand,
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    pub assignee: VarRef,
    pub value: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetIndex {
    pub table: TableRef,
    pub occurrence: VarRef,
    pub variable: VarRef,
}

// ══════════════════════════════════════════════════════════════════════════════
// Instruction
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    ReturnVal(Operand),
    /// Marks a position later read back into a [`crate::Label`] record.
    Label,
    GetArgs(GetArgs),
    Thread(Thread),
    Thread2(Thread),
    Return,
    Goto(LabelRef),
    Call(Call),
    CallAsThread(Call),
    CallAsChildThread(Call),
    DeleteRuntime(Operand),
    Wait(Operand),
    WaitMs(Operand),
    If(If),
    Else(Else),
    ElseIf(ElseIf),
    EndIf,
    Switch(Switch),
    Case(Case),
    Case2(Case),
    BreakSwitch,
    EndSwitch,
    DoWhile(DoWhile),
    Break,
    EndDoWhile,
    Set(Set),
    ReadTableLength(TableRef),
    GetIndex(GetIndex),
    WaitCompleted(Operand),

    // ── Opaque: arity known, meaning not ─────────────────────────────────
    Unsure1,
    Unsure2(Expression),
    Unsure3(VarRef, Id, VarRef),
    Unsure4(VarRef),
    Unsure7([VarRef; 4]),
    Unsure8([VarRef; 3]),
    Unsure9(Expression),
    Unsure11(VarRef, TableRef),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::ReturnVal(_) => Opcode::ReturnVal,
            Instruction::Label => Opcode::Label,
            Instruction::GetArgs(_) => Opcode::GetArgs,
            Instruction::Thread(_) => Opcode::Thread,
            Instruction::Thread2(_) => Opcode::Thread2,
            Instruction::Return => Opcode::Return,
            Instruction::Goto(_) => Opcode::Goto,
            Instruction::Call(_) => Opcode::Call,
            Instruction::CallAsThread(_) => Opcode::CallAsThread,
            Instruction::CallAsChildThread(_) => Opcode::CallAsChildThread,
            Instruction::DeleteRuntime(_) => Opcode::DeleteRuntime,
            Instruction::Wait(_) => Opcode::Wait,
            Instruction::WaitMs(_) => Opcode::WaitMs,
            Instruction::If(_) => Opcode::If,
            Instruction::Else(_) => Opcode::Else,
            Instruction::ElseIf(_) => Opcode::ElseIf,
            Instruction::EndIf => Opcode::EndIf,
            Instruction::Switch(_) => Opcode::Switch,
            Instruction::Case(_) => Opcode::Case,
            Instruction::Case2(_) => Opcode::Case2,
            Instruction::BreakSwitch => Opcode::BreakSwitch,
            Instruction::EndSwitch => Opcode::EndSwitch,
            Instruction::DoWhile(_) => Opcode::DoWhile,
            Instruction::Break => Opcode::Break,
            Instruction::EndDoWhile => Opcode::EndDoWhile,
            Instruction::Set(_) => Opcode::Set,
            Instruction::ReadTableLength(_) => Opcode::ReadTableLength,
            Instruction::GetIndex(_) => Opcode::GetIndex,
            Instruction::WaitCompleted(_) => Opcode::WaitCompleted,
            Instruction::Unsure1 => Opcode::Unsure1,
            Instruction::Unsure2(_) => Opcode::Unsure2,
            Instruction::Unsure3(..) => Opcode::Unsure3,
            Instruction::Unsure4(_) => Opcode::Unsure4,
            Instruction::Unsure7(_) => Opcode::Unsure7,
            Instruction::Unsure8(_) => Opcode::Unsure8,
            Instruction::Unsure9(_) => Opcode::Unsure9,
            Instruction::Unsure11(..) => Opcode::Unsure11,
        }
    }

    /// Whether the const flag is set in the opcode word, derived from the
    /// actual operand shape.
    pub fn is_const_encodable(&self) -> bool {
        match self {
            Instruction::ReturnVal(op)
            | Instruction::DeleteRuntime(op)
            | Instruction::Wait(op)
            | Instruction::WaitMs(op)
            | Instruction::WaitCompleted(op) => op.is_const(),
            Instruction::DoWhile(dw) => dw.condition.is_const(),
            Instruction::Set(set) => set.value.is_const(),
            Instruction::Call(call)
            | Instruction::CallAsThread(call)
            | Instruction::CallAsChildThread(call) => call.is_const(),
            Instruction::Unsure2(expr) => expr.is_empty(),
            _ => false,
        }
    }

    /// The spawned callee of a `Thread`/`Thread2`.
    pub fn thread_callee(&self) -> Option<Callee> {
        match self {
            Instruction::Thread(t) | Instruction::Thread2(t) => Some(t.callee),
            _ => None,
        }
    }

    /// The spawned function whose body is embedded after this instruction.
    pub fn inlined_function(&self) -> Option<Id> {
        match self.thread_callee() {
            Some(Callee::Function(id)) => Some(id),
            _ => None,
        }
    }
}
