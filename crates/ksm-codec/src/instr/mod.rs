//! Instruction codec.
//!
//! An instruction is an opcode word followed by a payload. Bit
//! [`CONST_FLAG`] of the opcode word selects the constant operand shape; it is
//! derived from the operand itself when encoding and honored when decoding.
//! Instructions without a const-or-expression slot reject the flag.
//!
//! Each payload type implements [`Operands`]; [`decode`], [`encode`] and
//! [`byte_size`] dispatch on the opcode.

mod branch;
mod call;
mod data;
mod operand;

use ksm_types::instruction::{
    Case, DoWhile, Else, ElseIf, GetArgs, GetIndex, If, Set, Switch, Thread,
};
use ksm_types::opcode::CONST_FLAG;
use ksm_types::{Call, Expression, Instruction, Opcode, Operand};
use tracing::trace;

use self::operand::{
    read_import, read_label, read_table, read_var, read_vars, write_import, write_label,
    write_table, write_var, write_vars,
};
use crate::context::Context;
use crate::cursor::{Reader, Writer};
use crate::error::{CodecError, CodecResult};

/// Payload codec implemented by every instruction payload type.
pub(crate) trait Operands: Sized {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self>;
    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()>;
    /// Bytes written by [`Operands::encode`].
    fn byte_size(&self) -> usize;
}

/// Opcodes whose payload has a const-or-expression shape.
fn accepts_const_flag(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::ReturnVal
            | Opcode::DeleteRuntime
            | Opcode::Wait
            | Opcode::WaitMs
            | Opcode::WaitCompleted
            | Opcode::DoWhile
            | Opcode::Set
            | Opcode::Call
            | Opcode::CallAsThread
            | Opcode::CallAsChildThread
            | Opcode::Unsure2
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Decode
// ══════════════════════════════════════════════════════════════════════════════

pub fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Instruction> {
    let offset = r.offset();
    let word = r.read_u32()?;
    let constant = word & CONST_FLAG != 0;
    let opcode = Opcode::from_code(word & !CONST_FLAG)
        .ok_or(CodecError::UnknownOpcode { opcode: word, offset })?;
    if constant && !accepts_const_flag(opcode) {
        return Err(CodecError::malformed(
            offset,
            format!("const flag set on {opcode}"),
        ));
    }
    ctx.begin(opcode, constant);
    trace!(%opcode, offset, constant, "decoding instruction");

    let instruction = match opcode {
        Opcode::Nop => Instruction::Nop,
        Opcode::ReturnVal => Instruction::ReturnVal(Operand::decode(r, ctx)?),
        Opcode::Label => Instruction::Label,
        Opcode::GetArgs => Instruction::GetArgs(GetArgs::decode(r, ctx)?),
        Opcode::Thread => Instruction::Thread(Thread::decode(r, ctx)?),
        Opcode::Thread2 => Instruction::Thread2(Thread::decode(r, ctx)?),
        Opcode::Return => Instruction::Return,
        Opcode::Goto => Instruction::Goto(read_label(r, ctx)?),
        Opcode::Call => Instruction::Call(Call::decode(r, ctx)?),
        Opcode::CallAsThread => Instruction::CallAsThread(Call::decode(r, ctx)?),
        Opcode::CallAsChildThread => Instruction::CallAsChildThread(Call::decode(r, ctx)?),
        Opcode::DeleteRuntime => Instruction::DeleteRuntime(Operand::decode(r, ctx)?),
        Opcode::Wait => Instruction::Wait(Operand::decode(r, ctx)?),
        Opcode::WaitMs => Instruction::WaitMs(Operand::decode(r, ctx)?),
        Opcode::If => Instruction::If(If::decode(r, ctx)?),
        Opcode::Else => Instruction::Else(Else::decode(r, ctx)?),
        Opcode::ElseIf => Instruction::ElseIf(ElseIf::decode(r, ctx)?),
        Opcode::EndIf => Instruction::EndIf,
        Opcode::Switch => Instruction::Switch(Switch::decode(r, ctx)?),
        Opcode::Case => Instruction::Case(Case::decode(r, ctx)?),
        Opcode::Case2 => Instruction::Case2(Case::decode(r, ctx)?),
        Opcode::BreakSwitch => Instruction::BreakSwitch,
        Opcode::EndSwitch => Instruction::EndSwitch,
        Opcode::DoWhile => Instruction::DoWhile(DoWhile::decode(r, ctx)?),
        Opcode::Break => Instruction::Break,
        Opcode::EndDoWhile => Instruction::EndDoWhile,
        Opcode::Set => Instruction::Set(Set::decode(r, ctx)?),
        Opcode::ReadTableLength => Instruction::ReadTableLength(read_table(r, ctx)?),
        Opcode::GetIndex => Instruction::GetIndex(GetIndex::decode(r, ctx)?),
        Opcode::WaitCompleted => Instruction::WaitCompleted(Operand::decode(r, ctx)?),
        Opcode::Unsure1 => Instruction::Unsure1,
        Opcode::Unsure2 => Instruction::Unsure2(Expression::decode(r, ctx)?),
        Opcode::Unsure3 => {
            let first = read_var(r, ctx)?;
            let import = read_import(r, ctx)?;
            Instruction::Unsure3(first, import, read_var(r, ctx)?)
        }
        Opcode::Unsure4 => Instruction::Unsure4(read_var(r, ctx)?),
        Opcode::Unsure7 => Instruction::Unsure7(read_vars(r, ctx)?),
        Opcode::Unsure8 => Instruction::Unsure8(read_vars(r, ctx)?),
        Opcode::Unsure9 => Instruction::Unsure9(Expression::decode(r, ctx)?),
        Opcode::Unsure11 => {
            let var = read_var(r, ctx)?;
            Instruction::Unsure11(var, read_table(r, ctx)?)
        }
        Opcode::Unsure0 | Opcode::Unsure5 | Opcode::Unsure6 | Opcode::Unsure10 => {
            return Err(CodecError::UnknownOpcode { opcode: word, offset });
        }
    };
    Ok(instruction)
}

// ══════════════════════════════════════════════════════════════════════════════
// Encode
// ══════════════════════════════════════════════════════════════════════════════

pub fn encode(w: &mut Writer, ctx: &Context<'_>, instruction: &Instruction) -> CodecResult<()> {
    let flag = if instruction.is_const_encodable() {
        CONST_FLAG
    } else {
        0
    };
    w.write_u32(instruction.opcode().code() | flag);

    match instruction {
        Instruction::Nop
        | Instruction::Label
        | Instruction::Return
        | Instruction::EndIf
        | Instruction::BreakSwitch
        | Instruction::EndSwitch
        | Instruction::Break
        | Instruction::EndDoWhile
        | Instruction::Unsure1 => Ok(()),
        Instruction::ReturnVal(op)
        | Instruction::DeleteRuntime(op)
        | Instruction::Wait(op)
        | Instruction::WaitMs(op)
        | Instruction::WaitCompleted(op) => op.encode(w, ctx),
        Instruction::GetArgs(args) => args.encode(w, ctx),
        Instruction::Thread(t) | Instruction::Thread2(t) => t.encode(w, ctx),
        Instruction::Goto(label) => write_label(w, ctx, *label),
        Instruction::Call(call)
        | Instruction::CallAsThread(call)
        | Instruction::CallAsChildThread(call) => call.encode(w, ctx),
        Instruction::If(i) => i.encode(w, ctx),
        Instruction::Else(e) => e.encode(w, ctx),
        Instruction::ElseIf(e) => e.encode(w, ctx),
        Instruction::Switch(s) => s.encode(w, ctx),
        Instruction::Case(c) | Instruction::Case2(c) => c.encode(w, ctx),
        Instruction::DoWhile(d) => d.encode(w, ctx),
        Instruction::Set(s) => s.encode(w, ctx),
        Instruction::ReadTableLength(table) => write_table(w, ctx, *table),
        Instruction::GetIndex(g) => g.encode(w, ctx),
        Instruction::Unsure2(e) | Instruction::Unsure9(e) => e.encode(w, ctx),
        Instruction::Unsure3(first, import, second) => {
            write_var(w, ctx, *first)?;
            write_import(w, ctx, *import)?;
            write_var(w, ctx, *second)
        }
        Instruction::Unsure4(var) => write_var(w, ctx, *var),
        Instruction::Unsure7(vars) => write_vars(w, ctx, vars),
        Instruction::Unsure8(vars) => write_vars(w, ctx, vars),
        Instruction::Unsure11(var, table) => {
            write_var(w, ctx, *var)?;
            write_table(w, ctx, *table)
        }
    }
}

/// Payload size in bytes, excluding the opcode word.
pub fn byte_size(instruction: &Instruction) -> usize {
    match instruction {
        Instruction::Nop
        | Instruction::Label
        | Instruction::Return
        | Instruction::EndIf
        | Instruction::BreakSwitch
        | Instruction::EndSwitch
        | Instruction::Break
        | Instruction::EndDoWhile
        | Instruction::Unsure1 => 0,
        Instruction::ReturnVal(op)
        | Instruction::DeleteRuntime(op)
        | Instruction::Wait(op)
        | Instruction::WaitMs(op)
        | Instruction::WaitCompleted(op) => op.byte_size(),
        Instruction::GetArgs(args) => args.byte_size(),
        Instruction::Thread(t) | Instruction::Thread2(t) => t.byte_size(),
        Instruction::Goto(_) | Instruction::ReadTableLength(_) | Instruction::Unsure4(_) => 4,
        Instruction::Call(call)
        | Instruction::CallAsThread(call)
        | Instruction::CallAsChildThread(call) => call.byte_size(),
        Instruction::If(i) => i.byte_size(),
        Instruction::Else(e) => e.byte_size(),
        Instruction::ElseIf(e) => e.byte_size(),
        Instruction::Switch(s) => s.byte_size(),
        Instruction::Case(c) | Instruction::Case2(c) => c.byte_size(),
        Instruction::DoWhile(d) => d.byte_size(),
        Instruction::Set(s) => s.byte_size(),
        Instruction::GetIndex(g) => g.byte_size(),
        Instruction::Unsure2(e) | Instruction::Unsure9(e) => e.byte_size(),
        Instruction::Unsure3(..) => 12,
        Instruction::Unsure7(_) => 16,
        Instruction::Unsure8(_) => 12,
        Instruction::Unsure11(..) => 8,
    }
}

/// Opcode word plus payload.
pub fn encoded_size(instruction: &Instruction) -> usize {
    4 + byte_size(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksm_types::opcode::EXPR_END;
    use ksm_types::{Function, Script, Variable, VariableScope, VarRef};

    fn script() -> Script {
        let mut script = Script::new();
        script.add_variable(Variable::int(0x200, VariableScope::Global, 0));
        script.add_variable(Variable::int(0x201, VariableScope::Global, 0));
        script.add_function(Function::new(0x400));
        script
    }

    fn encode_one(script: &Script, instruction: &Instruction) -> Vec<u8> {
        let ctx = Context::new(script);
        let mut w = Writer::new();
        encode(&mut w, &ctx, instruction).unwrap();
        assert_eq!(w.position(), encoded_size(instruction), "{instruction:?}");
        w.into_vec()
    }

    #[test]
    fn const_flag_follows_operand_shape() {
        let script = script();
        let set = Instruction::Set(Set {
            assignee: VarRef::global(0x200),
            value: Operand::Variable(VarRef::global(0x201)),
        });
        let bytes = encode_one(&script, &set);
        assert_eq!(&bytes[..4], &(Opcode::Set.code() | CONST_FLAG).to_le_bytes());

        let empty = Instruction::Wait(Operand::Expr(Expression::default()));
        let bytes = encode_one(&script, &empty);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[4..], &EXPR_END.to_le_bytes());

        let decoded = decode(&mut Reader::new(&bytes), &mut Context::new(&script)).unwrap();
        assert_eq!(decoded, empty);
    }

    #[test]
    fn const_flag_on_fixed_shape_is_malformed() {
        let script = script();
        let mut w = Writer::new();
        w.write_u32(Opcode::Goto.code() | CONST_FLAG);
        w.write_u32(0);
        let bytes = w.into_vec();
        let err = decode(&mut Reader::new(&bytes), &mut Context::new(&script)).unwrap_err();
        assert!(matches!(err, CodecError::MalformedFile { offset: 0, .. }));
    }

    #[test]
    fn opcodes_without_decoder_are_unknown() {
        let script = script();
        for op in [Opcode::Unsure0, Opcode::Unsure5, Opcode::Unsure6, Opcode::Unsure10] {
            let bytes = op.code().to_le_bytes();
            let err = decode(&mut Reader::new(&bytes), &mut Context::new(&script)).unwrap_err();
            assert!(
                matches!(err, CodecError::UnknownOpcode { opcode, offset: 0 } if opcode == op.code()),
                "{op}"
            );
        }
    }

    #[test]
    fn thread_payload_size() {
        let script = script();
        let thread = Instruction::Thread2(Thread {
            callee: ksm_types::Callee::Function(0x400),
            take: vec![1, 2],
            give: vec![VarRef::global(0x200)],
        });
        assert_eq!(byte_size(&thread), 12 + 4 * 3);
        let bytes = encode_one(&script, &thread);
        let decoded = decode(&mut Reader::new(&bytes), &mut Context::new(&script)).unwrap();
        assert_eq!(decoded, thread);
    }
}
