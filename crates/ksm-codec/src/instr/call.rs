//! Calls, argument binding and thread spawns.

use ksm_types::instruction::{GetArgs, Thread};
use ksm_types::opcode::{ARGS_END, CALL_END};
use ksm_types::{Call, Ref, Symbol};

use super::operand::write_var;
use super::Operands;
use crate::context::Context;
use crate::cursor::{Reader, Writer};
use crate::error::CodecResult;
use crate::expr;

impl Operands for Call {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let constant = ctx.is_constant();
        expr::decode_call(r, ctx, constant)
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        expr::encode_call(w, ctx, self, self.is_const())
    }

    fn byte_size(&self) -> usize {
        expr::call_size(self, self.is_const())
    }
}

/// `function id, var id…, ARGS_END`.
impl Operands for GetArgs {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let function = ctx.function(Ref::Id(r.read_u32()?))?;
        let mut args = Vec::new();
        loop {
            let word = r.read_u32()?;
            if word == ARGS_END {
                break;
            }
            args.push(ctx.variable(Ref::Id(word))?);
        }
        Ok(GetArgs { function, args })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        w.write_u32(ctx.check(Symbol::Function(self.function))?);
        for arg in &self.args {
            write_var(w, ctx, *arg)?;
        }
        w.write_u32(ARGS_END);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        4 + self.args.len() * 4 + 4
    }
}

/// `callee id, take word…, ARGS_END, give var id…, CALL_END`. The spawned
/// body, when embedded, follows the instruction and is not part of it.
impl Operands for Thread {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let callee = ctx.callee(Ref::Id(r.read_u32()?))?;
        let mut take = Vec::new();
        loop {
            let word = r.read_u32()?;
            if word == ARGS_END {
                break;
            }
            take.push(word);
        }
        let mut give = Vec::new();
        loop {
            let word = r.read_u32()?;
            if word == CALL_END {
                break;
            }
            give.push(ctx.variable(Ref::Id(word))?);
        }
        Ok(Thread { callee, take, give })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        w.write_u32(ctx.check(self.callee.into())?);
        w.write_words(&self.take);
        w.write_u32(ARGS_END);
        for var in &self.give {
            write_var(w, ctx, *var)?;
        }
        w.write_u32(CALL_END);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        12 + 4 * (self.take.len() + self.give.len())
    }
}
