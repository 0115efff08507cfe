//! Structured control flow: if/else chains, switch/case and do-while.
//!
//! Jump targets are read and written verbatim here; the fixup pass owns their
//! values.

use ksm_types::instruction::{Case, DoWhile, Else, ElseIf, If, Switch};
use ksm_types::Operand;

use super::operand::{read_var, write_var};
use super::Operands;
use crate::context::Context;
use crate::cursor::{Reader, Writer};
use crate::error::CodecResult;
use crate::expr;

impl Operands for If {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let condition = expr::decode(r, ctx)?;
        Ok(If {
            condition,
            target: r.read_u32()?,
            unknown1: r.read_u32()?,
            unknown2: r.read_u32()?,
        })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        expr::encode(w, ctx, &self.condition)?;
        w.write_words(&[self.target, self.unknown1, self.unknown2]);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        expr::size(&self.condition) + 12
    }
}

impl Operands for ElseIf {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let skip_target = r.read_u32()?;
        let unknown1 = r.read_u32()?;
        let condition = expr::decode(r, ctx)?;
        Ok(ElseIf {
            skip_target,
            unknown1,
            condition,
            target: r.read_u32()?,
            unknown3: r.read_u32()?,
            unknown4: r.read_u32()?,
        })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        w.write_words(&[self.skip_target, self.unknown1]);
        expr::encode(w, ctx, &self.condition)?;
        w.write_words(&[self.target, self.unknown3, self.unknown4]);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        8 + expr::size(&self.condition) + 12
    }
}

impl Operands for Else {
    fn decode(r: &mut Reader<'_>, _ctx: &mut Context<'_>) -> CodecResult<Self> {
        Ok(Else {
            target: r.read_u32()?,
        })
    }

    fn encode(&self, w: &mut Writer, _ctx: &Context<'_>) -> CodecResult<()> {
        w.write_u32(self.target);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        4
    }
}

impl Operands for Switch {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        Ok(Switch {
            value: read_var(r, ctx)?,
            entry: r.read_u32()?,
            exit: r.read_u32()?,
        })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        write_var(w, ctx, self.value)?;
        w.write_words(&[self.entry, self.exit]);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        12
    }
}

impl Operands for Case {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        Ok(Case {
            value: read_var(r, ctx)?,
            target: r.read_u32()?,
        })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        write_var(w, ctx, self.value)?;
        w.write_u32(self.target);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        8
    }
}

impl Operands for DoWhile {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let condition = Operand::decode(r, ctx)?;
        Ok(DoWhile {
            condition,
            target: r.read_u32()?,
        })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        self.condition.encode(w, ctx)?;
        w.write_u32(self.target);
        Ok(())
    }

    fn byte_size(&self) -> usize {
        self.condition.byte_size() + 4
    }
}

