//! Operand slots shared by most instruction families.

use ksm_types::opcode::EXPR_END;
use ksm_types::{Expression, Id, LabelRef, Operand, Ref, Symbol, TableRef, VarRef};

use super::Operands;
use crate::context::Context;
use crate::cursor::{Reader, Writer};
use crate::error::CodecResult;
use crate::expr;

impl Operands for Expression {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        expr::decode(r, ctx)
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        expr::encode(w, ctx, self)
    }

    fn byte_size(&self) -> usize {
        expr::size(self)
    }
}

/// Const-or-expression slot. The const flag of the enclosing opcode word picks
/// the shape: one word (a variable id, or the terminator for an empty
/// expression), or a full expression.
impl Operands for Operand {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        if !ctx.is_constant() {
            return expr::decode(r, ctx).map(Operand::Expr);
        }
        match r.read_u32()? {
            EXPR_END => Ok(Operand::Expr(Expression::default())),
            id => ctx.variable(Ref::Id(id)).map(Operand::Variable),
        }
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        match self {
            Operand::Variable(var) => {
                w.write_u32(ctx.check_var(*var)?);
                Ok(())
            }
            Operand::Expr(e) => expr::encode(w, ctx, e),
        }
    }

    fn byte_size(&self) -> usize {
        match self {
            Operand::Variable(_) => 4,
            Operand::Expr(e) => expr::size(e),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Fixed reference slots
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn read_var(r: &mut Reader<'_>, ctx: &Context<'_>) -> CodecResult<VarRef> {
    ctx.variable(Ref::Id(r.read_u32()?))
}

pub(crate) fn write_var(w: &mut Writer, ctx: &Context<'_>, var: VarRef) -> CodecResult<()> {
    w.write_u32(ctx.check_var(var)?);
    Ok(())
}

pub(crate) fn read_vars<const N: usize>(
    r: &mut Reader<'_>,
    ctx: &Context<'_>,
) -> CodecResult<[VarRef; N]> {
    let mut vars = [VarRef::global(0); N];
    for slot in &mut vars {
        *slot = read_var(r, ctx)?;
    }
    Ok(vars)
}

pub(crate) fn write_vars(w: &mut Writer, ctx: &Context<'_>, vars: &[VarRef]) -> CodecResult<()> {
    vars.iter().try_for_each(|var| write_var(w, ctx, *var))
}

pub(crate) fn read_table(r: &mut Reader<'_>, ctx: &Context<'_>) -> CodecResult<TableRef> {
    ctx.table(Ref::Id(r.read_u32()?))
}

pub(crate) fn write_table(w: &mut Writer, ctx: &Context<'_>, table: TableRef) -> CodecResult<()> {
    w.write_u32(ctx.check(Symbol::Table(table))?);
    Ok(())
}

pub(crate) fn read_label(r: &mut Reader<'_>, ctx: &Context<'_>) -> CodecResult<LabelRef> {
    ctx.label(Ref::Id(r.read_u32()?))
}

pub(crate) fn write_label(w: &mut Writer, ctx: &Context<'_>, label: LabelRef) -> CodecResult<()> {
    w.write_u32(ctx.check(Symbol::Label(label))?);
    Ok(())
}

pub(crate) fn read_import(r: &mut Reader<'_>, ctx: &Context<'_>) -> CodecResult<Id> {
    ctx.import(Ref::Id(r.read_u32()?))
}

pub(crate) fn write_import(w: &mut Writer, ctx: &Context<'_>, import: Id) -> CodecResult<()> {
    w.write_u32(ctx.check(Symbol::Import(import))?);
    Ok(())
}
