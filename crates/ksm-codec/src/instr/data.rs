//! Assignment and table access.

use ksm_types::instruction::{GetIndex, Set};
use ksm_types::Operand;

use super::operand::{read_table, read_var, write_table, write_var};
use super::Operands;
use crate::context::Context;
use crate::cursor::{Reader, Writer};
use crate::error::CodecResult;

impl Operands for Set {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        let assignee = read_var(r, ctx)?;
        let value = Operand::decode(r, ctx)?;
        Ok(Set { assignee, value })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        write_var(w, ctx, self.assignee)?;
        self.value.encode(w, ctx)
    }

    fn byte_size(&self) -> usize {
        4 + self.value.byte_size()
    }
}

impl Operands for GetIndex {
    fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Self> {
        Ok(GetIndex {
            table: read_table(r, ctx)?,
            occurrence: read_var(r, ctx)?,
            variable: read_var(r, ctx)?,
        })
    }

    fn encode(&self, w: &mut Writer, ctx: &Context<'_>) -> CodecResult<()> {
        write_table(w, ctx, self.table)?;
        write_var(w, ctx, self.occurrence)?;
        write_var(w, ctx, self.variable)
    }

    fn byte_size(&self) -> usize {
        12
    }
}
