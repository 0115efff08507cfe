//! The code region: function bodies, inlined spawns, table payloads and
//! trailing padding.
//!
//! Both directions walk the same schedule: every function and table ordered
//! by its start offset. A function spawned by `Thread`/`Thread2` before it is
//! reached on its own is embedded right after the spawning instruction and is
//! consumed there; the walk then skips it.

use std::collections::HashSet;

use indexmap::IndexMap;
use ksm_types::opcode::{TABLE_CLOSE, TABLE_OPEN_FLOAT, TABLE_OPEN_INT, TABLE_OPEN_VARIABLE};
use ksm_types::{
    Function, Id, Instruction, Owner, Ref, Script, Table, TableType, TableValues,
};
use tracing::{debug, trace};

use crate::context::{Context, Visit};
use crate::cursor::{Reader, Writer};
use crate::error::{CodecError, CodecResult};
use crate::instr;

/// End offset of every instruction, relative to the code region, per function.
pub type InstructionEnds = IndexMap<Id, Vec<u32>>;

// ══════════════════════════════════════════════════════════════════════════════
// Schedule
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Function(Id),
    Table(Owner, Id),
}

impl Entry {
    fn visit(self) -> Visit {
        match self {
            Entry::Function(id) => Visit::Function(id),
            Entry::Table(owner, id) => Visit::Table(owner, id),
        }
    }
}

/// Functions then tables, stably sorted by `(start, end)` so empty bodies
/// come before whatever starts at the same offset.
fn schedule(script: &Script) -> Vec<(u32, Entry)> {
    let functions = script.functions.values().map(|f| {
        let span = (u64::from(f.code_start), u64::from(f.code_end));
        (span, f.code_start, Entry::Function(f.id))
    });
    // A declared table length can exceed the u32 offset range.
    let tables = script.all_tables().map(|(owner, t)| {
        let end = u64::from(t.start_offset) + t.payload_size() as u64;
        ((u64::from(t.start_offset), end), t.start_offset, Entry::Table(owner, t.id))
    });
    let mut entries: Vec<_> = functions.chain(tables).collect();
    entries.sort_by_key(|(span, ..)| *span);
    entries
        .into_iter()
        .map(|(_, start, entry)| (start, entry))
        .collect()
}

fn table_open_marker(ty: TableType) -> u32 {
    match ty {
        TableType::Variable => TABLE_OPEN_VARIABLE,
        TableType::Float => TABLE_OPEN_FLOAT,
        TableType::Int | TableType::Byte => TABLE_OPEN_INT,
    }
}

fn lookup_table(script: &Script, owner: Owner, id: Id) -> CodecResult<&Table> {
    script
        .table(ksm_types::TableRef { owner, id })
        .ok_or_else(|| CodecError::Internal(format!("scheduled table {id} vanished")))
}

fn lookup_function(script: &Script, id: Id) -> CodecResult<&Function> {
    script
        .functions
        .get(&id)
        .ok_or_else(|| CodecError::UnknownSymbol(format!("function {id}")))
}

// ══════════════════════════════════════════════════════════════════════════════
// Decode
// ══════════════════════════════════════════════════════════════════════════════

/// Where an undeclared function belongs in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Right after this function, so the layout pass emits it just before.
    After(Id),
    /// At the front, so it is emitted last among the top-level functions.
    Front,
}

/// Everything learned from the code region, applied to the script afterwards.
#[derive(Debug, Default)]
pub(crate) struct DecodedCode {
    pub bodies: IndexMap<Id, Vec<Instruction>>,
    pub inline: HashSet<Id>,
    pub table_values: Vec<(Owner, Id, TableValues)>,
    pub undeclared: Vec<(Placement, Function)>,
    pub trailing: Vec<u32>,
}

pub(crate) fn decode(
    r: &mut Reader<'_>,
    script: &Script,
    code_base: usize,
) -> CodecResult<DecodedCode> {
    let ctx = Context::new(script).with_code_base(code_base);
    let mut out = DecodedCode::default();
    let mut next_id = script.next_function_id();

    for (start, entry) in schedule(script) {
        if ctx.is_seen(entry.visit()) {
            continue;
        }
        let start = code_base + start as usize;
        if r.offset() < start {
            let mut function = Function::new(next_id);
            function.declared = false;
            function.code_start = (r.offset() - code_base) as u32;
            function.code_end = (start - code_base) as u32;
            debug!(
                id = next_id,
                start = function.code_start,
                end = function.code_end,
                "capturing unattributed code"
            );
            function.instructions = decode_body(r, &ctx, start, &mut out)?;
            let placement = match entry {
                Entry::Function(id) => Placement::After(id),
                Entry::Table(..) => Placement::Front,
            };
            out.undeclared.push((placement, function));
            next_id = next_id.wrapping_add(1);
        } else if r.offset() > start {
            return Err(CodecError::malformed(
                r.offset(),
                format!("{entry:?} starts at {start:#x}, inside preceding code"),
            ));
        }

        match entry {
            Entry::Function(id) => {
                let function = lookup_function(script, id)?;
                decode_function(r, &ctx, function, &mut out)?;
            }
            Entry::Table(owner, id) => {
                let table = lookup_table(script, owner, id)?;
                let values = decode_table(r, &ctx, owner, table)?;
                out.table_values.push((owner, id, values));
            }
        }
    }

    out.trailing = r.read_words_until(r.len())?;
    Ok(out)
}

fn decode_function<'s>(
    r: &mut Reader<'_>,
    ctx: &Context<'s>,
    function: &'s Function,
    out: &mut DecodedCode,
) -> CodecResult<()> {
    ctx.visit(Visit::Function(function.id))?;
    let end = ctx.code_base() + function.code_end as usize;
    if end < r.offset() {
        return Err(CodecError::malformed(
            r.offset(),
            format!("function {} ends before it starts", function.describe()),
        ));
    }
    let scoped = ctx.push(function);
    let body = decode_body(r, &scoped, end, out)?;
    out.bodies.insert(function.id, body);
    Ok(())
}

/// Decode instructions up to `until`, embedding spawned functions in place.
fn decode_body(
    r: &mut Reader<'_>,
    ctx: &Context<'_>,
    until: usize,
    out: &mut DecodedCode,
) -> CodecResult<Vec<Instruction>> {
    let mut ctx = ctx.clone();
    let mut instructions = Vec::new();
    while r.offset() < until {
        let instruction = instr::decode(r, &mut ctx)?;
        let spawned = instruction.inlined_function();
        instructions.push(instruction);

        let Some(callee) = spawned else { continue };
        if ctx.is_seen(Visit::Function(callee)) {
            continue;
        }
        let function = lookup_function(ctx.script(), callee)?;
        let expected = ctx.code_base() + function.code_start as usize;
        if r.offset() != expected {
            return Err(CodecError::malformed(
                r.offset(),
                format!(
                    "spawned function {} declared at {expected:#x}",
                    function.describe()
                ),
            ));
        }
        trace!(callee, offset = expected, "inlining spawned function");
        out.inline.insert(callee);
        decode_function(r, &ctx, function, out)?;
    }
    if r.offset() != until {
        return Err(CodecError::malformed(
            r.offset(),
            format!("code overruns its end at {until:#x}"),
        ));
    }
    Ok(instructions)
}

fn decode_table(
    r: &mut Reader<'_>,
    ctx: &Context<'_>,
    owner: Owner,
    table: &Table,
) -> CodecResult<TableValues> {
    ctx.visit(Visit::Table(owner, table.id))?;
    let offset = r.offset();
    let marker = r.read_u32()?;
    if marker != table_open_marker(table.ty) {
        return Err(CodecError::malformed(
            offset,
            format!("table {} opens with {marker:#x}", table.id),
        ));
    }

    let len = table.length as usize;
    let values = match table.ty {
        TableType::Variable => {
            let scope = match owner {
                Owner::Function(f) => ctx.push(lookup_function(ctx.script(), f)?),
                Owner::Script => ctx.clone(),
            };
            let mut vars = Vec::new();
            for _ in 0..len {
                vars.push(scope.variable(Ref::Id(r.read_u32()?))?);
            }
            TableValues::Variable(vars)
        }
        TableType::Int => TableValues::Int(
            (0..len).map(|_| r.read_i32()).collect::<CodecResult<_>>()?,
        ),
        TableType::Float => TableValues::Float(
            (0..len).map(|_| r.read_f32()).collect::<CodecResult<_>>()?,
        ),
        TableType::Byte => {
            let bytes = r.read_bytes(len)?.to_vec();
            r.read_bytes(len.next_multiple_of(4) - len)?;
            TableValues::Byte(bytes)
        }
    };

    let close_offset = r.offset();
    let close = r.read_u32()?;
    if close != TABLE_CLOSE {
        return Err(CodecError::malformed(
            close_offset,
            format!("table {} closes with {close:#x}", table.id),
        ));
    }
    Ok(values)
}

// ══════════════════════════════════════════════════════════════════════════════
// Emit
// ══════════════════════════════════════════════════════════════════════════════

/// Write the code region at the writer's current position, which becomes the
/// code base. Offsets must already be assigned by the layout pass.
pub(crate) fn emit(w: &mut Writer, script: &Script) -> CodecResult<InstructionEnds> {
    let code_base = w.position();
    let ctx = Context::new(script).with_code_base(code_base);
    let mut ends = InstructionEnds::new();

    for (start, entry) in schedule(script) {
        if ctx.is_seen(entry.visit()) {
            continue;
        }
        expect_position(w, &ctx, start, &format!("{entry:?}"))?;
        match entry {
            Entry::Function(id) => {
                let function = lookup_function(script, id)?;
                emit_function(w, &ctx, function, &mut ends)?;
            }
            Entry::Table(owner, id) => {
                ctx.visit(Visit::Table(owner, id))?;
                emit_table(w, &ctx, lookup_table(script, owner, id)?)?;
            }
        }
    }
    w.write_words(&script.padding[2]);
    Ok(ends)
}

fn expect_position(
    w: &Writer,
    ctx: &Context<'_>,
    start: u32,
    what: &str,
) -> CodecResult<()> {
    let actual = w.position() - ctx.code_base();
    if actual != start as usize {
        return Err(CodecError::Internal(format!(
            "{what} laid out at {start:#x} but emitted at {actual:#x}"
        )));
    }
    Ok(())
}

fn emit_function<'s>(
    w: &mut Writer,
    ctx: &Context<'s>,
    function: &'s Function,
    ends: &mut InstructionEnds,
) -> CodecResult<()> {
    ctx.visit(Visit::Function(function.id))?;
    let scoped = ctx.push(function);
    let mut offsets = Vec::with_capacity(function.instructions.len());
    for instruction in &function.instructions {
        instr::encode(w, &scoped, instruction)?;
        offsets.push((w.position() - ctx.code_base()) as u32);

        let Some(callee) = instruction.inlined_function() else {
            continue;
        };
        if scoped.is_seen(Visit::Function(callee)) {
            continue;
        }
        let spawned = lookup_function(ctx.script(), callee)?;
        expect_position(w, ctx, spawned.code_start, &spawned.describe())?;
        emit_function(w, &scoped, spawned, ends)?;
    }
    ends.insert(function.id, offsets);
    expect_position(w, ctx, function.code_end, &format!("end of {}", function.describe()))
}

fn emit_table(w: &mut Writer, ctx: &Context<'_>, table: &Table) -> CodecResult<()> {
    if table.values.table_type() != table.ty {
        return Err(CodecError::TypeMismatch(format!(
            "table {} is declared {:?} but holds {:?} values",
            table.id,
            table.ty,
            table.values.table_type()
        )));
    }
    w.write_u32(table_open_marker(table.ty));
    match &table.values {
        TableValues::Variable(vars) => {
            for var in vars {
                w.write_u32(ctx.check_var(*var)?);
            }
        }
        TableValues::Int(values) => values.iter().for_each(|v| w.write_i32(*v)),
        TableValues::Float(values) => values.iter().for_each(|v| w.write_f32(*v)),
        TableValues::Byte(values) => {
            w.write_bytes(values);
            w.align4();
        }
    }
    w.write_u32(TABLE_CLOSE);
    Ok(())
}
