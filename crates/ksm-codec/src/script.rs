//! Container parse and build.
//!
//! Section order is fixed: (0) padding words, (1) function declarations,
//! (2) static variables, (3) tables and filler words, (4) const variables,
//! (5) imports, (6) global variables, (7) code. The header holds the magic,
//! the word offset of each section and a reserved zero word.

use ksm_types::{Script, VariableScope, MAGIC, SECTION_COUNT};
use tracing::{debug, warn};

use crate::code::{self, InstructionEnds, Placement};
use crate::config::CodecOptions;
use crate::cursor::{Reader, Writer};
use crate::error::{CodecError, CodecResult};
use crate::fixup::{self, check_label_count};
use crate::layout;
use crate::records;

/// Bytes before section 0: magic, section offsets and the reserved word.
pub const HEADER_SIZE: usize = MAGIC.len() + SECTION_COUNT * 4 + 4;

/// Result of [`build_with`].
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub bytes: Vec<u8>,
    /// Absolute offset of the code region (just past the code word count).
    pub code_base: usize,
    /// End offset of every instruction, relative to `code_base`.
    pub instruction_ends: InstructionEnds,
}

// ══════════════════════════════════════════════════════════════════════════════
// Parse
// ══════════════════════════════════════════════════════════════════════════════

pub fn parse(bytes: &[u8]) -> CodecResult<Script> {
    parse_with(bytes, &CodecOptions::default())
}

pub fn parse_with(bytes: &[u8], options: &CodecOptions) -> CodecResult<Script> {
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::NotAContainer);
    }
    let mut r = Reader::new(bytes);
    r.seek(MAGIC.len())?;

    let mut sections = [0usize; SECTION_COUNT];
    for (index, slot) in sections.iter_mut().enumerate() {
        let at = r.offset();
        let word = r.read_u32()?;
        *slot = (word as usize)
            .checked_mul(4)
            .filter(|&offset| offset <= bytes.len())
            .ok_or_else(|| {
                CodecError::malformed(
                    at,
                    format!("section {index} offset {word:#x} past end of data"),
                )
            })?;
    }
    let reserved_offset = r.offset();
    let reserved = r.read_u32()?;
    if reserved != 0 {
        return Err(CodecError::malformed(
            reserved_offset,
            format!("reserved header word is {reserved:#x}"),
        ));
    }

    let mut script = Script::new();

    enter_section(&r, &sections, 0)?;
    script.padding[0] = r.read_words_until(sections[1])?;

    enter_section(&r, &sections, 1)?;
    let count = r.read_u32()?;
    for _ in 0..count {
        let function = records::read_function(&mut r)?;
        script.add_function(function);
    }
    debug!(functions = count, "read function declarations");

    enter_section(&r, &sections, 2)?;
    read_variable_section(&mut r, &mut script, VariableScope::Static)?;

    enter_section(&r, &sections, 3)?;
    script.tables = records::read_tables(&mut r)?;
    script.padding[1] = r.read_words_until(sections[4])?;
    debug!(tables = script.tables.len(), "read tables");

    enter_section(&r, &sections, 4)?;
    read_variable_section(&mut r, &mut script, VariableScope::Const)?;

    enter_section(&r, &sections, 5)?;
    let count = r.read_u32()?;
    for _ in 0..count {
        script.add_import(records::read_import(&mut r)?);
    }
    debug!(imports = count, "read imports");

    enter_section(&r, &sections, 6)?;
    read_variable_section(&mut r, &mut script, VariableScope::Global)?;

    enter_section(&r, &sections, 7)?;
    let count_offset = r.offset();
    let words = r.read_u32()? as usize;
    let code_base = r.offset();
    if words.checked_mul(4) != Some(r.remaining()) {
        return Err(CodecError::malformed(
            count_offset,
            format!(
                "code section declares {words} words but {} bytes follow",
                r.remaining()
            ),
        ));
    }
    let decoded = code::decode(&mut r, &script, code_base)?;
    apply_decoded(&mut script, decoded);

    for function in script.functions.values() {
        check_label_count(function, options)?;
    }
    debug!(
        functions = script.functions.len(),
        code_base, "parsed container"
    );
    Ok(script)
}

fn enter_section(
    r: &Reader<'_>,
    sections: &[usize; SECTION_COUNT],
    index: usize,
) -> CodecResult<()> {
    if r.offset() != sections[index] {
        return Err(CodecError::malformed(
            r.offset(),
            format!("section {index} declared at {:#x}", sections[index]),
        ));
    }
    Ok(())
}

fn read_variable_section(
    r: &mut Reader<'_>,
    script: &mut Script,
    scope: VariableScope,
) -> CodecResult<()> {
    let vars = records::read_variables(r, scope)?;
    debug!(?scope, count = vars.len(), "read variables");
    for var in vars.into_values() {
        script.add_variable(var);
    }
    Ok(())
}

fn apply_decoded(script: &mut Script, decoded: code::DecodedCode) {
    for (id, body) in decoded.bodies {
        if let Some(function) = script.functions.get_mut(&id) {
            function.instructions = body;
            function.inline = decoded.inline.contains(&id);
        }
    }
    for (owner, id, values) in decoded.table_values {
        let table = match owner {
            ksm_types::Owner::Script => script.tables.get_mut(&id),
            ksm_types::Owner::Function(f) => script
                .functions
                .get_mut(&f)
                .and_then(|function| function.tables.get_mut(&id)),
        };
        if let Some(table) = table {
            table.values = values;
        }
    }
    for (placement, function) in decoded.undeclared {
        let index = match placement {
            Placement::After(id) => script
                .functions
                .get_index_of(&id)
                .map_or(script.functions.len(), |i| i + 1),
            Placement::Front => 0,
        };
        script
            .functions
            .shift_insert(index, function.id, function);
    }
    script.padding[2] = decoded.trailing;
}

// ══════════════════════════════════════════════════════════════════════════════
// Build
// ══════════════════════════════════════════════════════════════════════════════

pub fn build(script: &mut Script) -> CodecResult<Vec<u8>> {
    build_with(script, &CodecOptions::default()).map(|out| out.bytes)
}

/// Lay out, emit, fix up, then rewrite the declaration and code sections with
/// the corrected jump fields. Mutates `script` with the assigned offsets.
pub fn build_with(script: &mut Script, options: &CodecOptions) -> CodecResult<BuildOutput> {
    warn_unplaceable(script);
    layout::assign_offsets(script)?;

    let mut w = Writer::new();
    w.write_bytes(&MAGIC);
    w.write_words(&[0; SECTION_COUNT + 1]);
    let mut sections = [0usize; SECTION_COUNT];

    sections[0] = w.position();
    w.write_words(&script.padding[0]);

    sections[1] = w.position();
    write_function_section(&mut w, script)?;

    sections[2] = w.position();
    write_variable_section(&mut w, script, VariableScope::Static)?;

    sections[3] = w.position();
    records::write_tables(&mut w, script.tables.values());
    w.write_words(&script.padding[1]);

    sections[4] = w.position();
    write_variable_section(&mut w, script, VariableScope::Const)?;

    sections[5] = w.position();
    w.write_u32(script.imports.len() as u32);
    for import in script.imports.values() {
        records::write_import(&mut w, import);
    }

    sections[6] = w.position();
    write_variable_section(&mut w, script, VariableScope::Global)?;

    sections[7] = w.position();
    w.write_u32(0);
    let code_base = w.position();
    let first_pass = code::emit(&mut w, script)?;
    let code_words = (w.position() - code_base) / 4;
    fixup::apply_fixups(script, &first_pass, options)?;

    // Offsets are final now; only jump fields and label addresses changed.
    let mut declarations = Writer::new();
    write_function_section(&mut declarations, script)?;
    rewrite(
        &mut w,
        sections[1],
        declarations.as_slice(),
        sections[2] - sections[1],
        "declarations",
    )?;

    let mut code = Writer::new();
    let instruction_ends = code::emit(&mut code, script)?;
    rewrite(&mut w, code_base, code.as_slice(), code_words * 4, "code")?;

    w.patch_u32(sections[7], code_words as u32)?;
    for (index, offset) in sections.iter().enumerate() {
        w.patch_u32(MAGIC.len() + index * 4, (*offset / 4) as u32)?;
    }
    debug!(bytes = w.position(), code_base, "built container");

    Ok(BuildOutput {
        bytes: w.into_vec(),
        code_base,
        instruction_ends,
    })
}

fn rewrite(
    w: &mut Writer,
    at: usize,
    bytes: &[u8],
    expected: usize,
    what: &str,
) -> CodecResult<()> {
    if bytes.len() != expected {
        return Err(CodecError::Internal(format!(
            "rewritten {what} is {} bytes, first pass wrote {expected}",
            bytes.len()
        )));
    }
    w.patch(at, bytes)
}

fn write_function_section(w: &mut Writer, script: &Script) -> CodecResult<()> {
    let declared: Vec<_> = script.functions.values().filter(|f| f.declared).collect();
    w.write_u32(declared.len() as u32);
    for function in declared {
        records::write_function(w, function)?;
    }
    Ok(())
}

fn write_variable_section(
    w: &mut Writer,
    script: &Script,
    scope: VariableScope,
) -> CodecResult<()> {
    let vars: Vec<_> = script.variables_in(scope).collect();
    records::write_variables(w, vars.into_iter())
}

/// Script-level variables that no section can hold.
fn warn_unplaceable(script: &Script) {
    for var in script.variables_in(VariableScope::Local) {
        warn!(id = var.id, "script-level variable with local scope is not written");
    }
}
