//! Record codecs: functions, variables, imports, labels and tables.
//!
//! Every record starts with a naming flag word. When the flag says a name is
//! present, the name follows the record's fixed fields as a padded string.

use indexmap::IndexMap;
use ksm_types::{
    display_name, Function, Import, Label, Table, TableType, TableValues, Variable, VariableScope,
    VariableType, VariableValue,
};

use crate::cursor::{Reader, Writer};
use crate::error::{CodecError, CodecResult};

// ══════════════════════════════════════════════════════════════════════════════
// Naming
// ══════════════════════════════════════════════════════════════════════════════

const NAMED: u32 = 0xFFFF_FFFF;
const ANONYMOUS: u32 = 0;

fn read_name_flag(r: &mut Reader<'_>) -> CodecResult<bool> {
    let offset = r.offset();
    match r.read_u32()? {
        NAMED => Ok(true),
        ANONYMOUS => Ok(false),
        other => Err(CodecError::malformed(
            offset,
            format!("invalid name flag {other:#x}"),
        )),
    }
}

fn write_name_flag(w: &mut Writer, name: Option<&str>) {
    w.write_u32(if name.is_some() { NAMED } else { ANONYMOUS });
}

fn read_name(r: &mut Reader<'_>, named: bool) -> CodecResult<Option<String>> {
    if named {
        r.read_padded_string().map(Some)
    } else {
        Ok(None)
    }
}

fn write_name(w: &mut Writer, name: Option<&str>) {
    if let Some(name) = name {
        w.write_padded_string(name);
    }
}

fn read_count(r: &mut Reader<'_>) -> CodecResult<usize> {
    Ok(r.read_u32()? as usize)
}

/// A word offset scaled to bytes. Code offsets never lie past the buffer.
fn read_word_offset(r: &mut Reader<'_>) -> CodecResult<u32> {
    let at = r.offset();
    let word = r.read_u32()?;
    word.checked_mul(4)
        .filter(|&offset| offset as usize <= r.len())
        .ok_or_else(|| {
            CodecError::malformed(at, format!("word offset {word:#x} past end of data"))
        })
}

// ══════════════════════════════════════════════════════════════════════════════
// Variables
// ══════════════════════════════════════════════════════════════════════════════

pub fn read_variable(r: &mut Reader<'_>, scope: VariableScope) -> CodecResult<Variable> {
    let named = read_name_flag(r)?;
    let id = r.read_u32()?;
    let (code, flags) = r.read_u24_u8()?;
    let ty = VariableType::from_code(code);
    let value_offset = r.offset();
    let raw = r.read_u32()?;
    let name = read_name(r, named)?;
    let value = match ty {
        VariableType::Int => VariableValue::Int(raw as i32),
        VariableType::Float => VariableValue::Float(f32::from_bits(raw)),
        VariableType::String => {
            if raw != 0 {
                return Err(CodecError::malformed(
                    value_offset,
                    format!(
                        "string variable {} has value word {raw:#x}",
                        display_name(id, name.as_deref())
                    ),
                ));
            }
            VariableValue::String(r.read_padded_string()?)
        }
        VariableType::Raw(_) => VariableValue::Raw(raw),
    };
    Ok(Variable {
        id,
        name,
        scope,
        ty,
        flags,
        value,
    })
}

pub fn write_variable(w: &mut Writer, var: &Variable) -> CodecResult<()> {
    if !var.value.fits(var.ty) {
        return Err(CodecError::TypeMismatch(format!(
            "variable {} is declared {:?} but holds {:?}",
            display_name(var.id, var.name.as_deref()),
            var.ty,
            var.value
        )));
    }
    write_name_flag(w, var.name.as_deref());
    w.write_u32(var.id);
    w.write_u32((var.ty.code() & 0x00FF_FFFF) | (u32::from(var.flags) << 24));
    match &var.value {
        VariableValue::Int(v) => w.write_i32(*v),
        VariableValue::Float(v) => w.write_f32(*v),
        VariableValue::String(_) => w.write_u32(0),
        VariableValue::Raw(v) => w.write_u32(*v),
    }
    write_name(w, var.name.as_deref());
    if let VariableValue::String(text) = &var.value {
        w.write_padded_string(text);
    }
    Ok(())
}

/// `count, Variable*`.
pub fn read_variables(
    r: &mut Reader<'_>,
    scope: VariableScope,
) -> CodecResult<IndexMap<u32, Variable>> {
    let count = read_count(r)?;
    let mut vars = IndexMap::new();
    for _ in 0..count {
        let var = read_variable(r, scope)?;
        vars.insert(var.id, var);
    }
    Ok(vars)
}

pub fn write_variables<'v>(
    w: &mut Writer,
    vars: impl ExactSizeIterator<Item = &'v Variable>,
) -> CodecResult<()> {
    w.write_u32(vars.len() as u32);
    for var in vars {
        write_variable(w, var)?;
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Imports & labels
// ══════════════════════════════════════════════════════════════════════════════

pub fn read_import(r: &mut Reader<'_>) -> CodecResult<Import> {
    let named = read_name_flag(r)?;
    let u0 = r.read_u32()?;
    let u1 = r.read_u32()?;
    let u2 = r.read_u32()?;
    let id = r.read_u32()?;
    let u3 = r.read_u32()?;
    let u4 = r.read_u32()?;
    let name = read_name(r, named)?;
    Ok(Import {
        id,
        name,
        unknown: [u0, u1, u2, u3, u4],
    })
}

pub fn write_import(w: &mut Writer, import: &Import) {
    let [u0, u1, u2, u3, u4] = import.unknown;
    write_name_flag(w, import.name.as_deref());
    w.write_words(&[u0, u1, u2, import.id, u3, u4]);
    write_name(w, import.name.as_deref());
}

pub fn read_label(r: &mut Reader<'_>) -> CodecResult<Label> {
    let named = read_name_flag(r)?;
    let id = r.read_u32()?;
    let address = r.read_u32()?;
    let name = read_name(r, named)?;
    Ok(Label { id, name, address })
}

pub fn write_label(w: &mut Writer, label: &Label) {
    write_name_flag(w, label.name.as_deref());
    w.write_u32(label.id);
    w.write_u32(label.address);
    write_name(w, label.name.as_deref());
}

// ══════════════════════════════════════════════════════════════════════════════
// Tables
// ══════════════════════════════════════════════════════════════════════════════

/// Read a table declaration. Values are filled in later from the code region.
pub fn read_table(r: &mut Reader<'_>) -> CodecResult<Table> {
    let named = read_name_flag(r)?;
    let id = r.read_u32()?;
    let type_offset = r.offset();
    let code = r.read_u32()?;
    let ty = TableType::from_code(code).ok_or_else(|| {
        CodecError::malformed(type_offset, format!("invalid table type {code:#x}"))
    })?;
    let length = r.read_u32()?;
    let start_offset = read_word_offset(r)?;
    let name = read_name(r, named)?;
    Ok(Table {
        id,
        name,
        ty,
        length,
        start_offset,
        values: TableValues::empty(ty),
    })
}

pub fn write_table(w: &mut Writer, table: &Table) {
    write_name_flag(w, table.name.as_deref());
    w.write_u32(table.id);
    w.write_u32(table.ty.code());
    w.write_u32(table.length);
    w.write_u32(table.start_offset / 4);
    write_name(w, table.name.as_deref());
}

pub fn read_tables(r: &mut Reader<'_>) -> CodecResult<IndexMap<u32, Table>> {
    let count = read_count(r)?;
    let mut tables = IndexMap::new();
    for _ in 0..count {
        let table = read_table(r)?;
        tables.insert(table.id, table);
    }
    Ok(tables)
}

pub fn write_tables<'t>(w: &mut Writer, tables: impl ExactSizeIterator<Item = &'t Table>) {
    w.write_u32(tables.len() as u32);
    for table in tables {
        write_table(w, table);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Function declarations
// ══════════════════════════════════════════════════════════════════════════════

pub fn read_function(r: &mut Reader<'_>) -> CodecResult<Function> {
    let named = read_name_flag(r)?;
    let id = r.read_u32()?;
    let public = r.read_u32()? != 0;
    let unknown0 = r.read_u32()?;
    let code_start = read_word_offset(r)?;
    let code_end = read_word_offset(r)?;
    let unknown1 = r.read_u32()?;
    let unknown2 = r.read_u32()?;
    let name = read_name(r, named)?;

    let mut function = Function::new(id);
    function.name = name;
    function.public = public;
    function.unknown = [unknown0, unknown1, unknown2];
    function.code_start = code_start;
    function.code_end = code_end;
    function.variables = read_variables(r, VariableScope::Local)?;
    function.tables = read_tables(r)?;
    let labels = read_count(r)?;
    for _ in 0..labels {
        function.add_label(read_label(r)?);
    }
    Ok(function)
}

pub fn write_function(w: &mut Writer, function: &Function) -> CodecResult<()> {
    let [unknown0, unknown1, unknown2] = function.unknown;
    write_name_flag(w, function.name.as_deref());
    w.write_words(&[
        function.id,
        u32::from(function.public),
        unknown0,
        function.code_start / 4,
        function.code_end / 4,
        unknown1,
        unknown2,
    ]);
    write_name(w, function.name.as_deref());
    write_variables(w, function.variables.values())?;
    write_tables(w, function.tables.values());
    w.write_u32(function.labels.len() as u32);
    for label in function.labels.values() {
        write_label(w, label);
    }
    Ok(())
}
