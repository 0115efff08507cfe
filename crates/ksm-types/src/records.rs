//! Self-describing binary records: variables, imports, labels and tables.
//!
//! Every record carries an optional name. Anonymous records are referenced as
//! `ref:<id>` by the interchange layer.

use serde::{Deserialize, Serialize};

use crate::symbol::{Id, VarRef};

// ══════════════════════════════════════════════════════════════════════════════
// Variables
// ══════════════════════════════════════════════════════════════════════════════

/// Storage class of a variable. Determines which section holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// Synthetic runtime temporaries; never written to disk.
    Tmp,
    /// Section 4.
    Const,
    /// Owned by a function declaration.
    Local,
    /// Section 2.
    Static,
    /// Section 6.
    Global,
}

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Float,
    Int,
    String,
    /// A type code this codec does not interpret; preserved verbatim.
    Raw(u32),
}

impl VariableType {
    pub const CODE_FLOAT: u32 = 0x0;
    pub const CODE_INT: u32 = 0x1;
    pub const CODE_STRING: u32 = 0x3;

    pub fn code(self) -> u32 {
        match self {
            VariableType::Float => Self::CODE_FLOAT,
            VariableType::Int => Self::CODE_INT,
            VariableType::String => Self::CODE_STRING,
            VariableType::Raw(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::CODE_FLOAT => VariableType::Float,
            Self::CODE_INT => VariableType::Int,
            Self::CODE_STRING => VariableType::String,
            other => VariableType::Raw(other),
        }
    }
}

/// Initial value of a variable. The shape must agree with its [`VariableType`].
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Int(i32),
    Float(f32),
    String(String),
    /// Value word of a [`VariableType::Raw`] variable.
    Raw(u32),
}

impl VariableValue {
    /// Whether this value shape is legal for the given type.
    pub fn fits(&self, ty: VariableType) -> bool {
        matches!(
            (ty, self),
            (VariableType::Int, VariableValue::Int(_))
                | (VariableType::Float, VariableValue::Float(_))
                | (VariableType::String, VariableValue::String(_))
                | (VariableType::Raw(_), VariableValue::Raw(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: Id,
    pub name: Option<String>,
    pub scope: VariableScope,
    pub ty: VariableType,
    /// Opaque byte stored next to the 24-bit type code.
    pub flags: u8,
    pub value: VariableValue,
}

/// Number of synthetic `tmp` variables present in every script.
pub const TMP_VARIABLE_COUNT: u32 = 0x16;
/// Id of the first `tmp` variable; the rest follow consecutively.
pub const TMP_VARIABLE_BASE: Id = 0x1000_0100;

impl Variable {
    pub fn new(id: Id, scope: VariableScope, ty: VariableType, value: VariableValue) -> Self {
        Self {
            id,
            name: None,
            scope,
            ty,
            flags: 0,
            value,
        }
    }

    pub fn int(id: Id, scope: VariableScope, value: i32) -> Self {
        Self::new(id, scope, VariableType::Int, VariableValue::Int(value))
    }

    pub fn float(id: Id, scope: VariableScope, value: f32) -> Self {
        Self::new(id, scope, VariableType::Float, VariableValue::Float(value))
    }

    pub fn string(id: Id, scope: VariableScope, value: impl Into<String>) -> Self {
        Self::new(id, scope, VariableType::String, VariableValue::String(value.into()))
    }

    /// The `n`-th synthetic temporary.
    pub fn tmp(n: u32) -> Self {
        Self::int(TMP_VARIABLE_BASE | n, VariableScope::Tmp, 0)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Imports & labels
// ══════════════════════════════════════════════════════════════════════════════

/// An externally resolved callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub id: Id,
    pub name: Option<String>,
    /// Opaque fields, in on-disk order around the id (three before, two after).
    pub unknown: [u32; 5],
}

impl Import {
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            unknown: [0; 5],
        }
    }
}

/// A jump target inside a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: Id,
    pub name: Option<String>,
    /// Word offset, relative to the code region, of the instruction that
    /// follows the label's marker. Rewritten by the fixup pass.
    pub address: u32,
}

impl Label {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            name: None,
            address: 0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Tables
// ══════════════════════════════════════════════════════════════════════════════

/// Element type of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    Variable,
    Int,
    Float,
    Byte,
}

impl TableType {
    pub fn code(self) -> u32 {
        match self {
            TableType::Variable => 0x0,
            TableType::Int => 0x1,
            TableType::Float => 0x2,
            TableType::Byte => 0x3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(TableType::Variable),
            0x1 => Some(TableType::Int),
            0x2 => Some(TableType::Float),
            0x3 => Some(TableType::Byte),
            _ => None,
        }
    }

    /// Bytes per element in the payload.
    pub fn element_size(self) -> usize {
        match self {
            TableType::Byte => 1,
            _ => 4,
        }
    }
}

/// Materialized table contents, typed by the table's element type.
#[derive(Debug, Clone, PartialEq)]
pub enum TableValues {
    Variable(Vec<VarRef>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Byte(Vec<u8>),
}

impl TableValues {
    pub fn empty(ty: TableType) -> Self {
        match ty {
            TableType::Variable => TableValues::Variable(Vec::new()),
            TableType::Int => TableValues::Int(Vec::new()),
            TableType::Float => TableValues::Float(Vec::new()),
            TableType::Byte => TableValues::Byte(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TableValues::Variable(v) => v.len(),
            TableValues::Int(v) => v.len(),
            TableValues::Float(v) => v.len(),
            TableValues::Byte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_type(&self) -> TableType {
        match self {
            TableValues::Variable(_) => TableType::Variable,
            TableValues::Int(_) => TableType::Int,
            TableValues::Float(_) => TableType::Float,
            TableValues::Byte(_) => TableType::Byte,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: Id,
    pub name: Option<String>,
    pub ty: TableType,
    /// Declared element count. Recomputed from `values` during layout.
    pub length: u32,
    /// Byte offset of the payload's open marker, relative to the code region.
    pub start_offset: u32,
    pub values: TableValues,
}

impl Table {
    pub fn new(id: Id, values: TableValues) -> Self {
        Self {
            id,
            name: None,
            ty: values.table_type(),
            length: values.len() as u32,
            start_offset: 0,
            values,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bytes occupied by the payload in the code region, markers included.
    pub fn payload_size(&self) -> usize {
        let elements = self.length as usize * self.ty.element_size();
        8 + elements.next_multiple_of(4)
    }
}
