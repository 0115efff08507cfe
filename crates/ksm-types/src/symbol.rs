//! Resolved symbol handles and the name-or-id lookup key.
//!
//! Record ids are not namespaced: a local variable, a global function and an
//! import may all share the same numeric id. Once a reference is resolved the
//! handle remembers *which* record it bound to, so re-encoding writes the same
//! id and the interchange layer can print the right name.

use std::fmt;

/// Record id as written on disk.
pub type Id = u32;

/// Where a scoped record (variable or table) is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {
    /// Script-level maps (tmp/static/const/global variables, section-3 tables).
    Script,
    /// Locals of the function with this id.
    Function(Id),
}

/// A resolved variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub owner: Owner,
    pub id: Id,
}

impl VarRef {
    pub fn global(id: Id) -> Self {
        Self {
            owner: Owner::Script,
            id,
        }
    }

    pub fn local(function: Id, id: Id) -> Self {
        Self {
            owner: Owner::Function(function),
            id,
        }
    }
}

/// A resolved table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub owner: Owner,
    pub id: Id,
}

/// A resolved label. Labels only ever live inside functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelRef {
    pub function: Id,
    pub id: Id,
}

/// Target of a call or thread spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    Function(Id),
    Import(Id),
}

impl Callee {
    pub fn id(self) -> Id {
        match self {
            Callee::Function(id) | Callee::Import(id) => id,
        }
    }
}

/// Any resolved symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Label(LabelRef),
    Variable(VarRef),
    Table(TableRef),
    Import(Id),
    Function(Id),
}

impl Symbol {
    /// The id written to disk for this symbol.
    pub fn id(self) -> Id {
        match self {
            Symbol::Label(l) => l.id,
            Symbol::Variable(v) => v.id,
            Symbol::Table(t) => t.id,
            Symbol::Import(id) | Symbol::Function(id) => id,
        }
    }

    /// Human-readable kind, used in diagnostics.
    pub fn kind(self) -> &'static str {
        match self {
            Symbol::Label(_) => "label",
            Symbol::Variable(_) => "variable",
            Symbol::Table(_) => "table",
            Symbol::Import(_) => "import",
            Symbol::Function(_) => "function",
        }
    }
}

impl From<Callee> for Symbol {
    fn from(callee: Callee) -> Self {
        match callee {
            Callee::Function(id) => Symbol::Function(id),
            Callee::Import(id) => Symbol::Import(id),
        }
    }
}

/// Prefix of the textual form of an unnamed reference.
pub const REF_PREFIX: &str = "ref:";

/// A lookup key: either a record name or a numeric id.
///
/// On disk references are always numeric. The interchange layer may also pass
/// names, and spells unnamed records as `ref:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ref<'a> {
    Id(Id),
    Name(&'a str),
}

impl<'a> Ref<'a> {
    /// Parse the textual form: `ref:<decimal or 0x-hex id>` becomes an id,
    /// anything else is a name.
    pub fn parse(text: &'a str) -> Self {
        if let Some(rest) = text.strip_prefix(REF_PREFIX) {
            let parsed = match rest.strip_prefix("0x") {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => rest.parse::<u32>().ok(),
            };
            if let Some(id) = parsed {
                return Ref::Id(id);
            }
        }
        Ref::Name(text)
    }

    /// Whether a record with this id and name matches the key.
    pub fn matches(&self, id: Id, name: Option<&str>) -> bool {
        match *self {
            Ref::Id(wanted) => wanted == id,
            Ref::Name(wanted) => name == Some(wanted),
        }
    }
}

impl fmt::Display for Ref<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Id(id) => write!(f, "{REF_PREFIX}{id}"),
            Ref::Name(name) => f.write_str(name),
        }
    }
}

/// Textual form of a reference: the name when present, `ref:<id>` otherwise.
pub fn display_name(id: Id, name: Option<&str>) -> String {
    match name {
        Some(name) => name.to_string(),
        None => format!("{REF_PREFIX}{id}"),
    }
}
