//! Function records.

use indexmap::IndexMap;

use crate::instruction::Instruction;
use crate::records::{Label, Table, Variable, VariableScope};
use crate::symbol::Id;

/// A function: its declaration fields, its owned locals, and its code.
///
/// `code_start`/`code_end` are byte offsets relative to the code region; on
/// disk they are stored as words.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: Id,
    pub name: Option<String>,
    pub public: bool,
    /// Only ever reached through a `Thread`/`Thread2` spawn; the body lives
    /// inside the spawner's code.
    pub inline: bool,
    /// Present in the declaration section. Code found between declared ranges
    /// is kept in undeclared functions.
    pub declared: bool,
    /// Opaque declaration words, in on-disk order.
    pub unknown: [u32; 3],
    pub code_start: u32,
    pub code_end: u32,
    pub variables: IndexMap<Id, Variable>,
    pub tables: IndexMap<Id, Table>,
    pub labels: IndexMap<Id, Label>,
    pub instructions: Vec<Instruction>,
}

impl Function {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            name: None,
            public: false,
            inline: false,
            declared: true,
            unknown: [0; 3],
            code_start: 0,
            code_end: 0,
            variables: IndexMap::new(),
            tables: IndexMap::new(),
            labels: IndexMap::new(),
            instructions: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a local variable, forcing its scope to `local`.
    pub fn add_variable(&mut self, mut variable: Variable) {
        variable.scope = VariableScope::Local;
        self.variables.insert(variable.id, variable);
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.id, table);
    }

    pub fn add_label(&mut self, label: Label) {
        self.labels.insert(label.id, label);
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Display name for diagnostics.
    pub fn describe(&self) -> String {
        crate::symbol::display_name(self.id, self.name.as_deref())
    }
}
