//! The root aggregate.

use indexmap::IndexMap;

use crate::function::Function;
use crate::records::{
    Import, Label, Table, Variable, VariableScope, TMP_VARIABLE_COUNT,
};
use crate::symbol::{Id, LabelRef, Owner, TableRef, VarRef};

/// File magic: `KSMR` followed by the format version.
pub const MAGIC: [u8; 8] = [0x4B, 0x53, 0x4D, 0x52, 0x00, 0x03, 0x01, 0x00];

/// Number of sections in a container.
pub const SECTION_COUNT: usize = 8;

/// A whole script: every record keyed by id, in declaration order.
///
/// Functions and tables live in flat maps; an inlined function is still a
/// top-level entry here even though its code is embedded in another
/// function's byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub imports: IndexMap<Id, Import>,
    pub functions: IndexMap<Id, Function>,
    /// Script-level variables of every non-local scope, tmp included.
    pub variables: IndexMap<Id, Variable>,
    pub tables: IndexMap<Id, Table>,
    /// Raw filler words: section 0, the tail of section 3, and the tail of the
    /// code region.
    pub padding: [Vec<u32>; 3],
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// An empty script holding only the synthetic `tmp` variables.
    pub fn new() -> Self {
        let variables = (0..TMP_VARIABLE_COUNT)
            .map(Variable::tmp)
            .map(|v| (v.id, v))
            .collect();
        Self {
            imports: IndexMap::new(),
            functions: IndexMap::new(),
            variables,
            tables: IndexMap::new(),
            padding: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    // ── Construction ─────────────────────────────────────────────────────

    pub fn add_import(&mut self, import: Import) {
        self.imports.insert(import.id, import);
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.id, function);
    }

    pub fn add_variable(&mut self, variable: Variable) {
        self.variables.insert(variable.id, variable);
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.id, table);
    }

    /// Script-level variables of one scope, in declaration order.
    pub fn variables_in(&self, scope: VariableScope) -> impl Iterator<Item = &Variable> {
        self.variables.values().filter(move |v| v.scope == scope)
    }

    /// One past the largest function id in use.
    pub fn next_function_id(&self) -> Id {
        self.functions
            .keys()
            .copied()
            .max()
            .map_or(0, |id| id.wrapping_add(1))
    }

    // ── Handle lookups ───────────────────────────────────────────────────

    pub fn variable(&self, var: VarRef) -> Option<&Variable> {
        match var.owner {
            Owner::Script => self.variables.get(&var.id),
            Owner::Function(f) => self.functions.get(&f)?.variables.get(&var.id),
        }
    }

    pub fn table(&self, table: TableRef) -> Option<&Table> {
        match table.owner {
            Owner::Script => self.tables.get(&table.id),
            Owner::Function(f) => self.functions.get(&f)?.tables.get(&table.id),
        }
    }

    pub fn label(&self, label: LabelRef) -> Option<&Label> {
        self.functions.get(&label.function)?.labels.get(&label.id)
    }

    /// Every table with its owner: script tables first, then each function's
    /// in declaration order.
    pub fn all_tables(&self) -> impl Iterator<Item = (Owner, &Table)> {
        let script = self.tables.values().map(|t| (Owner::Script, t));
        let local = self
            .functions
            .values()
            .flat_map(|f| f.tables.values().map(move |t| (Owner::Function(f.id), t)));
        script.chain(local)
    }

    /// Mutable counterpart of [`Script::all_tables`], same order.
    pub fn all_tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables
            .values_mut()
            .chain(self.functions.values_mut().flat_map(|f| f.tables.values_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TMP_VARIABLE_BASE;

    #[test]
    fn new_script_holds_tmp_variables() {
        let script = Script::new();
        assert_eq!(script.variables.len(), TMP_VARIABLE_COUNT as usize);
        let first = script.variables.get(&TMP_VARIABLE_BASE).unwrap();
        assert_eq!(first.scope, VariableScope::Tmp);
        assert!(script
            .variables
            .contains_key(&(TMP_VARIABLE_BASE | (TMP_VARIABLE_COUNT - 1))));
    }

    #[test]
    fn handles_resolve_through_owner() {
        let mut script = Script::new();
        script.add_variable(Variable::int(5, VariableScope::Global, 1));
        let mut f = Function::new(9);
        f.add_variable(Variable::int(5, VariableScope::Static, 2));
        script.add_function(f);

        assert_eq!(
            script.variable(VarRef::global(5)).map(|v| v.scope),
            Some(VariableScope::Global)
        );
        assert_eq!(
            script.variable(VarRef::local(9, 5)).map(|v| v.scope),
            Some(VariableScope::Local)
        );
        assert!(script.variable(VarRef::local(8, 5)).is_none());
        assert_eq!(script.next_function_id(), 10);
    }
}
