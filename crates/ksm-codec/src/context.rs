//! Symbol resolution context.
//!
//! Record ids are not namespaced, so resolution follows a fixed search order:
//! the active function scopes (innermost first), each checked for labels, then
//! variables, then tables; then script tables, imports, functions and
//! variables. The order is observable and must not change.
//!
//! Entering a function clones the context and appends the function to the
//! scope chain, so sibling functions never see each other's locals. The
//! `seen` set is shared between a context and all of its clones: a function
//! inlined inside a pushed scope stays consumed for the outer walk.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use ksm_types::{
    display_name, Callee, Function, Id, LabelRef, Opcode, Operator, Owner, Ref, Script, Symbol,
    TableRef, VarRef,
};

use crate::error::{CodecError, CodecResult};

/// Something the code walk may consume only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visit {
    Function(Id),
    Table(Owner, Id),
}

#[derive(Debug, Clone)]
pub struct Context<'s> {
    script: &'s Script,
    scopes: Vec<&'s Function>,
    opcode: Option<Opcode>,
    constant: bool,
    code_base: usize,
    seen: Rc<RefCell<HashSet<Visit>>>,
}

impl<'s> Context<'s> {
    pub fn new(script: &'s Script) -> Self {
        Self {
            script,
            scopes: Vec::new(),
            opcode: None,
            constant: false,
            code_base: 0,
            seen: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    /// Set the absolute offset of the code region.
    pub fn with_code_base(mut self, code_base: usize) -> Self {
        self.code_base = code_base;
        self
    }

    /// A clone with `function` entered as the innermost scope.
    pub fn push(&self, function: &'s Function) -> Self {
        let mut next = self.clone();
        next.scopes.push(function);
        next
    }

    pub fn script(&self) -> &'s Script {
        self.script
    }

    /// The innermost function scope.
    pub fn scope(&self) -> Option<&'s Function> {
        self.scopes.last().copied()
    }

    pub fn code_base(&self) -> usize {
        self.code_base
    }

    // ── Per-instruction state ────────────────────────────────────────────

    /// Record the opcode being decoded and whether its const flag was set.
    pub fn begin(&mut self, opcode: Opcode, constant: bool) {
        self.opcode = Some(opcode);
        self.constant = constant;
    }

    pub fn opcode(&self) -> Option<Opcode> {
        self.opcode
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// A nested call makes the containing instruction non-constant.
    pub fn clear_constant(&mut self) {
        self.constant = false;
    }

    // ── Seen set ─────────────────────────────────────────────────────────

    pub fn is_seen(&self, visit: Visit) -> bool {
        self.seen.borrow().contains(&visit)
    }

    /// Mark `visit` consumed. Consuming it twice is an error.
    pub fn visit(&self, visit: Visit) -> CodecResult<()> {
        if self.seen.borrow_mut().insert(visit) {
            Ok(())
        } else {
            Err(CodecError::DoubleVisit(describe_visit(visit)))
        }
    }

    // ── Resolution ───────────────────────────────────────────────────────

    /// Resolve `key` to any kind of symbol, in the fixed search order.
    pub fn resolve(&self, key: Ref<'_>) -> CodecResult<Symbol> {
        for function in self.scopes.iter().rev() {
            if let Some(label) = find(&function.labels, key, |l| l.name.as_deref()) {
                return Ok(Symbol::Label(LabelRef {
                    function: function.id,
                    id: label.id,
                }));
            }
            if let Some(var) = find(&function.variables, key, |v| v.name.as_deref()) {
                return Ok(Symbol::Variable(VarRef::local(function.id, var.id)));
            }
            if let Some(table) = find(&function.tables, key, |t| t.name.as_deref()) {
                return Ok(Symbol::Table(TableRef {
                    owner: Owner::Function(function.id),
                    id: table.id,
                }));
            }
        }
        if let Some(table) = find(&self.script.tables, key, |t| t.name.as_deref()) {
            return Ok(Symbol::Table(TableRef {
                owner: Owner::Script,
                id: table.id,
            }));
        }
        if let Some(import) = find(&self.script.imports, key, |i| i.name.as_deref()) {
            return Ok(Symbol::Import(import.id));
        }
        if let Some(function) = find(&self.script.functions, key, |f| f.name.as_deref()) {
            return Ok(Symbol::Function(function.id));
        }
        if let Some(var) = find(&self.script.variables, key, |v| v.name.as_deref()) {
            return Ok(Symbol::Variable(VarRef::global(var.id)));
        }
        Err(unknown("symbol", key))
    }

    pub fn variable(&self, key: Ref<'_>) -> CodecResult<VarRef> {
        for function in self.scopes.iter().rev() {
            if let Some(var) = find(&function.variables, key, |v| v.name.as_deref()) {
                return Ok(VarRef::local(function.id, var.id));
            }
        }
        find(&self.script.variables, key, |v| v.name.as_deref())
            .map(|var| VarRef::global(var.id))
            .ok_or_else(|| unknown("variable", key))
    }

    pub fn label(&self, key: Ref<'_>) -> CodecResult<LabelRef> {
        self.scopes
            .iter()
            .rev()
            .find_map(|function| {
                find(&function.labels, key, |l| l.name.as_deref()).map(|label| LabelRef {
                    function: function.id,
                    id: label.id,
                })
            })
            .ok_or_else(|| unknown("label", key))
    }

    pub fn table(&self, key: Ref<'_>) -> CodecResult<TableRef> {
        for function in self.scopes.iter().rev() {
            if let Some(table) = find(&function.tables, key, |t| t.name.as_deref()) {
                return Ok(TableRef {
                    owner: Owner::Function(function.id),
                    id: table.id,
                });
            }
        }
        find(&self.script.tables, key, |t| t.name.as_deref())
            .map(|table| TableRef {
                owner: Owner::Script,
                id: table.id,
            })
            .ok_or_else(|| unknown("table", key))
    }

    /// Imports take precedence over functions.
    pub fn callee(&self, key: Ref<'_>) -> CodecResult<Callee> {
        if let Some(import) = find(&self.script.imports, key, |i| i.name.as_deref()) {
            return Ok(Callee::Import(import.id));
        }
        find(&self.script.functions, key, |f| f.name.as_deref())
            .map(|function| Callee::Function(function.id))
            .ok_or_else(|| unknown("callee", key))
    }

    pub fn import(&self, key: Ref<'_>) -> CodecResult<Id> {
        find(&self.script.imports, key, |i| i.name.as_deref())
            .map(|import| import.id)
            .ok_or_else(|| unknown("import", key))
    }

    pub fn function(&self, key: Ref<'_>) -> CodecResult<Id> {
        find(&self.script.functions, key, |f| f.name.as_deref())
            .map(|function| function.id)
            .ok_or_else(|| unknown("function", key))
    }

    /// Probe whether `code` is an expression operator.
    pub fn intrinsic(&self, code: u32) -> Option<Operator> {
        Operator::from_code(code)
    }

    // ── Encoding ─────────────────────────────────────────────────────────

    /// The on-disk id of a resolved symbol, after checking that it still
    /// refers to a record of this script.
    pub fn check(&self, symbol: Symbol) -> CodecResult<Id> {
        let script = self.script;
        let present = match symbol {
            Symbol::Label(label) => script.label(label).is_some(),
            Symbol::Variable(var) => script.variable(var).is_some(),
            Symbol::Table(table) => script.table(table).is_some(),
            Symbol::Import(id) => script.imports.contains_key(&id),
            Symbol::Function(id) => script.functions.contains_key(&id),
        };
        if present {
            Ok(symbol.id())
        } else {
            Err(CodecError::UnknownSymbol(format!(
                "{} {}",
                symbol.kind(),
                display_name(symbol.id(), None)
            )))
        }
    }

    pub fn check_var(&self, var: VarRef) -> CodecResult<Id> {
        self.check(Symbol::Variable(var))
    }
}

fn find<'m, T>(
    map: &'m IndexMap<Id, T>,
    key: Ref<'_>,
    name_of: impl Fn(&T) -> Option<&str>,
) -> Option<&'m T> {
    match key {
        Ref::Id(id) => map.get(&id),
        Ref::Name(_) => map
            .iter()
            .find(|(id, record)| key.matches(**id, name_of(*record)))
            .map(|(_, record)| record),
    }
}

fn unknown(kind: &str, key: Ref<'_>) -> CodecError {
    CodecError::UnknownSymbol(format!("{kind} {key}"))
}

fn describe_visit(visit: Visit) -> String {
    match visit {
        Visit::Function(id) => format!("function {}", display_name(id, None)),
        Visit::Table(Owner::Script, id) => format!("table {}", display_name(id, None)),
        Visit::Table(Owner::Function(f), id) => {
            format!("table {} of function {f}", display_name(id, None))
        }
    }
}
