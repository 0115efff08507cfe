//! Script → document.

use ksm_codec::Context;
use ksm_types::{
    display_name, Call, CallArg, Callee, Expression, Function, Id, Instruction, LabelRef,
    Operand, Ref, Script, Symbol, Table, TableRef, TableValues, Token, VarRef, Variable,
    VariableScope, VariableValue,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{
    ArgDocument, CallDocument, FunctionDocument, ImportDocument, InstructionDocument,
    LabelDocument, OperandDocument, ScriptDocument, TableDocument, TableValuesDocument,
    TokenDocument, ValueDocument, VariableDocument,
};
use crate::error::InterchangeResult;
use crate::scope::{context_for, scope_chains};

/// Options for [`to_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Indent the JSON output.
    pub pretty: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { pretty: true }
    }
}

pub fn to_json(script: &Script, options: &ExportOptions) -> InterchangeResult<String> {
    let document = export(script);
    let text = if options.pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    Ok(text)
}

pub fn export(script: &Script) -> ScriptDocument {
    let root = Context::new(script);
    let chains = scope_chains(script, |f| {
        f.instructions
            .iter()
            .filter_map(Instruction::inlined_function)
            .collect()
    });

    let functions = script
        .functions
        .values()
        .map(|function| {
            let code_ctx = match chains.get(&function.id) {
                Some(chain) => context_for(script, chain),
                None => root.push(function),
            };
            export_function(&root.push(function), &code_ctx, function)
        })
        .collect();

    let document = ScriptDocument {
        imports: script
            .imports
            .values()
            .map(|import| ImportDocument {
                id: import.id,
                name: import.name.clone(),
                unknown: import.unknown,
            })
            .collect(),
        variables: script
            .variables
            .values()
            .filter(|v| v.scope != VariableScope::Tmp)
            .map(export_variable)
            .collect(),
        tables: script
            .tables
            .values()
            .map(|t| export_table(&root, t))
            .collect(),
        functions,
        padding: script.padding.clone(),
    };
    debug!(
        functions = document.functions.len(),
        variables = document.variables.len(),
        "exported script"
    );
    document
}

// ══════════════════════════════════════════════════════════════════════════════
// Reference spelling
// ══════════════════════════════════════════════════════════════════════════════

fn record_name(script: &Script, symbol: Symbol) -> Option<&str> {
    match symbol {
        Symbol::Variable(var) => script.variable(var)?.name.as_deref(),
        Symbol::Table(table) => script.table(table)?.name.as_deref(),
        Symbol::Label(label) => script.label(label)?.name.as_deref(),
        Symbol::Import(id) => script.imports.get(&id)?.name.as_deref(),
        Symbol::Function(id) => script.functions.get(&id)?.name.as_deref(),
    }
}

/// The record's name if looking it up through `lookup` finds the same
/// record, `ref:<id>` otherwise.
fn spell(
    ctx: &Context<'_>,
    symbol: Symbol,
    lookup: fn(&Context<'_>, Ref<'_>) -> Option<Symbol>,
) -> String {
    match record_name(ctx.script(), symbol) {
        Some(name) if lookup(ctx, Ref::parse(name)) == Some(symbol) => name.to_string(),
        _ => display_name(symbol.id(), None),
    }
}

fn any(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.resolve(key).ok()
}

fn variable(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.variable(key).ok().map(Symbol::Variable)
}

fn table(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.table(key).ok().map(Symbol::Table)
}

fn label(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.label(key).ok().map(Symbol::Label)
}

fn callee(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.callee(key).ok().map(Symbol::from)
}

fn import(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.import(key).ok().map(Symbol::Import)
}

fn function(ctx: &Context<'_>, key: Ref<'_>) -> Option<Symbol> {
    ctx.function(key).ok().map(Symbol::Function)
}

fn var_ref(ctx: &Context<'_>, var: VarRef) -> String {
    spell(ctx, Symbol::Variable(var), variable)
}

fn table_ref(ctx: &Context<'_>, t: TableRef) -> String {
    spell(ctx, Symbol::Table(t), table)
}

fn label_ref(ctx: &Context<'_>, l: LabelRef) -> String {
    spell(ctx, Symbol::Label(l), label)
}

fn callee_ref(ctx: &Context<'_>, c: Callee) -> String {
    spell(ctx, c.into(), callee)
}

fn import_ref(ctx: &Context<'_>, id: Id) -> String {
    spell(ctx, Symbol::Import(id), import)
}

fn function_ref(ctx: &Context<'_>, id: Id) -> String {
    spell(ctx, Symbol::Function(id), function)
}

// ══════════════════════════════════════════════════════════════════════════════
// Records
// ══════════════════════════════════════════════════════════════════════════════

fn export_variable(var: &Variable) -> VariableDocument {
    let value = match &var.value {
        VariableValue::Int(v) => ValueDocument::Int(*v),
        VariableValue::Float(v) if v.is_finite() => ValueDocument::Float(*v),
        VariableValue::Float(v) => ValueDocument::FloatBits(v.to_bits()),
        VariableValue::String(v) => ValueDocument::String(v.clone()),
        VariableValue::Raw(v) => ValueDocument::Raw {
            code: var.ty.code(),
            value: *v,
        },
    };
    VariableDocument {
        id: var.id,
        name: var.name.clone(),
        scope: var.scope,
        flags: var.flags,
        value,
    }
}

/// `ctx` is the owner's own scope.
fn export_table(ctx: &Context<'_>, t: &Table) -> TableDocument {
    let values = match &t.values {
        TableValues::Variable(vars) => {
            TableValuesDocument::Variable(vars.iter().map(|v| var_ref(ctx, *v)).collect())
        }
        TableValues::Int(values) => TableValuesDocument::Int(values.clone()),
        TableValues::Float(values) => TableValuesDocument::Float(values.clone()),
        TableValues::Byte(values) => TableValuesDocument::Byte(values.clone()),
    };
    TableDocument {
        id: t.id,
        name: t.name.clone(),
        start_offset: t.start_offset,
        values,
    }
}

fn export_function(
    own: &Context<'_>,
    code: &Context<'_>,
    function: &Function,
) -> FunctionDocument {
    FunctionDocument {
        id: function.id,
        name: function.name.clone(),
        public: function.public,
        inline: function.inline,
        declared: function.declared,
        unknown: function.unknown,
        code_start: function.code_start,
        code_end: function.code_end,
        variables: function.variables.values().map(export_variable).collect(),
        tables: function
            .tables
            .values()
            .map(|t| export_table(own, t))
            .collect(),
        labels: function
            .labels
            .values()
            .map(|l| LabelDocument {
                id: l.id,
                name: l.name.clone(),
                address: l.address,
            })
            .collect(),
        code: function
            .instructions
            .iter()
            .map(|i| export_instruction(code, i))
            .collect(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Code
// ══════════════════════════════════════════════════════════════════════════════

fn export_expression(ctx: &Context<'_>, expr: &Expression) -> Vec<TokenDocument> {
    expr.tokens
        .iter()
        .map(|token| match token {
            Token::Symbol(symbol) => TokenDocument::Symbol(spell(ctx, *symbol, any)),
            Token::Operator(op) => TokenDocument::Op(op.symbol().to_string()),
            Token::Call(call) => TokenDocument::Call(export_call(ctx, call)),
        })
        .collect()
}

fn export_call(ctx: &Context<'_>, call: &Call) -> CallDocument {
    CallDocument {
        callee: callee_ref(ctx, call.callee),
        args: call
            .args
            .iter()
            .map(|arg| match arg {
                CallArg::Symbol(symbol) => ArgDocument::Symbol(spell(ctx, *symbol, any)),
                CallArg::Expr(expr) => ArgDocument::Expr(export_expression(ctx, expr)),
            })
            .collect(),
    }
}

fn export_operand(ctx: &Context<'_>, operand: &Operand) -> OperandDocument {
    match operand {
        Operand::Variable(var) => OperandDocument::Variable(var_ref(ctx, *var)),
        Operand::Expr(expr) => OperandDocument::Expr(export_expression(ctx, expr)),
    }
}

fn export_instruction(ctx: &Context<'_>, instruction: &Instruction) -> InstructionDocument {
    use InstructionDocument as D;

    let vars = |vars: &[VarRef]| -> Vec<String> { vars.iter().map(|v| var_ref(ctx, *v)).collect() };
    match instruction {
        Instruction::Nop => D::Nop,
        Instruction::ReturnVal(op) => D::ReturnVal {
            value: export_operand(ctx, op),
        },
        Instruction::Label => D::Label,
        Instruction::GetArgs(g) => D::GetArgs {
            function: function_ref(ctx, g.function),
            args: vars(&g.args),
        },
        Instruction::Thread(t) => D::Thread {
            callee: callee_ref(ctx, t.callee),
            take: t.take.clone(),
            give: vars(&t.give),
        },
        Instruction::Thread2(t) => D::Thread2 {
            callee: callee_ref(ctx, t.callee),
            take: t.take.clone(),
            give: vars(&t.give),
        },
        Instruction::Return => D::Return,
        Instruction::Goto(l) => D::Goto {
            label: label_ref(ctx, *l),
        },
        Instruction::Call(c) => D::Call(export_call(ctx, c)),
        Instruction::CallAsThread(c) => D::CallAsThread(export_call(ctx, c)),
        Instruction::CallAsChildThread(c) => D::CallAsChildThread(export_call(ctx, c)),
        Instruction::DeleteRuntime(op) => D::DeleteRuntime {
            value: export_operand(ctx, op),
        },
        Instruction::Wait(op) => D::Wait {
            value: export_operand(ctx, op),
        },
        Instruction::WaitMs(op) => D::WaitMs {
            value: export_operand(ctx, op),
        },
        Instruction::If(i) => D::If {
            condition: export_expression(ctx, &i.condition),
            target: i.target,
            unknown: [i.unknown1, i.unknown2],
        },
        Instruction::Else(e) => D::Else { target: e.target },
        Instruction::ElseIf(e) => D::ElseIf {
            condition: export_expression(ctx, &e.condition),
            target: e.target,
            skip_target: e.skip_target,
            unknown: [e.unknown1, e.unknown3, e.unknown4],
        },
        Instruction::EndIf => D::EndIf,
        Instruction::Switch(s) => D::Switch {
            value: var_ref(ctx, s.value),
            entry: s.entry,
            exit: s.exit,
        },
        Instruction::Case(c) => D::Case {
            value: var_ref(ctx, c.value),
            target: c.target,
        },
        Instruction::Case2(c) => D::Case2 {
            value: var_ref(ctx, c.value),
            target: c.target,
        },
        Instruction::BreakSwitch => D::BreakSwitch,
        Instruction::EndSwitch => D::EndSwitch,
        Instruction::DoWhile(d) => D::DoWhile {
            condition: export_operand(ctx, &d.condition),
            target: d.target,
        },
        Instruction::Break => D::Break,
        Instruction::EndDoWhile => D::EndDoWhile,
        Instruction::Set(s) => D::Set {
            assignee: var_ref(ctx, s.assignee),
            value: export_operand(ctx, &s.value),
        },
        Instruction::ReadTableLength(t) => D::ReadTableLength {
            table: table_ref(ctx, *t),
        },
        Instruction::GetIndex(g) => D::GetIndex {
            table: table_ref(ctx, g.table),
            occurrence: var_ref(ctx, g.occurrence),
            variable: var_ref(ctx, g.variable),
        },
        Instruction::WaitCompleted(op) => D::WaitCompleted {
            value: export_operand(ctx, op),
        },
        Instruction::Unsure1 => D::Unsure1,
        Instruction::Unsure2(e) => D::Unsure2 {
            expr: export_expression(ctx, e),
        },
        Instruction::Unsure3(first, import, second) => D::Unsure3 {
            first: var_ref(ctx, *first),
            import: import_ref(ctx, *import),
            second: var_ref(ctx, *second),
        },
        Instruction::Unsure4(v) => D::Unsure4 {
            var: var_ref(ctx, *v),
        },
        Instruction::Unsure7(v) => D::Unsure7 {
            vars: v.map(|v| var_ref(ctx, v)),
        },
        Instruction::Unsure8(v) => D::Unsure8 {
            vars: v.map(|v| var_ref(ctx, v)),
        },
        Instruction::Unsure9(e) => D::Unsure9 {
            expr: export_expression(ctx, e),
        },
        Instruction::Unsure11(v, t) => D::Unsure11 {
            var: var_ref(ctx, *v),
            table: table_ref(ctx, *t),
        },
    }
}
