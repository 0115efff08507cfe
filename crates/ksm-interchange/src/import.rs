//! Document → script.
//!
//! Runs in two phases. Records come first, so that every reference in the
//! second phase (table contents and code) can resolve through a [`Context`]
//! over the finished record set. Names and `ref:<id>` spellings are both
//! accepted everywhere.

use std::collections::{HashMap, HashSet};

use ksm_codec::Context;
use ksm_types::instruction::{
    Case, DoWhile, Else, ElseIf, GetArgs, GetIndex, If, Set, Switch, Thread,
};
use ksm_types::{
    Call, CallArg, Callee, Expression, Function, Id, Import, Instruction, Label, Operand,
    Operator, Owner, Ref, Script, Table, TableRef, TableValues, Token, VarRef, Variable,
    VariableType, VariableValue,
};
use tracing::debug;

use crate::document::{
    ArgDocument, CallDocument, FunctionDocument, InstructionDocument, OperandDocument,
    ScriptDocument, TableDocument, TableValuesDocument, TokenDocument, ValueDocument,
    VariableDocument,
};
use crate::error::{InterchangeError, InterchangeResult};
use crate::scope::{context_for, scope_chains};

pub fn from_json(text: &str) -> InterchangeResult<Script> {
    let document: ScriptDocument = serde_json::from_str(text)?;
    import(&document)
}

pub fn import(document: &ScriptDocument) -> InterchangeResult<Script> {
    let mut script = Script::new();
    read_records(&mut script, document)?;
    let resolved = resolve(&script, document)?;

    for (id, body) in resolved.bodies {
        if let Some(function) = script.functions.get_mut(&id) {
            function.instructions = body;
        }
    }
    for (table, values) in resolved.tables {
        let slot = match table.owner {
            Owner::Script => script.tables.get_mut(&table.id),
            Owner::Function(f) => script
                .functions
                .get_mut(&f)
                .and_then(|function| function.tables.get_mut(&table.id)),
        };
        if let Some(slot) = slot {
            slot.length = values.len() as u32;
            slot.values = values;
        }
    }
    debug!(
        functions = script.functions.len(),
        variables = script.variables.len(),
        "imported script"
    );
    Ok(script)
}

fn invalid(reason: impl Into<String>) -> InterchangeError {
    InterchangeError::InvalidValue(reason.into())
}

fn ensure_unique<T>(items: &[T], id: impl Fn(&T) -> Id, kind: &str) -> InterchangeResult<()> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(id(item)) {
            return Err(invalid(format!("duplicate {kind} id {}", id(item))));
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Phase 1: records
// ══════════════════════════════════════════════════════════════════════════════

fn read_records(script: &mut Script, document: &ScriptDocument) -> InterchangeResult<()> {
    ensure_unique(&document.imports, |i| i.id, "import")?;
    ensure_unique(&document.variables, |v| v.id, "variable")?;
    ensure_unique(&document.tables, |t| t.id, "table")?;
    ensure_unique(&document.functions, |f| f.id, "function")?;

    for doc in &document.imports {
        script.add_import(Import {
            id: doc.id,
            name: doc.name.clone(),
            unknown: doc.unknown,
        });
    }
    for doc in &document.variables {
        script.add_variable(read_variable(doc)?);
    }
    for doc in &document.tables {
        script.add_table(read_table(doc));
    }
    for doc in &document.functions {
        script.add_function(read_function(doc)?);
    }
    script.padding = document.padding.clone();
    Ok(())
}

fn read_variable(doc: &VariableDocument) -> InterchangeResult<Variable> {
    let (ty, value) = match &doc.value {
        ValueDocument::Int(v) => (VariableType::Int, VariableValue::Int(*v)),
        ValueDocument::Float(v) => (VariableType::Float, VariableValue::Float(*v)),
        ValueDocument::FloatBits(bits) => {
            (VariableType::Float, VariableValue::Float(f32::from_bits(*bits)))
        }
        ValueDocument::String(v) => (VariableType::String, VariableValue::String(v.clone())),
        ValueDocument::Raw { code, value } => match VariableType::from_code(*code) {
            ty @ VariableType::Raw(_) => (ty, VariableValue::Raw(*value)),
            ty => {
                return Err(invalid(format!(
                    "variable {}: raw type code {code:#x} is {ty:?}",
                    doc.id
                )))
            }
        },
    };
    let mut var = Variable::new(doc.id, doc.scope, ty, value);
    var.name = doc.name.clone();
    var.flags = doc.flags;
    Ok(var)
}

/// Variable tables start empty; their contents resolve in phase 2.
fn read_table(doc: &TableDocument) -> Table {
    let values = match &doc.values {
        TableValuesDocument::Variable(_) => TableValues::Variable(Vec::new()),
        TableValuesDocument::Int(v) => TableValues::Int(v.clone()),
        TableValuesDocument::Float(v) => TableValues::Float(v.clone()),
        TableValuesDocument::Byte(v) => TableValues::Byte(v.clone()),
    };
    let mut table = Table::new(doc.id, values);
    table.name = doc.name.clone();
    table.start_offset = doc.start_offset;
    table
}

fn read_function(doc: &FunctionDocument) -> InterchangeResult<Function> {
    ensure_unique(&doc.variables, |v| v.id, "local variable")?;
    ensure_unique(&doc.tables, |t| t.id, "local table")?;
    ensure_unique(&doc.labels, |l| l.id, "label")?;

    let mut function = Function::new(doc.id);
    function.name = doc.name.clone();
    function.public = doc.public;
    function.inline = doc.inline;
    function.declared = doc.declared;
    function.unknown = doc.unknown;
    function.code_start = doc.code_start;
    function.code_end = doc.code_end;
    for var in &doc.variables {
        function.add_variable(read_variable(var)?);
    }
    for table in &doc.tables {
        function.add_table(read_table(table));
    }
    for label in &doc.labels {
        let mut record = Label::new(label.id);
        record.name = label.name.clone();
        record.address = label.address;
        function.add_label(record);
    }
    Ok(function)
}

// ══════════════════════════════════════════════════════════════════════════════
// Phase 2: references
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Resolved {
    bodies: Vec<(Id, Vec<Instruction>)>,
    tables: Vec<(TableRef, TableValues)>,
}

fn resolve(script: &Script, document: &ScriptDocument) -> InterchangeResult<Resolved> {
    let root = Context::new(script);
    let docs: HashMap<Id, &FunctionDocument> =
        document.functions.iter().map(|f| (f.id, f)).collect();
    let chains = scope_chains(script, |function| {
        docs.get(&function.id)
            .map(|doc| {
                doc.code
                    .iter()
                    .filter_map(InstructionDocument::spawned)
                    .filter_map(|callee| match root.callee(Ref::parse(callee)) {
                        Ok(Callee::Function(id)) => Some(id),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    });

    let mut out = Resolved::default();
    for doc in &document.tables {
        if let Some(values) = variable_table(&root, doc)? {
            let table = TableRef {
                owner: Owner::Script,
                id: doc.id,
            };
            out.tables.push((table, values));
        }
    }

    for doc in &document.functions {
        let Some(function) = script.functions.get(&doc.id) else {
            continue;
        };
        let own = root.push(function);
        for table_doc in &doc.tables {
            if let Some(values) = variable_table(&own, table_doc)? {
                let table = TableRef {
                    owner: Owner::Function(doc.id),
                    id: table_doc.id,
                };
                out.tables.push((table, values));
            }
        }

        let ctx = match chains.get(&doc.id) {
            Some(chain) => context_for(script, chain),
            None => own,
        };
        let body = doc
            .code
            .iter()
            .map(|i| instruction(&ctx, i))
            .collect::<InterchangeResult<Vec<_>>>()?;
        out.bodies.push((doc.id, body));
    }
    Ok(out)
}

fn variable_table(
    ctx: &Context<'_>,
    doc: &TableDocument,
) -> InterchangeResult<Option<TableValues>> {
    let TableValuesDocument::Variable(names) = &doc.values else {
        return Ok(None);
    };
    let vars = names
        .iter()
        .map(|name| var(ctx, name))
        .collect::<InterchangeResult<Vec<_>>>()?;
    Ok(Some(TableValues::Variable(vars)))
}

fn var(ctx: &Context<'_>, text: &str) -> InterchangeResult<VarRef> {
    Ok(ctx.variable(Ref::parse(text))?)
}

fn vars(ctx: &Context<'_>, texts: &[String]) -> InterchangeResult<Vec<VarRef>> {
    texts.iter().map(|t| var(ctx, t)).collect()
}

fn expression(ctx: &Context<'_>, tokens: &[TokenDocument]) -> InterchangeResult<Expression> {
    tokens
        .iter()
        .map(|token| -> InterchangeResult<Token> {
            Ok(match token {
                TokenDocument::Symbol(text) => Token::Symbol(ctx.resolve(Ref::parse(text))?),
                TokenDocument::Op(text) => Token::Operator(
                    Operator::from_symbol(text)
                        .ok_or_else(|| invalid(format!("unknown operator {text:?}")))?,
                ),
                TokenDocument::Call(call_doc) => Token::Call(Box::new(call(ctx, call_doc)?)),
            })
        })
        .collect()
}

fn call(ctx: &Context<'_>, doc: &CallDocument) -> InterchangeResult<Call> {
    let callee = ctx.callee(Ref::parse(&doc.callee))?;
    let args = doc
        .args
        .iter()
        .map(|arg| -> InterchangeResult<CallArg> {
            Ok(match arg {
                ArgDocument::Symbol(text) => CallArg::Symbol(ctx.resolve(Ref::parse(text))?),
                ArgDocument::Expr(tokens) => CallArg::Expr(expression(ctx, tokens)?),
            })
        })
        .collect::<InterchangeResult<Vec<_>>>()?;
    Ok(Call::new(callee, args))
}

fn operand(ctx: &Context<'_>, doc: &OperandDocument) -> InterchangeResult<Operand> {
    Ok(match doc {
        OperandDocument::Variable(text) => Operand::Variable(var(ctx, text)?),
        OperandDocument::Expr(tokens) => Operand::Expr(expression(ctx, tokens)?),
    })
}

fn thread(
    ctx: &Context<'_>,
    callee: &str,
    take: &[u32],
    give: &[String],
) -> InterchangeResult<Thread> {
    Ok(Thread {
        callee: ctx.callee(Ref::parse(callee))?,
        take: take.to_vec(),
        give: vars(ctx, give)?,
    })
}

fn table(ctx: &Context<'_>, text: &str) -> InterchangeResult<TableRef> {
    Ok(ctx.table(Ref::parse(text))?)
}

fn instruction(ctx: &Context<'_>, doc: &InstructionDocument) -> InterchangeResult<Instruction> {
    use InstructionDocument as D;

    let instruction = match doc {
        D::Nop => Instruction::Nop,
        D::ReturnVal { value } => Instruction::ReturnVal(operand(ctx, value)?),
        D::Label => Instruction::Label,
        D::GetArgs { function, args } => Instruction::GetArgs(GetArgs {
            function: ctx.function(Ref::parse(function))?,
            args: vars(ctx, args)?,
        }),
        D::Thread { callee, take, give } => Instruction::Thread(thread(ctx, callee, take, give)?),
        D::Thread2 { callee, take, give } => {
            Instruction::Thread2(thread(ctx, callee, take, give)?)
        }
        D::Return => Instruction::Return,
        D::Goto { label } => Instruction::Goto(ctx.label(Ref::parse(label))?),
        D::Call(c) => Instruction::Call(call(ctx, c)?),
        D::CallAsThread(c) => Instruction::CallAsThread(call(ctx, c)?),
        D::CallAsChildThread(c) => Instruction::CallAsChildThread(call(ctx, c)?),
        D::DeleteRuntime { value } => Instruction::DeleteRuntime(operand(ctx, value)?),
        D::Wait { value } => Instruction::Wait(operand(ctx, value)?),
        D::WaitMs { value } => Instruction::WaitMs(operand(ctx, value)?),
        D::If {
            condition,
            target,
            unknown,
        } => Instruction::If(If {
            condition: expression(ctx, condition)?,
            target: *target,
            unknown1: unknown[0],
            unknown2: unknown[1],
        }),
        D::Else { target } => Instruction::Else(Else { target: *target }),
        D::ElseIf {
            condition,
            target,
            skip_target,
            unknown,
        } => Instruction::ElseIf(ElseIf {
            skip_target: *skip_target,
            unknown1: unknown[0],
            condition: expression(ctx, condition)?,
            target: *target,
            unknown3: unknown[1],
            unknown4: unknown[2],
        }),
        D::EndIf => Instruction::EndIf,
        D::Switch { value, entry, exit } => Instruction::Switch(Switch {
            value: var(ctx, value)?,
            entry: *entry,
            exit: *exit,
        }),
        D::Case { value, target } => Instruction::Case(Case {
            value: var(ctx, value)?,
            target: *target,
        }),
        D::Case2 { value, target } => Instruction::Case2(Case {
            value: var(ctx, value)?,
            target: *target,
        }),
        D::BreakSwitch => Instruction::BreakSwitch,
        D::EndSwitch => Instruction::EndSwitch,
        D::DoWhile { condition, target } => Instruction::DoWhile(DoWhile {
            condition: operand(ctx, condition)?,
            target: *target,
        }),
        D::Break => Instruction::Break,
        D::EndDoWhile => Instruction::EndDoWhile,
        D::Set { assignee, value } => Instruction::Set(Set {
            assignee: var(ctx, assignee)?,
            value: operand(ctx, value)?,
        }),
        D::ReadTableLength { table: t } => Instruction::ReadTableLength(table(ctx, t)?),
        D::GetIndex {
            table: t,
            occurrence,
            variable,
        } => Instruction::GetIndex(GetIndex {
            table: table(ctx, t)?,
            occurrence: var(ctx, occurrence)?,
            variable: var(ctx, variable)?,
        }),
        D::WaitCompleted { value } => Instruction::WaitCompleted(operand(ctx, value)?),
        D::Unsure1 => Instruction::Unsure1,
        D::Unsure2 { expr } => Instruction::Unsure2(expression(ctx, expr)?),
        D::Unsure3 {
            first,
            import,
            second,
        } => Instruction::Unsure3(
            var(ctx, first)?,
            ctx.import(Ref::parse(import))?,
            var(ctx, second)?,
        ),
        D::Unsure4 { var: v } => Instruction::Unsure4(var(ctx, v)?),
        D::Unsure7 { vars: v } => Instruction::Unsure7([
            var(ctx, &v[0])?,
            var(ctx, &v[1])?,
            var(ctx, &v[2])?,
            var(ctx, &v[3])?,
        ]),
        D::Unsure8 { vars: v } => Instruction::Unsure8([
            var(ctx, &v[0])?,
            var(ctx, &v[1])?,
            var(ctx, &v[2])?,
        ]),
        D::Unsure9 { expr } => Instruction::Unsure9(expression(ctx, expr)?),
        D::Unsure11 { var: v, table: t } => Instruction::Unsure11(var(ctx, v)?, table(ctx, t)?),
    };
    Ok(instruction)
}
