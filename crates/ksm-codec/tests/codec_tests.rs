//! Integration tests for the KSM codec.
//!
//! Tests validate:
//! - Build → parse round trips preserve every record and instruction
//! - Label addresses point at their markers
//! - If/ElseIf/Else, Switch/Case and DoWhile jump targets
//! - Spawned functions are embedded right after their spawn
//! - Table payload encoding
//! - Symbol resolution precedence
//! - Unattributed code and padding survive a round trip
//! - Float values keep their exact bits, NaN payloads included
//! - Error taxonomy for malformed input

use ksm_codec::{build, build_with, parse, parse_with, CodecError, CodecOptions, Context, Visit};
use ksm_types::instruction::{Case, DoWhile, Else, ElseIf, GetArgs, GetIndex, If, Set, Switch, Thread};
use ksm_types::{
    Call, CallArg, Callee, Expression, Function, Import, Instruction, Label, LabelRef, Opcode,
    Operand, Operator, Owner, Ref, Script, Symbol, Table, TableRef, TableValues, Token, VarRef,
    Variable, VariableScope, VariableValue,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const A: u32 = 0x200;
const B: u32 = 0x201;
const MSG: u32 = 0x202;
const COUNTER: u32 = 0x203;
const PRINT: u32 = 0x300;

/// Script with a few globals and one import.
fn base_script() -> Script {
    let mut script = Script::new();
    script.add_variable(Variable::int(A, VariableScope::Global, 1).named("a"));
    script.add_variable(Variable::float(B, VariableScope::Global, 2.5).named("b"));
    script.add_variable(Variable::string(MSG, VariableScope::Global, "hello").named("msg"));
    script.add_variable(Variable::int(COUNTER, VariableScope::Global, 0));
    script.add_import(Import::new(PRINT, "print"));
    script
}

fn global(id: u32) -> VarRef {
    VarRef::global(id)
}

fn sym(var: VarRef) -> Token {
    Token::Symbol(Symbol::Variable(var))
}

/// `left == right`
fn equals(left: VarRef, right: VarRef) -> Expression {
    Expression::new(vec![sym(left), sym(right), Token::Operator(Operator::Eq)])
}

fn set(assignee: VarRef, value: VarRef) -> Instruction {
    Instruction::Set(Set {
        assignee,
        value: Operand::Variable(value),
    })
}

fn if_(condition: Expression) -> Instruction {
    Instruction::If(If {
        condition,
        target: 0,
        unknown1: 0,
        unknown2: 0,
    })
}

fn else_if(condition: Expression) -> Instruction {
    Instruction::ElseIf(ElseIf {
        skip_target: 0,
        unknown1: 0,
        condition,
        target: 0,
        unknown3: 0,
        unknown4: 0,
    })
}

fn case(value: VarRef) -> Instruction {
    Instruction::Case(Case { value, target: 0 })
}

fn spawn(callee: u32) -> Instruction {
    Instruction::Thread2(Thread {
        callee: Callee::Function(callee),
        take: vec![],
        give: vec![],
    })
}

fn function(id: u32, body: Vec<Instruction>) -> Function {
    let mut f = Function::new(id);
    f.instructions = body;
    f
}

fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Absolute byte offset of section `index`.
fn section(bytes: &[u8], index: usize) -> usize {
    word(bytes, 8 + index * 4) as usize * 4
}

fn patch(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn round_trip(script: &mut Script) -> Script {
    let bytes = build(script).unwrap_or_else(|e| panic!("build failed: {e}"));
    parse(&bytes).unwrap_or_else(|e| panic!("parse failed: {e}"))
}

/// A script exercising most instruction families, a spawned worker, labels
/// and tables of every scope.
fn sample_script() -> Script {
    let mut script = base_script();
    script.add_import(Import {
        id: 0x301,
        name: None,
        unknown: [1, 2, 3, 4, 5],
    });
    script.add_variable(Variable::int(0x210, VariableScope::Static, 7).named("s"));
    script.add_variable(Variable::float(0x220, VariableScope::Const, -1.0));
    script.add_table(
        Table::new(
            0x500,
            TableValues::Variable(vec![global(A), global(B), global(COUNTER)]),
        )
        .named("vars"),
    );

    // Declared before main so that main's spawn embeds it.
    let mut worker = Function::new(0x101).named("worker");
    worker.add_variable(Variable::int(0x111, VariableScope::Local, 0));
    worker.instructions = vec![
        Instruction::GetArgs(GetArgs {
            function: 0x101,
            args: vec![VarRef::local(0x101, 0x111)],
        }),
        Instruction::Wait(Operand::Variable(global(A))),
        Instruction::Return,
    ];
    script.add_function(worker);

    let i = VarRef::local(0x100, 0x110);
    let mut main = Function::new(0x100).named("main");
    main.public = true;
    main.unknown = [9, 8, 7];
    main.add_variable(Variable::int(0x110, VariableScope::Local, 0).named("i"));
    main.add_label(Label::new(0x120).named("top"));
    main.add_table(Table::new(0x130, TableValues::Int(vec![1, 2, 3])));
    main.instructions = vec![
        Instruction::Label,
        set(i, global(A)),
        if_(equals(i, global(A))),
        Instruction::Call(Call::new(
            Callee::Import(PRINT),
            vec![CallArg::Symbol(Symbol::Variable(global(MSG)))],
        )),
        Instruction::Else(Else::default()),
        Instruction::Set(Set {
            assignee: i,
            value: Operand::Expr(Expression::new(vec![
                sym(global(A)),
                sym(global(B)),
                Token::Operator(Operator::Add),
            ])),
        }),
        Instruction::EndIf,
        Instruction::Thread2(Thread {
            callee: Callee::Function(0x101),
            take: vec![1],
            give: vec![i],
        }),
        Instruction::Goto(LabelRef {
            function: 0x100,
            id: 0x120,
        }),
        Instruction::GetIndex(GetIndex {
            table: TableRef {
                owner: Owner::Function(0x100),
                id: 0x130,
            },
            occurrence: i,
            variable: i,
        }),
        Instruction::ReadTableLength(TableRef {
            owner: Owner::Script,
            id: 0x500,
        }),
        Instruction::Unsure3(i, 0x301, global(COUNTER)),
        Instruction::Return,
    ];
    script.add_function(main);
    script
}

// ══════════════════════════════════════════════════════════════════════════════
// Round trip
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn empty_script_round_trips() {
    let mut script = Script::new();
    let bytes = build(&mut script).unwrap();
    assert_eq!(&bytes[..8], &ksm_types::MAGIC);
    assert_eq!(section(&bytes, 0), ksm_codec::HEADER_SIZE);
    assert_eq!(parse(&bytes).unwrap(), script);
}

#[test]
fn sample_script_round_trips() {
    let mut script = sample_script();
    let decoded = round_trip(&mut script);
    assert_eq!(decoded, script);

    let ids: Vec<u32> = decoded.functions.keys().copied().collect();
    assert_eq!(ids, vec![0x101, 0x100]);
    assert!(decoded.functions[&0x101].inline);
    assert!(!decoded.functions[&0x100].inline);
}

#[test]
fn rebuilding_a_decoded_script_is_stable() {
    let mut script = sample_script();
    let first = build(&mut script).unwrap();
    let mut decoded = parse(&first).unwrap();
    let second = build(&mut decoded).unwrap();
    assert_eq!(first, second);
}

#[test]
fn names_and_values_survive() {
    let mut script = sample_script();
    let decoded = round_trip(&mut script);
    let msg = &decoded.variables[&MSG];
    assert_eq!(msg.name.as_deref(), Some("msg"));
    assert_eq!(msg.value, VariableValue::String("hello".into()));
    assert_eq!(decoded.variables[&0x220].scope, VariableScope::Const);
    assert_eq!(decoded.imports[&0x301].unknown, [1, 2, 3, 4, 5]);
    assert!(decoded.imports[&0x301].name.is_none());
}

#[test]
fn const_flag_selects_call_argument_shape() {
    let mut script = base_script();
    script.add_function(function(
        0x100,
        vec![
            Instruction::Call(Call::new(
                Callee::Import(PRINT),
                vec![CallArg::Symbol(Symbol::Variable(global(A)))],
            )),
            Instruction::Call(Call::new(
                Callee::Import(PRINT),
                vec![CallArg::Expr(equals(global(A), global(B)))],
            )),
            Instruction::Return,
        ],
    ));
    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let base = out.code_base;
    assert_eq!(word(&out.bytes, base), Opcode::Call.code() | 0x100);
    let second = base + out.instruction_ends[&0x100][0] as usize;
    assert_eq!(word(&out.bytes, second), Opcode::Call.code());

    let decoded = parse(&out.bytes).unwrap();
    assert_eq!(decoded, script);
}

// ══════════════════════════════════════════════════════════════════════════════
// Labels
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn label_address_points_at_marker() {
    let mut script = sample_script();
    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let code_section = section(&out.bytes, 7);
    assert_eq!(code_section + 4, out.code_base);

    for function in script.functions.values() {
        for label in function.labels.values() {
            let marker = code_section + label.address as usize * 4;
            assert_eq!(word(&out.bytes, marker), Opcode::Label.code());
        }
    }
}

#[test]
fn labels_bind_to_markers_in_reverse_declaration_order() {
    let mut script = base_script();
    let mut f = function(
        0x100,
        vec![
            Instruction::Label,
            set(global(A), global(B)),
            Instruction::Label,
            Instruction::Return,
        ],
    );
    f.add_label(Label::new(0x120).named("first"));
    f.add_label(Label::new(0x121).named("second"));
    script.add_function(f);

    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let ends = &out.instruction_ends[&0x100];
    let labels = &script.functions[&0x100].labels;
    assert_eq!(labels[&0x121].address * 4, ends[0]);
    assert_eq!(labels[&0x120].address * 4, ends[2]);
}

#[test]
fn label_count_mismatch_is_fatal_only_when_strict() {
    let mut script = base_script();
    let mut f = function(0x100, vec![Instruction::Return]);
    f.add_label(Label::new(0x120));
    script.add_function(f);

    assert!(build_with(&mut script.clone(), &CodecOptions::default()).is_ok());
    let err = build_with(&mut script, &CodecOptions::strict()).unwrap_err();
    assert!(matches!(err, CodecError::MalformedFile { .. }), "{err}");
}

// ══════════════════════════════════════════════════════════════════════════════
// Branches
// ══════════════════════════════════════════════════════════════════════════════

fn built_body(body: Vec<Instruction>) -> (Vec<Instruction>, Vec<u32>) {
    let mut script = base_script();
    script.add_function(function(0x100, body));
    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let decoded = parse(&out.bytes).unwrap();
    assert_eq!(decoded, script);
    let ends = out.instruction_ends[&0x100].clone();
    (script.functions[&0x100].instructions.clone(), ends)
}

fn is_boundary(ends: &[u32], word_offset: u32) -> bool {
    word_offset == 0 || ends.contains(&(word_offset * 4))
}

#[test]
fn if_without_else_lands_on_end_if() {
    let (code, ends) = built_body(vec![
        if_(equals(global(A), global(B))),
        set(global(A), global(B)),
        Instruction::EndIf,
        Instruction::Return,
    ]);
    let Instruction::If(i) = &code[0] else { panic!() };
    // start of the EndIf
    assert_eq!(i.target * 4, ends[1]);
}

#[test]
fn if_else_targets_are_instruction_boundaries() {
    let (code, ends) = built_body(vec![
        if_(equals(global(A), global(B))),
        set(global(A), global(B)),
        Instruction::Else(Else::default()),
        set(global(B), global(A)),
        Instruction::EndIf,
    ]);
    let Instruction::If(i) = &code[0] else { panic!() };
    let Instruction::Else(e) = &code[2] else { panic!() };
    assert_eq!(i.target * 4, ends[2]);
    assert_eq!(e.target * 4, ends[4]);
    assert!(is_boundary(&ends, i.target));
    assert!(is_boundary(&ends, e.target));
}

#[test]
fn nested_if_does_not_stop_outer_scan() {
    let (code, ends) = built_body(vec![
        if_(equals(global(A), global(B))),
        if_(equals(global(B), global(A))),
        set(global(A), global(B)),
        Instruction::EndIf,
        Instruction::EndIf,
        Instruction::Return,
    ]);
    let Instruction::If(outer) = &code[0] else { panic!() };
    let Instruction::If(inner) = &code[1] else { panic!() };
    assert_eq!(inner.target * 4, ends[2]);
    assert_eq!(outer.target * 4, ends[3]);
}

#[test]
fn else_if_chain_targets() {
    let (code, ends) = built_body(vec![
        if_(equals(global(A), global(B))),
        set(global(A), global(B)),
        else_if(equals(global(B), global(A))),
        set(global(B), global(A)),
        Instruction::Else(Else::default()),
        set(global(A), global(A)),
        Instruction::EndIf,
    ]);
    let Instruction::If(i) = &code[0] else { panic!() };
    let Instruction::ElseIf(ei) = &code[2] else { panic!() };
    assert_eq!(i.target * 4, ends[2]);
    assert_eq!(ei.target * 4, ends[4]);
    assert_eq!(ei.skip_target * 4, ends[4] - 8);
}

#[test]
fn else_if_closing_on_end_if_shares_target() {
    let (code, ends) = built_body(vec![
        if_(equals(global(A), global(B))),
        else_if(equals(global(B), global(A))),
        set(global(B), global(A)),
        Instruction::EndIf,
    ]);
    let Instruction::ElseIf(ei) = &code[1] else { panic!() };
    assert_eq!(ei.target * 4, ends[3] - 4);
    assert_eq!(ei.skip_target, ei.target);
}

#[test]
fn switch_with_three_cases() {
    let v = global(COUNTER);
    let (code, ends) = built_body(vec![
        Instruction::Switch(Switch {
            value: v,
            entry: 0,
            exit: 0,
        }),
        case(global(A)),
        set(v, global(A)),
        Instruction::BreakSwitch,
        case(global(B)),
        set(v, global(B)),
        Instruction::BreakSwitch,
        Instruction::Case2(Case {
            value: global(MSG),
            target: 0,
        }),
        set(v, global(MSG)),
        Instruction::EndSwitch,
    ]);
    let Instruction::Switch(s) = &code[0] else { panic!() };
    let Instruction::Case(first) = &code[1] else { panic!() };
    let Instruction::Case2(last) = &code[7] else { panic!() };
    assert_eq!(s.entry * 4, ends[1]);
    assert_eq!(s.exit * 4, ends[9]);
    assert_eq!(first.target * 4, ends[4]);
    assert_eq!(last.target * 4, ends[9]);
}

#[test]
fn do_while_targets_its_end() {
    let (code, ends) = built_body(vec![
        Instruction::DoWhile(DoWhile {
            condition: Operand::Expr(equals(global(A), global(B))),
            target: 0,
        }),
        set(global(A), global(B)),
        Instruction::DoWhile(DoWhile {
            condition: Operand::Variable(global(A)),
            target: 0,
        }),
        Instruction::Break,
        Instruction::EndDoWhile,
        Instruction::EndDoWhile,
    ]);
    let Instruction::DoWhile(outer) = &code[0] else { panic!() };
    let Instruction::DoWhile(inner) = &code[2] else { panic!() };
    assert_eq!(outer.target * 4, ends[5]);
    assert_eq!(inner.target * 4, ends[4]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Threads
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn spawned_body_follows_thread2() {
    let mut script = base_script();
    script.add_function(function(
        0x101,
        vec![
            set(global(A), global(B)),
            set(global(B), global(A)),
            Instruction::Return,
        ],
    ));
    script.add_function(function(
        0x100,
        vec![set(global(A), global(A)), spawn(0x101), Instruction::Return],
    ));

    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let caller_ends = &out.instruction_ends[&0x100];
    let callee = &script.functions[&0x101];
    assert!(callee.inline);
    assert_eq!(callee.code_start, caller_ends[1]);
    let first = out.code_base + callee.code_start as usize;
    assert_eq!(word(&out.bytes, first), Opcode::Set.code() | 0x100);
    // the caller resumes after the embedded body
    assert_eq!(caller_ends[2], callee.code_end + 4);

    let decoded = parse(&out.bytes).unwrap();
    assert_eq!(decoded, script);
}

#[test]
fn already_placed_callee_is_not_embedded() {
    let mut script = base_script();
    script.add_function(function(0x100, vec![spawn(0x101), Instruction::Return]));
    script.add_function(function(0x101, vec![Instruction::Return]));

    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let callee = &script.functions[&0x101];
    let caller = &script.functions[&0x100];
    assert!(!callee.inline);
    assert_eq!(callee.code_start, 0);
    assert_eq!(caller.code_end - caller.code_start, 16 + 4);
    assert_eq!(parse(&out.bytes).unwrap(), script);
}

#[test]
fn spawned_body_resolves_in_spawner_scope() {
    let mut script = base_script();
    let shared = VarRef::local(0x100, 0x110);
    script.add_function(function(0x101, vec![set(shared, global(A)), Instruction::Return]));
    let mut main = function(0x100, vec![spawn(0x101), Instruction::Return]);
    main.add_variable(Variable::int(0x110, VariableScope::Local, 0));
    script.add_function(main);

    let decoded = round_trip(&mut script);
    let Instruction::Set(s) = &decoded.functions[&0x101].instructions[0] else {
        panic!()
    };
    assert_eq!(s.assignee, shared);
}

#[test]
fn callee_spawned_twice_is_embedded_once() {
    let mut script = base_script();
    script.add_function(function(0x102, vec![set(global(A), global(B)), Instruction::Return]));
    script.add_function(function(0x101, vec![spawn(0x102), Instruction::Return]));
    script.add_function(function(0x100, vec![spawn(0x102), Instruction::Return]));

    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let callee = &script.functions[&0x102];
    assert!(callee.inline);
    assert_eq!(callee.code_start, out.instruction_ends[&0x100][0]);
    let second = &script.functions[&0x101];
    assert_eq!(second.code_end - second.code_start, 16 + 4);
    assert_eq!(parse(&out.bytes).unwrap(), script);
}

#[test]
fn consuming_a_record_twice_is_a_double_visit() {
    let script = sample_script();
    let ctx = Context::new(&script);
    ctx.visit(Visit::Function(0x101)).unwrap();
    assert!(ctx.is_seen(Visit::Function(0x101)));
    assert!(matches!(
        ctx.visit(Visit::Function(0x101)),
        Err(CodecError::DoubleVisit(_))
    ));

    // scoped and cloned contexts share one seen set
    let scoped = ctx.push(&script.functions[&0x100]);
    scoped.visit(Visit::Table(Owner::Script, 0x500)).unwrap();
    assert!(matches!(
        ctx.clone().visit(Visit::Table(Owner::Script, 0x500)),
        Err(CodecError::DoubleVisit(_))
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Tables
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn variable_table_payload() {
    let mut script = base_script();
    script.add_function(function(0x100, vec![Instruction::Return]));
    let refs = vec![global(A), global(B), global(MSG)];
    script.add_table(Table::new(0x500, TableValues::Variable(refs.clone())));

    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let start = out.code_base + script.tables[&0x500].start_offset as usize;
    let words: Vec<u32> = (0..5).map(|k| word(&out.bytes, start + k * 4)).collect();
    assert_eq!(words, vec![0x63, A, B, MSG, 0x66]);

    let decoded = parse(&out.bytes).unwrap();
    assert_eq!(decoded.tables[&0x500].values, TableValues::Variable(refs));
    assert_eq!(decoded.tables[&0x500].length, 3);
}

#[test]
fn byte_table_is_padded_to_a_word() {
    let mut script = base_script();
    script.add_table(Table::new(0x500, TableValues::Byte(vec![1, 2, 3, 4, 5])));

    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let start = out.code_base + script.tables[&0x500].start_offset as usize;
    assert_eq!(word(&out.bytes, start), 0x65);
    assert_eq!(&out.bytes[start + 4..start + 12], &[1, 2, 3, 4, 5, 0, 0, 0]);
    assert_eq!(word(&out.bytes, start + 12), 0x66);
    assert_eq!(parse(&out.bytes).unwrap(), script);
}

#[test]
fn local_variable_table_resolves_owner_locals() {
    let mut script = base_script();
    let mut f = function(0x100, vec![Instruction::Return]);
    f.add_variable(Variable::int(0x110, VariableScope::Local, 3));
    f.add_table(Table::new(
        0x130,
        TableValues::Variable(vec![VarRef::local(0x100, 0x110), global(A)]),
    ));
    script.add_function(f);
    assert_eq!(round_trip(&mut script), script);
}

#[test]
fn wrong_table_close_marker_is_malformed() {
    let mut script = base_script();
    script.add_table(Table::new(0x500, TableValues::Int(vec![4])));
    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    let mut bytes = out.bytes;
    let close = out.code_base + 8;
    patch(&mut bytes, close, 0x65);
    let err = parse(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::MalformedFile { offset, .. } if offset == close));
}

// ══════════════════════════════════════════════════════════════════════════════
// Symbols
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn local_variable_shadows_global_function_with_same_id() {
    let mut script = base_script();
    script.add_function(function(0x400, vec![Instruction::Return]));
    let mut f = function(0x100, vec![]);
    f.add_variable(Variable::int(0x400, VariableScope::Local, 0));
    script.add_function(f);

    let ctx = Context::new(&script);
    assert_eq!(ctx.resolve(Ref::Id(0x400)).unwrap(), Symbol::Function(0x400));
    let inside = ctx.push(&script.functions[&0x100]);
    assert_eq!(
        inside.resolve(Ref::Id(0x400)).unwrap(),
        Symbol::Variable(VarRef::local(0x100, 0x400))
    );
}

#[test]
fn shadowing_survives_a_round_trip() {
    let mut script = base_script();
    script.add_function(function(0x400, vec![Instruction::Return]));
    let local = VarRef::local(0x100, 0x400);
    let mut f = function(
        0x100,
        vec![
            Instruction::Call(Call::new(
                Callee::Import(PRINT),
                vec![CallArg::Symbol(Symbol::Variable(local))],
            )),
            Instruction::Return,
        ],
    );
    f.add_variable(Variable::int(0x400, VariableScope::Local, 0));
    script.add_function(f);
    assert_eq!(round_trip(&mut script), script);
}

#[test]
fn resolution_order_at_script_level() {
    let mut script = Script::new();
    script.add_variable(Variable::int(0x10, VariableScope::Global, 0).named("shared"));
    script.add_function(Function::new(0x10).named("shared"));
    script.add_import(Import::new(0x10, "shared"));
    script.add_table(Table::new(0x10, TableValues::Int(vec![])).named("shared"));

    let ctx = Context::new(&script);
    let table = Symbol::Table(TableRef {
        owner: Owner::Script,
        id: 0x10,
    });
    assert_eq!(ctx.resolve(Ref::Id(0x10)).unwrap(), table);
    assert_eq!(ctx.resolve(Ref::Name("shared")).unwrap(), table);
    assert_eq!(ctx.callee(Ref::Id(0x10)).unwrap(), Callee::Import(0x10));
    assert_eq!(ctx.variable(Ref::parse("shared")).unwrap(), global(0x10));
    assert!(matches!(
        ctx.resolve(Ref::Id(0x11)),
        Err(CodecError::UnknownSymbol(_))
    ));
}

#[test]
fn sibling_functions_do_not_share_locals() {
    let mut script = Script::new();
    let mut a = Function::new(1);
    a.add_variable(Variable::int(0x110, VariableScope::Local, 0));
    script.add_function(a);
    script.add_function(Function::new(2));

    let ctx = Context::new(&script);
    let in_a = ctx.push(&script.functions[&1]);
    let in_b = ctx.push(&script.functions[&2]);
    assert!(in_a.variable(Ref::Id(0x110)).is_ok());
    assert!(in_b.variable(Ref::Id(0x110)).is_err());
}

// ══════════════════════════════════════════════════════════════════════════════
// Unattributed code & padding
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn undeclared_code_becomes_a_function() {
    let mut script = base_script();
    script.add_function(function(1, vec![Instruction::Return]));
    let mut stray = function(2, vec![set(global(A), global(B)), Instruction::Return]);
    stray.declared = false;
    script.add_function(stray);

    let bytes = build(&mut script).unwrap();
    // only the declared function is in section 1
    assert_eq!(word(&bytes, section(&bytes, 1)), 1);

    let decoded = parse(&bytes).unwrap();
    let ids: Vec<u32> = decoded.functions.keys().copied().collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(!decoded.functions[&2].declared);
    assert_eq!(decoded, script);
}

#[test]
fn padding_words_round_trip() {
    let mut script = base_script();
    script.add_function(function(1, vec![Instruction::Return]));
    script.padding = [vec![1, 2], vec![0xAA], vec![0xDEAD_BEEF, 0]];
    let decoded = round_trip(&mut script);
    assert_eq!(decoded.padding, script.padding);
}

#[test]
fn float_values_keep_their_bits() {
    let nan = f32::from_bits(0xFFFF_FFFF);
    let mut script = base_script();
    script.add_variable(Variable::float(0x240, VariableScope::Static, nan));
    script.add_table(Table::new(
        0x500,
        TableValues::Float(vec![f32::from_bits(0x7FC0_0001), -0.0, 1.5]),
    ));
    let bytes = build(&mut script).unwrap();
    let decoded = parse(&bytes).unwrap();

    let VariableValue::Float(value) = &decoded.variables[&0x240].value else {
        panic!("expected a float value")
    };
    assert_eq!(value.to_bits(), 0xFFFF_FFFF);
    let TableValues::Float(values) = &decoded.tables[&0x500].values else {
        panic!("expected float table values")
    };
    let bits: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
    assert_eq!(bits, vec![0x7FC0_0001, (-0.0f32).to_bits(), 1.5f32.to_bits()]);
    assert_eq!(build(&mut parse(&bytes).unwrap()).unwrap(), bytes);
}

#[test]
fn opaque_instructions_round_trip() {
    let mut script = base_script();
    script.add_table(Table::new(0x500, TableValues::Float(vec![0.5])));
    let v = global(A);
    script.add_function(function(
        1,
        vec![
            Instruction::Unsure1,
            Instruction::Unsure2(Expression::default()),
            Instruction::Unsure2(equals(v, v)),
            Instruction::Unsure4(v),
            Instruction::Unsure7([v, v, v, v]),
            Instruction::Unsure8([v, v, v]),
            Instruction::Unsure9(equals(v, v)),
            Instruction::Unsure11(
                v,
                TableRef {
                    owner: Owner::Script,
                    id: 0x500,
                },
            ),
            Instruction::Nop,
            Instruction::DeleteRuntime(Operand::Variable(v)),
            Instruction::WaitMs(Operand::Expr(equals(v, v))),
            Instruction::WaitCompleted(Operand::Variable(v)),
            Instruction::ReturnVal(Operand::Expr(Expression::default())),
        ],
    ));
    assert_eq!(round_trip(&mut script), script);
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

fn minimal_bytes() -> (Vec<u8>, usize) {
    let mut script = base_script();
    script.add_function(function(1, vec![Instruction::Return]));
    let out = build_with(&mut script, &CodecOptions::default()).unwrap();
    (out.bytes, out.code_base)
}

#[test]
fn magic_mismatch_is_not_a_container() {
    let (mut bytes, _) = minimal_bytes();
    bytes[0] = b'X';
    assert!(matches!(parse(&bytes), Err(CodecError::NotAContainer)));
    assert!(matches!(parse(b"KSM"), Err(CodecError::NotAContainer)));
}

#[test]
fn reserved_header_word_must_be_zero() {
    let (mut bytes, _) = minimal_bytes();
    patch(&mut bytes, 40, 1);
    assert!(matches!(
        parse(&bytes),
        Err(CodecError::MalformedFile { offset: 40, .. })
    ));
}

#[test]
fn misplaced_section_is_malformed() {
    let (mut bytes, _) = minimal_bytes();
    let declared = section(&bytes, 2);
    patch(&mut bytes, 8 + 2 * 4, (declared / 4 + 1) as u32);
    assert!(matches!(parse(&bytes), Err(CodecError::MalformedFile { .. })));
}

#[test]
fn section_offset_past_end_is_malformed() {
    for index in 0..8 {
        let at = 8 + index * 4;
        for huge in [0xFFFF_FFFF, 0x3FFF_FFFF] {
            let (mut bytes, _) = minimal_bytes();
            patch(&mut bytes, at, huge);
            match parse(&bytes) {
                Err(CodecError::MalformedFile { offset, .. }) => assert_eq!(offset, at),
                other => panic!("section {index}: expected malformed, got {other:?}"),
            }
        }
    }
}

fn script_with_table() -> Vec<u8> {
    let mut script = base_script();
    script.add_function(function(1, vec![Instruction::Return]));
    script.add_table(Table::new(0x500, TableValues::Int(vec![4, 5])));
    build(&mut script).unwrap()
}

#[test]
fn record_offset_past_end_is_malformed() {
    // fifth word of the first function record: code start
    let bytes = script_with_table();
    let code_start = section(&bytes, 1) + 4 + 16;
    // fifth word of the first table record: payload start
    let table_start = section(&bytes, 3) + 4 + 16;
    for at in [code_start, table_start] {
        for huge in [0x4000_0001, 0x3FFF_FFFF] {
            let mut bytes = bytes.clone();
            patch(&mut bytes, at, huge);
            assert!(matches!(
                parse(&bytes),
                Err(CodecError::MalformedFile { offset, .. }) if offset == at
            ));
        }
    }
}

#[test]
fn huge_table_length_is_malformed() {
    let mut bytes = script_with_table();
    // fourth word of the first table record: length
    let at = section(&bytes, 3) + 4 + 12;
    patch(&mut bytes, at, 0xFFFF_FFFF);
    assert!(matches!(parse(&bytes), Err(CodecError::MalformedFile { .. })));
}

#[test]
fn unknown_opcode_reports_offset() {
    let (mut bytes, code_base) = minimal_bytes();
    for opcode in [0x6E, 0x99] {
        patch(&mut bytes, code_base, opcode);
        match parse(&bytes) {
            Err(CodecError::UnknownOpcode { opcode: found, offset }) => {
                assert_eq!(found, opcode);
                assert_eq!(offset, code_base);
            }
            other => panic!("expected unknown opcode, got {other:?}"),
        }
    }
}

#[test]
fn invalid_name_flag_is_malformed() {
    let (mut bytes, _) = minimal_bytes();
    // first function record follows the count word
    let record = section(&bytes, 1) + 4;
    patch(&mut bytes, record, 5);
    assert!(matches!(
        parse(&bytes),
        Err(CodecError::MalformedFile { offset, .. }) if offset == record
    ));
}

#[test]
fn code_length_disagreement_is_malformed() {
    let (mut bytes, code_base) = minimal_bytes();
    bytes.extend_from_slice(&[0, 0]);
    assert!(matches!(
        parse(&bytes),
        Err(CodecError::MalformedFile { offset, .. }) if offset == code_base - 4
    ));
}

#[test]
fn string_value_on_int_variable_is_type_mismatch() {
    let mut script = base_script();
    script.add_variable(Variable::new(
        0x250,
        VariableScope::Global,
        ksm_types::VariableType::Int,
        VariableValue::String("nope".into()),
    ));
    assert!(matches!(build(&mut script), Err(CodecError::TypeMismatch(_))));
}

#[test]
fn dangling_reference_fails_to_build() {
    let mut script = base_script();
    script.add_function(function(1, vec![set(global(A), global(0x999))]));
    assert!(matches!(build(&mut script), Err(CodecError::UnknownSymbol(_))));
}

#[test]
fn strict_parse_rejects_label_mismatch() {
    let mut script = base_script();
    let mut f = function(1, vec![Instruction::Label, Instruction::Return]);
    f.add_label(Label::new(0x120));
    f.add_label(Label::new(0x121));
    script.add_function(f);
    let bytes = build(&mut script).unwrap();

    assert!(parse(&bytes).is_ok());
    assert!(matches!(
        parse_with(&bytes, &CodecOptions::strict()),
        Err(CodecError::MalformedFile { .. })
    ));
}
