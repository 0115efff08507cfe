//! The interchange document tree.
//!
//! Mirrors [`ksm_types::Script`] record for record. Every cross-reference is a
//! string: the record's name when looking that name up in the same scope
//! finds the record again, `ref:<id>` otherwise. Jump targets, label
//! addresses and code offsets are carried along but may be omitted; a build
//! recomputes them.

use ksm_types::{Id, VariableScope};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptDocument {
    #[serde(default)]
    pub imports: Vec<ImportDocument>,
    /// Script-level variables, `tmp` excluded.
    #[serde(default)]
    pub variables: Vec<VariableDocument>,
    #[serde(default)]
    pub tables: Vec<TableDocument>,
    #[serde(default)]
    pub functions: Vec<FunctionDocument>,
    #[serde(default, skip_serializing_if = "no_padding")]
    pub padding: [Vec<u32>; 3],
}

fn no_padding(padding: &[Vec<u32>; 3]) -> bool {
    padding.iter().all(Vec::is_empty)
}

fn yes() -> bool {
    true
}

// ══════════════════════════════════════════════════════════════════════════════
// Records
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDocument {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub unknown: [u32; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDocument {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub scope: VariableScope,
    #[serde(default)]
    pub flags: u8,
    pub value: ValueDocument,
}

/// A variable's type and initial value together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueDocument {
    Int(i32),
    Float(f32),
    /// A NaN or infinite float, which JSON numbers cannot carry.
    #[serde(rename = "float_bits")]
    FloatBits(u32),
    String(String),
    /// An uninterpreted type code and its value word.
    Raw { code: u32, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub start_offset: u32,
    pub values: TableValuesDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableValuesDocument {
    /// Variable references, resolved in the owner's scope.
    Variable(Vec<String>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Byte(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDocument {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub address: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDocument {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub inline: bool,
    #[serde(default = "yes")]
    pub declared: bool,
    #[serde(default)]
    pub unknown: [u32; 3],
    #[serde(default)]
    pub code_start: u32,
    #[serde(default)]
    pub code_end: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelDocument>,
    #[serde(default)]
    pub code: Vec<InstructionDocument>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Code
// ══════════════════════════════════════════════════════════════════════════════

/// One expression token: `{"symbol": "x"}`, `{"op": "+"}` or `{"call": …}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenDocument {
    Symbol(String),
    Op(String),
    Call(CallDocument),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDocument {
    pub callee: String,
    #[serde(default)]
    pub args: Vec<ArgDocument>,
}

/// A bare symbol or an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgDocument {
    Symbol(String),
    Expr(Vec<TokenDocument>),
}

/// A variable reference or an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandDocument {
    Variable(String),
    Expr(Vec<TokenDocument>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstructionDocument {
    Nop,
    ReturnVal {
        value: OperandDocument,
    },
    Label,
    GetArgs {
        function: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Thread {
        callee: String,
        #[serde(default)]
        take: Vec<u32>,
        #[serde(default)]
        give: Vec<String>,
    },
    Thread2 {
        callee: String,
        #[serde(default)]
        take: Vec<u32>,
        #[serde(default)]
        give: Vec<String>,
    },
    Return,
    Goto {
        label: String,
    },
    Call(CallDocument),
    CallAsThread(CallDocument),
    CallAsChildThread(CallDocument),
    DeleteRuntime {
        value: OperandDocument,
    },
    Wait {
        value: OperandDocument,
    },
    WaitMs {
        value: OperandDocument,
    },
    If {
        condition: Vec<TokenDocument>,
        #[serde(default)]
        target: u32,
        #[serde(default)]
        unknown: [u32; 2],
    },
    Else {
        #[serde(default)]
        target: u32,
    },
    ElseIf {
        condition: Vec<TokenDocument>,
        #[serde(default)]
        target: u32,
        #[serde(default)]
        skip_target: u32,
        #[serde(default)]
        unknown: [u32; 3],
    },
    EndIf,
    Switch {
        value: String,
        #[serde(default)]
        entry: u32,
        #[serde(default)]
        exit: u32,
    },
    Case {
        value: String,
        #[serde(default)]
        target: u32,
    },
    Case2 {
        value: String,
        #[serde(default)]
        target: u32,
    },
    BreakSwitch,
    EndSwitch,
    DoWhile {
        condition: OperandDocument,
        #[serde(default)]
        target: u32,
    },
    Break,
    EndDoWhile,
    Set {
        assignee: String,
        value: OperandDocument,
    },
    ReadTableLength {
        table: String,
    },
    GetIndex {
        table: String,
        occurrence: String,
        variable: String,
    },
    WaitCompleted {
        value: OperandDocument,
    },
    Unsure1,
    Unsure2 {
        expr: Vec<TokenDocument>,
    },
    Unsure3 {
        first: String,
        import: String,
        second: String,
    },
    Unsure4 {
        var: String,
    },
    Unsure7 {
        vars: [String; 4],
    },
    Unsure8 {
        vars: [String; 3],
    },
    Unsure9 {
        expr: Vec<TokenDocument>,
    },
    Unsure11 {
        var: String,
        table: String,
    },
}

impl InstructionDocument {
    /// Callee reference of a `thread`/`thread2`.
    pub fn spawned(&self) -> Option<&str> {
        match self {
            InstructionDocument::Thread { callee, .. }
            | InstructionDocument::Thread2 { callee, .. } => Some(callee),
            _ => None,
        }
    }
}
