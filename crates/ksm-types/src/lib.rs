//! Shared types for the KSM codec.
//!
//! This crate defines the symbolic program model a KSM container decodes
//! into: the [`Script`] aggregate, its records, the [`Instruction`] sum type,
//! expressions, and the opcode and operator tables. It performs no I/O.

pub mod expr;
pub mod function;
pub mod instruction;
pub mod opcode;
pub mod operator;
pub mod records;
pub mod script;
pub mod symbol;

pub use expr::{Call, CallArg, Expression, Operand, Token};
pub use function::Function;
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use operator::Operator;
pub use records::{
    Import, Label, Table, TableType, TableValues, Variable, VariableScope, VariableType,
    VariableValue, TMP_VARIABLE_BASE, TMP_VARIABLE_COUNT,
};
pub use script::{Script, MAGIC, SECTION_COUNT};
pub use symbol::{display_name, Callee, Id, LabelRef, Owner, Ref, Symbol, TableRef, VarRef};
