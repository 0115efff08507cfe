//! JSON interchange for KSM scripts.
//!
//! [`export`] turns a decoded [`Script`](ksm_types::Script) into a
//! [`ScriptDocument`] that can be read and edited by hand; [`import`] turns a
//! document back into a fully resolved script ready for
//! [`ksm_codec::build`]. References are spelled as record names where that is
//! unambiguous and as `ref:<id>` otherwise, and operators as their source
//! symbols (`+`, `==`, `&&`, …).

pub mod document;
pub mod error;
pub mod export;
pub mod import;
mod scope;

pub use document::{
    ArgDocument, CallDocument, FunctionDocument, ImportDocument, InstructionDocument,
    LabelDocument, OperandDocument, ScriptDocument, TableDocument, TableValuesDocument,
    TokenDocument, ValueDocument, VariableDocument,
};
pub use error::{InterchangeError, InterchangeResult};
pub use export::{export, to_json, ExportOptions};
pub use import::{from_json, import};
