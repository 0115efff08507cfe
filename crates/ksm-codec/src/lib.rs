//! KSM codec: decodes bytecode containers into symbolic [`Script`]s and
//! encodes them back.
//!
//! # Architecture
//!
//! - [`cursor`]: bounds-checked little-endian reader and patchable writer.
//! - [`context`]: scoped symbol resolution and the shared `seen` set.
//! - [`expr`]: expression token streams and call payloads.
//! - `instr`: per-opcode payload codecs.
//! - [`records`]: named records (functions, variables, imports, labels,
//!   tables).
//! - [`layout`]: offset assignment, the first build pass.
//! - [`fixup`]: label and jump patching, the second build pass.
//! - [`script`]: section orchestration for [`parse`] and [`build`].
//!
//! Decoding yields fully resolved handles; encoding re-derives every offset,
//! so a rebuilt container is layout-valid but not necessarily byte-identical
//! to its source.

mod code;
pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod expr;
pub mod fixup;
mod instr;
pub mod layout;
pub mod records;
pub mod script;

pub use code::InstructionEnds;
pub use config::CodecOptions;
pub use context::{Context, Visit};
pub use error::{CodecError, CodecResult};
pub use instr::{byte_size, encoded_size};
pub use ksm_types::Script;
pub use script::{build, build_with, parse, parse_with, BuildOutput, HEADER_SIZE};
