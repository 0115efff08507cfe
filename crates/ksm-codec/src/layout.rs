//! Offset assignment, the first pass of a build.
//!
//! Functions are placed in reverse declaration order. Each one starts at the
//! running cursor, and every instruction advances the cursor by its encoded
//! size. A `Thread`/`Thread2` whose callee has not been placed yet places the
//! callee right there, so the spawned body follows its spawn instruction.
//! Functions flagged inline are only placed that way; any that no spawn
//! reaches are placed after all top-level functions. Tables follow: script
//! tables first, then each function's.

use std::collections::HashSet;

use ksm_types::{Id, Script};
use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::instr;

/// Assign `code_start`/`code_end` to every function and `start_offset` to
/// every table, recompute table lengths, and keep the `inline` flag in step
/// with where each function lands. Returns the code size before padding.
pub fn assign_offsets(script: &mut Script) -> CodecResult<u32> {
    let mut placed = HashSet::new();
    let mut cursor = 0u32;

    let top_level: Vec<Id> = script
        .functions
        .values()
        .rev()
        .filter(|f| !f.inline)
        .map(|f| f.id)
        .collect();
    for id in top_level {
        if !placed.contains(&id) {
            place(script, id, &mut cursor, &mut placed)?;
        }
    }

    let orphans: Vec<Id> = script
        .functions
        .values()
        .rev()
        .filter(|f| f.inline && !placed.contains(&f.id))
        .map(|f| f.id)
        .collect();
    for id in orphans {
        if placed.contains(&id) {
            continue;
        }
        debug!(function = id, "placing inline function that nothing spawns");
        if let Some(f) = script.functions.get_mut(&id) {
            f.inline = false;
        }
        place(script, id, &mut cursor, &mut placed)?;
    }

    let code_end = cursor;
    for table in script.all_tables_mut() {
        table.length = u32::try_from(table.values.len()).map_err(|_| {
            CodecError::Internal(format!("table {} has too many values", table.id))
        })?;
        table.start_offset = cursor;
        advance(&mut cursor, table.payload_size())?;
    }
    debug!(code_end, tables_end = cursor, "offsets assigned");
    Ok(cursor)
}

fn place(
    script: &mut Script,
    id: Id,
    cursor: &mut u32,
    placed: &mut HashSet<Id>,
) -> CodecResult<()> {
    if !placed.insert(id) {
        return Err(CodecError::DoubleVisit(format!("function {id}")));
    }
    let function = script
        .functions
        .get_mut(&id)
        .ok_or_else(|| CodecError::UnknownSymbol(format!("function {id}")))?;
    function.code_start = *cursor;
    let steps: Vec<(usize, Option<Id>)> = function
        .instructions
        .iter()
        .map(|i| (instr::encoded_size(i), i.inlined_function()))
        .collect();

    for (size, spawned) in steps {
        advance(cursor, size)?;
        let Some(callee) = spawned else { continue };
        if placed.contains(&callee) {
            continue;
        }
        let target = script
            .functions
            .get_mut(&callee)
            .ok_or_else(|| CodecError::UnknownSymbol(format!("function {callee}")))?;
        target.inline = true;
        place(script, callee, cursor, placed)?;
    }

    if let Some(function) = script.functions.get_mut(&id) {
        function.code_end = *cursor;
    }
    Ok(())
}

/// Move the cursor past `size` bytes. Offsets are stored as u32 words.
fn advance(cursor: &mut u32, size: usize) -> CodecResult<()> {
    let at = *cursor;
    *cursor = u32::try_from(size)
        .ok()
        .and_then(|size| at.checked_add(size))
        .ok_or_else(|| CodecError::Internal(format!("code region overflows at {at:#x}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksm_types::instruction::Thread;
    use ksm_types::{Callee, Function, Instruction};

    fn spawn(callee: Id) -> Instruction {
        Instruction::Thread2(Thread {
            callee: Callee::Function(callee),
            take: vec![],
            give: vec![],
        })
    }

    #[test]
    fn functions_are_placed_in_reverse_declaration_order() {
        let mut script = Script::new();
        let mut a = Function::new(1);
        a.push(Instruction::Return);
        let mut b = Function::new(2);
        b.push(Instruction::Nop);
        b.push(Instruction::Return);
        script.add_function(a);
        script.add_function(b);

        assign_offsets(&mut script).unwrap();
        let b = &script.functions[&2];
        let a = &script.functions[&1];
        assert_eq!((b.code_start, b.code_end), (0, 8));
        assert_eq!((a.code_start, a.code_end), (8, 12));
    }

    #[test]
    fn spawned_function_follows_spawn() {
        let mut script = Script::new();
        let mut callee = Function::new(1);
        callee.push(Instruction::Nop);
        callee.push(Instruction::Return);
        let mut caller = Function::new(2);
        caller.push(spawn(1));
        caller.push(Instruction::Return);
        script.add_function(callee);
        script.add_function(caller);

        assign_offsets(&mut script).unwrap();
        let caller = &script.functions[&2];
        let callee = &script.functions[&1];
        assert!(callee.inline);
        // Thread2 with empty lists: opcode + 12 bytes
        assert_eq!(callee.code_start, 16);
        assert_eq!(callee.code_end, 24);
        assert_eq!((caller.code_start, caller.code_end), (0, 28));
    }

    #[test]
    fn orphan_inline_function_goes_last() {
        let mut script = Script::new();
        let mut orphan = Function::new(1);
        orphan.inline = true;
        orphan.push(Instruction::Return);
        let mut main = Function::new(2);
        main.push(Instruction::Return);
        script.add_function(main);
        script.add_function(orphan);

        assign_offsets(&mut script).unwrap();
        assert_eq!(script.functions[&2].code_start, 0);
        assert_eq!(script.functions[&1].code_start, 4);
        assert!(!script.functions[&1].inline);
    }

    #[test]
    fn tables_follow_code_with_aligned_payloads() {
        use ksm_types::{Table, TableValues};
        let mut script = Script::new();
        let mut f = Function::new(1);
        f.push(Instruction::Return);
        f.add_table(Table::new(0x20, TableValues::Byte(vec![1, 2, 3, 4, 5])));
        script.add_function(f);
        script.add_table(Table::new(0x10, TableValues::Int(vec![7])));

        let end = assign_offsets(&mut script).unwrap();
        assert_eq!(script.tables[&0x10].start_offset, 4);
        let local = &script.functions[&1].tables[&0x20];
        assert_eq!(local.start_offset, 4 + 12);
        assert_eq!(local.length, 5);
        assert_eq!(end, 16 + 16);
    }

    #[test]
    fn cursor_overflow_is_an_error() {
        let mut cursor = u32::MAX - 4;
        advance(&mut cursor, 4).unwrap();
        assert_eq!(cursor, u32::MAX);
        assert!(matches!(
            advance(&mut cursor, 4),
            Err(CodecError::Internal(_))
        ));
        assert_eq!(cursor, u32::MAX);
        let mut cursor = 8;
        assert!(advance(&mut cursor, u32::MAX as usize).is_err());
    }
}
