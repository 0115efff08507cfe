//! Jump and label fixup, the second pass of a build.
//!
//! Runs after the code region has been emitted once, using the recorded end
//! offset of every instruction. All targets are word offsets relative to the
//! code region.
//!
//! - Label: the k-th `Label` marker of a function belongs to the k-th label
//!   record in reverse declaration order; its address is the marker's end.
//! - `If`/`ElseIf`: the end of the next `Else`/`ElseIf`/`EndIf` at the same
//!   depth, minus one word when that is the `EndIf`. `ElseIf` also stores the
//!   same target two words earlier as its skip target, unless it closes on the
//!   `EndIf`.
//! - `Else`: the end of the matching `EndIf`.
//! - `Switch`: entry is the end of its first `Case`, exit the end of its
//!   `EndSwitch`.
//! - `Case`/`Case2`: the end of the next case or the `EndSwitch`.
//! - `DoWhile`: the end of the matching `EndDoWhile`.

use ksm_types::{Function, Instruction, Opcode, Script};
use tracing::{debug, warn};

use crate::code::InstructionEnds;
use crate::config::CodecOptions;
use crate::error::{CodecError, CodecResult};

/// Rewrite label addresses and jump targets from emitted offsets.
pub fn apply_fixups(
    script: &mut Script,
    ends: &InstructionEnds,
    options: &CodecOptions,
) -> CodecResult<()> {
    for function in script.functions.values_mut().rev() {
        let Some(ends) = ends.get(&function.id) else {
            continue;
        };
        if ends.len() != function.instructions.len() {
            return Err(CodecError::Internal(format!(
                "function {} has {} instructions but {} recorded offsets",
                function.describe(),
                function.instructions.len(),
                ends.len()
            )));
        }
        fix_labels(function, ends, options)?;
        fix_jumps(function, ends);
    }
    Ok(())
}

/// Check that a function's `Label` markers and label records agree in number.
pub(crate) fn check_label_count(function: &Function, options: &CodecOptions) -> CodecResult<()> {
    let markers = function
        .instructions
        .iter()
        .filter(|i| matches!(i, Instruction::Label))
        .count();
    let records = function.labels.len();
    if markers == records {
        return Ok(());
    }
    if options.strict_labels {
        return Err(CodecError::malformed(
            function.code_start as usize,
            format!(
                "function {} has {markers} label markers but {records} labels",
                function.describe()
            ),
        ));
    }
    warn!(
        function = %function.describe(),
        markers,
        records,
        "label markers and label records disagree"
    );
    Ok(())
}

fn fix_labels(function: &mut Function, ends: &[u32], options: &CodecOptions) -> CodecResult<()> {
    check_label_count(function, options)?;
    let markers = function
        .instructions
        .iter()
        .zip(ends)
        .filter(|(i, _)| matches!(i, Instruction::Label))
        .map(|(_, end)| *end);
    for (label, end) in function.labels.values_mut().rev().zip(markers) {
        label.address = end / 4;
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Jumps
// ══════════════════════════════════════════════════════════════════════════════

/// Scan forward from `from` for the first instruction accepted by `stop` at
/// depth zero. `opens` raises the depth, `closes` lowers it.
fn scan(
    code: &[Instruction],
    from: usize,
    opens: Opcode,
    closes: Opcode,
    stop: impl Fn(Opcode) -> bool,
) -> Option<usize> {
    let mut depth = 0usize;
    for (index, instruction) in code.iter().enumerate().skip(from + 1) {
        let op = instruction.opcode();
        if depth == 0 && stop(op) {
            return Some(index);
        }
        if op == opens {
            depth += 1;
        } else if op == closes {
            depth = depth.saturating_sub(1);
        }
    }
    None
}

fn is_case(op: Opcode) -> bool {
    matches!(op, Opcode::Case | Opcode::Case2)
}

fn fix_jumps(function: &mut Function, ends: &[u32]) {
    let code = &function.instructions;
    let mut patches = Vec::new();

    for (index, instruction) in code.iter().enumerate() {
        let patch = match instruction {
            Instruction::If(_) | Instruction::ElseIf(_) => {
                scan(code, index, Opcode::If, Opcode::EndIf, |op| {
                    matches!(op, Opcode::Else | Opcode::ElseIf | Opcode::EndIf)
                })
                .map(|j| {
                    let closes = code[j].opcode() == Opcode::EndIf;
                    let t = if closes { ends[j].saturating_sub(4) } else { ends[j] };
                    let skip = if closes { t } else { t.saturating_sub(8) };
                    Patch::Branch {
                        target: t / 4,
                        skip: skip / 4,
                    }
                })
            }
            Instruction::Else(_) => scan(code, index, Opcode::If, Opcode::EndIf, |op| {
                op == Opcode::EndIf
            })
            .map(|j| Patch::Target(ends[j] / 4)),
            Instruction::Switch(_) => {
                let entry = scan(code, index, Opcode::Switch, Opcode::EndSwitch, is_case);
                let exit = scan(code, index, Opcode::Switch, Opcode::EndSwitch, |op| {
                    op == Opcode::EndSwitch
                });
                match (entry, exit) {
                    (Some(entry), Some(exit)) => Some(Patch::Switch {
                        entry: ends[entry] / 4,
                        exit: ends[exit] / 4,
                    }),
                    (None, Some(exit)) => Some(Patch::Switch {
                        entry: ends[exit] / 4,
                        exit: ends[exit] / 4,
                    }),
                    _ => None,
                }
            }
            Instruction::Case(_) | Instruction::Case2(_) => {
                scan(code, index, Opcode::Switch, Opcode::EndSwitch, |op| {
                    is_case(op) || op == Opcode::EndSwitch
                })
                .map(|j| Patch::Target(ends[j] / 4))
            }
            Instruction::DoWhile(_) => {
                scan(code, index, Opcode::DoWhile, Opcode::EndDoWhile, |op| {
                    op == Opcode::EndDoWhile
                })
                .map(|j| Patch::Target(ends[j] / 4))
            }
            _ => continue,
        };
        match patch {
            Some(patch) => patches.push((index, patch)),
            None => warn!(
                function = %function.describe(),
                index,
                opcode = %instruction.opcode(),
                "no matching block end, jump left unchanged"
            ),
        }
    }

    debug!(function = %function.describe(), jumps = patches.len(), "jumps fixed");
    for (index, patch) in patches {
        patch.apply(&mut function.instructions[index]);
    }
}

#[derive(Debug, Clone, Copy)]
enum Patch {
    Target(u32),
    Branch { target: u32, skip: u32 },
    Switch { entry: u32, exit: u32 },
}

impl Patch {
    fn apply(self, instruction: &mut Instruction) {
        match (self, instruction) {
            (Patch::Branch { target, .. }, Instruction::If(i)) => i.target = target,
            (Patch::Branch { target, skip }, Instruction::ElseIf(e)) => {
                e.target = target;
                e.skip_target = skip;
            }
            (Patch::Target(target), Instruction::Else(e)) => e.target = target,
            (Patch::Target(target), Instruction::Case(c) | Instruction::Case2(c)) => {
                c.target = target
            }
            (Patch::Target(target), Instruction::DoWhile(d)) => d.target = target,
            (Patch::Switch { entry, exit }, Instruction::Switch(s)) => {
                s.entry = entry;
                s.exit = exit;
            }
            _ => {}
        }
    }
}
