//! Scope chains for function bodies.
//!
//! A function spawned by `Thread`/`Thread2` before the layout pass reaches it
//! on its own is embedded in its spawner, and its code resolves names through
//! the spawner's scope as well as its own. The walk below follows the layout
//! order so that export and import agree with what a build then a parse
//! would see.

use indexmap::IndexMap;
use ksm_codec::Context;
use ksm_types::{Function, Id, Script};

/// Function id → ids of the functions whose scopes its code sees, outermost
/// first and ending with itself.
pub(crate) fn scope_chains(
    script: &Script,
    mut spawned: impl FnMut(&Function) -> Vec<Id>,
) -> IndexMap<Id, Vec<Id>> {
    let mut chains = IndexMap::new();
    let top_level = script.functions.values().rev().filter(|f| !f.inline);
    let orphans = script.functions.values().rev().filter(|f| f.inline);
    let order: Vec<Id> = top_level.chain(orphans).map(|f| f.id).collect();
    for id in order {
        if !chains.contains_key(&id) {
            walk(script, id, &[], &mut spawned, &mut chains);
        }
    }
    chains
}

fn walk(
    script: &Script,
    id: Id,
    parent: &[Id],
    spawned: &mut impl FnMut(&Function) -> Vec<Id>,
    chains: &mut IndexMap<Id, Vec<Id>>,
) {
    let Some(function) = script.functions.get(&id) else {
        return;
    };
    let mut chain = parent.to_vec();
    chain.push(id);
    chains.insert(id, chain.clone());
    for callee in spawned(function) {
        if !chains.contains_key(&callee) {
            walk(script, callee, &chain, spawned, chains);
        }
    }
}

/// A context with every function of `chain` pushed in order.
pub(crate) fn context_for<'s>(script: &'s Script, chain: &[Id]) -> Context<'s> {
    let mut ctx = Context::new(script);
    for id in chain {
        if let Some(function) = script.functions.get(id) {
            ctx = ctx.push(function);
        }
    }
    ctx
}
