//! Expression engine.
//!
//! An expression is a stream of words terminated by [`EXPR_END`]. Each word is
//! an operator code, the [`CALL_START`] marker followed by a nested call, or a
//! symbol id resolved through the [`Context`]. The operator lookup runs before
//! symbol resolution.

use ksm_types::opcode::{CALL_END, CALL_START, EXPR_END};
use ksm_types::{Call, CallArg, Expression, Ref, Token};

use crate::context::Context;
use crate::cursor::{Reader, Writer};
use crate::error::CodecResult;

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

pub fn decode(r: &mut Reader<'_>, ctx: &mut Context<'_>) -> CodecResult<Expression> {
    let first = r.read_u32()?;
    decode_from_first(first, r, ctx)
}

/// Decode an expression whose first word has already been read.
pub fn decode_from_first(
    first: u32,
    r: &mut Reader<'_>,
    ctx: &mut Context<'_>,
) -> CodecResult<Expression> {
    let mut expr = Expression::default();
    let mut word = first;
    while word != EXPR_END {
        let token = if word == CALL_START {
            ctx.clear_constant();
            Token::Call(Box::new(decode_call(r, ctx, false)?))
        } else if let Some(op) = ctx.intrinsic(word) {
            Token::Operator(op)
        } else {
            Token::Symbol(ctx.resolve(Ref::Id(word))?)
        };
        expr.push(token);
        word = r.read_u32()?;
    }
    Ok(expr)
}

pub fn encode(w: &mut Writer, ctx: &Context<'_>, expr: &Expression) -> CodecResult<()> {
    for token in &expr.tokens {
        match token {
            Token::Symbol(symbol) => w.write_u32(ctx.check(*symbol)?),
            Token::Operator(op) => w.write_u32(op.code()),
            Token::Call(call) => {
                w.write_u32(CALL_START);
                encode_call(w, ctx, call, false)?;
            }
        }
    }
    w.write_u32(EXPR_END);
    Ok(())
}

/// Encoded size in bytes, terminator included.
pub fn size(expr: &Expression) -> usize {
    let tokens: usize = expr
        .tokens
        .iter()
        .map(|token| match token {
            Token::Symbol(_) | Token::Operator(_) => 4,
            Token::Call(call) => 4 + call_size(call, false),
        })
        .sum();
    tokens + 4
}

// ══════════════════════════════════════════════════════════════════════════════
// Call payloads
// ══════════════════════════════════════════════════════════════════════════════
//
// callee id, arguments, CALL_END. With `constant` every argument is a bare
// symbol id; otherwise every argument is an expression. Nested calls always
// use the expression form.

pub fn decode_call(
    r: &mut Reader<'_>,
    ctx: &mut Context<'_>,
    constant: bool,
) -> CodecResult<Call> {
    let callee = ctx.callee(Ref::Id(r.read_u32()?))?;
    let mut args = Vec::new();
    loop {
        let word = r.read_u32()?;
        if word == CALL_END {
            break;
        }
        let arg = if constant {
            CallArg::Symbol(ctx.resolve(Ref::Id(word))?)
        } else {
            CallArg::Expr(decode_from_first(word, r, ctx)?)
        };
        args.push(arg);
    }
    Ok(Call::new(callee, args))
}

pub fn encode_call(
    w: &mut Writer,
    ctx: &Context<'_>,
    call: &Call,
    constant: bool,
) -> CodecResult<()> {
    w.write_u32(ctx.check(call.callee.into())?);
    for arg in &call.args {
        match (arg, constant) {
            (CallArg::Symbol(symbol), true) => w.write_u32(ctx.check(*symbol)?),
            (CallArg::Symbol(symbol), false) => {
                w.write_u32(ctx.check(*symbol)?);
                w.write_u32(EXPR_END);
            }
            (CallArg::Expr(expr), _) => encode(w, ctx, expr)?,
        }
    }
    w.write_u32(CALL_END);
    Ok(())
}

pub fn call_size(call: &Call, constant: bool) -> usize {
    let args: usize = call
        .args
        .iter()
        .map(|arg| match (arg, constant) {
            (CallArg::Symbol(_), true) => 4,
            (CallArg::Symbol(_), false) => 8,
            (CallArg::Expr(expr), _) => size(expr),
        })
        .sum();
    4 + args + 4
}
