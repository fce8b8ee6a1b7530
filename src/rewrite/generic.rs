//! Machine independent simplification rules.

use super::{Profile, RewriteCtx, Rule, RuleSet};
use crate::ir::{wrap_const, Aux, BlockId, BlockKind, Function, Op, ValueId};

pub static GENERIC: RuleSet = RuleSet {
    name: "generic",
    profile: Profile::Generic,
    value_rules: &[
        Rule { name: "forward_copies", apply: forward_copies },
        Rule { name: "fold_constants", apply: fold_constants },
        Rule { name: "algebraic_identities", apply: algebraic_identities },
    ],
    block_rules: &[
        Rule { name: "forward_control_copy", apply: forward_control_copy },
        Rule { name: "fold_constant_branch", apply: fold_constant_branch },
        Rule { name: "branch_on_not", apply: branch_on_not },
    ],
};

/// Replace arguments that are copies with the copied value.
pub(crate) fn forward_copies(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    let mut changed = false;
    for i in 0..ctx.value(v).args.len() {
        let arg = ctx.arg(v, i);
        if ctx.op(arg) == Op::Copy {
            let src = ctx.arg(arg, 0);
            ctx.func.value_mut(v).args[i] = src;
            changed = true;
        }
    }
    changed
}

fn fold_binary(op: Op, a: i64, b: i64) -> Option<i64> {
    use Op::*;
    Some(match op {
        Add32 | Add64 => a.wrapping_add(b),
        Sub32 | Sub64 => a.wrapping_sub(b),
        Mul32 | Mul64 => a.wrapping_mul(b),
        And32 | And64 => a & b,
        Or32 | Or64 => a | b,
        Xor32 | Xor64 => a ^ b,
        Eq32 => (a as i32 == b as i32) as i64,
        Eq64 => (a == b) as i64,
        Neq32 => (a as i32 != b as i32) as i64,
        Neq64 => (a != b) as i64,
        Less32 => ((a as i32) < b as i32) as i64,
        Less64 => (a < b) as i64,
        Less32U => ((a as u32) < b as u32) as i64,
        AndB => ((a != 0) && (b != 0)) as i64,
        OrB => ((a != 0) || (b != 0)) as i64,
        _ => return None,
    })
}

fn fold_constants(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    let data = ctx.value(v);
    let op = data.op;
    let folded = match data.args.as_slice() {
        [x] => match (op, ctx.const_value(*x)) {
            (Op::Neg32 | Op::Neg64, Some(c)) => Some(c.wrapping_neg()),
            (Op::Not, Some(c)) => Some((c == 0) as i64),
            _ => None,
        },
        [x, y] => match (ctx.const_value(*x), ctx.const_value(*y)) {
            (Some(a), Some(b)) => fold_binary(op, a, b),
            _ => None,
        },
        _ => None,
    };
    match folded {
        Some(c) => ctx.reset_const(v, wrap_const(ctx.ty(v), c)),
        None => false,
    }
}

fn algebraic_identities(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    use Op::*;
    let data = ctx.value(v);
    let op = data.op;
    let [x, y] = match data.args.as_slice() {
        [x, y] => [*x, *y],
        _ => return false,
    };
    let (cx, cy) = (ctx.const_value(x), ctx.const_value(y));

    match op {
        Add32 | Add64 | Or32 | Or64 | Xor32 | Xor64 if cy == Some(0) => ctx.reset_copy(v, x),
        Add32 | Add64 | Or32 | Or64 | Xor32 | Xor64 if cx == Some(0) => ctx.reset_copy(v, y),
        Sub32 | Sub64 if cy == Some(0) => ctx.reset_copy(v, x),
        Mul32 | Mul64 if cy == Some(1) => ctx.reset_copy(v, x),
        Mul32 | Mul64 if cx == Some(1) => ctx.reset_copy(v, y),
        Mul32 | Mul64 | And32 | And64 if cx == Some(0) || cy == Some(0) => {
            return ctx.reset_const(v, 0);
        }
        Sub32 | Sub64 | Xor32 | Xor64 if x == y => return ctx.reset_const(v, 0),
        And32 | And64 | Or32 | Or64 if x == y => ctx.reset_copy(v, x),
        _ => return false,
    }
    true
}

fn forward_control_copy(func: &mut Function, block: BlockId) -> bool {
    match func.block(block).control {
        Some(c) if func.value(c).op == Op::Copy => {
            let src = func.value(c).args[0];
            func.block_mut(block).control = Some(src);
            true
        }
        _ => false,
    }
}

/// An `If` on a constant only ever takes one edge.
fn fold_constant_branch(func: &mut Function, block: BlockId) -> bool {
    let b = func.block(block);
    if b.kind != BlockKind::If {
        return false;
    }
    let Some(c) = b.control else {
        return false;
    };
    let cond = func.value(c);
    if cond.op != Op::ConstBool {
        return false;
    }
    let taken = cond.aux != Aux::Int(0);

    let b = func.block_mut(block);
    if !taken {
        b.succs.swap(0, 1);
    }
    b.kind = BlockKind::First;
    b.control = None;
    true
}

fn branch_on_not(func: &mut Function, block: BlockId) -> bool {
    let b = func.block(block);
    if b.kind != BlockKind::If {
        return false;
    }
    let Some(c) = b.control else {
        return false;
    };
    if func.value(c).op != Op::Not {
        return false;
    }
    let inner = func.value(c).args[0];

    let b = func.block_mut(block);
    b.control = Some(inner);
    b.succs.swap(0, 1);
    true
}
