// This module decomposes 64-bit integer values for targets whose native integer is 32 bits
// wide. Every 64-bit value becomes an Int64Make(hi, lo) of two 32-bit values; users reach the
// halves through Int64Hi/Int64Lo projections, which fold away once their argument has been
// decomposed. Arithmetic goes through the carry-producing 32-bit ops, comparisons combine
// the comparisons of the halves, and memory accesses are split into two 4-byte accesses laid
// out according to the target's endianness. The profile never runs on 64-bit targets or on
// targets excluded from narrowing.

//! 64-bit integer narrowing rules.

use super::generic::forward_copies;
use super::{Profile, RewriteCtx, Rule, RuleSet};
use crate::ir::{Aux, BlockId, Function, Op, Type, ValueId};

pub static DEC64: RuleSet = RuleSet {
    name: "dec64",
    profile: Profile::Dec64,
    value_rules: &[
        Rule { name: "forward_copies", apply: forward_copies },
        Rule { name: "fold_projections", apply: fold_projections },
        Rule { name: "split_leaves", apply: split_leaves },
        Rule { name: "split_memory", apply: split_memory },
        Rule { name: "split_arith", apply: split_arith },
        Rule { name: "split_compare", apply: split_compare },
    ],
    block_rules: &[Rule { name: "forward_control_copy", apply: forward_control_copy }],
};

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

/// High and low halves of a 64-bit argument.
fn halves(ctx: &mut RewriteCtx<'_>, x: ValueId) -> (ValueId, ValueId) {
    let hi = ctx.new_typed(Op::Int64Hi, &[x]);
    let lo = ctx.new_typed(Op::Int64Lo, &[x]);
    (hi, lo)
}

/// Byte offsets of the (high, low) words of a 64-bit value in memory.
fn word_offsets(ctx: &RewriteCtx<'_>, base: i64) -> (i64, i64) {
    if ctx.big_endian() {
        (base, base + 4)
    } else {
        (base + 4, base)
    }
}

fn is_wide(ctx: &RewriteCtx<'_>, v: ValueId) -> bool {
    ctx.ty(v) == Type::I64
}

fn fold_projections(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    let idx = match ctx.op(v) {
        Op::Int64Hi => 0,
        Op::Int64Lo => 1,
        _ => return false,
    };
    let x = ctx.arg(v, 0);
    if ctx.op(x) != Op::Int64Make {
        return false;
    }
    let half = ctx.arg(x, idx);
    ctx.reset_copy(v, half);
    true
}

fn split_leaves(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    if !is_wide(ctx, v) {
        return false;
    }
    match ctx.op(v) {
        Op::Const64 => {
            let Some(c) = ctx.const_value(v) else {
                return false;
            };
            let hi = ctx.new_value(Op::Const32, Type::I32, &[], Aux::Int((c >> 32) as i32 as i64));
            let lo = ctx.new_value(Op::Const32, Type::I32, &[], Aux::Int(c as i32 as i64));
            ctx.reset(v, Op::Int64Make, &[hi, lo], Aux::None);
            true
        }
        Op::Arg => {
            let Some(base) = ctx.value(v).aux.int() else {
                return false;
            };
            let (hi_off, lo_off) = word_offsets(ctx, base);
            let hi = ctx.new_value(Op::Arg, Type::I32, &[], Aux::Int(hi_off));
            let lo = ctx.new_value(Op::Arg, Type::I32, &[], Aux::Int(lo_off));
            ctx.reset(v, Op::Int64Make, &[hi, lo], Aux::None);
            true
        }
        _ => false,
    }
}

fn split_memory(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    match ctx.op(v) {
        Op::Load if is_wide(ctx, v) => {
            let ptr = ctx.arg(v, 0);
            let (hi_off, lo_off) = word_offsets(ctx, 0);
            let hi_ptr = ctx.new_value(Op::OffPtr, Type::Ptr, &[ptr], Aux::Int(hi_off));
            let lo_ptr = ctx.new_value(Op::OffPtr, Type::Ptr, &[ptr], Aux::Int(lo_off));
            let hi = ctx.new_value(Op::Load, Type::I32, &[hi_ptr], Aux::None);
            let lo = ctx.new_value(Op::Load, Type::I32, &[lo_ptr], Aux::None);
            ctx.reset(v, Op::Int64Make, &[hi, lo], Aux::None);
            true
        }
        Op::Store => {
            let ptr = ctx.arg(v, 0);
            let val = ctx.arg(v, 1);
            if !is_wide(ctx, val) {
                return false;
            }
            let (hi, lo) = halves(ctx, val);
            let (hi_off, lo_off) = word_offsets(ctx, 0);
            let hi_ptr = ctx.new_value(Op::OffPtr, Type::Ptr, &[ptr], Aux::Int(hi_off));
            let lo_ptr = ctx.new_value(Op::OffPtr, Type::Ptr, &[ptr], Aux::Int(lo_off));
            ctx.new_value(Op::Store, Type::Void, &[lo_ptr, lo], Aux::None);
            ctx.reset(v, Op::Store, &[hi_ptr, hi], Aux::None);
            true
        }
        _ => false,
    }
}

fn split_arith(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    let op = ctx.op(v);
    let (hi, lo) = match op {
        Op::Neg64 => {
            // -x == 0 - x
            let x = ctx.arg(v, 0);
            let zero = ctx.new_value(Op::Const64, Type::I64, &[], Aux::Int(0));
            ctx.reset(v, Op::Sub64, &[zero, x], Aux::None);
            return true;
        }
        Op::Add64 | Op::Sub64 => {
            let (x, y) = (ctx.arg(v, 0), ctx.arg(v, 1));
            let (xh, xl) = halves(ctx, x);
            let (yh, yl) = halves(ctx, y);
            let (carry_op, with_op) = if op == Op::Add64 {
                (Op::Add32Carry, Op::Add32WithCarry)
            } else {
                (Op::Sub32Carry, Op::Sub32WithBorrow)
            };
            let pair = ctx.new_typed(carry_op, &[xl, yl]);
            let lo = ctx.new_typed(Op::Select0, &[pair]);
            let carry = ctx.new_typed(Op::Select1, &[pair]);
            let hi = ctx.new_typed(with_op, &[xh, yh, carry]);
            (hi, lo)
        }
        Op::And64 | Op::Or64 | Op::Xor64 => {
            let narrow = match op {
                Op::And64 => Op::And32,
                Op::Or64 => Op::Or32,
                _ => Op::Xor32,
            };
            let (x, y) = (ctx.arg(v, 0), ctx.arg(v, 1));
            let (xh, xl) = halves(ctx, x);
            let (yh, yl) = halves(ctx, y);
            let hi = ctx.new_typed(narrow, &[xh, yh]);
            let lo = ctx.new_typed(narrow, &[xl, yl]);
            (hi, lo)
        }
        Op::Mul64 => {
            // hi = xl*yh + xh*yl + hmul(xl, yl), lo = xl*yl
            let (x, y) = (ctx.arg(v, 0), ctx.arg(v, 1));
            let (xh, xl) = halves(ctx, x);
            let (yh, yl) = halves(ctx, y);
            let cross1 = ctx.new_typed(Op::Mul32, &[xl, yh]);
            let cross2 = ctx.new_typed(Op::Mul32, &[xh, yl]);
            let high = ctx.new_typed(Op::Hmul32u, &[xl, yl]);
            let partial = ctx.new_typed(Op::Add32, &[cross2, high]);
            let hi = ctx.new_typed(Op::Add32, &[cross1, partial]);
            let lo = ctx.new_typed(Op::Mul32, &[xl, yl]);
            (hi, lo)
        }
        _ => return false,
    };
    ctx.reset(v, Op::Int64Make, &[hi, lo], Aux::None);
    true
}

fn split_compare(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
    let op = ctx.op(v);
    if !matches!(op, Op::Eq64 | Op::Neq64 | Op::Less64) {
        return false;
    }
    let (x, y) = (ctx.arg(v, 0), ctx.arg(v, 1));
    let (xh, xl) = halves(ctx, x);
    let (yh, yl) = halves(ctx, y);

    match op {
        Op::Eq64 => {
            let h = ctx.new_typed(Op::Eq32, &[xh, yh]);
            let l = ctx.new_typed(Op::Eq32, &[xl, yl]);
            ctx.reset(v, Op::AndB, &[h, l], Aux::None);
        }
        Op::Neq64 => {
            let h = ctx.new_typed(Op::Neq32, &[xh, yh]);
            let l = ctx.new_typed(Op::Neq32, &[xl, yl]);
            ctx.reset(v, Op::OrB, &[h, l], Aux::None);
        }
        _ => {
            // x < y  <=>  xh < yh || (xh == yh && xl <u yl)
            let less_hi = ctx.new_typed(Op::Less32, &[xh, yh]);
            let eq_hi = ctx.new_typed(Op::Eq32, &[xh, yh]);
            let less_lo = ctx.new_typed(Op::Less32U, &[xl, yl]);
            let tie = ctx.new_typed(Op::AndB, &[eq_hi, less_lo]);
            ctx.reset(v, Op::OrB, &[less_hi, tie], Aux::None);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_module, Config};
    use crate::rewrite::{apply_rewrite, deadcode, RewriteStats};

    fn mips_config(big_endian: bool) -> Config {
        Config {
            target: if big_endian { "mips" } else { "mipsle" },
            ptr_size: 4,
            reg_size: 4,
            int_size: 4,
            big_endian,
            narrow_excluded: false,
        }
    }

    fn narrow(text: &str, big_endian: bool) -> Function {
        let mut func = parse_module(text).unwrap().remove(0);
        func.config = mips_config(big_endian);
        let mut stats = RewriteStats::default();
        apply_rewrite(&mut func, &DEC64, 100, &mut stats).unwrap();
        deadcode::eliminate(&mut func, &mut stats);
        assert_eq!(stats.dec64_invocations, 1);
        func.verify().unwrap();
        func
    }

    fn live_ops(func: &Function) -> Vec<Op> {
        func.block_order()
            .into_iter()
            .flat_map(|b| func.block(b).values.clone())
            .map(|v| func.value(v).op)
            .collect()
    }

    #[test]
    fn test_add64_uses_carry_chain() {
        let func = narrow(
            "func f {\nb0:\n  x = arg.i64 $0\n  y = arg.i64 $8\n  s = add64 x y\n  ret s\n}",
            true,
        );
        let ops = live_ops(&func);
        assert!(ops.contains(&Op::Add32Carry));
        assert!(ops.contains(&Op::Add32WithCarry));
        assert!(!ops.contains(&Op::Add64));
        assert!(!ops.contains(&Op::Int64Hi));
        assert!(!ops.contains(&Op::Int64Lo));

        for v in func.block(BlockId(0)).values.iter() {
            let data = func.value(*v);
            if data.op != Op::Int64Make {
                assert_ne!(data.ty, Type::I64, "{v} ({}) is still 64 bits wide", data.op);
            }
        }
        let ret = func.block(BlockId(0)).control.unwrap();
        assert_eq!(func.value(ret).op, Op::Int64Make);
    }

    #[test]
    fn test_arg_halves_follow_endianness() {
        let text = "func f {\nb0:\n  x = arg.i64 $8\n  ret x\n}";
        for (big, hi_off, lo_off) in [(true, 8, 12), (false, 12, 8)] {
            let func = narrow(text, big);
            let make = func.value(func.block(BlockId(0)).control.unwrap());
            assert_eq!(make.op, Op::Int64Make);
            assert_eq!(func.value(make.args[0]).aux, Aux::Int(hi_off));
            assert_eq!(func.value(make.args[1]).aux, Aux::Int(lo_off));
        }
    }

    #[test]
    fn test_constant_split() {
        let func = narrow(
            "func f {\nb0:\n  c = const64 $0x123456789\n  ret c\n}",
            false,
        );
        let make = func.value(func.block(BlockId(0)).control.unwrap());
        assert_eq!(func.value(make.args[0]).aux, Aux::Int(1));
        assert_eq!(func.value(make.args[1]).aux, Aux::Int(0x23456789));
    }

    #[test]
    fn test_compare_becomes_boolean_combination() {
        let func = narrow(
            "func f {\nb0:\n  x = arg.i64 $0\n  y = arg.i64 $8\n  c = less64 x y\n  ret c\n}",
            true,
        );
        let ops = live_ops(&func);
        assert!(ops.contains(&Op::Less32U));
        assert!(ops.contains(&Op::OrB));
        assert!(!ops.contains(&Op::Less64));
    }

    #[test]
    fn test_store_is_split_in_two() {
        let func = narrow(
            "func f {\n  slot v 8 8\nb0:\n  p = localaddr %v\n  x = arg.i64 $0\n  store p x\n  ret\n}",
            false,
        );
        let stores = live_ops(&func).into_iter().filter(|op| *op == Op::Store).count();
        assert_eq!(stores, 2);
    }
}
