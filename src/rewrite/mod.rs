// This module is the architecture-agnostic rewrite engine. A RuleSet is plain data: an
// ordered list of value rules and an ordered list of block rules, each a named function
// pointer that returns true when it changed the IR. The engine walks the function block by
// block; inside a block it applies value rules until the block stops changing, then gives
// the block rules one shot at the block's control; whole passes repeat until one of them
// changes nothing. Rules may create values through RewriteCtx, which schedules them in
// front of the value being rewritten so definitions keep preceding uses. A profile that is
// still changing the function after the configured number of passes is reported as an
// internal inconsistency: a terminating rule set cannot do that.

//! Generic rewrite engine.
//!
//! # Profiles
//!
//! - [`generic::GENERIC`]: machine independent simplification, run for every
//!   target.
//! - [`dec64::DEC64`]: decomposition of 64-bit integers into 32-bit halves,
//!   run only when [`crate::ir::Config::narrow_int64`] holds.
//!
//! [`deadcode::eliminate`] sweeps unused pure values and unreachable blocks
//! after the profiles have run.

pub mod dec64;
pub mod deadcode;
pub mod generic;

use crate::core::error::{CompileError, CompileResult};
use crate::ir::{Aux, BlockId, Function, Op, Type, ValueData, ValueId};
use log::{debug, trace};

/// Rewrites one value in place; returns whether anything changed.
pub type ValueRule = fn(&mut RewriteCtx<'_>, ValueId) -> bool;

/// Rewrites the control of one block; returns whether anything changed.
pub type BlockRule = fn(&mut Function, BlockId) -> bool;

/// A named rewrite rule.
#[derive(Clone, Copy)]
pub struct Rule<F> {
    pub name: &'static str,
    pub apply: F,
}

/// Which counter a rule set reports to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Generic,
    Dec64,
}

/// An ordered collection of block and value rules.
pub struct RuleSet {
    pub name: &'static str,
    pub profile: Profile,
    pub value_rules: &'static [Rule<ValueRule>],
    pub block_rules: &'static [Rule<BlockRule>],
}

/// Observable rewrite counters for one function.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    /// Times the machine independent profile ran.
    pub generic_invocations: usize,
    /// Times the 64-bit narrowing profile ran.
    pub dec64_invocations: usize,
    /// Whole-function passes over all profiles.
    pub passes: usize,
    pub rules_fired: usize,
    pub dead_values_removed: usize,
    pub dead_blocks_removed: usize,
}

impl RewriteStats {
    fn record(&mut self, profile: Profile) {
        match profile {
            Profile::Generic => self.generic_invocations += 1,
            Profile::Dec64 => self.dec64_invocations += 1,
        }
    }
}

/// Mutable view of a function handed to value rules.
pub struct RewriteCtx<'f> {
    pub func: &'f mut Function,
    block: BlockId,
    inserted: Vec<ValueId>,
}

impl<'f> RewriteCtx<'f> {
    pub fn new(func: &'f mut Function, block: BlockId) -> Self {
        Self {
            func,
            block,
            inserted: Vec::new(),
        }
    }

    pub fn value(&self, v: ValueId) -> &ValueData {
        self.func.value(v)
    }

    pub fn op(&self, v: ValueId) -> Op {
        self.func.value(v).op
    }

    pub fn ty(&self, v: ValueId) -> Type {
        self.func.value(v).ty
    }

    pub fn arg(&self, v: ValueId, idx: usize) -> ValueId {
        self.func.value(v).args[idx]
    }

    /// Immediate of a constant value.
    pub fn const_value(&self, v: ValueId) -> Option<i64> {
        let data = self.func.value(v);
        if data.op.is_const() {
            data.aux.int()
        } else {
            None
        }
    }

    pub fn big_endian(&self) -> bool {
        self.func.config.big_endian
    }

    /// Create a value scheduled right before the one being rewritten.
    pub fn new_value(&mut self, op: Op, ty: Type, args: &[ValueId], aux: Aux) -> ValueId {
        let v = self.func.alloc_value(self.block, op, ty, args, aux);
        self.inserted.push(v);
        v
    }

    /// Shorthand for a value whose type is fixed by its opcode.
    pub fn new_typed(&mut self, op: Op, args: &[ValueId]) -> ValueId {
        let ty = op.info().result.unwrap_or(Type::I32);
        self.new_value(op, ty, args, Aux::None)
    }

    /// Replace the operation of `v`, keeping its id and type.
    pub fn reset(&mut self, v: ValueId, op: Op, args: &[ValueId], aux: Aux) {
        let data = self.func.value_mut(v);
        data.op = op;
        data.args.clear();
        data.args.extend_from_slice(args);
        data.aux = aux;
    }

    /// Turn `v` into a constant of its own type.
    pub fn reset_const(&mut self, v: ValueId, c: i64) -> bool {
        let ty = self.ty(v);
        match Op::const_for(ty) {
            Some(op) => {
                self.reset(v, op, &[], Aux::Int(crate::ir::wrap_const(ty, c)));
                true
            }
            None => false,
        }
    }

    /// Turn `v` into a copy of `src`.
    pub fn reset_copy(&mut self, v: ValueId, src: ValueId) {
        self.reset(v, Op::Copy, &[src], Aux::None);
    }

    pub fn set_type(&mut self, v: ValueId, ty: Type) {
        self.func.value_mut(v).ty = ty;
    }

    fn take_inserted(&mut self) -> Vec<ValueId> {
        std::mem::take(&mut self.inserted)
    }
}

/// Apply value rules to one block until it stops changing.
fn rewrite_block_values(
    func: &mut Function,
    block: BlockId,
    rules: &RuleSet,
    limit: usize,
) -> CompileResult<usize> {
    let mut fired = 0;
    for _ in 0..limit {
        let mut changed = false;
        let mut idx = 0;
        while idx < func.block(block).values.len() {
            let v = func.block(block).values[idx];
            let mut ctx = RewriteCtx::new(func, block);
            let hit = rules.value_rules.iter().find(|rule| (rule.apply)(&mut ctx, v));
            let inserted = ctx.take_inserted();

            if let Some(rule) = hit {
                trace!("{}: {} rewrote {}", rules.name, rule.name, v);
                changed = true;
                fired += 1;
            }
            if !inserted.is_empty() {
                let n = inserted.len();
                func.block_mut(block).values.splice(idx..idx, inserted);
                idx += n;
            }
            idx += 1;
        }
        if !changed {
            return Ok(fired);
        }
    }
    Err(CompileError::internal(format!(
        "{}: value rules did not converge in {} of {} after {} rounds",
        rules.name, block, func.name, limit
    )))
}

/// Rewrite `func` with `rules` to a fixed point.
///
/// Returns the number of rules fired.
pub fn apply_rewrite(
    func: &mut Function,
    rules: &RuleSet,
    max_passes: usize,
    stats: &mut RewriteStats,
) -> CompileResult<usize> {
    stats.record(rules.profile);
    let mut fired = 0;

    for _ in 0..max_passes {
        stats.passes += 1;
        let mut changed = false;

        for block in func.block_order() {
            let n = rewrite_block_values(func, block, rules, max_passes)?;
            changed |= n > 0;
            fired += n;

            if let Some(rule) = rules.block_rules.iter().find(|rule| (rule.apply)(func, block)) {
                trace!("{}: {} rewrote {}", rules.name, rule.name, block);
                changed = true;
                fired += 1;
            }
        }

        if !changed {
            stats.rules_fired += fired;
            debug!("{}: {} reached a fixed point, {} rewrites", rules.name, func.name, fired);
            return Ok(fired);
        }
    }

    Err(CompileError::internal(format!(
        "rewrite profile {} did not reach a fixed point on {} within {} passes",
        rules.name, func.name, max_passes
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockKind, Function};

    fn flip_add_sub(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
        let args: Vec<ValueId> = ctx.value(v).args.to_vec();
        match ctx.op(v) {
            Op::Add64 => ctx.reset(v, Op::Sub64, &args, Aux::None),
            Op::Sub64 => ctx.reset(v, Op::Add64, &args, Aux::None),
            _ => return false,
        }
        true
    }

    static OSCILLATE: RuleSet = RuleSet {
        name: "oscillate",
        profile: Profile::Generic,
        value_rules: &[Rule {
            name: "flip_add_sub",
            apply: flip_add_sub,
        }],
        block_rules: &[],
    };

    fn widen_neg(ctx: &mut RewriteCtx<'_>, v: ValueId) -> bool {
        if ctx.op(v) != Op::Neg64 {
            return false;
        }
        let x = ctx.arg(v, 0);
        let zero = ctx.new_value(Op::Const64, Type::I64, &[], Aux::Int(0));
        ctx.reset(v, Op::Sub64, &[zero, x], Aux::None);
        true
    }

    static WIDEN: RuleSet = RuleSet {
        name: "widen",
        profile: Profile::Generic,
        value_rules: &[Rule {
            name: "widen_neg",
            apply: widen_neg,
        }],
        block_rules: &[],
    };

    #[test]
    fn test_non_terminating_rules_are_internal_errors() {
        let mut func = Function::new("f");
        let b0 = func.new_block(BlockKind::Ret);
        let x = func.new_value(b0, Op::Arg, Type::I64, &[], Aux::Int(0));
        let y = func.new_typed(b0, Op::Add64, &[x, x], Aux::None);
        func.set_control(b0, BlockKind::Ret, Some(y));

        let mut stats = RewriteStats::default();
        let err = apply_rewrite(&mut func, &OSCILLATE, 10, &mut stats).unwrap_err();
        assert!(err.is_internal());
        assert_eq!(stats.generic_invocations, 1);
    }

    #[test]
    fn test_inserted_values_precede_their_user() {
        let mut func = Function::new("f");
        let b0 = func.new_block(BlockKind::Ret);
        let x = func.new_value(b0, Op::Arg, Type::I64, &[], Aux::Int(0));
        let n = func.new_typed(b0, Op::Neg64, &[x], Aux::None);
        func.set_control(b0, BlockKind::Ret, Some(n));

        let mut stats = RewriteStats::default();
        let fired = apply_rewrite(&mut func, &WIDEN, 10, &mut stats).unwrap();
        assert_eq!(fired, 1);
        assert_eq!(func.block(b0).values.len(), 3);
        assert_eq!(func.block(b0).values[2], n);
        func.verify().unwrap();
    }
}
