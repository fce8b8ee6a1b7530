//! mips value and block lowering.
//!
//! Only 32-bit values reach this point on a narrowing target. An `Int64Make` that survives
//! rewriting is consumed directly by a return; anything else still 64 bits wide is a
//! lowering failure.

use super::names::{Mnemonic, ARG_REGS, REGRET0, REGRET1, REGSP, REGZERO, REG_HI};
use super::{MipsBackend, FIXED_FRAME};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BlockId, BlockKind, Op, Type, ValueId};
use crate::isa::{LowerBackend, LowerCtx, Operand, Reg};

fn load(ty: Type) -> Mnemonic {
    match ty {
        Type::Bool => Mnemonic::MOVBU,
        Type::I8 => Mnemonic::MOVB,
        Type::I16 => Mnemonic::MOVH,
        _ => Mnemonic::MOVW,
    }
}

fn store(size: u64) -> Mnemonic {
    match size {
        1 => Mnemonic::MOVB,
        2 => Mnemonic::MOVH,
        _ => Mnemonic::MOVW,
    }
}

fn alu(op: Op) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match op {
        Op::Add32 => ADDU,
        Op::Sub32 => SUBU,
        Op::Mul32 => MUL,
        Op::And32 | Op::AndB => AND,
        Op::Or32 | Op::OrB => OR,
        Op::Xor32 => XOR,
        _ => return None,
    })
}

fn zero() -> Operand {
    Operand::phys(REGZERO)
}

pub(super) fn lower_value(ctx: &mut LowerCtx<'_, '_>, v: ValueId) -> CompileResult<()> {
    let value = ctx.value(v);
    let ptr_size = ctx.config().ptr_size;
    if value.ty == Type::I64 && value.op != Op::Int64Make {
        return Err(ctx.unsupported(v));
    }
    let r = ctx.reg(v);

    match value.op {
        Op::Arg => {
            let off = value.aux.int().unwrap_or(0);
            ctx.emit(load(value.ty), [Operand::Param(off), r]);
        }
        Op::Const8 | Op::Const16 | Op::Const32 | Op::ConstBool => {
            match value.aux.int().unwrap_or(0) {
                0 => ctx.emit(Mnemonic::MOVW, [zero(), r]),
                c => ctx.emit(Mnemonic::MOVW, [Operand::Imm(c), r]),
            }
        }
        Op::Copy => {
            let src = ctx.reg(value.args[0]);
            ctx.emit_move(v, Mnemonic::MOVW, [src, r]);
        }
        op if alu(op).is_some() => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            if let Some(m) = alu(op) {
                ctx.emit(m, [y, x, r]);
            }
        }
        Op::Neg32 => {
            let x = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::SUBU, [x, zero(), r]);
        }
        Op::Eq32 => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            ctx.emit(Mnemonic::XOR, [y, x, r.clone()]);
            ctx.emit(Mnemonic::SGTU, [Operand::Imm(1), r.clone(), r]);
        }
        Op::Neq32 => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            ctx.emit(Mnemonic::XOR, [y, x, r.clone()]);
            ctx.emit(Mnemonic::SGTU, [zero(), r.clone(), r]);
        }
        Op::Less32 | Op::Less32U => {
            // x < y is y > x
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            let sgt = if value.op == Op::Less32 {
                Mnemonic::SGT
            } else {
                Mnemonic::SGTU
            };
            ctx.emit(sgt, [x, y, r]);
        }
        Op::Not => {
            let x = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::XOR, [Operand::Imm(1), x, r]);
        }
        Op::LocalAddr => {
            let slot = value.aux.slot().ok_or_else(|| ctx.unsupported(v))?;
            let off = FIXED_FRAME + ctx.slot_offset(slot)?;
            ctx.emit(Mnemonic::ADDU, [Operand::Imm(off), Operand::phys(REGSP), r]);
        }
        Op::Addr => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            ctx.emit(
                Mnemonic::MOVW,
                [
                    Operand::SymAddr {
                        name: name.to_string(),
                        offset: 0,
                    },
                    r,
                ],
            );
        }
        Op::OffPtr => {
            let off = value.aux.int().unwrap_or(0);
            let base = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::ADDU, [Operand::Imm(off), base, r]);
        }
        Op::Load => {
            let base = Reg::Virt(value.args[0].0);
            ctx.emit(load(value.ty), [Operand::Mem { base, offset: 0 }, r]);
        }
        Op::Store => {
            let base = Reg::Virt(value.args[0].0);
            let src = value.args[1];
            let width = ctx.value(src).ty.size(ptr_size);
            ctx.emit(store(width), [ctx.reg(src), Operand::Mem { base, offset: 0 }]);
        }
        Op::VarZero => {
            let slot = value.aux.slot().ok_or_else(|| ctx.unsupported(v))?;
            MipsBackend.zero_auto(ctx.em, &ctx.func.frame, slot)?;
        }
        Op::StaticCall => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            let wide_arg = value.args.iter().any(|a| ctx.value(*a).ty == Type::I64);
            if wide_arg || value.args.len() > ARG_REGS.len() {
                return Err(ctx.unsupported(v));
            }
            for (arg, &reg) in value.args.iter().zip(ARG_REGS) {
                ctx.emit(Mnemonic::MOVW, [ctx.reg(*arg), Operand::phys(reg)]);
            }
            ctx.emit(
                Mnemonic::CALL,
                [Operand::Sym {
                    name: name.to_string(),
                    offset: 0,
                }],
            );
            if value.ty != Type::Void {
                ctx.emit(Mnemonic::MOVW, [Operand::phys(REGRET0), r]);
            }
        }
        // The sum or difference lands in the tuple's register; Select1 recomputes the
        // carry from it.
        Op::Add32Carry | Op::Sub32Carry => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            let m = if value.op == Op::Add32Carry {
                Mnemonic::ADDU
            } else {
                Mnemonic::SUBU
            };
            ctx.emit(m, [y, x, r]);
        }
        Op::Select0 => {
            let pair = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::MOVW, [pair, r]);
        }
        Op::Select1 => {
            let pair = value.args[0];
            let tuple = ctx.value(pair);
            let x = ctx.reg(tuple.args[0]);
            match tuple.op {
                // carry out of x + y: x > sum
                Op::Add32Carry => ctx.emit(Mnemonic::SGTU, [ctx.reg(pair), x, r]),
                // borrow out of x - y: y > x
                Op::Sub32Carry => ctx.emit(Mnemonic::SGTU, [x, ctx.reg(tuple.args[1]), r]),
                _ => return Err(ctx.unsupported(v)),
            }
        }
        Op::Add32WithCarry | Op::Sub32WithBorrow => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            let c = ctx.reg(value.args[2]);
            let m = if value.op == Op::Add32WithCarry {
                Mnemonic::ADDU
            } else {
                Mnemonic::SUBU
            };
            ctx.emit(m, [y, x, r.clone()]);
            ctx.emit(m, [c, r.clone(), r]);
        }
        Op::Hmul32u => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            ctx.emit(Mnemonic::MULU, [y, x]);
            ctx.emit(Mnemonic::MOVW, [Operand::phys(REG_HI), r]);
        }
        // Consumed by the return that uses it
        Op::Int64Make => {}
        _ => return Err(ctx.unsupported(v)),
    }
    Ok(())
}

pub(super) fn lower_block(
    ctx: &mut LowerCtx<'_, '_>,
    block: BlockId,
    next: Option<BlockId>,
) -> CompileResult<()> {
    let func = ctx.func;
    let b = func.block(block);
    match b.kind {
        BlockKind::Plain | BlockKind::First => {
            if Some(b.succs[0]) != next {
                ctx.emit(Mnemonic::JMP, [Operand::Label(b.succs[0])]);
            }
        }
        BlockKind::If => {
            let Some(c) = b.control else {
                return Err(CompileError::internal(format!(
                    "if block {block} has no condition"
                )));
            };
            let cond = ctx.reg(c);
            let (yes, no) = (b.succs[0], b.succs[1]);
            if next == Some(yes) {
                ctx.emit(Mnemonic::BEQ, [cond, zero(), Operand::Label(no)]);
            } else if next == Some(no) {
                ctx.emit(Mnemonic::BNE, [cond, zero(), Operand::Label(yes)]);
            } else {
                ctx.emit(Mnemonic::BNE, [cond, zero(), Operand::Label(yes)]);
                ctx.emit(Mnemonic::JMP, [Operand::Label(no)]);
            }
        }
        BlockKind::Ret => {
            if let Some(c) = b.control {
                let value = ctx.value(c);
                if value.op == Op::Int64Make {
                    let (hi, lo) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
                    let (first, second) = if ctx.config().big_endian {
                        (hi, lo)
                    } else {
                        (lo, hi)
                    };
                    ctx.emit(Mnemonic::MOVW, [first, Operand::phys(REGRET0)]);
                    ctx.emit(Mnemonic::MOVW, [second, Operand::phys(REGRET1)]);
                } else if value.ty == Type::I64 {
                    return Err(ctx.unsupported(c));
                } else {
                    ctx.emit(Mnemonic::MOVW, [ctx.reg(c), Operand::phys(REGRET0)]);
                }
            }
            ctx.emit(Mnemonic::RET, []);
        }
        BlockKind::Exit => ctx.emit(Mnemonic::UNDEF, []),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::core::test_utils::{compile_text, try_compile_text};
    use crate::core::CompileError;

    const ADD64: &str =
        "func f {\nb0:\n  x = arg.i64 $0\n  y = arg.i64 $8\n  s = add64 x y\n  ret s\n}";

    #[test]
    fn test_wide_add_uses_carry_chain() {
        let out = compile_text("mips", ADD64);
        let ops = out.mnemonics();
        assert!(ops.contains(&"SGTU"));
        assert_eq!(ops.iter().filter(|m| **m == "ADDU").count(), 3);
        assert!(out.listing().ends_with("R3\nRET\n"));
        assert_eq!(out.rewrite.dec64_invocations, 1);
    }

    #[test]
    fn test_result_register_order_follows_endianness() {
        let text = "func f {\nb0:\n  x = arg.i64 $0\n  ret x\n}";
        let be = compile_text("mips", text).listing();
        let le = compile_text("mipsle", text).listing();
        // big endian: high word at 0(FP) is returned in R2
        assert!(be.contains("MOVW\t0(FP), v"));
        let be_tail: Vec<&str> = be.lines().rev().take(3).collect();
        let le_tail: Vec<&str> = le.lines().rev().take(3).collect();
        assert_ne!(be_tail, le_tail);
        assert!(be_tail[2].ends_with("R2") && le_tail[2].ends_with("R2"));
    }

    #[test]
    fn test_unsplittable_wide_value_fails() {
        let err = try_compile_text(
            "mips",
            "func f {\nb0:\n  z = call.i64 @g\n  ret z\n}",
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::LoweringFailure { target: "mips", .. }));
    }
}
