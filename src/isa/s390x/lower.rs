//! s390x value and block lowering.

use super::names::{Mnemonic, ARG_REGS, REGRET, REGSP, REGTMP};
use super::{S390xBackend, FIXED_FRAME};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BlockId, BlockKind, Op, Type, ValueId};
use crate::isa::{LowerBackend, LowerCtx, Operand, Reg};

fn load(ty: Type) -> Mnemonic {
    match ty {
        Type::Bool => Mnemonic::MOVBZ,
        Type::I8 => Mnemonic::MOVB,
        Type::I16 => Mnemonic::MOVH,
        Type::I32 => Mnemonic::MOVW,
        _ => Mnemonic::MOVD,
    }
}

fn store(size: u64) -> Mnemonic {
    match size {
        1 => Mnemonic::MOVB,
        2 => Mnemonic::MOVH,
        4 => Mnemonic::MOVW,
        _ => Mnemonic::MOVD,
    }
}

fn alu(op: Op) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match op {
        Op::Add32 => ADDW,
        Op::Add64 => ADD,
        Op::Sub32 => SUBW,
        Op::Sub64 => SUB,
        Op::Mul32 => MULLW,
        Op::Mul64 => MULLD,
        Op::And32 | Op::AndB => ANDW,
        Op::And64 => AND,
        Op::Or32 | Op::OrB => ORW,
        Op::Or64 => OR,
        Op::Xor32 => XORW,
        Op::Xor64 => XOR,
        _ => return None,
    })
}

/// Compare and conditional move for a comparison op.
fn compare(op: Op) -> Option<(Mnemonic, Mnemonic)> {
    use Mnemonic::*;
    Some(match op {
        Op::Eq32 => (CMPW, MOVDEQ),
        Op::Eq64 => (CMP, MOVDEQ),
        Op::Neq32 => (CMPW, MOVDNE),
        Op::Neq64 => (CMP, MOVDNE),
        Op::Less32 => (CMPW, MOVDLT),
        Op::Less64 => (CMP, MOVDLT),
        Op::Less32U => (CMPWU, MOVDLT),
        _ => return None,
    })
}

pub(super) fn lower_value(ctx: &mut LowerCtx<'_, '_>, v: ValueId) -> CompileResult<()> {
    let value = ctx.value(v);
    let ptr_size = ctx.config().ptr_size;
    let r = ctx.reg(v);

    match value.op {
        Op::Arg => {
            let off = value.aux.int().unwrap_or(0);
            ctx.emit(load(value.ty), [Operand::Param(off), r]);
        }
        Op::Const8 | Op::Const16 | Op::Const32 | Op::Const64 | Op::ConstBool => {
            let c = value.aux.int().unwrap_or(0);
            ctx.emit(Mnemonic::MOVD, [Operand::Imm(c), r]);
        }
        Op::Copy => {
            let src = ctx.reg(value.args[0]);
            ctx.emit_move(v, Mnemonic::MOVD, [src, r]);
        }
        op if alu(op).is_some() => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            if let Some(m) = alu(op) {
                ctx.emit(m, [y, x, r]);
            }
        }
        Op::Neg32 | Op::Neg64 => {
            let x = ctx.reg(value.args[0]);
            let neg = if value.op == Op::Neg32 {
                Mnemonic::NEGW
            } else {
                Mnemonic::NEG
            };
            ctx.emit(neg, [x, r]);
        }
        op if compare(op).is_some() => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            if let Some((cmp, movcc)) = compare(op) {
                ctx.emit(Mnemonic::MOVD, [Operand::Imm(0), r.clone()]);
                ctx.emit(Mnemonic::MOVD, [Operand::Imm(1), Operand::phys(REGTMP)]);
                ctx.emit(cmp, [x, y]);
                ctx.emit(movcc, [Operand::phys(REGTMP), r]);
            }
        }
        Op::Not => {
            let x = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::XOR, [Operand::Imm(1), x, r]);
        }
        Op::LocalAddr => {
            let slot = value.aux.slot().ok_or_else(|| ctx.unsupported(v))?;
            let off = FIXED_FRAME + ctx.slot_offset(slot)?;
            ctx.emit(Mnemonic::ADD, [Operand::Imm(off), Operand::phys(REGSP), r]);
        }
        Op::Addr => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            ctx.emit(
                Mnemonic::MOVD,
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
            ctx.emit(Mnemonic::ADD, [Operand::Imm(off), base, r]);
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
            S390xBackend.zero_auto(ctx.em, &ctx.func.frame, slot)?;
        }
        Op::StaticCall => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            if value.args.len() > ARG_REGS.len() {
                return Err(ctx.unsupported(v));
            }
            for (arg, &reg) in value.args.iter().zip(ARG_REGS) {
                ctx.emit(Mnemonic::MOVD, [ctx.reg(*arg), Operand::phys(reg)]);
            }
            ctx.emit(
                Mnemonic::CALL,
                [Operand::Sym {
                    name: name.to_string(),
                    offset: 0,
                }],
            );
            if value.ty != Type::Void {
                ctx.emit(Mnemonic::MOVD, [Operand::phys(REGRET), r]);
            }
        }
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
                ctx.emit(Mnemonic::BR, [Operand::Label(b.succs[0])]);
            }
        }
        BlockKind::If => {
            let Some(c) = b.control else {
                return Err(CompileError::internal(format!(
                    "if block {block} has no condition"
                )));
            };
            ctx.emit(Mnemonic::CMPW, [ctx.reg(c), Operand::Imm(0)]);
            let (yes, no) = (b.succs[0], b.succs[1]);
            if next == Some(yes) {
                ctx.emit(Mnemonic::BEQ, [Operand::Label(no)]);
            } else if next == Some(no) {
                ctx.emit(Mnemonic::BNE, [Operand::Label(yes)]);
            } else {
                ctx.emit(Mnemonic::BNE, [Operand::Label(yes)]);
                ctx.emit(Mnemonic::BR, [Operand::Label(no)]);
            }
        }
        BlockKind::Ret => {
            if let Some(c) = b.control {
                ctx.emit(Mnemonic::MOVD, [ctx.reg(c), Operand::phys(REGRET)]);
            }
            ctx.emit(Mnemonic::RET, []);
        }
        BlockKind::Exit => ctx.emit(Mnemonic::UNDEF, []),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::S390xBackend;
    use crate::core::test_utils::compile_text;
    use crate::ir::{parse_module, ValueId};
    use crate::isa::LowerBackend;

    #[test]
    fn test_compare_uses_conditional_move() {
        let out = compile_text(
            "s390x",
            "func f {\nb0:\n  x = arg.i64 $0\n  y = arg.i64 $8\n  c = eq64 x y\n  ret c\n}",
        );
        let ops = out.mnemonics();
        assert_eq!(
            ops,
            vec!["MOVD", "MOVD", "MOVD", "MOVD", "CMP", "MOVDEQ", "MOVD", "RET"]
        );
        assert!(out.listing().contains("MOVDEQ\tR10, v2"));
    }

    #[test]
    fn test_copies_of_registers_are_moves() {
        let func = &parse_module(
            "func f {\nb0:\n  x = arg.i64 $0\n  k = const64 $3\n  a = copy x\n  b = copy k\n  ret a\n}",
        )
        .unwrap()[0];
        let marks = S390xBackend.mark_moves(func, func.entry().unwrap());
        assert!(marks.contains(&ValueId(2)));
        assert!(!marks.contains(&ValueId(3)));
    }

    #[test]
    fn test_big_endian_target_keeps_64_bit_values() {
        let out = compile_text("s390x", "func f {\nb0:\n  x = const64 $1\n  ret x\n}");
        assert_eq!(out.rewrite.dec64_invocations, 0);
        assert!(out.listing().contains("MOVD\t$1, v0"));
    }
}
