//! arm64 value and block lowering.

use super::names::{Mnemonic, ARG_REGS, REGSP, REGZERO, REG_R0};
use super::{Arm64Backend, FIXED_FRAME};
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BlockId, BlockKind, Op, Type, ValueId};
use crate::isa::{Cond, LowerBackend, LowerCtx, Operand, Reg};

fn load(ty: Type) -> Mnemonic {
    match ty {
        Type::Bool => Mnemonic::MOVBU,
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

/// Three-operand ALU mnemonic.
fn alu(op: Op) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match op {
        Op::Add32 => ADDW,
        Op::Add64 => ADD,
        Op::Sub32 => SUBW,
        Op::Sub64 => SUB,
        Op::Mul32 => MULW,
        Op::Mul64 => MUL,
        Op::And32 => ANDW,
        Op::And64 | Op::AndB => AND,
        Op::Or32 => ORRW,
        Op::Or64 | Op::OrB => ORR,
        Op::Xor32 => EORW,
        Op::Xor64 => EOR,
        _ => return None,
    })
}

fn compare(op: Op) -> Option<(Mnemonic, Cond)> {
    Some(match op {
        Op::Eq32 => (Mnemonic::CMPW, Cond::Eq),
        Op::Eq64 => (Mnemonic::CMP, Cond::Eq),
        Op::Neq32 => (Mnemonic::CMPW, Cond::Ne),
        Op::Neq64 => (Mnemonic::CMP, Cond::Ne),
        Op::Less32 => (Mnemonic::CMPW, Cond::Lt),
        Op::Less64 => (Mnemonic::CMP, Cond::Lt),
        Op::Less32U => (Mnemonic::CMPW, Cond::Lo),
        _ => return None,
    })
}

fn sym(name: &str) -> Operand {
    Operand::Sym {
        name: name.to_string(),
        offset: 0,
    }
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
            match value.aux.int().unwrap_or(0) {
                0 => ctx.emit(Mnemonic::MOVD, [Operand::phys(REGZERO), r]),
                c => ctx.emit(Mnemonic::MOVD, [Operand::Imm(c), r]),
            }
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
            if let Some((cmp, cond)) = compare(op) {
                // CMP y, x compares x against y
                ctx.emit(cmp, [y, x]);
                ctx.emit(Mnemonic::CSET, [Operand::Cond(cond), r]);
            }
        }
        Op::Not => {
            let x = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::EOR, [Operand::Imm(1), x, r]);
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
            Arm64Backend.zero_auto(ctx.em, &ctx.func.frame, slot)?;
        }
        Op::StaticCall => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            if value.args.len() > ARG_REGS.len() {
                return Err(ctx.unsupported(v));
            }
            for (arg, &reg) in value.args.iter().zip(ARG_REGS) {
                ctx.emit(Mnemonic::MOVD, [ctx.reg(*arg), Operand::phys(reg)]);
            }
            ctx.emit(Mnemonic::CALL, [sym(name)]);
            if value.ty != Type::Void {
                ctx.emit(Mnemonic::MOVD, [Operand::phys(REG_R0), r]);
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
                ctx.emit(Mnemonic::B, [Operand::Label(b.succs[0])]);
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
                ctx.emit(Mnemonic::CBZ, [cond, Operand::Label(no)]);
            } else if next == Some(no) {
                ctx.emit(Mnemonic::CBNZ, [cond, Operand::Label(yes)]);
            } else {
                ctx.emit(Mnemonic::CBNZ, [cond, Operand::Label(yes)]);
                ctx.emit(Mnemonic::B, [Operand::Label(no)]);
            }
        }
        BlockKind::Ret => {
            if let Some(c) = b.control {
                ctx.emit(Mnemonic::MOVD, [ctx.reg(c), Operand::phys(REG_R0)]);
            }
            ctx.emit(Mnemonic::RET, []);
        }
        BlockKind::Exit => ctx.emit(Mnemonic::UNDEF, []),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::core::test_utils::compile_text;

    #[test]
    fn test_three_operand_arithmetic() {
        let out = compile_text(
            "arm64",
            "func f {\nb0:\n  x = arg.i64 $0\n  y = arg.i64 $8\n  s = sub64 x y\n  ret s\n}",
        );
        let text = out.listing();
        assert!(text.contains("SUB\tv1, v0, v2"));
        assert!(text.ends_with("MOVD\tv2, R0\nRET\n"));
    }

    #[test]
    fn test_compare_sets_condition() {
        let out = compile_text(
            "arm64",
            "func f {\nb0:\n  x = arg.i32 $0\n  y = arg.i32 $4\n  c = less32 x y\n  ret c\n}",
        );
        let text = out.listing();
        assert!(text.contains("CMPW\tv1, v0"));
        assert!(text.contains("CSET\tLT, v2"));
    }

    #[test]
    fn test_locals_sit_above_link_slot() {
        let out = compile_text(
            "arm64",
            "func f {\n  slot s 8 8\nb0:\n  p = localaddr %s\n  ret p\n}",
        );
        assert!(out.listing().contains("ADD\t$8, RSP, v0"));
    }

    #[test]
    fn test_branch_on_condition_register() {
        let out = compile_text(
            "arm64",
            "func f {\nb0:\n  x = arg.bool $0\n  if x yes no\nno:\n  exit\nyes:\n  ret\n}",
        );
        assert_eq!(out.mnemonics(), vec!["MOVBU", "CBNZ", "UNDEF", "RET"]);
    }
}
