//! amd64 value and block lowering.

use super::names::{Mnemonic, ARG_REGS, REG_AX, REG_SP};
use super::Amd64Backend;
use crate::core::error::{CompileError, CompileResult};
use crate::ir::{BlockId, BlockKind, Op, Type, ValueId};
use crate::isa::{LowerBackend, LowerCtx, Operand, Reg};

fn mov(size: u64) -> Mnemonic {
    match size {
        1 => Mnemonic::MOVB,
        2 => Mnemonic::MOVW,
        4 => Mnemonic::MOVL,
        _ => Mnemonic::MOVQ,
    }
}

/// Two-operand ALU mnemonic for a 32 or 64 bit IR op.
fn alu(op: Op) -> Option<Mnemonic> {
    use Mnemonic::*;
    Some(match op {
        Op::Add32 => ADDL,
        Op::Add64 => ADDQ,
        Op::Sub32 => SUBL,
        Op::Sub64 => SUBQ,
        Op::Mul32 => IMULL,
        Op::Mul64 => IMULQ,
        Op::And32 | Op::AndB => ANDL,
        Op::And64 => ANDQ,
        Op::Or32 | Op::OrB => ORL,
        Op::Or64 => ORQ,
        Op::Xor32 => XORL,
        Op::Xor64 => XORQ,
        _ => return None,
    })
}

fn setcc(op: Op) -> Option<(Mnemonic, Mnemonic)> {
    use Mnemonic::*;
    Some(match op {
        Op::Eq32 => (CMPL, SETEQ),
        Op::Eq64 => (CMPQ, SETEQ),
        Op::Neq32 => (CMPL, SETNE),
        Op::Neq64 => (CMPQ, SETNE),
        Op::Less32 => (CMPL, SETLT),
        Op::Less64 => (CMPQ, SETLT),
        Op::Less32U => (CMPL, SETCS),
        _ => return None,
    })
}

fn lea(ptr_size: u8) -> Mnemonic {
    if ptr_size == 4 {
        Mnemonic::LEAL
    } else {
        Mnemonic::LEAQ
    }
}

pub(super) fn lower_value(ctx: &mut LowerCtx<'_, '_>, v: ValueId) -> CompileResult<()> {
    let value = ctx.value(v);
    let ptr_size = ctx.config().ptr_size;
    let size = value.ty.size(ptr_size);
    let r = ctx.reg(v);

    match value.op {
        Op::Arg => {
            let off = value.aux.int().unwrap_or(0);
            ctx.emit(mov(size), [Operand::Param(off), r]);
        }
        Op::Const8 | Op::Const16 | Op::Const32 | Op::Const64 | Op::ConstBool => {
            match value.aux.int().unwrap_or(0) {
                0 => ctx.emit(Mnemonic::XORL, [r.clone(), r]),
                c => ctx.emit(mov(size.max(4)), [Operand::Imm(c), r]),
            }
        }
        Op::Copy => {
            let src = ctx.reg(value.args[0]);
            ctx.emit_move(v, mov(size), [src, r]);
        }
        op if alu(op).is_some() => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            let size = if matches!(op, Op::AndB | Op::OrB) { 4 } else { size };
            ctx.emit(mov(size), [x, r.clone()]);
            if let Some(m) = alu(op) {
                ctx.emit(m, [y, r]);
            }
        }
        Op::Neg32 | Op::Neg64 => {
            let x = ctx.reg(value.args[0]);
            let neg = if value.op == Op::Neg32 {
                Mnemonic::NEGL
            } else {
                Mnemonic::NEGQ
            };
            ctx.emit(mov(size), [x, r.clone()]);
            ctx.emit(neg, [r]);
        }
        op if setcc(op).is_some() => {
            let (x, y) = (ctx.reg(value.args[0]), ctx.reg(value.args[1]));
            if let Some((cmp, set)) = setcc(op) {
                ctx.emit(cmp, [x, y]);
                ctx.emit(set, [r]);
            }
        }
        Op::Not => {
            let x = ctx.reg(value.args[0]);
            ctx.emit(Mnemonic::MOVL, [x, r.clone()]);
            ctx.emit(Mnemonic::XORL, [Operand::Imm(1), r]);
        }
        Op::LocalAddr => {
            let slot = value
                .aux
                .slot()
                .ok_or_else(|| ctx.unsupported(v))?;
            let off = ctx.slot_offset(slot)?;
            ctx.emit(lea(ptr_size), [Operand::mem(REG_SP, off), r]);
        }
        Op::Addr => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            ctx.emit(
                lea(ptr_size),
                [
                    Operand::Sym {
                        name: name.to_string(),
                        offset: 0,
                    },
                    r,
                ],
            );
        }
        Op::OffPtr => {
            let off = value.aux.int().unwrap_or(0);
            let base = Reg::Virt(value.args[0].0);
            ctx.emit(lea(ptr_size), [Operand::Mem { base, offset: off }, r]);
        }
        Op::Load => {
            let base = Reg::Virt(value.args[0].0);
            ctx.emit(mov(size), [Operand::Mem { base, offset: 0 }, r]);
        }
        Op::Store => {
            let base = Reg::Virt(value.args[0].0);
            let src = value.args[1];
            let width = ctx.value(src).ty.size(ptr_size);
            ctx.emit(mov(width), [ctx.reg(src), Operand::Mem { base, offset: 0 }]);
        }
        Op::VarZero => {
            let slot = value.aux.slot().ok_or_else(|| ctx.unsupported(v))?;
            Amd64Backend.zero_auto(ctx.em, &ctx.func.frame, slot)?;
        }
        Op::StaticCall => {
            let name = value.aux.sym().ok_or_else(|| ctx.unsupported(v))?;
            if value.args.len() > ARG_REGS.len() {
                return Err(ctx.unsupported(v));
            }
            for (arg, &reg) in value.args.iter().zip(ARG_REGS) {
                let width = ctx.value(*arg).ty.size(ptr_size);
                ctx.emit(mov(width), [ctx.reg(*arg), Operand::phys(reg)]);
            }
            ctx.emit(
                Mnemonic::CALL,
                [Operand::Sym {
                    name: name.to_string(),
                    offset: 0,
                }],
            );
            if value.ty != Type::Void {
                ctx.emit(mov(size), [Operand::phys(REG_AX), r]);
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
            ctx.emit(Mnemonic::TESTB, [cond.clone(), cond]);
            let (yes, no) = (b.succs[0], b.succs[1]);
            if next == Some(yes) {
                ctx.emit(Mnemonic::JEQ, [Operand::Label(no)]);
            } else if next == Some(no) {
                ctx.emit(Mnemonic::JNE, [Operand::Label(yes)]);
            } else {
                ctx.emit(Mnemonic::JNE, [Operand::Label(yes)]);
                ctx.emit(Mnemonic::JMP, [Operand::Label(no)]);
            }
        }
        BlockKind::Ret => {
            if let Some(c) = b.control {
                let size = ctx.value(c).ty.size(ctx.config().ptr_size);
                ctx.emit(mov(size), [ctx.reg(c), Operand::phys(REG_AX)]);
            }
            ctx.emit(Mnemonic::RET, []);
        }
        BlockKind::Exit => ctx.emit(Mnemonic::UNDEF, []),
    }
    Ok(())
}
