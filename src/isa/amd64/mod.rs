// This module implements the amd64 family backend, shared by the amd64 and amd64p32 targets.
// Stack zeroing follows the classic three tier strategy: a few word stores of a cleared AX
// for small ranges, a jump into the DUFFZERO routine for medium ranges, and REP STOSQ beyond
// that. Automatic variables are cleared with immediate stores, one per pointer word. The
// backend tracks register moves, has no frame padding requirement, and is the only one whose
// assembler accepts four-operand (VEX) instructions.

//! amd64 backend.

mod lower;
pub mod names;

pub use names::Mnemonic;

use self::names::{classify, is_amd4op, CNAMES, REG_AX, REG_CX, REG_DI, REG_SP};
use crate::core::error::CompileResult;
use crate::ir::{BlockId, FrameLayout, Function, SlotId, ValueId};
use crate::isa::{
    mark_copies, sealed, store_widths, Emitter, Family, InstrInfo, LowerBackend, LowerCtx,
    MachOp, MoveMarks, Operand,
};
use log::trace;

/// Bytes per zeroing store.
const WORD: u64 = 8;

/// Words the DUFFZERO routine clears when entered at its start.
const DUFFZERO_WORDS: u64 = 128;

pub struct Amd64Backend;

impl sealed::Sealed for Amd64Backend {}

impl LowerBackend for Amd64Backend {
    fn family(&self) -> Family {
        Family::Amd64
    }

    fn lower_value(&self, ctx: &mut LowerCtx<'_, '_>, v: ValueId) -> CompileResult<()> {
        lower::lower_value(ctx, v)
    }

    fn lower_block(
        &self,
        ctx: &mut LowerCtx<'_, '_>,
        block: BlockId,
        next: Option<BlockId>,
    ) -> CompileResult<()> {
        lower::lower_block(ctx, block, next)
    }

    fn mark_moves(&self, func: &Function, block: BlockId) -> MoveMarks {
        mark_copies(func, block)
    }

    fn zero_range(&self, em: &mut Emitter<'_>, offset: i64, size: u64) -> CompileResult<()> {
        if size == 0 {
            return Ok(());
        }
        trace!("amd64 zero_range {}..{}", offset, offset + size as i64);
        em.emit(Mnemonic::XORL, [Operand::phys(REG_AX), Operand::phys(REG_AX)]);

        let mut off = offset;
        let mut cnt = size;
        // A leading half word keeps the bulk stores 8-byte aligned on amd64p32
        if cnt % WORD == 4 {
            em.emit(Mnemonic::MOVL, [Operand::phys(REG_AX), Operand::mem(REG_SP, off)]);
            off += 4;
            cnt -= 4;
        }

        let words = cnt / WORD;
        if words <= 4 {
            for i in 0..words {
                em.emit(
                    Mnemonic::MOVQ,
                    [Operand::phys(REG_AX), Operand::mem(REG_SP, off + (i * WORD) as i64)],
                );
            }
        } else if words <= DUFFZERO_WORDS {
            em.emit(Mnemonic::LEAQ, [Operand::mem(REG_SP, off), Operand::phys(REG_DI)]);
            em.emit(
                Mnemonic::DUFFZERO,
                [Operand::Imm((2 * (DUFFZERO_WORDS - words)) as i64)],
            );
        } else {
            em.emit(Mnemonic::MOVQ, [Operand::Imm(words as i64), Operand::phys(REG_CX)]);
            em.emit(Mnemonic::LEAQ, [Operand::mem(REG_SP, off), Operand::phys(REG_DI)]);
            em.emit(Mnemonic::REP, []);
            em.emit(Mnemonic::STOSQ, []);
        }

        let bulk = (words * WORD) as i64;
        for (i, width) in store_widths(cnt % WORD, WORD) {
            em.emit(
                store_zero(width),
                [Operand::phys(REG_AX), Operand::mem(REG_SP, off + bulk + i)],
            );
        }
        Ok(())
    }

    fn zero_auto(
        &self,
        em: &mut Emitter<'_>,
        frame: &FrameLayout,
        slot: SlotId,
    ) -> CompileResult<()> {
        let offset = frame.slot_offset(slot)?;
        let size = frame.slot(slot).map_or(0, |s| s.size);
        for (i, width) in store_widths(size, WORD) {
            em.emit(
                store_zero(width),
                [Operand::Imm(0), Operand::mem(REG_SP, offset + i)],
            );
        }
        Ok(())
    }

    fn emit_nop(&self, em: &mut Emitter<'_>) {
        // XCHGL AX, AX encodes as the one byte NOP
        em.emit(Mnemonic::XCHGL, [Operand::phys(REG_AX), Operand::phys(REG_AX)]);
    }

    fn instr_info(&self, op: MachOp) -> Option<InstrInfo> {
        let MachOp::Amd64(m) = op else {
            return None;
        };
        progtable(m)
    }

    fn operand_class(&self, operand: &Operand) -> usize {
        classify(operand) as usize
    }

    fn operand_class_names(&self) -> &'static [&'static str] {
        CNAMES
    }

    fn is_extended_operand_instruction(&self, op: MachOp) -> bool {
        matches!(op, MachOp::Amd64(m) if is_amd4op(m))
    }
}

/// Store of the given width.
fn store_zero(width: u64) -> Mnemonic {
    match width {
        8 => Mnemonic::MOVQ,
        4 => Mnemonic::MOVL,
        2 => Mnemonic::MOVW,
        _ => Mnemonic::MOVB,
    }
}

fn progtable(m: Mnemonic) -> Option<InstrInfo> {
    use Mnemonic::*;
    const READ2: InstrInfo = InstrInfo::LEFT_READ.union(InstrInfo::RIGHT_READ);
    const ALU: InstrInfo = READ2.union(InstrInfo::RIGHT_WRITE).union(InstrInfo::SET_CARRY);
    const MOV: InstrInfo = InstrInfo::LEFT_READ
        .union(InstrInfo::RIGHT_WRITE)
        .union(InstrInfo::MOVE);
    Some(match m {
        MOVB => MOV.union(InstrInfo::SIZE_B),
        MOVW => MOV.union(InstrInfo::SIZE_W),
        MOVL => MOV.union(InstrInfo::SIZE_L),
        MOVQ => MOV.union(InstrInfo::SIZE_Q),
        LEAL => InstrInfo::LEFT_READ | InstrInfo::RIGHT_WRITE | InstrInfo::SIZE_L,
        LEAQ => InstrInfo::LEFT_READ | InstrInfo::RIGHT_WRITE | InstrInfo::SIZE_Q,
        ADDL | SUBL | IMULL | ANDL | ORL | XORL => ALU.union(InstrInfo::SIZE_L),
        ADDQ | SUBQ | IMULQ | ANDQ | ORQ | XORQ => ALU.union(InstrInfo::SIZE_Q),
        NEGL | NEGQ => InstrInfo::RIGHT_READ | InstrInfo::RIGHT_WRITE | InstrInfo::SET_CARRY,
        CMPB | TESTB => READ2.union(InstrInfo::SET_CARRY).union(InstrInfo::SIZE_B),
        CMPL => READ2.union(InstrInfo::SET_CARRY).union(InstrInfo::SIZE_L),
        CMPQ => READ2.union(InstrInfo::SET_CARRY).union(InstrInfo::SIZE_Q),
        SETEQ | SETNE | SETLT | SETCS => {
            InstrInfo::RIGHT_WRITE | InstrInfo::USE_CARRY | InstrInfo::SIZE_B
        }
        JMP => InstrInfo::JUMP | InstrInfo::BREAK,
        JEQ | JNE => InstrInfo::JUMP | InstrInfo::USE_CARRY,
        CALL | DUFFZERO => InstrInfo::CALL,
        RET | UNDEF => InstrInfo::BREAK,
        XCHGL => READ2 | InstrInfo::RIGHT_WRITE,
        REP | STOSQ => InstrInfo::empty(),
        _ => return None,
    })
}
