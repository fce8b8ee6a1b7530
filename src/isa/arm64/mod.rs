// The arm64 backend addresses the frame above a fixed 8-byte save area for the link register,
// so every slot lives at 8+offset(RSP). Ranges shorter than four words are cleared with stores
// of ZR; up to 128 words go through DUFFZERO with R16 as the cursor; longer ranges run a
// compare and branch loop between R16 and R17. The stack pointer must stay 16-byte aligned
// once the saved link register is counted, which is what pad_frame enforces.

//! arm64 backend.

mod lower;
pub mod names;

pub use names::Mnemonic;

use self::names::{classify, CNAMES, REGRT1, REGRT2, REGSP, REGZERO};
use crate::core::error::CompileResult;
use crate::ir::{BlockId, FrameLayout, SlotId, ValueId};
use crate::isa::{
    sealed, store_widths, Emitter, Family, InstrInfo, LowerBackend, LowerCtx, MachOp, Operand,
};
use log::trace;

const WORD: u64 = 8;

/// Size of the link register save area below the frame.
pub(crate) const FIXED_FRAME: i64 = 8;

const DUFFZERO_WORDS: u64 = 128;

/// Store of ZR for a `width` byte access.
fn store_zero(width: u64) -> Mnemonic {
    match width {
        8 => Mnemonic::MOVD,
        4 => Mnemonic::MOVW,
        2 => Mnemonic::MOVH,
        _ => Mnemonic::MOVB,
    }
}

pub struct Arm64Backend;

impl sealed::Sealed for Arm64Backend {}

impl LowerBackend for Arm64Backend {
    fn family(&self) -> Family {
        Family::Arm64
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

    fn zero_range(&self, em: &mut Emitter<'_>, offset: i64, size: u64) -> CompileResult<()> {
        if size == 0 {
            return Ok(());
        }
        trace!("arm64 zero_range {}..{}", offset, offset + size as i64);
        let base = FIXED_FRAME + offset;
        let words = size / WORD;
        let bulk = (words * WORD) as i64;

        if words < 4 {
            for (i, width) in store_widths(size, WORD) {
                em.emit(
                    store_zero(width),
                    [Operand::phys(REGZERO), Operand::mem(REGSP, base + i)],
                );
            }
            return Ok(());
        }

        if words <= DUFFZERO_WORDS {
            em.emit(Mnemonic::MOVD, [Operand::phys(REGSP), Operand::phys(REGRT1)]);
            em.emit(
                Mnemonic::ADD,
                [
                    Operand::Imm(base - WORD as i64),
                    Operand::phys(REGRT1),
                    Operand::phys(REGRT1),
                ],
            );
            em.emit(
                Mnemonic::DUFFZERO,
                [Operand::Imm((4 * (DUFFZERO_WORDS - words)) as i64)],
            );
        } else {
            em.emit(
                Mnemonic::MOVD,
                [Operand::Imm(base - WORD as i64), Operand::phys(REGRT1)],
            );
            em.emit(
                Mnemonic::ADD,
                [Operand::phys(REGSP), Operand::phys(REGRT1), Operand::phys(REGRT1)],
            );
            em.emit(Mnemonic::MOVD, [Operand::Imm(bulk), Operand::phys(REGRT2)]);
            em.emit(
                Mnemonic::ADD,
                [Operand::phys(REGRT1), Operand::phys(REGRT2), Operand::phys(REGRT2)],
            );
            let top = em.emit(
                Mnemonic::MOVD,
                [Operand::phys(REGZERO), Operand::mem(REGRT1, WORD as i64)],
            );
            em.emit(
                Mnemonic::ADD,
                [Operand::Imm(WORD as i64), Operand::phys(REGRT1), Operand::phys(REGRT1)],
            );
            em.emit(Mnemonic::CMP, [Operand::phys(REGRT1), Operand::phys(REGRT2)]);
            em.emit(Mnemonic::BNE, [Operand::Pc(top)]);
        }

        for (i, width) in store_widths(size - bulk as u64, WORD) {
            em.emit(
                store_zero(width),
                [Operand::phys(REGZERO), Operand::mem(REGSP, base + bulk + i)],
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
        let offset = FIXED_FRAME + frame.slot_offset(slot)?;
        let size = frame.slot(slot).map_or(0, |s| s.size);
        for (i, width) in store_widths(size, WORD) {
            em.emit(
                store_zero(width),
                [Operand::phys(REGZERO), Operand::mem(REGSP, offset + i)],
            );
        }
        Ok(())
    }

    fn emit_nop(&self, em: &mut Emitter<'_>) {
        em.emit(Mnemonic::HINT, [Operand::Imm(0)]);
    }

    fn pad_frame(&self, frame_size: u64) -> Option<u64> {
        // SP stays 16-byte aligned once the 8-byte link register slot is added
        if frame_size != 0 && frame_size % 16 != 8 {
            Some(frame_size + 8)
        } else {
            Some(frame_size)
        }
    }

    fn instr_info(&self, op: MachOp) -> Option<InstrInfo> {
        let MachOp::Arm64(m) = op else {
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
}

fn progtable(m: Mnemonic) -> Option<InstrInfo> {
    use Mnemonic::*;
    const ALU: InstrInfo = InstrInfo::LEFT_READ
        .union(InstrInfo::REG_READ)
        .union(InstrInfo::RIGHT_WRITE);
    const MOV: InstrInfo = InstrInfo::LEFT_READ
        .union(InstrInfo::RIGHT_WRITE)
        .union(InstrInfo::MOVE);
    Some(match m {
        MOVB | MOVBU => MOV.union(InstrInfo::SIZE_B),
        MOVH | MOVHU => MOV.union(InstrInfo::SIZE_W),
        MOVW | MOVWU => MOV.union(InstrInfo::SIZE_L),
        MOVD => MOV.union(InstrInfo::SIZE_Q),
        ADDW | SUBW | MULW | ANDW | ORRW | EORW => ALU.union(InstrInfo::SIZE_L),
        ADD | SUB | MUL | UMULH | AND | ORR | EOR => ALU.union(InstrInfo::SIZE_Q),
        NEG | NEGW => InstrInfo::LEFT_READ | InstrInfo::RIGHT_WRITE,
        CMP | CMPW => InstrInfo::LEFT_READ | InstrInfo::REG_READ | InstrInfo::SET_CARRY,
        CSET => InstrInfo::RIGHT_WRITE | InstrInfo::USE_CARRY,
        B => InstrInfo::JUMP | InstrInfo::BREAK,
        BNE => InstrInfo::JUMP | InstrInfo::USE_CARRY,
        CBZ | CBNZ => InstrInfo::LEFT_READ | InstrInfo::JUMP,
        CALL | DUFFZERO => InstrInfo::CALL,
        RET | UNDEF => InstrInfo::BREAK,
        HINT => InstrInfo::empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::{emit_with as run, stored_bytes};
    use crate::ir::{SequentialAllocator, StackSlot};

    #[test]
    fn test_small_range_stores_zero_register() {
        let insts = run(|em| Arm64Backend.zero_range(em, 0, 16).unwrap());
        let text: Vec<String> = insts.iter().map(|i| i.to_string()).collect();
        assert_eq!(text, vec!["MOVD\tZR, 8(RSP)", "MOVD\tZR, 16(RSP)"]);
    }

    #[test]
    fn test_medium_range_uses_duffzero() {
        let insts = run(|em| Arm64Backend.zero_range(em, 16, 64).unwrap());
        let ops: Vec<_> = insts.iter().map(|i| i.mnemonic()).collect();
        assert_eq!(ops, vec!["MOVD", "ADD", "DUFFZERO"]);
        assert_eq!(insts[1].args[0], Operand::Imm(16));
        assert_eq!(insts[2].args[0], Operand::Imm(4 * (128 - 8)));
    }

    #[test]
    fn test_large_range_loops() {
        let insts = run(|em| Arm64Backend.zero_range(em, 0, 8 * 200 + 4).unwrap());
        let last = insts.len() - 1;
        assert_eq!(insts[last].to_string(), "MOVW\tZR, 1608(RSP)");
        assert_eq!(insts[last - 1].to_string(), "BNE\tpc4");
        assert_eq!(insts[4].to_string(), "MOVD\tZR, 8(R16)");
    }

    #[test]
    fn test_zero_auto_covers_slot() {
        let mut frame = FrameLayout::new();
        let slot = frame.add_slot(StackSlot::new("obj", 12, 4, true)).unwrap();
        frame.allocate(&SequentialAllocator, 8).unwrap();
        let insts = run(|em| Arm64Backend.zero_auto(em, &frame, slot).unwrap());
        assert_eq!(stored_bytes(&insts), (8..20).collect::<Vec<i64>>());
    }

    #[test]
    fn test_pad_frame() {
        assert_eq!(Arm64Backend.pad_frame(0), Some(0));
        assert_eq!(Arm64Backend.pad_frame(8), Some(8));
        assert_eq!(Arm64Backend.pad_frame(16), Some(24));
        assert_eq!(Arm64Backend.pad_frame(24), Some(24));
        assert_eq!(Arm64Backend.pad_frame(32), Some(40));
    }

    #[test]
    fn test_nop() {
        let insts = run(|em| Arm64Backend.emit_nop(em));
        assert_eq!(insts[0].to_string(), "HINT\t$0");
    }
}
