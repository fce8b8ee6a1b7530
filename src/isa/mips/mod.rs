// Both 32-bit mips targets share this backend; endianness only matters to the narrowing rules
// that run before lowering and to the order of the two result registers. The frame sits above
// a 4-byte save area, so slots are addressed at 4+offset(R29). Up to three words are cleared
// with stores of R0; anything longer runs a BNE loop with R1 as the cursor and R2 as the end.

//! mips backend.

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

const WORD: u64 = 4;

pub(crate) const FIXED_FRAME: i64 = 4;

fn store_zero(width: u64) -> Mnemonic {
    match width {
        4 => Mnemonic::MOVW,
        2 => Mnemonic::MOVH,
        _ => Mnemonic::MOVB,
    }
}

pub struct MipsBackend;

impl sealed::Sealed for MipsBackend {}

impl LowerBackend for MipsBackend {
    fn family(&self) -> Family {
        Family::Mips
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
        trace!("mips zero_range {}..{}", offset, offset + size as i64);
        let base = FIXED_FRAME + offset;
        let words = size / WORD;

        if words < 4 {
            for (i, width) in store_widths(size, WORD) {
                em.emit(
                    store_zero(width),
                    [Operand::phys(REGZERO), Operand::mem(REGSP, base + i)],
                );
            }
            return Ok(());
        }

        let bulk = (words * WORD) as i64;
        em.emit(
            Mnemonic::ADD,
            [
                Operand::Imm(base - WORD as i64),
                Operand::phys(REGSP),
                Operand::phys(REGRT1),
            ],
        );
        em.emit(
            Mnemonic::ADD,
            [Operand::Imm(bulk), Operand::phys(REGRT1), Operand::phys(REGRT2)],
        );
        let top = em.emit(
            Mnemonic::MOVW,
            [Operand::phys(REGZERO), Operand::mem(REGRT1, WORD as i64)],
        );
        em.emit(
            Mnemonic::ADD,
            [Operand::Imm(WORD as i64), Operand::phys(REGRT1), Operand::phys(REGRT1)],
        );
        em.emit(
            Mnemonic::BNE,
            [Operand::phys(REGRT1), Operand::phys(REGRT2), Operand::Pc(top)],
        );

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
        em.emit(
            Mnemonic::NOR,
            [
                Operand::phys(REGZERO),
                Operand::phys(REGZERO),
                Operand::phys(REGZERO),
            ],
        );
    }

    fn instr_info(&self, op: MachOp) -> Option<InstrInfo> {
        let MachOp::Mips(m) = op else {
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
        .union(InstrInfo::RIGHT_WRITE)
        .union(InstrInfo::SIZE_L);
    const MOV: InstrInfo = InstrInfo::LEFT_READ
        .union(InstrInfo::RIGHT_WRITE)
        .union(InstrInfo::MOVE);
    Some(match m {
        MOVB | MOVBU => MOV.union(InstrInfo::SIZE_B),
        MOVH | MOVHU => MOV.union(InstrInfo::SIZE_W),
        MOVW => MOV.union(InstrInfo::SIZE_L),
        ADD | ADDU | SUBU | MUL | AND | OR | XOR | NOR | SGT | SGTU => ALU,
        MULU => InstrInfo::LEFT_READ | InstrInfo::REG_READ | InstrInfo::SIZE_L,
        JMP => InstrInfo::JUMP | InstrInfo::BREAK,
        BEQ | BNE => InstrInfo::LEFT_READ | InstrInfo::REG_READ | InstrInfo::JUMP,
        CALL => InstrInfo::CALL,
        RET | UNDEF => InstrInfo::BREAK,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::{emit_with as run, stored_bytes};
    use crate::ir::{SequentialAllocator, StackSlot};

    #[test]
    fn test_small_range_stores_r0() {
        let insts = run(|em| MipsBackend.zero_range(em, 0, 10).unwrap());
        let text: Vec<String> = insts.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            text,
            vec!["MOVW\tR0, 4(R29)", "MOVW\tR0, 8(R29)", "MOVH\tR0, 12(R29)"]
        );
    }

    #[test]
    fn test_long_range_loops() {
        let insts = run(|em| MipsBackend.zero_range(em, 8, 64).unwrap());
        let text: Vec<String> = insts.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "ADD\t$8, R29, R1",
                "ADD\t$64, R1, R2",
                "MOVW\tR0, 4(R1)",
                "ADD\t$4, R1, R1",
                "BNE\tR1, R2, pc2",
            ]
        );
    }

    #[test]
    fn test_zero_auto_covers_slot() {
        let mut frame = FrameLayout::new();
        frame.add_slot(StackSlot::new("a", 4, 4, false)).unwrap();
        let slot = frame.add_slot(StackSlot::new("b", 6, 2, true)).unwrap();
        frame.allocate(&SequentialAllocator, 4).unwrap();
        let offset = FIXED_FRAME + frame.slot_offset(slot).unwrap();
        let insts = run(|em| MipsBackend.zero_auto(em, &frame, slot).unwrap());
        assert_eq!(stored_bytes(&insts), (offset..offset + 6).collect::<Vec<i64>>());
    }

    #[test]
    fn test_nop_and_no_padding() {
        let insts = run(|em| MipsBackend.emit_nop(em));
        assert_eq!(insts[0].to_string(), "NOR\tR0, R0, R0");
        assert_eq!(MipsBackend.pad_frame(12), None);
    }
}
