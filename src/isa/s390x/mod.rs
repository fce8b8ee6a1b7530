// s390x clears memory with CLEAR (assembled as XC), which handles up to 256 bytes per
// instruction. Ranges over the loop cutoff run a CLEAR $256 loop; the remainder is cleared in
// chunks of at most 256 bytes, using plain stores for chunks of exactly 8, 4, 2 or 1 bytes.
// Displacements are unsigned 12-bit, so a copy of the stack pointer in R3 is used whenever the
// range starts too far up the frame or a loop is needed.

//! s390x backend.

mod lower;
pub mod names;

pub use names::Mnemonic;

use self::names::{classify, CNAMES, REGRT1, REGRT2, REGSP, REG_R0};
use crate::core::error::CompileResult;
use crate::ir::{BlockId, FrameLayout, Function, SlotId, ValueId};
use crate::isa::{
    mark_copies, sealed, Emitter, Family, InstrInfo, LowerBackend, LowerCtx, MachOp, MoveMarks,
    Operand,
};
use log::trace;

pub(crate) const FIXED_FRAME: i64 = 8;

/// Ranges longer than this are cleared in a loop.
const CLEAR_LOOP_CUTOFF: u64 = 1024;

/// Largest length a single CLEAR accepts.
const CLEAR_MAX: u64 = 256;

pub struct S390xBackend;

impl sealed::Sealed for S390xBackend {}

impl LowerBackend for S390xBackend {
    fn family(&self) -> Family {
        Family::S390x
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
        trace!("s390x zero_range {}..{}", offset, offset + size as i64);
        let mut off = offset + FIXED_FRAME;
        let mut cnt = size;
        let mut reg = REGSP;

        if off < 0 || off > (4096 - CLEAR_LOOP_CUTOFF) as i64 || cnt > CLEAR_LOOP_CUTOFF {
            em.emit(
                Mnemonic::ADD,
                [Operand::Imm(off), Operand::phys(REGSP), Operand::phys(REGRT1)],
            );
            reg = REGRT1;
            off = 0;
        }

        if cnt > CLEAR_LOOP_CUTOFF {
            let n = cnt - cnt % CLEAR_MAX;
            em.emit(
                Mnemonic::ADD,
                [Operand::Imm(off + n as i64), Operand::phys(reg), Operand::phys(REGRT2)],
            );
            let top = em.emit(
                Mnemonic::CLEAR,
                [Operand::Imm(CLEAR_MAX as i64), Operand::mem(reg, off)],
            );
            em.emit(Mnemonic::ADD, [Operand::Imm(CLEAR_MAX as i64), Operand::phys(reg)]);
            em.emit(Mnemonic::CMP, [Operand::phys(reg), Operand::phys(REGRT2)]);
            em.emit(Mnemonic::BNE, [Operand::Pc(top)]);
            cnt -= n;
        }

        while cnt > 0 {
            let n = cnt.min(CLEAR_MAX);
            let store = match n {
                8 => Some(Mnemonic::MOVD),
                4 => Some(Mnemonic::MOVW),
                2 => Some(Mnemonic::MOVH),
                1 => Some(Mnemonic::MOVB),
                _ => None,
            };
            match store {
                Some(m) => em.emit(m, [Operand::Imm(0), Operand::mem(reg, off)]),
                None => em.emit(Mnemonic::CLEAR, [Operand::Imm(n as i64), Operand::mem(reg, off)]),
            };
            cnt -= n;
            off += n as i64;
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
        if size == 0 {
            return Ok(());
        }
        if size > CLEAR_MAX {
            return self.zero_range(em, offset, size);
        }
        em.emit(
            Mnemonic::CLEAR,
            [Operand::Imm(size as i64), Operand::mem(REGSP, FIXED_FRAME + offset)],
        );
        Ok(())
    }

    fn emit_nop(&self, em: &mut Emitter<'_>) {
        em.emit(Mnemonic::OR, [Operand::phys(REG_R0), Operand::phys(REG_R0)]);
    }

    fn instr_info(&self, op: MachOp) -> Option<InstrInfo> {
        let MachOp::S390x(m) = op else {
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
    const CMP2: InstrInfo = InstrInfo::LEFT_READ
        .union(InstrInfo::RIGHT_READ)
        .union(InstrInfo::SET_CARRY);
    Some(match m {
        MOVB | MOVBZ => MOV.union(InstrInfo::SIZE_B),
        MOVH | MOVHZ => MOV.union(InstrInfo::SIZE_W),
        MOVW | MOVWZ => MOV.union(InstrInfo::SIZE_L),
        MOVD => MOV.union(InstrInfo::SIZE_Q),
        MOVDEQ | MOVDNE | MOVDLT => {
            InstrInfo::LEFT_READ | InstrInfo::RIGHT_WRITE | InstrInfo::USE_CARRY
        }
        ADDW | SUBW | MULLW | ANDW | ORW | XORW => ALU.union(InstrInfo::SIZE_L),
        ADD | SUB | MULLD | AND | OR | XOR => ALU.union(InstrInfo::SIZE_Q),
        NEG | NEGW => InstrInfo::LEFT_READ | InstrInfo::RIGHT_WRITE,
        CMP | CMPU => CMP2.union(InstrInfo::SIZE_Q),
        CMPW | CMPWU => CMP2.union(InstrInfo::SIZE_L),
        CLEAR => InstrInfo::LEFT_READ | InstrInfo::RIGHT_WRITE,
        BR => InstrInfo::JUMP | InstrInfo::BREAK,
        BEQ | BNE => InstrInfo::JUMP | InstrInfo::USE_CARRY,
        CALL => InstrInfo::CALL,
        RET | UNDEF => InstrInfo::BREAK,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::{emit_with as run, stored_bytes};
    use crate::ir::{SequentialAllocator, StackSlot};

    fn text(insts: &[crate::isa::Inst]) -> Vec<String> {
        insts.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_exact_word_uses_store() {
        let insts = run(|em| S390xBackend.zero_range(em, 0, 8).unwrap());
        assert_eq!(text(&insts), vec!["MOVD\t$0, 8(R15)"]);
    }

    #[test]
    fn test_medium_range_uses_clear() {
        let insts = run(|em| S390xBackend.zero_range(em, 16, 300).unwrap());
        assert_eq!(
            text(&insts),
            vec!["CLEAR\t$256, 24(R15)", "CLEAR\t$44, 280(R15)"]
        );
    }

    #[test]
    fn test_high_offset_copies_stack_pointer() {
        let insts = run(|em| S390xBackend.zero_range(em, 3500, 16).unwrap());
        assert_eq!(text(&insts), vec!["ADD\t$3508, R15, R3", "CLEAR\t$16, 0(R3)"]);
    }

    #[test]
    fn test_long_range_loops() {
        let insts = run(|em| S390xBackend.zero_range(em, 0, 2048 + 8).unwrap());
        assert_eq!(
            text(&insts),
            vec![
                "ADD\t$8, R15, R3",
                "ADD\t$2048, R3, R4",
                "CLEAR\t$256, 0(R3)",
                "ADD\t$256, R3",
                "CMP\tR3, R4",
                "BNE\tpc2",
                "MOVD\t$0, 0(R3)",
            ]
        );
    }

    #[test]
    fn test_zero_auto_single_clear() {
        let mut frame = FrameLayout::new();
        let slot = frame.add_slot(StackSlot::new("obj", 40, 8, true)).unwrap();
        frame.allocate(&SequentialAllocator, 8).unwrap();
        let insts = run(|em| S390xBackend.zero_auto(em, &frame, slot).unwrap());
        assert_eq!(text(&insts), vec!["CLEAR\t$40, 8(R15)"]);
        assert_eq!(stored_bytes(&insts), (8..48).collect::<Vec<i64>>());
    }

    #[test]
    fn test_nop() {
        let insts = run(|em| S390xBackend.emit_nop(em));
        assert_eq!(text(&insts), vec!["OR\tR0, R0"]);
    }
}
