// This module tracks the stack frame of one function through its lifecycle:
// Unallocated -> Allocated -> ZeroingPlanned -> Finalized. Slots are declared while the
// frame is unallocated; offsets come from a front-end supplied FrameAllocator; the zeroing
// plan merges ownership-sensitive slots into as few ranges as possible; finalization applies
// the target's optional padding and freezes the layout. Any transition taken out of order is
// an internal inconsistency rather than a recoverable condition.

//! Stack frame layout.

use crate::core::error::{CompileError, CompileResult};
use log::trace;
use std::fmt;

/// Index of a stack slot in its function's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An automatic variable living in the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSlot {
    pub name: String,
    pub size: u64,
    pub align: u64,
    /// Holds ownership-sensitive data and must be zeroed on entry.
    pub needs_zero: bool,
    /// Byte offset from the frame base, assigned by the allocator.
    pub offset: Option<i64>,
}

impl StackSlot {
    pub fn new(name: impl Into<String>, size: u64, align: u64, needs_zero: bool) -> Self {
        Self {
            name: name.into(),
            size,
            align: align.max(1),
            needs_zero,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Unallocated,
    Allocated,
    ZeroingPlanned,
    Finalized,
}

/// A contiguous byte range of the frame to clear on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroRange {
    pub offset: i64,
    pub size: u64,
}

impl ZeroRange {
    pub fn end(&self) -> i64 {
        self.offset
            .saturating_add(i64::try_from(self.size).unwrap_or(i64::MAX))
    }
}

/// Largest frame whose offsets are representable at all.
pub const MAX_FRAME_SIZE: u64 = i64::MAX as u64;

fn frame_overflow() -> CompileError {
    CompileError::FrameTooLarge {
        size: u64::MAX,
        max: MAX_FRAME_SIZE,
    }
}

/// Front-end callback assigning slot offsets.
///
/// Must set `offset` on every slot and return the total frame size, which has
/// to cover every slot.
pub trait FrameAllocator: Send + Sync {
    fn allocate_frame(&self, slots: &mut [StackSlot], reg_size: u8) -> CompileResult<u64>;
}

/// Lays slots out by descending alignment starting at offset 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialAllocator;

fn align_up(n: u64, align: u64) -> CompileResult<u64> {
    if align <= 1 {
        return Ok(n);
    }
    n.checked_next_multiple_of(align).ok_or_else(frame_overflow)
}

impl FrameAllocator for SequentialAllocator {
    fn allocate_frame(&self, slots: &mut [StackSlot], reg_size: u8) -> CompileResult<u64> {
        let mut order: Vec<usize> = (0..slots.len()).collect();
        order.sort_by(|&a, &b| slots[b].align.cmp(&slots[a].align));

        let mut offset = 0u64;
        for idx in order {
            let slot = &mut slots[idx];
            offset = align_up(offset, slot.align)?;
            slot.offset = Some(i64::try_from(offset).map_err(|_| frame_overflow())?);
            offset = offset.checked_add(slot.size).ok_or_else(frame_overflow)?;
        }
        align_up(offset, reg_size as u64)
    }
}

#[derive(Debug, Clone)]
pub struct FrameLayout {
    slots: Vec<StackSlot>,
    size: u64,
    state: FrameState,
    zero_ranges: Vec<ZeroRange>,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLayout {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            size: 0,
            state: FrameState::Unallocated,
            zero_ranges: Vec::new(),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Total frame size in bytes; 0 until allocated.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn slots(&self) -> &[StackSlot] {
        &self.slots
    }

    pub fn slot(&self, id: SlotId) -> Option<&StackSlot> {
        self.slots.get(id.0 as usize)
    }

    pub fn find_slot(&self, name: &str) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.name == name)
            .map(|i| SlotId(i as u32))
    }

    pub fn zero_ranges(&self) -> &[ZeroRange] {
        &self.zero_ranges
    }

    /// Assigned offset of a slot.
    pub fn slot_offset(&self, id: SlotId) -> CompileResult<i64> {
        self.slot(id)
            .and_then(|s| s.offset)
            .ok_or_else(|| CompileError::internal(format!("stack slot {id} has no offset")))
    }

    fn expect_state(&self, want: FrameState, action: &str) -> CompileResult<()> {
        if self.state != want {
            return Err(CompileError::internal(format!(
                "cannot {action} in frame state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    pub fn add_slot(&mut self, slot: StackSlot) -> CompileResult<SlotId> {
        self.expect_state(FrameState::Unallocated, "add a stack slot")?;
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(slot);
        Ok(id)
    }

    /// Assign offsets through the front-end allocator.
    pub fn allocate(&mut self, allocator: &dyn FrameAllocator, reg_size: u8) -> CompileResult<u64> {
        self.expect_state(FrameState::Unallocated, "allocate the frame")?;
        let size = allocator.allocate_frame(&mut self.slots, reg_size)?;
        if size > MAX_FRAME_SIZE {
            return Err(CompileError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        for slot in &self.slots {
            let offset = slot.offset.ok_or_else(|| {
                CompileError::internal(format!("allocator left slot {} unplaced", slot.name))
            })?;
            let end = u64::try_from(offset)
                .ok()
                .and_then(|start| start.checked_add(slot.size));
            if end.map_or(true, |end| end > size) {
                return Err(CompileError::internal(format!(
                    "slot {} at offset {} does not fit in a {} byte frame",
                    slot.name, offset, size
                )));
            }
        }

        self.size = size;
        self.state = FrameState::Allocated;
        Ok(size)
    }

    /// Merge the slots that need zeroing into ranges.
    ///
    /// Slots separated by at most `2 * reg_size` bytes share a range.
    pub fn plan_zeroing(&mut self, reg_size: u8) -> CompileResult<&[ZeroRange]> {
        self.expect_state(FrameState::Allocated, "plan stack zeroing")?;

        let mut pending: Vec<ZeroRange> = self
            .slots
            .iter()
            .filter(|s| s.needs_zero && s.size > 0)
            .filter_map(|s| {
                s.offset.map(|offset| ZeroRange {
                    offset,
                    size: s.size,
                })
            })
            .collect();
        pending.sort_by_key(|r| r.offset);

        let slack = 2 * reg_size as i64;
        let mut ranges: Vec<ZeroRange> = Vec::new();
        for r in pending {
            match ranges.last_mut() {
                Some(last) if r.offset <= last.end().saturating_add(slack) => {
                    let end = last.end().max(r.end());
                    last.size = (end - last.offset) as u64;
                }
                _ => ranges.push(r),
            }
        }

        trace!("zeroing plan: {:?}", ranges);
        self.zero_ranges = ranges;
        self.state = FrameState::ZeroingPlanned;
        Ok(&self.zero_ranges)
    }

    /// Freeze the layout, optionally at a padded size.
    pub fn finalize(&mut self, padded: Option<u64>) -> CompileResult<u64> {
        self.expect_state(FrameState::ZeroingPlanned, "finalize the frame")?;
        if let Some(size) = padded {
            if size < self.size {
                return Err(CompileError::internal(format!(
                    "frame padding shrinks the frame from {} to {}",
                    self.size, size
                )));
            }
            self.size = size;
        }
        self.state = FrameState::Finalized;
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocated(slots: &[(&str, u64, u64, bool)]) -> FrameLayout {
        let mut frame = FrameLayout::new();
        for &(name, size, align, zero) in slots {
            frame.add_slot(StackSlot::new(name, size, align, zero)).unwrap();
        }
        frame.allocate(&SequentialAllocator, 8).unwrap();
        frame
    }

    #[test]
    fn test_sequential_allocation() {
        let frame = allocated(&[("a", 1, 1, false), ("b", 16, 8, true), ("c", 4, 4, false)]);
        let b = frame.find_slot("b").unwrap();
        let c = frame.find_slot("c").unwrap();
        let a = frame.find_slot("a").unwrap();
        assert_eq!(frame.slot_offset(b), Ok(0));
        assert_eq!(frame.slot_offset(c), Ok(16));
        assert_eq!(frame.slot_offset(a), Ok(20));
        assert_eq!(frame.size(), 24);
    }

    #[test]
    fn test_single_sensitive_slot_plan() {
        let mut frame = allocated(&[("buf", 16, 8, true)]);
        let ranges = frame.plan_zeroing(8).unwrap().to_vec();
        assert_eq!(ranges, vec![ZeroRange { offset: 0, size: 16 }]);
    }

    #[test]
    fn test_nearby_ranges_merge() {
        let mut frame = allocated(&[
            ("p", 8, 8, true),
            ("gap", 8, 8, false),
            ("q", 8, 8, true),
            ("far", 64, 8, false),
            ("r", 8, 8, true),
        ]);
        let ranges = frame.plan_zeroing(8).unwrap().to_vec();
        assert_eq!(
            ranges,
            vec![
                ZeroRange { offset: 0, size: 24 },
                ZeroRange { offset: 88, size: 8 }
            ]
        );
    }

    #[test]
    fn test_no_slot_after_allocation() {
        let mut frame = allocated(&[("x", 8, 8, false)]);
        let err = frame.add_slot(StackSlot::new("late", 8, 8, false)).unwrap_err();
        assert!(err.is_internal());

        frame.plan_zeroing(8).unwrap();
        frame.finalize(None).unwrap();
        assert_eq!(frame.state(), FrameState::Finalized);
        assert!(frame.add_slot(StackSlot::new("later", 8, 8, false)).is_err());
        assert!(frame.finalize(None).is_err());
    }

    #[test]
    fn test_out_of_order_transitions() {
        let mut frame = FrameLayout::new();
        assert!(frame.plan_zeroing(8).is_err());
        assert!(frame.finalize(None).is_err());

        let mut frame = allocated(&[]);
        assert!(frame.finalize(None).is_err());
        assert!(frame.allocate(&SequentialAllocator, 8).is_err());
    }

    #[test]
    fn test_padding_cannot_shrink() {
        let mut frame = allocated(&[("x", 16, 8, false)]);
        frame.plan_zeroing(8).unwrap();
        assert!(frame.finalize(Some(8)).is_err());
    }

    struct Misplacing;

    impl FrameAllocator for Misplacing {
        fn allocate_frame(&self, slots: &mut [StackSlot], _reg_size: u8) -> CompileResult<u64> {
            for slot in slots.iter_mut() {
                slot.offset = Some(32);
            }
            Ok(8)
        }
    }

    #[test]
    fn test_allocator_result_checked() {
        let mut frame = FrameLayout::new();
        frame.add_slot(StackSlot::new("x", 8, 8, false)).unwrap();
        assert!(frame.allocate(&Misplacing, 8).unwrap_err().is_internal());
    }

    #[test]
    fn test_overflowing_slots_are_rejected() {
        let mut frame = FrameLayout::new();
        for name in ["a", "b", "c"] {
            frame
                .add_slot(StackSlot::new(name, i64::MAX as u64, 8, true))
                .unwrap();
        }
        let err = frame.allocate(&SequentialAllocator, 8).unwrap_err();
        assert!(matches!(err, CompileError::FrameTooLarge { .. }));
        assert_eq!(frame.state(), FrameState::Unallocated);
    }

    #[test]
    fn test_unaddressable_allocator_size_is_rejected() {
        struct Huge;
        impl FrameAllocator for Huge {
            fn allocate_frame(&self, slots: &mut [StackSlot], _: u8) -> CompileResult<u64> {
                for slot in slots.iter_mut() {
                    slot.offset = Some(0);
                }
                Ok(u64::MAX)
            }
        }
        let mut frame = FrameLayout::new();
        frame.add_slot(StackSlot::new("x", 8, 8, false)).unwrap();
        let err = frame.allocate(&Huge, 8).unwrap_err();
        assert_eq!(
            err,
            CompileError::FrameTooLarge {
                size: u64::MAX,
                max: MAX_FRAME_SIZE
            }
        );
    }

    #[test]
    fn test_range_end_saturates() {
        let range = ZeroRange {
            offset: 16,
            size: u64::MAX,
        };
        assert_eq!(range.end(), i64::MAX);
    }
}
