//! Dead value and unreachable block elimination.
//!
//! Reachability follows only the taken edge of `First` blocks, which are
//! turned into plain jumps on the way. A value is live when it has side
//! effects, controls a live block, or is an argument of a live value.

use super::RewriteStats;
use crate::ir::{BlockKind, Function, ValueId};
use hashbrown::HashSet;
use log::debug;
use smallvec::smallvec;

pub fn eliminate(func: &mut Function, stats: &mut RewriteStats) {
    let Some(entry) = func.entry() else {
        return;
    };

    // First blocks only ever take their first edge
    for block in func.block_order() {
        let b = func.block_mut(block);
        if b.kind == BlockKind::First {
            let taken = b.succs[0];
            b.kind = BlockKind::Plain;
            b.succs = smallvec![taken];
        }
    }

    let mut reachable = HashSet::new();
    let mut worklist = vec![entry];
    while let Some(block) = worklist.pop() {
        if !reachable.insert(block) {
            continue;
        }
        worklist.extend(func.block(block).succs.iter().copied());
    }

    let mut blocks_removed = 0;
    for block in func.block_order() {
        if !reachable.contains(&block) {
            func.remove_block(block);
            blocks_removed += 1;
        }
    }

    let mut live: HashSet<ValueId> = HashSet::new();
    let mut worklist: Vec<ValueId> = Vec::new();
    for block in func.block_order() {
        let b = func.block(block);
        worklist.extend(b.control);
        worklist.extend(
            b.values
                .iter()
                .copied()
                .filter(|&v| !func.value(v).op.info().pure),
        );
    }
    while let Some(v) = worklist.pop() {
        if live.insert(v) {
            worklist.extend(func.value(v).args.iter().copied());
        }
    }

    let mut values_removed = 0;
    for block in func.block_order() {
        let values = &mut func.block_mut(block).values;
        let before = values.len();
        values.retain(|v| live.contains(v));
        values_removed += before - values.len();
    }

    if values_removed > 0 || blocks_removed > 0 {
        debug!(
            "{}: removed {} dead values and {} unreachable blocks",
            func.name, values_removed, blocks_removed
        );
    }
    stats.dead_values_removed += values_removed;
    stats.dead_blocks_removed += blocks_removed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_module, BlockId};

    #[test]
    fn test_removes_unused_pure_values() {
        let mut func = parse_module(
            "func f {\n  slot s 8 8\nb0:\n  a = const64 $1\n  b = const64 $2\n  p = localaddr %s\n  store p a\n  ret\n}",
        )
        .unwrap()
        .remove(0);
        let mut stats = RewriteStats::default();
        eliminate(&mut func, &mut stats);
        assert_eq!(stats.dead_values_removed, 1);
        assert_eq!(func.block(BlockId(0)).values.len(), 3);
        func.verify().unwrap();
    }

    #[test]
    fn test_drops_untaken_first_edge() {
        let mut func = parse_module(
            "func f {\nb0:\n  first yes no\nyes:\n  ret\nno:\n  c = const64 $3\n  ret c\n}",
        )
        .unwrap()
        .remove(0);
        let mut stats = RewriteStats::default();
        eliminate(&mut func, &mut stats);
        assert_eq!(stats.dead_blocks_removed, 1);
        assert_eq!(func.block(BlockId(0)).kind, BlockKind::Plain);
        assert_eq!(func.block_order(), vec![BlockId(0), BlockId(1)]);
        func.verify().unwrap();
    }
}
