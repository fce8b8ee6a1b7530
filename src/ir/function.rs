// This module holds the in-memory form of one IR function: the value table, the ordered
// block list, the target configuration derived from the selected descriptor, and the frame
// layout. Rewrite passes mutate it in place; lowering only reads it. verify() checks the
// structural invariants every pass relies on: successor counts match the block kind, every
// argument and control value is defined earlier in block order, and fixed-arity opcodes have
// the right number of arguments.

//! IR functions, blocks and values.

use super::frame::{FrameLayout, SlotId, StackSlot};
use super::{Aux, BlockId, Op, Type, ValueId, DEFAULT_INT_SIZE};
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashSet;
use smallvec::SmallVec;
use std::fmt;

/// Target parameters a function is compiled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub target: &'static str,
    /// Pointer width in bytes.
    pub ptr_size: u8,
    /// General purpose register width in bytes.
    pub reg_size: u8,
    /// Native integer width in bytes.
    pub int_size: u8,
    pub big_endian: bool,
    /// Keeps 64-bit integers whole even though `int_size` is 4.
    pub narrow_excluded: bool,
}

impl Config {
    /// Whether 64-bit integer values have to be decomposed into 32-bit halves.
    pub fn narrow_int64(&self) -> bool {
        self.int_size == 4 && self.int_size < DEFAULT_INT_SIZE && !self.narrow_excluded
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: "amd64",
            ptr_size: 8,
            reg_size: 8,
            int_size: 8,
            big_endian: false,
            narrow_excluded: false,
        }
    }
}

/// A single IR operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueData {
    pub op: Op,
    pub ty: Type,
    pub args: SmallVec<[ValueId; 3]>,
    pub aux: Aux,
    /// Block the value is scheduled in.
    pub block: BlockId,
}

/// Control transfer at the end of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Unconditional jump to the single successor.
    Plain,
    /// Two-way branch on the control value: `succs[0]` if true.
    If,
    /// Return, optionally with a control value as result.
    Ret,
    /// Does not return (panic, exit call).
    Exit,
    /// Two successors, only the first one is ever taken.
    First,
}

impl BlockKind {
    pub fn successor_count(self) -> usize {
        match self {
            BlockKind::Plain => 1,
            BlockKind::If | BlockKind::First => 2,
            BlockKind::Ret | BlockKind::Exit => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub control: Option<ValueId>,
    pub values: Vec<ValueId>,
    pub succs: SmallVec<[BlockId; 2]>,
    /// Set by dead code elimination; removed blocks keep their id.
    pub removed: bool,
}

/// One IR function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub config: Config,
    pub frame: FrameLayout,
    values: Vec<ValueData>,
    blocks: Vec<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            frame: FrameLayout::new(),
            values: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Append a block; the first block created is the entry.
    pub fn new_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            kind,
            control: None,
            values: Vec::new(),
            succs: SmallVec::new(),
            removed: false,
        });
        id
    }

    /// Create a value without scheduling it in its block.
    pub fn alloc_value(
        &mut self,
        block: BlockId,
        op: Op,
        ty: Type,
        args: &[ValueId],
        aux: Aux,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            op,
            ty,
            args: SmallVec::from_slice(args),
            aux,
            block,
        });
        id
    }

    /// Create a value at the end of `block`.
    pub fn new_value(
        &mut self,
        block: BlockId,
        op: Op,
        ty: Type,
        args: &[ValueId],
        aux: Aux,
    ) -> ValueId {
        let id = self.alloc_value(block, op, ty, args, aux);
        self.blocks[block.index()].values.push(id);
        id
    }

    /// Create a value whose type is the fixed result type of `op`.
    pub fn new_typed(&mut self, block: BlockId, op: Op, args: &[ValueId], aux: Aux) -> ValueId {
        let ty = op.info().result.unwrap_or(Type::I64);
        self.new_value(block, op, ty, args, aux)
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    /// Live blocks in layout order.
    pub fn block_order(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| !b.removed)
            .map(|b| b.id)
            .collect()
    }

    /// Set the kind and control value of a block.
    pub fn set_control(&mut self, block: BlockId, kind: BlockKind, control: Option<ValueId>) {
        let b = &mut self.blocks[block.index()];
        b.kind = kind;
        b.control = control;
    }

    pub fn add_succ(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.push(to);
    }

    pub fn remove_block(&mut self, block: BlockId) {
        let b = &mut self.blocks[block.index()];
        b.removed = true;
        b.values.clear();
        b.control = None;
        b.succs.clear();
    }

    /// Declare a stack slot; only valid before the frame is allocated.
    pub fn add_slot(
        &mut self,
        name: impl Into<String>,
        size: u64,
        align: u64,
        needs_zero: bool,
    ) -> CompileResult<SlotId> {
        self.frame.add_slot(StackSlot::new(name, size, align, needs_zero))
    }

    /// Check the structural invariants of the function.
    pub fn verify(&self) -> CompileResult<()> {
        if self.blocks.is_empty() {
            return Err(CompileError::internal(format!(
                "function {} has no blocks",
                self.name
            )));
        }

        let mut defined: HashSet<ValueId> = HashSet::new();
        for block in self.blocks.iter().filter(|b| !b.removed) {
            let want = block.kind.successor_count();
            if block.succs.len() != want {
                return Err(CompileError::internal(format!(
                    "{}: block {} of kind {:?} has {} successors, expected {}",
                    self.name,
                    block.id,
                    block.kind,
                    block.succs.len(),
                    want
                )));
            }
            for &succ in &block.succs {
                if succ.index() >= self.blocks.len() || self.blocks[succ.index()].removed {
                    return Err(CompileError::internal(format!(
                        "{}: block {} branches to missing block {}",
                        self.name, block.id, succ
                    )));
                }
            }

            for &v in &block.values {
                let data = &self.values[v.index()];
                if data.block != block.id {
                    return Err(CompileError::internal(format!(
                        "{}: {} is scheduled in {} but belongs to {}",
                        self.name, v, block.id, data.block
                    )));
                }
                if let Some(n) = data.op.info().args {
                    if data.args.len() != n as usize {
                        return Err(CompileError::internal(format!(
                            "{}: {} ({}) has {} arguments, expected {}",
                            self.name,
                            v,
                            data.op,
                            data.args.len(),
                            n
                        )));
                    }
                }
                for arg in &data.args {
                    if !defined.contains(arg) {
                        return Err(CompileError::internal(format!(
                            "{}: {} uses {} before its definition",
                            self.name, v, arg
                        )));
                    }
                }
                if !defined.insert(v) {
                    return Err(CompileError::internal(format!(
                        "{}: {} is scheduled twice",
                        self.name, v
                    )));
                }
            }

            match (block.kind, block.control) {
                (BlockKind::If, None) => {
                    return Err(CompileError::internal(format!(
                        "{}: if block {} has no condition",
                        self.name, block.id
                    )));
                }
                (_, Some(c)) if !defined.contains(&c) => {
                    return Err(CompileError::internal(format!(
                        "{}: block {} is controlled by undefined {}",
                        self.name, block.id, c
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn fmt_aux(&self, f: &mut fmt::Formatter<'_>, aux: &Aux) -> fmt::Result {
        match aux {
            Aux::None => Ok(()),
            Aux::Int(c) => write!(f, " ${c}"),
            Aux::Sym(s) => write!(f, " @{s}"),
            Aux::Slot(slot) => match self.frame.slot(*slot) {
                Some(s) => write!(f, " %{}", s.name),
                None => write!(f, " %{}", slot),
            },
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {} {{", self.name)?;
        for slot in self.frame.slots() {
            write!(f, "  slot {} {} {}", slot.name, slot.size, slot.align)?;
            if slot.needs_zero {
                write!(f, " zero")?;
            }
            writeln!(f)?;
        }
        for block in self.blocks.iter().filter(|b| !b.removed) {
            writeln!(f, "{}:", block.id)?;
            for &v in &block.values {
                let data = &self.values[v.index()];
                write!(f, "  {} = {}", v, data.op)?;
                if data.op.info().result != Some(data.ty) {
                    write!(f, ".{}", data.ty)?;
                }
                self.fmt_aux(f, &data.aux)?;
                for arg in &data.args {
                    write!(f, " {arg}")?;
                }
                writeln!(f)?;
            }
            match block.kind {
                BlockKind::Plain => writeln!(f, "  jump {}", block.succs[0])?,
                BlockKind::If => {
                    let cond = block.control.map(|c| c.to_string()).unwrap_or_default();
                    writeln!(f, "  if {} {} {}", cond, block.succs[0], block.succs[1])?
                }
                BlockKind::First => {
                    writeln!(f, "  first {} {}", block.succs[0], block.succs[1])?
                }
                BlockKind::Ret => match block.control {
                    Some(c) => writeln!(f, "  ret {c}")?,
                    None => writeln!(f, "  ret")?,
                },
                BlockKind::Exit => writeln!(f, "  exit")?,
            }
        }
        writeln!(f, "}}")
    }
}
