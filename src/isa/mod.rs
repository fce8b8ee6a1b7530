// This module is the seam between the target independent pipeline and the per-architecture
// backends. A Descriptor is an immutable static record per supported target identifier: the
// link-architecture parameters (pointer, register and native integer width, endianness), the
// stack pointer register, the largest addressable frame, and a handle to the architecture's
// LowerBackend. LowerBackend is a sealed trait with one unit type per architecture family; it
// lowers values and block terminators into machine instructions, annotates register moves,
// zeroes stack memory, emits no-ops and optionally pads the frame. Machine instructions carry
// an architecture-tagged mnemonic, a SmallVec of operands, and a move mark consumed by the
// external register allocator. Emission goes through an arena backed Emitter owned by the
// compilation session.

//! Architecture descriptors and the machine instruction model.
//!
//! # Families
//!
//! - [`amd64`]: `amd64` and `amd64p32`
//! - [`arm64`]: `arm64`
//! - [`mips`]: `mips` and `mipsle`
//! - [`s390x`]: `s390x`

/// Declares an architecture's `Mnemonic` enum together with its name table.
macro_rules! mnemonics {
    ($family:ident; $($name:ident),* $(,)?) => {
        /// Assembler mnemonics.
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($name),*
        }

        /// Mnemonic names, indexed by `Mnemonic as usize`.
        pub static ANAMES: &[&str] = &[$(stringify!($name)),*];

        impl Mnemonic {
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$name),*];

            pub fn name(self) -> &'static str {
                ANAMES[self as usize]
            }
        }

        impl From<Mnemonic> for $crate::isa::MachOp {
            fn from(m: Mnemonic) -> Self {
                $crate::isa::MachOp::$family(m)
            }
        }
    };
}

/// Declares an architecture's `OperandClass` enum and its display table.
macro_rules! operand_classes {
    ($($class:ident => $name:literal),* $(,)?) => {
        /// Operand classes used for diagnostics and shape validation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OperandClass {
            $($class),*
        }

        /// Class names, indexed by `OperandClass as usize`.
        pub static CNAMES: &[&str] = &[$($name),*];

        impl OperandClass {
            pub fn name(self) -> &'static str {
                CNAMES[self as usize]
            }
        }
    };
}

pub mod amd64;
pub mod arm64;
pub mod mips;
pub mod s390x;

use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::ir::{BlockId, Config, FrameLayout, Function, SlotId, ValueData, ValueId};
use bitflags::bitflags;
use bumpalo::collections::Vec as BumpVec;
use hashbrown::HashSet;
use smallvec::SmallVec;
use std::fmt;

/// Instruction set family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Amd64,
    Arm64,
    Mips,
    S390x,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::Amd64 => "amd64",
            Family::Arm64 => "arm64",
            Family::Mips => "mips",
            Family::S390x => "s390x",
        }
    }

    pub fn reg_name(self, reg: u8) -> &'static str {
        let names = match self {
            Family::Amd64 => amd64::names::REGISTER_NAMES,
            Family::Arm64 => arm64::names::REGISTER_NAMES,
            Family::Mips => mips::names::REGISTER_NAMES,
            Family::S390x => s390x::names::REGISTER_NAMES,
        };
        names.get(reg as usize).copied().unwrap_or("R?")
    }
}

/// Link-level description of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkArch {
    pub name: &'static str,
    pub family: Family,
    pub ptr_size: u8,
    pub reg_size: u8,
    pub int_size: u8,
    pub big_endian: bool,
    /// Exempt from 64-bit narrowing despite a 4-byte `int_size`.
    pub narrow_excluded: bool,
}

/// Machine register: a physical register number or a virtual register
/// named after the IR value it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Phys(u8),
    Virt(u32),
}

/// Branch and set conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    /// Unsigned lower.
    Lo,
}

impl Cond {
    pub fn name(self) -> &'static str {
        match self {
            Cond::Eq => "EQ",
            Cond::Ne => "NE",
            Cond::Lt => "LT",
            Cond::Lo => "LO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    /// `offset(base)`
    Mem { base: Reg, offset: i64 },
    /// Incoming argument at `offset(FP)`.
    Param(i64),
    Label(BlockId),
    /// Instruction index inside the function, for local loops.
    Pc(usize),
    /// Memory at `name+offset(SB)`.
    Sym { name: String, offset: i64 },
    /// Address `$name+offset(SB)`.
    SymAddr { name: String, offset: i64 },
    Cond(Cond),
}

impl Operand {
    pub fn phys(reg: u8) -> Self {
        Operand::Reg(Reg::Phys(reg))
    }

    pub fn mem(base: u8, offset: i64) -> Self {
        Operand::Mem {
            base: Reg::Phys(base),
            offset,
        }
    }

    pub fn is_branch_target(&self) -> bool {
        matches!(self, Operand::Label(_) | Operand::Pc(_))
    }

    fn fmt_in(&self, f: &mut fmt::Formatter<'_>, family: Family) -> fmt::Result {
        let reg = |r: &Reg| match r {
            Reg::Phys(n) => family.reg_name(*n).to_string(),
            Reg::Virt(n) => format!("v{n}"),
        };
        match self {
            Operand::Reg(r) => f.write_str(&reg(r)),
            Operand::Imm(c) => write!(f, "${c}"),
            Operand::Mem { base, offset } => write!(f, "{}({})", offset, reg(base)),
            Operand::Param(offset) => write!(f, "{offset}(FP)"),
            Operand::Label(b) => write!(f, "{b}"),
            Operand::Pc(pc) => write!(f, "pc{pc}"),
            Operand::Sym { name, offset } => write!(f, "{name}+{offset}(SB)"),
            Operand::SymAddr { name, offset } => write!(f, "${name}+{offset}(SB)"),
            Operand::Cond(c) => f.write_str(c.name()),
        }
    }
}

/// Architecture tagged mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachOp {
    Amd64(amd64::Mnemonic),
    Arm64(arm64::Mnemonic),
    Mips(mips::Mnemonic),
    S390x(s390x::Mnemonic),
}

impl MachOp {
    pub fn name(self) -> &'static str {
        match self {
            MachOp::Amd64(m) => m.name(),
            MachOp::Arm64(m) => m.name(),
            MachOp::Mips(m) => m.name(),
            MachOp::S390x(m) => m.name(),
        }
    }

    pub fn family(self) -> Family {
        match self {
            MachOp::Amd64(_) => Family::Amd64,
            MachOp::Arm64(_) => Family::Arm64,
            MachOp::Mips(_) => Family::Mips,
            MachOp::S390x(_) => Family::S390x,
        }
    }
}

/// One machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub op: MachOp,
    pub args: SmallVec<[Operand; 4]>,
    /// Pure register to register move.
    pub is_move: bool,
}

impl Inst {
    pub fn new(op: impl Into<MachOp>, args: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            op: op.into(),
            args: args.into_iter().collect(),
            is_move: false,
        }
    }

    /// Symbol this instruction needs a relocation for.
    pub fn symbol(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            Operand::Sym { name, .. } | Operand::SymAddr { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn mnemonic(&self) -> &'static str {
        self.op.name()
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.name())?;
        let family = self.op.family();
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "\t" } else { ", " })?;
            arg.fmt_in(f, family)?;
        }
        Ok(())
    }
}

bitflags! {
    /// Operand usage and control flow properties of a mnemonic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstrInfo: u16 {
        const LEFT_READ = 1 << 0;
        const REG_READ = 1 << 1;
        const RIGHT_READ = 1 << 2;
        const RIGHT_WRITE = 1 << 3;
        const JUMP = 1 << 4;
        const CALL = 1 << 5;
        const BREAK = 1 << 6;
        const MOVE = 1 << 7;
        const SET_CARRY = 1 << 8;
        const USE_CARRY = 1 << 9;
        const SIZE_B = 1 << 10;
        const SIZE_W = 1 << 11;
        const SIZE_L = 1 << 12;
        const SIZE_Q = 1 << 13;
    }
}

/// Values a backend identified as register to register moves.
pub type MoveMarks = HashSet<ValueId>;

/// Mark every copy in `block`; shared by backends that track moves.
pub fn mark_copies(func: &Function, block: BlockId) -> MoveMarks {
    func.block(block)
        .values
        .iter()
        .copied()
        .filter(|&v| {
            let data = func.value(v);
            data.op == crate::ir::Op::Copy && !func.value(data.args[0]).op.is_const()
        })
        .collect()
}

/// Arena backed instruction buffer for one function.
pub struct Emitter<'a> {
    session: &'a CompilationSession<'a>,
    insts: BumpVec<'a, Inst>,
    block_starts: Vec<(BlockId, usize)>,
}

impl<'a> Emitter<'a> {
    pub fn new(session: &'a CompilationSession<'a>) -> Self {
        Self {
            session,
            insts: session.new_vec(),
            block_starts: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: Inst) -> usize {
        self.session.record_instruction(inst.mnemonic());
        self.insts.push(inst);
        self.insts.len() - 1
    }

    pub fn emit(
        &mut self,
        op: impl Into<MachOp>,
        args: impl IntoIterator<Item = Operand>,
    ) -> usize {
        self.push(Inst::new(op, args))
    }

    /// Index the next instruction will get.
    pub fn pc(&self) -> usize {
        self.insts.len()
    }

    pub fn start_block(&mut self, block: BlockId) {
        self.block_starts.push((block, self.insts.len()));
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn session(&self) -> &'a CompilationSession<'a> {
        self.session
    }

    /// Copy the emitted code out of the arena.
    pub fn finish(self) -> (Vec<Inst>, Vec<(BlockId, usize)>) {
        (self.insts.iter().cloned().collect(), self.block_starts)
    }
}

/// State handed to the lowering callbacks.
pub struct LowerCtx<'c, 'a> {
    pub func: &'c Function,
    pub em: &'c mut Emitter<'a>,
    pub marks: &'c MoveMarks,
}

impl<'c, 'a> LowerCtx<'c, 'a> {
    pub fn value(&self, v: ValueId) -> &'c ValueData {
        self.func.value(v)
    }

    pub fn config(&self) -> Config {
        self.func.config
    }

    /// Register holding `v`.
    pub fn reg(&self, v: ValueId) -> Operand {
        Operand::Reg(Reg::Virt(v.0))
    }

    pub fn emit(&mut self, op: impl Into<MachOp>, args: impl IntoIterator<Item = Operand>) {
        self.em.emit(op, args);
    }

    /// Emit a move, flagged when `v` was marked as a register move.
    pub fn emit_move(
        &mut self,
        v: ValueId,
        op: impl Into<MachOp>,
        args: impl IntoIterator<Item = Operand>,
    ) {
        let mut inst = Inst::new(op, args);
        inst.is_move = self.marks.contains(&v);
        self.em.push(inst);
    }

    pub fn slot_offset(&self, slot: SlotId) -> CompileResult<i64> {
        self.func.frame.slot_offset(slot)
    }

    /// Error for a value this target has no lowering for.
    pub fn unsupported(&self, v: ValueId) -> CompileError {
        CompileError::LoweringFailure {
            target: self.func.config.target,
            op: self.func.value(v).op.name(),
        }
    }
}

/// Split `size` bytes into the widest stores of at most `word` bytes.
pub(crate) fn store_widths(size: u64, word: u64) -> Vec<(i64, u64)> {
    let mut out = Vec::new();
    let mut off = 0u64;
    let mut width = word;
    while off < size {
        while width > size - off {
            width /= 2;
        }
        out.push((off as i64, width));
        off += width;
    }
    out
}

mod sealed {
    pub trait Sealed {}
}

/// Per-architecture lowering callbacks.
pub trait LowerBackend: Send + Sync + sealed::Sealed {
    fn family(&self) -> Family;

    /// Lower one value; called in block order.
    fn lower_value(&self, ctx: &mut LowerCtx<'_, '_>, v: ValueId) -> CompileResult<()>;

    /// Lower the control transfer ending `block`; `next` is the block laid out after it.
    fn lower_block(
        &self,
        ctx: &mut LowerCtx<'_, '_>,
        block: BlockId,
        next: Option<BlockId>,
    ) -> CompileResult<()>;

    /// Values of `block` that are register to register moves.
    fn mark_moves(&self, _func: &Function, _block: BlockId) -> MoveMarks {
        MoveMarks::new()
    }

    /// Zero `size` bytes of the frame starting at `offset`.
    fn zero_range(&self, em: &mut Emitter<'_>, offset: i64, size: u64) -> CompileResult<()>;

    /// Zero a single stack slot.
    fn zero_auto(&self, em: &mut Emitter<'_>, frame: &FrameLayout, slot: SlotId)
        -> CompileResult<()>;

    fn emit_nop(&self, em: &mut Emitter<'_>);

    /// Adjusted frame size for targets with extra alignment rules.
    fn pad_frame(&self, _frame_size: u64) -> Option<u64> {
        None
    }

    fn instr_info(&self, _op: MachOp) -> Option<InstrInfo> {
        None
    }

    /// Operand class index, for diagnostics.
    fn operand_class(&self, operand: &Operand) -> usize;

    fn operand_class_names(&self) -> &'static [&'static str];

    fn is_extended_operand_instruction(&self, _op: MachOp) -> bool {
        false
    }
}

/// Immutable description of one supported target.
pub struct Descriptor {
    pub link: LinkArch,
    pub reg_sp: u8,
    /// Largest frame size the target can address.
    pub max_width: u64,
    pub backend: &'static dyn LowerBackend,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("link", &self.link)
            .field("reg_sp", &self.reg_sp)
            .field("max_width", &self.max_width)
            .finish()
    }
}

/// Operands an instruction may take unless it is an extended-operand one.
pub const MAX_OPERANDS: usize = 3;

impl Descriptor {
    pub fn name(&self) -> &'static str {
        self.link.name
    }

    pub fn backend(&self) -> &'static dyn LowerBackend {
        self.backend
    }

    /// IR configuration for functions compiled for this target.
    pub fn config(&self) -> Config {
        Config {
            target: self.link.name,
            ptr_size: self.link.ptr_size,
            reg_size: self.link.reg_size,
            int_size: self.link.int_size,
            big_endian: self.link.big_endian,
            narrow_excluded: self.link.narrow_excluded,
        }
    }

    /// Display name of an operand class index.
    pub fn operand_class_name(&self, idx: usize) -> CompileResult<&'static str> {
        self.backend
            .operand_class_names()
            .get(idx)
            .copied()
            .ok_or_else(|| {
                CompileError::internal(format!(
                    "operand class {} out of range for {}",
                    idx, self.link.name
                ))
            })
    }

    pub fn classify(&self, operand: &Operand) -> CompileResult<&'static str> {
        self.operand_class_name(self.backend.operand_class(operand))
    }

    pub fn is_extended_operand_instruction(&self, op: MachOp) -> bool {
        self.backend.is_extended_operand_instruction(op)
    }

    pub fn max_operands(&self, op: MachOp) -> usize {
        if self.is_extended_operand_instruction(op) {
            MAX_OPERANDS + 1
        } else {
            MAX_OPERANDS
        }
    }

    /// Check the operand shape of an emitted instruction.
    pub fn validate(&self, inst: &Inst) -> CompileResult<()> {
        if inst.op.family() != self.link.family {
            return Err(CompileError::internal(format!(
                "{} instruction {} emitted for {}",
                inst.op.family().name(),
                inst.op.name(),
                self.link.name
            )));
        }
        let max = self.max_operands(inst.op);
        if inst.args.len() > max {
            return Err(CompileError::internal(format!(
                "{} takes at most {} operands, got {}",
                inst.op.name(),
                max,
                inst.args.len()
            )));
        }
        if let Some(info) = self.backend.instr_info(inst.op) {
            if info.contains(InstrInfo::JUMP) && !inst.args.iter().any(Operand::is_branch_target) {
                return Err(CompileError::internal(format!(
                    "branch {} has no target",
                    inst.op.name()
                )));
            }
        }
        for arg in &inst.args {
            self.classify(arg)?;
        }
        Ok(())
    }
}

pub static AMD64: Descriptor = Descriptor {
    link: LinkArch {
        name: "amd64",
        family: Family::Amd64,
        ptr_size: 8,
        reg_size: 8,
        int_size: 8,
        big_endian: false,
        narrow_excluded: false,
    },
    reg_sp: amd64::names::REG_SP,
    max_width: 1 << 50,
    backend: &amd64::Amd64Backend,
};

pub static AMD64P32: Descriptor = Descriptor {
    link: LinkArch {
        name: "amd64p32",
        family: Family::Amd64,
        ptr_size: 4,
        reg_size: 8,
        int_size: 4,
        big_endian: false,
        narrow_excluded: true,
    },
    reg_sp: amd64::names::REG_SP,
    max_width: 1 << 50,
    backend: &amd64::Amd64Backend,
};

pub static ARM64: Descriptor = Descriptor {
    link: LinkArch {
        name: "arm64",
        family: Family::Arm64,
        ptr_size: 8,
        reg_size: 8,
        int_size: 8,
        big_endian: false,
        narrow_excluded: false,
    },
    reg_sp: arm64::names::REGSP,
    max_width: 1 << 50,
    backend: &arm64::Arm64Backend,
};

pub static MIPS: Descriptor = Descriptor {
    link: LinkArch {
        name: "mips",
        family: Family::Mips,
        ptr_size: 4,
        reg_size: 4,
        int_size: 4,
        big_endian: true,
        narrow_excluded: false,
    },
    reg_sp: mips::names::REGSP,
    max_width: (1 << 31) - 1,
    backend: &mips::MipsBackend,
};

pub static MIPSLE: Descriptor = Descriptor {
    link: LinkArch {
        name: "mipsle",
        family: Family::Mips,
        ptr_size: 4,
        reg_size: 4,
        int_size: 4,
        big_endian: false,
        narrow_excluded: false,
    },
    reg_sp: mips::names::REGSP,
    max_width: (1 << 31) - 1,
    backend: &mips::MipsBackend,
};

pub static S390X: Descriptor = Descriptor {
    link: LinkArch {
        name: "s390x",
        family: Family::S390x,
        ptr_size: 8,
        reg_size: 8,
        int_size: 8,
        big_endian: true,
        narrow_excluded: false,
    },
    reg_sp: s390x::names::REGSP,
    max_width: 1 << 50,
    backend: &s390x::S390xBackend,
};

/// Every supported target, in the order they are listed to users.
pub static DESCRIPTORS: [&Descriptor; 6] = [&AMD64, &AMD64P32, &ARM64, &MIPS, &MIPSLE, &S390X];
