//! Machine independent SSA intermediate representation.
//!
//! A [`Function`] is an ordered list of [`Block`]s; each block holds an
//! ordered list of values and ends in a control transfer described by its
//! [`BlockKind`]. Values are stored in a per-function table and referenced by
//! [`ValueId`]; arguments always refer to values defined earlier in block
//! order.
//!
//! # Text Format
//!
//! ```text
//! ; Comments start with semicolon
//! func add_one {
//!   slot buf 16 8 zero
//! entry:
//!   a = arg.i64 $0
//!   one = const64 $1
//!   r = add64 a one
//!   ret r
//! }
//! ```

pub mod frame;
pub mod function;
pub mod parser;

pub use frame::{
    FrameAllocator, FrameLayout, FrameState, SequentialAllocator, SlotId, StackSlot, ZeroRange,
};
pub use function::{Block, BlockKind, Config, Function, ValueData};
pub use parser::parse_module;

use std::fmt;

/// Integer width, in bytes, the IR assumes for `*64` operations.
pub const DEFAULT_INT_SIZE: u8 = 8;

/// Index of a value in its function's value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Index of a block in its function's block table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Result type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    Ptr,
    /// A 32-bit result paired with a carry/borrow bit.
    Tuple,
    Flags,
}

impl Type {
    /// Size in bytes for a target with the given pointer size.
    pub fn size(self, ptr_size: u8) -> u64 {
        match self {
            Type::Void | Type::Flags => 0,
            Type::Bool | Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 => 4,
            Type::I64 | Type::Tuple => 8,
            Type::Ptr => ptr_size as u64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Bool => "bool",
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::Ptr => "ptr",
            Type::Tuple => "tuple",
            Type::Flags => "flags",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "void" => Type::Void,
            "bool" => Type::Bool,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "ptr" => Type::Ptr,
            "tuple" => Type::Tuple,
            "flags" => Type::Flags,
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Auxiliary payload carried by a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Aux {
    #[default]
    None,
    /// Immediate constant, or a byte offset for `Arg` and `OffPtr`.
    Int(i64),
    /// Symbol reference, carried through to relocations.
    Sym(String),
    /// Stack slot of the owning function's frame.
    Slot(SlotId),
}

impl Aux {
    pub fn int(&self) -> Option<i64> {
        match self {
            Aux::Int(c) => Some(*c),
            _ => None,
        }
    }

    pub fn sym(&self) -> Option<&str> {
        match self {
            Aux::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Aux::Slot(s) => Some(*s),
            _ => None,
        }
    }
}

/// Which kind of auxiliary payload an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxKind {
    None,
    Int,
    Sym,
    Slot,
}

/// IR opcodes.
///
/// The upper part is the machine independent set the front-end produces; the
/// `Int64*`, carry and `Select*` ops only appear after 64-bit narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Arg,
    Const8,
    Const16,
    Const32,
    Const64,
    ConstBool,
    Copy,
    Add32,
    Add64,
    Sub32,
    Sub64,
    Mul32,
    Mul64,
    Hmul32u,
    And32,
    And64,
    Or32,
    Or64,
    Xor32,
    Xor64,
    Neg32,
    Neg64,
    Eq32,
    Eq64,
    Neq32,
    Neq64,
    Less32,
    Less64,
    Less32U,
    Not,
    AndB,
    OrB,
    LocalAddr,
    Addr,
    OffPtr,
    Load,
    Store,
    VarZero,
    StaticCall,
    Int64Make,
    Int64Hi,
    Int64Lo,
    Add32Carry,
    Add32WithCarry,
    Sub32Carry,
    Sub32WithBorrow,
    Select0,
    Select1,
}

/// Static description of an opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    /// Fixed argument count; `None` for variadic ops.
    pub args: Option<u8>,
    pub aux: AuxKind,
    /// Result type when the op fixes it.
    pub result: Option<Type>,
    /// No side effects: the value may be removed when unused.
    pub pure: bool,
}

const fn info(
    name: &'static str,
    args: Option<u8>,
    aux: AuxKind,
    result: Option<Type>,
    pure: bool,
) -> OpInfo {
    OpInfo { name, args, aux, result, pure }
}

impl Op {
    pub const ALL: [Op; 48] = [
        Op::Arg, Op::Const8, Op::Const16, Op::Const32, Op::Const64, Op::ConstBool, Op::Copy,
        Op::Add32, Op::Add64, Op::Sub32, Op::Sub64, Op::Mul32, Op::Mul64, Op::Hmul32u,
        Op::And32, Op::And64, Op::Or32, Op::Or64, Op::Xor32, Op::Xor64, Op::Neg32, Op::Neg64,
        Op::Eq32, Op::Eq64, Op::Neq32, Op::Neq64, Op::Less32, Op::Less64, Op::Less32U,
        Op::Not, Op::AndB, Op::OrB, Op::LocalAddr, Op::Addr, Op::OffPtr, Op::Load, Op::Store,
        Op::VarZero, Op::StaticCall, Op::Int64Make, Op::Int64Hi, Op::Int64Lo, Op::Add32Carry,
        Op::Add32WithCarry, Op::Sub32Carry, Op::Sub32WithBorrow, Op::Select0, Op::Select1,
    ];

    pub const fn info(self) -> OpInfo {
        use AuxKind as A;
        use Op::*;
        const I32: Option<Type> = Some(Type::I32);
        const I64: Option<Type> = Some(Type::I64);
        const B: Option<Type> = Some(Type::Bool);
        const P: Option<Type> = Some(Type::Ptr);
        const V: Option<Type> = Some(Type::Void);
        match self {
            Arg => info("arg", Some(0), A::Int, None, true),
            Const8 => info("const8", Some(0), A::Int, Some(Type::I8), true),
            Const16 => info("const16", Some(0), A::Int, Some(Type::I16), true),
            Const32 => info("const32", Some(0), A::Int, I32, true),
            Const64 => info("const64", Some(0), A::Int, I64, true),
            ConstBool => info("constbool", Some(0), A::Int, B, true),
            Copy => info("copy", Some(1), A::None, None, true),
            Add32 => info("add32", Some(2), A::None, I32, true),
            Add64 => info("add64", Some(2), A::None, I64, true),
            Sub32 => info("sub32", Some(2), A::None, I32, true),
            Sub64 => info("sub64", Some(2), A::None, I64, true),
            Mul32 => info("mul32", Some(2), A::None, I32, true),
            Mul64 => info("mul64", Some(2), A::None, I64, true),
            Hmul32u => info("hmul32u", Some(2), A::None, I32, true),
            And32 => info("and32", Some(2), A::None, I32, true),
            And64 => info("and64", Some(2), A::None, I64, true),
            Or32 => info("or32", Some(2), A::None, I32, true),
            Or64 => info("or64", Some(2), A::None, I64, true),
            Xor32 => info("xor32", Some(2), A::None, I32, true),
            Xor64 => info("xor64", Some(2), A::None, I64, true),
            Neg32 => info("neg32", Some(1), A::None, I32, true),
            Neg64 => info("neg64", Some(1), A::None, I64, true),
            Eq32 => info("eq32", Some(2), A::None, B, true),
            Eq64 => info("eq64", Some(2), A::None, B, true),
            Neq32 => info("neq32", Some(2), A::None, B, true),
            Neq64 => info("neq64", Some(2), A::None, B, true),
            Less32 => info("less32", Some(2), A::None, B, true),
            Less64 => info("less64", Some(2), A::None, B, true),
            Less32U => info("less32u", Some(2), A::None, B, true),
            Not => info("not", Some(1), A::None, B, true),
            AndB => info("andb", Some(2), A::None, B, true),
            OrB => info("orb", Some(2), A::None, B, true),
            LocalAddr => info("localaddr", Some(0), A::Slot, P, true),
            Addr => info("addr", Some(0), A::Sym, P, true),
            OffPtr => info("offptr", Some(1), A::Int, P, true),
            Load => info("load", Some(1), A::None, None, true),
            Store => info("store", Some(2), A::None, V, false),
            VarZero => info("varzero", Some(0), A::Slot, V, false),
            StaticCall => info("call", None, A::Sym, None, false),
            Int64Make => info("int64make", Some(2), A::None, I64, true),
            Int64Hi => info("int64hi", Some(1), A::None, I32, true),
            Int64Lo => info("int64lo", Some(1), A::None, I32, true),
            Add32Carry => info("add32carry", Some(2), A::None, Some(Type::Tuple), true),
            Add32WithCarry => info("add32withcarry", Some(3), A::None, I32, true),
            Sub32Carry => info("sub32carry", Some(2), A::None, Some(Type::Tuple), true),
            Sub32WithBorrow => info("sub32withborrow", Some(3), A::None, I32, true),
            Select0 => info("select0", Some(1), A::None, I32, true),
            Select1 => info("select1", Some(1), A::None, Some(Type::Flags), true),
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Op::ALL.iter().copied().find(|op| op.name() == s)
    }

    /// Constant opcode producing a value of `ty`.
    pub fn const_for(ty: Type) -> Option<Op> {
        Some(match ty {
            Type::I8 => Op::Const8,
            Type::I16 => Op::Const16,
            Type::I32 => Op::Const32,
            Type::I64 => Op::Const64,
            Type::Bool => Op::ConstBool,
            _ => return None,
        })
    }

    pub fn is_const(self) -> bool {
        matches!(
            self,
            Op::Const8 | Op::Const16 | Op::Const32 | Op::Const64 | Op::ConstBool
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Truncate `c` to the width of `ty` and sign-extend it back.
pub fn wrap_const(ty: Type, c: i64) -> i64 {
    match ty {
        Type::Bool => (c != 0) as i64,
        Type::I8 => c as i8 as i64,
        Type::I16 => c as i16 as i64,
        Type::I32 => c as i32 as i64,
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names_round_trip() {
        for op in Op::ALL {
            assert_eq!(Op::from_name(op.name()), Some(op), "{op:?}");
        }
        assert_eq!(Op::from_name("frobnicate"), None);
    }

    #[test]
    fn test_wrap_const() {
        assert_eq!(wrap_const(Type::I32, 0x1_0000_0001), 1);
        assert_eq!(wrap_const(Type::I8, 255), -1);
        assert_eq!(wrap_const(Type::Bool, 7), 1);
        assert_eq!(wrap_const(Type::I64, i64::MIN), i64::MIN);
    }

    #[test]
    fn test_side_effecting_ops_are_not_pure() {
        assert!(!Op::Store.info().pure);
        assert!(!Op::VarZero.info().pure);
        assert!(!Op::StaticCall.info().pure);
        assert!(Op::Add64.info().pure);
    }
}
