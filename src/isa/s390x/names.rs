//! s390x registers, mnemonics and operand classes.

use crate::isa::{Operand, Reg};

pub const REG_R0: u8 = 0;
pub const REGRET: u8 = 2;
/// Scratch registers used by the zeroing sequences.
pub const REGRT1: u8 = 3;
pub const REGRT2: u8 = 4;
pub const REGTMP: u8 = 10;
pub const REGLINK: u8 = 14;
pub const REGSP: u8 = 15;

pub static REGISTER_NAMES: &[&str] = &[
    "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12", "R13",
    "R14", "R15",
];

pub const ARG_REGS: &[u8] = &[2, 3, 4, 5, 6];

mnemonics! {
    S390x;
    ADD, ADDW, AND, ANDW, BEQ, BNE, BR, CALL, CLEAR, CMP, CMPU, CMPW, CMPWU, MOVB, MOVBZ,
    MOVD, MOVDEQ, MOVDLT, MOVDNE, MOVH, MOVHZ, MOVW, MOVWZ, MULLD, MULLW, NEG, NEGW, OR, ORW,
    RET, SUB, SUBW, UNDEF, XOR, XORW,
}

operand_classes! {
    None => "NONE",
    Reg => "REG",
    Freg => "FREG",
    Vreg => "VREG",
    Areg => "AREG",
    Zcon => "ZCON",
    Scon => "SCON",
    Ucon => "UCON",
    Addcon => "ADDCON",
    Andcon => "ANDCON",
    Lcon => "LCON",
    Dcon => "DCON",
    Sacon => "SACON",
    Lacon => "LACON",
    Dacon => "DACON",
    Sbra => "SBRA",
    Lbra => "LBRA",
    Sauto => "SAUTO",
    Lauto => "LAUTO",
    Zoreg => "ZOREG",
    Soreg => "SOREG",
    Loreg => "LOREG",
    TlsLe => "TLS_LE",
    TlsIe => "TLS_IE",
    Gok => "GOK",
    Addr => "ADDR",
    Symaddr => "SYMADDR",
    Gotaddr => "GOTADDR",
    Textsize => "TEXTSIZE",
    Any => "ANY",
    Nclass => "NCLASS",
}

/// Fits the unsigned 12-bit displacement field.
fn is_disp12(off: i64) -> bool {
    (0..4096).contains(&off)
}

/// Classify an operand.
pub fn classify(operand: &Operand) -> OperandClass {
    match operand {
        Operand::Reg(_) => OperandClass::Reg,
        Operand::Imm(c) if i32::try_from(*c).is_err() => OperandClass::Dcon,
        Operand::Imm(0) => OperandClass::Zcon,
        Operand::Imm(c) if (-0x8000..=0x7fff).contains(c) => OperandClass::Addcon,
        Operand::Imm(c) if (0..=0xffff).contains(c) => OperandClass::Andcon,
        Operand::Imm(c) if c & 0xffff == 0 => OperandClass::Ucon,
        Operand::Imm(_) => OperandClass::Lcon,
        Operand::Mem {
            base: Reg::Phys(REGSP),
            offset,
        }
        | Operand::Param(offset) => {
            if is_disp12(*offset) {
                OperandClass::Sauto
            } else {
                OperandClass::Lauto
            }
        }
        Operand::Mem { offset: 0, .. } => OperandClass::Zoreg,
        Operand::Mem { offset, .. } if is_disp12(*offset) => OperandClass::Soreg,
        Operand::Mem { .. } => OperandClass::Loreg,
        Operand::Sym { .. } => OperandClass::Addr,
        Operand::SymAddr { .. } => OperandClass::Symaddr,
        Operand::Label(_) | Operand::Pc(_) => OperandClass::Sbra,
        Operand::Cond(_) => OperandClass::None,
    }
}
