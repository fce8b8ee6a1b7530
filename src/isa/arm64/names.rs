//! arm64 registers, mnemonics and operand classes.

use crate::isa::{Operand, Reg};

pub const REG_R0: u8 = 0;
/// Scratch registers used by the zeroing sequences.
pub const REGRT1: u8 = 16;
pub const REGRT2: u8 = 17;
pub const REGLINK: u8 = 30;
pub const REGZERO: u8 = 31;
pub const REGSP: u8 = 32;

pub static REGISTER_NAMES: &[&str] = &[
    "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12", "R13",
    "R14", "R15", "R16", "R17", "R18", "R19", "R20", "R21", "R22", "R23", "R24", "R25", "R26",
    "R27", "R28", "R29", "R30", "ZR", "RSP",
];

/// Integer argument registers, in order.
pub const ARG_REGS: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7];

mnemonics! {
    Arm64;
    ADD, ADDW, AND, ANDW, B, BNE, CALL, CBNZ, CBZ, CMP, CMPW, CSET, DUFFZERO, EOR, EORW,
    HINT, MOVB, MOVBU, MOVD, MOVH, MOVHU, MOVW, MOVWU, MUL, MULW, NEG, NEGW, ORR, ORRW, RET,
    SUB, SUBW, UMULH, UNDEF,
}

operand_classes! {
    None => "NONE",
    Reg => "REG",
    Rsp => "RSP",
    Freg => "FREG",
    Vreg => "VREG",
    Pair => "PAIR",
    Shift => "SHIFT",
    Extreg => "EXTREG",
    Spr => "SPR",
    Cond => "COND",
    Zcon => "ZCON",
    Addcon0 => "ADDCON0",
    Addcon => "ADDCON",
    Movcon => "MOVCON",
    Bitcon => "BITCON",
    Lcon => "LCON",
    Vcon => "VCON",
    Fcon => "FCON",
    Vconaddr => "VCONADDR",
    Aacon => "AACON",
    Lacon => "LACON",
    Aecon => "AECON",
    Sbra => "SBRA",
    Lbra => "LBRA",
    Npauto => "NPAUTO",
    Nsauto => "NSAUTO",
    Psauto => "PSAUTO",
    Ppauto => "PPAUTO",
    Uauto4k => "UAUTO4K",
    Lauto => "LAUTO",
    Zoreg => "ZOREG",
    Nsoreg => "NSOREG",
    Psoreg => "PSOREG",
    Uoreg4k => "UOREG4K",
    Loreg => "LOREG",
    Addr => "ADDR",
    Gotaddr => "GOTADDR",
    TlsLe => "TLS_LE",
    TlsIe => "TLS_IE",
    Roff => "ROFF",
    Gok => "GOK",
    Textsize => "TEXTSIZE",
}

/// Classify an operand.
pub fn classify(operand: &Operand) -> OperandClass {
    match operand {
        Operand::Reg(Reg::Phys(REGSP)) => OperandClass::Rsp,
        Operand::Reg(_) => OperandClass::Reg,
        Operand::Imm(0) => OperandClass::Zcon,
        Operand::Imm(c) if (0..=0xfff).contains(c) => OperandClass::Addcon0,
        Operand::Imm(c) if (0..=0xff_ffff).contains(c) => OperandClass::Addcon,
        Operand::Imm(c) if i32::try_from(*c).is_ok() => OperandClass::Lcon,
        Operand::Imm(_) => OperandClass::Vcon,
        Operand::Mem { offset: 0, .. } => OperandClass::Zoreg,
        Operand::Mem { offset, .. } if (-256..0).contains(offset) => OperandClass::Nsoreg,
        Operand::Mem { offset, .. } if (0..=0xfff).contains(offset) => OperandClass::Uoreg4k,
        Operand::Mem { .. } => OperandClass::Loreg,
        Operand::Param(off) if (0..=0xfff).contains(off) => OperandClass::Uauto4k,
        Operand::Param(_) => OperandClass::Lauto,
        Operand::Sym { .. } => OperandClass::Addr,
        Operand::SymAddr { .. } => OperandClass::Vconaddr,
        Operand::Label(_) | Operand::Pc(_) => OperandClass::Sbra,
        Operand::Cond(_) => OperandClass::Cond,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_aligned() {
        assert_eq!(ANAMES.len(), Mnemonic::ALL.len());
        assert_eq!(Mnemonic::CSET.name(), "CSET");
        assert_eq!(CNAMES.len(), OperandClass::Textsize as usize + 1);
        assert_eq!(REGISTER_NAMES[REGSP as usize], "RSP");
        assert_eq!(REGISTER_NAMES[REGZERO as usize], "ZR");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&Operand::phys(REGSP)), OperandClass::Rsp);
        assert_eq!(classify(&Operand::mem(REGSP, 16)).name(), "UOREG4K");
        assert_eq!(classify(&Operand::Imm(1 << 40)).name(), "VCON");
        assert_eq!(classify(&Operand::Cond(crate::isa::Cond::Eq)).name(), "COND");
    }
}
