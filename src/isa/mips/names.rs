//! mips registers, mnemonics and operand classes.

use crate::isa::{Operand, Reg};

pub const REGZERO: u8 = 0;
pub const REGRT1: u8 = 1;
pub const REGRT2: u8 = 2;
/// First and second result registers.
pub const REGRET0: u8 = 2;
pub const REGRET1: u8 = 3;
pub const REGSP: u8 = 29;
pub const REG_HI: u8 = 32;
pub const REG_LO: u8 = 33;

pub static REGISTER_NAMES: &[&str] = &[
    "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12", "R13",
    "R14", "R15", "R16", "R17", "R18", "R19", "R20", "R21", "R22", "R23", "R24", "R25", "R26",
    "R27", "R28", "R29", "R30", "R31", "HI", "LO",
];

pub const ARG_REGS: &[u8] = &[4, 5, 6, 7];

mnemonics! {
    Mips;
    ADD, ADDU, AND, BEQ, BNE, CALL, JMP, MOVB, MOVBU, MOVH, MOVHU, MOVW, MUL, MULU, NOR, OR,
    RET, SGT, SGTU, SUBU, UNDEF, XOR,
}

operand_classes! {
    None => "NONE",
    Reg => "REG",
    Freg => "FREG",
    Fcreg => "FCREG",
    Mreg => "MREG",
    Hi => "HI",
    Lo => "LO",
    Zcon => "ZCON",
    Scon => "SCON",
    Ucon => "UCON",
    Add0con => "ADD0CON",
    And0con => "AND0CON",
    Addcon => "ADDCON",
    Andcon => "ANDCON",
    Lcon => "LCON",
    Dcon => "DCON",
    Sacon => "SACON",
    Secon => "SECON",
    Lacon => "LACON",
    Lecon => "LECON",
    Dacon => "DACON",
    Stcon => "STCON",
    Sbra => "SBRA",
    Lbra => "LBRA",
    Sauto => "SAUTO",
    Lauto => "LAUTO",
    Sext => "SEXT",
    Lext => "LEXT",
    Zoreg => "ZOREG",
    Soreg => "SOREG",
    Loreg => "LOREG",
    Gok => "GOK",
    Addr => "ADDR",
    Tls => "TLS",
    Textsize => "TEXTSIZE",
    Nclass => "NCLASS",
}

fn is_short(c: i64) -> bool {
    i16::try_from(c).is_ok()
}

/// Classify an operand.
pub fn classify(operand: &Operand) -> OperandClass {
    match operand {
        Operand::Reg(Reg::Phys(REG_HI)) => OperandClass::Hi,
        Operand::Reg(Reg::Phys(REG_LO)) => OperandClass::Lo,
        Operand::Reg(_) => OperandClass::Reg,
        Operand::Imm(0) => OperandClass::Zcon,
        Operand::Imm(c) if (1..=0x7fff).contains(c) => OperandClass::Add0con,
        Operand::Imm(c) if (1..=0xffff).contains(c) => OperandClass::And0con,
        Operand::Imm(c) if (-0x8000..0).contains(c) => OperandClass::Addcon,
        Operand::Imm(c) if c & 0xffff == 0 => OperandClass::Ucon,
        Operand::Imm(_) => OperandClass::Lcon,
        Operand::Mem {
            base: Reg::Phys(REGSP),
            offset,
        }
        | Operand::Param(offset) => {
            if is_short(*offset) {
                OperandClass::Sauto
            } else {
                OperandClass::Lauto
            }
        }
        Operand::Mem { offset: 0, .. } => OperandClass::Zoreg,
        Operand::Mem { offset, .. } if is_short(*offset) => OperandClass::Soreg,
        Operand::Mem { .. } => OperandClass::Loreg,
        Operand::Sym { .. } => OperandClass::Addr,
        Operand::SymAddr { .. } => OperandClass::Lcon,
        Operand::Label(_) | Operand::Pc(_) => OperandClass::Sbra,
        Operand::Cond(_) => OperandClass::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_aligned() {
        assert_eq!(ANAMES.len(), Mnemonic::ALL.len());
        assert_eq!(Mnemonic::SGTU.name(), "SGTU");
        assert_eq!(CNAMES.last(), Some(&"NCLASS"));
        assert_eq!(REGISTER_NAMES[REG_LO as usize], "LO");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&Operand::phys(REG_HI)), OperandClass::Hi);
        assert_eq!(classify(&Operand::Imm(0x10000)), OperandClass::Ucon);
        assert_eq!(classify(&Operand::Imm(-4)), OperandClass::Addcon);
        assert_eq!(classify(&Operand::mem(REGSP, 4)), OperandClass::Sauto);
        assert_eq!(classify(&Operand::mem(REGRT1, 0)), OperandClass::Zoreg);
        assert_eq!(classify(&Operand::mem(REGRT1, 1 << 20)), OperandClass::Loreg);
    }
}
