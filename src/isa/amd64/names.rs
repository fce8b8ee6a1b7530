//! amd64 registers, mnemonics and operand classes.

use crate::isa::{Operand, Reg};

pub const REG_AX: u8 = 0;
pub const REG_CX: u8 = 1;
pub const REG_DX: u8 = 2;
pub const REG_BX: u8 = 3;
pub const REG_SP: u8 = 4;
pub const REG_SI: u8 = 6;
pub const REG_DI: u8 = 7;
pub const REG_R8: u8 = 8;
pub const REG_X0: u8 = 16;

pub static REGISTER_NAMES: &[&str] = &[
    "AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI", "R8", "R9", "R10", "R11", "R12", "R13",
    "R14", "R15", "X0", "X1", "X2", "X3", "X4", "X5", "X6", "X7", "X8", "X9", "X10", "X11",
    "X12", "X13", "X14", "X15",
];

/// Integer argument registers, in order.
pub const ARG_REGS: &[u8] = &[REG_AX, REG_BX, REG_CX, REG_DI, REG_SI, REG_R8, REG_R8 + 1];

mnemonics! {
    Amd64;
    ADDL, ADDQ, ANDL, ANDQ, CALL, CMPB, CMPL, CMPQ, DUFFZERO, IMULL, IMULQ, JEQ, JMP, JNE,
    LEAL, LEAQ, MOVB, MOVL, MOVQ, MOVW, NEGL, NEGQ, ORL, ORQ, REP, RET, SETCS, SETEQ, SETLT,
    SETNE, STOSQ, SUBL, SUBQ, TESTB, UNDEF, XCHGL, XORL, XORQ, VINSERTI128, VMOVDQU, VPALIGNR,
    VPBLENDD, VPERM2F128, VPERM2I128, VPERMQ, VPSHUFB, VPXOR, VZEROUPPER,
}

operand_classes! {
    Yxxx => "Yxxx",
    Ynone => "Ynone",
    Yi0 => "Yi0",
    Yi1 => "Yi1",
    Yi8 => "Yi8",
    Yu8 => "Yu8",
    Ys32 => "Ys32",
    Yi32 => "Yi32",
    Yi64 => "Yi64",
    Yiauto => "Yiauto",
    Yax => "Yax",
    Ycx => "Ycx",
    Yrl => "Yrl",
    Yrx => "Yrx",
    Ym => "Ym",
    Ybr => "Ybr",
    Yxr => "Yxr",
    Ytextsize => "Ytextsize",
}

/// Classify an operand.
pub fn classify(operand: &Operand) -> OperandClass {
    match operand {
        Operand::Reg(Reg::Phys(REG_AX)) => OperandClass::Yax,
        Operand::Reg(Reg::Phys(REG_CX)) => OperandClass::Ycx,
        Operand::Reg(Reg::Phys(r)) if *r >= REG_X0 => OperandClass::Yxr,
        Operand::Reg(_) => OperandClass::Yrl,
        Operand::Imm(0) => OperandClass::Yi0,
        Operand::Imm(1) => OperandClass::Yi1,
        Operand::Imm(c) if i8::try_from(*c).is_ok() => OperandClass::Yi8,
        Operand::Imm(c) if u8::try_from(*c).is_ok() => OperandClass::Yu8,
        Operand::Imm(c) if i32::try_from(*c).is_ok() => OperandClass::Ys32,
        Operand::Imm(c) if u32::try_from(*c).is_ok() => OperandClass::Yi32,
        Operand::Imm(_) => OperandClass::Yi64,
        Operand::SymAddr { .. } => OperandClass::Yiauto,
        Operand::Mem { .. } | Operand::Param(_) | Operand::Sym { .. } => OperandClass::Ym,
        Operand::Label(_) | Operand::Pc(_) => OperandClass::Ybr,
        Operand::Cond(_) => OperandClass::Yxxx,
    }
}

/// The VEX-encoded instructions taking four operands.
pub fn is_amd4op(m: Mnemonic) -> bool {
    matches!(
        m,
        Mnemonic::VPERM2F128
            | Mnemonic::VPALIGNR
            | Mnemonic::VPERM2I128
            | Mnemonic::VINSERTI128
            | Mnemonic::VPBLENDD
    )
}
