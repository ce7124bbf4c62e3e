// This module maps iced-x86 registers onto the register file's (register, facet) pairs. The
// general-purpose registers RAX..R15 become gp registers 0..15 in encoding order, with the
// operand size selecting the i64/i32/i16/i8 facet and AH/CH/DH/BH selecting the i8h facet of
// registers 0..3. XMM and YMM registers become vector registers viewed as i128 or i256; the
// instruction handlers reinterpret those as packed or scalar facets as the opcode requires.
// RIP is reported separately since the instruction pointer is not a register-file slot.
// The reverse direction is used to print and parse x86 register names.

//! x86-64 register mapping using iced-x86.

use iced_x86::Register;

use crate::core::{Facet, Reg, RegClass};

/// A register operand resolved for the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg { reg: Reg, facet: Facet },
    Ip,
}

const GP64: [Register; 16] = [
    Register::RAX, Register::RCX, Register::RDX, Register::RBX,
    Register::RSP, Register::RBP, Register::RSI, Register::RDI,
    Register::R8, Register::R9, Register::R10, Register::R11,
    Register::R12, Register::R13, Register::R14, Register::R15,
];

const GP32: [Register; 16] = [
    Register::EAX, Register::ECX, Register::EDX, Register::EBX,
    Register::ESP, Register::EBP, Register::ESI, Register::EDI,
    Register::R8D, Register::R9D, Register::R10D, Register::R11D,
    Register::R12D, Register::R13D, Register::R14D, Register::R15D,
];

const GP16: [Register; 16] = [
    Register::AX, Register::CX, Register::DX, Register::BX,
    Register::SP, Register::BP, Register::SI, Register::DI,
    Register::R8W, Register::R9W, Register::R10W, Register::R11W,
    Register::R12W, Register::R13W, Register::R14W, Register::R15W,
];

const GP8: [Register; 16] = [
    Register::AL, Register::CL, Register::DL, Register::BL,
    Register::SPL, Register::BPL, Register::SIL, Register::DIL,
    Register::R8L, Register::R9L, Register::R10L, Register::R11L,
    Register::R12L, Register::R13L, Register::R14L, Register::R15L,
];

const GP8_HIGH: [Register; 4] = [Register::AH, Register::CH, Register::DH, Register::BH];

const XMM: [Register; 16] = [
    Register::XMM0, Register::XMM1, Register::XMM2, Register::XMM3,
    Register::XMM4, Register::XMM5, Register::XMM6, Register::XMM7,
    Register::XMM8, Register::XMM9, Register::XMM10, Register::XMM11,
    Register::XMM12, Register::XMM13, Register::XMM14, Register::XMM15,
];

const YMM: [Register; 16] = [
    Register::YMM0, Register::YMM1, Register::YMM2, Register::YMM3,
    Register::YMM4, Register::YMM5, Register::YMM6, Register::YMM7,
    Register::YMM8, Register::YMM9, Register::YMM10, Register::YMM11,
    Register::YMM12, Register::YMM13, Register::YMM14, Register::YMM15,
];

fn position(table: &[Register], register: Register) -> Option<u8> {
    table.iter().position(|&r| r == register).map(|index| index as u8)
}

/// Resolve an iced-x86 register. Segment, control, mask and 512-bit
/// registers have no register-file slot.
pub fn map_register(register: Register) -> Option<Operand> {
    if matches!(register, Register::RIP | Register::EIP) {
        return Some(Operand::Ip);
    }
    if let Some(index) = position(&GP8_HIGH, register) {
        return Some(Operand::Reg { reg: Reg::gp(index), facet: Facet::I8H });
    }
    let tables: [(&[Register], Facet, bool); 6] = [
        (&GP64[..], Facet::I64, true),
        (&GP32[..], Facet::I32, true),
        (&GP16[..], Facet::I16, true),
        (&GP8[..], Facet::I8, true),
        (&XMM[..], Facet::I128, false),
        (&YMM[..], Facet::I256, false),
    ];
    tables.into_iter().find_map(|(table, facet, gp)| {
        position(table, register).map(|index| Operand::Reg {
            reg: if gp { Reg::gp(index) } else { Reg::vector(index) },
            facet,
        })
    })
}

/// The iced-x86 register naming the `facet` view of `reg`, if x86 has one.
pub fn to_iced(reg: Reg, facet: Facet) -> Option<Register> {
    let index = reg.index as usize;
    let table: &[Register] = match (reg.class, facet) {
        (RegClass::Gp, Facet::I64) => &GP64,
        (RegClass::Gp, Facet::I32) => &GP32,
        (RegClass::Gp, Facet::I16) => &GP16,
        (RegClass::Gp, Facet::I8) => &GP8,
        (RegClass::Gp, Facet::I8H) => &GP8_HIGH,
        (RegClass::Vector, Facet::I128) => &XMM,
        (RegClass::Vector, Facet::I256) => &YMM,
        _ => return None,
    };
    table.get(index).copied()
}

/// Lower-case assembler name of an iced-x86 register.
pub fn register_name(register: Register) -> String {
    format!("{register:?}").to_lowercase()
}

/// Parse an x86 register name (`rax`, `r9d`, `ah`, `xmm3`, `rip`).
pub fn parse_register(name: &str) -> Option<Register> {
    let name = name.to_ascii_lowercase();
    if name == "rip" {
        return Some(Register::RIP);
    }
    [&GP64[..], &GP32[..], &GP16[..], &GP8[..], &GP8_HIGH[..], &XMM[..], &YMM[..]]
        .into_iter()
        .flatten()
        .copied()
        .find(|&register| register_name(register) == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gp_sizes_share_a_register() {
        for register in [Register::RBX, Register::EBX, Register::BX, Register::BL] {
            let Some(Operand::Reg { reg, .. }) = map_register(register) else {
                panic!("{register:?} not mapped");
            };
            assert_eq!(reg, Reg::gp(3));
        }
        assert_eq!(
            map_register(Register::R13D),
            Some(Operand::Reg { reg: Reg::gp(13), facet: Facet::I32 })
        );
        assert_eq!(
            map_register(Register::SIL),
            Some(Operand::Reg { reg: Reg::gp(6), facet: Facet::I8 })
        );
    }

    #[test]
    fn test_high_byte_registers() {
        assert_eq!(
            map_register(Register::AH),
            Some(Operand::Reg { reg: Reg::gp(0), facet: Facet::I8H })
        );
        assert_eq!(
            map_register(Register::BH),
            Some(Operand::Reg { reg: Reg::gp(3), facet: Facet::I8H })
        );
    }

    #[test]
    fn test_vector_and_special_registers() {
        assert_eq!(
            map_register(Register::XMM7),
            Some(Operand::Reg { reg: Reg::vector(7), facet: Facet::I128 })
        );
        assert_eq!(
            map_register(Register::YMM2),
            Some(Operand::Reg { reg: Reg::vector(2), facet: Facet::I256 })
        );
        assert_eq!(map_register(Register::RIP), Some(Operand::Ip));
        assert_eq!(map_register(Register::FS), None);
        assert_eq!(map_register(Register::ZMM0), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(to_iced(Reg::gp(1), Facet::I32), Some(Register::ECX));
        assert_eq!(to_iced(Reg::gp(5), Facet::I8H), None);
        assert_eq!(to_iced(Reg::vector(0), Facet::V4F32), None);
        assert_eq!(register_name(Register::R9D), "r9d");
        assert_eq!(parse_register("AH"), Some(Register::AH));
        assert_eq!(parse_register("xmm12"), Some(Register::XMM12));
        assert_eq!(parse_register("r16"), None);
    }
}
