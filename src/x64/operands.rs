//! Register operands of decoded x86-64 instructions.

use iced_x86::{EncodingKind, Instruction, OpKind};

use super::registers::{map_register, Operand};

/// Register operands of `instruction` in operand order. Memory, immediate
/// and branch operands are skipped, as are registers without a slot.
pub fn register_operands(instruction: &Instruction) -> Vec<Operand> {
    (0..instruction.op_count())
        .filter(|&i| instruction.op_kind(i) == OpKind::Register)
        .filter_map(|i| map_register(instruction.op_register(i)))
        .collect()
}

/// Base and index registers of the memory operand, if any.
pub fn address_operands(instruction: &Instruction) -> Vec<Operand> {
    let has_memory = (0..instruction.op_count()).any(|i| instruction.op_kind(i) == OpKind::Memory);
    if !has_memory {
        return Vec::new();
    }
    [instruction.memory_base(), instruction.memory_index()]
        .into_iter()
        .filter_map(map_register)
        .collect()
}

/// The first operand when it is a register, which x86 uses as destination.
pub fn destination(instruction: &Instruction) -> Option<Operand> {
    if instruction.op_count() == 0 || instruction.op0_kind() != OpKind::Register {
        return None;
    }
    map_register(instruction.op0_register())
}

/// Whether a vector register write of `instruction` zeroes the bits above
/// its destination. VEX and EVEX forms do, legacy SSE forms preserve them.
/// Handlers pass this as `clear_facets` when writing the destination.
pub fn clears_upper_bits(instruction: &Instruction) -> bool {
    matches!(instruction.encoding(), EncodingKind::VEX | EncodingKind::EVEX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Facet, Reg};
    use iced_x86::code_asm::*;
    use iced_x86::{Decoder, DecoderOptions};

    fn assemble(build: impl FnOnce(&mut CodeAssembler) -> Result<(), IcedError>) -> Instruction {
        let mut a = CodeAssembler::new(64).unwrap();
        build(&mut a).unwrap();
        let bytes = a.assemble(0x1000).unwrap();
        Decoder::with_ip(64, &bytes, 0x1000, DecoderOptions::NONE).decode()
    }

    #[test]
    fn test_mov_immediate() {
        let instruction = assemble(|a| a.mov(eax, 1));
        assert_eq!(
            register_operands(&instruction),
            vec![Operand::Reg { reg: Reg::gp(0), facet: Facet::I32 }]
        );
        assert_eq!(destination(&instruction), register_operands(&instruction).first().copied());
    }

    #[test]
    fn test_high_byte_move() {
        let bytes = [0x88, 0xdc]; // mov ah, bl
        let instruction = Decoder::with_ip(64, &bytes, 0, DecoderOptions::NONE).decode();
        assert_eq!(
            register_operands(&instruction),
            vec![
                Operand::Reg { reg: Reg::gp(0), facet: Facet::I8H },
                Operand::Reg { reg: Reg::gp(3), facet: Facet::I8 },
            ]
        );
    }

    #[test]
    fn test_memory_operands() {
        let instruction = assemble(|a| a.mov(rcx, qword_ptr(rsi + r9 * 8 + 0x10)));
        assert_eq!(
            destination(&instruction),
            Some(Operand::Reg { reg: Reg::gp(1), facet: Facet::I64 })
        );
        assert_eq!(
            address_operands(&instruction),
            vec![
                Operand::Reg { reg: Reg::gp(6), facet: Facet::I64 },
                Operand::Reg { reg: Reg::gp(9), facet: Facet::I64 },
            ]
        );

        let bytes = [0x48, 0x8d, 0x05, 0x10, 0x00, 0x00, 0x00]; // lea rax, [rip + 0x10]
        let relative = Decoder::with_ip(64, &bytes, 0, DecoderOptions::NONE).decode();
        assert_eq!(address_operands(&relative), vec![Operand::Ip]);
        assert!(address_operands(&assemble(|a| a.add(eax, ecx))).is_empty());
    }

    #[test]
    fn test_vex_writes_clear_upper_bits() {
        let legacy = assemble(|a| a.addps(xmm0, xmm1));
        let vex = assemble(|a| a.vaddps(xmm0, xmm1, xmm2));
        assert!(!clears_upper_bits(&legacy));
        assert!(clears_upper_bits(&vex));
        assert_eq!(
            destination(&vex),
            Some(Operand::Reg { reg: Reg::vector(0), facet: Facet::I128 })
        );
        assert_eq!(register_operands(&vex).len(), 3);
    }
}
