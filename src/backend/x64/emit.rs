//! The per-block dispatcher: walks an IR block in program order and routes
//! each live instruction to its emitter.

use tracing::trace;

use crate::backend::x64::emit_context::EmitContext;
use crate::backend::x64::emit_data_processing as dp;
use crate::backend::x64::emit_state as state;
use crate::backend::x64::reg_alloc::RegAlloc;
use crate::ir::block::Block;
use crate::ir::opcode::Opcode;
use crate::ir::value::InstRef;

/// Per-instruction (use_count, result bit width) table consumed by the
/// register allocator.
pub fn block_inst_info(block: &Block) -> Vec<(u32, usize)> {
    block
        .instructions
        .iter()
        .map(|inst| (inst.use_count, inst.return_type().bit_width()))
        .collect()
}

/// Lower every live instruction of the context's block. Pseudo-operations
/// are consumed by their primary's emitter; reaching one here means the
/// primary failed to honor the attachment.
pub fn emit_block(ctx: &EmitContext, ra: &mut RegAlloc) {
    trace!(instructions = ctx.block.len(), "emitting block");

    for (i, inst) in ctx.block.instructions.iter().enumerate() {
        let inst_ref = InstRef(i as u32);
        if ctx.is_erased(inst_ref) {
            continue;
        }
        assert!(
            !inst.opcode.is_pseudo_operation(),
            "pseudo-operation {} was not consumed by its primary",
            inst_ref
        );

        match inst.opcode {
            // Erased pseudos are skipped above; the match arms cover every
            // primary opcode.
            Opcode::GetCarryFromOp | Opcode::GetOverflowFromOp | Opcode::GetNZCVFromOp => {
                unreachable!()
            }

            // Guest state access
            Opcode::GetRegister32 => state::emit_get_register32(ctx, ra, inst_ref, inst),
            Opcode::GetRegister64 => state::emit_get_register64(ctx, ra, inst_ref, inst),
            Opcode::SetRegister32 => state::emit_set_register32(ctx, ra, inst_ref, inst),
            Opcode::SetRegister64 => state::emit_set_register64(ctx, ra, inst_ref, inst),
            Opcode::GetVector => state::emit_get_vector(ctx, ra, inst_ref, inst),
            Opcode::SetVector => state::emit_set_vector(ctx, ra, inst_ref, inst),
            Opcode::GetCFlag => state::emit_get_c_flag(ctx, ra, inst_ref, inst),
            Opcode::GetNZCVRaw => state::emit_get_nzcv_raw(ctx, ra, inst_ref, inst),
            Opcode::SetNZCVRaw => state::emit_set_nzcv_raw(ctx, ra, inst_ref, inst),
            Opcode::SetNZCV => state::emit_set_nzcv(ctx, ra, inst_ref, inst),

            // Bit assembly
            Opcode::Pack2x32To1x64 => dp::emit_pack_2x32_to_1x64(ctx, ra, inst_ref, inst),
            Opcode::Pack2x64To1x128 => dp::emit_pack_2x64_to_1x128(ctx, ra, inst_ref, inst),
            Opcode::LeastSignificantWord => dp::emit_least_significant_word(ctx, ra, inst_ref, inst),
            Opcode::MostSignificantWord => dp::emit_most_significant_word(ctx, ra, inst_ref, inst),
            Opcode::LeastSignificantHalf => dp::emit_least_significant_half(ctx, ra, inst_ref, inst),
            Opcode::LeastSignificantByte => dp::emit_least_significant_byte(ctx, ra, inst_ref, inst),
            Opcode::MostSignificantBit => dp::emit_most_significant_bit(ctx, ra, inst_ref, inst),
            Opcode::IsZero32 => dp::emit_is_zero32(ctx, ra, inst_ref, inst),
            Opcode::IsZero64 => dp::emit_is_zero64(ctx, ra, inst_ref, inst),
            Opcode::TestBit => dp::emit_test_bit(ctx, ra, inst_ref, inst),
            Opcode::ExtractRegister32 => dp::emit_extract_register32(ctx, ra, inst_ref, inst),
            Opcode::ExtractRegister64 => dp::emit_extract_register64(ctx, ra, inst_ref, inst),

            // Conditional select
            Opcode::ConditionalSelect32 => dp::emit_conditional_select32(ctx, ra, inst_ref, inst),
            Opcode::ConditionalSelect64 => dp::emit_conditional_select64(ctx, ra, inst_ref, inst),
            Opcode::ConditionalSelectNZCV => dp::emit_conditional_select_nzcv(ctx, ra, inst_ref, inst),

            // Shifts
            Opcode::LogicalShiftLeft32 => dp::emit_logical_shift_left32(ctx, ra, inst_ref, inst),
            Opcode::LogicalShiftLeft64 => dp::emit_logical_shift_left64(ctx, ra, inst_ref, inst),
            Opcode::LogicalShiftRight32 => dp::emit_logical_shift_right32(ctx, ra, inst_ref, inst),
            Opcode::LogicalShiftRight64 => dp::emit_logical_shift_right64(ctx, ra, inst_ref, inst),
            Opcode::ArithmeticShiftRight32 => dp::emit_arithmetic_shift_right32(ctx, ra, inst_ref, inst),
            Opcode::ArithmeticShiftRight64 => dp::emit_arithmetic_shift_right64(ctx, ra, inst_ref, inst),
            Opcode::RotateRight32 => dp::emit_rotate_right32(ctx, ra, inst_ref, inst),
            Opcode::RotateRight64 => dp::emit_rotate_right64(ctx, ra, inst_ref, inst),
            Opcode::RotateRightExtended => dp::emit_rotate_right_extended(ctx, ra, inst_ref, inst),

            // Arithmetic
            Opcode::Add32 => dp::emit_add32(ctx, ra, inst_ref, inst),
            Opcode::Add64 => dp::emit_add64(ctx, ra, inst_ref, inst),
            Opcode::Sub32 => dp::emit_sub32(ctx, ra, inst_ref, inst),
            Opcode::Sub64 => dp::emit_sub64(ctx, ra, inst_ref, inst),
            Opcode::Mul32 => dp::emit_mul32(ctx, ra, inst_ref, inst),
            Opcode::Mul64 => dp::emit_mul64(ctx, ra, inst_ref, inst),
            Opcode::SignedMultiplyHigh64 => dp::emit_signed_multiply_high64(ctx, ra, inst_ref, inst),
            Opcode::UnsignedMultiplyHigh64 => dp::emit_unsigned_multiply_high64(ctx, ra, inst_ref, inst),
            Opcode::UnsignedDiv32 => dp::emit_unsigned_div32(ctx, ra, inst_ref, inst),
            Opcode::UnsignedDiv64 => dp::emit_unsigned_div64(ctx, ra, inst_ref, inst),
            Opcode::SignedDiv32 => dp::emit_signed_div32(ctx, ra, inst_ref, inst),
            Opcode::SignedDiv64 => dp::emit_signed_div64(ctx, ra, inst_ref, inst),

            // Logical
            Opcode::And32 => dp::emit_and32(ctx, ra, inst_ref, inst),
            Opcode::And64 => dp::emit_and64(ctx, ra, inst_ref, inst),
            Opcode::Eor32 => dp::emit_eor32(ctx, ra, inst_ref, inst),
            Opcode::Eor64 => dp::emit_eor64(ctx, ra, inst_ref, inst),
            Opcode::Or32 => dp::emit_or32(ctx, ra, inst_ref, inst),
            Opcode::Or64 => dp::emit_or64(ctx, ra, inst_ref, inst),
            Opcode::Not32 => dp::emit_not32(ctx, ra, inst_ref, inst),
            Opcode::Not64 => dp::emit_not64(ctx, ra, inst_ref, inst),

            // Extension
            Opcode::SignExtendByteToWord => dp::emit_sign_extend_byte_to_word(ctx, ra, inst_ref, inst),
            Opcode::SignExtendHalfToWord => dp::emit_sign_extend_half_to_word(ctx, ra, inst_ref, inst),
            Opcode::SignExtendByteToLong => dp::emit_sign_extend_byte_to_long(ctx, ra, inst_ref, inst),
            Opcode::SignExtendHalfToLong => dp::emit_sign_extend_half_to_long(ctx, ra, inst_ref, inst),
            Opcode::SignExtendWordToLong => dp::emit_sign_extend_word_to_long(ctx, ra, inst_ref, inst),
            Opcode::ZeroExtendByteToWord => dp::emit_zero_extend_byte_to_word(ctx, ra, inst_ref, inst),
            Opcode::ZeroExtendHalfToWord => dp::emit_zero_extend_half_to_word(ctx, ra, inst_ref, inst),
            Opcode::ZeroExtendByteToLong => dp::emit_zero_extend_byte_to_long(ctx, ra, inst_ref, inst),
            Opcode::ZeroExtendHalfToLong => dp::emit_zero_extend_half_to_long(ctx, ra, inst_ref, inst),
            Opcode::ZeroExtendWordToLong => dp::emit_zero_extend_word_to_long(ctx, ra, inst_ref, inst),
            Opcode::ZeroExtendLongToQuad => dp::emit_zero_extend_long_to_quad(ctx, ra, inst_ref, inst),

            // Byte reversal
            Opcode::ByteReverseWord => dp::emit_byte_reverse_word(ctx, ra, inst_ref, inst),
            Opcode::ByteReverseHalf => dp::emit_byte_reverse_half(ctx, ra, inst_ref, inst),
            Opcode::ByteReverseDual => dp::emit_byte_reverse_dual(ctx, ra, inst_ref, inst),

            // Bit counting
            Opcode::CountLeadingZeros32 => dp::emit_count_leading_zeros32(ctx, ra, inst_ref, inst),
            Opcode::CountLeadingZeros64 => dp::emit_count_leading_zeros64(ctx, ra, inst_ref, inst),

            // Min/max
            Opcode::MaxSigned32 => dp::emit_max_signed32(ctx, ra, inst_ref, inst),
            Opcode::MaxSigned64 => dp::emit_max_signed64(ctx, ra, inst_ref, inst),
            Opcode::MaxUnsigned32 => dp::emit_max_unsigned32(ctx, ra, inst_ref, inst),
            Opcode::MaxUnsigned64 => dp::emit_max_unsigned64(ctx, ra, inst_ref, inst),
            Opcode::MinSigned32 => dp::emit_min_signed32(ctx, ra, inst_ref, inst),
            Opcode::MinSigned64 => dp::emit_min_signed64(ctx, ra, inst_ref, inst),
            Opcode::MinUnsigned32 => dp::emit_min_unsigned32(ctx, ra, inst_ref, inst),
            Opcode::MinUnsigned64 => dp::emit_min_unsigned64(ctx, ra, inst_ref, inst),
        }

        ra.end_of_alloc_scope();
    }

    ra.assert_no_more_uses();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::x64::assembler::{BlockAssembler, CpuFeatures};
    use crate::ir::value::Value;

    #[test]
    fn inst_info_reflects_uses_and_widths() {
        let mut block = Block::new();
        let a = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
        block.append(Opcode::SetRegister64, &[Value::ImmU8(1), Value::Inst(a)]);
        block.append(Opcode::SetRegister64, &[Value::ImmU8(2), Value::Inst(a)]);

        let info = block_inst_info(&block);
        assert_eq!(info[0], (2, 64));
        assert_eq!(info[1], (0, 0));
    }

    #[test]
    #[should_panic(expected = "not consumed by its primary")]
    fn unattached_pseudo_consumption_panics() {
        // A carry pseudo attached to an opcode that never produces one.
        let mut block = Block::new();
        let a = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
        let product = block.append(Opcode::Mul32, &[Value::Inst(a), Value::ImmU32(3)]);
        block.append(Opcode::GetCarryFromOp, &[Value::Inst(product)]);
        block.append(Opcode::SetRegister32, &[Value::ImmU8(1), Value::Inst(product)]);

        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        let info = block_inst_info(&block);
        let mut ra = RegAlloc::new_default(&mut asm, info);
        let ctx = EmitContext::new(&block);
        emit_block(&ctx, &mut ra);
    }
}
