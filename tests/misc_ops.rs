//! Bit assembly, logical, extension, byte-reversal and min/max emitters,
//! plus pseudo-operation hygiene.

#![cfg(target_arch = "x86_64")]

mod common;

use redstart::backend::x64::assembler::CpuFeatures;
use redstart::backend::x64::jit_state::JitState;
use redstart::ir::block::Block;
use redstart::ir::opcode::Opcode;
use redstart::ir::value::Value;

fn run_unop64_from(op: Opcode, x: u64) -> u64 {
    let mut block = Block::new();
    let a = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
    let r = block.append(op, &[Value::Inst(a)]);
    block.append(Opcode::SetRegister64, &[Value::ImmU8(1), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = x;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    state.reg[1]
}

fn run_unop32_from(op: Opcode, x: u32) -> u32 {
    let mut block = Block::new();
    let a = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
    let r = block.append(op, &[Value::Inst(a)]);
    block.append(Opcode::SetRegister32, &[Value::ImmU8(1), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = x as u64;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    state.reg[1] as u32
}

fn run_binop32(op: Opcode, a: u32, b: Value) -> u32 {
    let mut block = Block::new();
    let x = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
    let r = block.append(op, &[Value::Inst(x), b]);
    block.append(Opcode::SetRegister32, &[Value::ImmU8(2), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = a as u64;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    state.reg[2] as u32
}

fn run_binop32_reg(op: Opcode, a: u32, b: u32) -> u32 {
    let mut block = Block::new();
    let x = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
    let y = block.append(Opcode::GetRegister32, &[Value::ImmU8(1)]);
    let r = block.append(op, &[Value::Inst(x), Value::Inst(y)]);
    block.append(Opcode::SetRegister32, &[Value::ImmU8(2), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = a as u64;
    state.reg[1] = b as u64;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    state.reg[2] as u32
}

fn run_binop64_reg(op: Opcode, a: u64, b: u64) -> u64 {
    let mut block = Block::new();
    let x = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
    let y = block.append(Opcode::GetRegister64, &[Value::ImmU8(1)]);
    let r = block.append(op, &[Value::Inst(x), Value::Inst(y)]);
    block.append(Opcode::SetRegister64, &[Value::ImmU8(2), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = a;
    state.reg[1] = b;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    state.reg[2]
}

#[test]
fn pack_2x32() {
    let mut block = Block::new();
    let lo = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
    let hi = block.append(Opcode::GetRegister32, &[Value::ImmU8(1)]);
    let packed = block.append(Opcode::Pack2x32To1x64, &[Value::Inst(lo), Value::Inst(hi)]);
    block.append(Opcode::SetRegister64, &[Value::ImmU8(2), Value::Inst(packed)]);

    let mut state = JitState::new();
    state.reg[0] = 0xDEAD_BEEF;
    state.reg[1] = 0x1234_5678;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[2], 0x1234_5678_DEAD_BEEF);
}

#[test]
fn pack_2x64_on_both_feature_paths() {
    let mut features = vec![CpuFeatures::empty()];
    if CpuFeatures::detect().contains(CpuFeatures::SSE4_1) {
        features.push(CpuFeatures::SSE4_1);
    }
    for features in features {
        let mut block = Block::new();
        let lo = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
        let hi = block.append(Opcode::GetRegister64, &[Value::ImmU8(1)]);
        let packed = block.append(Opcode::Pack2x64To1x128, &[Value::Inst(lo), Value::Inst(hi)]);
        block.append(Opcode::SetVector, &[Value::ImmU8(3), Value::Inst(packed)]);

        let mut state = JitState::new();
        state.reg[0] = 0x1111_2222_3333_4444;
        state.reg[1] = 0x5555_6666_7777_8888;
        common::compile_and_run(&block, features, &mut state);
        assert_eq!(state.vec[6], 0x1111_2222_3333_4444, "{features:?}");
        assert_eq!(state.vec[7], 0x5555_6666_7777_8888, "{features:?}");
    }
}

#[test]
fn zero_extend_long_to_quad_clears_the_high_lane() {
    let mut block = Block::new();
    let x = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
    let q = block.append(Opcode::ZeroExtendLongToQuad, &[Value::Inst(x)]);
    block.append(Opcode::SetVector, &[Value::ImmU8(0), Value::Inst(q)]);

    let mut state = JitState::new();
    state.reg[0] = 0xAAAA_BBBB_CCCC_DDDD;
    state.vec[0] = 0xFFFF_FFFF_FFFF_FFFF;
    state.vec[1] = 0xFFFF_FFFF_FFFF_FFFF;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.vec[0], 0xAAAA_BBBB_CCCC_DDDD);
    assert_eq!(state.vec[1], 0);
}

#[test]
fn narrowing_views() {
    let mut block = Block::new();
    let x = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
    let lsw = block.append(Opcode::LeastSignificantWord, &[Value::Inst(x)]);
    let msw = block.append(Opcode::MostSignificantWord, &[Value::Inst(x)]);
    block.append(Opcode::SetRegister32, &[Value::ImmU8(1), Value::Inst(lsw)]);
    block.append(Opcode::SetRegister32, &[Value::ImmU8(2), Value::Inst(msw)]);

    let mut state = JitState::new();
    state.reg[0] = 0x1122_3344_5566_7788;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[1] as u32, 0x5566_7788);
    assert_eq!(state.reg[2] as u32, 0x1122_3344);
}

#[test]
fn most_significant_word_carry_is_bit31_of_the_low_half() {
    for (x, want_carry) in [(0x0000_0001_8000_0000u64, 1u64), (0x0000_0001_7FFF_FFFF, 0)] {
        let mut block = Block::new();
        let v = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
        let msw = block.append(Opcode::MostSignificantWord, &[Value::Inst(v)]);
        let carry = block.append(Opcode::GetCarryFromOp, &[Value::Inst(msw)]);
        block.append(Opcode::SetRegister32, &[Value::ImmU8(1), Value::Inst(msw)]);
        block.append(Opcode::SetRegister32, &[Value::ImmU8(2), Value::Inst(carry)]);

        let mut state = JitState::new();
        state.reg[0] = x;
        common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
        assert_eq!(state.reg[1] as u32, 1);
        assert_eq!(state.reg[2] & 1, want_carry, "x={x:#x}");
    }
}

#[test]
fn most_significant_bit_and_is_zero() {
    assert_eq!(run_unop32_from(Opcode::MostSignificantBit, 0x8000_0000), 1);
    assert_eq!(run_unop32_from(Opcode::MostSignificantBit, 0x7FFF_FFFF), 0);
    assert_eq!(run_unop32_from(Opcode::IsZero32, 0) & 1, 1);
    assert_eq!(run_unop32_from(Opcode::IsZero32, 5) & 1, 0);
    assert_eq!(run_unop64_from(Opcode::IsZero64, 0) & 1, 1);
    assert_eq!(run_unop64_from(Opcode::IsZero64, 1 << 40) & 1, 0);
}

#[test]
fn test_bit() {
    for (x, bit, want) in [
        (1u64 << 40, 40u8, 1u64),
        (1 << 40, 41, 0),
        (u64::MAX, 63, 1),
        (0, 0, 0),
    ] {
        let mut block = Block::new();
        let v = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
        let r = block.append(Opcode::TestBit, &[Value::Inst(v), Value::ImmU8(bit)]);
        block.append(Opcode::SetRegister64, &[Value::ImmU8(1), Value::Inst(r)]);

        let mut state = JitState::new();
        state.reg[0] = x;
        common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
        assert_eq!(state.reg[1] & 1, want, "x={x:#x} bit={bit}");
    }
}

#[test]
fn extract_register() {
    let mut block = Block::new();
    let lo = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
    let hi = block.append(Opcode::GetRegister32, &[Value::ImmU8(1)]);
    let r = block.append(
        Opcode::ExtractRegister32,
        &[Value::Inst(lo), Value::Inst(hi), Value::ImmU8(8)],
    );
    block.append(Opcode::SetRegister32, &[Value::ImmU8(2), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = 0xAABB_CCDD;
    state.reg[1] = 0x1122_3344;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    // Low 32 bits of (0x11223344_AABBCCDD >> 8).
    assert_eq!(state.reg[2] as u32, 0x44AA_BBCC);

    let mut block = Block::new();
    let lo = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
    let hi = block.append(Opcode::GetRegister64, &[Value::ImmU8(1)]);
    let r = block.append(
        Opcode::ExtractRegister64,
        &[Value::Inst(lo), Value::Inst(hi), Value::ImmU8(16)],
    );
    block.append(Opcode::SetRegister64, &[Value::ImmU8(2), Value::Inst(r)]);

    let mut state = JitState::new();
    state.reg[0] = 0x1111_2222_3333_4444;
    state.reg[1] = 0xAAAA_BBBB_CCCC_DDDD;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[2], 0xDDDD_1111_2222_3333);
}

#[test]
fn logical_ops_with_register_and_immediate_operands() {
    assert_eq!(run_binop32_reg(Opcode::And32, 0xFF00_FF00, 0x0FF0_0FF0), 0x0F00_0F00);
    assert_eq!(run_binop32(Opcode::And32, 0xFF00_FF00, Value::ImmU32(0xFFFF)), 0xFF00);
    assert_eq!(run_binop32_reg(Opcode::Or32, 0xF0F0_0000, 0x0808_0808), 0xF8F8_0808);
    assert_eq!(run_binop32(Opcode::Or32, 1, Value::ImmU32(0x8000_0000)), 0x8000_0001);
    assert_eq!(run_binop32_reg(Opcode::Eor32, 0xFFFF_0000, 0xFF00_FF00), 0x00FF_FF00);
    assert_eq!(run_binop32(Opcode::Eor32, 0xFFFF_FFFF, Value::ImmU32(1)), 0xFFFF_FFFE);

    // 64-bit immediates fold only in the sign-extended form; both paths
    // must agree with the reference.
    assert_eq!(
        run_binop64_reg(Opcode::And64, 0xFFFF_0000_FFFF_0000, 0x00FF_00FF_00FF_00FF),
        0x00FF_0000_00FF_0000
    );
    let mut block = Block::new();
    let x = block.append(Opcode::GetRegister64, &[Value::ImmU8(0)]);
    let small = block.append(Opcode::And64, &[Value::Inst(x), Value::ImmU64(0xFF)]);
    let big = block.append(
        Opcode::Or64,
        &[Value::Inst(small), Value::ImmU64(0x1234_5678_0000_0000)],
    );
    block.append(Opcode::SetRegister64, &[Value::ImmU8(1), Value::Inst(big)]);
    let mut state = JitState::new();
    state.reg[0] = 0x0F0F;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[1], 0x1234_5678_0000_000F);
}

#[test]
fn not_folds_immediates() {
    assert_eq!(run_unop32_from(Opcode::Not32, 0x0000_FFFF), 0xFFFF_0000);

    let mut block = Block::new();
    let r = block.append(Opcode::Not32, &[Value::ImmU32(0x1234_5678)]);
    block.append(Opcode::SetRegister32, &[Value::ImmU8(0), Value::Inst(r)]);
    let mut state = JitState::new();
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[0] as u32, !0x1234_5678);

    let mut block = Block::new();
    let r = block.append(Opcode::Not64, &[Value::ImmU64(0xFF)]);
    block.append(Opcode::SetRegister64, &[Value::ImmU8(0), Value::Inst(r)]);
    let mut state = JitState::new();
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[0], !0xFFu64);
}

#[test]
fn sign_and_zero_extension() {
    // Inputs arrive with garbage above the source width.
    let x = 0xFFFF_FF80u32; // low byte = -128
    assert_eq!(run_unop32_from(Opcode::SignExtendByteToWord, x), 0xFFFF_FF80);
    assert_eq!(run_unop32_from(Opcode::ZeroExtendByteToWord, x), 0x80);
    assert_eq!(run_unop32_from(Opcode::SignExtendHalfToWord, 0x8000), 0xFFFF_8000);
    assert_eq!(run_unop32_from(Opcode::ZeroExtendHalfToWord, 0xABCD_8000), 0x8000);

    let mut block = Block::new();
    let a = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
    let sx = block.append(Opcode::SignExtendWordToLong, &[Value::Inst(a)]);
    let zx = block.append(Opcode::ZeroExtendWordToLong, &[Value::Inst(a)]);
    let sb = block.append(Opcode::SignExtendByteToLong, &[Value::Inst(a)]);
    let sh = block.append(Opcode::SignExtendHalfToLong, &[Value::Inst(a)]);
    let zb = block.append(Opcode::ZeroExtendByteToLong, &[Value::Inst(a)]);
    let zh = block.append(Opcode::ZeroExtendHalfToLong, &[Value::Inst(a)]);
    for (i, v) in [sx, zx, sb, sh, zb, zh].into_iter().enumerate() {
        block.append(
            Opcode::SetRegister64,
            &[Value::ImmU8(1 + i as u8), Value::Inst(v)],
        );
    }

    let mut state = JitState::new();
    state.reg[0] = 0x8000_0080;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.reg[1], 0xFFFF_FFFF_8000_0080);
    assert_eq!(state.reg[2], 0x8000_0080);
    assert_eq!(state.reg[3], 0xFFFF_FFFF_FFFF_FF80);
    assert_eq!(state.reg[4], 0x80);
    assert_eq!(state.reg[5], 0x80);
    assert_eq!(state.reg[6], 0x80);
}

#[test]
fn byte_reversal() {
    assert_eq!(run_unop32_from(Opcode::ByteReverseWord, 0x1234_5678), 0x7856_3412);
    assert_eq!(
        run_unop64_from(Opcode::ByteReverseDual, 0x0102_0304_0506_0708),
        0x0807_0605_0403_0201
    );
    // The half reversal only defines the low 16 bits.
    assert_eq!(
        run_unop32_from(Opcode::ByteReverseHalf, 0xABCD) & 0xFFFF,
        0xCDAB
    );
}

#[test]
fn min_max_family() {
    let a = 0x8000_0000u32; // most negative i32
    let b = 5u32;
    assert_eq!(run_binop32_reg(Opcode::MaxSigned32, a, b), b);
    assert_eq!(run_binop32_reg(Opcode::MinSigned32, a, b), a);
    assert_eq!(run_binop32_reg(Opcode::MaxUnsigned32, a, b), a);
    assert_eq!(run_binop32_reg(Opcode::MinUnsigned32, a, b), b);

    let x = (-3i64) as u64;
    let y = 9u64;
    assert_eq!(run_binop64_reg(Opcode::MaxSigned64, x, y), y);
    assert_eq!(run_binop64_reg(Opcode::MinSigned64, x, y), x);
    assert_eq!(run_binop64_reg(Opcode::MaxUnsigned64, x, y), x);
    assert_eq!(run_binop64_reg(Opcode::MinUnsigned64, x, y), y);

    // Ties keep the value.
    assert_eq!(run_binop32_reg(Opcode::MaxSigned32, 7, 7), 7);
    assert_eq!(run_binop32_reg(Opcode::MinUnsigned32, 7, 7), 7);
}

#[test]
fn vector_round_trip() {
    let mut block = Block::new();
    let v = block.append(Opcode::GetVector, &[Value::ImmU8(1)]);
    block.append(Opcode::SetVector, &[Value::ImmU8(2), Value::Inst(v)]);

    let mut state = JitState::new();
    state.vec[2] = 0x1234;
    state.vec[3] = 0x5678;
    common::compile_and_run(&block, CpuFeatures::detect(), &mut state);
    assert_eq!(state.vec[4], 0x1234);
    assert_eq!(state.vec[5], 0x5678);
}
