//! Shared test support: a compile-and-run harness for IR blocks and a
//! reference interpreter for guest data-processing semantics.

#![allow(dead_code)]

use redstart::backend::x64::assembler::{
    AssemblyOffset, BlockAssembler, CpuFeatures, ExecutableBuffer,
};
use redstart::backend::x64::emit::{block_inst_info, emit_block};
use redstart::backend::x64::emit_context::EmitContext;
use redstart::backend::x64::jit_state::JitState;
use redstart::backend::x64::reg_alloc::RegAlloc;
use redstart::ir::block::Block;
use redstart::ir::cond::Cond;

pub struct CompiledBlock {
    buf: ExecutableBuffer,
}

impl CompiledBlock {
    pub fn run(&self, state: &mut JitState) {
        let entry: extern "sysv64" fn(*mut JitState) =
            unsafe { std::mem::transmute(self.buf.ptr(AssemblyOffset(0))) };
        entry(state);
    }
}

/// Lower a block between the standard frame prologue/epilogue and hand
/// back an executable buffer.
pub fn compile(block: &Block, features: CpuFeatures) -> CompiledBlock {
    let mut asm = BlockAssembler::new(features);
    asm.emit_frame_prologue();
    {
        let mut ra = RegAlloc::new_default(&mut asm, block_inst_info(block));
        let ctx = EmitContext::new(block);
        emit_block(&ctx, &mut ra);
    }
    asm.emit_frame_epilogue();
    CompiledBlock {
        buf: asm.finalize().expect("code buffer finalization"),
    }
}

pub fn compile_and_run(block: &Block, features: CpuFeatures, state: &mut JitState) {
    compile(block, features).run(state);
}

// ---------------------------------------------------------------------------
// Reference interpreter
// ---------------------------------------------------------------------------

fn nibble(n: bool, z: bool, c: bool, v: bool) -> u8 {
    (n as u8) << 3 | (z as u8) << 2 | (c as u8) << 1 | v as u8
}

/// result and NZCV of `a + b + carry`.
pub fn add_with_carry32(a: u32, b: u32, carry: bool) -> (u32, u8) {
    let wide = a as u64 + b as u64 + carry as u64;
    let result = wide as u32;
    let signed = a as i32 as i64 + b as i32 as i64 + carry as i64;
    (
        result,
        nibble(
            result >> 31 != 0,
            result == 0,
            wide >> 32 != 0,
            signed != result as i32 as i64,
        ),
    )
}

pub fn add_with_carry64(a: u64, b: u64, carry: bool) -> (u64, u8) {
    let wide = a as u128 + b as u128 + carry as u128;
    let result = wide as u64;
    let signed = a as i64 as i128 + b as i64 as i128 + carry as i128;
    (
        result,
        nibble(
            result >> 63 != 0,
            result == 0,
            wide >> 64 != 0,
            signed != result as i64 as i128,
        ),
    )
}

/// Guest subtraction: `a + NOT(b) + carry`.
pub fn sub_with_carry32(a: u32, b: u32, carry: bool) -> (u32, u8) {
    add_with_carry32(a, !b, carry)
}

pub fn sub_with_carry64(a: u64, b: u64, carry: bool) -> (u64, u8) {
    add_with_carry64(a, !b, carry)
}

/// Guest LSL with an 8-bit count: (result, carry-out).
pub fn lsl32_carry(x: u32, shift: u32, carry_in: bool) -> (u32, bool) {
    match shift {
        0 => (x, carry_in),
        1..=31 => (x << shift, x >> (32 - shift) & 1 != 0),
        32 => (0, x & 1 != 0),
        _ => (0, false),
    }
}

pub fn lsr32_carry(x: u32, shift: u32, carry_in: bool) -> (u32, bool) {
    match shift {
        0 => (x, carry_in),
        1..=31 => (x >> shift, x >> (shift - 1) & 1 != 0),
        32 => (0, x >> 31 != 0),
        _ => (0, false),
    }
}

pub fn asr32_carry(x: u32, shift: u32, carry_in: bool) -> (u32, bool) {
    match shift {
        0 => (x, carry_in),
        1..=31 => (
            ((x as i32) >> shift) as u32,
            (x as i32) >> (shift - 1) & 1 != 0,
        ),
        _ => (((x as i32) >> 31) as u32, x >> 31 != 0),
    }
}

pub fn ror32_carry(x: u32, shift: u32, carry_in: bool) -> (u32, bool) {
    if shift == 0 {
        (x, carry_in)
    } else if shift % 32 == 0 {
        (x, x >> 31 != 0)
    } else {
        let r = x.rotate_right(shift % 32);
        (r, r >> 31 != 0)
    }
}

pub fn rrx32(x: u32, carry_in: bool) -> (u32, bool) {
    (((carry_in as u32) << 31) | (x >> 1), x & 1 != 0)
}

pub fn lsl64(x: u64, shift: u32) -> u64 {
    if shift < 64 { x << shift } else { 0 }
}

pub fn lsr64(x: u64, shift: u32) -> u64 {
    if shift < 64 { x >> shift } else { 0 }
}

pub fn asr64(x: u64, shift: u32) -> u64 {
    ((x as i64) >> shift.min(63)) as u64
}

pub fn ror64(x: u64, shift: u32) -> u64 {
    x.rotate_right(shift % 64)
}

/// Whether a guest condition holds for an NZCV nibble.
pub fn cond_holds(cond: Cond, nzcv: u8) -> bool {
    let n = nzcv & 0b1000 != 0;
    let z = nzcv & 0b0100 != 0;
    let c = nzcv & 0b0010 != 0;
    let v = nzcv & 0b0001 != 0;
    match cond {
        Cond::EQ => z,
        Cond::NE => !z,
        Cond::CS => c,
        Cond::CC => !c,
        Cond::MI => n,
        Cond::PL => !n,
        Cond::VS => v,
        Cond::VC => !v,
        Cond::HI => c && !z,
        Cond::LS => !c || z,
        Cond::GE => n == v,
        Cond::LT => n != v,
        Cond::GT => !z && n == v,
        Cond::LE => z || n != v,
        Cond::AL | Cond::NV => true,
    }
}

pub const ALL_CONDS: [Cond; 16] = [
    Cond::EQ,
    Cond::NE,
    Cond::CS,
    Cond::CC,
    Cond::MI,
    Cond::PL,
    Cond::VS,
    Cond::VC,
    Cond::HI,
    Cond::LS,
    Cond::GE,
    Cond::LT,
    Cond::GT,
    Cond::LE,
    Cond::AL,
    Cond::NV,
];
