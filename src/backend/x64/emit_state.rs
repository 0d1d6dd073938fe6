//! Emitters for guest state access: the register file, the vector file
//! and the packed NZCV word, all addressed through `JIT_STATE_PTR`.

use crate::backend::x64::assembler::{Mem, R15};
use crate::backend::x64::emit_context::EmitContext;
use crate::backend::x64::jit_state::JitState;
use crate::backend::x64::nzcv;
use crate::backend::x64::reg_alloc::RegAlloc;
use crate::ir::inst::Inst;
use crate::ir::value::InstRef;

pub fn emit_get_register32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::reg_offset(inst.arg(0).get_u8() as usize);
    let result = ra.scratch_gpr();
    ra.asm.mov(result.cvt32(), Mem::dword(R15, offset as i32));
    ra.define_value(inst_ref, result);
}

pub fn emit_get_register64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::reg_offset(inst.arg(0).get_u8() as usize);
    let result = ra.scratch_gpr();
    ra.asm.mov(result, Mem::qword(R15, offset as i32));
    ra.define_value(inst_ref, result);
}

/// Writes the low dword of the register slot; the high dword is untouched.
pub fn emit_set_register32(_ctx: &EmitContext, ra: &mut RegAlloc, _inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::reg_offset(inst.arg(0).get_u8() as usize) as i32;
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[1].is_immediate() {
        let imm = args[1].get_immediate_u32();
        ra.asm.mov_to(Mem::dword(R15, offset), imm as i32);
    } else {
        let source = ra.use_gpr(&mut args[1]);
        ra.asm.mov_to(Mem::dword(R15, offset), source.cvt32());
    }
}

pub fn emit_set_register64(_ctx: &EmitContext, ra: &mut RegAlloc, _inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::reg_offset(inst.arg(0).get_u8() as usize) as i32;
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[1].is_immediate() && args[1].fits_in_immediate_s32() {
        let imm = args[1].get_immediate_s32();
        ra.asm.mov_to(Mem::qword(R15, offset), imm);
    } else {
        let source = ra.use_gpr(&mut args[1]);
        ra.asm.mov_to(Mem::qword(R15, offset), source);
    }
}

pub fn emit_get_vector(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::vec_offset(inst.arg(0).get_u8() as usize);
    let result = ra.scratch_xmm();
    ra.asm.movaps(result, Mem::oword(R15, offset as i32));
    ra.define_value(inst_ref, result);
}

pub fn emit_set_vector(_ctx: &EmitContext, ra: &mut RegAlloc, _inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::vec_offset(inst.arg(0).get_u8() as usize);
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let source = ra.use_xmm(&mut args[1]);
    ra.asm.movaps_to(Mem::oword(R15, offset as i32), source);
}

pub fn emit_get_c_flag(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, _inst: &Inst) {
    let offset = JitState::offset_of_cpsr_nzcv() as i32;
    let result = ra.scratch_gpr();
    let r32 = result.cvt32();
    ra.asm.mov(r32, Mem::dword(R15, offset));
    ra.asm.shr(r32, 29);
    ra.asm.and_(r32, 1);
    ra.define_value(inst_ref, result);
}

pub fn emit_get_nzcv_raw(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, _inst: &Inst) {
    let offset = JitState::offset_of_cpsr_nzcv() as i32;
    let result = ra.scratch_gpr();
    ra.asm.mov(result.cvt32(), Mem::dword(R15, offset));
    ra.define_value(inst_ref, result);
}

pub fn emit_set_nzcv_raw(_ctx: &EmitContext, ra: &mut RegAlloc, _inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::offset_of_cpsr_nzcv() as i32;
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[0].is_immediate() {
        let imm = args[0].get_immediate_u32() & nzcv::GUEST_MASK;
        ra.asm.mov_to(Mem::dword(R15, offset), imm as i32);
    } else {
        let value = ra.use_scratch_gpr(&mut args[0]).cvt32();
        ra.asm.and_(value, nzcv::GUEST_MASK as i32);
        ra.asm.mov_to(Mem::dword(R15, offset), value);
    }
}

/// Stores an NZCV value produced by `GetNZCVFromOp` (host capture format),
/// converting it to the guest packed word on the way.
pub fn emit_set_nzcv(_ctx: &EmitContext, ra: &mut RegAlloc, _inst_ref: InstRef, inst: &Inst) {
    let offset = JitState::offset_of_cpsr_nzcv() as i32;
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    let value = ra.use_scratch_gpr(&mut args[0]).cvt32();
    nzcv::emit_pack_to_guest(ra.asm, value);
    ra.asm.mov_to(Mem::dword(R15, offset), value);
}
