//! Per-opcode emitters for the integer data-processing family.
//!
//! Each emitter is a pure function of the instruction, the allocator and
//! the assembler: it acquires operands, emits the lowering, produces any
//! attached pseudo-operation outputs (carry, overflow, packed NZCV) from
//! the same host sequence, and defines every result.
//!
//! Guest semantics differ from the host on the edges these emitters exist
//! to paper over: register-provided shift counts use all eight bits,
//! subtraction carry polarity is inverted, division by zero yields zero,
//! and `bsr` is undefined for a zero source.

use crate::backend::x64::assembler::{CpuFeatures, Mem, Reg, AL, CL, EAX, ECX, EDX, R15, RDX};
use crate::backend::x64::emit_context::EmitContext;
use crate::backend::x64::hostloc::{ACC, DATA_HIGH, SHIFT_COUNT};
use crate::backend::x64::jit_state::JitState;
use crate::backend::x64::nzcv;
use crate::backend::x64::reg_alloc::{ArgumentInfo, RegAlloc};
use crate::ir::cond::Cond;
use crate::ir::inst::Inst;
use crate::ir::opcode::Opcode;
use crate::ir::types::Type;
use crate::ir::value::InstRef;

// ---------------------------------------------------------------------------
// Bit assembly
// ---------------------------------------------------------------------------

pub fn emit_pack_2x32_to_1x64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let lo = ra.use_scratch_gpr(&mut args[0]);
    let hi = ra.use_scratch_gpr(&mut args[1]);

    ra.asm.shl(hi, 32);
    ra.asm.mov(lo.cvt32(), lo.cvt32()); // zero-extend to 64 bits
    ra.asm.or_(lo, hi);

    ra.define_value(inst_ref, lo);
}

pub fn emit_pack_2x64_to_1x128(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let lo = ra.use_gpr(&mut args[0]);
    let hi = ra.use_gpr(&mut args[1]);
    let result = ra.scratch_xmm();

    if ra.asm.cpu_supports(CpuFeatures::SSE4_1) {
        ra.asm.movq(result, lo);
        ra.asm.pinsrq(result, hi, 1);
    } else {
        let tmp = ra.scratch_xmm();
        ra.asm.movq(result, lo);
        ra.asm.movq(tmp, hi);
        ra.asm.punpcklqdq(result, tmp);
    }

    ra.define_value(inst_ref, result);
}

pub fn emit_least_significant_word(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    ra.define_value_from_arg(inst_ref, &mut args[0]);
}

pub fn emit_least_significant_half(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    ra.define_value_from_arg(inst_ref, &mut args[0]);
}

pub fn emit_least_significant_byte(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    ra.define_value_from_arg(inst_ref, &mut args[0]);
}

pub fn emit_most_significant_word(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);

    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.shr(result, 32);

    if let Some(carry_ref) = carry_inst {
        let carry = ra.scratch_gpr();
        ra.asm.setc(carry.cvt8());
        ra.define_value(carry_ref, carry);
        ctx.erase_instruction(carry_ref);
    }

    ra.define_value(inst_ref, result);
}

pub fn emit_most_significant_bit(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
    ra.asm.shr(result, 31);
    ra.define_value(inst_ref, result);
}

pub fn emit_is_zero32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
    ra.asm.test(result, result);
    ra.asm.sete(result.cvt8());
    ra.asm.movzx(result, result.cvt8());
    ra.define_value(inst_ref, result);
}

pub fn emit_is_zero64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.test(result, result);
    ra.asm.sete(result.cvt8());
    ra.asm.movzx(result.cvt32(), result.cvt8());
    ra.define_value(inst_ref, result);
}

pub fn emit_test_bit(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    assert!(args[1].is_immediate(), "TestBit requires an immediate bit index");
    ra.asm.bt(result, args[1].get_immediate_u8());
    ra.asm.setc(result.cvt8());
    ra.define_value(inst_ref, result);
}

fn emit_extract_register(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, bitsize: usize) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    assert!(args[2].is_immediate(), "ExtractRegister requires an immediate lsb");
    let lsb = args[2].get_immediate_u8();

    let result = ra.use_scratch_gpr(&mut args[0]).change_bit(bitsize);
    let operand = ra.use_gpr(&mut args[1]).change_bit(bitsize);

    ra.asm.shrd(result, operand, lsb);

    ra.define_value(inst_ref, result);
}

pub fn emit_extract_register32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_extract_register(ra, inst_ref, inst, 32);
}

pub fn emit_extract_register64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_extract_register(ra, inst_ref, inst, 64);
}

// ---------------------------------------------------------------------------
// Conditional select
// ---------------------------------------------------------------------------

fn emit_conditional_select(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, bitsize: usize) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let cond = args[0].get_immediate_cond();

    let flags = ra.scratch_gpr_at(ACC).cvt32();
    let then_ = ra.use_gpr(&mut args[1]).change_bit(bitsize);
    let else_ = ra.use_scratch_gpr(&mut args[2]).change_bit(bitsize);

    let offset = JitState::offset_of_cpsr_nzcv() as i32;
    ra.asm.mov(flags, Mem::dword(R15, offset));
    nzcv::emit_restore_host_flags(ra.asm, flags);

    match cond {
        Cond::EQ => ra.asm.cmovz(else_, then_),
        Cond::NE => ra.asm.cmovnz(else_, then_),
        Cond::CS => ra.asm.cmovc(else_, then_),
        Cond::CC => ra.asm.cmovnc(else_, then_),
        Cond::MI => ra.asm.cmovs(else_, then_),
        Cond::PL => ra.asm.cmovns(else_, then_),
        Cond::VS => ra.asm.cmovo(else_, then_),
        Cond::VC => ra.asm.cmovno(else_, then_),
        // Host `a`/`na` test CF=0; the guest HI/LS sense of C is inverted.
        Cond::HI => {
            ra.asm.cmc();
            ra.asm.cmova(else_, then_);
        }
        Cond::LS => {
            ra.asm.cmc();
            ra.asm.cmovna(else_, then_);
        }
        Cond::GE => ra.asm.cmovge(else_, then_),
        Cond::LT => ra.asm.cmovl(else_, then_),
        Cond::GT => ra.asm.cmovg(else_, then_),
        Cond::LE => ra.asm.cmovle(else_, then_),
        Cond::AL | Cond::NV => ra.asm.mov(else_, then_),
    }

    ra.define_value(inst_ref, else_);
}

pub fn emit_conditional_select32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_conditional_select(ra, inst_ref, inst, 32);
}

pub fn emit_conditional_select64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_conditional_select(ra, inst_ref, inst, 64);
}

pub fn emit_conditional_select_nzcv(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_conditional_select(ra, inst_ref, inst, 32);
}

// ---------------------------------------------------------------------------
// Shifts
//
// The guest consumes the full 8 bits of a register-provided count where the
// host masks to 0x1F/0x3F, and the guest defines a carry-out for every
// count; a count of zero passes the carry-in through unchanged.
// ---------------------------------------------------------------------------

pub fn emit_logical_shift_left32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if carry_inst.is_none() {
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();

            if shift <= 31 {
                ra.asm.shl(result, shift);
            } else {
                ra.asm.xor_(result, result);
            }

            ra.define_value(inst_ref, result);
        } else {
            ra.use_loc(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let zero = ra.scratch_gpr().cvt32();

            ra.asm.shl_cl(result);
            ra.asm.xor_(zero, zero);
            ra.asm.cmp(CL, 32);
            ra.asm.cmovnb(result, zero);

            ra.define_value(inst_ref, result);
        }
    } else {
        let carry_ref = carry_inst.unwrap();
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt32();

            if shift == 0 {
                // carry-out = carry-in, result unchanged
            } else if shift < 32 {
                ra.asm.bt(carry, 0);
                ra.asm.shl(result, shift);
                ra.asm.setc(carry.cvt8());
            } else if shift > 32 {
                ra.asm.xor_(result, result);
                ra.asm.xor_(carry, carry);
            } else {
                ra.asm.mov(carry, result);
                ra.asm.xor_(result, result);
                ra.asm.and_(carry, 1);
            }

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        } else {
            ra.use_loc(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt32();

            ra.asm.enter_local_scope();
            let count_gt32 = ra.asm.new_label();
            let count_eq32 = ra.asm.new_label();
            let end = ra.asm.new_label();

            ra.asm.cmp(CL, 32);
            ra.asm.ja(&count_gt32);
            ra.asm.je(&count_eq32);
            // count < 32: seed CF with the carry-in so a zero count
            // passes it through (`shl cl` with cl=0 leaves CF alone).
            ra.asm.bt(carry, 0);
            ra.asm.shl_cl(result);
            ra.asm.setc(carry.cvt8());
            ra.asm.jmp(&end);
            ra.asm.bind(&count_gt32);
            ra.asm.xor_(result, result);
            ra.asm.xor_(carry, carry);
            ra.asm.jmp(&end);
            ra.asm.bind(&count_eq32);
            ra.asm.mov(carry, result);
            ra.asm.and_(carry, 1);
            ra.asm.xor_(result, result);
            ra.asm.bind(&end);
            ra.asm.exit_local_scope();

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        }
    }
}

pub fn emit_logical_shift_left64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[1].is_immediate() {
        let shift = args[1].get_immediate_u8();
        let result = ra.use_scratch_gpr(&mut args[0]);

        if shift < 64 {
            ra.asm.shl(result, shift);
        } else {
            ra.asm.xor_(result.cvt32(), result.cvt32());
        }

        ra.define_value(inst_ref, result);
    } else {
        ra.use_loc(&mut args[1], SHIFT_COUNT);
        let result = ra.use_scratch_gpr(&mut args[0]);
        let zero = ra.scratch_gpr();

        ra.asm.shl_cl(result);
        ra.asm.xor_(zero.cvt32(), zero.cvt32());
        ra.asm.cmp(CL, 64);
        ra.asm.cmovnb(result, zero);

        ra.define_value(inst_ref, result);
    }
}

pub fn emit_logical_shift_right32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if carry_inst.is_none() {
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();

            if shift <= 31 {
                ra.asm.shr(result, shift);
            } else {
                ra.asm.xor_(result, result);
            }

            ra.define_value(inst_ref, result);
        } else {
            ra.use_loc(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let zero = ra.scratch_gpr().cvt32();

            ra.asm.shr_cl(result);
            ra.asm.xor_(zero, zero);
            ra.asm.cmp(CL, 32);
            ra.asm.cmovnb(result, zero);

            ra.define_value(inst_ref, result);
        }
    } else {
        let carry_ref = carry_inst.unwrap();
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt32();

            if shift == 0 {
                // carry-out = carry-in, result unchanged
            } else if shift < 32 {
                ra.asm.shr(result, shift);
                ra.asm.setc(carry.cvt8());
            } else if shift == 32 {
                ra.asm.bt(result, 31);
                ra.asm.setc(carry.cvt8());
                ra.asm.mov(result, 0);
            } else {
                ra.asm.xor_(result, result);
                ra.asm.xor_(carry, carry);
            }

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        } else {
            ra.use_loc(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt32();

            ra.asm.enter_local_scope();
            let count_gt32 = ra.asm.new_label();
            let count_eq32 = ra.asm.new_label();
            let end = ra.asm.new_label();

            ra.asm.cmp(CL, 32);
            ra.asm.ja(&count_gt32);
            ra.asm.je(&count_eq32);
            // count == 0 passes the carry-in through
            ra.asm.test(CL, CL);
            ra.asm.jz(&end);
            ra.asm.shr_cl(result);
            ra.asm.setc(carry.cvt8());
            ra.asm.jmp(&end);
            ra.asm.bind(&count_gt32);
            ra.asm.xor_(result, result);
            ra.asm.xor_(carry, carry);
            ra.asm.jmp(&end);
            ra.asm.bind(&count_eq32);
            ra.asm.bt(result, 31);
            ra.asm.setc(carry.cvt8());
            ra.asm.xor_(result, result);
            ra.asm.bind(&end);
            ra.asm.exit_local_scope();

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        }
    }
}

pub fn emit_logical_shift_right64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[1].is_immediate() {
        let shift = args[1].get_immediate_u8();
        let result = ra.use_scratch_gpr(&mut args[0]);

        if shift < 64 {
            ra.asm.shr(result, shift);
        } else {
            ra.asm.xor_(result.cvt32(), result.cvt32());
        }

        ra.define_value(inst_ref, result);
    } else {
        ra.use_loc(&mut args[1], SHIFT_COUNT);
        let result = ra.use_scratch_gpr(&mut args[0]);
        let zero = ra.scratch_gpr();

        ra.asm.shr_cl(result);
        ra.asm.xor_(zero.cvt32(), zero.cvt32());
        ra.asm.cmp(CL, 64);
        ra.asm.cmovnb(result, zero);

        ra.define_value(inst_ref, result);
    }
}

pub fn emit_arithmetic_shift_right32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if carry_inst.is_none() {
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();

            // Counts above 31 all produce the sign fill; saturate.
            ra.asm.sar(result, shift.min(31));

            ra.define_value(inst_ref, result);
        } else {
            ra.use_scratch(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let const31 = ra.scratch_gpr().cvt32();

            ra.asm.mov(const31, 31);
            ra.asm.movzx(ECX, CL);
            ra.asm.cmp(ECX, 31);
            ra.asm.cmovg(ECX, const31);
            ra.asm.sar_cl(result);

            ra.define_value(inst_ref, result);
        }
    } else {
        let carry_ref = carry_inst.unwrap();
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt8();

            if shift == 0 {
                // carry-out = carry-in, result unchanged
            } else if shift <= 31 {
                ra.asm.sar(result, shift);
                ra.asm.setc(carry);
            } else {
                ra.asm.sar(result, 31);
                ra.asm.bt(result, 31);
                ra.asm.setc(carry);
            }

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        } else {
            ra.use_loc(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt8();

            ra.asm.enter_local_scope();
            let count_gt31 = ra.asm.new_label();
            let end = ra.asm.new_label();

            ra.asm.cmp(CL, 31);
            ra.asm.ja(&count_gt31);
            // count == 0 passes the carry-in through
            ra.asm.test(CL, CL);
            ra.asm.jz(&end);
            ra.asm.sar_cl(result);
            ra.asm.setc(carry);
            ra.asm.jmp(&end);
            ra.asm.bind(&count_gt31);
            ra.asm.sar(result, 31);
            ra.asm.bt(result, 31);
            ra.asm.setc(carry);
            ra.asm.bind(&end);
            ra.asm.exit_local_scope();

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        }
    }
}

pub fn emit_arithmetic_shift_right64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[1].is_immediate() {
        let shift = args[1].get_immediate_u8();
        let result = ra.use_scratch_gpr(&mut args[0]);

        ra.asm.sar(result, shift.min(63));

        ra.define_value(inst_ref, result);
    } else {
        ra.use_scratch(&mut args[1], SHIFT_COUNT);
        let result = ra.use_scratch_gpr(&mut args[0]);
        let const63 = ra.scratch_gpr().cvt32();

        ra.asm.mov(const63, 63);
        ra.asm.movzx(ECX, CL);
        ra.asm.cmp(ECX, 63);
        ra.asm.cmovg(ECX, const63);
        ra.asm.sar_cl(result);

        ra.define_value(inst_ref, result);
    }
}

pub fn emit_rotate_right32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if carry_inst.is_none() {
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();

            ra.asm.ror(result, shift & 0x1F);

            ra.define_value(inst_ref, result);
        } else {
            // The host rotate masks the count for us; the rotate result is
            // periodic so the guest agrees.
            ra.use_loc(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();

            ra.asm.ror_cl(result);

            ra.define_value(inst_ref, result);
        }
    } else {
        let carry_ref = carry_inst.unwrap();
        if args[1].is_immediate() {
            let shift = args[1].get_immediate_u8();
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt8();

            if shift == 0 {
                // carry-out = carry-in, result unchanged
            } else if shift & 0x1F == 0 {
                ra.asm.bt(result, 31);
                ra.asm.setc(carry);
            } else {
                ra.asm.ror(result, shift);
                ra.asm.setc(carry);
            }

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        } else {
            ra.use_scratch(&mut args[1], SHIFT_COUNT);
            let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
            let carry = ra.use_scratch_gpr(&mut args[2]).cvt8();

            ra.asm.enter_local_scope();
            let masked_zero = ra.asm.new_label();
            let end = ra.asm.new_label();

            // count == 0 passes the carry-in through
            ra.asm.test(CL, CL);
            ra.asm.jz(&end);
            ra.asm.and_(ECX, 0x1F);
            ra.asm.jz(&masked_zero);
            ra.asm.ror_cl(result);
            ra.asm.setc(carry);
            ra.asm.jmp(&end);
            // multiple of 32: the value is unchanged, carry-out is bit 31
            ra.asm.bind(&masked_zero);
            ra.asm.bt(result, 31);
            ra.asm.setc(carry);
            ra.asm.bind(&end);
            ra.asm.exit_local_scope();

            ra.define_value(carry_ref, carry);
            ctx.erase_instruction(carry_ref);
            ra.define_value(inst_ref, result);
        }
    }
}

pub fn emit_rotate_right64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    if args[1].is_immediate() {
        let shift = args[1].get_immediate_u8();
        let result = ra.use_scratch_gpr(&mut args[0]);

        ra.asm.ror(result, shift & 0x3F);

        ra.define_value(inst_ref, result);
    } else {
        ra.use_loc(&mut args[1], SHIFT_COUNT);
        let result = ra.use_scratch_gpr(&mut args[0]);

        ra.asm.ror_cl(result);

        ra.define_value(inst_ref, result);
    }
}

pub fn emit_rotate_right_extended(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);

    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
    let carry = ra.use_scratch_gpr(&mut args[1]).cvt32();

    ra.asm.bt(carry, 0);
    ra.asm.rcr(result, 1);

    if let Some(carry_ref) = carry_inst {
        ra.asm.setc(carry.cvt8());
        ra.define_value(carry_ref, carry);
        ctx.erase_instruction(carry_ref);
    }

    ra.define_value(inst_ref, result);
}

// ---------------------------------------------------------------------------
// Arithmetic with flags
// ---------------------------------------------------------------------------

/// Allocate the carry register: a fresh scratch when the carry-in is a
/// known immediate, otherwise the materialized carry-in (clobberable when
/// a carry-out will overwrite it).
fn carry_operand(ra: &mut RegAlloc, args: &mut ArgumentInfo, wants_carry_out: bool) -> Option<Reg> {
    if args[2].is_immediate() {
        wants_carry_out.then(|| ra.scratch_gpr())
    } else if wants_carry_out {
        Some(ra.use_scratch_gpr(&mut args[2]))
    } else {
        Some(ra.use_gpr(&mut args[2]))
    }
}

fn emit_add(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, bitsize: usize) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);
    let overflow_inst = ctx.pseudo_op(inst_ref, Opcode::GetOverflowFromOp);
    let nzcv_inst = ctx.pseudo_op(inst_ref, Opcode::GetNZCVFromOp);

    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let carry_in_is_immediate = args[2].is_immediate();

    let flags = nzcv_inst.map(|_| {
        let reg = ra.scratch_gpr_at(ACC);
        ra.asm.xor_(reg.cvt32(), reg.cvt32());
        reg
    });
    let result = ra.use_scratch_gpr(&mut args[0]).change_bit(bitsize);
    let carry = carry_operand(ra, &mut args, carry_inst.is_some());
    let overflow = overflow_inst.map(|_| ra.scratch_gpr());

    if args[1].is_immediate() && args[1].get_type() == Type::U32 {
        let op = args[1].get_immediate_u32() as i32;
        if carry_in_is_immediate {
            if args[2].get_immediate_u1() {
                ra.asm.stc();
                ra.asm.adc(result, op);
            } else {
                ra.asm.add(result, op);
            }
        } else {
            ra.asm.bt(carry.unwrap().cvt32(), 0);
            ra.asm.adc(result, op);
        }
    } else {
        let op = ra.use_op_arg(&mut args[1]).with_bits(bitsize);
        if carry_in_is_immediate {
            if args[2].get_immediate_u1() {
                ra.asm.stc();
                ra.asm.adc(result, op);
            } else {
                ra.asm.add(result, op);
            }
        } else {
            ra.asm.bt(carry.unwrap().cvt32(), 0);
            ra.asm.adc(result, op);
        }
    }

    if let Some(nzcv_ref) = nzcv_inst {
        ra.asm.lahf();
        ra.asm.seto(AL);
        ra.define_value(nzcv_ref, flags.unwrap());
        ctx.erase_instruction(nzcv_ref);
    }
    if let Some(carry_ref) = carry_inst {
        let c = carry.unwrap();
        ra.asm.setc(c.cvt8());
        ra.define_value(carry_ref, c);
        ctx.erase_instruction(carry_ref);
    }
    if let Some(overflow_ref) = overflow_inst {
        let o = overflow.unwrap();
        ra.asm.seto(o.cvt8());
        ra.define_value(overflow_ref, o);
        ctx.erase_instruction(overflow_ref);
    }

    ra.define_value(inst_ref, result);
}

pub fn emit_add32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_add(ctx, ra, inst_ref, inst, 32);
}

pub fn emit_add64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_add(ctx, ra, inst_ref, inst, 64);
}

fn emit_sub(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, bitsize: usize) {
    let carry_inst = ctx.pseudo_op(inst_ref, Opcode::GetCarryFromOp);
    let overflow_inst = ctx.pseudo_op(inst_ref, Opcode::GetOverflowFromOp);
    let nzcv_inst = ctx.pseudo_op(inst_ref, Opcode::GetNZCVFromOp);

    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let carry_in_is_immediate = args[2].is_immediate();

    let flags = nzcv_inst.map(|_| {
        let reg = ra.scratch_gpr_at(ACC);
        ra.asm.xor_(reg.cvt32(), reg.cvt32());
        reg
    });
    let result = ra.use_scratch_gpr(&mut args[0]).change_bit(bitsize);
    let carry = carry_operand(ra, &mut args, carry_inst.is_some());
    let overflow = overflow_inst.map(|_| ra.scratch_gpr());

    // Guest subtraction is a + NOT(b) + carry; the host borrow flag is the
    // inverse of the guest carry.
    if args[1].is_immediate() && args[1].get_type() == Type::U32 {
        let op = args[1].get_immediate_u32() as i32;
        if carry_in_is_immediate {
            if args[2].get_immediate_u1() {
                ra.asm.sub(result, op);
            } else {
                ra.asm.stc();
                ra.asm.sbb(result, op);
            }
        } else {
            ra.asm.bt(carry.unwrap().cvt32(), 0);
            ra.asm.cmc();
            ra.asm.sbb(result, op);
        }
    } else {
        let op = ra.use_op_arg(&mut args[1]).with_bits(bitsize);
        if carry_in_is_immediate {
            if args[2].get_immediate_u1() {
                ra.asm.sub(result, op);
            } else {
                ra.asm.stc();
                ra.asm.sbb(result, op);
            }
        } else {
            ra.asm.bt(carry.unwrap().cvt32(), 0);
            ra.asm.cmc();
            ra.asm.sbb(result, op);
        }
    }

    if let Some(nzcv_ref) = nzcv_inst {
        ra.asm.cmc();
        ra.asm.lahf();
        ra.asm.seto(AL);
        ra.define_value(nzcv_ref, flags.unwrap());
        ctx.erase_instruction(nzcv_ref);
    }
    if let Some(carry_ref) = carry_inst {
        let c = carry.unwrap();
        if nzcv_inst.is_some() {
            // The cmc above already flipped CF to guest polarity.
            ra.asm.setc(c.cvt8());
        } else {
            ra.asm.setnc(c.cvt8());
        }
        ra.define_value(carry_ref, c);
        ctx.erase_instruction(carry_ref);
    }
    if let Some(overflow_ref) = overflow_inst {
        let o = overflow.unwrap();
        ra.asm.seto(o.cvt8());
        ra.define_value(overflow_ref, o);
        ctx.erase_instruction(overflow_ref);
    }

    ra.define_value(inst_ref, result);
}

pub fn emit_sub32(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_sub(ctx, ra, inst_ref, inst, 32);
}

pub fn emit_sub64(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_sub(ctx, ra, inst_ref, inst, 64);
}

pub fn emit_mul32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).cvt32();

    if args[1].is_immediate() {
        ra.asm.imul(result, args[1].get_immediate_u32() as i32);
    } else {
        let op = ra.use_op_arg(&mut args[1]).with_bits(32);
        ra.asm.imul(result, op);
    }

    ra.define_value(inst_ref, result);
}

pub fn emit_mul64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    let op = ra.use_op_arg(&mut args[1]).with_bits(64);

    ra.asm.imul(result, op);

    ra.define_value(inst_ref, result);
}

pub fn emit_unsigned_multiply_high64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    ra.scratch_gpr_at(DATA_HIGH);
    ra.use_scratch(&mut args[0], ACC);
    let op = ra.use_op_arg(&mut args[1]).with_bits(64);
    ra.asm.mul(op);

    ra.define_value(inst_ref, RDX);
}

pub fn emit_signed_multiply_high64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    ra.scratch_gpr_at(DATA_HIGH);
    ra.use_scratch(&mut args[0], ACC);
    let op = ra.use_op_arg(&mut args[1]).with_bits(64);
    ra.asm.imul_wide(op);

    ra.define_value(inst_ref, RDX);
}

fn emit_div(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, bitsize: usize, is_signed: bool) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    ra.scratch_gpr_at(ACC);
    ra.scratch_gpr_at(DATA_HIGH);
    let dividend = ra.use_gpr(&mut args[0]).change_bit(bitsize);
    let divisor = ra.use_gpr(&mut args[1]).change_bit(bitsize);
    let acc = Reg::gpr64(0).change_bit(bitsize);

    // Division by zero yields zero; the host would fault.
    ra.asm.enter_local_scope();
    let end = ra.asm.new_label();

    ra.asm.xor_(EAX, EAX);
    ra.asm.test(divisor, divisor);
    ra.asm.jz(&end);
    ra.asm.mov(acc, dividend);
    if is_signed {
        if bitsize == 32 {
            ra.asm.cdq();
        } else {
            ra.asm.cqo();
        }
        ra.asm.idiv(divisor);
    } else {
        ra.asm.xor_(EDX, EDX);
        ra.asm.div(divisor);
    }
    ra.asm.bind(&end);
    ra.asm.exit_local_scope();

    ra.define_value(inst_ref, acc);
}

pub fn emit_unsigned_div32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_div(ra, inst_ref, inst, 32, false);
}

pub fn emit_unsigned_div64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_div(ra, inst_ref, inst, 64, false);
}

pub fn emit_signed_div32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_div(ra, inst_ref, inst, 32, true);
}

pub fn emit_signed_div64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_div(ra, inst_ref, inst, 64, true);
}

// ---------------------------------------------------------------------------
// Logical
// ---------------------------------------------------------------------------

enum BitOp {
    And,
    Or,
    Eor,
}

fn emit_bitwise(ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst, bitsize: usize, op: BitOp) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).change_bit(bitsize);

    // 32-bit immediates always fold; 64-bit ones only in the sign-extended
    // host-encodable form.
    let imm = if bitsize == 32 && args[1].is_immediate() {
        Some(args[1].get_immediate_u32() as i32)
    } else if bitsize == 64 && args[1].fits_in_immediate_s32() {
        Some(args[1].get_immediate_s32())
    } else {
        None
    };

    match imm {
        Some(imm) => match op {
            BitOp::And => ra.asm.and_(result, imm),
            BitOp::Or => ra.asm.or_(result, imm),
            BitOp::Eor => ra.asm.xor_(result, imm),
        },
        None => {
            let op_arg = ra.use_op_arg(&mut args[1]).with_bits(bitsize);
            match op {
                BitOp::And => ra.asm.and_(result, op_arg),
                BitOp::Or => ra.asm.or_(result, op_arg),
                BitOp::Eor => ra.asm.xor_(result, op_arg),
            }
        }
    }

    ra.define_value(inst_ref, result);
}

pub fn emit_and32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_bitwise(ra, inst_ref, inst, 32, BitOp::And);
}

pub fn emit_and64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_bitwise(ra, inst_ref, inst, 64, BitOp::And);
}

pub fn emit_or32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_bitwise(ra, inst_ref, inst, 32, BitOp::Or);
}

pub fn emit_or64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_bitwise(ra, inst_ref, inst, 64, BitOp::Or);
}

pub fn emit_eor32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_bitwise(ra, inst_ref, inst, 32, BitOp::Eor);
}

pub fn emit_eor64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_bitwise(ra, inst_ref, inst, 64, BitOp::Eor);
}

pub fn emit_not32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    let result;
    if args[0].is_immediate() {
        result = ra.scratch_gpr().cvt32();
        ra.asm.mov(result, !args[0].get_immediate_u32() as i32);
    } else {
        result = ra.use_scratch_gpr(&mut args[0]).cvt32();
        ra.asm.not_(result);
    }
    ra.define_value(inst_ref, result);
}

pub fn emit_not64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());

    let result;
    if args[0].is_immediate() {
        result = ra.scratch_gpr();
        ra.asm.mov_imm64(result, !args[0].get_immediate_u64());
    } else {
        result = ra.use_scratch_gpr(&mut args[0]);
        ra.asm.not_(result);
    }
    ra.define_value(inst_ref, result);
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

pub fn emit_sign_extend_byte_to_word(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movsx(result.cvt32(), result.cvt8());
    ra.define_value(inst_ref, result);
}

pub fn emit_sign_extend_half_to_word(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movsx(result.cvt32(), result.cvt16());
    ra.define_value(inst_ref, result);
}

pub fn emit_sign_extend_byte_to_long(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movsx(result, result.cvt8());
    ra.define_value(inst_ref, result);
}

pub fn emit_sign_extend_half_to_long(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movsx(result, result.cvt16());
    ra.define_value(inst_ref, result);
}

pub fn emit_sign_extend_word_to_long(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movsxd(result, result.cvt32());
    ra.define_value(inst_ref, result);
}

pub fn emit_zero_extend_byte_to_word(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movzx(result.cvt32(), result.cvt8());
    ra.define_value(inst_ref, result);
}

pub fn emit_zero_extend_half_to_word(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.movzx(result.cvt32(), result.cvt16());
    ra.define_value(inst_ref, result);
}

pub fn emit_zero_extend_byte_to_long(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    // A 32-bit destination zeroes the upper half.
    emit_zero_extend_byte_to_word(ctx, ra, inst_ref, inst);
}

pub fn emit_zero_extend_half_to_long(ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    emit_zero_extend_half_to_word(ctx, ra, inst_ref, inst);
}

pub fn emit_zero_extend_word_to_long(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.mov(result.cvt32(), result.cvt32());
    ra.define_value(inst_ref, result);
}

pub fn emit_zero_extend_long_to_quad(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    if args[0].is_in_gpr(ra) {
        let source = ra.use_gpr(&mut args[0]);
        let result = ra.scratch_xmm();
        ra.asm.movq(result, source);
        ra.define_value(inst_ref, result);
    } else {
        let result = ra.use_scratch_xmm(&mut args[0]);
        ra.asm.movq(result, result);
        ra.define_value(inst_ref, result);
    }
}

// ---------------------------------------------------------------------------
// Byte reversal
// ---------------------------------------------------------------------------

pub fn emit_byte_reverse_word(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).cvt32();
    ra.asm.bswap(result);
    ra.define_value(inst_ref, result);
}

pub fn emit_byte_reverse_half(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]).cvt16();
    ra.asm.rol(result, 8);
    ra.define_value(inst_ref, result);
}

pub fn emit_byte_reverse_dual(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let result = ra.use_scratch_gpr(&mut args[0]);
    ra.asm.bswap(result);
    ra.define_value(inst_ref, result);
}

// ---------------------------------------------------------------------------
// Count leading zeros
// ---------------------------------------------------------------------------

pub fn emit_count_leading_zeros32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    if ra.asm.cpu_supports(CpuFeatures::LZCNT) {
        let source = ra.use_gpr(&mut args[0]).cvt32();
        let result = ra.scratch_gpr().cvt32();

        ra.asm.lzcnt(result, source);

        ra.define_value(inst_ref, result);
    } else {
        let source = ra.use_scratch_gpr(&mut args[0]).cvt32();
        let result = ra.scratch_gpr().cvt32();

        // bsr leaves the result undefined for a zero source but sets ZF;
        // substitute a sentinel so zero maps to 32.
        ra.asm.bsr(result, source);
        ra.asm.mov(source, -1);
        ra.asm.cmovz(result, source);
        ra.asm.neg(result);
        ra.asm.add(result, 31);

        ra.define_value(inst_ref, result);
    }
}

pub fn emit_count_leading_zeros64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    if ra.asm.cpu_supports(CpuFeatures::LZCNT) {
        let source = ra.use_gpr(&mut args[0]);
        let result = ra.scratch_gpr();

        ra.asm.lzcnt(result, source);

        ra.define_value(inst_ref, result);
    } else {
        let source = ra.use_scratch_gpr(&mut args[0]);
        let result = ra.scratch_gpr();

        ra.asm.bsr(result, source);
        ra.asm.mov(source.cvt32(), -1);
        ra.asm.cmovz(result.cvt32(), source.cvt32());
        ra.asm.neg(result.cvt32());
        ra.asm.add(result.cvt32(), 63);

        ra.define_value(inst_ref, result);
    }
}

// ---------------------------------------------------------------------------
// Min/max
// ---------------------------------------------------------------------------

pub fn emit_max_signed32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]).cvt32();
    let y = ra.use_scratch_gpr(&mut args[1]).cvt32();
    ra.asm.cmp(x, y);
    ra.asm.cmovge(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_max_signed64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]);
    let y = ra.use_scratch_gpr(&mut args[1]);
    ra.asm.cmp(x, y);
    ra.asm.cmovge(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_max_unsigned32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]).cvt32();
    let y = ra.use_scratch_gpr(&mut args[1]).cvt32();
    ra.asm.cmp(x, y);
    ra.asm.cmova(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_max_unsigned64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]);
    let y = ra.use_scratch_gpr(&mut args[1]);
    ra.asm.cmp(x, y);
    ra.asm.cmova(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_min_signed32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]).cvt32();
    let y = ra.use_scratch_gpr(&mut args[1]).cvt32();
    ra.asm.cmp(x, y);
    ra.asm.cmovle(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_min_signed64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]);
    let y = ra.use_scratch_gpr(&mut args[1]);
    ra.asm.cmp(x, y);
    ra.asm.cmovle(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_min_unsigned32(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]).cvt32();
    let y = ra.use_scratch_gpr(&mut args[1]).cvt32();
    ra.asm.cmp(x, y);
    ra.asm.cmovb(y, x);
    ra.define_value(inst_ref, y);
}

pub fn emit_min_unsigned64(_ctx: &EmitContext, ra: &mut RegAlloc, inst_ref: InstRef, inst: &Inst) {
    let mut args = ra.get_argument_info(&inst.args, inst.num_args());
    let x = ra.use_gpr(&mut args[0]);
    let y = ra.use_scratch_gpr(&mut args[1]);
    ra.asm.cmp(x, y);
    ra.asm.cmovb(y, x);
    ra.define_value(inst_ref, y);
}
