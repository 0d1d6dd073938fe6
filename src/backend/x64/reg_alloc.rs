//! The register allocator: owns the mapping from SSA values to host
//! locations for the duration of one block's emission.
//!
//! Emitters acquire operands through the protocol below and never touch
//! the mapping directly. Acquisitions hold until `end_of_alloc_scope`,
//! which the dispatcher calls after every instruction.

use tracing::trace;

use crate::backend::x64::assembler::{BlockAssembler, Mem, Operand, Reg};
use crate::backend::x64::hostloc::{HostLoc, ANY_GPR, ANY_XMM, HOST_RSP};
use crate::backend::x64::stack_layout::{StackLayout, SPILL_COUNT};
use crate::ir::cond::Cond;
use crate::ir::inst::MAX_ARGS;
use crate::ir::types::Type;
use crate::ir::value::{InstRef, Value};

const NUM_GPRS: usize = 16;
const NUM_XMMS: usize = 16;
const REGISTER_COUNT: usize = NUM_GPRS + NUM_XMMS;
const LOCATION_COUNT: usize = REGISTER_COUNT + SPILL_COUNT;

fn loc_index(loc: HostLoc) -> usize {
    match loc {
        HostLoc::Gpr(i) => i as usize,
        HostLoc::Xmm(i) => NUM_GPRS + i as usize,
        HostLoc::Spill(i) => REGISTER_COUNT + i as usize,
    }
}

fn index_loc(index: usize) -> HostLoc {
    if index < NUM_GPRS {
        HostLoc::Gpr(index as u8)
    } else if index < REGISTER_COUNT {
        HostLoc::Xmm((index - NUM_GPRS) as u8)
    } else {
        HostLoc::Spill((index - REGISTER_COUNT) as u8)
    }
}

// ---------------------------------------------------------------------------
// Per-location bookkeeping
// ---------------------------------------------------------------------------

/// State of one host location. A location is *locked* while an emitter
/// holds it and *scratch* when the emitter may clobber its contents.
#[derive(Debug, Clone, Default)]
struct LocationState {
    lock_count: usize,
    is_scratch: bool,

    /// References handed out by `get_argument_info` for the current
    /// instruction. Consumed wholesale at end of scope: an operand the
    /// emitter never materialized (e.g. an ignored carry-in) still counts
    /// as used.
    pending_references: usize,
    consumed_uses: usize,
    total_uses: usize,

    /// SSA values resident here. Several values may share a location when
    /// one was defined as an alias of another; exhausted values linger
    /// until every resident use is consumed.
    values: Vec<InstRef>,
    max_bit_width: usize,
}

impl LocationState {
    fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && !self.is_scratch
    }

    /// True when the single outstanding reference is the final use of
    /// everything resident here.
    fn is_last_use(&self) -> bool {
        self.pending_references == 1 && self.consumed_uses + 1 == self.total_uses
    }

    fn read_lock(&mut self) {
        self.lock_count += 1;
    }

    fn write_lock(&mut self) {
        self.is_scratch = true;
        self.lock_count += 1;
    }

    fn add_argument_reference(&mut self) {
        self.pending_references += 1;
        assert!(
            self.pending_references + self.consumed_uses <= self.total_uses,
            "value referenced more often than its use count allows"
        );
    }

    fn add_value(&mut self, inst: InstRef, bit_width: usize, uses: usize) {
        self.values.push(inst);
        self.total_uses += uses;
        self.max_bit_width = self.max_bit_width.max(bit_width);
    }

    fn end_of_scope(&mut self) {
        self.lock_count = 0;
        self.is_scratch = false;
        self.consumed_uses += self.pending_references;
        self.pending_references = 0;
        if !self.values.is_empty() && self.consumed_uses == self.total_uses {
            *self = LocationState::default();
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// A resolved view of one IR operand, as handed to an emitter. Each
/// argument may be acquired at most once.
pub struct Argument {
    pub value: Value,
    allocated: bool,
}

impl Argument {
    fn unset() -> Self {
        Self {
            value: Value::Void,
            allocated: false,
        }
    }

    pub fn get_type(&self) -> Type {
        self.value.get_type()
    }

    pub fn is_immediate(&self) -> bool {
        self.value.is_immediate()
    }

    pub fn is_void(&self) -> bool {
        matches!(self.value, Value::Void)
    }

    pub fn fits_in_immediate_u32(&self) -> bool {
        self.is_immediate() && self.value.get_imm_as_u64() <= u32::MAX as u64
    }

    pub fn fits_in_immediate_s32(&self) -> bool {
        if !self.is_immediate() {
            return false;
        }
        let v = self.value.get_imm_as_s64();
        v >= i32::MIN as i64 && v <= i32::MAX as i64
    }

    pub fn get_immediate_u1(&self) -> bool {
        self.value.get_u1()
    }

    pub fn get_immediate_u8(&self) -> u8 {
        self.value.get_u8()
    }

    pub fn get_immediate_u32(&self) -> u32 {
        self.value.get_u32()
    }

    pub fn get_immediate_u64(&self) -> u64 {
        self.value.get_imm_as_u64()
    }

    pub fn get_immediate_s32(&self) -> i32 {
        assert!(self.fits_in_immediate_s32());
        self.value.get_imm_as_s64() as i32
    }

    pub fn get_immediate_cond(&self) -> Cond {
        self.value.get_cond()
    }

    pub fn is_in_gpr(&self, ra: &RegAlloc) -> bool {
        self.current_location(ra).is_some_and(HostLoc::is_gpr)
    }

    pub fn is_in_xmm(&self, ra: &RegAlloc) -> bool {
        self.current_location(ra).is_some_and(HostLoc::is_xmm)
    }

    pub fn is_in_memory(&self, ra: &RegAlloc) -> bool {
        self.current_location(ra).is_some_and(HostLoc::is_spill)
    }

    fn current_location(&self, ra: &RegAlloc) -> Option<HostLoc> {
        match self.value {
            Value::Inst(r) => ra.value_location(r),
            _ => None,
        }
    }
}

pub type ArgumentInfo = [Argument; MAX_ARGS];

/// A register-or-memory operand reference returned by `use_op_arg`.
///
/// Contract: the reference is valid only for the immediately following
/// host instruction. A later instruction in the same emitter must not
/// reuse it, since the allocator may reassign the underlying slot.
#[derive(Debug, Clone, Copy)]
pub enum OpArg {
    Reg(Reg),
    Mem(Mem),
}

impl OpArg {
    /// Narrow or widen the operand to the given access width.
    pub fn with_bits(self, bits: usize) -> OpArg {
        match self {
            OpArg::Reg(r) => OpArg::Reg(r.change_bit(bits)),
            OpArg::Mem(mut m) => {
                m.bits = bits as u16;
                OpArg::Mem(m)
            }
        }
    }
}

impl From<OpArg> for Operand {
    fn from(op: OpArg) -> Operand {
        match op {
            OpArg::Reg(r) => Operand::Reg(r),
            OpArg::Mem(m) => Operand::Mem(m),
        }
    }
}

// ---------------------------------------------------------------------------
// RegAlloc
// ---------------------------------------------------------------------------

pub struct RegAlloc<'a> {
    pub asm: &'a mut BlockAssembler,
    gpr_order: Vec<HostLoc>,
    xmm_order: Vec<HostLoc>,
    locations: Vec<LocationState>,
    /// Per-instruction (use_count, result bit width), indexed by InstRef.
    inst_info: Vec<(u32, usize)>,
}

impl<'a> RegAlloc<'a> {
    pub fn new(
        asm: &'a mut BlockAssembler,
        gpr_order: Vec<HostLoc>,
        xmm_order: Vec<HostLoc>,
        inst_info: Vec<(u32, usize)>,
    ) -> Self {
        Self {
            asm,
            gpr_order,
            xmm_order,
            locations: vec![LocationState::default(); LOCATION_COUNT],
            inst_info,
        }
    }

    pub fn new_default(asm: &'a mut BlockAssembler, inst_info: Vec<(u32, usize)>) -> Self {
        Self::new(asm, ANY_GPR.to_vec(), ANY_XMM.to_vec(), inst_info)
    }

    // -- Argument binding --------------------------------------------------

    /// Resolve an instruction's operand list. Each instruction-reference
    /// operand registers one pending use against its current location.
    pub fn get_argument_info(&mut self, args: &[Value], num_args: usize) -> ArgumentInfo {
        let mut out: ArgumentInfo = std::array::from_fn(|_| Argument::unset());
        for i in 0..num_args {
            out[i].value = args[i];
            if let Value::Inst(r) = args[i] {
                let loc = self
                    .value_location(r)
                    .unwrap_or_else(|| panic!("use of undefined value {}", r));
                self.state_mut(loc).add_argument_reference();
            }
        }
        out
    }

    pub fn value_location(&self, inst: InstRef) -> Option<HostLoc> {
        self.locations
            .iter()
            .position(|state| state.values.contains(&inst))
            .map(index_loc)
    }

    pub fn is_value_live(&self, inst: InstRef) -> bool {
        self.value_location(inst).is_some()
    }

    // -- Read-only acquisition ---------------------------------------------

    /// Materialize the argument in some GPR; read-only for this emitter.
    pub fn use_gpr(&mut self, arg: &mut Argument) -> Reg {
        self.mark_allocated(arg);
        let order = self.gpr_order.clone();
        self.use_impl(arg.value, &order).to_reg64()
    }

    pub fn use_xmm(&mut self, arg: &mut Argument) -> Reg {
        self.mark_allocated(arg);
        let order = self.xmm_order.clone();
        self.use_impl(arg.value, &order).to_xmm()
    }

    /// Materialize the argument at a fixed host location, read-only.
    pub fn use_loc(&mut self, arg: &mut Argument, loc: HostLoc) {
        self.mark_allocated(arg);
        self.use_impl(arg.value, &[loc]);
    }

    /// Yield the argument as a register or spill-slot memory operand,
    /// whichever it already occupies. See [`OpArg`] for the validity
    /// contract.
    pub fn use_op_arg(&mut self, arg: &mut Argument) -> OpArg {
        if let Value::Inst(r) = arg.value {
            if let Some(loc @ HostLoc::Spill(_)) = self.value_location(r) {
                self.mark_allocated(arg);
                self.state_mut(loc).read_lock();
                return OpArg::Mem(self.spill_address(loc, 64));
            }
        }
        OpArg::Reg(self.use_gpr(arg))
    }

    // -- Clobberable acquisition -------------------------------------------

    /// Materialize the argument in a GPR the emitter may clobber. The copy
    /// is elided when this is the value's last use.
    pub fn use_scratch_gpr(&mut self, arg: &mut Argument) -> Reg {
        self.mark_allocated(arg);
        let order = self.gpr_order.clone();
        self.use_scratch_impl(arg.value, &order).to_reg64()
    }

    pub fn use_scratch_xmm(&mut self, arg: &mut Argument) -> Reg {
        self.mark_allocated(arg);
        let order = self.xmm_order.clone();
        self.use_scratch_impl(arg.value, &order).to_xmm()
    }

    /// Clobberable acquisition at a fixed host location.
    pub fn use_scratch(&mut self, arg: &mut Argument, loc: HostLoc) {
        self.mark_allocated(arg);
        self.use_scratch_impl(arg.value, &[loc]);
    }

    // -- Fresh scratch -----------------------------------------------------

    /// A GPR bound to no value, free for the emitter to clobber.
    pub fn scratch_gpr(&mut self) -> Reg {
        let order = self.gpr_order.clone();
        self.scratch_impl(&order).to_reg64()
    }

    /// A specific GPR as scratch (protocol registers are acquired this way).
    pub fn scratch_gpr_at(&mut self, loc: HostLoc) -> Reg {
        self.scratch_impl(&[loc]).to_reg64()
    }

    pub fn scratch_xmm(&mut self) -> Reg {
        let order = self.xmm_order.clone();
        self.scratch_impl(&order).to_xmm()
    }

    // -- Definition --------------------------------------------------------

    /// Bind an instruction's SSA result to the given register. Must happen
    /// exactly once per value-producing instruction.
    pub fn define_value(&mut self, inst: InstRef, reg: Reg) {
        let loc = if reg.is_xmm() {
            HostLoc::Xmm(reg.idx)
        } else {
            HostLoc::Gpr(reg.idx)
        };
        self.define_impl(inst, loc);
    }

    /// Define an instruction's result as an alias of one of its arguments,
    /// emitting no host code for values already in a location.
    pub fn define_value_from_arg(&mut self, inst: InstRef, arg: &mut Argument) {
        self.mark_allocated(arg);
        match arg.value {
            Value::Inst(src) => {
                let loc = self
                    .value_location(src)
                    .unwrap_or_else(|| panic!("use of undefined value {}", src));
                self.define_impl(inst, loc);
            }
            _ => {
                let order = self.gpr_order.clone();
                let loc = self.scratch_impl(&order);
                self.load_immediate(arg.value, loc);
                self.define_impl(inst, loc);
            }
        }
    }

    // -- Scope management --------------------------------------------------

    /// Drop every lock held by the current emitter and consume the
    /// instruction's argument references. Called by the dispatcher after
    /// each instruction.
    pub fn end_of_alloc_scope(&mut self) {
        for state in &mut self.locations {
            state.end_of_scope();
        }
    }

    /// The live set must be empty once a block has been fully emitted.
    pub fn assert_no_more_uses(&self) {
        for (i, state) in self.locations.iter().enumerate() {
            assert!(
                state.is_empty(),
                "{:?} still holds {:?} at end of block",
                index_loc(i),
                state.values
            );
        }
    }

    // -- Internals ---------------------------------------------------------

    fn mark_allocated(&self, arg: &mut Argument) {
        assert!(!arg.allocated, "argument acquired twice");
        arg.allocated = true;
    }

    fn state(&self, loc: HostLoc) -> &LocationState {
        &self.locations[loc_index(loc)]
    }

    fn state_mut(&mut self, loc: HostLoc) -> &mut LocationState {
        &mut self.locations[loc_index(loc)]
    }

    fn use_impl(&mut self, value: Value, candidates: &[HostLoc]) -> HostLoc {
        if value.is_immediate() {
            let loc = self.scratch_impl(candidates);
            self.load_immediate(value, loc);
            return loc;
        }
        let inst = value.inst_ref();
        let current = self
            .value_location(inst)
            .unwrap_or_else(|| panic!("use of undefined value {}", inst));

        if candidates.contains(&current) {
            self.state_mut(current).read_lock();
            return current;
        }

        // A locked current location cannot be vacated; fall back to a copy.
        if self.state(current).is_locked() {
            return self.use_scratch_impl(value, candidates);
        }

        let dest = self.select_location(candidates);
        if self.state(current).max_bit_width > dest.bit_width() {
            return self.use_scratch_impl(value, candidates);
        }

        if current.is_gpr() && dest.is_gpr() {
            self.exchange(dest, current);
        } else {
            self.vacate(dest);
            self.relocate(dest, current);
        }
        self.state_mut(dest).read_lock();
        dest
    }

    fn use_scratch_impl(&mut self, value: Value, candidates: &[HostLoc]) -> HostLoc {
        if value.is_immediate() {
            let loc = self.scratch_impl(candidates);
            self.load_immediate(value, loc);
            return loc;
        }
        let inst = value.inst_ref();
        let current = self
            .value_location(inst)
            .unwrap_or_else(|| panic!("use of undefined value {}", inst));
        let bit_width = self.value_bit_width(inst);

        if candidates.contains(&current) && !self.state(current).is_locked() {
            if !self.state(current).is_last_use() {
                // Move the canonical copy elsewhere; the register still
                // physically holds the bits, now as a transient copy.
                self.vacate(current);
            }
            self.state_mut(current).write_lock();
            return current;
        }

        let dest = self.select_location(candidates);
        self.vacate(dest);
        self.copy_value(bit_width, dest, current);
        self.state_mut(dest).write_lock();
        dest
    }

    fn scratch_impl(&mut self, candidates: &[HostLoc]) -> HostLoc {
        let loc = self.select_location(candidates);
        self.vacate(loc);
        self.state_mut(loc).write_lock();
        loc
    }

    fn define_impl(&mut self, inst: InstRef, loc: HostLoc) {
        assert!(
            self.value_location(inst).is_none(),
            "{} defined twice",
            inst
        );
        let (uses, bit_width) = self.inst_info[inst.index()];
        self.state_mut(loc).add_value(inst, bit_width, uses as usize);
    }

    /// Prefer an empty unlocked location, then any unlocked one.
    fn select_location(&self, candidates: &[HostLoc]) -> HostLoc {
        candidates
            .iter()
            .copied()
            .find(|&loc| !self.state(loc).is_locked() && self.state(loc).is_empty())
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&loc| !self.state(loc).is_locked())
            })
            .expect("every candidate host location is locked")
    }

    fn load_immediate(&mut self, imm: Value, loc: HostLoc) {
        assert!(imm.is_immediate());
        let value = imm.get_imm_as_u64();
        match loc {
            HostLoc::Gpr(_) => {
                let reg = loc.to_reg64();
                if value == 0 {
                    self.asm.xor_(reg.cvt32(), reg.cvt32());
                } else {
                    self.asm.mov_imm64(reg, value);
                }
            }
            HostLoc::Xmm(_) => {
                let xmm = loc.to_xmm();
                if value == 0 {
                    self.asm.pxor(xmm, xmm);
                } else {
                    let order = self.gpr_order.clone();
                    let tmp = self.scratch_impl(&order).to_reg64();
                    self.asm.mov_imm64(tmp, value);
                    self.asm.movq(xmm, tmp);
                }
            }
            HostLoc::Spill(_) => panic!("cannot load an immediate into a spill slot"),
        }
    }

    /// Move the resident value of `from` into the empty location `to`,
    /// transferring ownership.
    fn relocate(&mut self, to: HostLoc, from: HostLoc) {
        assert!(self.state(to).is_empty(), "relocation target occupied");
        assert!(!self.state(from).is_locked(), "relocating a locked location");
        if self.state(from).is_empty() {
            return;
        }
        let bit_width = self.state(from).max_bit_width;
        assert!(bit_width <= to.bit_width(), "value too wide for target");

        self.emit_move(bit_width, to, from);
        let moved = std::mem::take(&mut self.locations[loc_index(from)]);
        self.locations[loc_index(to)] = moved;
    }

    fn copy_value(&mut self, bit_width: usize, to: HostLoc, from: HostLoc) {
        assert!(self.state(to).is_empty());
        assert!(!self.state(from).is_empty());
        self.emit_move(bit_width, to, from);
    }

    fn exchange(&mut self, a: HostLoc, b: HostLoc) {
        assert!(!self.state(a).is_locked() && !self.state(b).is_locked());
        if self.state(a).is_empty() {
            self.relocate(a, b);
            return;
        }
        if self.state(b).is_empty() {
            self.relocate(b, a);
            return;
        }
        self.asm.xchg(a.to_reg64(), b.to_reg64());
        self.locations.swap(loc_index(a), loc_index(b));
    }

    /// Make a location empty, spilling its resident value if necessary.
    fn vacate(&mut self, loc: HostLoc) {
        assert!(!self.state(loc).is_locked(), "cannot vacate a locked location");
        if self.state(loc).is_empty() {
            return;
        }
        assert!(loc.is_register(), "only registers are vacated");
        let slot = self.free_spill_slot();
        trace!(?loc, ?slot, "spilling");
        self.relocate(slot, loc);
    }

    fn free_spill_slot(&self) -> HostLoc {
        (0..SPILL_COUNT)
            .map(|i| HostLoc::Spill(i as u8))
            .find(|&s| self.state(s).is_empty())
            .expect("out of spill slots")
    }

    fn spill_address(&self, loc: HostLoc, bits: usize) -> Mem {
        let index = match loc {
            HostLoc::Spill(i) => i as usize,
            _ => panic!("spill_address on {:?}", loc),
        };
        let mut mem = Mem::qword(HOST_RSP.to_reg64(), StackLayout::spill_offset(index) as i32);
        mem.bits = bits as u16;
        mem
    }

    fn value_bit_width(&self, inst: InstRef) -> usize {
        self.inst_info[inst.index()].1
    }

    fn emit_move(&mut self, bit_width: usize, to: HostLoc, from: HostLoc) {
        match (to, from) {
            (HostLoc::Gpr(_), HostLoc::Gpr(_)) => {
                if bit_width == 64 {
                    self.asm.mov(to.to_reg64(), from.to_reg64());
                } else {
                    self.asm.mov(to.to_reg64().cvt32(), from.to_reg64().cvt32());
                }
            }
            (HostLoc::Xmm(_), HostLoc::Xmm(_)) => {
                self.asm.movaps(to.to_xmm(), from.to_xmm());
            }
            (HostLoc::Xmm(_), HostLoc::Gpr(_)) => {
                if bit_width == 64 {
                    self.asm.movq(to.to_xmm(), from.to_reg64());
                } else {
                    self.asm.movd(to.to_xmm(), from.to_reg64().cvt32());
                }
            }
            (HostLoc::Gpr(_), HostLoc::Xmm(_)) => {
                if bit_width == 64 {
                    self.asm.movq(to.to_reg64(), from.to_xmm());
                } else {
                    self.asm.movd(to.to_reg64().cvt32(), from.to_xmm());
                }
            }
            (HostLoc::Xmm(_), HostLoc::Spill(_)) => {
                let addr = self.spill_address(from, bit_width);
                match bit_width {
                    128 => self.asm.movaps(to.to_xmm(), addr),
                    64 => self.asm.movq(to.to_xmm(), addr),
                    _ => self.asm.movd(to.to_xmm(), addr),
                }
            }
            (HostLoc::Spill(_), HostLoc::Xmm(_)) => {
                let addr = self.spill_address(to, bit_width);
                match bit_width {
                    128 => self.asm.movaps_to(addr, from.to_xmm()),
                    64 => self.asm.movq_to(addr, from.to_xmm()),
                    _ => self.asm.movd_to(addr, from.to_xmm()),
                }
            }
            (HostLoc::Gpr(_), HostLoc::Spill(_)) => {
                if bit_width == 64 {
                    let addr = self.spill_address(from, 64);
                    self.asm.mov(to.to_reg64(), addr);
                } else {
                    let addr = self.spill_address(from, 32);
                    self.asm.mov(to.to_reg64().cvt32(), addr);
                }
            }
            (HostLoc::Spill(_), HostLoc::Gpr(_)) => {
                if bit_width == 64 {
                    let addr = self.spill_address(to, 64);
                    self.asm.mov_to(addr, from.to_reg64());
                } else {
                    let addr = self.spill_address(to, 32);
                    self.asm.mov_to(addr, from.to_reg64().cvt32());
                }
            }
            _ => panic!("invalid move {:?} <- {:?}", to, from),
        }
    }
}
