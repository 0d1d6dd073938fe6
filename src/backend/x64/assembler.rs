//! The code buffer assembler: a thin fluent layer over the `dynasmrt`
//! runtime assembler. One method per host mnemonic the emitters need,
//! with operand-width dispatch driven by the `Reg` the caller passes.
//!
//! Encoding and executable-memory handling belong to `dynasmrt`; this
//! layer owns register/operand representation, local-label scoping and
//! the host CPU feature mask.

use bitflags::bitflags;
use dynasmrt::{dynasm, DynamicLabel, DynasmApi, DynasmLabelApi};
use thiserror::Error;

pub use dynasmrt::{AssemblyOffset, ExecutableBuffer};

use crate::backend::x64::stack_layout::StackLayout;

// ---------------------------------------------------------------------------
// Registers and operands
// ---------------------------------------------------------------------------

/// A host register with an access width. GPRs are 8/16/32/64 bits wide,
/// XMM registers are 128. The index follows x86-64 encoding order
/// (rax=0, rcx=1, rdx=2, rbx=3, rsp=4, rbp=5, rsi=6, rdi=7, r8..r15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg {
    pub idx: u8,
    pub bits: u16,
}

impl Reg {
    pub const fn gpr8(idx: u8) -> Reg {
        Reg { idx, bits: 8 }
    }
    pub const fn gpr16(idx: u8) -> Reg {
        Reg { idx, bits: 16 }
    }
    pub const fn gpr32(idx: u8) -> Reg {
        Reg { idx, bits: 32 }
    }
    pub const fn gpr64(idx: u8) -> Reg {
        Reg { idx, bits: 64 }
    }
    pub const fn xmm(idx: u8) -> Reg {
        Reg { idx, bits: 128 }
    }

    pub fn is_xmm(self) -> bool {
        self.bits == 128
    }

    pub fn cvt8(self) -> Reg {
        debug_assert!(!self.is_xmm());
        Reg::gpr8(self.idx)
    }
    pub fn cvt16(self) -> Reg {
        debug_assert!(!self.is_xmm());
        Reg::gpr16(self.idx)
    }
    pub fn cvt32(self) -> Reg {
        debug_assert!(!self.is_xmm());
        Reg::gpr32(self.idx)
    }
    pub fn cvt64(self) -> Reg {
        debug_assert!(!self.is_xmm());
        Reg::gpr64(self.idx)
    }

    /// Resize to the given bit width (GPRs only).
    pub fn change_bit(self, bits: usize) -> Reg {
        match bits {
            8 => self.cvt8(),
            16 => self.cvt16(),
            32 => self.cvt32(),
            64 => self.cvt64(),
            _ => panic!("invalid GPR width {}", bits),
        }
    }
}

pub const RAX: Reg = Reg::gpr64(0);
pub const RCX: Reg = Reg::gpr64(1);
pub const RDX: Reg = Reg::gpr64(2);
pub const RBX: Reg = Reg::gpr64(3);
pub const RSP: Reg = Reg::gpr64(4);
pub const RBP: Reg = Reg::gpr64(5);
pub const RSI: Reg = Reg::gpr64(6);
pub const RDI: Reg = Reg::gpr64(7);
pub const R15: Reg = Reg::gpr64(15);

pub const EAX: Reg = Reg::gpr32(0);
pub const ECX: Reg = Reg::gpr32(1);
pub const EDX: Reg = Reg::gpr32(2);
pub const AL: Reg = Reg::gpr8(0);
pub const CL: Reg = Reg::gpr8(1);

/// A `base + displacement` memory operand. `bits` is the access width used
/// when the instruction cannot infer it from a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    pub base: u8,
    pub disp: i32,
    pub bits: u16,
}

impl Mem {
    pub fn dword(base: Reg, disp: i32) -> Mem {
        Mem { base: base.idx, disp, bits: 32 }
    }
    pub fn qword(base: Reg, disp: i32) -> Mem {
        Mem { base: base.idx, disp, bits: 64 }
    }
    pub fn oword(base: Reg, disp: i32) -> Mem {
        Mem { base: base.idx, disp, bits: 128 }
    }
}

/// Right-hand operand of a two-operand instruction.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Reg(Reg),
    Imm(i32),
    Mem(Mem),
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}
impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Imm(v)
    }
}
impl From<Mem> for Operand {
    fn from(m: Mem) -> Self {
        Operand::Mem(m)
    }
}

// ---------------------------------------------------------------------------
// CPU features
// ---------------------------------------------------------------------------

bitflags! {
    /// Host instruction-set extensions the emitters may branch on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFeatures: u32 {
        const SSE4_1 = 1 << 0;
        const LZCNT = 1 << 1;
    }
}

impl CpuFeatures {
    /// Query the running host. Tests pass an explicit mask instead to
    /// force the non-preferred code paths.
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        let mut feats = Self::empty();
        if std::arch::is_x86_feature_detected!("sse4.1") {
            feats |= Self::SSE4_1;
        }
        if std::arch::is_x86_feature_detected!("lzcnt") {
            feats |= Self::LZCNT;
        }
        feats
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn detect() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("code buffer finalization failed")]
    Finalize,
}

/// A local label, resolvable within the enclosing label scope.
#[derive(Debug, Clone, Copy)]
pub struct Label(DynamicLabel);

#[derive(Default)]
struct LabelScope {
    created: usize,
    bound: usize,
}

// ---------------------------------------------------------------------------
// BlockAssembler
// ---------------------------------------------------------------------------

/// Bytes to subtract from rsp in the block frame: the spill area plus 8
/// bytes of padding so rsp is 16-byte aligned after the prologue's six
/// pushes (entry rsp is 8 mod 16 under the System V call sequence).
pub const FRAME_ALLOC: i32 = (core::mem::size_of::<StackLayout>() + 8) as i32;

pub struct BlockAssembler {
    ops: dynasmrt::x64::Assembler,
    features: CpuFeatures,
    scopes: Vec<LabelScope>,
}

macro_rules! alu_method {
    ($name:ident => $mn:tt) => {
        pub fn $name(&mut self, dst: Reg, src: impl Into<Operand>) {
            debug_assert!(!dst.is_xmm());
            match src.into() {
                Operand::Reg(s) => {
                    debug_assert_eq!(dst.bits, s.bits);
                    match dst.bits {
                        64 => dynasm!(self.ops ; .arch x64 ; $mn Rq(dst.idx), Rq(s.idx)),
                        32 => dynasm!(self.ops ; .arch x64 ; $mn Rd(dst.idx), Rd(s.idx)),
                        16 => dynasm!(self.ops ; .arch x64 ; $mn Rw(dst.idx), Rw(s.idx)),
                        _ => dynasm!(self.ops ; .arch x64 ; $mn Rb(dst.idx), Rb(s.idx)),
                    }
                }
                Operand::Imm(v) => match dst.bits {
                    64 => dynasm!(self.ops ; .arch x64 ; $mn Rq(dst.idx), v),
                    32 => dynasm!(self.ops ; .arch x64 ; $mn Rd(dst.idx), v),
                    16 => dynasm!(self.ops ; .arch x64 ; $mn Rw(dst.idx), v as i16),
                    _ => dynasm!(self.ops ; .arch x64 ; $mn Rb(dst.idx), v as i8),
                },
                Operand::Mem(m) => match dst.bits {
                    64 => dynasm!(self.ops ; .arch x64 ; $mn Rq(dst.idx), QWORD [Rq(m.base) + m.disp]),
                    32 => dynasm!(self.ops ; .arch x64 ; $mn Rd(dst.idx), DWORD [Rq(m.base) + m.disp]),
                    _ => panic!("unsupported memory operand width {}", dst.bits),
                },
            }
        }
    };
}

macro_rules! cmov_method {
    ($name:ident => $mn:tt) => {
        pub fn $name(&mut self, dst: Reg, src: Reg) {
            debug_assert_eq!(dst.bits, src.bits);
            match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; $mn Rq(dst.idx), Rq(src.idx)),
                32 => dynasm!(self.ops ; .arch x64 ; $mn Rd(dst.idx), Rd(src.idx)),
                _ => panic!("cmov requires a 32- or 64-bit destination"),
            }
        }
    };
}

macro_rules! setcc_method {
    ($name:ident => $mn:tt) => {
        pub fn $name(&mut self, dst: Reg) {
            debug_assert_eq!(dst.bits, 8, "setcc writes a byte register");
            dynasm!(self.ops ; .arch x64 ; $mn Rb(dst.idx));
        }
    };
}

macro_rules! shift_imm_method {
    ($name:ident => $mn:tt) => {
        pub fn $name(&mut self, dst: Reg, imm: u8) {
            match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; $mn Rq(dst.idx), imm as i8),
                32 => dynasm!(self.ops ; .arch x64 ; $mn Rd(dst.idx), imm as i8),
                16 => dynasm!(self.ops ; .arch x64 ; $mn Rw(dst.idx), imm as i8),
                _ => dynasm!(self.ops ; .arch x64 ; $mn Rb(dst.idx), imm as i8),
            }
        }
    };
}

macro_rules! shift_cl_method {
    ($name:ident => $mn:tt) => {
        pub fn $name(&mut self, dst: Reg) {
            match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; $mn Rq(dst.idx), cl),
                32 => dynasm!(self.ops ; .arch x64 ; $mn Rd(dst.idx), cl),
                _ => panic!("variable shift requires a 32- or 64-bit destination"),
            }
        }
    };
}

impl BlockAssembler {
    pub fn new(features: CpuFeatures) -> Self {
        Self {
            ops: dynasmrt::x64::Assembler::new().expect("failed to allocate code buffer"),
            features,
            scopes: Vec::new(),
        }
    }

    pub fn with_detected_features() -> Self {
        Self::new(CpuFeatures::detect())
    }

    /// The one feature-query branch point available to emitters.
    pub fn cpu_supports(&self, feature: CpuFeatures) -> bool {
        self.features.contains(feature)
    }

    /// Current append offset in bytes.
    pub fn offset(&self) -> usize {
        self.ops.offset().0
    }

    /// Resolve all labels and hand back the executable buffer.
    pub fn finalize(self) -> Result<ExecutableBuffer, EmitError> {
        assert!(self.scopes.is_empty(), "unbalanced label scope");
        self.ops.finalize().map_err(|_| EmitError::Finalize)
    }

    // -- Local labels -----------------------------------------------------

    /// Open a label scope. Every label created inside it must be bound
    /// before the matching `exit_local_scope`.
    pub fn enter_local_scope(&mut self) {
        self.scopes.push(LabelScope::default());
    }

    pub fn exit_local_scope(&mut self) {
        let scope = self.scopes.pop().expect("exit_local_scope without enter");
        assert_eq!(
            scope.created, scope.bound,
            "label scope exited with unbound labels"
        );
    }

    pub fn new_label(&mut self) -> Label {
        if let Some(scope) = self.scopes.last_mut() {
            scope.created += 1;
        }
        Label(self.ops.new_dynamic_label())
    }

    pub fn bind(&mut self, label: &Label) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bound += 1;
        }
        let target = label.0;
        dynasm!(self.ops ; .arch x64 ; =>target);
    }

    pub fn jmp(&mut self, label: &Label) {
        let target = label.0;
        dynasm!(self.ops ; .arch x64 ; jmp =>target);
    }
    pub fn jz(&mut self, label: &Label) {
        let target = label.0;
        dynasm!(self.ops ; .arch x64 ; jz =>target);
    }
    pub fn je(&mut self, label: &Label) {
        let target = label.0;
        dynasm!(self.ops ; .arch x64 ; je =>target);
    }
    pub fn ja(&mut self, label: &Label) {
        let target = label.0;
        dynasm!(self.ops ; .arch x64 ; ja =>target);
    }

    // -- Moves ------------------------------------------------------------

    pub fn mov(&mut self, dst: Reg, src: impl Into<Operand>) {
        debug_assert!(!dst.is_xmm());
        match src.into() {
            Operand::Reg(s) => {
                debug_assert_eq!(dst.bits, s.bits);
                match dst.bits {
                    64 => dynasm!(self.ops ; .arch x64 ; mov Rq(dst.idx), Rq(s.idx)),
                    32 => dynasm!(self.ops ; .arch x64 ; mov Rd(dst.idx), Rd(s.idx)),
                    16 => dynasm!(self.ops ; .arch x64 ; mov Rw(dst.idx), Rw(s.idx)),
                    _ => dynasm!(self.ops ; .arch x64 ; mov Rb(dst.idx), Rb(s.idx)),
                }
            }
            // A 64-bit destination sign-extends the 32-bit immediate; use
            // `mov_imm64` to materialize arbitrary 64-bit constants.
            Operand::Imm(v) => match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; mov Rq(dst.idx), v),
                32 => dynasm!(self.ops ; .arch x64 ; mov Rd(dst.idx), v),
                16 => dynasm!(self.ops ; .arch x64 ; mov Rw(dst.idx), v as i16),
                _ => dynasm!(self.ops ; .arch x64 ; mov Rb(dst.idx), v as i8),
            },
            Operand::Mem(m) => match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; mov Rq(dst.idx), QWORD [Rq(m.base) + m.disp]),
                32 => dynasm!(self.ops ; .arch x64 ; mov Rd(dst.idx), DWORD [Rq(m.base) + m.disp]),
                16 => dynasm!(self.ops ; .arch x64 ; mov Rw(dst.idx), WORD [Rq(m.base) + m.disp]),
                _ => dynasm!(self.ops ; .arch x64 ; mov Rb(dst.idx), BYTE [Rq(m.base) + m.disp]),
            },
        }
    }

    /// Materialize a 64-bit constant, choosing the shortest encoding.
    pub fn mov_imm64(&mut self, dst: Reg, value: u64) {
        debug_assert_eq!(dst.bits, 64);
        if value <= u32::MAX as u64 {
            // A 32-bit destination move zero-extends.
            dynasm!(self.ops ; .arch x64 ; mov Rd(dst.idx), value as i32);
        } else if value as i64 >= i32::MIN as i64 && (value as i64) < 0 {
            dynasm!(self.ops ; .arch x64 ; mov Rq(dst.idx), value as i32);
        } else {
            dynasm!(self.ops ; .arch x64 ; mov Rq(dst.idx), QWORD value as i64);
        }
    }

    /// Store to memory. The access width comes from the register operand,
    /// or from `dst.bits` when storing an immediate.
    pub fn mov_to(&mut self, dst: Mem, src: impl Into<Operand>) {
        match src.into() {
            Operand::Reg(s) => match s.bits {
                64 => dynasm!(self.ops ; .arch x64 ; mov QWORD [Rq(dst.base) + dst.disp], Rq(s.idx)),
                32 => dynasm!(self.ops ; .arch x64 ; mov DWORD [Rq(dst.base) + dst.disp], Rd(s.idx)),
                16 => dynasm!(self.ops ; .arch x64 ; mov WORD [Rq(dst.base) + dst.disp], Rw(s.idx)),
                _ => dynasm!(self.ops ; .arch x64 ; mov BYTE [Rq(dst.base) + dst.disp], Rb(s.idx)),
            },
            Operand::Imm(v) => match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; mov QWORD [Rq(dst.base) + dst.disp], v),
                32 => dynasm!(self.ops ; .arch x64 ; mov DWORD [Rq(dst.base) + dst.disp], v),
                _ => panic!("unsupported immediate store width {}", dst.bits),
            },
            Operand::Mem(_) => panic!("memory-to-memory move"),
        }
    }

    pub fn xchg(&mut self, a: Reg, b: Reg) {
        debug_assert_eq!((a.bits, b.bits), (64, 64));
        dynasm!(self.ops ; .arch x64 ; xchg Rq(a.idx), Rq(b.idx));
    }

    // -- ALU --------------------------------------------------------------

    alu_method!(add => add);
    alu_method!(adc => adc);
    alu_method!(sub => sub);
    alu_method!(sbb => sbb);
    alu_method!(and_ => and);
    alu_method!(or_ => or);
    alu_method!(xor_ => xor);
    alu_method!(cmp => cmp);

    pub fn test(&mut self, a: Reg, b: Reg) {
        debug_assert_eq!(a.bits, b.bits);
        match a.bits {
            64 => dynasm!(self.ops ; .arch x64 ; test Rq(a.idx), Rq(b.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; test Rd(a.idx), Rd(b.idx)),
            16 => dynasm!(self.ops ; .arch x64 ; test Rw(a.idx), Rw(b.idx)),
            _ => dynasm!(self.ops ; .arch x64 ; test Rb(a.idx), Rb(b.idx)),
        }
    }

    pub fn not_(&mut self, dst: Reg) {
        match dst.bits {
            64 => dynasm!(self.ops ; .arch x64 ; not Rq(dst.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; not Rd(dst.idx)),
            _ => panic!("unsupported not width {}", dst.bits),
        }
    }

    pub fn neg(&mut self, dst: Reg) {
        match dst.bits {
            64 => dynasm!(self.ops ; .arch x64 ; neg Rq(dst.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; neg Rd(dst.idx)),
            _ => panic!("unsupported neg width {}", dst.bits),
        }
    }

    /// Bit test with an immediate index; loads the bit into CF.
    pub fn bt(&mut self, src: Reg, bit: u8) {
        match src.bits {
            64 => dynasm!(self.ops ; .arch x64 ; bt Rq(src.idx), bit as i8),
            32 => dynasm!(self.ops ; .arch x64 ; bt Rd(src.idx), bit as i8),
            _ => panic!("unsupported bt width {}", src.bits),
        }
    }

    // -- Flag material ----------------------------------------------------

    pub fn stc(&mut self) {
        dynasm!(self.ops ; .arch x64 ; stc);
    }
    pub fn cmc(&mut self) {
        dynasm!(self.ops ; .arch x64 ; cmc);
    }
    pub fn lahf(&mut self) {
        dynasm!(self.ops ; .arch x64 ; lahf);
    }
    pub fn sahf(&mut self) {
        dynasm!(self.ops ; .arch x64 ; sahf);
    }

    setcc_method!(sete => sete);
    setcc_method!(setc => setc);
    setcc_method!(setnc => setnc);
    setcc_method!(seto => seto);

    // -- Conditional moves ------------------------------------------------

    cmov_method!(cmovz => cmovz);
    cmov_method!(cmovnz => cmovnz);
    cmov_method!(cmovc => cmovc);
    cmov_method!(cmovnc => cmovnc);
    cmov_method!(cmovs => cmovs);
    cmov_method!(cmovns => cmovns);
    cmov_method!(cmovo => cmovo);
    cmov_method!(cmovno => cmovno);
    cmov_method!(cmova => cmova);
    cmov_method!(cmovna => cmovna);
    cmov_method!(cmovge => cmovge);
    cmov_method!(cmovl => cmovl);
    cmov_method!(cmovg => cmovg);
    cmov_method!(cmovle => cmovle);
    cmov_method!(cmovb => cmovb);
    cmov_method!(cmovnb => cmovnb);

    // -- Shifts and rotates -----------------------------------------------

    shift_imm_method!(shl => shl);
    shift_imm_method!(shr => shr);
    shift_imm_method!(sar => sar);
    shift_imm_method!(rol => rol);
    shift_imm_method!(ror => ror);
    shift_imm_method!(rcr => rcr);

    shift_cl_method!(shl_cl => shl);
    shift_cl_method!(shr_cl => shr);
    shift_cl_method!(sar_cl => sar);
    shift_cl_method!(ror_cl => ror);

    /// Double-precision right shift: `dst = (src:dst) >> imm` (low half).
    pub fn shrd(&mut self, dst: Reg, src: Reg, imm: u8) {
        debug_assert_eq!(dst.bits, src.bits);
        match dst.bits {
            64 => dynasm!(self.ops ; .arch x64 ; shrd Rq(dst.idx), Rq(src.idx), imm as i8),
            32 => dynasm!(self.ops ; .arch x64 ; shrd Rd(dst.idx), Rd(src.idx), imm as i8),
            _ => panic!("unsupported shrd width {}", dst.bits),
        }
    }

    // -- Multiply / divide ------------------------------------------------

    /// Two-operand (truncating) signed multiply. An immediate right-hand
    /// side uses the three-operand form.
    pub fn imul(&mut self, dst: Reg, src: impl Into<Operand>) {
        match src.into() {
            Operand::Reg(s) => {
                debug_assert_eq!(dst.bits, s.bits);
                match dst.bits {
                    64 => dynasm!(self.ops ; .arch x64 ; imul Rq(dst.idx), Rq(s.idx)),
                    32 => dynasm!(self.ops ; .arch x64 ; imul Rd(dst.idx), Rd(s.idx)),
                    _ => panic!("unsupported imul width {}", dst.bits),
                }
            }
            Operand::Imm(v) => match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; imul Rq(dst.idx), Rq(dst.idx), v),
                32 => dynasm!(self.ops ; .arch x64 ; imul Rd(dst.idx), Rd(dst.idx), v),
                _ => panic!("unsupported imul width {}", dst.bits),
            },
            Operand::Mem(m) => match dst.bits {
                64 => dynasm!(self.ops ; .arch x64 ; imul Rq(dst.idx), QWORD [Rq(m.base) + m.disp]),
                32 => dynasm!(self.ops ; .arch x64 ; imul Rd(dst.idx), DWORD [Rq(m.base) + m.disp]),
                _ => panic!("unsupported imul width {}", dst.bits),
            },
        }
    }

    /// One-operand signed multiply: DATA_HIGH:ACC = ACC * op.
    pub fn imul_wide(&mut self, op: impl Into<Operand>) {
        match op.into() {
            Operand::Reg(s) => match s.bits {
                64 => dynasm!(self.ops ; .arch x64 ; imul Rq(s.idx)),
                32 => dynasm!(self.ops ; .arch x64 ; imul Rd(s.idx)),
                _ => panic!("unsupported imul width {}", s.bits),
            },
            Operand::Mem(m) => match m.bits {
                64 => dynasm!(self.ops ; .arch x64 ; imul QWORD [Rq(m.base) + m.disp]),
                32 => dynasm!(self.ops ; .arch x64 ; imul DWORD [Rq(m.base) + m.disp]),
                _ => panic!("unsupported imul width {}", m.bits),
            },
            Operand::Imm(_) => panic!("one-operand imul takes no immediate"),
        }
    }

    /// One-operand unsigned multiply: DATA_HIGH:ACC = ACC * op.
    pub fn mul(&mut self, op: impl Into<Operand>) {
        match op.into() {
            Operand::Reg(s) => match s.bits {
                64 => dynasm!(self.ops ; .arch x64 ; mul Rq(s.idx)),
                32 => dynasm!(self.ops ; .arch x64 ; mul Rd(s.idx)),
                _ => panic!("unsupported mul width {}", s.bits),
            },
            Operand::Mem(m) => match m.bits {
                64 => dynasm!(self.ops ; .arch x64 ; mul QWORD [Rq(m.base) + m.disp]),
                32 => dynasm!(self.ops ; .arch x64 ; mul DWORD [Rq(m.base) + m.disp]),
                _ => panic!("unsupported mul width {}", m.bits),
            },
            Operand::Imm(_) => panic!("mul takes no immediate"),
        }
    }

    /// Unsigned divide of DATA_HIGH:ACC by the operand.
    pub fn div(&mut self, op: Reg) {
        match op.bits {
            64 => dynasm!(self.ops ; .arch x64 ; div Rq(op.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; div Rd(op.idx)),
            _ => panic!("unsupported div width {}", op.bits),
        }
    }

    /// Signed divide of DATA_HIGH:ACC by the operand.
    pub fn idiv(&mut self, op: Reg) {
        match op.bits {
            64 => dynasm!(self.ops ; .arch x64 ; idiv Rq(op.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; idiv Rd(op.idx)),
            _ => panic!("unsupported idiv width {}", op.bits),
        }
    }

    pub fn cdq(&mut self) {
        dynasm!(self.ops ; .arch x64 ; cdq);
    }
    pub fn cqo(&mut self) {
        dynasm!(self.ops ; .arch x64 ; cqo);
    }

    // -- Extension, reversal, bit counting --------------------------------

    pub fn movzx(&mut self, dst: Reg, src: Reg) {
        match (dst.bits, src.bits) {
            (32, 8) => dynasm!(self.ops ; .arch x64 ; movzx Rd(dst.idx), Rb(src.idx)),
            (32, 16) => dynasm!(self.ops ; .arch x64 ; movzx Rd(dst.idx), Rw(src.idx)),
            _ => panic!("unsupported movzx {}<-{}", dst.bits, src.bits),
        }
    }

    pub fn movsx(&mut self, dst: Reg, src: Reg) {
        match (dst.bits, src.bits) {
            (32, 8) => dynasm!(self.ops ; .arch x64 ; movsx Rd(dst.idx), Rb(src.idx)),
            (32, 16) => dynasm!(self.ops ; .arch x64 ; movsx Rd(dst.idx), Rw(src.idx)),
            (64, 8) => dynasm!(self.ops ; .arch x64 ; movsx Rq(dst.idx), Rb(src.idx)),
            (64, 16) => dynasm!(self.ops ; .arch x64 ; movsx Rq(dst.idx), Rw(src.idx)),
            _ => panic!("unsupported movsx {}<-{}", dst.bits, src.bits),
        }
    }

    pub fn movsxd(&mut self, dst: Reg, src: Reg) {
        debug_assert_eq!((dst.bits, src.bits), (64, 32));
        dynasm!(self.ops ; .arch x64 ; movsxd Rq(dst.idx), Rd(src.idx));
    }

    pub fn bswap(&mut self, dst: Reg) {
        match dst.bits {
            64 => dynasm!(self.ops ; .arch x64 ; bswap Rq(dst.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; bswap Rd(dst.idx)),
            _ => panic!("unsupported bswap width {}", dst.bits),
        }
    }

    /// Count leading zeros. Requires `CpuFeatures::LZCNT`.
    pub fn lzcnt(&mut self, dst: Reg, src: Reg) {
        assert!(
            self.cpu_supports(CpuFeatures::LZCNT),
            "lzcnt emitted without LZCNT support"
        );
        debug_assert_eq!(dst.bits, src.bits);
        match dst.bits {
            64 => dynasm!(self.ops ; .arch x64 ; lzcnt Rq(dst.idx), Rq(src.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; lzcnt Rd(dst.idx), Rd(src.idx)),
            _ => panic!("unsupported lzcnt width {}", dst.bits),
        }
    }

    /// Bit scan reverse. The result is undefined for a zero source, but ZF
    /// is set in that case.
    pub fn bsr(&mut self, dst: Reg, src: Reg) {
        debug_assert_eq!(dst.bits, src.bits);
        match dst.bits {
            64 => dynasm!(self.ops ; .arch x64 ; bsr Rq(dst.idx), Rq(src.idx)),
            32 => dynasm!(self.ops ; .arch x64 ; bsr Rd(dst.idx), Rd(src.idx)),
            _ => panic!("unsupported bsr width {}", dst.bits),
        }
    }

    // -- SSE --------------------------------------------------------------

    /// 64-bit move between XMM and GPR/XMM/memory; zeroes the upper lane
    /// of an XMM destination.
    pub fn movq(&mut self, dst: Reg, src: impl Into<Operand>) {
        match src.into() {
            Operand::Reg(s) => match (dst.is_xmm(), s.is_xmm()) {
                (true, false) => dynasm!(self.ops ; .arch x64 ; movq Rx(dst.idx), Rq(s.idx)),
                (false, true) => dynasm!(self.ops ; .arch x64 ; movq Rq(dst.idx), Rx(s.idx)),
                (true, true) => dynasm!(self.ops ; .arch x64 ; movq Rx(dst.idx), Rx(s.idx)),
                (false, false) => panic!("movq between two GPRs"),
            },
            Operand::Mem(m) => {
                debug_assert!(dst.is_xmm());
                dynasm!(self.ops ; .arch x64 ; movq Rx(dst.idx), QWORD [Rq(m.base) + m.disp]);
            }
            Operand::Imm(_) => panic!("movq takes no immediate"),
        }
    }

    pub fn movq_to(&mut self, dst: Mem, src: Reg) {
        debug_assert!(src.is_xmm());
        dynasm!(self.ops ; .arch x64 ; movq QWORD [Rq(dst.base) + dst.disp], Rx(src.idx));
    }

    /// 32-bit move between XMM and GPR/memory.
    pub fn movd(&mut self, dst: Reg, src: impl Into<Operand>) {
        match src.into() {
            Operand::Reg(s) => match (dst.is_xmm(), s.is_xmm()) {
                (true, false) => dynasm!(self.ops ; .arch x64 ; movd Rx(dst.idx), Rd(s.idx)),
                (false, true) => dynasm!(self.ops ; .arch x64 ; movd Rd(dst.idx), Rx(s.idx)),
                _ => panic!("invalid movd operands"),
            },
            Operand::Mem(m) => {
                debug_assert!(dst.is_xmm());
                dynasm!(self.ops ; .arch x64 ; movd Rx(dst.idx), DWORD [Rq(m.base) + m.disp]);
            }
            Operand::Imm(_) => panic!("movd takes no immediate"),
        }
    }

    pub fn movd_to(&mut self, dst: Mem, src: Reg) {
        debug_assert!(src.is_xmm());
        dynasm!(self.ops ; .arch x64 ; movd DWORD [Rq(dst.base) + dst.disp], Rx(src.idx));
    }

    /// Aligned 128-bit move.
    pub fn movaps(&mut self, dst: Reg, src: impl Into<Operand>) {
        debug_assert!(dst.is_xmm());
        match src.into() {
            Operand::Reg(s) => {
                debug_assert!(s.is_xmm());
                dynasm!(self.ops ; .arch x64 ; movaps Rx(dst.idx), Rx(s.idx));
            }
            Operand::Mem(m) => {
                dynasm!(self.ops ; .arch x64 ; movaps Rx(dst.idx), [Rq(m.base) + m.disp]);
            }
            Operand::Imm(_) => panic!("movaps takes no immediate"),
        }
    }

    pub fn movaps_to(&mut self, dst: Mem, src: Reg) {
        debug_assert!(src.is_xmm());
        dynasm!(self.ops ; .arch x64 ; movaps [Rq(dst.base) + dst.disp], Rx(src.idx));
    }

    /// Insert a GPR into XMM lane 0 or 1. Requires `CpuFeatures::SSE4_1`.
    pub fn pinsrq(&mut self, dst: Reg, src: Reg, lane: u8) {
        assert!(
            self.cpu_supports(CpuFeatures::SSE4_1),
            "pinsrq emitted without SSE4.1 support"
        );
        debug_assert!(dst.is_xmm() && !src.is_xmm() && lane < 2);
        dynasm!(self.ops ; .arch x64 ; pinsrq Rx(dst.idx), Rq(src.idx), lane as i8);
    }

    pub fn punpcklqdq(&mut self, dst: Reg, src: Reg) {
        debug_assert!(dst.is_xmm() && src.is_xmm());
        dynasm!(self.ops ; .arch x64 ; punpcklqdq Rx(dst.idx), Rx(src.idx));
    }

    pub fn pxor(&mut self, dst: Reg, src: Reg) {
        debug_assert!(dst.is_xmm() && src.is_xmm());
        dynasm!(self.ops ; .arch x64 ; pxor Rx(dst.idx), Rx(src.idx));
    }

    // -- Block frame ------------------------------------------------------

    /// Entry sequence for a compiled block: preserves the callee-saved
    /// registers the allocator may hand out, loads `JIT_STATE_PTR` from
    /// the first System V argument and reserves the spill frame. A
    /// finalized buffer starting with this sequence is callable as
    /// `extern "sysv64" fn(*mut JitState)`.
    pub fn emit_frame_prologue(&mut self) {
        dynasm!(self.ops
            ; .arch x64
            ; push rbx
            ; push rbp
            ; push r12
            ; push r13
            ; push r14
            ; push r15
            ; mov r15, rdi
            ; sub rsp, FRAME_ALLOC
        );
    }

    pub fn emit_frame_epilogue(&mut self) {
        dynasm!(self.ops
            ; .arch x64
            ; add rsp, FRAME_ALLOC
            ; pop r15
            ; pop r14
            ; pop r13
            ; pop r12
            ; pop rbp
            ; pop rbx
            ; ret
        );
    }

    pub fn ret(&mut self) {
        dynasm!(self.ops ; .arch x64 ; ret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_reg_reg_emits_bytes() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        let start = asm.offset();
        asm.mov(RAX, RCX);
        assert!(asm.offset() > start);
    }

    #[test]
    fn extended_registers_take_rex_prefixes() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        let start = asm.offset();
        asm.shl_cl(Reg::gpr64(8));
        // REX.WB + opcode + modrm
        assert!(asm.offset() - start >= 3);
    }

    #[test]
    fn mov_imm64_picks_short_encodings() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        asm.mov_imm64(RAX, 1);
        let short = asm.offset();
        asm.mov_imm64(RAX, 0x1234_5678_9ABC_DEF0);
        let long = asm.offset() - short;
        assert!(short < long);
    }

    #[test]
    fn label_round_trip() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        asm.enter_local_scope();
        let end = asm.new_label();
        asm.jz(&end);
        asm.xor_(EAX, EAX);
        asm.bind(&end);
        asm.exit_local_scope();
        asm.ret();
        assert!(asm.finalize().is_ok());
    }

    #[test]
    #[should_panic]
    fn unbound_label_in_scope_panics() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        asm.enter_local_scope();
        let _orphan = asm.new_label();
        asm.exit_local_scope();
    }

    #[test]
    #[should_panic]
    fn lzcnt_without_feature_panics() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        asm.lzcnt(EAX, ECX);
    }

    #[test]
    fn feature_mask_is_honoured() {
        let asm = BlockAssembler::new(CpuFeatures::SSE4_1);
        assert!(asm.cpu_supports(CpuFeatures::SSE4_1));
        assert!(!asm.cpu_supports(CpuFeatures::LZCNT));
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn trivial_function_executes() {
        let mut asm = BlockAssembler::new(CpuFeatures::empty());
        asm.mov(EAX, 42);
        asm.ret();
        let buf = asm.finalize().unwrap();
        let f: extern "sysv64" fn() -> u32 =
            unsafe { std::mem::transmute(buf.ptr(AssemblyOffset(0))) };
        assert_eq!(f(), 42);
    }
}
