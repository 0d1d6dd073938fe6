//! Host locations an SSA value may occupy: a general-purpose register, an
//! XMM register, or a 128-bit spill slot in the block frame.
//!
//! A few registers carry protocol meaning between the emitters and the
//! allocator: `ACC` and `DATA_HIGH` are the implicit multiply/divide
//! registers, `SHIFT_COUNT` holds variable shift amounts, and
//! `JIT_STATE_PTR` addresses the guest state. They are never handed out
//! by ordinary scratch allocation; acquiring one requires an explicit
//! fixed-location call.

use crate::backend::x64::assembler::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostLoc {
    Gpr(u8),
    Xmm(u8),
    Spill(u8),
}

impl HostLoc {
    pub fn is_gpr(self) -> bool {
        matches!(self, HostLoc::Gpr(_))
    }
    pub fn is_xmm(self) -> bool {
        matches!(self, HostLoc::Xmm(_))
    }
    pub fn is_register(self) -> bool {
        self.is_gpr() || self.is_xmm()
    }
    pub fn is_spill(self) -> bool {
        matches!(self, HostLoc::Spill(_))
    }

    /// Capacity of the location in bits.
    pub fn bit_width(self) -> usize {
        match self {
            HostLoc::Gpr(_) => 64,
            HostLoc::Xmm(_) | HostLoc::Spill(_) => 128,
        }
    }

    pub fn to_reg64(self) -> Reg {
        match self {
            HostLoc::Gpr(i) => Reg::gpr64(i),
            _ => panic!("to_reg64 on {:?}", self),
        }
    }

    pub fn to_xmm(self) -> Reg {
        match self {
            HostLoc::Xmm(i) => Reg::xmm(i),
            _ => panic!("to_xmm on {:?}", self),
        }
    }
}

// Fixed-role registers (by protocol, not hardware).
pub const ACC: HostLoc = HostLoc::Gpr(0); // rax
pub const SHIFT_COUNT: HostLoc = HostLoc::Gpr(1); // rcx
pub const DATA_HIGH: HostLoc = HostLoc::Gpr(2); // rdx
pub const JIT_STATE_PTR: HostLoc = HostLoc::Gpr(15); // r15

pub const HOST_RSP: HostLoc = HostLoc::Gpr(4);

/// Allocation order for ordinary GPR requests. Excludes rsp and every
/// protocol register.
pub const ANY_GPR: &[HostLoc] = &[
    HostLoc::Gpr(3),  // rbx
    HostLoc::Gpr(6),  // rsi
    HostLoc::Gpr(7),  // rdi
    HostLoc::Gpr(5),  // rbp
    HostLoc::Gpr(8),
    HostLoc::Gpr(9),
    HostLoc::Gpr(10),
    HostLoc::Gpr(11),
    HostLoc::Gpr(12),
    HostLoc::Gpr(13),
    HostLoc::Gpr(14),
];

/// Allocation order for XMM requests.
pub const ANY_XMM: &[HostLoc] = &[
    HostLoc::Xmm(0),
    HostLoc::Xmm(1),
    HostLoc::Xmm(2),
    HostLoc::Xmm(3),
    HostLoc::Xmm(4),
    HostLoc::Xmm(5),
    HostLoc::Xmm(6),
    HostLoc::Xmm(7),
    HostLoc::Xmm(8),
    HostLoc::Xmm(9),
    HostLoc::Xmm(10),
    HostLoc::Xmm(11),
    HostLoc::Xmm(12),
    HostLoc::Xmm(13),
    HostLoc::Xmm(14),
    HostLoc::Xmm(15),
];
