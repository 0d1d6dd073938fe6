use std::fmt;

use crate::ir::types::Type;

/// The closed set of IR opcodes handled by this backend: the integer
/// data-processing family, its attached pseudo-operations, and the guest
/// state accessors that let blocks read inputs and write results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    // --- Guest state access ---
    GetRegister32,
    GetRegister64,
    SetRegister32,
    SetRegister64,
    GetVector,
    SetVector,
    GetCFlag,
    GetNZCVRaw,
    SetNZCVRaw,
    SetNZCV,

    // --- Pseudo-operations (derived outputs of a primary instruction) ---
    GetCarryFromOp,
    GetOverflowFromOp,
    GetNZCVFromOp,

    // --- Bit assembly ---
    Pack2x32To1x64,
    Pack2x64To1x128,
    LeastSignificantWord,
    MostSignificantWord,
    LeastSignificantHalf,
    LeastSignificantByte,
    MostSignificantBit,
    IsZero32,
    IsZero64,
    TestBit,
    ExtractRegister32,
    ExtractRegister64,

    // --- Conditional select ---
    ConditionalSelect32,
    ConditionalSelect64,
    ConditionalSelectNZCV,

    // --- Shifts ---
    LogicalShiftLeft32,
    LogicalShiftLeft64,
    LogicalShiftRight32,
    LogicalShiftRight64,
    ArithmeticShiftRight32,
    ArithmeticShiftRight64,
    RotateRight32,
    RotateRight64,
    RotateRightExtended,

    // --- Arithmetic ---
    Add32,
    Add64,
    Sub32,
    Sub64,
    Mul32,
    Mul64,
    SignedMultiplyHigh64,
    UnsignedMultiplyHigh64,
    UnsignedDiv32,
    UnsignedDiv64,
    SignedDiv32,
    SignedDiv64,

    // --- Logical ---
    And32,
    And64,
    Eor32,
    Eor64,
    Or32,
    Or64,
    Not32,
    Not64,

    // --- Extension ---
    SignExtendByteToWord,
    SignExtendHalfToWord,
    SignExtendByteToLong,
    SignExtendHalfToLong,
    SignExtendWordToLong,
    ZeroExtendByteToWord,
    ZeroExtendHalfToWord,
    ZeroExtendByteToLong,
    ZeroExtendHalfToLong,
    ZeroExtendWordToLong,
    ZeroExtendLongToQuad,

    // --- Byte reversal ---
    ByteReverseWord,
    ByteReverseHalf,
    ByteReverseDual,

    // --- Bit counting ---
    CountLeadingZeros32,
    CountLeadingZeros64,

    // --- Min/max ---
    MaxSigned32,
    MaxSigned64,
    MaxUnsigned32,
    MaxUnsigned64,
    MinSigned32,
    MinSigned64,
    MinUnsigned32,
    MinUnsigned64,
}

struct OpcodeInfo {
    ret: Type,
    args: &'static [Type],
}

impl Opcode {
    pub fn return_type(self) -> Type {
        self.info().ret
    }

    pub fn arg_types(self) -> &'static [Type] {
        self.info().args
    }

    pub fn num_args(self) -> usize {
        self.info().args.len()
    }

    /// Pseudo-operations request a derived output of their primary
    /// instruction; they are consumed by the primary's emitter and are
    /// never dispatched on their own.
    pub fn is_pseudo_operation(self) -> bool {
        matches!(
            self,
            Opcode::GetCarryFromOp | Opcode::GetOverflowFromOp | Opcode::GetNZCVFromOp
        )
    }

    /// Opcodes that mutate guest state.
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Opcode::SetRegister32
                | Opcode::SetRegister64
                | Opcode::SetVector
                | Opcode::SetNZCVRaw
                | Opcode::SetNZCV
        )
    }

    fn info(self) -> OpcodeInfo {
        use Opcode::*;
        use Type::{Cond as COND, Nzcv as NZCV, Opaque as OPQ, Void as V, U1, U128, U16, U32, U64, U8};

        match self {
            // Guest state access
            GetRegister32 => OpcodeInfo { ret: U32, args: &[U8] },
            GetRegister64 => OpcodeInfo { ret: U64, args: &[U8] },
            SetRegister32 => OpcodeInfo { ret: V, args: &[U8, U32] },
            SetRegister64 => OpcodeInfo { ret: V, args: &[U8, U64] },
            GetVector => OpcodeInfo { ret: U128, args: &[U8] },
            SetVector => OpcodeInfo { ret: V, args: &[U8, U128] },
            GetCFlag => OpcodeInfo { ret: U1, args: &[] },
            GetNZCVRaw => OpcodeInfo { ret: U32, args: &[] },
            SetNZCVRaw => OpcodeInfo { ret: V, args: &[U32] },
            SetNZCV => OpcodeInfo { ret: V, args: &[NZCV] },

            // Pseudo-operations
            GetCarryFromOp => OpcodeInfo { ret: U1, args: &[OPQ] },
            GetOverflowFromOp => OpcodeInfo { ret: U1, args: &[OPQ] },
            GetNZCVFromOp => OpcodeInfo { ret: NZCV, args: &[OPQ] },

            // Bit assembly
            Pack2x32To1x64 => OpcodeInfo { ret: U64, args: &[U32, U32] },
            Pack2x64To1x128 => OpcodeInfo { ret: U128, args: &[U64, U64] },
            LeastSignificantWord => OpcodeInfo { ret: U32, args: &[U64] },
            MostSignificantWord => OpcodeInfo { ret: U32, args: &[U64] },
            LeastSignificantHalf => OpcodeInfo { ret: U16, args: &[U32] },
            LeastSignificantByte => OpcodeInfo { ret: U8, args: &[U32] },
            MostSignificantBit => OpcodeInfo { ret: U1, args: &[U32] },
            IsZero32 => OpcodeInfo { ret: U1, args: &[U32] },
            IsZero64 => OpcodeInfo { ret: U1, args: &[U64] },
            TestBit => OpcodeInfo { ret: U1, args: &[U64, U8] },
            ExtractRegister32 => OpcodeInfo { ret: U32, args: &[U32, U32, U8] },
            ExtractRegister64 => OpcodeInfo { ret: U64, args: &[U64, U64, U8] },

            // Conditional select
            ConditionalSelect32 => OpcodeInfo { ret: U32, args: &[COND, U32, U32] },
            ConditionalSelect64 => OpcodeInfo { ret: U64, args: &[COND, U64, U64] },
            ConditionalSelectNZCV => OpcodeInfo { ret: NZCV, args: &[COND, NZCV, NZCV] },

            // Shifts: 32-bit forms carry (operand, amount, carry_in)
            LogicalShiftLeft32 => OpcodeInfo { ret: U32, args: &[U32, U8, U1] },
            LogicalShiftLeft64 => OpcodeInfo { ret: U64, args: &[U64, U8] },
            LogicalShiftRight32 => OpcodeInfo { ret: U32, args: &[U32, U8, U1] },
            LogicalShiftRight64 => OpcodeInfo { ret: U64, args: &[U64, U8] },
            ArithmeticShiftRight32 => OpcodeInfo { ret: U32, args: &[U32, U8, U1] },
            ArithmeticShiftRight64 => OpcodeInfo { ret: U64, args: &[U64, U8] },
            RotateRight32 => OpcodeInfo { ret: U32, args: &[U32, U8, U1] },
            RotateRight64 => OpcodeInfo { ret: U64, args: &[U64, U8] },
            RotateRightExtended => OpcodeInfo { ret: U32, args: &[U32, U1] },

            // Arithmetic
            Add32 => OpcodeInfo { ret: U32, args: &[U32, U32, U1] },
            Add64 => OpcodeInfo { ret: U64, args: &[U64, U64, U1] },
            Sub32 => OpcodeInfo { ret: U32, args: &[U32, U32, U1] },
            Sub64 => OpcodeInfo { ret: U64, args: &[U64, U64, U1] },
            Mul32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            Mul64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            SignedMultiplyHigh64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            UnsignedMultiplyHigh64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            UnsignedDiv32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            UnsignedDiv64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            SignedDiv32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            SignedDiv64 => OpcodeInfo { ret: U64, args: &[U64, U64] },

            // Logical
            And32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            And64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            Eor32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            Eor64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            Or32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            Or64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            Not32 => OpcodeInfo { ret: U32, args: &[U32] },
            Not64 => OpcodeInfo { ret: U64, args: &[U64] },

            // Extension
            SignExtendByteToWord => OpcodeInfo { ret: U32, args: &[U8] },
            SignExtendHalfToWord => OpcodeInfo { ret: U32, args: &[U16] },
            SignExtendByteToLong => OpcodeInfo { ret: U64, args: &[U8] },
            SignExtendHalfToLong => OpcodeInfo { ret: U64, args: &[U16] },
            SignExtendWordToLong => OpcodeInfo { ret: U64, args: &[U32] },
            ZeroExtendByteToWord => OpcodeInfo { ret: U32, args: &[U8] },
            ZeroExtendHalfToWord => OpcodeInfo { ret: U32, args: &[U16] },
            ZeroExtendByteToLong => OpcodeInfo { ret: U64, args: &[U8] },
            ZeroExtendHalfToLong => OpcodeInfo { ret: U64, args: &[U16] },
            ZeroExtendWordToLong => OpcodeInfo { ret: U64, args: &[U32] },
            ZeroExtendLongToQuad => OpcodeInfo { ret: U128, args: &[U64] },

            // Byte reversal
            ByteReverseWord => OpcodeInfo { ret: U32, args: &[U32] },
            ByteReverseHalf => OpcodeInfo { ret: U16, args: &[U16] },
            ByteReverseDual => OpcodeInfo { ret: U64, args: &[U64] },

            // Bit counting
            CountLeadingZeros32 => OpcodeInfo { ret: U32, args: &[U32] },
            CountLeadingZeros64 => OpcodeInfo { ret: U64, args: &[U64] },

            // Min/max
            MaxSigned32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            MaxSigned64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            MaxUnsigned32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            MaxUnsigned64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            MinSigned32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            MinSigned64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
            MinUnsigned32 => OpcodeInfo { ret: U32, args: &[U32, U32] },
            MinUnsigned64 => OpcodeInfo { ret: U64, args: &[U64, U64] },
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_ops_have_one_opaque_arg() {
        for op in [
            Opcode::GetCarryFromOp,
            Opcode::GetOverflowFromOp,
            Opcode::GetNZCVFromOp,
        ] {
            assert!(op.is_pseudo_operation());
            assert_eq!(op.arg_types(), &[Type::Opaque]);
        }
        assert!(!Opcode::Add32.is_pseudo_operation());
    }

    #[test]
    fn arg_counts() {
        assert_eq!(Opcode::Add32.num_args(), 3);
        assert_eq!(Opcode::LogicalShiftLeft64.num_args(), 2);
        assert_eq!(Opcode::ConditionalSelect32.num_args(), 3);
        assert_eq!(Opcode::GetCFlag.num_args(), 0);
    }

    #[test]
    fn side_effects() {
        assert!(Opcode::SetRegister64.has_side_effects());
        assert!(Opcode::SetNZCV.has_side_effects());
        assert!(!Opcode::Add32.has_side_effects());
    }
}
