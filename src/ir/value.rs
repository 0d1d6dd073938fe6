use std::fmt;

use crate::ir::cond::Cond;
use crate::ir::types::Type;

/// Index into a block's instruction arena. Doubles as the identity of the
/// SSA value the instruction defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstRef(pub u32);

impl InstRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An IR operand: an immediate, or a reference to a previously defined
/// instruction result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Void,
    Inst(InstRef),
    ImmU1(bool),
    ImmU8(u8),
    ImmU16(u16),
    ImmU32(u32),
    ImmU64(u64),
    ImmCond(Cond),
}

impl Value {
    pub fn get_type(&self) -> Type {
        match self {
            Value::Void => Type::Void,
            Value::Inst(_) => Type::Opaque,
            Value::ImmU1(_) => Type::U1,
            Value::ImmU8(_) => Type::U8,
            Value::ImmU16(_) => Type::U16,
            Value::ImmU32(_) => Type::U32,
            Value::ImmU64(_) => Type::U64,
            Value::ImmCond(_) => Type::Cond,
        }
    }

    pub fn is_immediate(&self) -> bool {
        !matches!(self, Value::Inst(_) | Value::Void)
    }

    pub fn is_inst(&self) -> bool {
        matches!(self, Value::Inst(_))
    }

    pub fn inst_ref(&self) -> InstRef {
        match self {
            Value::Inst(r) => *r,
            _ => panic!("inst_ref on non-Inst value: {:?}", self),
        }
    }

    /// Any integer immediate, zero-extended to u64.
    pub fn get_imm_as_u64(&self) -> u64 {
        match self {
            Value::ImmU1(v) => *v as u64,
            Value::ImmU8(v) => *v as u64,
            Value::ImmU16(v) => *v as u64,
            Value::ImmU32(v) => *v as u64,
            Value::ImmU64(v) => *v,
            _ => panic!("get_imm_as_u64 on {:?}", self),
        }
    }

    /// Any integer immediate, sign-extended to i64.
    pub fn get_imm_as_s64(&self) -> i64 {
        match self {
            Value::ImmU1(v) => *v as i64,
            Value::ImmU8(v) => *v as i8 as i64,
            Value::ImmU16(v) => *v as i16 as i64,
            Value::ImmU32(v) => *v as i32 as i64,
            Value::ImmU64(v) => *v as i64,
            _ => panic!("get_imm_as_s64 on {:?}", self),
        }
    }

    pub fn get_u1(&self) -> bool {
        match self {
            Value::ImmU1(v) => *v,
            _ => panic!("get_u1 on {:?}", self),
        }
    }

    pub fn get_u8(&self) -> u8 {
        match self {
            Value::ImmU8(v) => *v,
            _ => panic!("get_u8 on {:?}", self),
        }
    }

    pub fn get_u32(&self) -> u32 {
        match self {
            Value::ImmU32(v) => *v,
            _ => panic!("get_u32 on {:?}", self),
        }
    }

    pub fn get_u64(&self) -> u64 {
        match self {
            Value::ImmU64(v) => *v,
            _ => panic!("get_u64 on {:?}", self),
        }
    }

    pub fn get_cond(&self) -> Cond {
        match self {
            Value::ImmCond(c) => *c,
            _ => panic!("get_cond on {:?}", self),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Inst(r) => write!(f, "{}", r),
            Value::ImmU1(v) => write!(f, "#{}", *v as u8),
            Value::ImmU8(v) => write!(f, "#{:#x}", v),
            Value::ImmU16(v) => write!(f, "#{:#x}", v),
            Value::ImmU32(v) => write!(f, "#{:#x}", v),
            Value::ImmU64(v) => write!(f, "#{:#x}", v),
            Value::ImmCond(c) => write!(f, "{}", c),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::ImmU1(v)
    }
}
impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::ImmU8(v)
    }
}
impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::ImmU16(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::ImmU32(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::ImmU64(v)
    }
}
impl From<Cond> for Value {
    fn from(c: Cond) -> Self {
        Value::ImmCond(c)
    }
}
impl From<InstRef> for Value {
    fn from(r: InstRef) -> Self {
        Value::Inst(r)
    }
}
