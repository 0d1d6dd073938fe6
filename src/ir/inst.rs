use std::fmt;

use crate::ir::opcode::Opcode;
use crate::ir::types::Type;
use crate::ir::value::Value;

/// Maximum number of operands any opcode takes.
pub const MAX_ARGS: usize = 4;

/// One IR micro-instruction in SSA form. The instruction's index in its
/// block is the identity of the value it defines.
#[derive(Debug, Clone)]
pub struct Inst {
    pub opcode: Opcode,
    /// Operands, padded with `Value::Void` past `num_args()`.
    pub args: [Value; MAX_ARGS],
    /// Number of data uses of this instruction's result, precomputed while
    /// the block is built. Pseudo-operation references are not data uses.
    pub use_count: u32,
}

impl Inst {
    pub fn new(opcode: Opcode, args: &[Value]) -> Self {
        assert!(
            args.len() == opcode.num_args(),
            "{:?} takes {} args, got {}",
            opcode,
            opcode.num_args(),
            args.len()
        );
        let mut inst_args = [Value::Void; MAX_ARGS];
        for (i, arg) in args.iter().enumerate() {
            inst_args[i] = *arg;
        }
        Self {
            opcode,
            args: inst_args,
            use_count: 0,
        }
    }

    pub fn return_type(&self) -> Type {
        self.opcode.return_type()
    }

    pub fn num_args(&self) -> usize {
        self.opcode.num_args()
    }

    pub fn arg(&self, idx: usize) -> Value {
        self.args[idx]
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, arg) in self.args[..self.num_args()].iter().enumerate() {
            if i == 0 {
                write!(f, " ")?;
            } else {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}
