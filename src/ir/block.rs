use std::fmt;

use crate::ir::inst::Inst;
use crate::ir::opcode::Opcode;
use crate::ir::value::{InstRef, Value};

/// A straight-line IR basic block: an arena of instructions in program
/// order, indexed by `InstRef`.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instructions: Vec<Inst>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, bumping the use count of every instruction
    /// operand. A pseudo-operation's reference to its primary is an
    /// association rather than a data use and does not count.
    pub fn append(&mut self, opcode: Opcode, args: &[Value]) -> InstRef {
        debug_assert!(args
            .iter()
            .zip(opcode.arg_types())
            .all(|(a, ty)| a.get_type().is_compatible_with(*ty)));

        if !opcode.is_pseudo_operation() {
            for arg in args {
                if let Value::Inst(r) = arg {
                    self.instructions[r.index()].use_count += 1;
                }
            }
        }
        let idx = self.instructions.len();
        self.instructions.push(Inst::new(opcode, args));
        InstRef(idx as u32)
    }

    pub fn get(&self, r: InstRef) -> &Inst {
        &self.instructions[r.index()]
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Find the pseudo-operation of the given kind attached to `primary`,
    /// if any. At most one attachment per kind is permitted.
    pub fn associated_pseudo_op(&self, primary: InstRef, kind: Opcode) -> Option<InstRef> {
        debug_assert!(kind.is_pseudo_operation());
        let mut found = None;
        for (i, inst) in self.instructions.iter().enumerate() {
            if inst.opcode == kind && inst.args[0] == Value::Inst(primary) {
                assert!(
                    found.is_none(),
                    "more than one {:?} attached to {}",
                    kind,
                    primary
                );
                found = Some(InstRef(i as u32));
            }
        }
        found
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, inst) in self.instructions.iter().enumerate() {
            writeln!(f, "%{} = {}", i, inst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_counts_data_uses() {
        let mut block = Block::new();
        let a = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
        let sum = block.append(
            Opcode::Add32,
            &[Value::Inst(a), Value::ImmU32(1), Value::ImmU1(false)],
        );
        block.append(Opcode::SetRegister32, &[Value::ImmU8(1), Value::Inst(sum)]);

        assert_eq!(block.get(a).use_count, 1);
        assert_eq!(block.get(sum).use_count, 1);
    }

    #[test]
    fn pseudo_attachment_is_not_a_data_use() {
        let mut block = Block::new();
        let a = block.append(Opcode::GetRegister32, &[Value::ImmU8(0)]);
        let sum = block.append(
            Opcode::Add32,
            &[Value::Inst(a), Value::ImmU32(1), Value::ImmU1(false)],
        );
        let carry = block.append(Opcode::GetCarryFromOp, &[Value::Inst(sum)]);
        block.append(Opcode::SetRegister32, &[Value::ImmU8(1), Value::Inst(sum)]);

        assert_eq!(block.get(sum).use_count, 1);
        assert_eq!(block.associated_pseudo_op(sum, Opcode::GetCarryFromOp), Some(carry));
        assert_eq!(block.associated_pseudo_op(sum, Opcode::GetOverflowFromOp), None);
    }
}
