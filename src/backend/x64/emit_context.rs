//! Per-block emission context: resolves pseudo-operations attached to a
//! primary instruction and tracks their consumption.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::ir::block::Block;
use crate::ir::opcode::Opcode;
use crate::ir::value::InstRef;

pub struct EmitContext<'a> {
    pub block: &'a Block,
    erased: RefCell<HashSet<InstRef>>,
}

impl<'a> EmitContext<'a> {
    pub fn new(block: &'a Block) -> Self {
        Self {
            block,
            erased: RefCell::new(HashSet::new()),
        }
    }

    /// The pseudo-operation of the given kind attached to `primary`, if
    /// one is present and still unconsumed.
    pub fn pseudo_op(&self, primary: InstRef, kind: Opcode) -> Option<InstRef> {
        self.block
            .associated_pseudo_op(primary, kind)
            .filter(|r| !self.is_erased(*r))
    }

    /// Mark a pseudo-operation consumed. Its emitter-side counterpart is
    /// the `define_value` call that binds the derived output; both must
    /// happen exactly once, in the primary's emitter.
    pub fn erase_instruction(&self, inst: InstRef) {
        assert!(
            self.block.get(inst).opcode.is_pseudo_operation(),
            "erasing non-pseudo instruction {}",
            inst
        );
        let inserted = self.erased.borrow_mut().insert(inst);
        assert!(inserted, "{} erased twice", inst);
    }

    pub fn is_erased(&self, inst: InstRef) -> bool {
        self.erased.borrow().contains(&inst)
    }
}
