pub mod assembler;
pub mod emit;
pub mod emit_context;
pub mod emit_data_processing;
pub mod emit_state;
pub mod hostloc;
pub mod jit_state;
pub mod nzcv;
pub mod reg_alloc;
pub mod stack_layout;
