//! Bytecode primitives shared by the assembler, linker, loader and
//! disassembler: the opcode table/codec (C1) and the string interner (C2).
//!
//! Every other component — assembler, loader/validator, linker, disassembler —
//! consumes [`opcode::info`] rather than hand-rolling per-opcode switches, so a
//! new opcode (or a new operand kind) only has to be taught to this module.

pub mod opcode;
pub mod pool;

pub use opcode::{OpFlags, OpInfo, Opcode, OperandKind, OperandValue};
pub use pool::StringPool;
