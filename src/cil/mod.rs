//! CIL bytecode: opcode table, decoded instructions and the decoder.
//!
//! # Key Components
//!
//! - [`OpcodeTable`] - Immutable opcode registry, built once per compiler instance
//! - [`CilInstr`] - A decoded instruction with prefixes and resolved branch targets
//! - [`BytecodeDecoder`] - Turns a [`crate::file::MethodBody`] into a [`crate::graph::Graph`]
//! - [`opcodes`] - Named opcode constants

mod decoder;
mod instruction;
pub mod opcodes;
mod table;

pub use decoder::{decode_method, BytecodeDecoder};
pub use instruction::{CilInstr, Operand, Prefixes};
pub use table::{
    FlowClass, InlineOperand, OpcodeInfo, OpcodeTable, OpcodeTableBuilder, StackEffect,
};
