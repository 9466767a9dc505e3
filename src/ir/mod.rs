//! Target-independent intermediate representation.
//!
//! IR instructions are produced from decoded bytecode by [`LowerToMachineIr`], one node per
//! instruction, with operands that still address the evaluation stack. [`StackTrace`]
//! replaces those with virtual registers, after which the graph is ready for instruction
//! selection.
//!
//! The operand model ([`Param`], [`Location`], [`CompType`]) is shared with machine-level
//! instructions: register allocation and frame layout rewrite the `loc` of a parameter but
//! never its type or read/write role.

mod inst;
mod lower;
mod stacktrace;
mod types;

pub use inst::{CallSite, IrInst, IrOp};
pub use lower::LowerToMachineIr;
pub use stacktrace::StackTrace;
pub use types::{CompType, CondCode, Location, Param, UseDef};
