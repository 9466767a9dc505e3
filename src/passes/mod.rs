//! The method-level compilation passes.
//!
//! Each pass takes ownership of a method's [`crate::graph::Graph`] and hands back the
//! transformed graph. The passes here run after the CIL has been lowered and the evaluation
//! stack resolved (see [`crate::ir`]) and before the target output passes; the order the
//! default pipeline uses is the order of the re-exports below.
//!
//! | Pass                     | Requires                    | Produces                          |
//! |--------------------------|-----------------------------|-----------------------------------|
//! | [`Dominance`]            | basic blocks                | dominator tree and frontiers      |
//! | [`SsaConvert`]           | dominance                   | φ nodes, single assignment vregs  |
//! | [`GenKill`]              | machine nodes               | per-node gen and kill sets        |
//! | [`Liveness`]             | gen and kill                | per-node live-in and live-out     |
//! | [`RegisterAllocate`]     | SSA form                    | registers and spill slots         |
//! | [`MachineLiveness`]      | allocated registers         | register liveness at call sites   |
//! | [`PreserveAcrossCalls`]  | machine liveness            | caller-saved saves and restores   |
//! | [`RemoveRedundantMoves`] | allocated registers         |                                   |
//! | [`CalleePreserves`]      | allocated registers         | callee-saved saves and restores   |
//! | [`AllocateLocalVars`]    | all save slots reserved     | frame offsets, prologue           |
//! | [`MangleCallSites`]      | resolved call tokens        | linkage names                     |

mod callee;
mod calls;
mod dominance;
mod frame;
mod liveness;
mod mangling;
mod moves;
mod regalloc;
mod ssa;

pub use callee::CalleePreserves;
pub use calls::PreserveAcrossCalls;
pub use dominance::Dominance;
pub use frame::AllocateLocalVars;
pub use liveness::{GenKill, Liveness, MachineLiveness};
pub use mangling::{mangle, MangleCallSites};
pub use moves::RemoveRedundantMoves;
pub use regalloc::RegisterAllocate;
pub use ssa::SsaConvert;

pub(crate) use liveness::{compute_gen_kill, compute_liveness};
