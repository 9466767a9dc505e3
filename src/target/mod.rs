//! Target descriptors.
//!
//! A [`Target`] supplies everything architecture specific the pipeline needs: the register
//! file and calling convention, instruction selection for each IR operation, the handful of
//! instruction shapes the generic passes insert themselves (jumps, moves, register saves and
//! restores, stack setup), and the output passes that encode the final graph.
//!
//! The pipeline never inspects target opcodes. Machine instructions carry typed
//! [`Param`](crate::ir::Param) operands with read/write tags, which is all liveness, register
//! allocation and frame layout need; the only opcode-level question the generic passes ask is
//! [`Target::is_move`].
//!
//! [`Ref64`] is a small reference target that makes the pipeline runnable end to end.

mod lower;
mod machine;
mod ref64;

pub use lower::TargetLower;
pub use machine::{MachineOp, McInst, McNode, Reg};
pub use ref64::{Ref64, Ref64Encode};

use crate::{
    compiler::{MethodInfo, Pass},
    emit::RelocKind,
    graph::NodeId,
    ir::{CompType, IrInst, Location, Param},
    Result,
};

/// Where an incoming argument is found on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    /// In a register.
    Reg(Reg),
    /// In the caller's frame at this frame-pointer relative offset.
    Stack(i32),
}

/// Architecture-specific facts and code shapes.
pub trait Target: Send + Sync {
    /// Short target name.
    fn name(&self) -> &'static str;

    /// Pointer and word size in bytes.
    fn pointer_size(&self) -> u32;

    /// The register file; `registers()[r.id] == r` for every register.
    fn registers(&self) -> &[Reg];

    /// Registers the allocator may assign, in preference order.
    fn allocatable(&self) -> &[Reg];

    /// Registers a call may clobber.
    fn caller_saved(&self) -> &[Reg];

    /// Registers a method must preserve for its caller.
    fn callee_saved(&self) -> &[Reg];

    /// Location of incoming argument `index` (counting `this` as 0).
    fn incoming_arg(&self, index: usize) -> ArgLocation;

    /// Selects instructions for one IR instruction.
    ///
    /// Branch targets are emitted as [`Location::Block`] naming the IR target node;
    /// [`TargetLower`] rewrites them to machine nodes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Pass`] if the instruction cannot be selected.
    fn lower(&self, inst: &IrInst, method: &MethodInfo) -> Result<Vec<McInst>>;

    /// An unconditional jump to `target`.
    fn jump(&self, target: NodeId) -> McInst;

    /// A copy from `src` to `dst`, with `params[0]` the write and `params[1]` the read.
    fn move_inst(&self, dst: Location, src: Location, ct: CompType) -> McInst;

    /// Returns `true` if `inst` is a plain copy built by [`Target::move_inst`].
    fn is_move(&self, inst: &McInst) -> bool;

    /// Stores `reg` to register save slot `slot`.
    fn save_register(&self, reg: Reg, slot: u32) -> McInst {
        self.move_inst(Location::SaveSlot(slot), Location::MReg(reg), CompType::IntPtr)
    }

    /// Reloads `reg` from register save slot `slot`.
    fn restore_register(&self, reg: Reg, slot: u32) -> McInst {
        self.move_inst(Location::MReg(reg), Location::SaveSlot(slot), CompType::IntPtr)
    }

    /// The prologue establishing a frame of `frame_size` bytes.
    fn setup_stack(&self, frame_size: u32) -> Vec<McInst>;

    /// Passes appended after the core pipeline, typically instruction encoding.
    fn output_passes(&self) -> Vec<Box<dyn Pass>>;

    /// Maps an abstract relocation kind to the target's relocation type number.
    fn map_relocation(&self, kind: RelocKind) -> u32;

    /// Source and destination of a move, if `inst` is one.
    fn move_operands<'i>(&self, inst: &'i McInst) -> Option<(&'i Param, &'i Param)> {
        match inst.params.as_slice() {
            [dst, src] if self.is_move(inst) => Some((dst, src)),
            _ => None,
        }
    }
}
