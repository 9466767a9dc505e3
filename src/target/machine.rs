//! Machine-level node payload.

use std::fmt;

use crate::{
    ir::{Location, Param},
    utils::BitSet,
};

/// A physical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg {
    /// Index into the target's register file.
    pub id: u16,
    /// Assembly name.
    pub name: &'static str,
}

impl Reg {
    /// Creates a register description.
    #[must_use]
    pub const fn new(id: u16, name: &'static str) -> Self {
        Reg { id, name }
    }

    /// The register file index as `usize`.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.id)
    }
}

/// Operation of a [`McInst`].
///
/// Everything except [`MachineOp::Target`] is a placeholder that a later pipeline pass
/// expands or removes; none of them survive into the output passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineOp {
    /// SSA merge; `params[0]` is the def, `params[1 + j]` the value from predecessor `j`.
    Phi,
    /// Start of a call sequence.
    PreCall,
    /// End of a call sequence.
    PostCall,
    /// Frame setup, expanded once the frame size is known.
    SetupStack,
    /// Saves of the callee-saved registers the method clobbers.
    SaveCalleePreserves,
    /// Restores matching [`MachineOp::SaveCalleePreserves`].
    RestoreCalleePreserves,
    /// A target instruction with a target-defined opcode.
    Target(u16),
}

impl MachineOp {
    /// Returns `true` for placeholder operations.
    #[must_use]
    pub fn is_pseudo(self) -> bool {
        !matches!(self, MachineOp::Target(_))
    }

    fn mnemonic(self) -> &'static str {
        match self {
            MachineOp::Phi => "phi",
            MachineOp::PreCall => "precall",
            MachineOp::PostCall => "postcall",
            MachineOp::SetupStack => "setup-stack",
            MachineOp::SaveCalleePreserves => "save-callee",
            MachineOp::RestoreCalleePreserves => "restore-callee",
            MachineOp::Target(_) => "?",
        }
    }
}

/// One machine-level instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct McInst {
    /// Operation.
    pub op: MachineOp,
    /// Name used in dumps and listings.
    pub mnemonic: &'static str,
    /// Operands, reads and writes tagged on each.
    pub params: Vec<Param>,
    /// Registers live after this instruction, recorded on call boundaries by machine
    /// liveness. Indexed by register id.
    pub mreg_live_out: Option<BitSet>,
}

impl McInst {
    /// A placeholder instruction.
    #[must_use]
    pub fn pseudo(op: MachineOp, params: Vec<Param>) -> Self {
        McInst {
            op,
            mnemonic: op.mnemonic(),
            params,
            mreg_live_out: None,
        }
    }

    /// A target instruction.
    #[must_use]
    pub fn target(code: u16, mnemonic: &'static str, params: Vec<Param>) -> Self {
        McInst {
            op: MachineOp::Target(code),
            mnemonic,
            params,
            mreg_live_out: None,
        }
    }

    /// A φ merging `operands` (one per predecessor) into `def`.
    #[must_use]
    pub fn phi(def: Param, operands: Vec<Param>) -> Self {
        let mut params = Vec::with_capacity(operands.len() + 1);
        params.push(def);
        params.extend(operands);
        Self::pseudo(MachineOp::Phi, params)
    }

    /// Operands read.
    pub fn uses(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.is_use())
    }

    /// Operands written.
    pub fn defs(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.is_def())
    }

    /// Returns `true` if some operand is written at `loc`.
    #[must_use]
    pub fn defines(&self, loc: &Location) -> bool {
        self.defs().any(|p| p.loc == *loc)
    }
}

impl fmt::Display for McInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            write!(f, " {}", params.join(", "))?;
        }
        Ok(())
    }
}

/// The payload of a node after target lowering: all instructions of one block.
///
/// The dataflow sets are indexed by virtual register before register allocation and by
/// register id afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McNode {
    /// φ instructions, all executed in parallel on block entry.
    pub phis: Vec<McInst>,
    /// Instructions in execution order.
    pub insts: Vec<McInst>,
    /// Values read before being written in this node.
    pub gen: BitSet,
    /// Values written in this node.
    pub kill: BitSet,
    /// Values live on entry.
    pub live_in: BitSet,
    /// Values live on exit.
    pub live_out: BitSet,
}

impl McNode {
    /// Creates a node holding `insts`.
    #[must_use]
    pub fn new(insts: Vec<McInst>) -> Self {
        McNode {
            insts,
            ..Self::default()
        }
    }

    /// φs followed by the other instructions.
    pub fn all_insts(&self) -> impl Iterator<Item = &McInst> {
        self.phis.iter().chain(&self.insts)
    }

    /// Mutable access to every instruction, φs first.
    pub fn all_insts_mut(&mut self) -> impl Iterator<Item = &mut McInst> {
        self.phis.iter_mut().chain(self.insts.iter_mut())
    }
}

impl fmt::Display for McNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let insts: Vec<String> = self.all_insts().map(ToString::to_string).collect();
        write!(f, "[{}]", insts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CompType;

    #[test]
    fn phi_layout_and_display() {
        let phi = McInst::phi(
            Param::write(Location::VReg(3), CompType::Int32),
            vec![
                Param::read(Location::VReg(1), CompType::Int32),
                Param::read(Location::Undef, CompType::Int32),
            ],
        );
        assert_eq!(phi.to_string(), "phi v3:i32, v1:i32, undef");
        assert_eq!(phi.defs().count(), 1);
        assert_eq!(phi.uses().count(), 2);
        assert!(phi.op.is_pseudo());
        assert!(phi.defines(&Location::VReg(3)));
    }

    #[test]
    fn node_display() {
        let mut node = McNode::new(vec![McInst::pseudo(MachineOp::PreCall, Vec::new())]);
        node.phis.push(McInst::phi(
            Param::write(Location::VReg(0), CompType::Int64),
            Vec::new(),
        ));
        assert_eq!(node.to_string(), "[phi v0:i64; precall]");
        assert_eq!(node.all_insts().count(), 2);
    }
}
