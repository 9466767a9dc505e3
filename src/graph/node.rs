//! Graph nodes and their identifiers.
//!
//! Every node carries its predecessor and successor lists directly, even in the common case
//! of zero or one edge. There is no separate "linear" versus "multi-edge" node shape: whether
//! a node is a join or branch point is simply [`Node::is_multi`].
//!
//! Edge order is meaningful. Position 0 of a successor list is the *default* edge, which for a
//! conditional branch is always the fall-through path. The mutators here are crate-private;
//! outside code edits edges through [`crate::graph::Graph`] so that every change invalidates
//! derived block and dominance data.

use std::fmt;

use crate::{cil::CilInstr, ir::IrInst, target::McNode};

/// Identifier of a node within its owning [`crate::graph::Graph`].
///
/// Node ids are indices into the graph's node arena. They are only meaningful for the graph
/// that issued them; passes that build a new graph issue fresh ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Creates a node id from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("n{}", self.0))
    }
}

/// The instruction payload of a node, one variant per pipeline stage.
#[derive(Debug, Clone, Default)]
pub enum NodeContents {
    /// A synthetic merge point or placeholder.
    #[default]
    Empty,
    /// A decoded bytecode instruction.
    Cil(CilInstr),
    /// A target-independent IR instruction.
    Ir(IrInst),
    /// The machine instructions of one basic block.
    Mc(McNode),
}

impl NodeContents {
    /// The CIL instruction, if this is a bytecode node.
    #[must_use]
    pub fn as_cil(&self) -> Option<&CilInstr> {
        match self {
            NodeContents::Cil(instr) => Some(instr),
            _ => None,
        }
    }

    /// The IR instruction, if this is an IR node.
    #[must_use]
    pub fn as_ir(&self) -> Option<&IrInst> {
        match self {
            NodeContents::Ir(inst) => Some(inst),
            _ => None,
        }
    }

    /// Mutable access to the IR instruction.
    pub fn as_ir_mut(&mut self) -> Option<&mut IrInst> {
        match self {
            NodeContents::Ir(inst) => Some(inst),
            _ => None,
        }
    }

    /// The machine node, if this node has been lowered to the target.
    #[must_use]
    pub fn as_mc(&self) -> Option<&McNode> {
        match self {
            NodeContents::Mc(node) => Some(node),
            _ => None,
        }
    }

    /// Mutable access to the machine node.
    pub fn as_mc_mut(&mut self) -> Option<&mut McNode> {
        match self {
            NodeContents::Mc(node) => Some(node),
            _ => None,
        }
    }
}

impl fmt::Display for NodeContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeContents::Empty => write!(f, "<empty>"),
            NodeContents::Cil(instr) => write!(f, "{instr}"),
            NodeContents::Ir(inst) => write!(f, "{inst}"),
            NodeContents::Mc(node) => write!(f, "{node}"),
        }
    }
}

/// A control-flow graph node.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// The instruction payload.
    pub contents: NodeContents,
    /// Index of the exception-handling region this node lies in, if any.
    pub region: Option<u32>,
    prev: Vec<NodeId>,
    next: Vec<NodeId>,
    block: Option<usize>,
}

impl Node {
    /// Creates an unconnected node.
    #[must_use]
    pub fn new(contents: NodeContents) -> Self {
        Node {
            contents,
            ..Node::default()
        }
    }

    /// Predecessors in edge order.
    #[must_use]
    pub fn prev(&self) -> &[NodeId] {
        &self.prev
    }

    /// Successors in edge order; index 0 is the default edge.
    #[must_use]
    pub fn next(&self) -> &[NodeId] {
        &self.next
    }

    /// Number of predecessors.
    #[must_use]
    pub fn prev_count(&self) -> usize {
        self.prev.len()
    }

    /// Number of successors.
    #[must_use]
    pub fn next_count(&self) -> usize {
        self.next.len()
    }

    /// The default (position 0) successor.
    #[must_use]
    pub fn next1(&self) -> Option<NodeId> {
        self.next.first().copied()
    }

    /// The second successor, e.g. the taken target of a conditional branch.
    #[must_use]
    pub fn next2(&self) -> Option<NodeId> {
        self.next.get(1).copied()
    }

    /// The first predecessor.
    #[must_use]
    pub fn prev1(&self) -> Option<NodeId> {
        self.prev.first().copied()
    }

    /// The second predecessor.
    #[must_use]
    pub fn prev2(&self) -> Option<NodeId> {
        self.prev.get(1).copied()
    }

    /// Returns `true` for join or branch points (more than one edge on either side).
    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.prev.len() > 1 || self.next.len() > 1
    }

    /// Basic block index assigned by the last block computation.
    ///
    /// Prefer [`crate::graph::Graph::block_of`], which also checks that the partition is
    /// still current.
    #[must_use]
    pub fn raw_block(&self) -> Option<usize> {
        self.block
    }

    pub(crate) fn set_block(&mut self, block: Option<usize>) {
        self.block = block;
    }

    pub(crate) fn add_next(&mut self, id: NodeId) {
        self.next.push(id);
    }

    pub(crate) fn add_prev(&mut self, id: NodeId) {
        self.prev.push(id);
    }

    pub(crate) fn set_default_next(&mut self, id: NodeId) {
        self.next.insert(0, id);
    }

    pub(crate) fn set_default_prev(&mut self, id: NodeId) {
        self.prev.insert(0, id);
    }

    pub(crate) fn remove_next(&mut self, id: NodeId) -> bool {
        remove_first(&mut self.next, id)
    }

    pub(crate) fn remove_prev(&mut self, id: NodeId) -> bool {
        remove_first(&mut self.prev, id)
    }

    /// Replaces successor `old` by `new` in place, keeping its position.
    ///
    /// # Panics
    ///
    /// Panics if `old` is not a successor.
    pub(crate) fn replace_next(&mut self, old: NodeId, new: NodeId) {
        replace_in(&mut self.next, old, new, "successor");
    }

    /// Replaces predecessor `old` by `new` in place, keeping its position.
    ///
    /// # Panics
    ///
    /// Panics if `old` is not a predecessor.
    pub(crate) fn replace_prev(&mut self, old: NodeId, new: NodeId) {
        replace_in(&mut self.prev, old, new, "predecessor");
    }

    pub(crate) fn take_next(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.next)
    }

    pub(crate) fn take_prev(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.prev)
    }
}

fn remove_first(list: &mut Vec<NodeId>, id: NodeId) -> bool {
    match list.iter().position(|n| *n == id) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

fn replace_in(list: &mut [NodeId], old: NodeId, new: NodeId, what: &str) {
    let slot = list
        .iter_mut()
        .find(|n| **n == old)
        .unwrap_or_else(|| panic!("{old} is not a {what} of this node"));
    *slot = new;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_formatting() {
        let id = NodeId::new(7);
        assert_eq!(id.index(), 7);
        assert_eq!(format!("{id}"), "n7");
        assert_eq!(format!("{id:?}"), "NodeId(7)");
    }

    #[test]
    fn default_edge_goes_first() {
        let mut node = Node::new(NodeContents::Empty);
        node.add_next(NodeId::new(5));
        node.set_default_next(NodeId::new(2));
        assert_eq!(node.next1(), Some(NodeId::new(2)));
        assert_eq!(node.next2(), Some(NodeId::new(5)));
        assert!(node.is_multi());
    }

    #[test]
    fn replace_keeps_position() {
        let mut node = Node::new(NodeContents::Empty);
        node.add_prev(NodeId::new(1));
        node.add_prev(NodeId::new(2));
        node.replace_prev(NodeId::new(1), NodeId::new(9));
        assert_eq!(node.prev(), &[NodeId::new(9), NodeId::new(2)]);
        assert!(node.remove_prev(NodeId::new(2)));
        assert!(!node.remove_prev(NodeId::new(2)));
        assert_eq!(node.prev_count(), 1);
        assert!(!node.is_multi());
    }

    #[test]
    #[should_panic(expected = "is not a successor")]
    fn replace_missing_endpoint_panics() {
        let mut node = Node::new(NodeContents::Empty);
        node.add_next(NodeId::new(1));
        node.replace_next(NodeId::new(3), NodeId::new(4));
    }
}
