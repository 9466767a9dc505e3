//! Control-flow graph model shared by every pipeline stage.
//!
//! A [`Graph`] owns the nodes of one method body in an arena, together with the *linear
//! stream* (the order in which nodes were created, which for decoded bytecode is offset
//! order). Edges live on the nodes themselves, see [`Node`].
//!
//! # Derived data
//!
//! Two pieces of data are derived from the edges and cached on the graph:
//!
//! - the [`BlockPartition`], recomputed by [`Graph::refresh_basic_blocks`]
//! - the [`DominanceGraph`], computed by [`DominanceGraph::compute`] and attached with
//!   [`Graph::set_dominance`]
//!
//! Every edge mutation bumps the graph's generation. Both caches remember the generation they
//! were computed at, and reading them after a later mutation is a
//! [`crate::Error::GraphInvariant`] rather than a silent use of stale data.
//!
//! # Basic blocks
//!
//! Blocks are computed greedily over the linear stream: each node not yet assigned starts a
//! new block, which is extended while the current node has exactly one successor and that
//! successor has exactly one predecessor. Block adjacency comes from the predecessors of each
//! block's first node and the successors of its last node, in edge order.
//!
//! ```rust
//! use cilaot::graph::{Graph, NodeContents};
//!
//! let mut graph = Graph::detached();
//! let a = graph.add_node(NodeContents::Empty);
//! let b = graph.add_node(NodeContents::Empty);
//! graph.add_edge(a, b);
//! graph.refresh_basic_blocks();
//!
//! assert_eq!(graph.partition()?.len(), 1);
//! assert_eq!(graph.starts(), vec![a]);
//! # Ok::<(), cilaot::Error>(())
//! ```

mod dominance;
mod node;

pub use dominance::DominanceGraph;
pub use node::{Node, NodeContents, NodeId};

use std::{fmt::Write, sync::Arc};

use crate::{compiler::MethodInfo, emit::MethodArtifacts, Result};

/// The basic-block partition of a graph at one generation.
#[derive(Debug, Clone, Default)]
pub struct BlockPartition {
    generation: u64,
    blocks: Vec<Vec<NodeId>>,
    bbs_before: Vec<Vec<usize>>,
    bbs_after: Vec<Vec<usize>>,
    entries: Vec<usize>,
}

impl BlockPartition {
    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the graph had no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Nodes of block `b`, in execution order.
    #[must_use]
    pub fn nodes(&self, b: usize) -> &[NodeId] {
        &self.blocks[b]
    }

    /// All blocks, indexed by block id.
    #[must_use]
    pub fn blocks(&self) -> &[Vec<NodeId>] {
        &self.blocks
    }

    /// First node of block `b`.
    #[must_use]
    pub fn bb_start(&self, b: usize) -> NodeId {
        self.blocks[b][0]
    }

    /// Last node of block `b`.
    #[must_use]
    pub fn bb_end(&self, b: usize) -> NodeId {
        self.blocks[b][self.blocks[b].len() - 1]
    }

    /// Predecessor blocks of `b`, in the edge order of its first node.
    #[must_use]
    pub fn bbs_before(&self, b: usize) -> &[usize] {
        &self.bbs_before[b]
    }

    /// Successor blocks of `b`, in the edge order of its last node.
    #[must_use]
    pub fn bbs_after(&self, b: usize) -> &[usize] {
        &self.bbs_after[b]
    }

    /// Blocks whose first node has no predecessor.
    #[must_use]
    pub fn entries(&self) -> &[usize] {
        &self.entries
    }
}

/// Stack frame facts accumulated by the allocation passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Spill slots handed out by register allocation.
    pub spill_slots: u32,
    /// Register save slots used around calls and for callee-saved registers.
    pub save_slots: u32,
    /// Final frame size in bytes, set by local variable allocation.
    pub frame_size: u32,
}

/// The control-flow graph of a single method.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    linear: Vec<NodeId>,
    method: Arc<MethodInfo>,
    generation: u64,
    partition: Option<BlockPartition>,
    dominance: Option<DominanceGraph>,
    /// Next unused virtual register number.
    pub next_vreg: u32,
    /// Frame layout facts.
    pub frame: FrameInfo,
    /// Encoded output, filled in by the target's output passes.
    pub artifacts: Option<MethodArtifacts>,
}

impl Graph {
    /// Creates an empty graph for `method`.
    #[must_use]
    pub fn new(method: Arc<MethodInfo>) -> Self {
        Graph {
            nodes: Vec::new(),
            linear: Vec::new(),
            method,
            generation: 0,
            partition: None,
            dominance: None,
            next_vreg: 0,
            frame: FrameInfo::default(),
            artifacts: None,
        }
    }

    /// Creates an empty graph not associated with any particular method.
    #[must_use]
    pub fn detached() -> Self {
        Graph::new(Arc::new(MethodInfo::default()))
    }

    /// Creates an empty graph for the same method, carrying over the virtual register counter
    /// and frame facts. Used by passes that replace the graph wholesale.
    #[must_use]
    pub fn successor(&self) -> Self {
        let mut graph = Graph::new(self.method.clone());
        graph.next_vreg = self.next_vreg;
        graph.frame = self.frame;
        graph
    }

    /// The method this graph belongs to.
    #[must_use]
    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    /// Number of nodes in the linear stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.linear.len()
    }

    /// Returns `true` if the graph has no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.linear.is_empty()
    }

    /// Mutation counter; bumped on every change to the edge structure.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Node ids in linear-stream order.
    #[must_use]
    pub fn linear_stream(&self) -> &[NodeId] {
        &self.linear
    }

    /// Looks up a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutable access to a node's payload. Edges are not reachable from here.
    pub fn contents_mut(&mut self, id: NodeId) -> &mut NodeContents {
        &mut self.nodes[id.index()].contents
    }

    /// Sets the exception region tag of a node.
    pub fn set_region(&mut self, id: NodeId, region: Option<u32>) {
        self.nodes[id.index()].region = region;
    }

    /// Iterates `(id, node)` pairs in linear-stream order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.linear.iter().map(move |id| (*id, &self.nodes[id.index()]))
    }

    /// Nodes without predecessors, in linear-stream order.
    #[must_use]
    pub fn starts(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.prev_count() == 0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Nodes without successors, in linear-stream order.
    #[must_use]
    pub fn ends(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.next_count() == 0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Appends an unconnected node to the arena and the linear stream.
    pub fn add_node(&mut self, contents: NodeContents) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(contents));
        self.linear.push(id);
        self.invalidate();
        id
    }

    /// Appends the edge `from -> to` at the end of both edge lists.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.index()].add_next(to);
        self.nodes[to.index()].add_prev(from);
        self.invalidate();
    }

    /// Installs `from -> to` as the default edge: position 0 of `from`'s successors and of
    /// `to`'s predecessors.
    pub fn add_default_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.index()].set_default_next(to);
        self.nodes[to.index()].set_default_prev(from);
        self.invalidate();
    }

    /// Removes one `from -> to` edge. Returns `false` if there was none.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        let removed = self.nodes[from.index()].remove_next(to);
        if removed {
            self.nodes[to.index()].remove_prev(from);
            self.invalidate();
        }
        removed
    }

    /// Replaces successor `old` of `node` by `new`, keeping its position. Only `node`'s list is
    /// touched; the caller fixes up the other endpoints.
    ///
    /// # Panics
    ///
    /// Panics if `old` is not a successor of `node`.
    pub fn replace_next(&mut self, node: NodeId, old: NodeId, new: NodeId) {
        self.nodes[node.index()].replace_next(old, new);
        self.invalidate();
    }

    /// Replaces predecessor `old` of `node` by `new`, keeping its position.
    ///
    /// # Panics
    ///
    /// Panics if `old` is not a predecessor of `node`.
    pub fn replace_prev(&mut self, node: NodeId, old: NodeId, new: NodeId) {
        self.nodes[node.index()].replace_prev(old, new);
        self.invalidate();
    }

    /// Retargets the edge `from -> old` to `from -> new`, updating all three nodes.
    ///
    /// # Panics
    ///
    /// Panics if `old` is not a successor of `from`.
    pub fn redirect_edge(&mut self, from: NodeId, old: NodeId, new: NodeId) {
        self.nodes[from.index()].replace_next(old, new);
        self.nodes[old.index()].remove_prev(from);
        self.nodes[new.index()].add_prev(from);
        self.invalidate();
    }

    /// Splices a new node directly after `node`: the new node inherits all of `node`'s
    /// successors and becomes its only successor.
    pub fn insert_after(&mut self, node: NodeId, contents: NodeContents) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        let mut inserted = Node::new(contents);
        inserted.region = self.nodes[node.index()].region;

        let succs = self.nodes[node.index()].take_next();
        for succ in &succs {
            self.nodes[succ.index()].replace_prev(node, id);
        }
        for succ in succs {
            inserted.add_next(succ);
        }
        inserted.add_prev(node);
        self.nodes.push(inserted);
        self.nodes[node.index()].add_next(id);

        let pos = self.position(node).map_or(self.linear.len(), |p| p + 1);
        self.linear.insert(pos, id);
        self.invalidate();
        id
    }

    /// Splices `contents` in front of the contents of `node`.
    ///
    /// `node` keeps its id and its predecessors and now holds `contents`; the original payload
    /// moves to the returned node, which follows it. Branches that target `node` therefore
    /// reach the inserted instruction first.
    pub fn insert_before(&mut self, node: NodeId, contents: NodeContents) -> NodeId {
        let moved = std::mem::replace(&mut self.nodes[node.index()].contents, contents);
        self.insert_after(node, moved)
    }

    /// Removes a node with at most one predecessor and at most one successor, connecting the
    /// two directly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] if the node is a join or branch point.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        if self.nodes[id.index()].is_multi() {
            return Err(graph_error!("cannot remove {} with multiple edges", id));
        }

        let prev = self.nodes[id.index()].take_prev();
        let next = self.nodes[id.index()].take_next();
        match (prev.first(), next.first()) {
            (Some(&p), Some(&n)) => {
                self.nodes[p.index()].replace_next(id, n);
                self.nodes[n.index()].replace_prev(id, p);
            }
            (Some(&p), None) => {
                self.nodes[p.index()].remove_next(id);
            }
            (None, Some(&n)) => {
                self.nodes[n.index()].remove_prev(id);
            }
            (None, None) => {}
        }

        self.nodes[id.index()].contents = NodeContents::Empty;
        self.linear.retain(|n| *n != id);
        self.invalidate();
        Ok(())
    }

    /// Recomputes the basic-block partition from the current edges.
    pub fn refresh_basic_blocks(&mut self) {
        for id in &self.linear {
            self.nodes[id.index()].set_block(None);
        }

        let mut blocks: Vec<Vec<NodeId>> = Vec::new();
        for i in 0..self.linear.len() {
            let start = self.linear[i];
            if self.nodes[start.index()].raw_block().is_some() {
                continue;
            }

            let b = blocks.len();
            let mut members = vec![start];
            self.nodes[start.index()].set_block(Some(b));

            let mut current = start;
            loop {
                let node = &self.nodes[current.index()];
                let Some(succ) = node.next1().filter(|_| node.next_count() == 1) else {
                    break;
                };
                let succ_node = &self.nodes[succ.index()];
                if succ_node.prev_count() != 1 || succ_node.raw_block().is_some() {
                    break;
                }
                self.nodes[succ.index()].set_block(Some(b));
                members.push(succ);
                current = succ;
            }
            blocks.push(members);
        }

        let block_of = |id: &NodeId| self.nodes[id.index()].raw_block().unwrap_or(usize::MAX);
        let mut bbs_before = Vec::with_capacity(blocks.len());
        let mut bbs_after = Vec::with_capacity(blocks.len());
        let mut entries = Vec::new();
        for (b, members) in blocks.iter().enumerate() {
            let first = &self.nodes[members[0].index()];
            let last = &self.nodes[members[members.len() - 1].index()];
            if first.prev_count() == 0 {
                entries.push(b);
            }
            bbs_before.push(first.prev().iter().map(block_of).collect());
            bbs_after.push(last.next().iter().map(block_of).collect());
        }

        self.partition = Some(BlockPartition {
            generation: self.generation,
            blocks,
            bbs_before,
            bbs_after,
            entries,
        });
    }

    /// The current basic-block partition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] if blocks were never computed or the edges
    /// changed since the last [`Graph::refresh_basic_blocks`].
    pub fn partition(&self) -> Result<&BlockPartition> {
        match &self.partition {
            Some(p) if p.generation == self.generation => Ok(p),
            Some(p) => Err(graph_error!(
                "stale block partition read (computed at generation {}, graph is at {})",
                p.generation,
                self.generation
            )),
            None => Err(graph_error!("basic blocks have not been computed")),
        }
    }

    /// The block containing `id` in the current partition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] if the partition is stale or `id` is not in
    /// the linear stream.
    pub fn block_of(&self, id: NodeId) -> Result<usize> {
        self.partition()?;
        self.nodes[id.index()]
            .raw_block()
            .ok_or_else(|| graph_error!("{} is not part of any block", id))
    }

    /// Attaches a dominance analysis computed for the current generation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] if `dominance` belongs to another generation.
    pub fn set_dominance(&mut self, dominance: DominanceGraph) -> Result<()> {
        if dominance.generation() != self.generation {
            return Err(graph_error!(
                "dominance computed at generation {} cannot attach to generation {}",
                dominance.generation(),
                self.generation
            ));
        }
        self.dominance = Some(dominance);
        Ok(())
    }

    /// The attached dominance analysis.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] if none is attached or it is stale.
    pub fn dominance(&self) -> Result<&DominanceGraph> {
        match &self.dominance {
            Some(d) if d.generation() == self.generation => Ok(d),
            Some(_) => Err(graph_error!("stale dominance data read")),
            None => Err(graph_error!("dominance has not been computed")),
        }
    }

    /// Drops the attached dominance analysis.
    pub fn clear_dominance(&mut self) {
        self.dominance = None;
    }

    /// Renders the linear stream, one node per line.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (id, node) in self.iter() {
            let block = node
                .raw_block()
                .map_or_else(|| "?".to_string(), |b| b.to_string());
            let _ = write!(out, "{id:>5} bb{block:<3} {}", node.contents);
            if !node.next().is_empty() {
                let succs: Vec<String> = node.next().iter().map(ToString::to_string).collect();
                let _ = write!(out, "  -> {}", succs.join(", "));
            }
            out.push('\n');
        }
        out
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.linear.iter().position(|n| *n == id)
    }

    fn invalidate(&mut self) {
        self.generation += 1;
    }
}
