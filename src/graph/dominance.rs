//! Dominators, immediate dominators, dominator tree and dominance frontiers.
//!
//! The analysis works on the basic blocks of a [`Graph`] and uses the classic iterative
//! dataflow formulation (Appel, *Modern Compiler Implementation*, §18.1):
//!
//! ```text
//! dom[e] = {e}                               for every entry block e
//! dom[b] = {b} ∪ ⋂ { dom[p] : p ∈ pred(b) }  for every other block, starting from AllBlocks
//! ```
//!
//! iterated until no set changes. The proper dominators of a reachable block form a chain, so
//! the immediate dominator of `b` is the one with the largest dominator set. Entry blocks and
//! blocks no entry reaches have none and become roots of the dominator tree.
//!
//! Dominance frontiers follow Appel §19.1:
//!
//! ```text
//! DF(n) = { y ∈ succ(n) : idom(y) ≠ n }
//!       ∪ { w ∈ DF(c) : c child of n, n does not strictly dominate w }
//! ```
//!
//! computed bottom-up over the dominator tree with an explicit stack, so arbitrarily deep trees
//! do not exhaust the call stack.
//!
//! Every block should be reachable from some entry block. The analysis does not reject
//! unreachable ones: their dominator sets never shrink below `AllBlocks` and they get no
//! immediate dominator. Use [`DominanceGraph::check_reachable`] first when the input is not
//! trusted.

use crate::{
    graph::{BlockPartition, Graph},
    utils::BitSet,
    Result,
};

/// Dominance information for one generation of a [`Graph`].
///
/// # Examples
///
/// ```rust
/// use cilaot::graph::{DominanceGraph, Graph, NodeContents};
///
/// // A -> {B, C}, B -> D, C -> D
/// let mut g = Graph::detached();
/// let [a, b, c, d] = [(); 4].map(|_| g.add_node(NodeContents::Empty));
/// g.add_edge(a, b);
/// g.add_edge(a, c);
/// g.add_edge(b, d);
/// g.add_edge(c, d);
/// g.refresh_basic_blocks();
///
/// let dom = DominanceGraph::compute(&g)?;
/// assert_eq!(dom.idom(3), Some(0));
/// assert_eq!(dom.frontier(1).iter().collect::<Vec<_>>(), vec![3]);
/// # Ok::<(), cilaot::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DominanceGraph {
    generation: u64,
    dom: Vec<BitSet>,
    idom: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    frontier: Vec<BitSet>,
}

impl DominanceGraph {
    /// Computes dominance for the current block partition of `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] if the block partition is stale.
    pub fn compute(graph: &Graph) -> Result<Self> {
        let part = graph.partition()?;
        let count = part.len();
        let entries = BitSet::from_indices(count, part.entries().iter().copied());

        let mut dom: Vec<BitSet> = (0..count)
            .map(|b| {
                if entries.contains(b) {
                    BitSet::from_indices(count, [b])
                } else {
                    BitSet::full(count)
                }
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for b in 0..count {
                if entries.contains(b) {
                    continue;
                }

                let mut next = BitSet::full(count);
                for &p in part.bbs_before(b) {
                    next.intersect_with(&dom[p]);
                }
                next.insert(b);

                if next != dom[b] {
                    dom[b] = next;
                    changed = true;
                }
            }
        }

        let reachable = reachable_blocks(part);
        let idom: Vec<Option<usize>> = (0..count)
            .map(|b| {
                if reachable.contains(b) {
                    immediate_dominator(&dom, b)
                } else {
                    None
                }
            })
            .collect();

        let mut children = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for (b, parent) in idom.iter().enumerate() {
            match parent {
                Some(p) => children[*p].push(b),
                None => roots.push(b),
            }
        }

        let frontier = compute_frontiers(graph, &dom, &idom, &children, &roots)?;

        log::trace!(
            "dominance: {} blocks, {} roots, generation {}",
            count,
            roots.len(),
            graph.generation()
        );

        Ok(DominanceGraph {
            generation: graph.generation(),
            dom,
            idom,
            children,
            roots,
            frontier,
        })
    }

    /// Verifies that every block is reachable from an entry block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphInvariant`] naming the first unreachable block, or if the
    /// partition is stale.
    pub fn check_reachable(graph: &Graph) -> Result<()> {
        let part = graph.partition()?;
        let seen = reachable_blocks(part);
        match (0..part.len()).find(|b| !seen.contains(*b)) {
            Some(b) => Err(graph_error!(
                "block {} (starting at {}) is unreachable from every start node",
                b,
                part.bb_start(b)
            )),
            None => Ok(()),
        }
    }

    /// The graph generation this analysis describes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of blocks covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dom.len()
    }

    /// Returns `true` if the graph had no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dom.is_empty()
    }

    /// The set of blocks dominating `b`, including `b` itself.
    #[must_use]
    pub fn dominators(&self, b: usize) -> &BitSet {
        &self.dom[b]
    }

    /// Returns `true` if `a` dominates `b`.
    #[must_use]
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        self.dom[b].contains(a)
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: usize, b: usize) -> bool {
        a != b && self.dominates(a, b)
    }

    /// The immediate dominator of `b`; `None` for entry blocks.
    #[must_use]
    pub fn idom(&self, b: usize) -> Option<usize> {
        self.idom[b]
    }

    /// Children of `b` in the dominator tree.
    #[must_use]
    pub fn children(&self, b: usize) -> &[usize] {
        &self.children[b]
    }

    /// Roots of the dominator forest.
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// The dominance frontier of `b`.
    #[must_use]
    pub fn frontier(&self, b: usize) -> &BitSet {
        &self.frontier[b]
    }

    /// Iterated dominance frontier of a set of blocks.
    #[must_use]
    pub fn iterated_frontier(&self, blocks: &BitSet) -> BitSet {
        let mut result = BitSet::new(self.len());
        let mut worklist: Vec<usize> = blocks.iter().collect();
        while let Some(b) = worklist.pop() {
            for y in self.frontier[b].iter() {
                if result.insert(y) {
                    worklist.push(y);
                }
            }
        }
        result
    }
}

fn reachable_blocks(part: &BlockPartition) -> BitSet {
    let mut seen = BitSet::new(part.len());
    let mut stack: Vec<usize> = part.entries().to_vec();
    while let Some(b) = stack.pop() {
        if seen.insert(b) {
            stack.extend(part.bbs_after(b).iter().copied());
        }
    }
    seen
}

fn immediate_dominator(dom: &[BitSet], b: usize) -> Option<usize> {
    dom[b]
        .iter()
        .filter(|d| *d != b)
        .max_by_key(|d| dom[*d].count())
}

fn compute_frontiers(
    graph: &Graph,
    dom: &[BitSet],
    idom: &[Option<usize>],
    children: &[Vec<usize>],
    roots: &[usize],
) -> Result<Vec<BitSet>> {
    let part = graph.partition()?;
    let count = part.len();
    let mut frontier = vec![BitSet::new(count); count];

    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|r| (*r, false)).collect();
    while let Some((n, expanded)) = stack.pop() {
        if !expanded {
            stack.push((n, true));
            stack.extend(children[n].iter().rev().map(|c| (*c, false)));
            continue;
        }

        let mut df = BitSet::new(count);
        for &y in part.bbs_after(n) {
            if idom[y] != Some(n) {
                df.insert(y);
            }
        }
        for &c in &children[n] {
            for w in frontier[c].iter() {
                if !dom[w].contains(n) || n == w {
                    df.insert(w);
                }
            }
        }
        frontier[n] = df;
    }

    Ok(frontier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeContents, NodeId};

    fn build(count: usize, edges: &[(usize, usize)]) -> Graph {
        let mut g = Graph::detached();
        let ids: Vec<NodeId> = (0..count).map(|_| g.add_node(NodeContents::Empty)).collect();
        for &(a, b) in edges {
            g.add_edge(ids[a], ids[b]);
        }
        g.refresh_basic_blocks();
        g
    }

    fn members(set: &BitSet) -> Vec<usize> {
        set.iter().collect()
    }

    #[test]
    fn diamond() {
        let g = build(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom = DominanceGraph::compute(&g).unwrap();

        assert_eq!(dom.roots(), &[0]);
        assert_eq!(members(dom.dominators(0)), vec![0]);
        assert_eq!(members(dom.dominators(3)), vec![0, 3]);
        assert_eq!(dom.idom(1), Some(0));
        assert_eq!(dom.idom(3), Some(0));
        assert_eq!(dom.children(0), &[1, 2, 3]);

        assert!(dom.frontier(0).is_empty());
        assert_eq!(members(dom.frontier(1)), vec![3]);
        assert_eq!(members(dom.frontier(2)), vec![3]);
        assert!(dom.frontier(3).is_empty());
    }

    #[test]
    fn every_block_dominates_itself_and_chains_end_at_roots() {
        let shapes: [&[(usize, usize)]; 3] = [
            &[(0, 1), (0, 2), (1, 3), (2, 3)],
            &[(0, 1), (1, 2), (2, 1), (1, 3), (3, 4), (3, 5), (4, 6), (5, 6)],
            &[(0, 2), (1, 2), (2, 3), (3, 2)],
        ];
        for edges in shapes {
            let count = edges.iter().map(|&(a, b)| a.max(b)).max().unwrap() + 1;
            let g = build(count, edges);
            let dom = DominanceGraph::compute(&g).unwrap();
            for b in 0..dom.len() {
                assert!(dom.dominates(b, b));
                let mut current = b;
                let mut steps = 0;
                while let Some(parent) = dom.idom(current) {
                    assert!(dom.strictly_dominates(parent, current));
                    current = parent;
                    steps += 1;
                    assert!(steps <= dom.len());
                }
                assert!(dom.roots().contains(&current));
                assert!(dom.dominates(current, b));
            }
        }
    }

    #[test]
    fn loop_header_is_in_its_own_frontier() {
        // 0 -> 1, 1 -> 2, 2 -> 1, 1 -> 3
        let g = build(4, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let part = g.partition().unwrap();
        assert_eq!(part.len(), 4);

        let dom = DominanceGraph::compute(&g).unwrap();
        assert_eq!(dom.idom(2), Some(1));
        assert_eq!(dom.idom(3), Some(1));
        assert_eq!(members(dom.frontier(2)), vec![1]);
        assert_eq!(members(dom.frontier(1)), vec![1]);
        assert!(dom.strictly_dominates(1, 2));
        assert!(!dom.strictly_dominates(1, 1));
    }

    #[test]
    fn multiple_entries_form_a_forest() {
        // 0 -> 2, 1 -> 2
        let g = build(3, &[(0, 2), (1, 2)]);
        let dom = DominanceGraph::compute(&g).unwrap();
        assert_eq!(dom.roots(), &[0, 1, 2]);
        assert_eq!(dom.idom(2), None);
        assert_eq!(members(dom.frontier(0)), vec![2]);
        assert_eq!(members(dom.frontier(1)), vec![2]);
    }

    #[test]
    fn iterated_frontier_follows_chains() {
        // nested diamonds: 0 -> {1, 4}; 1 -> {2, 3}; 2 -> 5; 3 -> 5; 5 -> 6; 4 -> 6
        let g = build(
            7,
            &[(0, 1), (0, 4), (1, 2), (1, 3), (2, 5), (3, 5), (5, 6), (4, 6)],
        );
        let dom = DominanceGraph::compute(&g).unwrap();
        let part = g.partition().unwrap();
        let b2 = g.block_of(part.bb_start(2)).unwrap();
        let idf = dom.iterated_frontier(&BitSet::from_indices(dom.len(), [b2]));
        assert_eq!(idf.count(), 2);
    }

    #[test]
    fn unreachable_cycle_is_detected() {
        // 0 -> 1; 2 <-> 3 has no entry
        let g = build(4, &[(0, 1), (2, 3), (3, 2)]);
        assert!(DominanceGraph::check_reachable(&g).is_err());

        let reachable = build(2, &[(0, 1)]);
        assert!(DominanceGraph::check_reachable(&reachable).is_ok());
    }

    #[test]
    fn nearest_dominator_of_a_long_chain() {
        // 0 -> 1 -> ... -> 299, and every node but the last two also jumps to 299
        let mut edges: Vec<(usize, usize)> = (0..299).map(|i| (i, i + 1)).collect();
        edges.extend((0..298).map(|i| (i, 299)));
        let g = build(300, &edges);
        let dom = DominanceGraph::compute(&g).unwrap();
        assert_eq!(dom.len(), 300);
        for b in 1..299 {
            assert_eq!(dom.idom(b), Some(b - 1));
        }
        assert_eq!(dom.idom(299), Some(0));
    }

    #[test]
    fn unreachable_blocks_have_no_immediate_dominator() {
        // 0 -> 1; 2 <-> 3 has no entry
        let g = build(4, &[(0, 1), (2, 3), (3, 2)]);
        let dom = DominanceGraph::compute(&g).unwrap();
        let b = |n: usize| g.block_of(g.linear_stream()[n]).unwrap();
        assert_eq!(dom.idom(b(1)), Some(b(0)));
        assert_eq!(dom.idom(b(2)), None);
        assert_eq!(dom.idom(b(3)), None);
        assert!(dom.roots().contains(&b(2)));
    }

    #[test]
    fn stale_after_mutation() {
        let mut g = build(2, &[(0, 1)]);
        let dom = DominanceGraph::compute(&g).unwrap();
        g.set_dominance(dom).unwrap();
        assert!(g.dominance().is_ok());

        g.add_node(NodeContents::Empty);
        assert!(g.dominance().is_err());
    }
}
