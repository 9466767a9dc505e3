use log::trace;

use crate::{
    compiler::Pass,
    graph::{DominanceGraph, Graph},
    target::Target,
    Result,
};

const NAME: &str = "dominance";

/// Computes and attaches the [`DominanceGraph`] for the current graph generation.
///
/// With verification enabled the pass first checks that every block is reachable from some
/// entry block, failing with [`crate::Error::GraphInvariant`] otherwise.
pub struct Dominance {
    verify: bool,
}

impl Dominance {
    /// Creates the pass; `verify` enables the reachability check.
    #[must_use]
    pub fn new(verify: bool) -> Self {
        Dominance { verify }
    }
}

impl Pass for Dominance {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Computes dominators, the dominator tree and dominance frontiers"
    }

    fn run(&self, mut graph: Graph, _target: &dyn Target) -> Result<Graph> {
        if self.verify {
            DominanceGraph::check_reachable(&graph)?;
        }
        let dominance = DominanceGraph::compute(&graph)?;
        trace!(
            "'{}': dominance over {} blocks, {} roots",
            graph.method().name,
            dominance.len(),
            dominance.roots().len()
        );
        graph.set_dominance(dominance)?;
        Ok(graph)
    }
}
