//! The pass interface of the compilation pipeline.

use crate::{graph::Graph, target::Target, Result};

/// One step of the method compilation pipeline.
///
/// A pass takes ownership of the graph and hands back either the same graph mutated in place
/// or an entirely new one. It owns no per-method state: anything it learns about a method
/// lives in the graph or is dropped when `run` returns. Passes may carry immutable shared
/// configuration (for example the call registry), and must be `Send + Sync` so a single
/// pipeline can serve every worker thread.
///
/// # Node identity
///
/// Callers must not assume node ids survive a pass. A pass that changes the edge structure
/// reports it through [`Pass::changes_cfg`]; the pipeline then discards any attached
/// dominance data.
pub trait Pass: Send + Sync {
    /// Unique name for logging, dumps and error reports.
    fn name(&self) -> &'static str;

    /// Transforms `graph`.
    ///
    /// # Arguments
    ///
    /// * `graph` - The graph produced by the previous pass.
    /// * `target` - The target descriptor the method is compiled for.
    ///
    /// # Errors
    ///
    /// Returns an error if the transformation cannot be completed. The pipeline stops at the
    /// first error and the partially transformed graph is dropped.
    fn run(&self, graph: Graph, target: &dyn Target) -> Result<Graph>;

    /// Does this pass add, remove or redirect edges?
    fn changes_cfg(&self) -> bool {
        false
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
