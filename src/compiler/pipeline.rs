//! The ordered pass list run on every method.

use std::sync::Arc;

use log::{debug, trace};

use crate::{
    compiler::{CallRegistry, Pass},
    emit::StringTable,
    graph::Graph,
    ir::{LowerToMachineIr, StackTrace},
    passes::{
        AllocateLocalVars, CalleePreserves, Dominance, GenKill, Liveness, MachineLiveness,
        MangleCallSites, PreserveAcrossCalls, RegisterAllocate, RemoveRedundantMoves, SsaConvert,
    },
    target::{Target, TargetLower},
    Error,
};

/// A pipeline run that stopped at a failing pass.
#[derive(Debug)]
pub struct PipelineFailure {
    /// Name of the pass that failed.
    pub pass: &'static str,
    /// The error it raised.
    pub error: Error,
    /// Dump of the graph the failing pass received, if dumps were recorded.
    pub last_dump: Option<String>,
}

/// The result of a successful pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The final graph.
    pub graph: Graph,
    /// Dumps taken before every pass and of the final graph, in order, when enabled.
    pub dumps: Vec<String>,
}

/// A fixed, ordered list of passes.
///
/// The standard pipeline is assembled once per compiler instance:
///
/// 1. `lower-to-machine-ir` - bytecode to target-independent IR on the operand stack
/// 2. `stack-trace` - stack slots to typed virtual registers
/// 3. `target-lower` - instruction selection, one machine node per block
/// 4. `dominance` - dominators and frontiers
/// 5. `ssa-convert` - φ insertion and renaming
/// 6. `gen-kill`, `liveness` - virtual register liveness
/// 7. `register-allocate` - graph colouring
/// 8. `machine-liveness` - register liveness after allocation
/// 9. `preserve-across-calls` - caller-saved registers live across calls
/// 10. `remove-redundant-moves`
/// 11. `callee-preserves` - callee-saved registers
/// 12. `allocate-local-vars` - frame layout
/// 13. `mangle-call-sites` - call tokens to linkage names
///
/// followed by the target's output passes.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// Creates a pipeline running `passes` in order.
    #[must_use]
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        Pipeline { passes }
    }

    /// The standard pass list for `target`.
    #[must_use]
    pub fn standard(
        registry: Arc<CallRegistry>,
        strings: Arc<StringTable>,
        target: &dyn Target,
        verify_graphs: bool,
    ) -> Self {
        let mut passes: Vec<Box<dyn Pass>> = vec![
            Box::new(LowerToMachineIr::new(registry.clone())),
            Box::new(StackTrace),
            Box::new(TargetLower),
            Box::new(Dominance::new(verify_graphs)),
            Box::new(SsaConvert),
            Box::new(GenKill),
            Box::new(Liveness),
            Box::new(RegisterAllocate),
            Box::new(MachineLiveness),
            Box::new(PreserveAcrossCalls),
            Box::new(RemoveRedundantMoves),
            Box::new(CalleePreserves),
            Box::new(AllocateLocalVars),
            Box::new(MangleCallSites::new(registry, strings)),
        ];
        passes.extend(target.output_passes());
        Pipeline { passes }
    }

    /// Names of the passes, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if the pipeline has no passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass over `graph`.
    ///
    /// # Arguments
    ///
    /// * `graph` - The decoded method.
    /// * `target` - The target descriptor handed to every pass.
    /// * `record_dumps` - Record a dump before every pass and of the final graph.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] naming the first pass that failed. The remaining passes
    /// are not run.
    pub fn run(
        &self,
        mut graph: Graph,
        target: &dyn Target,
        record_dumps: bool,
    ) -> std::result::Result<PipelineOutput, PipelineFailure> {
        let mut dumps = Vec::new();

        for pass in &self.passes {
            debug!("running pass '{}' on '{}'", pass.name(), graph.method().name);

            let dump = record_dumps
                .then(|| format!("Graph before {}:\n{}", pass.name(), graph.dump()));
            if let Some(dump) = &dump {
                dumps.push(dump.clone());
            }

            graph = match pass.run(graph, target) {
                Ok(graph) => graph,
                Err(error) => {
                    return Err(PipelineFailure {
                        pass: pass.name(),
                        error,
                        last_dump: dump,
                    })
                }
            };

            if pass.changes_cfg() {
                graph.clear_dominance();
            }
            trace!("after '{}': {} nodes", pass.name(), graph.len());
        }

        if record_dumps {
            dumps.push(format!("Final graph:\n{}", graph.dump()));
        }
        Ok(PipelineOutput { graph, dumps })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("passes", &self.pass_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::NodeContents, target::Ref64};

    struct AddNode;

    impl Pass for AddNode {
        fn name(&self) -> &'static str {
            "add-node"
        }

        fn run(&self, mut graph: Graph, _target: &dyn Target) -> crate::Result<Graph> {
            graph.add_node(NodeContents::Empty);
            Ok(graph)
        }

        fn changes_cfg(&self) -> bool {
            true
        }
    }

    struct Fail;

    impl Pass for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn run(&self, _graph: Graph, _target: &dyn Target) -> crate::Result<Graph> {
            Err(pass_error!("fail", "always fails"))
        }
    }

    #[test]
    fn runs_passes_in_order_with_dumps() {
        let pipeline = Pipeline::new(vec![Box::new(AddNode), Box::new(AddNode)]);
        let output = pipeline.run(Graph::detached(), &Ref64::new(), true).unwrap();

        assert_eq!(output.graph.len(), 2);
        assert_eq!(output.dumps.len(), 3);
        assert!(output.dumps[0].starts_with("Graph before add-node:"));
        assert!(output.dumps[2].contains("n1"));
    }

    #[test]
    fn failure_stops_the_pipeline() {
        let pipeline = Pipeline::new(vec![Box::new(AddNode), Box::new(Fail), Box::new(AddNode)]);
        let failure = pipeline.run(Graph::detached(), &Ref64::new(), true).unwrap_err();

        assert_eq!(failure.pass, "fail");
        assert!(matches!(failure.error, Error::Pass { pass: "fail", .. }));
        assert!(failure.last_dump.unwrap().contains("n0"));
    }

    #[test]
    fn standard_order() {
        let target = Ref64::new();
        let pipeline = Pipeline::standard(
            Arc::new(CallRegistry::new()),
            Arc::new(StringTable::new()),
            &target,
            true,
        );
        let names = pipeline.pass_names();
        assert_eq!(names[0], "lower-to-machine-ir");
        assert_eq!(names[12], "allocate-local-vars");
        assert_eq!(names[13], "mangle-call-sites");
        assert_eq!(names.last(), Some(&"ref64-encode"));
    }
}
