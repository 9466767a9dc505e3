//! Liveness of virtual registers and, after allocation, of machine registers.
//!
//! Both analyses work per node of the machine graph:
//!
//! ```text
//! live_in(n)  = gen(n) ∪ (live_out(n) − kill(n))
//! live_out(n) = ⋃ { live_in(s) ∪ phi_j(s) : s ∈ succ(n), n is predecessor j of s }
//! ```
//!
//! where `phi_j(s)` are the values the φs of `s` read along the edge from `n`. φ definitions
//! count as kills of their node; φ operands are not part of `gen`, since they are read on
//! the incoming edge rather than in the node.

use log::trace;

use crate::{
    compiler::Pass,
    graph::{Graph, NodeId},
    ir::Param,
    target::{MachineOp, McInst, McNode, Target},
    utils::BitSet,
    Result,
};

fn mc_nodes(graph: &Graph, pass: &'static str) -> Result<Vec<NodeId>> {
    graph
        .iter()
        .map(|(id, _)| mc(graph, id, pass).map(|_| id))
        .collect()
}

fn mc<'g>(graph: &'g Graph, id: NodeId, pass: &'static str) -> Result<&'g McNode> {
    graph
        .node(id)
        .contents
        .as_mc()
        .ok_or_else(|| pass_error!(pass, "{} does not hold machine instructions", id))
}

fn vreg_index(param: &Param) -> Option<usize> {
    param.loc.vreg().map(|v| v as usize)
}

fn mreg_index(param: &Param) -> Option<usize> {
    param.loc.mreg().map(|r| r.index())
}

/// Fills `gen` and `kill` of every machine node with the virtual registers it reads before
/// writing and the ones it writes, and resets `live_in`/`live_out`.
pub(crate) fn compute_gen_kill(graph: &mut Graph, pass: &'static str) -> Result<()> {
    let vars = graph.next_vreg as usize;
    for id in mc_nodes(graph, pass)? {
        if let Some(node) = graph.contents_mut(id).as_mc_mut() {
            let mut gen = BitSet::new(vars);
            let mut kill = BitSet::new(vars);
            for v in node.phis.iter().flat_map(McInst::defs).filter_map(vreg_index) {
                kill.insert(v);
            }
            for inst in &node.insts {
                for v in inst.uses().filter_map(vreg_index) {
                    if !kill.contains(v) {
                        gen.insert(v);
                    }
                }
                for v in inst.defs().filter_map(vreg_index) {
                    kill.insert(v);
                }
            }
            node.gen = gen;
            node.kill = kill;
            node.live_in = BitSet::new(vars);
            node.live_out = BitSet::new(vars);
        }
    }
    Ok(())
}

/// Solves the liveness equations over the `gen`/`kill` sets already on the nodes.
///
/// Returns the number of sweeps until the fixpoint.
pub(crate) fn compute_liveness(graph: &mut Graph, pass: &'static str) -> Result<usize> {
    let ids = mc_nodes(graph, pass)?;
    let vars = graph.next_vreg as usize;
    let arena = ids.iter().map(|id| id.index() + 1).max().unwrap_or(0);

    // values each node's φs read, per incoming edge
    let mut phi_operands: Vec<Vec<BitSet>> = vec![Vec::new(); arena];
    for &id in &ids {
        let preds = graph.node(id).prev().len();
        let mut per_edge = vec![BitSet::new(vars); preds];
        for phi in &mc(graph, id, pass)?.phis {
            for (j, operand) in phi.params.iter().skip(1).enumerate() {
                if let (Some(v), Some(set)) = (vreg_index(operand), per_edge.get_mut(j)) {
                    set.insert(v);
                }
            }
        }
        phi_operands[id.index()] = per_edge;
    }

    let mut live_in: Vec<BitSet> = vec![BitSet::new(vars); arena];
    let mut live_out: Vec<BitSet> = vec![BitSet::new(vars); arena];
    let mut sweeps = 0;
    let mut changed = true;
    while changed {
        changed = false;
        sweeps += 1;
        for &id in ids.iter().rev() {
            let node = graph.node(id);
            let mut out = BitSet::new(vars);
            for &succ in node.next() {
                out.union_with(&live_in[succ.index()]);
                let j = graph.node(succ).prev().iter().position(|p| *p == id);
                if let Some(set) = j.and_then(|j| phi_operands[succ.index()].get(j)) {
                    out.union_with(set);
                }
            }

            let data = mc(graph, id, pass)?;
            let mut input = out.clone();
            input.difference_with(&data.kill);
            input.union_with(&data.gen);

            if input != live_in[id.index()] || out != live_out[id.index()] {
                live_in[id.index()] = input;
                live_out[id.index()] = out;
                changed = true;
            }
        }
    }

    for id in ids {
        if let Some(node) = graph.contents_mut(id).as_mc_mut() {
            node.live_in = std::mem::take(&mut live_in[id.index()]);
            node.live_out = std::mem::take(&mut live_out[id.index()]);
        }
    }
    Ok(sweeps)
}

/// Computes `gen` and `kill` for every machine node.
pub struct GenKill;

impl Pass for GenKill {
    fn name(&self) -> &'static str {
        "gen-kill"
    }

    fn description(&self) -> &'static str {
        "Collects upward-exposed uses and definitions per node"
    }

    fn run(&self, mut graph: Graph, _target: &dyn Target) -> Result<Graph> {
        compute_gen_kill(&mut graph, self.name())?;
        Ok(graph)
    }
}

/// Solves virtual register liveness, φ-aware. Requires [`GenKill`].
pub struct Liveness;

impl Pass for Liveness {
    fn name(&self) -> &'static str {
        "liveness"
    }

    fn description(&self) -> &'static str {
        "Computes live-in and live-out sets of virtual registers"
    }

    fn run(&self, mut graph: Graph, _target: &dyn Target) -> Result<Graph> {
        let sweeps = compute_liveness(&mut graph, self.name())?;
        trace!("'{}': liveness converged after {} sweeps", graph.method().name, sweeps);
        Ok(graph)
    }
}

/// Register liveness after allocation.
///
/// Overwrites the dataflow sets of every node with machine register sets (indexed by
/// register id) and records the registers live after each call boundary marker in
/// [`McInst::mreg_live_out`].
pub struct MachineLiveness;

impl Pass for MachineLiveness {
    fn name(&self) -> &'static str {
        "machine-liveness"
    }

    fn description(&self) -> &'static str {
        "Computes machine register liveness and records it at call boundaries"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let regs = target.registers().len();
        let ids = mc_nodes(&graph, self.name())?;
        let arena = ids.iter().map(|id| id.index() + 1).max().unwrap_or(0);

        let mut gen = vec![BitSet::new(regs); arena];
        let mut kill = vec![BitSet::new(regs); arena];
        for &id in &ids {
            let node = mc(&graph, id, self.name())?;
            if !node.phis.is_empty() {
                return Err(pass_error!(self.name(), "{} still holds φs", id));
            }
            for inst in &node.insts {
                for r in inst.uses().filter_map(mreg_index) {
                    if !kill[id.index()].contains(r) {
                        gen[id.index()].insert(r);
                    }
                }
                for r in inst.defs().filter_map(mreg_index) {
                    kill[id.index()].insert(r);
                }
            }
        }

        let mut live_in = vec![BitSet::new(regs); arena];
        let mut live_out = vec![BitSet::new(regs); arena];
        let mut changed = true;
        while changed {
            changed = false;
            for &id in ids.iter().rev() {
                let mut out = BitSet::new(regs);
                for succ in graph.node(id).next() {
                    out.union_with(&live_in[succ.index()]);
                }
                let mut input = out.clone();
                input.difference_with(&kill[id.index()]);
                input.union_with(&gen[id.index()]);
                if input != live_in[id.index()] || out != live_out[id.index()] {
                    live_in[id.index()] = input;
                    live_out[id.index()] = out;
                    changed = true;
                }
            }
        }

        let mut boundaries = 0;
        for id in ids {
            let Some(node) = graph.contents_mut(id).as_mc_mut() else {
                continue;
            };
            let mut live = live_out[id.index()].clone();
            for inst in node.insts.iter_mut().rev() {
                if matches!(inst.op, MachineOp::PreCall | MachineOp::PostCall) {
                    inst.mreg_live_out = Some(live.clone());
                    boundaries += 1;
                }
                for r in inst.defs().filter_map(mreg_index) {
                    live.remove(r);
                }
                for r in inst.uses().filter_map(mreg_index) {
                    live.insert(r);
                }
            }
            node.gen = std::mem::take(&mut gen[id.index()]);
            node.kill = std::mem::take(&mut kill[id.index()]);
            node.live_in = std::mem::take(&mut live_in[id.index()]);
            node.live_out = std::mem::take(&mut live_out[id.index()]);
        }

        trace!(
            "'{}': register liveness recorded at {} call boundaries",
            graph.method().name,
            boundaries
        );
        Ok(graph)
    }
}
