//! Static single assignment conversion.
//!
//! φ placement follows Appel §19.1: for every variable, φs go into the iterated dominance
//! frontier of the blocks defining it. Only variables read before being written in some
//! block get φs at all (semi-pruned form); variables whose every use follows a definition in
//! the same block never need merging.
//!
//! Renaming (Appel §19.2) walks the dominator tree depth first with an explicit stack of
//! enter/exit actions. On entering a block every definition gets a fresh number and every
//! use reads the innermost definition of its variable; the φ operands of successor blocks
//! are filled in for the edge being left. On exit the definitions made in the block are
//! popped again. A use with no reaching definition reads [`Location::Undef`].

use log::trace;

use crate::{
    compiler::Pass,
    graph::{Graph, NodeId},
    ir::{CompType, Location, Param},
    target::{McInst, McNode, Target},
    utils::BitSet,
    Result,
};

const NAME: &str = "ssa-convert";

/// Puts the machine graph into SSA form. Requires attached dominance.
pub struct SsaConvert;

enum Visit {
    Enter(usize),
    Exit(Vec<u32>),
}

fn mc_mut(graph: &mut Graph, id: NodeId) -> Result<&mut McNode> {
    graph
        .contents_mut(id)
        .as_mc_mut()
        .ok_or_else(|| pass_error!(NAME, "{} does not hold machine instructions", id))
}

fn current(stacks: &[Vec<u32>], var: u32) -> Location {
    stacks
        .get(var as usize)
        .and_then(|s| s.last())
        .map_or(Location::Undef, |v| Location::VReg(*v))
}

impl Pass for SsaConvert {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Inserts φs at iterated dominance frontiers and renames virtual registers"
    }

    fn run(&self, mut graph: Graph, _target: &dyn Target) -> Result<Graph> {
        let part = graph.partition()?.clone();
        let dom = graph.dominance()?.clone();
        let vars = graph.next_vreg as usize;

        let mut def_blocks = vec![BitSet::new(part.len()); vars];
        let mut types = vec![CompType::Unknown; vars];
        let mut globals = BitSet::new(vars);
        for b in 0..part.len() {
            let mut killed = BitSet::new(vars);
            for &id in part.nodes(b) {
                let Some(mc) = graph.node(id).contents.as_mc() else {
                    return Err(pass_error!(NAME, "{} does not hold machine instructions", id));
                };
                for inst in &mc.insts {
                    for v in inst.uses().filter_map(|p| p.loc.vreg()) {
                        if !killed.contains(v as usize) {
                            globals.insert(v as usize);
                        }
                    }
                    for def in inst.defs() {
                        if let Some(v) = def.loc.vreg() {
                            killed.insert(v as usize);
                            def_blocks[v as usize].insert(b);
                            if types[v as usize] == CompType::Unknown {
                                types[v as usize] = def.ct;
                            }
                        }
                    }
                }
            }
        }

        // phi_vars[node][k] is the variable merged by the k-th φ of that node
        let arena = graph
            .linear_stream()
            .iter()
            .map(|id| id.index() + 1)
            .max()
            .unwrap_or(0);
        let mut phi_vars: Vec<Vec<u32>> = vec![Vec::new(); arena];
        let mut inserted = 0;
        for var in globals.iter() {
            for y in dom.iterated_frontier(&def_blocks[var]).iter() {
                let head = part.bb_start(y);
                let preds = graph.node(head).prev().len();
                let ct = types[var];
                let vreg = u32::try_from(var).unwrap_or(u32::MAX);
                let phi = McInst::phi(
                    Param::write(Location::VReg(vreg), ct),
                    vec![Param::read(Location::VReg(vreg), ct); preds],
                );
                mc_mut(&mut graph, head)?.phis.push(phi);
                phi_vars[head.index()].push(vreg);
                inserted += 1;
            }
        }

        let mut stacks: Vec<Vec<u32>> = vec![Vec::new(); vars];
        let mut next = 0u32;
        let mut fresh = |var: u32, stacks: &mut Vec<Vec<u32>>, pushed: &mut Vec<u32>| {
            let name = next;
            next += 1;
            if let Some(stack) = stacks.get_mut(var as usize) {
                stack.push(name);
                pushed.push(var);
            }
            name
        };

        let mut work: Vec<Visit> = dom.roots().iter().rev().map(|r| Visit::Enter(*r)).collect();
        while let Some(visit) = work.pop() {
            let b = match visit {
                Visit::Exit(pushed) => {
                    for var in pushed {
                        stacks[var as usize].pop();
                    }
                    continue;
                }
                Visit::Enter(b) => b,
            };

            let mut pushed = Vec::new();
            for &id in part.nodes(b) {
                let vars_here = &phi_vars[id.index()];
                let mc = mc_mut(&mut graph, id)?;
                for (phi, &var) in mc.phis.iter_mut().zip(vars_here) {
                    let name = fresh(var, &mut stacks, &mut pushed);
                    phi.params[0].loc = Location::VReg(name);
                }
                for inst in &mut mc.insts {
                    for param in inst.params.iter_mut().filter(|p| p.is_use()) {
                        if let Some(var) = param.loc.vreg() {
                            param.loc = current(&stacks, var);
                        }
                    }
                    for param in inst.params.iter_mut().filter(|p| p.is_def()) {
                        if let Some(var) = param.loc.vreg() {
                            param.loc = Location::VReg(fresh(var, &mut stacks, &mut pushed));
                        }
                    }
                }

                let succs = graph.node(id).next().to_vec();
                for succ in succs {
                    let Some(j) = graph.node(succ).prev().iter().position(|p| *p == id) else {
                        continue;
                    };
                    let merged: Vec<Location> = phi_vars[succ.index()]
                        .iter()
                        .map(|var| current(&stacks, *var))
                        .collect();
                    let mc = mc_mut(&mut graph, succ)?;
                    for (phi, loc) in mc.phis.iter_mut().zip(merged) {
                        if let Some(operand) = phi.params.get_mut(1 + j) {
                            operand.loc = loc;
                        }
                    }
                }
            }

            work.push(Visit::Exit(pushed));
            work.extend(dom.children(b).iter().rev().map(|c| Visit::Enter(*c)));
        }

        graph.next_vreg = next;
        trace!(
            "'{}': {} φs over {} global variables, {} SSA names",
            graph.method().name,
            inserted,
            globals.count(),
            next
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::NodeContents,
        passes::Dominance,
        target::{MachineOp, Ref64},
    };

    fn v(n: u32) -> Location {
        Location::VReg(n)
    }

    fn mov(dst: Location, src: Location) -> McInst {
        Ref64::new().move_inst(dst, src, CompType::Int32)
    }

    fn use_of(loc: Location) -> McInst {
        McInst::target(0x18, "ret", vec![Param::read(loc, CompType::Int32)])
    }

    fn mc(graph: &Graph, id: NodeId) -> &McNode {
        graph.node(id).contents.as_mc().unwrap()
    }

    fn convert(graph: Graph) -> Graph {
        let target = Ref64::new();
        let graph = Dominance::new(true).run(graph, &target).unwrap();
        SsaConvert.run(graph, &target).unwrap()
    }

    #[test]
    fn diamond_merges_with_a_phi() {
        // a -> {b, c} -> d; v0 defined in b and c, read in d
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![mov(v(1), Location::Arg(0))])));
        let b = graph.add_node(NodeContents::Mc(McNode::new(vec![mov(v(0), Location::Const(1))])));
        let c = graph.add_node(NodeContents::Mc(McNode::new(vec![mov(v(0), v(1))])));
        let d = graph.add_node(NodeContents::Mc(McNode::new(vec![use_of(v(0))])));
        graph.add_edge(a, b);
        graph.add_edge(a, c);
        graph.add_edge(b, d);
        graph.add_edge(c, d);
        graph.next_vreg = 2;
        graph.refresh_basic_blocks();

        let graph = convert(graph);
        let join = mc(&graph, d);
        assert_eq!(join.phis.len(), 1);
        let phi = &join.phis[0];
        assert_eq!(phi.op, MachineOp::Phi);
        assert_eq!(phi.params.len(), 3);

        let from_b = mc(&graph, b).insts[0].params[0].loc.clone();
        let from_c = mc(&graph, c).insts[0].params[0].loc.clone();
        assert_ne!(from_b, from_c);
        assert_eq!(phi.params[1].loc, from_b);
        assert_eq!(phi.params[2].loc, from_c);
        assert_eq!(join.insts[0].params[0].loc, phi.params[0].loc);

        // c reads a's definition
        assert_eq!(mc(&graph, c).insts[0].params[1].loc, mc(&graph, a).insts[0].params[0].loc);
        assert_eq!(graph.next_vreg, 4);
    }

    #[test]
    fn loop_header_phi_takes_the_back_edge_value() {
        // a -> h; h -> {body, exit}; body -> h
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![mov(v(0), Location::Const(0))])));
        let h = graph.add_node(NodeContents::Mc(McNode::new(vec![use_of(v(0))])));
        let body = graph.add_node(NodeContents::Mc(McNode::new(vec![McInst::target(
            0x02,
            "add",
            vec![
                Param::write(v(0), CompType::Int32),
                Param::read(v(0), CompType::Int32),
                Param::read(Location::Const(1), CompType::Int32),
            ],
        )])));
        let exit = graph.add_node(NodeContents::Mc(McNode::new(vec![use_of(v(0))])));
        graph.add_edge(a, h);
        graph.add_edge(h, body);
        graph.add_edge(h, exit);
        graph.add_edge(body, h);
        graph.next_vreg = 1;
        graph.refresh_basic_blocks();

        let graph = convert(graph);
        let header = mc(&graph, h);
        assert_eq!(header.phis.len(), 1);
        let phi = &header.phis[0];
        let init = mc(&graph, a).insts[0].params[0].loc.clone();
        let add = &mc(&graph, body).insts[0];
        assert_eq!(phi.params[1].loc, init);
        assert_eq!(phi.params[2].loc, add.params[0].loc);
        assert_eq!(add.params[1].loc, phi.params[0].loc);
        assert_eq!(mc(&graph, exit).insts[0].params[0].loc, phi.params[0].loc);
    }

    #[test]
    fn block_local_values_get_no_phi() {
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(Vec::new())));
        let b = graph.add_node(NodeContents::Mc(McNode::new(vec![
            mov(v(0), Location::Const(2)),
            use_of(v(0)),
        ])));
        let c = graph.add_node(NodeContents::Mc(McNode::new(vec![
            mov(v(0), Location::Const(3)),
            use_of(v(0)),
        ])));
        graph.add_edge(a, b);
        graph.add_edge(a, c);
        graph.add_edge(b, c);
        graph.next_vreg = 1;
        graph.refresh_basic_blocks();

        let graph = convert(graph);
        assert!(mc(&graph, c).phis.is_empty());
    }

    #[test]
    fn missing_definitions_read_undef() {
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(Vec::new())));
        let b = graph.add_node(NodeContents::Mc(McNode::new(vec![mov(v(0), Location::Const(1))])));
        let c = graph.add_node(NodeContents::Mc(McNode::new(vec![use_of(v(0))])));
        graph.add_edge(a, b);
        graph.add_edge(a, c);
        graph.add_edge(b, c);
        graph.next_vreg = 1;
        graph.refresh_basic_blocks();

        let graph = convert(graph);
        let phi = &mc(&graph, c).phis[0];
        assert_eq!(phi.params[1].loc, Location::Undef);
        assert_eq!(phi.params[2].loc, mc(&graph, b).insts[0].params[0].loc);
    }
}
