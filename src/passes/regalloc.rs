//! Register allocation by graph colouring.
//!
//! 1. φ webs are coalesced: the definition and every operand of a φ are unioned into one
//!    variable and the φs removed. This relies on the SSA form being conventional, which
//!    holds for graphs built by renaming since no pass between SSA conversion and
//!    allocation moves definitions around.
//! 2. Liveness is recomputed for the coalesced variables.
//! 3. The interference graph has a node per virtual register and a precoloured node per
//!    machine register. A definition interferes with everything live after it, except the
//!    source of a move.
//! 4. Nodes of insignificant degree are simplified first; when none is left the node of
//!    highest degree is pushed optimistically. Selection pops nodes and assigns the first
//!    free allocatable register, preferring those of move partners. A node that finds no
//!    free register is spilled to its own stack slot; since every operand slot accepts a
//!    frame slot, no reload code is needed.

use log::trace;

use crate::{
    compiler::Pass,
    graph::Graph,
    ir::{Location, Param},
    passes::{compute_gen_kill, compute_liveness},
    target::Target,
    utils::BitSet,
    Result,
};

const NAME: &str = "register-allocate";

/// Assigns machine registers or spill slots to all virtual registers.
pub struct RegisterAllocate;

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        UnionFind {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[b.max(a)] = a.min(b);
        }
    }
}

struct Interference {
    vars: usize,
    adj: Vec<BitSet>,
    partners: Vec<Vec<usize>>,
    present: BitSet,
}

impl Interference {
    fn index(&self, param: &Param) -> Option<usize> {
        match &param.loc {
            Location::VReg(v) if (*v as usize) < self.vars => Some(*v as usize),
            Location::MReg(r) => Some(self.vars + r.index()),
            _ => None,
        }
    }

    fn add_edge(&mut self, a: usize, b: usize) {
        if a != b {
            self.adj[a].insert(b);
            self.adj[b].insert(a);
        }
    }

    fn build(graph: &Graph, target: &dyn Target) -> Result<Self> {
        let vars = graph.next_vreg as usize;
        let total = vars + target.registers().len();
        let mut ig = Interference {
            vars,
            adj: vec![BitSet::new(total); total],
            partners: vec![Vec::new(); vars],
            present: BitSet::new(vars),
        };

        for (id, node) in graph.iter() {
            let mc = node
                .contents
                .as_mc()
                .ok_or_else(|| pass_error!(NAME, "{} does not hold machine instructions", id))?;
            let mut live = BitSet::new(total);
            for v in mc.live_out.iter() {
                live.insert(v);
            }

            for inst in mc.insts.iter().rev() {
                let defs: Vec<usize> = inst.defs().filter_map(|p| ig.index(p)).collect();
                let uses: Vec<usize> = inst.uses().filter_map(|p| ig.index(p)).collect();
                for &x in defs.iter().chain(&uses) {
                    if x < vars {
                        ig.present.insert(x);
                    }
                }

                let copied = target
                    .move_operands(inst)
                    .and_then(|(dst, src)| Some((ig.index(dst)?, ig.index(src)?)));
                if let Some((dst, src)) = copied {
                    if dst < vars {
                        ig.partners[dst].push(src);
                    }
                    if src < vars {
                        ig.partners[src].push(dst);
                    }
                }

                let live_now: Vec<usize> = live.iter().collect();
                for &d in &defs {
                    for &l in &live_now {
                        if copied.map(|(_, src)| src) != Some(l) {
                            ig.add_edge(d, l);
                        }
                    }
                    for &other in &defs {
                        ig.add_edge(d, other);
                    }
                }
                for d in defs {
                    live.remove(d);
                }
                for u in uses {
                    live.insert(u);
                }
            }
        }
        Ok(ig)
    }
}

impl Pass for RegisterAllocate {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Coalesces φ webs and colours the interference graph"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let vars = graph.next_vreg as usize;
        let ids = graph.linear_stream().to_vec();

        let mut webs = UnionFind::new(vars);
        let mut phis = 0;
        for (_, node) in graph.iter() {
            let Some(mc) = node.contents.as_mc() else {
                continue;
            };
            for phi in &mc.phis {
                phis += 1;
                let mut vregs = phi.params.iter().filter_map(|p| p.loc.vreg());
                if let Some(def) = vregs.next() {
                    for operand in vregs {
                        webs.union(def as usize, operand as usize);
                    }
                }
            }
        }
        for &id in &ids {
            if let Some(mc) = graph.contents_mut(id).as_mc_mut() {
                mc.phis.clear();
                for param in mc.insts.iter_mut().flat_map(|i| i.params.iter_mut()) {
                    if let Location::VReg(v) = param.loc {
                        let root = webs.find(v as usize);
                        param.loc = Location::VReg(u32::try_from(root).unwrap_or(v));
                    }
                }
            }
        }

        compute_gen_kill(&mut graph, NAME)?;
        compute_liveness(&mut graph, NAME)?;
        let ig = Interference::build(&graph, target)?;

        let colors = target.allocatable();
        let k = colors.len();
        let is_color = |n: usize| n >= vars && colors.iter().any(|r| r.index() == n - vars);

        let mut removed = BitSet::new(vars);
        let mut stack = Vec::with_capacity(ig.present.count());
        while removed.count() < ig.present.count() {
            let degree = |v: usize| {
                ig.adj[v]
                    .iter()
                    .filter(|&n| {
                        (n < vars && ig.present.contains(n) && !removed.contains(n)) || is_color(n)
                    })
                    .count()
            };
            let candidates = ig.present.iter().filter(|v| !removed.contains(*v));
            let pick = candidates
                .clone()
                .find(|&v| degree(v) < k)
                .or_else(|| candidates.max_by_key(|&v| degree(v)));
            let Some(v) = pick else {
                break;
            };
            removed.insert(v);
            stack.push(v);
        }

        let mut assigned: Vec<Option<Location>> = vec![None; vars];
        let mut spills = graph.frame.spill_slots;
        let mut spilled = 0;
        while let Some(v) = stack.pop() {
            let mut taken = BitSet::new(target.registers().len());
            for n in ig.adj[v].iter() {
                if n >= vars {
                    taken.insert(n - vars);
                } else if let Some(Location::MReg(r)) = &assigned[n] {
                    taken.insert(r.index());
                }
            }

            let preferred = ig.partners[v].iter().find_map(|&p| {
                let reg = if p >= vars {
                    colors.iter().find(|r| r.index() == p - vars).copied()
                } else {
                    assigned[p].as_ref().and_then(Location::mreg)
                };
                reg.filter(|r| colors.contains(r) && !taken.contains(r.index()))
            });
            let choice = preferred.or_else(|| colors.iter().find(|r| !taken.contains(r.index())).copied());

            assigned[v] = Some(match choice {
                Some(reg) => Location::MReg(reg),
                None => {
                    spills += 1;
                    spilled += 1;
                    Location::Spill(spills - 1)
                }
            });
        }

        for &id in &ids {
            let Some(mc) = graph.contents_mut(id).as_mc_mut() else {
                continue;
            };
            for param in mc.insts.iter_mut().flat_map(|i| i.params.iter_mut()) {
                if let Location::VReg(v) = param.loc {
                    param.loc = assigned
                        .get(v as usize)
                        .cloned()
                        .flatten()
                        .ok_or_else(|| pass_error!(NAME, "v{} was never allocated", v))?;
                }
            }
        }
        graph.frame.spill_slots = spills;

        trace!(
            "'{}': {} φs coalesced, {} values coloured with {} registers, {} spilled",
            graph.method().name,
            phis,
            ig.present.count(),
            k,
            spilled
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{NodeContents, NodeId},
        ir::CompType,
        target::{McInst, McNode, Ref64},
    };

    fn v(n: u32) -> Location {
        Location::VReg(n)
    }

    fn op(defs: &[Location], uses: &[Location]) -> McInst {
        let mut params: Vec<Param> = defs
            .iter()
            .map(|l| Param::write(l.clone(), CompType::Int32))
            .collect();
        params.extend(uses.iter().map(|l| Param::read(l.clone(), CompType::Int32)));
        McInst::target(0x02, "add", params)
    }

    fn insts(graph: &Graph, id: NodeId) -> &[McInst] {
        &graph.node(id).contents.as_mc().unwrap().insts
    }

    fn allocate(graph: Graph) -> Graph {
        RegisterAllocate.run(graph, &Ref64::new()).unwrap()
    }

    #[test]
    fn simultaneously_live_values_get_distinct_registers() {
        let target = Ref64::new();
        let r0 = Location::MReg(target.registers()[0]);
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![
            op(&[v(0)], &[Location::Const(1)]),
            op(&[v(1)], &[Location::Const(2)]),
            op(&[v(2)], &[v(0), v(1)]),
            target.move_inst(r0.clone(), v(2), CompType::Int32),
            McInst::target(0x18, "ret", vec![Param::read(r0.clone(), CompType::Int32)]),
        ])));
        graph.next_vreg = 3;

        let graph = allocate(graph);
        let code = insts(&graph, a);
        assert!(code
            .iter()
            .flat_map(|i| &i.params)
            .all(|p| p.loc.vreg().is_none()));
        assert_ne!(code[0].params[0].loc, code[1].params[0].loc);
        // move partner preference makes the final copy redundant
        assert_eq!(code[2].params[0].loc, r0);
        assert_eq!(graph.frame.spill_slots, 0);
    }

    #[test]
    fn pressure_spills_to_stack_slots() {
        let mut graph = Graph::detached();
        let mut code: Vec<McInst> = (0..8).map(|i| op(&[v(i)], &[Location::Const(0)])).collect();
        code.push(op(&[], &(0..8).map(v).collect::<Vec<_>>()));
        let a = graph.add_node(NodeContents::Mc(McNode::new(code)));
        graph.next_vreg = 8;

        let graph = allocate(graph);
        let defs: Vec<Location> = insts(&graph, a)[..8]
            .iter()
            .map(|i| i.params[0].loc.clone())
            .collect();
        let in_regs = defs.iter().filter(|l| l.mreg().is_some()).count();
        assert_eq!(in_regs, 6);
        assert_eq!(graph.frame.spill_slots, 2);
        for (i, a) in defs.iter().enumerate() {
            for b in &defs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn phi_webs_share_a_location() {
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![op(&[v(0)], &[])])));
        let b = graph.add_node(NodeContents::Mc(McNode::new(vec![op(&[v(1)], &[])])));
        let mut join = McNode::new(vec![op(&[], &[v(2)])]);
        join.phis.push(McInst::phi(
            Param::write(v(2), CompType::Int32),
            vec![
                Param::read(v(0), CompType::Int32),
                Param::read(v(1), CompType::Int32),
            ],
        ));
        let c = graph.add_node(NodeContents::Mc(join));
        graph.add_edge(a, c);
        graph.add_edge(b, c);
        graph.next_vreg = 3;

        let graph = allocate(graph);
        assert!(graph.node(c).contents.as_mc().unwrap().phis.is_empty());
        let loc = insts(&graph, c)[0].params[0].loc.clone();
        assert_eq!(insts(&graph, a)[0].params[0].loc, loc);
        assert_eq!(insts(&graph, b)[0].params[0].loc, loc);
    }
}
