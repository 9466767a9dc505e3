//! Instruction selection driver.

use log::trace;

use crate::{
    compiler::Pass,
    graph::{Graph, NodeContents, NodeId},
    ir::{IrOp, Location},
    target::{McNode, Target},
    Result,
};

const NAME: &str = "target-lower";

/// Replaces the IR graph by a graph with one [`McNode`] per basic block.
///
/// Each IR instruction is handed to [`Target::lower`]; block references in the selected
/// instructions are rewritten from IR nodes to the new machine nodes. Blocks keep their
/// order, and where a block's fall-through successor is not the block laid out after it an
/// explicit jump is appended. Edge order is preserved, the fall-through edge staying the
/// default edge.
pub struct TargetLower;

impl Pass for TargetLower {
    fn name(&self) -> &'static str {
        NAME
    }

    fn changes_cfg(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Selects target instructions, one machine node per block"
    }

    fn run(&self, graph: Graph, target: &dyn Target) -> Result<Graph> {
        let part = graph.partition()?;
        let mut out = graph.successor();
        let ids: Vec<NodeId> = (0..part.len())
            .map(|_| out.add_node(NodeContents::Empty))
            .collect();

        let mut switches = Vec::with_capacity(part.len());
        for b in 0..part.len() {
            let mut insts = Vec::new();
            let mut last_op = None;
            for &id in part.nodes(b) {
                let ir = graph
                    .node(id)
                    .contents
                    .as_ir()
                    .ok_or_else(|| pass_error!(NAME, "{} does not hold an IR instruction", id))?;
                for mut inst in target.lower(ir, graph.method())? {
                    for param in &mut inst.params {
                        if let Location::Block(node) = param.loc {
                            param.loc = Location::Block(ids[graph.block_of(node)?]);
                        }
                    }
                    insts.push(inst);
                }
                last_op = Some(ir.op);
            }

            let is_switch = last_op == Some(IrOp::Switch);
            if let Some(&ft) = part.bbs_after(b).first() {
                if !last_op.is_some_and(IrOp::is_unconditional_transfer) && ft != b + 1 {
                    insts.push(target.jump(ids[ft]));
                }
            }

            *out.contents_mut(ids[b]) = NodeContents::Mc(McNode::new(insts));
            out.set_region(ids[b], graph.node(part.bb_start(b)).region);
            switches.push(is_switch);
        }

        for b in 0..part.len() {
            for (i, &succ) in part.bbs_after(b).iter().enumerate() {
                if i == 0 && !switches[b] {
                    out.add_default_edge(ids[b], ids[succ]);
                } else {
                    out.add_edge(ids[b], ids[succ]);
                }
            }
        }

        out.refresh_basic_blocks();
        trace!(
            "'{}': {} IR nodes selected into {} machine nodes",
            graph.method().name,
            graph.len(),
            out.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{CompType, CondCode, IrInst, Param},
        target::{MachineOp, Ref64},
    };

    fn ir(inst: IrInst) -> NodeContents {
        NodeContents::Ir(inst)
    }

    #[test]
    fn blocks_become_machine_nodes_with_explicit_jumps() {
        let v = |n| Location::VReg(n);
        let mut graph = Graph::detached();
        let n0 = graph.add_node(NodeContents::Empty);
        let n1 = graph.add_node(ir(IrInst::new(
            IrOp::Move,
            vec![Param::read(Location::Const(1), CompType::Int32)],
            vec![Param::write(v(1), CompType::Int32)],
        )));
        let n2 = graph.add_node(ir(IrInst::new(
            IrOp::Move,
            vec![Param::read(Location::Const(2), CompType::Int32)],
            vec![Param::write(v(1), CompType::Int32)],
        )));
        let n3 = graph.add_node(ir(IrInst::new(
            IrOp::Ret,
            vec![Param::read(v(1), CompType::Int32)],
            Vec::new(),
        )));
        *graph.contents_mut(n0) = ir(IrInst::new(
            IrOp::BrIf(CondCode::Eq),
            vec![
                Param::read(v(0), CompType::Int32),
                Param::read(Location::Const(0), CompType::Int32),
            ],
            Vec::new(),
        )
        .with_targets(vec![n2]));
        graph.add_default_edge(n0, n1);
        graph.add_edge(n0, n2);
        graph.add_default_edge(n1, n3);
        graph.add_default_edge(n2, n3);
        graph.refresh_basic_blocks();

        let out = TargetLower.run(graph, &Ref64::new()).unwrap();
        let part = out.partition().unwrap();
        assert_eq!(part.len(), 4);
        let node = |b: usize| out.node(part.bb_start(b));
        let mc = |b: usize| node(b).contents.as_mc().unwrap();

        // the conditional branch names the machine node of its target block
        let branch = mc(0).insts.last().unwrap();
        assert!(branch
            .params
            .iter()
            .any(|p| p.loc == Location::Block(part.bb_start(2))));
        assert_eq!(node(0).next(), &[part.bb_start(1), part.bb_start(2)]);

        // block 1 falls through to block 3, which is not laid out next
        let jump = mc(1).insts.last().unwrap();
        assert_eq!(jump.to_string(), format!("jmp ->{}", part.bb_start(3)));
        assert!(!mc(2).insts.iter().any(|i| i.to_string().starts_with("jmp")));

        assert!(mc(3)
            .insts
            .iter()
            .any(|i| i.op == MachineOp::RestoreCalleePreserves));
    }

    #[test]
    fn switch_falls_through_to_its_first_successor() {
        let ret = || {
            ir(IrInst::new(
                IrOp::Ret,
                vec![Param::read(Location::Const(0), CompType::Int32)],
                Vec::new(),
            ))
        };
        let mut graph = Graph::detached();
        let n0 = graph.add_node(NodeContents::Empty);
        let case = graph.add_node(ret());
        let fallthrough = graph.add_node(ret());
        *graph.contents_mut(n0) = ir(IrInst::new(
            IrOp::Switch,
            vec![Param::read(Location::VReg(0), CompType::Int32)],
            Vec::new(),
        )
        .with_targets(vec![case]));
        graph.add_edge(n0, fallthrough);
        graph.add_edge(n0, case);
        graph.refresh_basic_blocks();

        let out = TargetLower.run(graph, &Ref64::new()).unwrap();
        let part = out.partition().unwrap();
        let insts = &out.node(part.bb_start(0)).contents.as_mc().unwrap().insts;
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].mnemonic, "switch");
        assert_eq!(insts[1].to_string(), format!("jmp ->{}", part.bb_start(2)));
        assert_eq!(
            out.node(part.bb_start(0)).next(),
            &[part.bb_start(2), part.bb_start(1)]
        );
    }

    #[test]
    fn non_ir_nodes_are_rejected() {
        let mut graph = Graph::detached();
        graph.add_node(NodeContents::Empty);
        graph.refresh_basic_blocks();
        assert!(TargetLower.run(graph, &Ref64::new()).is_err());
    }
}
