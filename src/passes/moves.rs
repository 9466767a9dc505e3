use log::trace;

use crate::{compiler::Pass, graph::Graph, target::Target, Result};

/// Deletes moves whose source and destination received the same location.
pub struct RemoveRedundantMoves;

impl Pass for RemoveRedundantMoves {
    fn name(&self) -> &'static str {
        "remove-redundant-moves"
    }

    fn description(&self) -> &'static str {
        "Removes self-moves left behind by register allocation"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let mut removed = 0;
        for id in graph.linear_stream().to_vec() {
            if let Some(mc) = graph.contents_mut(id).as_mc_mut() {
                let before = mc.insts.len();
                mc.insts.retain(|inst| {
                    !target
                        .move_operands(inst)
                        .is_some_and(|(dst, src)| dst.loc == src.loc)
                });
                removed += before - mc.insts.len();
            }
        }
        trace!("'{}': {} redundant moves removed", graph.method().name, removed);
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::NodeContents,
        ir::{CompType, Location},
        target::{McNode, Ref64},
    };

    #[test]
    fn only_self_moves_go() {
        let target = Ref64::new();
        let r0 = Location::MReg(target.registers()[0]);
        let r1 = Location::MReg(target.registers()[1]);
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![
            target.move_inst(r0.clone(), r0.clone(), CompType::Int32),
            target.move_inst(r1.clone(), r0.clone(), CompType::Int32),
            target.move_inst(Location::Frame(-8), Location::Frame(-8), CompType::Int64),
        ])));

        let graph = RemoveRedundantMoves.run(graph, &target).unwrap();
        let insts = &graph.node(a).contents.as_mc().unwrap().insts;
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].params[0].loc, r1);
    }
}
