use log::trace;

use crate::{
    compiler::Pass,
    graph::Graph,
    target::{MachineOp, McInst, Reg, Target},
    Result,
};

/// Expands the callee-preserve placeholders.
///
/// Every callee-saved register written anywhere in the method gets a save slot after the
/// slots already reserved for call sites. `save-callee` expands to stores of those
/// registers, each `restore-callee` to the matching reloads.
pub struct CalleePreserves;

impl Pass for CalleePreserves {
    fn name(&self) -> &'static str {
        "callee-preserves"
    }

    fn description(&self) -> &'static str {
        "Saves and restores the callee-saved registers the method writes"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let written: Vec<Reg> = target
            .callee_saved()
            .iter()
            .copied()
            .filter(|reg| {
                graph.iter().any(|(_, node)| {
                    node.contents.as_mc().is_some_and(|mc| {
                        mc.all_insts()
                            .flat_map(McInst::defs)
                            .any(|p| p.loc.mreg() == Some(*reg))
                    })
                })
            })
            .collect();

        let base = graph.frame.save_slots;
        let assignments: Vec<(Reg, u32)> = written.iter().copied().zip(base..).collect();
        for id in graph.linear_stream().to_vec() {
            let Some(mc) = graph.contents_mut(id).as_mc_mut() else {
                continue;
            };
            let mut out = Vec::with_capacity(mc.insts.len());
            for inst in std::mem::take(&mut mc.insts) {
                match inst.op {
                    MachineOp::SaveCalleePreserves => out.extend(
                        assignments
                            .iter()
                            .map(|(reg, slot)| target.save_register(*reg, *slot)),
                    ),
                    MachineOp::RestoreCalleePreserves => out.extend(
                        assignments
                            .iter()
                            .map(|(reg, slot)| target.restore_register(*reg, *slot)),
                    ),
                    _ => out.push(inst),
                }
            }
            mc.insts = out;
        }

        graph.frame.save_slots = base + u32::try_from(assignments.len()).unwrap_or(0);
        trace!(
            "'{}': {} callee-saved registers preserved",
            graph.method().name,
            assignments.len()
        );
        Ok(graph)
    }
}
