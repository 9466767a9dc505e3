use log::trace;

use crate::{
    compiler::Pass,
    graph::Graph,
    target::{MachineOp, McInst, Reg, Target},
    utils::BitSet,
    Result,
};

const NAME: &str = "preserve-across-calls";

/// Saves and restores caller-saved registers that hold values across a call.
///
/// A register needs preserving around a call sequence if it is live after the sequence's
/// `postcall` marker, is caller-saved, and is not written inside the sequence (argument
/// and result registers are). Saves replace the `precall` marker and restores the
/// `postcall` marker; both markers are gone afterwards. Call sequences never overlap, so
/// every sequence uses save slots from 0 and the frame reserves the largest count.
///
/// Requires [`crate::passes::MachineLiveness`].
pub struct PreserveAcrossCalls;

fn clobbered(sequence: &[McInst], regs: usize) -> BitSet {
    let mut written = BitSet::new(regs);
    for r in sequence
        .iter()
        .flat_map(McInst::defs)
        .filter_map(|p| p.loc.mreg())
    {
        written.insert(r.index());
    }
    written
}

impl Pass for PreserveAcrossCalls {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Saves caller-saved registers live across call sites"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let regs = target.registers().len();
        let ids = graph.linear_stream().to_vec();
        let mut slots = graph.frame.save_slots;
        let mut sites = 0;
        let mut saved = 0;

        for id in ids {
            let Some(mc) = graph.contents_mut(id).as_mc_mut() else {
                continue;
            };
            if !mc.insts.iter().any(|i| i.op == MachineOp::PreCall) {
                continue;
            }

            let old = std::mem::take(&mut mc.insts);
            let mut out = Vec::with_capacity(old.len());
            let mut pending: Vec<(Reg, u32)> = Vec::new();
            for (i, inst) in old.iter().enumerate() {
                match inst.op {
                    MachineOp::PreCall => {
                        let end = old[i..]
                            .iter()
                            .position(|x| x.op == MachineOp::PostCall)
                            .map(|p| i + p)
                            .ok_or_else(|| pass_error!(NAME, "{}: call sequence never ends", id))?;
                        let live = old[end].mreg_live_out.as_ref().ok_or_else(|| {
                            pass_error!(NAME, "{}: call site has no register liveness", id)
                        })?;
                        let written = clobbered(&old[i + 1..end], regs);

                        pending = target
                            .caller_saved()
                            .iter()
                            .filter(|r| live.contains(r.index()) && !written.contains(r.index()))
                            .zip(0u32..)
                            .map(|(r, slot)| (*r, slot))
                            .collect();
                        slots = slots.max(u32::try_from(pending.len()).unwrap_or(u32::MAX));
                        sites += 1;
                        saved += pending.len();
                        out.extend(pending.iter().map(|(r, slot)| target.save_register(*r, *slot)));
                    }
                    MachineOp::PostCall => {
                        out.extend(
                            pending
                                .drain(..)
                                .map(|(r, slot)| target.restore_register(r, slot)),
                        );
                    }
                    _ => out.push(inst.clone()),
                }
            }
            mc.insts = out;
        }

        graph.frame.save_slots = slots;
        trace!(
            "'{}': {} call sites, {} register saves",
            graph.method().name,
            sites,
            saved
        );
        Ok(graph)
    }
}
