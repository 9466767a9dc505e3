//! Stack frame layout.
//!
//! The frame grows down from the frame pointer:
//!
//! ```text
//! fp + 16 + 8k   stack-passed argument 4 + k (caller's frame)
//! fp - ...       locals, in declaration order
//!                homes of register-passed arguments
//!                spill slots
//!                register save slots
//! fp - size      (size rounded up to 16)
//! ```
//!
//! Every slot takes a multiple of the pointer size.

use log::trace;

use crate::{
    compiler::Pass,
    graph::Graph,
    ir::{CompType, Location},
    target::{ArgLocation, MachineOp, Reg, Target},
    Result,
};

const NAME: &str = "allocate-local-vars";

const FRAME_ALIGN: u32 = 16;

/// Assigns frame offsets to locals, argument homes, spill and save slots, and expands the
/// stack setup placeholder into the target prologue plus the stores of register arguments
/// to their homes.
pub struct AllocateLocalVars;

struct Layout {
    size: u32,
    locals: Vec<i32>,
    args: Vec<i32>,
    spills: Vec<i32>,
    saves: Vec<i32>,
    homes: Vec<(i32, Reg, CompType)>,
}

struct Allocator {
    used: u32,
    word: u32,
}

impl Allocator {
    fn take(&mut self, size: u32) -> Result<i32> {
        let size = size.div_ceil(self.word).max(1) * self.word;
        self.used = self
            .used
            .checked_add(size)
            .ok_or_else(|| pass_error!(NAME, "frame size overflows"))?;
        i32::try_from(self.used)
            .map(|off| -off)
            .map_err(|_| pass_error!(NAME, "frame offset {} overflows", self.used))
    }

    fn take_n(&mut self, count: u32) -> Result<Vec<i32>> {
        (0..count).map(|_| self.take(self.word)).collect()
    }
}

fn layout(graph: &Graph, target: &dyn Target) -> Result<Layout> {
    let method = graph.method();
    let word = target.pointer_size();
    let mut frame = Allocator { used: 0, word };

    let locals = method
        .locals
        .iter()
        .map(|ct| frame.take(ct.size(word)))
        .collect::<Result<Vec<_>>>()?;

    let mut args = Vec::with_capacity(method.signature.arg_count());
    let mut homes = Vec::new();
    for (i, ct) in method.signature.arg_types().into_iter().enumerate() {
        match target.incoming_arg(i) {
            ArgLocation::Reg(reg) => {
                let home = frame.take(ct.size(word))?;
                args.push(home);
                homes.push((home, reg, ct));
            }
            ArgLocation::Stack(offset) => args.push(offset),
        }
    }

    let spills = frame.take_n(graph.frame.spill_slots)?;
    let saves = frame.take_n(graph.frame.save_slots)?;
    Ok(Layout {
        size: frame.used.div_ceil(FRAME_ALIGN) * FRAME_ALIGN,
        locals,
        args,
        spills,
        saves,
        homes,
    })
}

fn slot(table: &[i32], index: u32, what: &str) -> Result<Location> {
    table
        .get(index as usize)
        .map(|off| Location::Frame(*off))
        .ok_or_else(|| pass_error!(NAME, "{} {} has no frame slot", what, index))
}

impl Pass for AllocateLocalVars {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Lays out the stack frame and expands the prologue"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let layout = layout(&graph, target)?;

        for id in graph.linear_stream().to_vec() {
            let Some(mc) = graph.contents_mut(id).as_mc_mut() else {
                continue;
            };
            let mut out = Vec::with_capacity(mc.insts.len());
            for mut inst in std::mem::take(&mut mc.insts) {
                if inst.op == MachineOp::SetupStack {
                    out.extend(target.setup_stack(layout.size));
                    out.extend(layout.homes.iter().map(|(home, reg, ct)| {
                        target.move_inst(Location::Frame(*home), Location::MReg(*reg), *ct)
                    }));
                    continue;
                }
                for param in &mut inst.params {
                    param.loc = match param.loc {
                        Location::Local(i) => slot(&layout.locals, i, "local")?,
                        Location::Arg(i) => slot(&layout.args, i, "argument")?,
                        Location::Spill(i) => slot(&layout.spills, i, "spill")?,
                        Location::SaveSlot(i) => slot(&layout.saves, i, "save slot")?,
                        _ => continue,
                    };
                }
                out.push(inst);
            }
            mc.insts = out;
        }

        graph.frame.frame_size = layout.size;
        trace!(
            "'{}': frame of {} bytes ({} locals, {} argument homes, {} spills, {} saves)",
            graph.method().name,
            layout.size,
            layout.locals.len(),
            layout.homes.len(),
            layout.spills.len(),
            layout.saves.len()
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        compiler::{MethodInfo, MethodSignature},
        graph::NodeContents,
        ir::Param,
        target::{McInst, McNode, Ref64},
    };

    #[test]
    fn lays_out_every_slot_kind() {
        let target = Ref64::new();
        let method = MethodInfo::new(
            "T.M",
            MethodSignature::new(vec![CompType::Int32; 5], None),
        )
        .with_locals(vec![CompType::Int64]);
        let mut graph = Graph::new(Arc::new(method));
        graph.frame.spill_slots = 1;
        graph.frame.save_slots = 1;
        let read = |loc| Param::read(loc, CompType::Int32);
        let a = graph.add_node(NodeContents::Mc(McNode::new(vec![
            McInst::pseudo(MachineOp::SetupStack, Vec::new()),
            McInst::target(0x02, "add", vec![
                read(Location::Local(0)),
                read(Location::Arg(4)),
                read(Location::Spill(0)),
                read(Location::SaveSlot(0)),
                read(Location::Arg(1)),
            ]),
        ])));

        let graph = AllocateLocalVars.run(graph, &target).unwrap();
        let text: Vec<String> = graph
            .node(a)
            .contents
            .as_mc()
            .unwrap()
            .insts
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            text,
            vec![
                "enter $64",
                "mov [fp-16], r0",
                "mov [fp-24], r1",
                "mov [fp-32], r2",
                "mov [fp-40], r3",
                "add [fp-8], [fp+16], [fp-48], [fp-56], [fp-24]",
            ]
        );
        assert_eq!(graph.frame.frame_size, 64);
    }

    #[test]
    fn undeclared_locals_fail() {
        let mut graph = Graph::detached();
        graph.add_node(NodeContents::Mc(McNode::new(vec![McInst::target(
            0x01,
            "mov",
            vec![Param::write(Location::Local(3), CompType::Int32)],
        )])));
        assert!(AllocateLocalVars.run(graph, &Ref64::new()).is_err());
    }
}
