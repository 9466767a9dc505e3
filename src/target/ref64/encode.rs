//! Binary encoding for `ref64`.
//!
//! Each instruction is encoded as
//!
//! ```text
//! +--------+---------+---------------------------+
//! | opcode | nparams | param 0 | param 1 | ...   |
//! |  u8    |   u8    |  tag u8 + payload         |
//! +--------+---------+---------------------------+
//! ```
//!
//! | Tag | Operand   | Payload                                                 |
//! |-----|-----------|---------------------------------------------------------|
//! | 0   | register  | `u8` register id                                        |
//! | 1   | immediate | `i64`                                                   |
//! | 2   | frame     | `i32` frame-pointer relative offset                     |
//! | 3   | block     | `i32` displacement from the start of the instruction    |
//! | 4   | symbol    | `u32` zero, covered by a relocation                     |
//! | 5   | condition | `u8` condition code                                     |
//!
//! Nodes are laid out in linear-stream order. Every operand must be final: virtual registers,
//! unassigned stack slots and unresolved call tokens are rejected.

use log::trace;

use crate::{
    compiler::Pass,
    emit::{MethodArtifacts, RelocKind, Relocation},
    file::io::write_le,
    graph::Graph,
    ir::{Location, Param},
    target::{
        ref64::{CALL, R_REF64_CALL32},
        MachineOp, McInst, Target,
    },
    Result,
};

const NAME: &str = "ref64-encode";

const TAG_REG: u8 = 0;
const TAG_IMM: u8 = 1;
const TAG_FRAME: u8 = 2;
const TAG_BLOCK: u8 = 3;
const TAG_SYMBOL: u8 = 4;
const TAG_COND: u8 = 5;

/// Encodes the final machine graph into [`MethodArtifacts`].
pub struct Ref64Encode;

fn param_size(param: &Param) -> Result<usize> {
    Ok(1 + match &param.loc {
        Location::MReg(_) | Location::Cond(_) => 1,
        Location::Const(_) => 8,
        Location::Frame(_) | Location::Block(_) | Location::Symbol(_) => 4,
        other => return Err(pass_error!(NAME, "operand '{}' was never allocated", other)),
    })
}

fn inst_size(inst: &McInst) -> Result<usize> {
    if inst.op.is_pseudo() {
        return Err(pass_error!(NAME, "placeholder '{}' reached encoding", inst));
    }
    inst.params
        .iter()
        .try_fold(2, |size, param| Ok(size + param_size(param)?))
}

fn displacement(from: usize, to: usize) -> Result<i32> {
    let delta = to as i64 - from as i64;
    i32::try_from(delta).map_err(|_| pass_error!(NAME, "branch displacement {} overflows", delta))
}

impl Pass for Ref64Encode {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Encodes ref64 instructions and collects relocations"
    }

    fn run(&self, mut graph: Graph, target: &dyn Target) -> Result<Graph> {
        let arena = graph
            .linear_stream()
            .iter()
            .map(|id| id.index() + 1)
            .max()
            .unwrap_or(0);
        let mut node_offsets = vec![0usize; arena];
        let mut cursor = 0;
        for (id, node) in graph.iter() {
            node_offsets[id.index()] = cursor;
            if let Some(mc) = node.contents.as_mc() {
                for inst in &mc.insts {
                    cursor += inst_size(inst)?;
                }
            }
        }

        let mut code = Vec::with_capacity(cursor);
        let mut relocations = Vec::new();
        let mut listing = Vec::new();
        for (_, node) in graph.iter() {
            let Some(mc) = node.contents.as_mc() else {
                continue;
            };
            for inst in &mc.insts {
                let start = code.len();
                let MachineOp::Target(op) = inst.op else {
                    return Err(pass_error!(NAME, "placeholder '{}' reached encoding", inst));
                };
                let op = u8::try_from(op)
                    .map_err(|_| pass_error!(NAME, "opcode {:#x} does not fit the encoding", op))?;
                let count = u8::try_from(inst.params.len())
                    .map_err(|_| pass_error!(NAME, "too many operands in '{}'", inst))?;
                write_le(&mut code, op);
                write_le(&mut code, count);

                for param in &inst.params {
                    match &param.loc {
                        Location::MReg(reg) => {
                            write_le(&mut code, TAG_REG);
                            let id = u8::try_from(reg.id).map_err(|_| {
                                pass_error!(NAME, "register {} does not fit the encoding", reg.name)
                            })?;
                            write_le(&mut code, id);
                        }
                        Location::Const(value) => {
                            write_le(&mut code, TAG_IMM);
                            write_le(&mut code, *value);
                        }
                        Location::Frame(offset) => {
                            write_le(&mut code, TAG_FRAME);
                            write_le(&mut code, *offset);
                        }
                        Location::Block(target_node) => {
                            write_le(&mut code, TAG_BLOCK);
                            let to = node_offsets[target_node.index()];
                            write_le(&mut code, displacement(start, to)?);
                        }
                        Location::Symbol(symbol) => {
                            write_le(&mut code, TAG_SYMBOL);
                            let kind = if inst.op == MachineOp::Target(CALL) {
                                RelocKind::Call
                            } else {
                                RelocKind::Absolute64
                            };
                            relocations.push(Relocation {
                                symbol: symbol.clone(),
                                offset: code.len() as u64,
                                addend: 0,
                                kind,
                                target_type: target.map_relocation(kind),
                            });
                            write_le(&mut code, 0u32);
                        }
                        Location::Cond(cc) => {
                            write_le(&mut code, TAG_COND);
                            write_le(&mut code, cc.code());
                        }
                        other => {
                            return Err(pass_error!(NAME, "operand '{}' was never allocated", other))
                        }
                    }
                }
                listing.push(format!("{start:04x}: {inst}"));
            }
        }

        trace!(
            "'{}': {} bytes, {} relocations ({} call)",
            graph.method().name,
            code.len(),
            relocations.len(),
            relocations
                .iter()
                .filter(|r| r.target_type == R_REF64_CALL32)
                .count()
        );
        graph.artifacts = Some(MethodArtifacts {
            symbol: graph.method().symbol(),
            code,
            relocations,
            listing,
        });
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::NodeContents,
        ir::{CompType, CondCode},
        target::{ref64::JMP, McNode, Ref64},
    };

    #[test]
    fn encodes_and_relocates() {
        let target = Ref64::new();
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Empty);
        let b = graph.add_node(NodeContents::Empty);
        graph.add_edge(a, b);

        let call = McInst::target(
            CALL,
            "call",
            vec![Param::other(Location::Symbol("_ZN1FE_v".into()))],
        );
        *graph.contents_mut(a) = NodeContents::Mc(McNode::new(vec![
            target.move_inst(
                Location::MReg(target.registers()[1]),
                Location::Const(-2),
                CompType::Int64,
            ),
            call,
            McInst::target(JMP, "jmp", vec![Param::other(Location::Block(b))]),
        ]));
        *graph.contents_mut(b) = NodeContents::Mc(McNode::new(vec![McInst::target(
            crate::target::ref64::JCC,
            "jcc",
            vec![
                Param::other(Location::Cond(CondCode::Eq)),
                Param::read(Location::Frame(-8), CompType::Int32),
                Param::read(Location::Const(0), CompType::Int32),
                Param::other(Location::Block(a)),
            ],
        )]));

        let graph = Ref64Encode.run(graph, &target).unwrap();
        let artifacts = graph.artifacts.unwrap();

        // mov: 2 + 2 + 9; call: 2 + 5; jmp: 2 + 5
        assert_eq!(&artifacts.code[..6], &[0x01, 0x02, TAG_REG, 1, TAG_IMM, 0xFE]);
        assert_eq!(artifacts.relocations.len(), 1);
        assert_eq!(artifacts.relocations[0].offset, 13 + 3);
        assert_eq!(artifacts.relocations[0].kind, RelocKind::Call);
        assert_eq!(artifacts.relocations[0].target_type, R_REF64_CALL32);

        // jmp at 20 targets node b at 27
        assert_eq!(&artifacts.code[22..27], &[TAG_BLOCK, 7, 0, 0, 0]);
        // jcc at 27 jumps back to 0
        let back: usize = 27 + 2 + 2 + 5 + 9 + 1;
        assert_eq!(artifacts.code[back - 1], TAG_BLOCK);
        assert_eq!(&artifacts.code[back..back + 4], &(-27i32).to_le_bytes());
        assert_eq!(artifacts.listing.len(), 4);
    }

    #[test]
    fn rejects_virtual_registers() {
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Empty);
        *graph.contents_mut(a) = NodeContents::Mc(McNode::new(vec![Ref64::new().move_inst(
            Location::VReg(0),
            Location::Const(1),
            CompType::Int32,
        )]));
        assert!(Ref64Encode.run(graph, &Ref64::new()).is_err());
    }

    #[test]
    fn rejects_placeholders() {
        let mut graph = Graph::detached();
        let a = graph.add_node(NodeContents::Empty);
        *graph.contents_mut(a) = NodeContents::Mc(McNode::new(vec![McInst::pseudo(
            MachineOp::SetupStack,
            Vec::new(),
        )]));
        assert!(Ref64Encode.run(graph, &Ref64::new()).is_err());
    }
}
