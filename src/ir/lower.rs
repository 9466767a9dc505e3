//! Bytecode to IR lowering.

use std::{collections::HashMap, sync::Arc};

use log::trace;

use crate::{
    cil::{opcodes, CilInstr, Operand},
    compiler::{CallRegistry, MethodInfo, Pass},
    graph::{Graph, NodeContents, NodeId},
    ir::{CallSite, CompType, CondCode, IrInst, IrOp, Location, Param},
    target::Target,
    utils::BitSet,
    Result,
};

const NAME: &str = "lower-to-machine-ir";

/// Rewrites a decoded bytecode graph into target-independent IR.
///
/// The result is a new graph with one node per IR instruction. Operands still refer to the
/// evaluation stack: `Stack(0)` is the top of the stack *before* the instruction for reads,
/// and the pushed value for writes. [`crate::ir::StackTrace`] turns them into virtual
/// registers.
///
/// Only blocks reachable from the block at offset 0 are lowered. An `enter` instruction is
/// placed first in the entry block, or in a separate prologue block if the entry block is a
/// loop header. Branches whose only successor is their fall-through lower to pops of their
/// operands, and unconditional branches that do not end their block disappear.
///
/// Floating-point values travel as IEEE double bit patterns typed [`CompType::Float`]. The
/// object model and exception handling instructions need metadata this pass does not have and
/// are rejected.
pub struct LowerToMachineIr {
    registry: Arc<CallRegistry>,
}

impl LowerToMachineIr {
    /// Creates the pass resolving call tokens through `registry`.
    #[must_use]
    pub fn new(registry: Arc<CallRegistry>) -> Self {
        LowerToMachineIr { registry }
    }
}

fn st(depth: u32) -> Param {
    Param::read(Location::Stack(depth), CompType::Unknown)
}

fn push(ct: CompType) -> Param {
    Param::write(Location::Stack(0), ct)
}

fn int32(value: i64) -> Param {
    Param::read(Location::Const(value), CompType::Int32)
}

fn placeholder(block: usize) -> NodeId {
    NodeId::new(block)
}

fn branch_cc(code: u16) -> Option<CondCode> {
    use opcodes::*;
    Some(match code {
        BEQ | BEQ_S => CondCode::Eq,
        BNE_UN | BNE_UN_S => CondCode::Ne,
        BGE | BGE_S => CondCode::Ge,
        BGT | BGT_S => CondCode::Gt,
        BLE | BLE_S => CondCode::Le,
        BLT | BLT_S => CondCode::Lt,
        BGE_UN | BGE_UN_S => CondCode::GeUn,
        BGT_UN | BGT_UN_S => CondCode::GtUn,
        BLE_UN | BLE_UN_S => CondCode::LeUn,
        BLT_UN | BLT_UN_S => CondCode::LtUn,
        _ => return None,
    })
}

fn binary_op(code: u16) -> Option<IrOp> {
    use opcodes::*;
    Some(match code {
        ADD => IrOp::Add,
        SUB => IrOp::Sub,
        MUL => IrOp::Mul,
        DIV => IrOp::Div,
        DIV_UN => IrOp::DivUn,
        REM => IrOp::Rem,
        REM_UN => IrOp::RemUn,
        AND => IrOp::And,
        OR => IrOp::Or,
        XOR => IrOp::Xor,
        SHL => IrOp::Shl,
        SHR => IrOp::Shr,
        SHR_UN => IrOp::ShrUn,
        ADD_OVF => IrOp::AddOvf { unsigned: false },
        ADD_OVF_UN => IrOp::AddOvf { unsigned: true },
        SUB_OVF => IrOp::SubOvf { unsigned: false },
        SUB_OVF_UN => IrOp::SubOvf { unsigned: true },
        MUL_OVF => IrOp::MulOvf { unsigned: false },
        MUL_OVF_UN => IrOp::MulOvf { unsigned: true },
        CEQ => IrOp::Cmp(CondCode::Eq),
        CGT => IrOp::Cmp(CondCode::Gt),
        CGT_UN => IrOp::Cmp(CondCode::GtUn),
        CLT => IrOp::Cmp(CondCode::Lt),
        CLT_UN => IrOp::Cmp(CondCode::LtUn),
        _ => return None,
    })
}

fn conversion(code: u16) -> Option<IrOp> {
    use opcodes::*;
    let (to, width, signed) = match code {
        CONV_I1 | CONV_OVF_I1 | CONV_OVF_I1_UN => (CompType::Int32, 1, true),
        CONV_I2 | CONV_OVF_I2 | CONV_OVF_I2_UN => (CompType::Int32, 2, true),
        CONV_I4 | CONV_OVF_I4 | CONV_OVF_I4_UN => (CompType::Int32, 4, true),
        CONV_I8 | CONV_OVF_I8 | CONV_OVF_I8_UN => (CompType::Int64, 8, true),
        CONV_U1 | CONV_OVF_U1 | CONV_OVF_U1_UN => (CompType::Int32, 1, false),
        CONV_U2 | CONV_OVF_U2 | CONV_OVF_U2_UN => (CompType::Int32, 2, false),
        CONV_U4 | CONV_OVF_U4 | CONV_OVF_U4_UN => (CompType::Int32, 4, false),
        CONV_U8 | CONV_OVF_U8 | CONV_OVF_U8_UN => (CompType::Int64, 8, false),
        CONV_I | CONV_OVF_I | CONV_OVF_I_UN => (CompType::IntPtr, 0, true),
        CONV_U | CONV_OVF_U | CONV_OVF_U_UN => (CompType::IntPtr, 0, false),
        CONV_R4 => (CompType::Float, 4, true),
        CONV_R8 | CONV_R_UN => (CompType::Float, 8, true),
        _ => return None,
    };
    let checked = matches!(
        code,
        CONV_OVF_I1_UN..=CONV_OVF_U_UN | CONV_OVF_I1..=CONV_OVF_U8 | CONV_OVF_I | CONV_OVF_U
    );
    let from_unsigned = matches!(code, CONV_OVF_I1_UN..=CONV_OVF_U_UN | CONV_R_UN);
    Some(IrOp::Conv {
        to,
        width,
        signed,
        checked,
        from_unsigned,
    })
}

fn indirect_load(code: u16) -> Option<IrOp> {
    use opcodes::*;
    let (to, width, signed) = match code {
        LDIND_I1 => (CompType::Int32, 1, true),
        LDIND_U1 => (CompType::Int32, 1, false),
        LDIND_I2 => (CompType::Int32, 2, true),
        LDIND_U2 => (CompType::Int32, 2, false),
        LDIND_I4 => (CompType::Int32, 4, true),
        LDIND_U4 => (CompType::Int32, 4, false),
        LDIND_I8 => (CompType::Int64, 8, true),
        LDIND_I => (CompType::IntPtr, 0, true),
        LDIND_R4 => (CompType::Float, 4, true),
        LDIND_R8 => (CompType::Float, 8, true),
        LDIND_REF => (CompType::Object, 0, false),
        _ => return None,
    };
    Some(IrOp::LoadInd { to, width, signed })
}

fn indirect_store_width(code: u16) -> Option<u8> {
    use opcodes::*;
    Some(match code {
        STIND_I1 => 1,
        STIND_I2 => 2,
        STIND_I4 | STIND_R4 => 4,
        STIND_I8 | STIND_R8 => 8,
        STIND_I | STIND_REF => 0,
        _ => return None,
    })
}

/// Raw bits of a floating-point constant, widened to double precision.
fn float_bits(value: f64) -> Param {
    Param::read(
        Location::Const(i64::from_le_bytes(value.to_le_bytes())),
        CompType::Float,
    )
}

/// Per-method state while lowering one block.
struct BlockLowering<'a> {
    method: &'a MethodInfo,
    registry: &'a CallRegistry,
    block_at: &'a HashMap<usize, usize>,
    insts: Vec<IrInst>,
}

impl BlockLowering<'_> {
    fn emit(&mut self, op: IrOp, uses: Vec<Param>, defs: Vec<Param>) {
        self.insts.push(IrInst::new(op, uses, defs));
    }

    fn block(&self, offset: usize, instr: &CilInstr) -> Result<NodeId> {
        self.block_at
            .get(&offset)
            .map(|b| placeholder(*b))
            .ok_or_else(|| pass_error!(NAME, "no block at IL_{:04x} for '{}'", offset, instr))
    }

    fn local(&self, index: i64, instr: &CilInstr) -> Result<(Location, CompType)> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.method.locals.get(i).map(|ct| (i, *ct)))
            .and_then(|(i, ct)| Some((Location::Local(u32::try_from(i).ok()?), ct)))
            .ok_or_else(|| pass_error!(NAME, "'{}' names an undeclared local", instr))
    }

    fn arg(&self, index: i64, instr: &CilInstr) -> Result<(Location, CompType)> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.method.signature.arg_type(i).map(|ct| (i, ct)))
            .and_then(|(i, ct)| Some((Location::Arg(u32::try_from(i).ok()?), ct)))
            .ok_or_else(|| pass_error!(NAME, "'{}' names an undeclared argument", instr))
    }

    fn lower(&mut self, instr: &CilInstr, ends_block: bool) -> Result<()> {
        use opcodes::*;

        let code = instr.opcode();
        let index = instr.int_operand();
        let distinct_succs = {
            let mut succs = instr.successor_offsets();
            succs.sort_unstable();
            succs.dedup();
            succs.len()
        };

        match code {
            NOP | BREAK => {}
            LDARG_0..=LDARG_3 | LDARG_S | LDARG => {
                let n = index.unwrap_or_else(|| i64::from(code - LDARG_0));
                let (loc, ct) = self.arg(n, instr)?;
                self.emit(IrOp::Move, vec![Param::read(loc, ct)], vec![push(ct)]);
            }
            STARG_S | STARG => {
                let (loc, ct) = self.arg(index.unwrap_or_default(), instr)?;
                self.emit(IrOp::Move, vec![st(0)], vec![Param::write(loc, ct)]);
            }
            LDLOC_0..=LDLOC_3 | LDLOC_S | LDLOC => {
                let n = index.unwrap_or_else(|| i64::from(code - LDLOC_0));
                let (loc, ct) = self.local(n, instr)?;
                self.emit(IrOp::Move, vec![Param::read(loc, ct)], vec![push(ct)]);
            }
            STLOC_0..=STLOC_3 | STLOC_S | STLOC => {
                let n = index.unwrap_or_else(|| i64::from(code - STLOC_0));
                let (loc, ct) = self.local(n, instr)?;
                self.emit(IrOp::Move, vec![st(0)], vec![Param::write(loc, ct)]);
            }
            LDNULL => self.emit(
                IrOp::Move,
                vec![Param::read(Location::Const(0), CompType::Object)],
                vec![push(CompType::Object)],
            ),
            LDC_I4_M1..=LDC_I4_8 => {
                let value = i64::from(code) - i64::from(LDC_I4_0);
                self.emit(IrOp::Move, vec![int32(value)], vec![push(CompType::Int32)]);
            }
            LDC_I4_S | LDC_I4 => {
                self.emit(
                    IrOp::Move,
                    vec![int32(index.unwrap_or_default())],
                    vec![push(CompType::Int32)],
                );
            }
            LDC_I8 => self.emit(
                IrOp::Move,
                vec![Param::read(
                    Location::Const(index.unwrap_or_default()),
                    CompType::Int64,
                )],
                vec![push(CompType::Int64)],
            ),
            LDC_R4 | LDC_R8 => {
                let value = match instr.operand {
                    Operand::Float32(v) => f64::from(v),
                    Operand::Float64(v) => v,
                    _ => return Err(pass_error!(NAME, "'{}' lacks a float operand", instr)),
                };
                self.emit(IrOp::Move, vec![float_bits(value)], vec![push(CompType::Float)]);
            }
            DUP => self.emit(IrOp::Dup, vec![st(0)], vec![push(CompType::Unknown)]),
            POP => self.emit(IrOp::Pop, vec![st(0)], Vec::new()),
            NEG => self.emit(IrOp::Neg, vec![st(0)], vec![push(CompType::Unknown)]),
            NOT => self.emit(IrOp::Not, vec![st(0)], vec![push(CompType::Unknown)]),
            BR | BR_S => {
                if let (true, Operand::Target(target)) = (ends_block, &instr.operand) {
                    let target = self.block(*target, instr)?;
                    self.insts
                        .push(IrInst::new(IrOp::Br, Vec::new(), Vec::new()).with_targets(vec![target]));
                }
            }
            BRTRUE | BRTRUE_S | BRFALSE | BRFALSE_S => {
                if distinct_succs < 2 {
                    self.emit(IrOp::Pop, vec![st(0)], Vec::new());
                } else if let Operand::Target(target) = &instr.operand {
                    let cc = if matches!(code, BRTRUE | BRTRUE_S) {
                        CondCode::Ne
                    } else {
                        CondCode::Eq
                    };
                    let target = self.block(*target, instr)?;
                    self.insts.push(
                        IrInst::new(IrOp::BrIf(cc), vec![st(0), int32(0)], Vec::new())
                            .with_targets(vec![target]),
                    );
                }
            }
            SWITCH => {
                if distinct_succs < 2 {
                    self.emit(IrOp::Pop, vec![st(0)], Vec::new());
                } else if let Operand::Switch(cases) = &instr.operand {
                    let targets = cases
                        .iter()
                        .map(|offset| self.block(*offset, instr))
                        .collect::<Result<Vec<_>>>()?;
                    self.insts.push(
                        IrInst::new(IrOp::Switch, vec![st(0)], Vec::new()).with_targets(targets),
                    );
                }
            }
            CALL => {
                let token = instr.token().unwrap_or_default();
                let callee = self
                    .registry
                    .resolve(token)
                    .ok_or_else(|| pass_error!(NAME, "unresolved call target 0x{:08x}", token))?
                    .clone();
                let argc = callee.signature.arg_count();
                let uses = (0..argc)
                    .map(|i| {
                        let depth = u32::try_from(argc - 1 - i).unwrap_or(u32::MAX);
                        let ct = callee.signature.arg_type(i).unwrap_or_default();
                        Param::read(Location::Stack(depth), ct)
                    })
                    .collect();
                let defs = callee.signature.ret.map(push).into_iter().collect();
                let mut inst = IrInst::new(IrOp::Call, uses, defs);
                inst.callee = Some(CallSite {
                    token,
                    signature: callee,
                });
                self.insts.push(inst);
            }
            RET => {
                let uses = match self.method.signature.ret {
                    Some(_) => vec![st(0)],
                    None => Vec::new(),
                };
                self.emit(IrOp::Ret, uses, Vec::new());
            }
            _ => {
                if let Some(cc) = branch_cc(code) {
                    if distinct_succs < 2 {
                        self.emit(IrOp::Pop, vec![st(0)], Vec::new());
                        self.emit(IrOp::Pop, vec![st(0)], Vec::new());
                    } else if let Operand::Target(target) = &instr.operand {
                        let target = self.block(*target, instr)?;
                        self.insts.push(
                            IrInst::new(IrOp::BrIf(cc), vec![st(1), st(0)], Vec::new())
                                .with_targets(vec![target]),
                        );
                    }
                } else if let Some(op) = binary_op(code) {
                    let ct = if matches!(op, IrOp::Cmp(_)) {
                        CompType::Int32
                    } else {
                        CompType::Unknown
                    };
                    self.emit(op, vec![st(1), st(0)], vec![push(ct)]);
                } else if let Some(op @ IrOp::Conv { to, .. }) = conversion(code) {
                    self.emit(op, vec![st(0)], vec![push(to)]);
                } else if let Some(op @ IrOp::LoadInd { to, .. }) = indirect_load(code) {
                    self.emit(op, vec![st(0)], vec![push(to)]);
                } else if let Some(width) = indirect_store_width(code) {
                    self.emit(IrOp::StoreInd { width }, vec![st(1), st(0)], Vec::new());
                } else {
                    return Err(pass_error!(NAME, "unsupported instruction '{}'", instr));
                }
            }
        }
        Ok(())
    }
}

impl Pass for LowerToMachineIr {
    fn name(&self) -> &'static str {
        NAME
    }

    fn changes_cfg(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Rewrites bytecode into stack-relative target-independent IR"
    }

    fn run(&self, graph: Graph, _target: &dyn Target) -> Result<Graph> {
        let part = graph.partition()?;
        let Some(&first) = graph.linear_stream().first() else {
            return Err(pass_error!(NAME, "method '{}' has no code", graph.method().name));
        };
        let entry = graph.block_of(first)?;

        let mut block_at = HashMap::new();
        for (id, node) in graph.iter() {
            if let Some(cil) = node.contents.as_cil() {
                block_at.insert(cil.offset, graph.block_of(id)?);
            }
        }

        let mut reachable = BitSet::new(part.len());
        let mut worklist = vec![entry];
        reachable.insert(entry);
        while let Some(b) = worklist.pop() {
            for &succ in part.bbs_after(b) {
                if reachable.insert(succ) {
                    worklist.push(succ);
                }
            }
        }

        let mut lowered: Vec<Option<Vec<IrInst>>> = vec![None; part.len()];
        for b in reachable.iter() {
            let mut block = BlockLowering {
                method: graph.method(),
                registry: &self.registry,
                block_at: &block_at,
                insts: Vec::new(),
            };
            let nodes = part.nodes(b);
            for (k, &id) in nodes.iter().enumerate() {
                let cil = graph
                    .node(id)
                    .contents
                    .as_cil()
                    .ok_or_else(|| pass_error!(NAME, "{} does not hold a bytecode instruction", id))?;
                block.lower(cil, k + 1 == nodes.len())?;
            }
            lowered[b] = Some(block.insts);
        }

        let mut out = graph.successor();
        let enter = IrInst::new(IrOp::Enter, Vec::new(), Vec::new());
        let prologue = if part.bbs_before(entry).is_empty() {
            if let Some(insts) = &mut lowered[entry] {
                insts.insert(0, enter);
            }
            None
        } else {
            Some(out.add_node(NodeContents::Ir(enter)))
        };

        let mut first_node = vec![None; part.len()];
        let mut last_node = vec![None; part.len()];
        for (b, insts) in lowered.into_iter().enumerate() {
            let Some(mut insts) = insts else {
                continue;
            };
            if insts.is_empty() {
                insts.push(IrInst::new(IrOp::Nop, Vec::new(), Vec::new()));
            }
            let region = graph.node(part.bb_start(b)).region;
            let mut prev = None;
            for inst in insts {
                let id = out.add_node(NodeContents::Ir(inst));
                out.set_region(id, region);
                if let Some(prev) = prev {
                    out.add_edge(prev, id);
                } else {
                    first_node[b] = Some(id);
                }
                prev = Some(id);
            }
            last_node[b] = prev;
        }

        let ids: Vec<NodeId> = out.linear_stream().to_vec();
        for id in ids {
            if let Some(inst) = out.contents_mut(id).as_ir_mut() {
                for target in &mut inst.targets {
                    *target = first_node[target.index()].ok_or_else(|| {
                        pass_error!(NAME, "branch into unreachable block {}", target.index())
                    })?;
                }
            }
        }

        if let (Some(prologue), Some(start)) = (prologue, first_node[entry]) {
            out.add_edge(prologue, start);
        }
        for b in reachable.iter() {
            let (Some(from), false) = (last_node[b], part.bbs_after(b).is_empty()) else {
                continue;
            };
            let is_switch = out
                .node(from)
                .contents
                .as_ir()
                .is_some_and(|inst| inst.op == IrOp::Switch);
            for (i, &succ) in part.bbs_after(b).iter().enumerate() {
                let Some(to) = first_node[succ] else {
                    continue;
                };
                if i == 0 && !is_switch {
                    out.add_default_edge(from, to);
                } else {
                    out.add_edge(from, to);
                }
            }
        }

        out.refresh_basic_blocks();
        trace!(
            "'{}': {} of {} blocks reachable, {} IR nodes",
            graph.method().name,
            reachable.count(),
            part.len(),
            out.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cil::{decode_method, OpcodeTable},
        compiler::{CallSignature, MethodSignature},
        file::MethodBody,
        target::Ref64,
        Error,
    };

    fn lower(code: &[u8], method: MethodInfo, registry: CallRegistry) -> Result<Graph> {
        let graph = decode_method(
            &MethodBody::new(code),
            &OpcodeTable::standard(),
            Arc::new(method),
        )?;
        LowerToMachineIr::new(Arc::new(registry)).run(graph, &Ref64::new())
    }

    fn ops(graph: &Graph) -> Vec<String> {
        graph
            .iter()
            .map(|(_, node)| node.contents.as_ir().unwrap().to_string())
            .collect()
    }

    fn int_method(params: usize) -> MethodInfo {
        MethodInfo::new(
            "T.M",
            MethodSignature::new(vec![CompType::Int32; params], Some(CompType::Int32)),
        )
    }

    #[test]
    fn straight_line() {
        // ldarg.0; ldarg.1; add; ret
        let graph = lower(&[0x02, 0x03, 0x58, 0x2A], int_method(2), CallRegistry::new()).unwrap();
        assert_eq!(
            ops(&graph),
            vec![
                "enter",
                "st0:i32 = mov arg0",
                "st0:i32 = mov arg1",
                "st0:? = add st1:?, st0:?",
                "ret st0:?",
            ]
        );
        assert_eq!(graph.partition().unwrap().len(), 1);
    }

    #[test]
    fn conditional_branch_targets_first_node_of_block() {
        // 0: ldarg.0; 1: brfalse.s +2 (-> 5); 3: ldc.i4.1; 4: ret; 5: ldc.i4.0; 6: ret
        let graph = lower(
            &[0x02, 0x2C, 0x02, 0x17, 0x2A, 0x16, 0x2A],
            int_method(1),
            CallRegistry::new(),
        )
        .unwrap();
        let ids = graph.linear_stream().to_vec();
        let branch = graph.node(ids[2]).contents.as_ir().unwrap();
        assert_eq!(branch.op, IrOp::BrIf(CondCode::Eq));
        assert_eq!(branch.targets, vec![ids[5]]);
        assert_eq!(graph.node(ids[2]).next(), &[ids[3], ids[5]]);
    }

    #[test]
    fn loop_header_at_entry_gets_a_prologue() {
        // 0: ldarg.0; 1: brtrue.s -3 (-> 0); 3: ldc.i4.0; 4: ret
        let graph = lower(&[0x02, 0x2D, 0xFD, 0x16, 0x2A], int_method(1), CallRegistry::new())
            .unwrap();
        let ids = graph.linear_stream().to_vec();
        assert_eq!(graph.node(ids[0]).contents.as_ir().unwrap().op, IrOp::Enter);
        assert_eq!(graph.starts(), vec![ids[0]]);
        assert_eq!(graph.node(ids[1]).prev().len(), 2);
    }

    #[test]
    fn unreachable_code_is_dropped() {
        // 0: ldc.i4.0; 1: ret; 2: nop; 3: ret
        let graph = lower(&[0x16, 0x2A, 0x00, 0x2A], int_method(0), CallRegistry::new()).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.starts().len(), 1);
    }

    #[test]
    fn calls_resolve_through_the_registry() {
        let mut registry = CallRegistry::new();
        registry.register(
            0x0A00_0001,
            CallSignature::new(
                "Math.Max",
                MethodSignature::new(vec![CompType::Int32; 2], Some(CompType::Int32)),
            ),
        );
        // ldarg.0; ldarg.1; call Math.Max; ret
        let code = [0x02, 0x03, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A];
        let graph = lower(&code, int_method(2), registry).unwrap();
        assert_eq!(ops(&graph)[3], "st0:i32 = call Math.Max st1:i32, st0:i32");

        let err = lower(&code, int_method(2), CallRegistry::new()).unwrap_err();
        assert!(matches!(err, Error::Pass { pass: NAME, .. }));
    }

    #[test]
    fn checked_arithmetic_is_lowered() {
        // ldarg.0; ldarg.1; add.ovf; ret
        let graph = lower(&[0x02, 0x03, 0xD6, 0x2A], int_method(2), CallRegistry::new()).unwrap();
        assert_eq!(ops(&graph)[3], "st0:? = add.ovf st1:?, st0:?");

        // ldarg.0; conv.ovf.i2; ret
        let graph = lower(&[0x02, 0xB5, 0x2A], int_method(1), CallRegistry::new()).unwrap();
        assert_eq!(ops(&graph)[2], "st0:i32 = conv.ovf.i32.s16 st0:?");

        // ldarg.0; conv.ovf.u1.un; ret
        let graph = lower(&[0x02, 0x86, 0x2A], int_method(1), CallRegistry::new()).unwrap();
        assert_eq!(ops(&graph)[2], "st0:i32 = conv.ovf.i32.u8.un st0:?");
    }

    #[test]
    fn indirect_access_keeps_its_width() {
        let method = MethodInfo::new(
            "T.M",
            MethodSignature::new(vec![CompType::IntPtr, CompType::Int32], Some(CompType::Int32)),
        );
        // ldarg.0; ldind.i4; ret
        let graph = lower(&[0x02, 0x4A, 0x2A], method.clone(), CallRegistry::new()).unwrap();
        assert_eq!(ops(&graph)[2], "st0:i32 = ldind.i32.s32 st0:?");

        // ldarg.0; ldarg.1; stind.i4; ldc.i4.0; ret
        let graph = lower(&[0x02, 0x03, 0x54, 0x16, 0x2A], method, CallRegistry::new()).unwrap();
        assert_eq!(ops(&graph)[3], "stind.32 st1:?, st0:?");
    }

    #[test]
    fn float_constants_carry_their_bits() {
        // ldc.r8 1.0; conv.i4; ret
        let mut code = vec![0x23];
        code.extend_from_slice(&1.0f64.to_le_bytes());
        code.extend_from_slice(&[0x69, 0x2A]);
        let graph = lower(&code, int_method(0), CallRegistry::new()).unwrap();
        let mov = graph.iter().nth(1).unwrap().1.contents.as_ir().unwrap();
        assert_eq!(
            mov.uses[0],
            Param::read(Location::Const(0x3FF0_0000_0000_0000), CompType::Float)
        );
        assert_eq!(mov.defs[0].ct, CompType::Float);
        assert_eq!(ops(&graph)[2], "st0:i32 = conv.i32.s32 st0:?");

        // ldc.r4 1.0 widens to the same double
        let mut code = vec![0x22];
        code.extend_from_slice(&1.0f32.to_le_bytes());
        code.extend_from_slice(&[0x69, 0x2A]);
        let graph = lower(&code, int_method(0), CallRegistry::new()).unwrap();
        let mov = graph.iter().nth(1).unwrap().1.contents.as_ir().unwrap();
        assert_eq!(mov.uses[0].loc, Location::Const(0x3FF0_0000_0000_0000));
    }

    #[test]
    fn object_model_is_rejected() {
        // ldstr 0x70000001; pop; ret
        let code = [0x72, 0x01, 0x00, 0x00, 0x70, 0x26, 0x16, 0x2A];
        let err = lower(&code, int_method(0), CallRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("ldstr"));
    }
}
