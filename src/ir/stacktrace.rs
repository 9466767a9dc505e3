//! Evaluation stack resolution.

use log::trace;

use crate::{
    compiler::Pass,
    graph::{Graph, NodeContents, NodeId},
    ir::{CompType, IrInst, IrOp, Location, Param},
    target::Target,
    Result,
};

const NAME: &str = "stack-trace";

/// One stack entry: the virtual register holding it and its type.
type Slot = (u32, CompType);

/// Replaces every `Stack` operand by a virtual register.
///
/// Blocks are walked from the entry blocks with the stack contents known at their start.
/// Reads of `Stack(k)` become the register `k` slots below the top and pop it; each pushed
/// value gets a fresh register. `dup` turns into a move and `pop` into a `nop`.
///
/// The first predecessor to reach a block fixes the registers the block expects on its stack.
/// Every other predecessor whose stack holds different registers gets moves into the expected
/// ones appended, ahead of its closing branch. Stacks of different depths or with different
/// types at a join are rejected, as is a stack underflow or a `ret` that leaves values behind.
pub struct StackTrace;

fn resolve(inst: &mut IrInst, stack: &mut Vec<Slot>, next_vreg: &mut u32) -> Result<()> {
    let depth = stack.len();
    let mut popped = 0;
    for param in &mut inst.uses {
        let Location::Stack(k) = param.loc else {
            continue;
        };
        let k = k as usize;
        let Some(&(vreg, ct)) = depth.checked_sub(k + 1).and_then(|i| stack.get(i)) else {
            return Err(pass_error!(
                NAME,
                "stack underflow at '{}': needs {} values, has {}",
                inst.op,
                k + 1,
                depth
            ));
        };
        param.loc = Location::VReg(vreg);
        param.ct = ct;
        popped = popped.max(k + 1);
    }
    if inst.op != IrOp::Dup {
        stack.truncate(depth - popped);
    }

    let operand = |i: usize| inst.uses.get(i).map(|p| p.ct).unwrap_or_default();
    let result = match inst.op {
        IrOp::Move | IrOp::Dup | IrOp::Neg | IrOp::Not | IrOp::Shl | IrOp::Shr | IrOp::ShrUn => {
            operand(0)
        }
        op if op.is_binary() => operand(0).binary_result(operand(1)),
        _ => CompType::Unknown,
    };

    for param in &mut inst.defs {
        match param.loc {
            Location::Stack(0) => {}
            Location::Stack(k) => {
                return Err(pass_error!(NAME, "'{}' writes below the top of stack ({})", inst.op, k));
            }
            _ => continue,
        }
        if param.ct == CompType::Unknown {
            param.ct = result;
        }
        param.loc = Location::VReg(*next_vreg);
        stack.push((*next_vreg, param.ct));
        *next_vreg += 1;
    }

    match inst.op {
        IrOp::Dup => inst.op = IrOp::Move,
        IrOp::Pop => {
            inst.op = IrOp::Nop;
            inst.uses.clear();
        }
        IrOp::Ret if !stack.is_empty() => {
            return Err(pass_error!(NAME, "{} values left on the stack at return", stack.len()));
        }
        _ => {}
    }
    Ok(())
}

fn reconcile(arriving: &[Slot], expected: &[Slot], from: usize, to: usize) -> Result<Vec<IrInst>> {
    if arriving.len() != expected.len() {
        return Err(pass_error!(
            NAME,
            "stack depth mismatch on edge bb{} -> bb{}: {} vs {}",
            from,
            to,
            arriving.len(),
            expected.len()
        ));
    }

    let mut moves = Vec::new();
    for (depth, (&(src, src_ct), &(dst, dst_ct))) in arriving.iter().zip(expected).enumerate() {
        if src_ct != dst_ct {
            return Err(pass_error!(
                NAME,
                "stack type mismatch at depth {} on edge bb{} -> bb{}: {} vs {}",
                depth,
                from,
                to,
                src_ct,
                dst_ct
            ));
        }
        if src != dst {
            moves.push(IrInst::new(
                IrOp::Move,
                vec![Param::read(Location::VReg(src), src_ct)],
                vec![Param::write(Location::VReg(dst), dst_ct)],
            ));
        }
    }
    Ok(moves)
}

impl Pass for StackTrace {
    fn name(&self) -> &'static str {
        NAME
    }

    fn changes_cfg(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Resolves evaluation stack operands to virtual registers"
    }

    fn run(&self, mut graph: Graph, _target: &dyn Target) -> Result<Graph> {
        let part = graph.partition()?.clone();
        let mut entry_state: Vec<Option<Vec<Slot>>> = vec![None; part.len()];
        let mut worklist = Vec::new();
        for &b in part.entries() {
            entry_state[b] = Some(Vec::new());
            worklist.push(b);
        }

        let mut next_vreg = graph.next_vreg;
        let mut fixups: Vec<(usize, Vec<IrInst>)> = Vec::new();
        while let Some(b) = worklist.pop() {
            let mut stack = entry_state[b].clone().unwrap_or_default();
            for &id in part.nodes(b) {
                let inst = graph
                    .contents_mut(id)
                    .as_ir_mut()
                    .ok_or_else(|| pass_error!(NAME, "{} does not hold an IR instruction", id))?;
                resolve(inst, &mut stack, &mut next_vreg)?;
            }

            let mut seen = Vec::new();
            for &succ in part.bbs_after(b) {
                if seen.contains(&succ) {
                    continue;
                }
                seen.push(succ);
                match &entry_state[succ] {
                    None => {
                        entry_state[succ] = Some(stack.clone());
                        worklist.push(succ);
                    }
                    Some(expected) => {
                        let moves = reconcile(&stack, expected, b, succ)?;
                        if !moves.is_empty() {
                            fixups.push((b, moves));
                        }
                    }
                }
            }
        }
        graph.next_vreg = next_vreg;

        if let Some(b) = entry_state.iter().position(Option::is_none) {
            return Err(pass_error!(NAME, "bb{} is not reachable from an entry block", b));
        }

        let mut tails: Vec<NodeId> = (0..part.len()).map(|b| part.bb_end(b)).collect();
        let inserted: usize = fixups.iter().map(|(_, moves)| moves.len()).sum();
        for (b, moves) in fixups {
            let closes = graph
                .node(tails[b])
                .contents
                .as_ir()
                .is_some_and(|inst| inst.op.is_terminator());
            for mv in moves {
                if closes {
                    tails[b] = graph.insert_before(tails[b], NodeContents::Ir(mv));
                } else {
                    tails[b] = graph.insert_after(tails[b], NodeContents::Ir(mv));
                }
            }
        }

        graph.refresh_basic_blocks();
        trace!(
            "'{}': {} virtual registers, {} join moves",
            graph.method().name,
            graph.next_vreg,
            inserted
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        cil::{decode_method, OpcodeTable},
        compiler::{CallRegistry, MethodInfo, MethodSignature},
        file::MethodBody,
        ir::LowerToMachineIr,
        target::Ref64,
        Error,
    };

    fn trace_stack(code: &[u8], params: usize, ret: Option<CompType>) -> Result<Graph> {
        let method = MethodInfo::new(
            "T.M",
            MethodSignature::new(vec![CompType::Int32; params], ret),
        );
        let graph = decode_method(
            &MethodBody::new(code),
            &OpcodeTable::standard(),
            Arc::new(method),
        )?;
        let target = Ref64::new();
        let graph = LowerToMachineIr::new(Arc::new(CallRegistry::new())).run(graph, &target)?;
        StackTrace.run(graph, &target)
    }

    fn insts(graph: &Graph) -> Vec<IrInst> {
        graph
            .iter()
            .map(|(_, node)| node.contents.as_ir().unwrap().clone())
            .collect()
    }

    #[test]
    fn dup_becomes_a_move() {
        // ldarg.0; dup; add; ret
        let graph = trace_stack(&[0x02, 0x25, 0x58, 0x2A], 1, Some(CompType::Int32)).unwrap();
        let text: Vec<String> = insts(&graph).iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            vec![
                "enter",
                "v0:i32 = mov arg0",
                "v1:i32 = mov v0:i32",
                "v2:i32 = add v0:i32, v1:i32",
                "ret v2:i32",
            ]
        );
        assert_eq!(graph.next_vreg, 3);
    }

    #[test]
    fn joins_get_reconciling_moves() {
        // 0: ldarg.0; 1: brtrue.s L1 (6); 3: ldc.i4.1; 4: br.s L2 (7); 6: L1: ldc.i4.2; 7: L2: ret
        let code = [0x02, 0x2D, 0x03, 0x17, 0x2B, 0x01, 0x18, 0x2A];
        let graph = trace_stack(&code, 1, Some(CompType::Int32)).unwrap();
        let insts = insts(&graph);

        let ret = insts.iter().find(|i| i.op == IrOp::Ret).unwrap();
        let returned = ret.uses[0].loc.clone();
        let copies: Vec<&IrInst> = insts
            .iter()
            .filter(|i| i.op == IrOp::Move && i.uses[0].loc.vreg().is_some())
            .collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].defs[0].loc, returned);

        // the copy runs before the branch that closes its block
        let ids = graph.linear_stream();
        let br = ids
            .iter()
            .position(|id| graph.node(*id).contents.as_ir().unwrap().op == IrOp::Br)
            .unwrap();
        assert_eq!(
            graph.node(ids[br - 1]).contents.as_ir().unwrap().op,
            IrOp::Move
        );
        assert!(graph.partition().is_ok());
    }

    #[test]
    fn underflow_is_rejected() {
        // pop; ret
        let err = trace_stack(&[0x26, 0x2A], 0, None).unwrap_err();
        assert!(matches!(err, Error::Pass { pass: NAME, .. }));
        assert!(err.to_string().contains("underflow"));
    }

    #[test]
    fn depth_mismatch_is_rejected() {
        // 0: ldarg.0; 1: brtrue.s 4; 3: ldc.i4.1; 4: ret
        let err = trace_stack(&[0x02, 0x2D, 0x01, 0x17, 0x2A], 1, None).unwrap_err();
        assert!(matches!(err, Error::Pass { pass: NAME, .. }));
    }

    #[test]
    fn pop_becomes_nop() {
        // ldarg.0; pop; ret
        let graph = trace_stack(&[0x02, 0x26, 0x2A], 1, None).unwrap();
        let nop = &insts(&graph)[2];
        assert_eq!(nop.op, IrOp::Nop);
        assert!(nop.uses.is_empty());
    }
}
