//! Bytecode decoding into a control-flow graph.
//!
//! Decoding is a single forward scan over the method body. At every instruction boundary the
//! decoder
//!
//! 1. consumes any number of prefix instructions (`unaligned.`, `volatile.`, `tail.`,
//!    `constrained.`, `no.`, `readonly.`), recording them as flags on the instruction,
//! 2. reads one opcode, either a single byte or a `0xFE`/`0xFD` lead byte plus a second byte,
//! 3. reads the inline operand in the encoding the [`OpcodeTable`] prescribes, and
//! 4. computes successor offsets from the opcode's [`FlowClass`].
//!
//! The graph is then assembled in two steps. First, the predecessor offsets of every target
//! are collected, with duplicates dropped: a `switch` naming the same case target twice yields
//! a single edge. Second, one node is created per instruction and edges are wired in offset
//! order. An edge from an instruction to the instruction physically following it is installed
//! as the *default* edge (position 0 of both edge lists), so the successor at position 0 of a
//! conditional branch is always its fall-through.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilaot::{cil::{BytecodeDecoder, OpcodeTable}, compiler::MethodInfo, file::MethodBody};
//!
//! let table = OpcodeTable::standard();
//! // ldarg.0; brfalse.s +1; nop; ret
//! let code = [0x02, 0x2C, 0x01, 0x00, 0x2A];
//! let graph = BytecodeDecoder::new(&table)
//!     .decode(&MethodBody::new(&code), Arc::new(MethodInfo::default()))?;
//!
//! assert_eq!(graph.len(), 4);
//! assert_eq!(graph.partition()?.len(), 3);
//! # Ok::<(), cilaot::Error>(())
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    cil::{
        opcodes::{
            EXTENDED_PREFIX, PREFIX_CONSTRAINED, PREFIX_NO, PREFIX_READONLY, PREFIX_TAIL,
            PREFIX_UNALIGNED, PREFIX_VOLATILE, VENDOR_PREFIX,
        },
        CilInstr, InlineOperand, OpcodeTable, Operand, Prefixes,
    },
    compiler::MethodInfo,
    file::MethodBody,
    graph::{Graph, NodeContents, NodeId},
    DecodeErrorKind, Result,
};

/// Decodes method bodies against one opcode table.
#[derive(Debug, Clone, Copy)]
pub struct BytecodeDecoder<'t> {
    table: &'t OpcodeTable,
}

impl<'t> BytecodeDecoder<'t> {
    /// Creates a decoder using `table`.
    #[must_use]
    pub fn new(table: &'t OpcodeTable) -> Self {
        BytecodeDecoder { table }
    }

    /// Decodes `body` into a graph of [`NodeContents::Cil`] nodes with basic blocks computed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] for an empty body, an unknown opcode, a truncated
    /// prefix, opcode or operand, or a control transfer that leaves the body or does not land
    /// on an instruction boundary.
    pub fn decode(&self, body: &MethodBody<'_>, method: Arc<MethodInfo>) -> Result<Graph> {
        let instrs = self.decode_instructions(body)?;

        let index: HashMap<usize, usize> = instrs
            .iter()
            .enumerate()
            .map(|(i, instr)| (instr.offset, i))
            .collect();

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); instrs.len()];
        for (i, instr) in instrs.iter().enumerate() {
            for succ in instr.successor_offsets() {
                let target = *index.get(&succ).ok_or(decode_error!(
                    instr.offset,
                    DecodeErrorKind::MisalignedTarget(succ)
                ))?;
                if !preds[target].contains(&i) {
                    preds[target].push(i);
                }
            }
        }

        let layout: Vec<(usize, usize)> = instrs
            .iter()
            .map(|instr| (instr.offset, instr.next_offset))
            .collect();

        let mut graph = Graph::new(method.clone());
        let ids: Vec<NodeId> = instrs
            .into_iter()
            .map(|instr| graph.add_node(NodeContents::Cil(instr)))
            .collect();

        for (target, sources) in preds.iter().enumerate() {
            for &source in sources {
                if layout[source].1 == layout[target].0 {
                    graph.add_default_edge(ids[source], ids[target]);
                } else {
                    graph.add_edge(ids[source], ids[target]);
                }
            }
        }

        for (i, &(offset, _)) in layout.iter().enumerate() {
            let region = method
                .regions
                .iter()
                .position(|r| r.contains(offset))
                .and_then(|r| u32::try_from(r).ok());
            if region.is_some() {
                graph.set_region(ids[i], region);
            }
        }

        graph.refresh_basic_blocks();
        log::debug!(
            "decoded '{}': {} instructions, {} blocks",
            method.name,
            graph.len(),
            graph.partition()?.len()
        );
        Ok(graph)
    }

    /// Decodes every instruction of `body` in offset order without building a graph.
    ///
    /// # Errors
    ///
    /// See [`BytecodeDecoder::decode`]; boundary checks of branch targets are left to the
    /// graph assembly.
    pub fn decode_instructions(&self, body: &MethodBody<'_>) -> Result<Vec<CilInstr>> {
        if body.is_empty() {
            return Err(decode_error!(0, DecodeErrorKind::Empty));
        }

        let mut instrs = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let instr = self.decode_instruction(body, offset)?;
            offset = instr.next_offset;
            instrs.push(instr);
        }
        Ok(instrs)
    }

    /// Decodes the single instruction starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the instruction is malformed or transfers control
    /// outside the body.
    pub fn decode_instruction(&self, body: &MethodBody<'_>, offset: usize) -> Result<CilInstr> {
        let mut pos = offset;
        let mut prefixes = Prefixes::empty();
        let mut alignment = None;
        let mut constrained = None;

        while body.read::<u8>(pos, "opcode")? == EXTENDED_PREFIX {
            match body.read::<u8>(pos + 1, "two-byte opcode")? {
                PREFIX_UNALIGNED => {
                    alignment = Some(body.read::<u8>(pos + 2, "unaligned. prefix")?);
                    prefixes |= Prefixes::UNALIGNED;
                    pos += 3;
                }
                PREFIX_VOLATILE => {
                    prefixes |= Prefixes::VOLATILE;
                    pos += 2;
                }
                PREFIX_TAIL => {
                    prefixes |= Prefixes::TAIL;
                    pos += 2;
                }
                PREFIX_READONLY => {
                    prefixes |= Prefixes::READONLY;
                    pos += 2;
                }
                PREFIX_CONSTRAINED => {
                    constrained = Some(body.read::<u32>(pos + 2, "constrained. prefix")?);
                    prefixes |= Prefixes::CONSTRAINED;
                    pos += 6;
                }
                PREFIX_NO => {
                    let flags = body.read::<u8>(pos + 2, "no. prefix")?;
                    prefixes |= Prefixes::from_no_flags(flags);
                    pos += 3;
                }
                _ => break,
            }
        }

        let opcode_offset = pos;
        let lead = body.read::<u8>(pos, "opcode")?;
        let code = if lead == EXTENDED_PREFIX || lead == VENDOR_PREFIX {
            let second = body.read::<u8>(pos + 1, "two-byte opcode")?;
            pos += 2;
            (u16::from(lead) << 8) | u16::from(second)
        } else {
            pos += 1;
            u16::from(lead)
        };

        let info = *self
            .table
            .get(code)
            .ok_or(decode_error!(opcode_offset, DecodeErrorKind::UnknownOpcode(code)))?;

        let operand = match info.operand {
            InlineOperand::None => Operand::None,
            InlineOperand::Int8 => {
                pos += 1;
                Operand::Int(i64::from(body.read::<i8>(pos - 1, "int8 operand")?))
            }
            InlineOperand::UInt8 => {
                pos += 1;
                Operand::Int(i64::from(body.read::<u8>(pos - 1, "uint8 operand")?))
            }
            InlineOperand::UInt16 => {
                pos += 2;
                Operand::Int(i64::from(body.read::<u16>(pos - 2, "uint16 operand")?))
            }
            InlineOperand::Int32 => {
                pos += 4;
                Operand::Int(i64::from(body.read::<i32>(pos - 4, "int32 operand")?))
            }
            InlineOperand::Int64 => {
                pos += 8;
                Operand::Int(body.read::<i64>(pos - 8, "int64 operand")?)
            }
            InlineOperand::Float32 => {
                pos += 4;
                Operand::Float32(f32::from_bits(body.read::<u32>(pos - 4, "float32 operand")?))
            }
            InlineOperand::Float64 => {
                pos += 8;
                Operand::Float64(f64::from_bits(body.read::<u64>(pos - 8, "float64 operand")?))
            }
            InlineOperand::Token => {
                pos += 4;
                Operand::Token(body.read::<u32>(pos - 4, "token operand")?)
            }
            InlineOperand::ShortBranch => {
                pos += 1;
                let delta = i64::from(body.read::<i8>(pos - 1, "branch delta")?);
                Operand::Target(resolve_target(body, offset, pos, delta)?)
            }
            InlineOperand::Branch => {
                pos += 4;
                let delta = i64::from(body.read::<i32>(pos - 4, "branch delta")?);
                Operand::Target(resolve_target(body, offset, pos, delta)?)
            }
            InlineOperand::Switch => {
                let count = body.read::<u32>(pos, "switch count")? as usize;
                let table_start = pos + 4;
                let end = count
                    .checked_mul(4)
                    .and_then(|len| len.checked_add(table_start))
                    .filter(|end| *end <= body.len())
                    .ok_or(decode_error!(offset, DecodeErrorKind::Truncated("switch table")))?;

                let mut targets = Vec::with_capacity(count);
                for case in 0..count {
                    let delta = i64::from(body.read::<i32>(table_start + case * 4, "switch table")?);
                    targets.push(resolve_target(body, offset, end, delta)?);
                }
                pos = end;
                Operand::Switch(targets)
            }
        };

        if info.flow.falls_through() && pos >= body.len() {
            return Err(decode_error!(
                offset,
                DecodeErrorKind::TargetOutOfRange {
                    target: pos as i64,
                    len: body.len(),
                }
            ));
        }

        Ok(CilInstr {
            offset,
            opcode_offset,
            next_offset: pos,
            info,
            prefixes,
            alignment,
            constrained,
            operand,
        })
    }
}

/// Convenience wrapper around [`BytecodeDecoder::decode`].
///
/// # Errors
///
/// See [`BytecodeDecoder::decode`].
pub fn decode_method(
    body: &MethodBody<'_>,
    table: &OpcodeTable,
    method: Arc<MethodInfo>,
) -> Result<Graph> {
    BytecodeDecoder::new(table).decode(body, method)
}

fn resolve_target(body: &MethodBody<'_>, offset: usize, next: usize, delta: i64) -> Result<usize> {
    let target = next as i64 + delta;
    if target < 0 || target >= body.len() as i64 {
        return Err(decode_error!(
            offset,
            DecodeErrorKind::TargetOutOfRange {
                target,
                len: body.len(),
            }
        ));
    }
    Ok(target as usize)
}
