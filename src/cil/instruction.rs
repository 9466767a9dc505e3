//! Decoded bytecode instructions.

use std::fmt;

use bitflags::bitflags;

use crate::cil::{FlowClass, OpcodeInfo};

bitflags! {
    /// Prefix instructions seen in front of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Prefixes: u16 {
        /// `unaligned.` - the alignment is in [`CilInstr::alignment`]
        const UNALIGNED = 0x0001;
        /// `volatile.`
        const VOLATILE = 0x0002;
        /// `tail.`
        const TAIL = 0x0004;
        /// `constrained.` - the type token is in [`CilInstr::constrained`]
        const CONSTRAINED = 0x0008;
        /// `readonly.`
        const READONLY = 0x0010;
        /// `no. typecheck`
        const NO_TYPECHECK = 0x0020;
        /// `no. rangecheck`
        const NO_RANGECHECK = 0x0040;
        /// `no. nullcheck`
        const NO_NULLCHECK = 0x0080;
    }
}

impl Prefixes {
    /// Translates the flag byte of a `no.` prefix.
    #[must_use]
    pub fn from_no_flags(flags: u8) -> Self {
        let mut result = Prefixes::empty();
        if flags & 0x01 != 0 {
            result |= Prefixes::NO_TYPECHECK;
        }
        if flags & 0x02 != 0 {
            result |= Prefixes::NO_RANGECHECK;
        }
        if flags & 0x04 != 0 {
            result |= Prefixes::NO_NULLCHECK;
        }
        result
    }
}

/// The decoded inline operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// Integer immediate or local/argument index.
    Int(i64),
    /// 32-bit float immediate.
    Float32(f32),
    /// 64-bit float immediate.
    Float64(f64),
    /// Metadata token.
    Token(u32),
    /// Absolute branch target offset.
    Target(usize),
    /// Absolute case target offsets of a `switch`.
    Switch(Vec<usize>),
}

/// One decoded CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct CilInstr {
    /// Offset of the first byte (including prefixes) in the method body.
    pub offset: usize,
    /// Offset of the opcode itself, after any prefixes.
    pub opcode_offset: usize,
    /// Offset of the following instruction.
    pub next_offset: usize,
    /// Static opcode description.
    pub info: OpcodeInfo,
    /// Prefixes applied to this instruction.
    pub prefixes: Prefixes,
    /// Alignment given by an `unaligned.` prefix.
    pub alignment: Option<u8>,
    /// Type token given by a `constrained.` prefix.
    pub constrained: Option<u32>,
    /// Decoded inline operand.
    pub operand: Operand,
}

impl CilInstr {
    /// The opcode value.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        self.info.code
    }

    /// Successor offsets in control-flow order.
    ///
    /// Conditional branches list the fall-through first and then the target; a `switch` lists
    /// its case targets first and the fall-through last. Unconditional branches list only the
    /// target, returns and throws list nothing.
    #[must_use]
    pub fn successor_offsets(&self) -> Vec<usize> {
        match (self.info.flow, &self.operand) {
            (FlowClass::Next | FlowClass::Call | FlowClass::Break, _) => vec![self.next_offset],
            (FlowClass::Branch, Operand::Target(target)) => vec![*target],
            (FlowClass::CondBranch, Operand::Switch(targets)) => {
                let mut succs = targets.clone();
                succs.push(self.next_offset);
                succs
            }
            (FlowClass::CondBranch, Operand::Target(target)) => vec![self.next_offset, *target],
            _ => Vec::new(),
        }
    }

    /// The integer operand, if any.
    #[must_use]
    pub fn int_operand(&self) -> Option<i64> {
        match self.operand {
            Operand::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<u32> {
        match self.operand {
            Operand::Token(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for CilInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: ", self.offset)?;
        for (flag, name) in [
            (Prefixes::VOLATILE, "volatile. "),
            (Prefixes::TAIL, "tail. "),
            (Prefixes::READONLY, "readonly. "),
            (Prefixes::UNALIGNED, "unaligned. "),
            (Prefixes::CONSTRAINED, "constrained. "),
        ] {
            if self.prefixes.contains(flag) {
                f.write_str(name)?;
            }
        }
        f.write_str(self.info.mnemonic)?;

        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(v) => write!(f, " {v}"),
            Operand::Float32(v) => write!(f, " {v}"),
            Operand::Float64(v) => write!(f, " {v}"),
            Operand::Token(t) => write!(f, " 0x{t:08x}"),
            Operand::Target(t) => write!(f, " IL_{t:04x}"),
            Operand::Switch(targets) => {
                let labels: Vec<String> = targets.iter().map(|t| format!("IL_{t:04x}")).collect();
                write!(f, " ({})", labels.join(", "))
            }
        }
    }
}
