//! The opcode table consulted by the decoder.
//!
//! Opcodes are identified by a `u16`: single-byte opcodes by their byte value, two-byte
//! opcodes by `0xFE00 | second_byte`. The `0xFD` lead byte is reserved for implementation
//! specific extension opcodes, which callers register through [`OpcodeTable::builder`]; a
//! table is immutable once built and is shared by reference with every decode.
//!
//! Each entry records the inline operand encoding, the control-flow class used to compute
//! successors, and the evaluation-stack effect.
//!
//! ```rust
//! use cilaot::cil::{opcodes, FlowClass, InlineOperand, OpcodeTable};
//!
//! let table = OpcodeTable::standard();
//! let brtrue = table.get(opcodes::BRTRUE_S).unwrap();
//! assert_eq!(brtrue.mnemonic, "brtrue.s");
//! assert_eq!(brtrue.operand, InlineOperand::ShortBranch);
//! assert_eq!(brtrue.flow, FlowClass::CondBranch);
//! ```

use std::{collections::HashMap, fmt};

use crate::cil::opcodes::*;

/// Encoding of the inline operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineOperand {
    /// No operand.
    None,
    /// Signed 8-bit immediate.
    Int8,
    /// Unsigned 8-bit index.
    UInt8,
    /// Unsigned 16-bit index.
    UInt16,
    /// Signed 32-bit immediate.
    Int32,
    /// Signed 64-bit immediate.
    Int64,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// 32-bit metadata token.
    Token,
    /// 1-byte signed branch delta.
    ShortBranch,
    /// 4-byte signed branch delta.
    Branch,
    /// `u32` count followed by that many 4-byte deltas.
    Switch,
}

impl InlineOperand {
    /// Encoded size in bytes, `None` for the variable-length switch table.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        match self {
            InlineOperand::None => Some(0),
            InlineOperand::Int8 | InlineOperand::UInt8 | InlineOperand::ShortBranch => Some(1),
            InlineOperand::UInt16 => Some(2),
            InlineOperand::Int32
            | InlineOperand::Float32
            | InlineOperand::Token
            | InlineOperand::Branch => Some(4),
            InlineOperand::Int64 | InlineOperand::Float64 => Some(8),
            InlineOperand::Switch => None,
        }
    }
}

/// How an instruction transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FlowClass {
    /// Falls through to the next instruction.
    #[strum(serialize = "next")]
    Next,
    /// A call; falls through once the callee returns.
    #[strum(serialize = "call")]
    Call,
    /// A debugger break; falls through.
    #[strum(serialize = "break")]
    Break,
    /// Unconditional jump to the target.
    #[strum(serialize = "branch")]
    Branch,
    /// Conditional jump: fall-through plus one or more targets.
    #[strum(serialize = "cond-branch")]
    CondBranch,
    /// Leaves the method or handler.
    #[strum(serialize = "return")]
    Return,
    /// Raises an exception.
    #[strum(serialize = "throw")]
    Throw,
}

impl FlowClass {
    /// Returns `true` if execution can continue at the next instruction.
    #[must_use]
    pub fn falls_through(self) -> bool {
        matches!(
            self,
            FlowClass::Next | FlowClass::Call | FlowClass::Break | FlowClass::CondBranch
        )
    }
}

/// Effect of an instruction on the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Pops and pushes a fixed number of values.
    Fixed {
        /// Values consumed
        pops: u8,
        /// Values produced
        pushes: u8,
    },
    /// Depends on a signature (calls and `ret`).
    Variable,
    /// Empties the stack.
    Clear,
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Opcode value, `0xFE00 | b` or `0xFD00 | b` for two-byte forms.
    pub code: u16,
    /// Assembler mnemonic.
    pub mnemonic: &'static str,
    /// Inline operand encoding.
    pub operand: InlineOperand,
    /// Control-flow class.
    pub flow: FlowClass,
    /// Evaluation stack effect.
    pub stack: StackEffect,
}

impl fmt::Display for OpcodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)
    }
}

const fn op(
    code: u16,
    mnemonic: &'static str,
    operand: InlineOperand,
    flow: FlowClass,
    stack: StackEffect,
) -> OpcodeInfo {
    OpcodeInfo {
        code,
        mnemonic,
        operand,
        flow,
        stack,
    }
}

static STANDARD: &[OpcodeInfo] = &[
    op(NOP, "nop", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 0 }),
    op(BREAK, "break", InlineOperand::None, FlowClass::Break, StackEffect::Fixed { pops: 0, pushes: 0 }),
    op(LDARG_0, "ldarg.0", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDARG_1, "ldarg.1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDARG_2, "ldarg.2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDARG_3, "ldarg.3", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDLOC_0, "ldloc.0", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDLOC_1, "ldloc.1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDLOC_2, "ldloc.2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDLOC_3, "ldloc.3", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(STLOC_0, "stloc.0", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(STLOC_1, "stloc.1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(STLOC_2, "stloc.2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(STLOC_3, "stloc.3", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(LDARG_S, "ldarg.s", InlineOperand::UInt8, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDARGA_S, "ldarga.s", InlineOperand::UInt8, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(STARG_S, "starg.s", InlineOperand::UInt8, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(LDLOC_S, "ldloc.s", InlineOperand::UInt8, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDLOCA_S, "ldloca.s", InlineOperand::UInt8, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(STLOC_S, "stloc.s", InlineOperand::UInt8, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(LDNULL, "ldnull", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_M1, "ldc.i4.m1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_0, "ldc.i4.0", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_1, "ldc.i4.1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_2, "ldc.i4.2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_3, "ldc.i4.3", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_4, "ldc.i4.4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_5, "ldc.i4.5", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_6, "ldc.i4.6", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_7, "ldc.i4.7", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_8, "ldc.i4.8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4_S, "ldc.i4.s", InlineOperand::Int8, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I4, "ldc.i4", InlineOperand::Int32, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_I8, "ldc.i8", InlineOperand::Int64, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_R4, "ldc.r4", InlineOperand::Float32, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDC_R8, "ldc.r8", InlineOperand::Float64, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(DUP, "dup", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 2 }),
    op(POP, "pop", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(JMP, "jmp", InlineOperand::Token, FlowClass::Call, StackEffect::Variable),
    op(CALL, "call", InlineOperand::Token, FlowClass::Call, StackEffect::Variable),
    op(CALLI, "calli", InlineOperand::Token, FlowClass::Call, StackEffect::Variable),
    op(RET, "ret", InlineOperand::None, FlowClass::Return, StackEffect::Variable),
    op(BR_S, "br.s", InlineOperand::ShortBranch, FlowClass::Branch, StackEffect::Fixed { pops: 0, pushes: 0 }),
    op(BR, "br", InlineOperand::Branch, FlowClass::Branch, StackEffect::Fixed { pops: 0, pushes: 0 }),
    op(BRFALSE_S, "brfalse.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(BRFALSE, "brfalse", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(BRTRUE_S, "brtrue.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(BRTRUE, "brtrue", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(BEQ_S, "beq.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BEQ, "beq", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGE_S, "bge.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGE, "bge", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGT_S, "bgt.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGT, "bgt", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLE_S, "ble.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLE, "ble", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLT_S, "blt.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLT, "blt", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BNE_UN_S, "bne.un.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BNE_UN, "bne.un", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGE_UN_S, "bge.un.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGE_UN, "bge.un", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGT_UN_S, "bgt.un.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BGT_UN, "bgt.un", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLE_UN_S, "ble.un.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLE_UN, "ble.un", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLT_UN_S, "blt.un.s", InlineOperand::ShortBranch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(BLT_UN, "blt.un", InlineOperand::Branch, FlowClass::CondBranch, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(SWITCH, "switch", InlineOperand::Switch, FlowClass::CondBranch, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(LDIND_I1, "ldind.i1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_U1, "ldind.u1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_I2, "ldind.i2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_U2, "ldind.u2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_I4, "ldind.i4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_U4, "ldind.u4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_I8, "ldind.i8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_I, "ldind.i", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_R4, "ldind.r4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_R8, "ldind.r8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDIND_REF, "ldind.ref", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(STIND_REF, "stind.ref", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(STIND_I1, "stind.i1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(STIND_I2, "stind.i2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(STIND_I4, "stind.i4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(STIND_I8, "stind.i8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(STIND_R4, "stind.r4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(STIND_R8, "stind.r8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(ADD, "add", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(SUB, "sub", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(MUL, "mul", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(DIV, "div", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(DIV_UN, "div.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(REM, "rem", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(REM_UN, "rem.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(AND, "and", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(OR, "or", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(XOR, "xor", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(SHL, "shl", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(SHR, "shr", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(SHR_UN, "shr.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(NEG, "neg", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(NOT, "not", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_I1, "conv.i1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_I2, "conv.i2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_I4, "conv.i4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_I8, "conv.i8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_R4, "conv.r4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_R8, "conv.r8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_U4, "conv.u4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_U8, "conv.u8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CALLVIRT, "callvirt", InlineOperand::Token, FlowClass::Call, StackEffect::Variable),
    op(CPOBJ, "cpobj", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(LDOBJ, "ldobj", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDSTR, "ldstr", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(NEWOBJ, "newobj", InlineOperand::Token, FlowClass::Call, StackEffect::Variable),
    op(CASTCLASS, "castclass", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(ISINST, "isinst", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_R_UN, "conv.r.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(UNBOX, "unbox", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(THROW, "throw", InlineOperand::None, FlowClass::Throw, StackEffect::Clear),
    op(LDFLD, "ldfld", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDFLDA, "ldflda", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(STFLD, "stfld", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(LDSFLD, "ldsfld", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDSFLDA, "ldsflda", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(STSFLD, "stsfld", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(STOBJ, "stobj", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(CONV_OVF_I1_UN, "conv.ovf.i1.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I2_UN, "conv.ovf.i2.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I4_UN, "conv.ovf.i4.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I8_UN, "conv.ovf.i8.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U1_UN, "conv.ovf.u1.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U2_UN, "conv.ovf.u2.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U4_UN, "conv.ovf.u4.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U8_UN, "conv.ovf.u8.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I_UN, "conv.ovf.i.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U_UN, "conv.ovf.u.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(BOX, "box", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(NEWARR, "newarr", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDLEN, "ldlen", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDELEMA, "ldelema", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_I1, "ldelem.i1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_U1, "ldelem.u1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_I2, "ldelem.i2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_U2, "ldelem.u2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_I4, "ldelem.i4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_U4, "ldelem.u4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_I8, "ldelem.i8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_I, "ldelem.i", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_R4, "ldelem.r4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_R8, "ldelem.r8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDELEM_REF, "ldelem.ref", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(STELEM_I, "stelem.i", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_I1, "stelem.i1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_I2, "stelem.i2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_I4, "stelem.i4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_I8, "stelem.i8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_R4, "stelem.r4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_R8, "stelem.r8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(STELEM_REF, "stelem.ref", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(LDELEM, "ldelem", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(STELEM, "stelem", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(UNBOX_ANY, "unbox.any", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I1, "conv.ovf.i1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U1, "conv.ovf.u1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I2, "conv.ovf.i2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U2, "conv.ovf.u2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I4, "conv.ovf.i4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U4, "conv.ovf.u4", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I8, "conv.ovf.i8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U8, "conv.ovf.u8", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(REFANYVAL, "refanyval", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CKFINITE, "ckfinite", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(MKREFANY, "mkrefany", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDTOKEN, "ldtoken", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(CONV_U2, "conv.u2", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_U1, "conv.u1", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_I, "conv.i", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_I, "conv.ovf.i", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(CONV_OVF_U, "conv.ovf.u", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(ADD_OVF, "add.ovf", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(ADD_OVF_UN, "add.ovf.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(MUL_OVF, "mul.ovf", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(MUL_OVF_UN, "mul.ovf.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(SUB_OVF, "sub.ovf", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(SUB_OVF_UN, "sub.ovf.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(ENDFINALLY, "endfinally", InlineOperand::None, FlowClass::Return, StackEffect::Clear),
    op(LEAVE, "leave", InlineOperand::Branch, FlowClass::Branch, StackEffect::Clear),
    op(LEAVE_S, "leave.s", InlineOperand::ShortBranch, FlowClass::Branch, StackEffect::Clear),
    op(STIND_I, "stind.i", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 0 }),
    op(CONV_U, "conv.u", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(ARGLIST, "arglist", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(CEQ, "ceq", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(CGT, "cgt", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(CGT_UN, "cgt.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(CLT, "clt", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(CLT_UN, "clt.un", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 2, pushes: 1 }),
    op(LDFTN, "ldftn", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDVIRTFTN, "ldvirtftn", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(LDARG, "ldarg", InlineOperand::UInt16, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDARGA, "ldarga", InlineOperand::UInt16, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(STARG, "starg", InlineOperand::UInt16, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(LDLOC, "ldloc", InlineOperand::UInt16, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(LDLOCA, "ldloca", InlineOperand::UInt16, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(STLOC, "stloc", InlineOperand::UInt16, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(LOCALLOC, "localloc", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
    op(ENDFILTER, "endfilter", InlineOperand::None, FlowClass::Return, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(INITOBJ, "initobj", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 0 }),
    op(CPBLK, "cpblk", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(INITBLK, "initblk", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 3, pushes: 0 }),
    op(RETHROW, "rethrow", InlineOperand::None, FlowClass::Throw, StackEffect::Clear),
    op(SIZEOF, "sizeof", InlineOperand::Token, FlowClass::Next, StackEffect::Fixed { pops: 0, pushes: 1 }),
    op(REFANYTYPE, "refanytype", InlineOperand::None, FlowClass::Next, StackEffect::Fixed { pops: 1, pushes: 1 }),
];

/// Immutable lookup table from opcode value to [`OpcodeInfo`].
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: HashMap<u16, OpcodeInfo>,
}

impl OpcodeTable {
    /// The standard ECMA-335 instruction set.
    #[must_use]
    pub fn standard() -> Self {
        OpcodeTable::builder().build()
    }

    /// Starts a table from the standard set, to which extension opcodes may be added.
    #[must_use]
    pub fn builder() -> OpcodeTableBuilder {
        OpcodeTableBuilder {
            entries: STANDARD.iter().map(|info| (info.code, *info)).collect(),
        }
    }

    /// Looks up an opcode value.
    #[must_use]
    pub fn get(&self, code: u16) -> Option<&OpcodeInfo> {
        self.entries.get(&code)
    }

    /// Number of known opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        OpcodeTable::standard()
    }
}

/// Builder adding `0xFD`-space extension opcodes to the standard table.
#[derive(Debug, Clone)]
pub struct OpcodeTableBuilder {
    entries: HashMap<u16, OpcodeInfo>,
}

impl OpcodeTableBuilder {
    /// Registers extension opcode `0xFD <second>`, replacing any earlier registration.
    #[must_use]
    pub fn extension(
        mut self,
        second: u8,
        mnemonic: &'static str,
        operand: InlineOperand,
        flow: FlowClass,
        stack: StackEffect,
    ) -> Self {
        let code = (u16::from(VENDOR_PREFIX) << 8) | u16::from(second);
        self.entries
            .insert(code, op(code, mnemonic, operand, flow, stack));
        self
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> OpcodeTable {
        OpcodeTable {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_complete() {
        let table = OpcodeTable::standard();
        assert_eq!(table.len(), STANDARD.len());
        assert_eq!(table.get(NOP).unwrap().mnemonic, "nop");
        assert_eq!(table.get(CEQ).unwrap().code, 0xFE01);
        assert!(table.get(0x24).is_none());
        assert!(table.get(0xFE12).is_none());
    }

    #[test]
    fn switch_and_branches() {
        let table = OpcodeTable::standard();
        let switch = table.get(SWITCH).unwrap();
        assert_eq!(switch.operand, InlineOperand::Switch);
        assert_eq!(switch.operand.size(), None);
        assert_eq!(table.get(BR).unwrap().flow, FlowClass::Branch);
        assert_eq!(table.get(BLT_UN).unwrap().operand.size(), Some(4));
        assert!(!table.get(RET).unwrap().flow.falls_through());
        assert!(table.get(CALL).unwrap().flow.falls_through());
    }

    #[test]
    fn extension_opcodes() {
        let table = OpcodeTable::builder()
            .extension(
                0x01,
                "x.trap",
                InlineOperand::None,
                FlowClass::Throw,
                StackEffect::Clear,
            )
            .build();
        let info = table.get(0xFD01).unwrap();
        assert_eq!(info.mnemonic, "x.trap");
        assert!(OpcodeTable::standard().get(0xFD01).is_none());
    }
}
