//! `ref64`, a reference 64-bit target.
//!
//! A three-address register machine with eight general purpose registers, a stack pointer
//! and a frame pointer. Every operand slot accepts a register, an immediate or a frame
//! slot, so spilled values need no reload code.
//!
//! Registers are 64 bits wide and hold integers and IEEE double bit patterns alike; the
//! `f*` instructions interpret their operands as doubles. The `*o` arithmetic and `exto`
//! trap when the result does not fit. Loads, stores and extensions carry an access width in
//! bytes, where 0 stands for the pointer size.
//!
//! # Calling convention
//!
//! | Item              | Location                                  |
//! |-------------------|-------------------------------------------|
//! | Arguments 0-3     | `r0`-`r3`                                 |
//! | Arguments 4+      | caller frame at `fp + 16 + 8 * (i - 4)`   |
//! | Return value      | `r0`                                      |
//! | Caller-saved      | `r0`-`r3`                                 |
//! | Callee-saved      | `r4`, `r5`                                |
//! | Allocatable       | `r0`-`r5`                                 |
//! | Reserved          | `r6`, `r7` (scratch), `sp`, `fp`          |
//!
//! Instructions are encoded by [`Ref64Encode`], see there for the format.

mod encode;

pub use encode::Ref64Encode;

use crate::{
    compiler::{MethodInfo, Pass},
    emit::RelocKind,
    graph::NodeId,
    ir::{CompType, IrInst, IrOp, Location, Param},
    target::{ArgLocation, MachineOp, McInst, Reg, Target},
    Result,
};

const NAME: &str = "ref64";

pub(crate) const NOP: u16 = 0x00;
pub(crate) const MOV: u16 = 0x01;
pub(crate) const ADD: u16 = 0x02;
pub(crate) const SUB: u16 = 0x03;
pub(crate) const MUL: u16 = 0x04;
pub(crate) const DIV: u16 = 0x05;
pub(crate) const DIVU: u16 = 0x06;
pub(crate) const REM: u16 = 0x07;
pub(crate) const REMU: u16 = 0x08;
pub(crate) const AND: u16 = 0x09;
pub(crate) const OR: u16 = 0x0A;
pub(crate) const XOR: u16 = 0x0B;
pub(crate) const SHL: u16 = 0x0C;
pub(crate) const SHR: u16 = 0x0D;
pub(crate) const SHRU: u16 = 0x0E;
pub(crate) const NEG: u16 = 0x0F;
pub(crate) const NOT: u16 = 0x10;
pub(crate) const EXT: u16 = 0x11;
pub(crate) const SETCC: u16 = 0x12;
pub(crate) const JMP: u16 = 0x13;
pub(crate) const JCC: u16 = 0x14;
pub(crate) const SWITCH: u16 = 0x15;
pub(crate) const OUTARG: u16 = 0x16;
pub(crate) const CALL: u16 = 0x17;
pub(crate) const RET: u16 = 0x18;
pub(crate) const ENTER: u16 = 0x19;
pub(crate) const LEAVE: u16 = 0x1A;
pub(crate) const ADDO: u16 = 0x1B;
pub(crate) const ADDOU: u16 = 0x1C;
pub(crate) const SUBO: u16 = 0x1D;
pub(crate) const SUBOU: u16 = 0x1E;
pub(crate) const MULO: u16 = 0x1F;
pub(crate) const MULOU: u16 = 0x20;
pub(crate) const EXTO: u16 = 0x21;
pub(crate) const LOAD: u16 = 0x22;
pub(crate) const STORE: u16 = 0x23;
pub(crate) const FADD: u16 = 0x24;
pub(crate) const FSUB: u16 = 0x25;
pub(crate) const FMUL: u16 = 0x26;
pub(crate) const FDIV: u16 = 0x27;
pub(crate) const FREM: u16 = 0x28;
pub(crate) const FNEG: u16 = 0x29;
pub(crate) const FSETCC: u16 = 0x2A;
pub(crate) const FJCC: u16 = 0x2B;
pub(crate) const CVTIF: u16 = 0x2C;
pub(crate) const CVTFI: u16 = 0x2D;
pub(crate) const CVTFF: u16 = 0x2E;
pub(crate) const LOADF: u16 = 0x2F;
pub(crate) const STOREF: u16 = 0x30;

/// Relocation type numbers.
pub(crate) const R_REF64_CALL32: u32 = 1;
pub(crate) const R_REF64_PC32: u32 = 2;
pub(crate) const R_REF64_ABS64: u32 = 3;

const R0: Reg = Reg::new(0, "r0");

static REGISTERS: [Reg; 10] = [
    R0,
    Reg::new(1, "r1"),
    Reg::new(2, "r2"),
    Reg::new(3, "r3"),
    Reg::new(4, "r4"),
    Reg::new(5, "r5"),
    Reg::new(6, "r6"),
    Reg::new(7, "r7"),
    Reg::new(8, "sp"),
    Reg::new(9, "fp"),
];

const ARG_REGS: usize = 4;

/// The reference target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ref64;

impl Ref64 {
    /// Creates the target descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Ref64
    }

    /// Mnemonic of a `ref64` opcode.
    #[must_use]
    pub fn mnemonic(code: u16) -> &'static str {
        match code {
            NOP => "nop",
            MOV => "mov",
            ADD => "add",
            SUB => "sub",
            MUL => "mul",
            DIV => "div",
            DIVU => "divu",
            REM => "rem",
            REMU => "remu",
            AND => "and",
            OR => "or",
            XOR => "xor",
            SHL => "shl",
            SHR => "shr",
            SHRU => "shru",
            NEG => "neg",
            NOT => "not",
            EXT => "ext",
            SETCC => "setcc",
            JMP => "jmp",
            JCC => "jcc",
            SWITCH => "switch",
            OUTARG => "outarg",
            CALL => "call",
            RET => "ret",
            ENTER => "enter",
            LEAVE => "leave",
            ADDO => "addo",
            ADDOU => "addou",
            SUBO => "subo",
            SUBOU => "subou",
            MULO => "mulo",
            MULOU => "mulou",
            EXTO => "exto",
            LOAD => "ld",
            STORE => "st",
            FADD => "fadd",
            FSUB => "fsub",
            FMUL => "fmul",
            FDIV => "fdiv",
            FREM => "frem",
            FNEG => "fneg",
            FSETCC => "fsetcc",
            FJCC => "fjcc",
            CVTIF => "cvtif",
            CVTFI => "cvtfi",
            CVTFF => "cvtff",
            LOADF => "ldf",
            STOREF => "stf",
            _ => "???",
        }
    }

    fn inst(code: u16, params: Vec<Param>) -> McInst {
        McInst::target(code, Self::mnemonic(code), params)
    }

    fn lower_call(&self, inst: &IrInst) -> Result<Vec<McInst>> {
        let callee = inst
            .callee
            .as_ref()
            .ok_or_else(|| pass_error!(NAME, "call without a resolved callee"))?;

        let mut out = vec![McInst::pseudo(MachineOp::PreCall, Vec::new())];
        let mut call = vec![Param::other(Location::CallToken(callee.token))];
        for (i, arg) in inst.uses.iter().enumerate() {
            match self.incoming_arg(i) {
                ArgLocation::Reg(reg) => {
                    out.push(self.move_inst(Location::MReg(reg), arg.loc.clone(), arg.ct));
                    call.push(Param::read(Location::MReg(reg), arg.ct));
                }
                ArgLocation::Stack(offset) => out.push(Self::inst(
                    OUTARG,
                    vec![Param::other(Location::Const(i64::from(offset))), arg.clone()],
                )),
            }
        }

        let result = inst.defs.first();
        if let Some(def) = result {
            call.push(Param::write(Location::MReg(R0), def.ct));
        }
        out.push(Self::inst(CALL, call));
        if let Some(def) = result {
            out.push(self.move_inst(def.loc.clone(), Location::MReg(R0), def.ct));
        }
        out.push(McInst::pseudo(MachineOp::PostCall, Vec::new()));
        Ok(out)
    }

    fn lower_ret(&self, inst: &IrInst) -> Vec<McInst> {
        let mut out = Vec::new();
        let mut ret = Vec::new();
        if let Some(value) = inst.uses.first() {
            out.push(self.move_inst(Location::MReg(R0), value.loc.clone(), value.ct));
            ret.push(Param::read(Location::MReg(R0), value.ct));
        }
        out.push(McInst::pseudo(MachineOp::RestoreCalleePreserves, Vec::new()));
        out.push(Self::inst(LEAVE, Vec::new()));
        out.push(Self::inst(RET, ret));
        out
    }
}

fn operand(list: &[Param], index: usize, inst: &IrInst) -> Result<Param> {
    list.get(index)
        .cloned()
        .ok_or_else(|| pass_error!(NAME, "'{}' is missing operand {}", inst, index))
}

fn target_of(inst: &IrInst, index: usize) -> Result<Param> {
    inst.targets
        .get(index)
        .map(|t| Param::other(Location::Block(*t)))
        .ok_or_else(|| pass_error!(NAME, "'{}' has no branch target", inst))
}

fn binary_code(op: IrOp) -> Option<u16> {
    Some(match op {
        IrOp::Add => ADD,
        IrOp::Sub => SUB,
        IrOp::Mul => MUL,
        IrOp::Div => DIV,
        IrOp::DivUn => DIVU,
        IrOp::Rem => REM,
        IrOp::RemUn => REMU,
        IrOp::And => AND,
        IrOp::Or => OR,
        IrOp::Xor => XOR,
        IrOp::Shl => SHL,
        IrOp::Shr => SHR,
        IrOp::ShrUn => SHRU,
        IrOp::AddOvf { unsigned: false } => ADDO,
        IrOp::AddOvf { unsigned: true } => ADDOU,
        IrOp::SubOvf { unsigned: false } => SUBO,
        IrOp::SubOvf { unsigned: true } => SUBOU,
        IrOp::MulOvf { unsigned: false } => MULO,
        IrOp::MulOvf { unsigned: true } => MULOU,
        _ => return None,
    })
}

fn float_code(op: IrOp) -> Option<u16> {
    Some(match op {
        IrOp::Add => FADD,
        IrOp::Sub => FSUB,
        IrOp::Mul => FMUL,
        IrOp::Div => FDIV,
        IrOp::Rem => FREM,
        _ => return None,
    })
}

fn imm(value: impl Into<i64>) -> Param {
    Param::other(Location::Const(value.into()))
}

impl Target for Ref64 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn pointer_size(&self) -> u32 {
        8
    }

    fn registers(&self) -> &[Reg] {
        &REGISTERS
    }

    fn allocatable(&self) -> &[Reg] {
        &REGISTERS[..6]
    }

    fn caller_saved(&self) -> &[Reg] {
        &REGISTERS[..4]
    }

    fn callee_saved(&self) -> &[Reg] {
        &REGISTERS[4..6]
    }

    fn incoming_arg(&self, index: usize) -> ArgLocation {
        if index < ARG_REGS {
            ArgLocation::Reg(REGISTERS[index])
        } else {
            let slot = i32::try_from(index - ARG_REGS).unwrap_or(i32::MAX);
            ArgLocation::Stack(slot.saturating_mul(8).saturating_add(16))
        }
    }

    fn lower(&self, inst: &IrInst, _method: &MethodInfo) -> Result<Vec<McInst>> {
        let def = |i| operand(&inst.defs, i, inst);
        let use_ = |i| operand(&inst.uses, i, inst);

        Ok(match inst.op {
            IrOp::Enter => vec![
                McInst::pseudo(MachineOp::SetupStack, Vec::new()),
                McInst::pseudo(MachineOp::SaveCalleePreserves, Vec::new()),
            ],
            IrOp::Nop | IrOp::Pop => Vec::new(),
            IrOp::Dup => {
                return Err(pass_error!(NAME, "stack operation '{}' reached selection", inst))
            }
            IrOp::Move => {
                let (dst, src) = (def(0)?, use_(0)?);
                vec![self.move_inst(dst.loc, src.loc, dst.ct)]
            }
            op if op.is_binary() => {
                let dst = def(0)?;
                let code = if dst.ct == CompType::Float {
                    float_code(op)
                } else {
                    binary_code(op)
                };
                let code = code
                    .ok_or_else(|| pass_error!(NAME, "no {} form of '{}'", dst.ct, op))?;
                vec![Self::inst(code, vec![dst, use_(0)?, use_(1)?])]
            }
            IrOp::Neg => {
                let src = use_(0)?;
                let code = if src.ct == CompType::Float { FNEG } else { NEG };
                vec![Self::inst(code, vec![def(0)?, src])]
            }
            IrOp::Not => {
                let src = use_(0)?;
                if src.ct == CompType::Float {
                    return Err(pass_error!(NAME, "bitwise '{}' of a float", inst));
                }
                vec![Self::inst(NOT, vec![def(0)?, src])]
            }
            IrOp::Conv {
                to,
                width,
                signed,
                checked,
                from_unsigned,
            } => {
                let (dst, src) = (def(0)?, use_(0)?);
                let from_float = src.ct == CompType::Float;
                let (code, extra) = match (to == CompType::Float, from_float) {
                    (true, true) => (CVTFF, vec![imm(width)]),
                    (true, false) => (CVTIF, vec![imm(from_unsigned)]),
                    (false, true) => (CVTFI, vec![imm(width), imm(signed), imm(checked)]),
                    (false, false) => (
                        if checked { EXTO } else { EXT },
                        vec![imm(width), imm(signed), imm(from_unsigned)],
                    ),
                };
                let mut params = vec![dst, src];
                params.extend(extra);
                vec![Self::inst(code, params)]
            }
            IrOp::LoadInd { width, signed, .. } => {
                let dst = def(0)?;
                if dst.ct == CompType::Float {
                    vec![Self::inst(LOADF, vec![dst, use_(0)?, imm(width)])]
                } else {
                    vec![Self::inst(LOAD, vec![dst, use_(0)?, imm(width), imm(signed)])]
                }
            }
            IrOp::StoreInd { width } => {
                let value = use_(1)?;
                let code = if value.ct == CompType::Float { STOREF } else { STORE };
                vec![Self::inst(code, vec![use_(0)?, value, imm(width)])]
            }
            IrOp::Cmp(cc) => {
                let (a, b) = (use_(0)?, use_(1)?);
                let code = if a.ct == CompType::Float || b.ct == CompType::Float {
                    FSETCC
                } else {
                    SETCC
                };
                vec![Self::inst(code, vec![def(0)?, Param::other(Location::Cond(cc)), a, b])]
            }
            IrOp::Br => vec![Self::inst(JMP, vec![target_of(inst, 0)?])],
            IrOp::BrIf(cc) => {
                let (a, b) = (use_(0)?, use_(1)?);
                let code = if a.ct == CompType::Float || b.ct == CompType::Float {
                    FJCC
                } else {
                    JCC
                };
                vec![Self::inst(
                    code,
                    vec![Param::other(Location::Cond(cc)), a, b, target_of(inst, 0)?],
                )]
            }
            IrOp::Switch => {
                let mut params = vec![use_(0)?];
                params.extend(
                    inst.targets
                        .iter()
                        .map(|t| Param::other(Location::Block(*t))),
                );
                vec![Self::inst(SWITCH, params)]
            }
            IrOp::Call => self.lower_call(inst)?,
            IrOp::Ret => self.lower_ret(inst),
            op => return Err(pass_error!(NAME, "no selection for '{}'", op)),
        })
    }

    fn jump(&self, target: NodeId) -> McInst {
        Self::inst(JMP, vec![Param::other(Location::Block(target))])
    }

    fn move_inst(&self, dst: Location, src: Location, ct: CompType) -> McInst {
        Self::inst(MOV, vec![Param::write(dst, ct), Param::read(src, ct)])
    }

    fn is_move(&self, inst: &McInst) -> bool {
        inst.op == MachineOp::Target(MOV)
    }

    fn setup_stack(&self, frame_size: u32) -> Vec<McInst> {
        vec![Self::inst(
            ENTER,
            vec![Param::other(Location::Const(i64::from(frame_size)))],
        )]
    }

    fn output_passes(&self) -> Vec<Box<dyn Pass>> {
        vec![Box::new(Ref64Encode)]
    }

    fn map_relocation(&self, kind: RelocKind) -> u32 {
        match kind {
            RelocKind::Call => R_REF64_CALL32,
            RelocKind::PcRel32 => R_REF64_PC32,
            RelocKind::Absolute64 => R_REF64_ABS64,
        }
    }
}
