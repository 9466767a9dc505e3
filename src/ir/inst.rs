//! Target-independent instructions.

use std::{fmt, sync::Arc};

use crate::{
    compiler::CallSignature,
    graph::NodeId,
    ir::{CompType, CondCode, Param},
};

/// Operation of an [`IrInst`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrOp {
    /// Method prologue placeholder.
    Enter,
    /// No operation.
    Nop,
    /// Copy `uses[0]` into `defs[0]`.
    Move,
    /// Push a copy of the top of stack; becomes a [`IrOp::Move`] after stack tracing.
    Dup,
    /// Discard the top of stack.
    Pop,
    /// Integer or float addition.
    Add,
    /// Integer addition trapping on overflow, unsigned overflow with `unsigned`.
    AddOvf {
        /// Treat both operands as unsigned
        unsigned: bool,
    },
    /// Subtraction trapping on overflow.
    SubOvf {
        /// Treat both operands as unsigned
        unsigned: bool,
    },
    /// Multiplication trapping on overflow.
    MulOvf {
        /// Treat both operands as unsigned
        unsigned: bool,
    },
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Signed division.
    Div,
    /// Unsigned division.
    DivUn,
    /// Signed remainder.
    Rem,
    /// Unsigned remainder.
    RemUn,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    ShrUn,
    /// Negation.
    Neg,
    /// Bitwise complement.
    Not,
    /// Conversion to the given type; `signed` selects sign or zero extension of narrow values.
    ///
    /// For a floating-point destination `width` is the precision the value is rounded to
    /// (4 or 8 bytes).
    Conv {
        /// Destination type
        to: CompType,
        /// Width in bytes the value is truncated to before extension, 0 for the full width
        width: u8,
        /// Sign-extend rather than zero-extend
        signed: bool,
        /// Trap if the value does not fit the destination
        checked: bool,
        /// Interpret an integer source as unsigned
        from_unsigned: bool,
    },
    /// Load `width` bytes (0 for the pointer size) from the address in `uses[0]`.
    LoadInd {
        /// Type of the pushed value
        to: CompType,
        /// Access width in bytes
        width: u8,
        /// Sign-extend a narrow integer
        signed: bool,
    },
    /// Store the low `width` bytes (0 for the pointer size) of `uses[1]` to the address in
    /// `uses[0]`.
    StoreInd {
        /// Access width in bytes
        width: u8,
    },
    /// Compare `uses[0]` with `uses[1]`, producing 1 or 0.
    Cmp(CondCode),
    /// Unconditional jump to `targets[0]`.
    Br,
    /// Jump to `targets[0]` if `uses[0] <cc> uses[1]`, else fall through.
    BrIf(CondCode),
    /// Jump to `targets[uses[0]]` if in range, else fall through.
    Switch,
    /// Call `callee` with `uses` as arguments.
    Call,
    /// Return, with the value in `uses[0]` if the method returns one.
    Ret,
}

impl IrOp {
    /// Returns `true` for two-operand arithmetic and bitwise operations.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            IrOp::Add
                | IrOp::AddOvf { .. }
                | IrOp::SubOvf { .. }
                | IrOp::MulOvf { .. }
                | IrOp::Sub
                | IrOp::Mul
                | IrOp::Div
                | IrOp::DivUn
                | IrOp::Rem
                | IrOp::RemUn
                | IrOp::And
                | IrOp::Or
                | IrOp::Xor
                | IrOp::Shl
                | IrOp::Shr
                | IrOp::ShrUn
        )
    }

    /// Returns `true` if control never continues at the next instruction.
    #[must_use]
    pub fn is_unconditional_transfer(self) -> bool {
        matches!(self, IrOp::Br | IrOp::Ret)
    }

    /// Returns `true` if the instruction ends a block.
    #[must_use]
    pub fn is_terminator(self) -> bool {
        matches!(self, IrOp::Br | IrOp::BrIf(_) | IrOp::Switch | IrOp::Ret)
    }
}

fn un(unsigned: bool) -> &'static str {
    if unsigned {
        ".un"
    } else {
        ""
    }
}

impl fmt::Display for IrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrOp::Enter => f.write_str("enter"),
            IrOp::Nop => f.write_str("nop"),
            IrOp::Move => f.write_str("mov"),
            IrOp::Dup => f.write_str("dup"),
            IrOp::Pop => f.write_str("pop"),
            IrOp::Add => f.write_str("add"),
            IrOp::Sub => f.write_str("sub"),
            IrOp::Mul => f.write_str("mul"),
            IrOp::Div => f.write_str("div"),
            IrOp::DivUn => f.write_str("div.un"),
            IrOp::Rem => f.write_str("rem"),
            IrOp::RemUn => f.write_str("rem.un"),
            IrOp::And => f.write_str("and"),
            IrOp::Or => f.write_str("or"),
            IrOp::Xor => f.write_str("xor"),
            IrOp::Shl => f.write_str("shl"),
            IrOp::Shr => f.write_str("shr"),
            IrOp::ShrUn => f.write_str("shr.un"),
            IrOp::Neg => f.write_str("neg"),
            IrOp::Not => f.write_str("not"),
            IrOp::AddOvf { unsigned } => write!(f, "add.ovf{}", un(*unsigned)),
            IrOp::SubOvf { unsigned } => write!(f, "sub.ovf{}", un(*unsigned)),
            IrOp::MulOvf { unsigned } => write!(f, "mul.ovf{}", un(*unsigned)),
            IrOp::Conv {
                to,
                width,
                signed,
                checked,
                from_unsigned,
            } => write!(
                f,
                "conv{}.{to}.{}{}{}",
                if *checked { ".ovf" } else { "" },
                if *signed { "s" } else { "u" },
                u32::from(*width) * 8,
                un(*from_unsigned)
            ),
            IrOp::LoadInd { to, width, signed } => write!(
                f,
                "ldind.{to}.{}{}",
                if *signed { "s" } else { "u" },
                u32::from(*width) * 8
            ),
            IrOp::StoreInd { width } => write!(f, "stind.{}", u32::from(*width) * 8),
            IrOp::Cmp(cc) => write!(f, "cmp.{cc}"),
            IrOp::Br => f.write_str("br"),
            IrOp::BrIf(cc) => write!(f, "br.{cc}"),
            IrOp::Switch => f.write_str("switch"),
            IrOp::Call => f.write_str("call"),
            IrOp::Ret => f.write_str("ret"),
        }
    }
}

/// A resolved call site.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// The metadata token of the callee.
    pub token: u32,
    /// Signature of the callee.
    pub signature: Arc<CallSignature>,
}

/// One target-independent instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct IrInst {
    /// Operation.
    pub op: IrOp,
    /// Operands read.
    pub uses: Vec<Param>,
    /// Operands written.
    pub defs: Vec<Param>,
    /// Branch targets, the first nodes of their blocks.
    pub targets: Vec<NodeId>,
    /// Callee of an [`IrOp::Call`].
    pub callee: Option<CallSite>,
}

impl IrInst {
    /// Creates an instruction without targets or callee.
    #[must_use]
    pub fn new(op: IrOp, uses: Vec<Param>, defs: Vec<Param>) -> Self {
        IrInst {
            op,
            uses,
            defs,
            targets: Vec::new(),
            callee: None,
        }
    }

    /// Adds branch targets.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<NodeId>) -> Self {
        self.targets = targets;
        self
    }
}

impl fmt::Display for IrInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.defs.is_empty() {
            let defs: Vec<String> = self.defs.iter().map(ToString::to_string).collect();
            write!(f, "{} = ", defs.join(", "))?;
        }
        write!(f, "{}", self.op)?;
        if let Some(callee) = &self.callee {
            write!(f, " {}", callee.signature.name)?;
        }

        let mut operands: Vec<String> = self.uses.iter().map(ToString::to_string).collect();
        operands.extend(self.targets.iter().map(|t| format!("->{t}")));
        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Location;

    #[test]
    fn display_binary() {
        let inst = IrInst::new(
            IrOp::Add,
            vec![
                Param::read(Location::VReg(1), CompType::Int32),
                Param::read(Location::Const(2), CompType::Int32),
            ],
            vec![Param::write(Location::VReg(3), CompType::Int32)],
        );
        assert_eq!(inst.to_string(), "v3:i32 = add v1:i32, $2");
    }

    #[test]
    fn display_branch_and_conv() {
        let inst = IrInst::new(
            IrOp::BrIf(CondCode::Lt),
            vec![Param::read(Location::Stack(1), CompType::Unknown)],
            Vec::new(),
        )
        .with_targets(vec![NodeId::new(4)]);
        assert_eq!(inst.to_string(), "br.lt st1:?, ->n4");

        let conv = IrOp::Conv {
            to: CompType::Int32,
            width: 1,
            signed: false,
            checked: false,
            from_unsigned: false,
        };
        assert_eq!(conv.to_string(), "conv.i32.u8");

        let conv = IrOp::Conv {
            to: CompType::Int32,
            width: 2,
            signed: true,
            checked: true,
            from_unsigned: true,
        };
        assert_eq!(conv.to_string(), "conv.ovf.i32.s16.un");
        assert_eq!(IrOp::AddOvf { unsigned: true }.to_string(), "add.ovf.un");
        assert_eq!(
            IrOp::LoadInd {
                to: CompType::Float,
                width: 4,
                signed: true
            }
            .to_string(),
            "ldind.f.s32"
        );
        assert_eq!(IrOp::StoreInd { width: 0 }.to_string(), "stind.0");
    }

    #[test]
    fn classification() {
        assert!(IrOp::ShrUn.is_binary());
        assert!(IrOp::MulOvf { unsigned: false }.is_binary());
        assert!(!IrOp::StoreInd { width: 4 }.is_binary());
        assert!(!IrOp::Neg.is_binary());
        assert!(IrOp::Switch.is_terminator());
        assert!(!IrOp::Switch.is_unconditional_transfer());
        assert!(IrOp::Ret.is_unconditional_transfer());
    }
}
