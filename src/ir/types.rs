//! Typed operands shared by the IR and machine-level instructions.

use std::fmt;

use strum::{Display, EnumIter};

use crate::{graph::NodeId, target::Reg};

/// Computational type of a value as tracked on the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Default)]
pub enum CompType {
    /// 32-bit integer (also used for bool, char and narrower integers).
    #[strum(serialize = "i32")]
    Int32,
    /// 64-bit integer.
    #[strum(serialize = "i64")]
    Int64,
    /// Native-size integer.
    #[strum(serialize = "iptr")]
    IntPtr,
    /// Floating point value.
    #[strum(serialize = "f")]
    Float,
    /// Object reference.
    #[strum(serialize = "obj")]
    Object,
    /// Managed pointer.
    #[strum(serialize = "ref")]
    Ref,
    /// Not yet determined.
    #[default]
    #[strum(serialize = "?")]
    Unknown,
}

impl CompType {
    /// Storage size in bytes for a target with the given pointer size.
    #[must_use]
    pub fn size(self, pointer_size: u32) -> u32 {
        match self {
            CompType::Int32 => 4,
            CompType::Int64 | CompType::Float => 8,
            CompType::IntPtr | CompType::Object | CompType::Ref | CompType::Unknown => {
                pointer_size
            }
        }
    }

    /// Returns `true` for the integer-like types (including references used as addresses).
    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(self, CompType::Float | CompType::Unknown)
    }

    /// Result type of a binary numeric operation (ECMA-335 III.1.5, table 2).
    #[must_use]
    pub fn binary_result(self, other: CompType) -> CompType {
        use CompType::{Float, Int32, Int64, IntPtr, Object, Ref, Unknown};
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (Float, _) | (_, Float) => Float,
            (Int64, _) | (_, Int64) => Int64,
            (Ref | Object, _) | (_, Ref | Object) => Ref,
            (IntPtr, _) | (_, IntPtr) => IntPtr,
            (Int32, Int32) => Int32,
        }
    }
}

/// Condition codes for comparisons and conditional branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CondCode {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Lt,
    /// Signed less or equal
    Le,
    /// Signed greater than
    Gt,
    /// Signed greater or equal
    Ge,
    /// Unsigned (or unordered) less than
    #[strum(serialize = "lt.un")]
    LtUn,
    /// Unsigned less or equal
    #[strum(serialize = "le.un")]
    LeUn,
    /// Unsigned greater than
    #[strum(serialize = "gt.un")]
    GtUn,
    /// Unsigned greater or equal
    #[strum(serialize = "ge.un")]
    GeUn,
}

impl CondCode {
    /// The condition that holds exactly when `self` does not.
    #[must_use]
    pub fn invert(self) -> CondCode {
        match self {
            CondCode::Eq => CondCode::Ne,
            CondCode::Ne => CondCode::Eq,
            CondCode::Lt => CondCode::Ge,
            CondCode::Ge => CondCode::Lt,
            CondCode::Le => CondCode::Gt,
            CondCode::Gt => CondCode::Le,
            CondCode::LtUn => CondCode::GeUn,
            CondCode::GeUn => CondCode::LtUn,
            CondCode::LeUn => CondCode::GtUn,
            CondCode::GtUn => CondCode::LeUn,
        }
    }

    /// Numeric encoding used by target encoders.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Where a value lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Evaluation stack slot counted from the top (0 = top of stack); resolved by stack tracing.
    Stack(u32),
    /// Virtual register.
    VReg(u32),
    /// Local variable.
    Local(u32),
    /// Method argument.
    Arg(u32),
    /// Integer (or raw float bits) constant.
    Const(i64),
    /// Physical machine register.
    MReg(Reg),
    /// Spill slot handed out by register allocation.
    Spill(u32),
    /// Register save slot.
    SaveSlot(u32),
    /// Frame-pointer relative memory.
    Frame(i32),
    /// Unresolved call target token.
    CallToken(u32),
    /// Linkage symbol.
    Symbol(String),
    /// Branch target node.
    Block(NodeId),
    /// Condition code operand.
    Cond(CondCode),
    /// No reaching definition along this path.
    Undef,
}

impl Location {
    /// The virtual register number, if this is one.
    #[must_use]
    pub fn vreg(&self) -> Option<u32> {
        match self {
            Location::VReg(v) => Some(*v),
            _ => None,
        }
    }

    /// The machine register, if this is one.
    #[must_use]
    pub fn mreg(&self) -> Option<Reg> {
        match self {
            Location::MReg(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns `true` for memory locations that are resolved to frame offsets late.
    #[must_use]
    pub fn is_frame_slot(&self) -> bool {
        matches!(
            self,
            Location::Local(_) | Location::Arg(_) | Location::Spill(_) | Location::SaveSlot(_)
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Stack(s) => write!(f, "st{s}"),
            Location::VReg(v) => write!(f, "v{v}"),
            Location::Local(l) => write!(f, "loc{l}"),
            Location::Arg(a) => write!(f, "arg{a}"),
            Location::Const(c) => write!(f, "${c}"),
            Location::MReg(r) => write!(f, "{}", r.name),
            Location::Spill(s) => write!(f, "spill{s}"),
            Location::SaveSlot(s) => write!(f, "save{s}"),
            Location::Frame(off) if *off < 0 => write!(f, "[fp-{}]", off.unsigned_abs()),
            Location::Frame(off) => write!(f, "[fp+{off}]"),
            Location::CallToken(t) => write!(f, "tok:0x{t:08x}"),
            Location::Symbol(s) => f.write_str(s),
            Location::Block(n) => write!(f, "->{n}"),
            Location::Cond(c) => write!(f, "{c}"),
            Location::Undef => f.write_str("undef"),
        }
    }
}

/// Whether an operand is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UseDef {
    /// Neither, e.g. a branch target or condition code.
    #[default]
    None,
    /// Read.
    Use,
    /// Written.
    Def,
}

/// A typed operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Where the value lives.
    pub loc: Location,
    /// Computational type; preserved by every pass that rewrites `loc`.
    pub ct: CompType,
    /// Read/write role.
    pub ud: UseDef,
}

impl Param {
    /// A read of `loc`.
    #[must_use]
    pub fn read(loc: Location, ct: CompType) -> Self {
        Param {
            loc,
            ct,
            ud: UseDef::Use,
        }
    }

    /// A write of `loc`.
    #[must_use]
    pub fn write(loc: Location, ct: CompType) -> Self {
        Param {
            loc,
            ct,
            ud: UseDef::Def,
        }
    }

    /// An operand that is neither read nor written.
    #[must_use]
    pub fn other(loc: Location) -> Self {
        Param {
            loc,
            ct: CompType::Unknown,
            ud: UseDef::None,
        }
    }

    /// Returns `true` if the operand is read.
    #[must_use]
    pub fn is_use(&self) -> bool {
        self.ud == UseDef::Use
    }

    /// Returns `true` if the operand is written.
    #[must_use]
    pub fn is_def(&self) -> bool {
        self.ud == UseDef::Def
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Location::VReg(_) | Location::Stack(_) => write!(f, "{}:{}", self.loc, self.ct),
            _ => write!(f, "{}", self.loc),
        }
    }
}
