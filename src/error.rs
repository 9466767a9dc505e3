//! Error types and construction helpers.
//!
//! Every fallible operation returns [`crate::Result`] with the single [`Error`] enum defined
//! here. Decoding failures carry the bytecode offset, pass failures carry the pass name, and
//! the driver wraps either in [`Error::Method`] to name the method and stage.
//!
//! The `*_error!` macros are available crate-wide and keep call sites short.

use thiserror::Error;

/// Helper macro for creating [`Error::Decode`] values at a bytecode offset.
///
/// ```rust, ignore
/// return Err(decode_error!(offset, DecodeErrorKind::Truncated("switch table")));
/// ```
macro_rules! decode_error {
    ($offset:expr, $kind:expr) => {
        crate::Error::Decode {
            offset: $offset,
            kind: $kind,
        }
    };
}

/// Helper macro for creating [`Error::GraphInvariant`] values.
///
/// ```rust, ignore
/// return Err(graph_error!("block partition is stale (generation {} vs {})", a, b));
/// ```
macro_rules! graph_error {
    ($msg:expr) => {
        crate::Error::GraphInvariant($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::GraphInvariant(format!($fmt, $($arg)*))
    };
}

/// Helper macro for creating [`Error::Pass`] values tagged with the failing pass.
///
/// ```rust, ignore
/// return Err(pass_error!("stack-trace", "stack underflow in block {}", block));
/// ```
macro_rules! pass_error {
    ($pass:expr, $msg:expr) => {
        crate::Error::Pass {
            pass: $pass,
            message: $msg.to_string(),
        }
    };

    ($pass:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Pass {
            pass: $pass,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// Helper macro for creating [`Error::Emit`] values.
macro_rules! emit_error {
    ($msg:expr) => {
        crate::Error::Emit($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Emit(format!($fmt, $($arg)*))
    };
}

/// The error type for every fallible operation of this crate.
///
/// All variants are fatal to the compilation of the method that raised them. The driver never
/// attempts partial recovery; depending on [`crate::FailurePolicy`] it either aborts the whole
/// compilation unit or records the method as failed and continues with the next one.
///
/// # Error Categories
///
/// - [`Error::Decode`] - The bytecode stream of a method body is malformed
/// - [`Error::GraphInvariant`] - A control-flow graph precondition does not hold
/// - [`Error::Pass`] - A pipeline pass could not complete its transformation
/// - [`Error::Emit`] - Final symbol resolution or layout failed
/// - [`Error::Method`] - Unit-level wrapper naming the method and stage that failed
///
/// # Examples
///
/// ```rust
/// use cilaot::{Error, DecodeErrorKind};
///
/// let err = Error::Decode { offset: 4, kind: DecodeErrorKind::UnknownOpcode(0xA6) };
/// assert!(err.to_string().contains("0x4"));
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream could not be decoded.
    ///
    /// Raised by the bytecode decoder and the method header parser. The offset is relative
    /// to the start of the method's code bytes.
    ///
    /// # Fields
    ///
    /// * `offset` - Byte offset of the instruction (or header) being decoded
    /// * `kind` - What exactly was malformed
    #[error("Decode error at offset {offset:#x}: {kind}")]
    Decode {
        /// Offset into the method body at which decoding failed
        offset: usize,
        /// The detailed failure reason
        kind: DecodeErrorKind,
    },

    /// A graph precondition was violated.
    ///
    /// This covers reads of block partitions or dominance data that predate the last edge
    /// mutation, and dominance analysis over blocks unreachable from every start node.
    #[error("Graph invariant violated - {0}")]
    GraphInvariant(String),

    /// A pass failed to transform the graph.
    ///
    /// # Fields
    ///
    /// * `pass` - Name of the pass that raised the error
    /// * `message` - Description of the failure
    #[error("Pass '{pass}' failed: {message}")]
    Pass {
        /// The pass that failed
        pass: &'static str,
        /// What went wrong
        message: String,
    },

    /// Final symbol resolution or object layout failed.
    #[error("Emit failed - {0}")]
    Emit(String),

    /// Compilation of a single method failed inside a compilation unit.
    ///
    /// Produced by [`crate::Compiler::compile_unit`] under [`crate::FailurePolicy::Abort`].
    #[error("Compilation of '{method}' failed in {stage}: {source}")]
    Method {
        /// Name of the method being compiled
        method: String,
        /// The decoder or the name of the pass that failed
        stage: &'static str,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}

/// The specific reason a method body failed to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The opcode (single byte, or `0xFE`/`0xFD` extension pair) is not in the opcode table.
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    /// The stream ended in the middle of a prefix, opcode or inline operand.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// A branch or fall-through target lies outside the method body.
    #[error("control transfer to {target} lies outside the {len} byte method body")]
    TargetOutOfRange {
        /// The computed target offset
        target: i64,
        /// Length of the method body
        len: usize,
    },

    /// A branch target lies inside the body but not on an instruction boundary.
    #[error("control transfer to {0:#x} does not land on an instruction boundary")]
    MisalignedTarget(usize),

    /// The method body contains no instructions.
    #[error("empty method body")]
    Empty,

    /// The method header format bits are not a tiny or fat header.
    #[error("invalid method header flags {0:#04x}")]
    InvalidHeader(u8),
}
