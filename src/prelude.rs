//! # cilaot Prelude
//!
//! The types needed to set up a compiler, describe methods and consume the output. Import
//! this module to get quick access to them:
//!
//! ```rust
//! use cilaot::prelude::*;
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type
pub use crate::Error;

/// The result type used throughout the crate
pub use crate::Result;

// ================================================================================================
// Driver
// ================================================================================================

pub use crate::compiler::{
    CallRegistry, CallSignature, Compiler, CompilerConfig, FailurePolicy, MethodFailure,
    MethodInfo, MethodSignature, MethodSource, UnitOutput,
};

// ================================================================================================
// Types
// ================================================================================================

pub use crate::ir::CompType;

// ================================================================================================
// Targets and Output
// ================================================================================================

pub use crate::{
    emit::{CompiledMethod, Emitter, ObjectBuffer, ObjectImage, RelocKind},
    target::{Ref64, Target},
};
