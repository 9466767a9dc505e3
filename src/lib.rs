// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilaot
//!
//! An ahead-of-time compiler backend for ECMA-335 CIL method bodies.
//!
//! `cilaot` takes the raw bytecode of a method together with its signature, decodes it into
//! a control-flow graph and runs it through a fixed pipeline of passes down to relocatable
//! machine code for a pluggable [`target::Target`]. Methods are compiled independently and,
//! for a whole unit, in parallel.
//!
//! ## Pipeline
//!
//! ```text
//! bytecode ─► decode ─► lower-to-machine-ir ─► stack-trace ─► target-lower
//!          ─► dominance ─► ssa-convert ─► gen-kill ─► liveness ─► register-allocate
//!          ─► machine-liveness ─► preserve-across-calls ─► remove-redundant-moves
//!          ─► callee-preserves ─► allocate-local-vars ─► mangle-call-sites
//!          ─► target output passes ─► code + relocations
//! ```
//!
//! Every pass consumes the method's [`graph::Graph`] and returns the transformed graph;
//! passes that restructure control flow produce a fresh graph. Analysis results such as
//! basic blocks and the dominator tree are stamped with the graph generation they were
//! computed for, and asking for a stale one is an error rather than a wrong answer.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cilaot::prelude::*;
//!
//! let mut registry = CallRegistry::new();
//! registry.register(
//!     0x0A00_0001,
//!     CallSignature::new(
//!         "Math.Max",
//!         MethodSignature::new(vec![CompType::Int32; 2], Some(CompType::Int32)),
//!     ),
//! );
//! let compiler = Compiler::new(Arc::new(Ref64::new()), registry, CompilerConfig::default());
//!
//! // static int Clamp(int a) => Math.Max(a, 0);
//! let method = MethodInfo::new(
//!     "Demo.Clamp",
//!     MethodSignature::new(vec![CompType::Int32], Some(CompType::Int32)),
//! );
//! let code = vec![0x02, 0x16, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A];
//! let output = compiler.compile_unit(&[MethodSource::new(method, code)])?;
//!
//! let compiled = &output.compiled[0];
//! assert_eq!(compiled.symbol, "_ZN4Demo5ClampEi_i");
//! assert_eq!(compiled.relocations[0].symbol, "_ZN4Math3MaxEii_i");
//! # Ok::<(), cilaot::Error>(())
//! ```
//!
//! ## Diagnostics
//!
//! The crate logs through the [`log`] facade: per-method progress at `debug`, per-pass detail
//! at `trace`, skipped methods at `warn`. With [`CompilerConfig::record_dumps`] enabled, a
//! textual dump of the graph before every pass is attached to the compiled method, and to
//! the failure report of a method that failed.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Errors name where they arose: the bytecode
//! offset for decoding errors, the pass for pass failures, and the method and stage when
//! reported by the driver.
//!
//! ```rust
//! use std::sync::Arc;
//! use cilaot::{prelude::*, Error};
//!
//! let compiler = Compiler::new(Arc::new(Ref64::new()), CallRegistry::new(), CompilerConfig::default());
//! let method = MethodInfo::new("Demo.Broken", MethodSignature::default());
//!
//! // ldc.i4.0 with nothing after it
//! match compiler.compile_unit(&[MethodSource::new(method, vec![0x16])]) {
//!     Err(Error::Method { method, stage, .. }) => {
//!         assert_eq!(method, "Demo.Broken");
//!         assert_eq!(stage, "decode");
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilaot::prelude::*;
///
/// let config = CompilerConfig::default().with_failure_policy(FailurePolicy::SkipMethod);
/// assert!(config.verify_graphs);
/// ```
pub mod prelude;

/// CIL bytecode decoding.
///
/// The [`cil::OpcodeTable`] maps opcode bytes to their operand layout and control flow, the
/// [`cil::BytecodeDecoder`] turns a method body into a graph of [`cil::CilInstr`] nodes with
/// one edge per possible transfer of control.
pub mod cil;

/// The compiler driver, its configuration, and the pass pipeline.
pub mod compiler;

/// Object output: compiled methods, relocations, symbols and the shared string table.
pub mod emit;

/// Method body framing and little-endian byte helpers.
pub mod file;

/// The instruction graph and its block and dominance analyses.
///
/// # Key Types
///
/// - [`graph::Graph`] - node arena, edges and the linear instruction order
/// - [`graph::BlockPartition`] - basic blocks with their predecessors and successors
/// - [`graph::DominanceGraph`] - immediate dominators, dominator tree and frontiers
pub mod graph;

/// The target-independent intermediate representation and the passes that produce it.
pub mod ir;

/// Analysis and transformation passes on machine nodes: SSA construction, liveness,
/// register allocation, call preservation, frame layout and call-site naming.
pub mod passes;

/// Target descriptions, instruction selection and the reference 64-bit target.
pub mod target;

/// Shared data structures.
pub mod utils;

pub use compiler::{Compiler, CompilerConfig, FailurePolicy};
pub use error::{DecodeErrorKind, Error};

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
