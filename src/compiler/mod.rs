//! Compilation driver and pipeline infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Compiler                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  MethodSource ──► BytecodeDecoder ──► Graph (CIL nodes)       │
//! │                                         │                     │
//! │  Pipeline                               ▼                     │
//! │    ├─ LowerToMachineIr, StackTrace    Graph (IR nodes)        │
//! │    ├─ TargetLower                     Graph (machine nodes)   │
//! │    ├─ Dominance, SsaConvert                                   │
//! │    ├─ GenKill, Liveness, RegisterAllocate, MachineLiveness    │
//! │    ├─ PreserveAcrossCalls, RemoveRedundantMoves               │
//! │    ├─ CalleePreserves, AllocateLocalVars, MangleCallSites     │
//! │    └─ target output passes ──► MethodArtifacts                │
//! │                                         │                     │
//! │                                         ▼                     │
//! │                                  CompiledMethod ──► Emitter   │
//! │                                                               │
//! │  Shared per compiler: OpcodeTable, CallRegistry, StringTable  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods of a unit compile in parallel on the rayon pool. Each method owns its graph and
//! all analysis results exclusively; the only shared mutable structure is the append-only
//! [`crate::emit::StringTable`].

mod config;
mod driver;
mod method;
mod pass;
mod pipeline;
mod registry;

pub use config::{CompilerConfig, FailurePolicy};
pub use driver::{Compiler, MethodFailure, UnitOutput};
pub use method::{EhRegion, MethodInfo, MethodSignature, MethodSource};
pub use pass::Pass;
pub use pipeline::{Pipeline, PipelineFailure, PipelineOutput};
pub use registry::{CallRegistry, CallSignature};
