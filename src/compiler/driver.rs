//! The compiler driver: one method at a time, or a whole unit in parallel.

use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    cil::{BytecodeDecoder, OpcodeTable},
    compiler::{CallRegistry, CompilerConfig, FailurePolicy, MethodSource, Pipeline},
    emit::{CompiledMethod, StringTable},
    target::Target,
    Error,
};

/// Why one method failed to compile.
#[derive(Debug)]
pub struct MethodFailure {
    /// Name of the method.
    pub method: String,
    /// `"decode"`, or the name of the failing pass.
    pub stage: &'static str,
    /// The error raised.
    pub error: Error,
    /// Dump of the graph the failing pass received, when dumps are recorded.
    pub last_dump: Option<String>,
}

impl From<MethodFailure> for Error {
    fn from(failure: MethodFailure) -> Self {
        Error::Method {
            method: failure.method,
            stage: failure.stage,
            source: Box::new(failure.error),
        }
    }
}

/// The outcome of compiling a unit under [`FailurePolicy::SkipMethod`] (or a unit without
/// failures).
#[derive(Debug, Default)]
pub struct UnitOutput {
    /// Successfully compiled methods, in input order.
    pub compiled: Vec<CompiledMethod>,
    /// Methods that failed, in input order.
    pub failed: Vec<MethodFailure>,
}

/// Compiles methods for one target.
///
/// A compiler owns everything that is shared between methods: the opcode table, the call
/// registry, the pass pipeline and the string table. Nothing else is shared, so methods
/// compile independently and a failure in one leaves no trace in another.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use cilaot::prelude::*;
///
/// let compiler = Compiler::new(
///     Arc::new(Ref64::new()),
///     CallRegistry::new(),
///     CompilerConfig::default(),
/// );
/// let method = MethodInfo::new(
///     "Demo.Answer",
///     MethodSignature::new(Vec::new(), Some(CompType::Int32)),
/// );
/// // ldc.i4.s 42; ret
/// let compiled = compiler
///     .compile_method(&MethodSource::new(method, vec![0x1F, 0x2A, 0x2A]))
///     .map_err(cilaot::Error::from)?;
///
/// assert!(!compiled.code.is_empty());
/// # Ok::<(), cilaot::Error>(())
/// ```
pub struct Compiler {
    target: Arc<dyn Target>,
    opcodes: OpcodeTable,
    strings: Arc<StringTable>,
    pipeline: Pipeline,
    config: CompilerConfig,
}

impl Compiler {
    /// Creates a compiler with the standard opcode table and pipeline.
    #[must_use]
    pub fn new(target: Arc<dyn Target>, registry: CallRegistry, config: CompilerConfig) -> Self {
        Self::with_opcodes(target, registry, config, OpcodeTable::standard())
    }

    /// Creates a compiler using a custom opcode table, e.g. one with `0xFD` extensions.
    #[must_use]
    pub fn with_opcodes(
        target: Arc<dyn Target>,
        registry: CallRegistry,
        config: CompilerConfig,
        opcodes: OpcodeTable,
    ) -> Self {
        let strings = Arc::new(StringTable::new());
        let pipeline = Pipeline::standard(
            Arc::new(registry),
            strings.clone(),
            target.as_ref(),
            config.verify_graphs,
        );
        Compiler {
            target,
            opcodes,
            strings,
            pipeline,
            config,
        }
    }

    /// The target this compiler generates code for.
    #[must_use]
    pub fn target(&self) -> &dyn Target {
        self.target.as_ref()
    }

    /// The string table shared by all methods compiled so far.
    #[must_use]
    pub fn strings(&self) -> &Arc<StringTable> {
        &self.strings
    }

    /// The pass pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Decodes and compiles one method.
    ///
    /// # Errors
    ///
    /// Returns a [`MethodFailure`] naming the decoder or the pass that failed.
    pub fn compile_method(
        &self,
        source: &MethodSource,
    ) -> std::result::Result<CompiledMethod, MethodFailure> {
        let method = &source.info;
        let fail = |stage: &'static str, error: Error, last_dump: Option<String>| MethodFailure {
            method: method.name.clone(),
            stage,
            error,
            last_dump,
        };

        let graph = source
            .body()
            .and_then(|body| BytecodeDecoder::new(&self.opcodes).decode(&body, method.clone()))
            .map_err(|e| fail("decode", e, None))?;

        let output = self
            .pipeline
            .run(graph, self.target.as_ref(), self.config.record_dumps)
            .map_err(|f| fail(f.pass, f.error, f.last_dump))?;

        let artifacts = output.graph.artifacts.clone().ok_or_else(|| {
            fail(
                "emit",
                emit_error!("pipeline for '{}' produced no code", method.name),
                None,
            )
        })?;

        Ok(CompiledMethod::new(&method.name, artifacts, output.dumps))
    }

    /// Compiles every method of a unit, in parallel when enabled.
    ///
    /// Results keep the input order regardless of which thread compiled a method.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::Abort`], returns [`Error::Method`] for the first failing method
    /// in input order. Under [`FailurePolicy::SkipMethod`], failures are logged and collected
    /// in [`UnitOutput::failed`] instead.
    pub fn compile_unit(&self, sources: &[MethodSource]) -> crate::Result<UnitOutput> {
        let results: Vec<_> = if self.config.parallel {
            sources.par_iter().map(|s| self.compile_method(s)).collect()
        } else {
            sources.iter().map(|s| self.compile_method(s)).collect()
        };

        let mut output = UnitOutput::default();
        for result in results {
            match result {
                Ok(compiled) => output.compiled.push(compiled),
                Err(failure) if self.config.failure_policy == FailurePolicy::Abort => {
                    return Err(failure.into());
                }
                Err(failure) => {
                    warn!(
                        "skipping '{}': {} failed: {}",
                        failure.method, failure.stage, failure.error
                    );
                    output.failed.push(failure);
                }
            }
        }

        info!(
            "compiled {} of {} methods for {} ({} failed)",
            output.compiled.len(),
            sources.len(),
            self.target.name(),
            output.failed.len()
        );
        Ok(output)
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("target", &self.target.name())
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
