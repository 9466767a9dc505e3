//! Configuration for the compiler driver.

/// What the driver does when one method of a compilation unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop and return the first failure as [`crate::Error::Method`].
    #[default]
    Abort,
    /// Log the failure, record the method as failed and continue with the next one.
    SkipMethod,
}

/// Configuration for the compiler driver.
///
/// Controls diagnostics and how failures and parallelism are handled. The pass list itself
/// is fixed and not configurable.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Record a textual dump of the graph before every pass and after the last one
    /// (default: false).
    pub record_dumps: bool,

    /// Check graph preconditions that are otherwise assumed, such as every block being
    /// reachable before dominance is computed (default: true).
    pub verify_graphs: bool,

    /// Handling of per-method failures in a compilation unit (default: abort).
    pub failure_policy: FailurePolicy,

    /// Compile the methods of a unit on the rayon thread pool (default: true).
    pub parallel: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            record_dumps: false,
            verify_graphs: true,
            failure_policy: FailurePolicy::Abort,
            parallel: true,
        }
    }
}

impl CompilerConfig {
    /// Enables or disables graph dumps.
    #[must_use]
    pub fn with_dumps(mut self, enabled: bool) -> Self {
        self.record_dumps = enabled;
        self
    }

    /// Enables or disables the checks of assumed graph preconditions.
    #[must_use]
    pub fn with_verify_graphs(mut self, enabled: bool) -> Self {
        self.verify_graphs = enabled;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enables or disables parallel compilation of units.
    #[must_use]
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }
}
