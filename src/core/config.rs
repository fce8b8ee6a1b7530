//! Compilation options.
//!
//! Target-dependent parameters (word size, register size, endianness) live in
//! [`crate::ir::Config`] and are derived from the selected descriptor. The
//! knobs here are independent of the target and are usually filled in from
//! the command line.

/// Default cap on rewrite passes before a rule set is declared non-terminating.
pub const DEFAULT_MAX_REWRITE_ITERATIONS: usize = 1000;

/// Target independent compilation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Maximum number of whole-function passes a rewrite profile may take.
    pub max_rewrite_iterations: usize,
    /// Worker threads used by [`crate::Compiler::compile_all`]; 0 picks the rayon default.
    pub jobs: usize,
    /// Validate the operand shape of every emitted instruction.
    pub validate: bool,
}

impl CompileOptions {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_max_rewrite_iterations(mut self, max: usize) -> Self {
        self.max_rewrite_iterations = max;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_rewrite_iterations: DEFAULT_MAX_REWRITE_ITERATIONS,
            jobs: 0,
            validate: true,
        }
    }
}
