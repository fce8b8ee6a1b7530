// This module defines the error types for the polyarch backend using the thiserror crate.
// CompileError separates the two outcomes a driver has to tell apart: a user-facing
// UnsupportedTarget (the target identifier is not in the closed set of descriptors) and the
// internal defects of the core itself (a rewrite rule set that never reaches a fixed point,
// a frame mutated after finalization, an out-of-range classification index, or a value whose
// opcode the selected backend cannot lower). Parse errors from the textual IR reader and an
// oversized frame are bad input. Each kind maps to a distinct process exit status so automated
// triage can distinguish "bad input/target" from "internal compiler defect".

//! Error types for the polyarch backend.
//!
//! Using thiserror for idiomatic error handling.

use thiserror::Error;

/// Exit status for unreadable or malformed input.
pub const EXIT_BAD_INPUT: i32 = 1;

/// Exit status for an unknown target identifier.
pub const EXIT_UNSUPPORTED_TARGET: i32 = 2;

/// Exit status for internal compiler defects.
pub const EXIT_INTERNAL: i32 = 3;

/// Main error type for compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown architecture {target:?}")]
    UnsupportedTarget {
        target: String,
    },

    #[error("internal compiler error: {reason}")]
    InternalInconsistency {
        reason: String,
    },

    #[error("internal compiler error: no lowering for {op} on {target}")]
    LoweringFailure {
        target: &'static str,
        op: &'static str,
    },

    #[error("stack frame too large ({size} bytes, limit {max})")]
    FrameTooLarge {
        size: u64,
        max: u64,
    },

    #[error("line {line}: {reason}")]
    Parse {
        line: usize,
        reason: String,
    },
}

impl CompileError {
    /// Shorthand for an [`CompileError::InternalInconsistency`].
    pub fn internal(reason: impl Into<String>) -> Self {
        CompileError::InternalInconsistency {
            reason: reason.into(),
        }
    }

    /// Whether the error signals a defect in the backend rather than in its input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CompileError::InternalInconsistency { .. } | CompileError::LoweringFailure { .. }
        )
    }

    /// Process exit status the driver terminates with.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::UnsupportedTarget { .. } => EXIT_UNSUPPORTED_TARGET,
            CompileError::InternalInconsistency { .. } | CompileError::LoweringFailure { .. } => {
                EXIT_INTERNAL
            }
            CompileError::FrameTooLarge { .. } | CompileError::Parse { .. } => EXIT_BAD_INPUT,
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
