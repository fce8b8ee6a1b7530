// This module is the hub for the target independent infrastructure of polyarch: the error
// taxonomy shared by every pass, the compilation options, the arena-backed compilation
// session, and the compiler driver that selects nothing itself but runs the
// rewrite -> frame layout -> lowering pipeline for a descriptor it is handed.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - `CompileError` with distinct exit statuses for bad targets and internal defects
//!
//! ## Session Management (`session`)
//! - Arena-based scratch allocation using `bumpalo`
//! - Per-worker statistics, merged after parallel batches
//!
//! ## Compiler (`compiler`)
//! - Drives one function through rewrite, frame layout and lowering
//! - Compiles batches of functions on a rayon pool

pub mod config;
pub mod error;
pub mod session;
pub mod compiler;
#[cfg(test)]
pub mod test_utils;

pub use config::{CompileOptions, DEFAULT_MAX_REWRITE_ITERATIONS};
pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, SessionStats};
pub use compiler::{CompiledBatch, CompiledFunction, Compiler};
