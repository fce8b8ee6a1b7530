//! polyarch - architecture parameterized code generation backend.
//!
//! polyarch lowers a target independent SSA IR to machine instructions for a
//! closed set of targets. One rewrite pipeline, one frame layout engine and
//! one driver serve every target; what differs per target lives in a static
//! [`isa::Descriptor`] and the sealed [`isa::LowerBackend`] of its family.
//!
//! # Primary Usage
//!
//! ```ignore
//! use polyarch::backend;
//! use polyarch::core::{CompilationSession, CompileOptions};
//! use polyarch::ir::{parse_module, SequentialAllocator};
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let mut funcs = parse_module(text)?;
//! let out = backend::compile_function(
//!     "arm64",
//!     &session,
//!     &mut funcs[0],
//!     &SequentialAllocator,
//!     CompileOptions::default(),
//! )?;
//! print!("{out}");
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - SSA functions, stack frames and the textual IR reader
//! - [`rewrite`] - rule engine with the `generic` and `dec64` profiles
//! - [`isa`] - descriptors, machine instructions and per-family backends
//! - [`backend`] - target selection and compile entry points
//! - [`core`] - errors, options, compilation sessions and the driver

pub mod backend;
pub mod core;
pub mod ir;
pub mod isa;
pub mod rewrite;

pub use crate::core::{
    CompilationSession, CompileError, CompileOptions, CompileResult, CompiledBatch,
    CompiledFunction, Compiler, SessionStats,
};
pub use crate::isa::{Descriptor, Inst, LowerBackend};
