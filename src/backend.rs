// Target dispatch. A target identifier maps to exactly one static Descriptor; the set is
// closed, and an identifier outside it is the only way to get UnsupportedTarget. The
// convenience entry points below resolve the identifier once and hand the descriptor to a
// Compiler, so nothing downstream consults global state to learn the current architecture.

//! Target selection and top-level compile entry points.

use crate::core::{
    CompilationSession, CompileError, CompileOptions, CompileResult, CompiledBatch,
    CompiledFunction, Compiler,
};
use crate::ir::{FrameAllocator, Function};
use crate::isa::{Descriptor, DESCRIPTORS};
use log::debug;

/// Descriptor for a target identifier.
pub fn select(target: &str) -> CompileResult<&'static Descriptor> {
    let desc = DESCRIPTORS
        .iter()
        .copied()
        .find(|d| d.name() == target)
        .ok_or_else(|| CompileError::UnsupportedTarget {
            target: target.to_string(),
        })?;
    debug!("selected {} ({:?})", desc.name(), desc.link.family);
    Ok(desc)
}

/// Identifiers accepted by [`select`].
pub fn supported_targets() -> impl Iterator<Item = &'static str> {
    DESCRIPTORS.iter().map(|d| d.name())
}

/// Compile one function for `target`.
pub fn compile_function<'a>(
    target: &str,
    session: &'a CompilationSession<'a>,
    func: &mut Function,
    allocator: &dyn FrameAllocator,
    options: CompileOptions,
) -> CompileResult<CompiledFunction> {
    Compiler::new(select(target)?, options).compile_function(session, func, allocator)
}

/// Compile a batch of functions for `target` in parallel.
pub fn compile_all(
    target: &str,
    functions: Vec<Function>,
    allocator: &dyn FrameAllocator,
    options: CompileOptions,
) -> CompileResult<CompiledBatch> {
    Compiler::new(select(target)?, options).compile_all(functions, allocator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Family;

    #[test]
    fn test_select_every_target() {
        let names: Vec<_> = supported_targets().collect();
        assert_eq!(names, vec!["amd64", "amd64p32", "arm64", "mips", "mipsle", "s390x"]);
        for name in names {
            assert_eq!(select(name).unwrap().name(), name);
        }
        assert_eq!(select("mipsle").unwrap().link.family, Family::Mips);
        assert_eq!(select("amd64p32").unwrap().link.family, Family::Amd64);
    }

    #[test]
    fn test_unknown_targets() {
        for name in ["", "x86", "AMD64", "mips64", "arm64 ", "riscv64"] {
            let err = select(name).unwrap_err();
            assert_eq!(
                err,
                CompileError::UnsupportedTarget {
                    target: name.to_string()
                }
            );
            assert_eq!(err.exit_code(), 2);
        }
    }
}
