//! Test utilities for arena-based testing.
//!
//! Every helper creates its own bounded arena and session, so tests never
//! share emission buffers.

use super::config::CompileOptions;
use super::error::CompileResult;
use super::session::CompilationSession;
use super::{CompiledFunction, Compiler};
use crate::backend;
use crate::ir::{parse_module, SequentialAllocator};
use crate::isa::{Emitter, Family, Inst, Operand, Reg};
use bumpalo::Bump;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test context that owns the arena of one compilation session.
pub struct TestContext {
    arena: Bump,
}

impl TestContext {
    pub fn new() -> Self {
        Self { arena: Bump::new() }
    }

    /// Run `f` with a session borrowing this context's arena.
    pub fn with_session<F, R>(&self, f: F) -> R
    where
        F: for<'s> FnOnce(&'s CompilationSession<'s>) -> R,
    {
        let session = CompilationSession::new(&self.arena);
        f(&session)
    }

    /// Bytes the arena has handed out so far.
    pub fn memory_used(&self) -> usize {
        self.arena.allocated_bytes()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit into a scratch emitter and return the instructions.
pub fn emit_with<F>(f: F) -> Vec<Inst>
where
    F: FnOnce(&mut Emitter<'_>),
{
    init_logging();
    let ctx = TestContext::new();
    ctx.with_session(|session| {
        let mut em = Emitter::new(session);
        f(&mut em);
        em.finish().0
    })
}

fn stack_pointer(family: Family) -> u8 {
    match family {
        Family::Amd64 => crate::isa::amd64::names::REG_SP,
        Family::Arm64 => crate::isa::arm64::names::REGSP,
        Family::Mips => crate::isa::mips::names::REGSP,
        Family::S390x => crate::isa::s390x::names::REGSP,
    }
}

fn store_width(family: Family, inst: &Inst) -> Option<u64> {
    let width = match (family, inst.mnemonic()) {
        (Family::S390x, "CLEAR") => match inst.args.first() {
            Some(Operand::Imm(n)) => *n as u64,
            _ => return None,
        },
        (Family::Amd64, "MOVQ") => 8,
        (Family::Amd64, "MOVL") => 4,
        (Family::Amd64, "MOVW") => 2,
        (_, "MOVD") => 8,
        (_, "MOVW") => 4,
        (_, "MOVH") => 2,
        (_, "MOVB") => 1,
        _ => return None,
    };
    Some(width)
}

/// Sorted frame offsets written by stack-pointer relative stores in `insts`.
///
/// Offsets are relative to the stack pointer, so they include any fixed save
/// area the target keeps below the frame.
pub fn stored_bytes(insts: &[Inst]) -> Vec<i64> {
    let mut bytes = Vec::new();
    for inst in insts {
        let family = inst.op.family();
        let Some(Operand::Mem {
            base: Reg::Phys(base),
            offset,
        }) = inst.args.last()
        else {
            continue;
        };
        if *base != stack_pointer(family) || inst.args.len() != 2 {
            continue;
        }
        if let Some(width) = store_width(family, inst) {
            bytes.extend(*offset..*offset + width as i64);
        }
    }
    bytes.sort_unstable();
    bytes.dedup();
    bytes
}

/// Compile the first function of `text` for `target` with default options.
pub fn try_compile_text(target: &str, text: &str) -> CompileResult<CompiledFunction> {
    init_logging();
    let desc = backend::select(target)?;
    let mut funcs = parse_module(text)?;
    let compiler = Compiler::new(desc, CompileOptions::default());
    let ctx = TestContext::new();
    ctx.with_session(|session| {
        compiler.compile_function(session, &mut funcs[0], &SequentialAllocator)
    })
}

/// Like [`try_compile_text`], panicking on errors.
pub fn compile_text(target: &str, text: &str) -> CompiledFunction {
    match try_compile_text(target, text) {
        Ok(out) => out,
        Err(e) => panic!("compiling for {target} failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::amd64::Mnemonic;

    #[test]
    fn test_stored_bytes_ignores_loads_and_other_bases() {
        let insts = vec![
            Inst::new(Mnemonic::MOVQ, [Operand::phys(0), Operand::mem(4, 8)]),
            Inst::new(Mnemonic::MOVL, [Operand::mem(4, 0), Operand::phys(0)]),
            Inst::new(Mnemonic::MOVQ, [Operand::phys(0), Operand::mem(7, 0)]),
            Inst::new(Mnemonic::MOVB, [Operand::Imm(0), Operand::mem(4, 16)]),
        ];
        assert_eq!(stored_bytes(&insts), vec![8, 9, 10, 11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn test_sessions_use_their_own_arena() {
        let ctx = TestContext::new();
        let before = ctx.memory_used();
        ctx.with_session(|session| {
            let mut v = session.new_vec();
            v.extend_from_slice(&[1u64; 64]);
        });
        assert!(ctx.memory_used() > before);
    }
}
