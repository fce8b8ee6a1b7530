// This module drives one function through the target independent pipeline for a descriptor
// it is handed: the machine independent rewrite profile, the 64-bit narrowing profile when
// the target's configuration asks for it, dead code elimination, frame allocation through a
// front-end supplied allocator, the zeroing plan, optional frame padding, and finally lowering
// block by block into the session's arena backed emitter. The entry block opens with the
// zeroing sequences of the plan. Each block has its register moves annotated before its
// values are lowered, and every emitted instruction is checked against the target's operand
// shape rules unless validation is switched off. Batches of functions are compiled on a rayon
// pool with one arena and one session per function; results keep their input order.

//! Compiler driver.
//!
//! ```text
//! for each function {
//!     rewrite(generic); rewrite(dec64) if narrowing; deadcode
//!     frame.allocate(); frame.plan_zeroing(); frame.finalize(pad_frame)
//!     entry: zero_range for each planned range
//!     for block in layout order {
//!         mark_moves(block)
//!         lower_value(v) for v in block
//!         lower_block(block, next)
//!     }
//! }
//! ```

use super::config::CompileOptions;
use super::error::{CompileError, CompileResult};
use super::session::{CompilationSession, SessionStats};
use crate::ir::{BlockId, FrameAllocator, Function};
use crate::isa::{Descriptor, Emitter, Inst, LowerCtx};
use crate::rewrite::dec64::DEC64;
use crate::rewrite::generic::GENERIC;
use crate::rewrite::{apply_rewrite, deadcode, RewriteStats};
use bumpalo::Bump;
use log::{debug, trace};
use rayon::prelude::*;
use std::fmt;

/// Machine code for one function.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub target: &'static str,
    pub insts: Vec<Inst>,
    /// Index of the first instruction of every block, in layout order.
    pub block_starts: Vec<(BlockId, usize)>,
    pub frame_size: u64,
    pub rewrite: RewriteStats,
}

impl CompiledFunction {
    /// Instructions one per line, without labels.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for inst in &self.insts {
            out.push_str(&inst.to_string());
            out.push('\n');
        }
        out
    }

    pub fn mnemonics(&self) -> Vec<&'static str> {
        self.insts.iter().map(Inst::mnemonic).collect()
    }
}

impl fmt::Display for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TEXT {}(SB) target={} frame={}",
            self.name, self.target, self.frame_size
        )?;
        let mut labels = self.block_starts.iter().peekable();
        for (pc, inst) in self.insts.iter().enumerate() {
            while let Some((block, _)) = labels.next_if(|(_, start)| *start == pc) {
                writeln!(f, "{block}:")?;
            }
            writeln!(f, "\t{inst}")?;
        }
        Ok(())
    }
}

/// Compiled functions of one batch together with the merged session statistics.
#[derive(Debug, Clone)]
pub struct CompiledBatch {
    pub functions: Vec<CompiledFunction>,
    pub stats: SessionStats,
}

/// Compiles functions for one target.
pub struct Compiler {
    desc: &'static Descriptor,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(desc: &'static Descriptor, options: CompileOptions) -> Self {
        Self { desc, options }
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        self.desc
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Run the rewrite profiles and dead code elimination.
    pub fn rewrite(&self, func: &mut Function) -> CompileResult<RewriteStats> {
        let mut stats = RewriteStats::default();
        let max = self.options.max_rewrite_iterations;

        // Rules index successor lists directly
        func.verify()?;
        apply_rewrite(func, &GENERIC, max, &mut stats)?;
        if func.config.narrow_int64() {
            apply_rewrite(func, &DEC64, max, &mut stats)?;
        }
        deadcode::eliminate(func, &mut stats);
        func.verify()?;
        Ok(stats)
    }

    /// Allocate, plan zeroing for and finalize the frame of `func`.
    fn layout_frame(
        &self,
        func: &mut Function,
        allocator: &dyn FrameAllocator,
    ) -> CompileResult<u64> {
        let reg_size = self.desc.link.reg_size;
        func.frame.allocate(allocator, reg_size)?;
        func.frame.plan_zeroing(reg_size)?;
        let padded = self.desc.backend.pad_frame(func.frame.size());
        let size = func.frame.finalize(padded)?;
        if size > self.desc.max_width {
            return Err(CompileError::FrameTooLarge {
                size,
                max: self.desc.max_width,
            });
        }
        Ok(size)
    }

    /// Compile one function.
    pub fn compile_function<'a>(
        &self,
        session: &'a CompilationSession<'a>,
        func: &mut Function,
        allocator: &dyn FrameAllocator,
    ) -> CompileResult<CompiledFunction> {
        debug!("compiling {} for {}", func.name, self.desc.name());
        session.set_current_function(&func.name);
        func.config = self.desc.config();

        let rewrite = self.rewrite(func)?;
        let frame_size = self.layout_frame(func, allocator)?;
        let func = &*func;

        let backend = self.desc.backend;
        let mut em = Emitter::new(session);
        let order = func.block_order();
        for (i, &block) in order.iter().enumerate() {
            em.start_block(block);
            if i == 0 {
                for range in func.frame.zero_ranges() {
                    trace!("zeroing {:?} of {}", range, func.name);
                    backend.zero_range(&mut em, range.offset, range.size)?;
                    session.record_zeroing(range.size);
                }
            }

            let marks = backend.mark_moves(func, block);
            let mut ctx = LowerCtx {
                func,
                em: &mut em,
                marks: &marks,
            };
            for &v in &func.block(block).values {
                backend.lower_value(&mut ctx, v)?;
            }
            backend.lower_block(&mut ctx, block, order.get(i + 1).copied())?;
        }

        if self.options.validate {
            for inst in em.insts() {
                self.desc.validate(inst)?;
            }
        }

        let (insts, block_starts) = em.finish();
        session.record_function_compiled(&func.name, insts.len());
        debug!(
            "compiled {}: {} instructions, frame {}",
            func.name,
            insts.len(),
            frame_size
        );
        Ok(CompiledFunction {
            name: func.name.clone(),
            target: self.desc.name(),
            insts,
            block_starts,
            frame_size,
            rewrite,
        })
    }

    /// Compile a batch of functions in parallel.
    ///
    /// Results are returned in input order; the first failing function (in
    /// input order) aborts the batch.
    pub fn compile_all(
        &self,
        functions: Vec<Function>,
        allocator: &dyn FrameAllocator,
    ) -> CompileResult<CompiledBatch> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|e| CompileError::internal(format!("cannot start worker pool: {e}")))?;

        let results: Vec<(CompileResult<CompiledFunction>, SessionStats)> = pool.install(|| {
            functions
                .into_par_iter()
                .map(|mut func| {
                    let arena = Bump::new();
                    let session = CompilationSession::new(&arena);
                    let result = self.compile_function(&session, &mut func, allocator);
                    (result, session.stats())
                })
                .collect()
        });

        let mut stats = SessionStats::default();
        let mut compiled = Vec::with_capacity(results.len());
        for (result, worker) in results {
            compiled.push(result?);
            stats.merge(&worker);
        }
        Ok(CompiledBatch {
            functions: compiled,
            stats,
        })
    }
}
