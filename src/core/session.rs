// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a reference to the arena that backs the per-function emission
// buffers and tracks compilation statistics with a unified lifetime. One session lives on one
// worker: sessions are not shared between threads, so interior mutability through RefCell is
// enough. SessionStats records functions compiled, instructions emitted (with a per-mnemonic
// breakdown), zeroing sequences and the largest function; stats from several workers are
// merged after a parallel batch.

//! Arena-based compilation session management.
//!
//! All scratch data produced while lowering one function is allocated in the
//! session arena and shares its lifetime; results handed to the caller are
//! copied out into owned vectors.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// Current function being compiled.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Create an empty arena-backed vector.
    pub fn new_vec<T>(&self) -> BumpVec<'arena, T> {
        BumpVec::new_in(self.arena)
    }

    /// Set current function being compiled.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    /// Name of the function currently being compiled.
    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Record that a function was compiled.
    pub fn record_function_compiled(&self, name: &str, inst_count: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;

        if stats.largest_function_size < inst_count {
            stats.largest_function_size = inst_count;
            stats.largest_function_name = name.to_string();
        }
        drop(stats);
        *self.current_function.borrow_mut() = None;
    }

    /// Record an emitted instruction.
    pub fn record_instruction(&self, mnemonic: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_emitted += 1;
        *stats
            .instruction_counts
            .entry(mnemonic.to_string())
            .or_insert(0) += 1;
    }

    /// Record a stack zeroing sequence.
    pub fn record_zeroing(&self, bytes: u64) {
        let mut stats = self.stats.borrow_mut();
        stats.zeroing_sequences += 1;
        stats.bytes_zeroed += bytes;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Number of machine instructions emitted.
    pub instructions_emitted: usize,

    /// Count of each mnemonic emitted.
    pub instruction_counts: HashMap<String, usize>,

    /// Stack zeroing sequences emitted.
    pub zeroing_sequences: usize,

    /// Bytes of stack covered by zeroing sequences.
    pub bytes_zeroed: u64,

    /// Instruction count of the largest function.
    pub largest_function_size: usize,

    /// Name of largest function.
    pub largest_function_name: String,
}

impl SessionStats {
    /// Fold the statistics of another session into this one.
    pub fn merge(&mut self, other: &SessionStats) {
        self.functions_compiled += other.functions_compiled;
        self.instructions_emitted += other.instructions_emitted;
        self.zeroing_sequences += other.zeroing_sequences;
        self.bytes_zeroed += other.bytes_zeroed;
        for (mnemonic, count) in &other.instruction_counts {
            *self.instruction_counts.entry(mnemonic.clone()).or_insert(0) += count;
        }
        if other.largest_function_size > self.largest_function_size {
            self.largest_function_size = other.largest_function_size;
            self.largest_function_name = other.largest_function_name.clone();
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(
            f,
            "  Zeroing sequences: {} ({} bytes)",
            self.zeroing_sequences, self.bytes_zeroed
        )?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (mnemonic, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", mnemonic, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 0);
        assert_eq!(stats.instructions_emitted, 0);
        assert_eq!(stats.zeroing_sequences, 0);
    }

    #[test]
    fn test_arena_allocation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let value = session.alloc(42);
        assert_eq!(*value, 42);

        let mut buf = session.new_vec();
        buf.extend_from_slice(&[1, 2, 3]);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.set_current_function("f");
        session.record_instruction("MOVQ");
        session.record_instruction("RET");
        session.record_instruction("MOVQ");
        session.record_zeroing(16);
        session.record_function_compiled("f", 3);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 1);
        assert_eq!(stats.instructions_emitted, 3);
        assert_eq!(stats.instruction_counts["MOVQ"], 2);
        assert_eq!(stats.bytes_zeroed, 16);
        assert_eq!(session.current_function(), None);
    }

    #[test]
    fn test_merge_keeps_largest_function() {
        let mut a = SessionStats {
            functions_compiled: 1,
            largest_function_size: 4,
            largest_function_name: "small".to_string(),
            ..Default::default()
        };
        let b = SessionStats {
            functions_compiled: 2,
            largest_function_size: 9,
            largest_function_name: "big".to_string(),
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.functions_compiled, 3);
        assert_eq!(a.largest_function_name, "big");
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_instruction("RET");
        session.record_function_compiled("main", 1);

        let output = format!("{}", session.stats());
        assert!(output.contains("Functions compiled: 1"));
        assert!(output.contains("main (1 instructions)"));
        assert!(output.contains("RET: 1"));
    }
}
