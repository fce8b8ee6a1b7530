//! End-to-end tests of the compile pipeline through the public API.

use bumpalo::Bump;
use polyarch::backend;
use polyarch::core::{
    CompilationSession, CompileError, CompileOptions, CompiledFunction, Compiler,
};
use polyarch::ir::{parse_module, FrameLayout, Function, SequentialAllocator, StackSlot};
use polyarch::isa::amd64::names::REG_AX;
use polyarch::isa::{amd64, Emitter, Family, Inst, LowerBackend, Operand, Reg};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn compile(target: &str, text: &str) -> Result<CompiledFunction, CompileError> {
    init_logging();
    let mut funcs = parse_module(text)?;
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    backend::compile_function(
        target,
        &session,
        &mut funcs[0],
        &SequentialAllocator,
        CompileOptions::default(),
    )
}

const RET_ZERO: &str = "func zero {\nb0:\n  c = const64 $0\n  ret c\n}";

const ZERO_SLOT: &str = "\
func clear {
  slot buf 16 8 zero
b0:
  p = localaddr %buf
  ret p
}
";

const ADD64: &str = "\
func add {
b0:
  x = arg.i64 $0
  y = arg.i64 $8
  s = add64 x y
  ret s
}
";

#[test]
fn test_same_function_differs_per_target() {
    let amd = compile("amd64", RET_ZERO).unwrap();
    let arm = compile("arm64", RET_ZERO).unwrap();
    assert_ne!(amd.listing(), arm.listing());
    for out in [&amd, &arm] {
        assert_eq!(out.mnemonics().last(), Some(&"RET"));
        assert_eq!(out.frame_size, 0);
    }
    // No sensitive slots, no zeroing
    let xor_ax = Inst::new(amd64::Mnemonic::XORL, [Operand::phys(REG_AX), Operand::phys(REG_AX)]);
    assert!(!amd.insts.contains(&xor_ax));
}

#[test]
fn test_zeroed_slot_clears_ax_once() {
    let out = compile("amd64", ZERO_SLOT).unwrap();
    let xor_ax = Inst::new(amd64::Mnemonic::XORL, [Operand::phys(REG_AX), Operand::phys(REG_AX)]);
    assert_eq!(out.insts[0], xor_ax);
    assert_eq!(out.insts.iter().filter(|i| **i == xor_ax).count(), 1);
    assert_eq!(&out.mnemonics()[1..3], &["MOVQ", "MOVQ"]);
}

#[test]
fn test_arm64_frame_padding() {
    let out = compile("arm64", ZERO_SLOT).unwrap();
    assert_eq!(out.frame_size, 24);
    assert_eq!((out.frame_size + 8) % 16, 0);
    assert_eq!(compile("amd64", ZERO_SLOT).unwrap().frame_size, 16);
    assert_eq!(compile("arm64", RET_ZERO).unwrap().frame_size, 0);
}

#[test]
fn test_narrowing_runs_only_where_needed() {
    for (target, runs) in [
        ("amd64", 0),
        ("amd64p32", 0),
        ("arm64", 0),
        ("s390x", 0),
        ("mips", 1),
        ("mipsle", 1),
    ] {
        let out = compile(target, ADD64).unwrap();
        assert_eq!(out.rewrite.dec64_invocations, runs, "dec64 on {target}");
        assert_eq!(out.rewrite.generic_invocations, 1, "generic on {target}");
    }
}

#[test]
fn test_rewritten_values_are_defined_before_use() {
    init_logging();
    for target in backend::supported_targets() {
        let mut func = parse_module(ADD64).unwrap().remove(0);
        let desc = backend::select(target).unwrap();
        func.config = desc.config();
        Compiler::new(desc, CompileOptions::default())
            .rewrite(&mut func)
            .unwrap();
        func.verify().unwrap();
        assert_defined_before_use(&func);
    }
}

fn assert_defined_before_use(func: &Function) {
    let mut seen = std::collections::HashSet::new();
    for block in func.block_order() {
        for &v in &func.block(block).values {
            for arg in &func.value(v).args {
                assert!(seen.contains(arg), "{arg} used by {v} before its definition");
            }
            seen.insert(v);
        }
    }
}

#[test]
fn test_rewrite_is_idempotent() {
    init_logging();
    let compiler = Compiler::new(backend::select("mips").unwrap(), CompileOptions::default());
    let mut func = parse_module(ADD64).unwrap().remove(0);
    func.config = compiler.descriptor().config();
    compiler.rewrite(&mut func).unwrap();
    let once = func.to_string();

    let again = compiler.rewrite(&mut func).unwrap();
    assert_eq!(again.rules_fired, 0);
    assert_eq!(func.to_string(), once);
}

#[test]
fn test_unsupported_target_is_rejected() {
    let err = compile("riscv64", RET_ZERO).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedTarget { ref target } if target == "riscv64"));
    assert_eq!(err.exit_code(), 2);
}

/// Frame bytes written by stack-pointer relative stores.
fn stored_bytes(insts: &[Inst], sp: u8) -> Vec<i64> {
    let mut bytes = Vec::new();
    for inst in insts {
        let Some(Operand::Mem { base: Reg::Phys(base), offset }) = inst.args.last() else {
            continue;
        };
        if *base != sp || inst.args.len() != 2 {
            continue;
        }
        let width = match inst.mnemonic() {
            "CLEAR" => match inst.args.first() {
                Some(Operand::Imm(n)) => *n,
                _ => continue,
            },
            "MOVQ" | "MOVD" => 8,
            "MOVL" => 4,
            "MOVW" if inst.op.family() == Family::Amd64 => 2,
            "MOVW" => 4,
            "MOVH" => 2,
            "MOVB" => 1,
            _ => continue,
        };
        bytes.extend(*offset..*offset + width);
    }
    bytes.sort_unstable();
    bytes.dedup();
    bytes
}

#[test]
fn test_zero_range_and_zero_auto_agree() {
    init_logging();
    for target in backend::supported_targets() {
        let desc = backend::select(target).unwrap();
        let reg_size = desc.link.reg_size;
        // Below four words every target clears with plain stores
        let sizes = [1u64, 2, 3, 4, 5, 6, 7, 8, 12, 13, 16, 24];
        for size in sizes.into_iter().filter(|s| *s < 4 * reg_size as u64) {
            let mut frame = FrameLayout::new();
            let slot = frame
                .add_slot(StackSlot::new("s", size, reg_size as u64, true))
                .unwrap();
            frame.allocate(&SequentialAllocator, reg_size).unwrap();
            let offset = frame.slot_offset(slot).unwrap();

            let arena = Bump::new();
            let session = CompilationSession::new(&arena);
            let mut by_range = Emitter::new(&session);
            desc.backend()
                .zero_range(&mut by_range, offset, size)
                .unwrap();
            let mut by_auto = Emitter::new(&session);
            desc.backend().zero_auto(&mut by_auto, &frame, slot).unwrap();

            let range_bytes = stored_bytes(by_range.insts(), desc.reg_sp);
            let auto_bytes = stored_bytes(by_auto.insts(), desc.reg_sp);
            assert_eq!(range_bytes.len() as u64, size, "{target} zero_range of {size}");
            assert_eq!(range_bytes, auto_bytes, "{target} slot of {size}");
        }
    }
}

#[test]
fn test_oversized_frame_is_rejected() {
    let text = "func huge {\n  slot big 4294967296 4\nb0:\n  ret\n}";
    let err = compile("mips", text).unwrap_err();
    assert!(matches!(err, CompileError::FrameTooLarge { size: 4294967296, .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(compile("amd64", text).is_ok());
}

#[test]
fn test_odd_sized_slot_is_fully_cleared() {
    let text = "\
func odd {
  slot x 6 2 zero
b0:
  p = localaddr %x
  ret p
}
";
    let slot_base = [
        ("amd64", 0),
        ("amd64p32", 0),
        ("arm64", 8),
        ("mips", 4),
        ("mipsle", 4),
        ("s390x", 8),
    ];
    for (target, base) in slot_base {
        let out = compile(target, text).unwrap();
        let sp = backend::select(target).unwrap().reg_sp;
        let cleared = stored_bytes(&out.insts, sp);
        for byte in base..base + 6 {
            assert!(cleared.contains(&byte), "{target} leaves byte {byte} of x: {cleared:?}");
        }
    }
}

#[test]
fn test_overflowing_frame_is_rejected() {
    let text = "\
func vast {
  slot a 9223372036854775807 8
  slot b 9223372036854775807 8
  slot c 9223372036854775807 8
b0:
  ret
}
";
    let err = compile("arm64", text).unwrap_err();
    assert!(matches!(err, CompileError::FrameTooLarge { .. }));
    assert_eq!(err.exit_code(), 1);
}
