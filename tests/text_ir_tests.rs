//! Filetests for the textual IR.
//!
//! Each `tests/filetests/*.pir` file names its target in a `; TARGET:` line and
//! lists `; CHECK:` patterns that must appear, in order, in the printed
//! listing. Whitespace is normalized on both sides before matching.

use bumpalo::Bump;
use polyarch::backend;
use polyarch::core::{CompilationSession, CompileOptions};
use polyarch::ir::{parse_module, SequentialAllocator};
use std::fs;
use std::path::{Path, PathBuf};

struct FileTest {
    target: String,
    checks: Vec<String>,
}

fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_directives(content: &str) -> Result<FileTest, String> {
    let mut target = None;
    let mut checks = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("; TARGET:") {
            target = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("; CHECK:") {
            checks.push(normalize(rest));
        }
    }
    let target = target.ok_or("missing ; TARGET: line")?;
    if checks.is_empty() {
        return Err("no ; CHECK: lines".to_string());
    }
    Ok(FileTest { target, checks })
}

fn run_file(path: &Path) -> Result<(), String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let test = parse_directives(&content)?;

    let mut output = String::new();
    for mut func in parse_module(&content).map_err(|e| e.to_string())? {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let compiled = backend::compile_function(
            &test.target,
            &session,
            &mut func,
            &SequentialAllocator,
            CompileOptions::default(),
        )
        .map_err(|e| e.to_string())?;
        output.push_str(&compiled.to_string());
    }

    let lines: Vec<String> = output.lines().map(normalize).collect();
    let mut pos = 0;
    for check in &test.checks {
        match lines[pos..].iter().position(|l| l.contains(check.as_str())) {
            Some(found) => pos += found + 1,
            None => {
                return Err(format!(
                    "CHECK {check:?} not found after line {pos}\n--- output ---\n{output}"
                ))
            }
        }
    }
    Ok(())
}

fn filetests() -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetests");
    let mut files: Vec<PathBuf> = fs::read_dir(&dir)
        .expect("filetests directory")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "pir"))
        .collect();
    files.sort();
    files
}

#[test]
fn test_filetests() {
    let _ = env_logger::builder().is_test(true).try_init();

    let files = filetests();
    assert!(!files.is_empty(), "no filetests found");

    let mut failures = Vec::new();
    for path in &files {
        if let Err(e) = run_file(path) {
            failures.push(format!("{}: {}", path.display(), e));
        }
    }
    assert!(
        failures.is_empty(),
        "{} of {} filetests failed:\n{}",
        failures.len(),
        files.len(),
        failures.join("\n")
    );
}

#[test]
fn test_directive_parsing() {
    let test = parse_directives("; TARGET: mips\n; CHECK:  MOVW\tR0,  4(R29)\nfunc f {\n}\n")
        .unwrap();
    assert_eq!(test.target, "mips");
    assert_eq!(test.checks, vec!["MOVW R0, 4(R29)".to_string()]);
    assert!(parse_directives("; CHECK: RET").is_err());
    assert!(parse_directives("; TARGET: amd64").is_err());
}

#[test]
fn test_parallel_batch_keeps_input_order() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut text = String::new();
    for i in 0..24 {
        text.push_str(&format!(
            "func f{i} {{\n  slot s {} 8 zero\nb0:\n  p = localaddr %s\n  ret p\n}}\n",
            8 * (i % 6 + 1)
        ));
    }
    for target in backend::supported_targets() {
        let batch = backend::compile_all(
            target,
            parse_module(&text).unwrap(),
            &SequentialAllocator,
            CompileOptions::default().with_jobs(4),
        )
        .unwrap();
        let names: Vec<_> = batch.functions.iter().map(|f| f.name.clone()).collect();
        let expected: Vec<_> = (0..24).map(|i| format!("f{i}")).collect();
        assert_eq!(names, expected, "order for {target}");
        assert_eq!(batch.stats.functions_compiled, 24);
        assert_eq!(batch.stats.zeroing_sequences, 24);
    }
}
