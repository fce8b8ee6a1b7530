//! polyarch driver binary.
//!
//! Reads textual IR from a file or stdin, compiles every function for the
//! selected target and prints the listings. Exit status 1 means unreadable or
//! malformed input, 2 an unknown target, 3 an internal compiler error.

use clap::Parser;
use polyarch::backend;
use polyarch::core::error::EXIT_BAD_INPUT;
use polyarch::core::{CompileError, CompileOptions, DEFAULT_MAX_REWRITE_ITERATIONS};
use polyarch::ir::{parse_module, SequentialAllocator};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "polyarch")]
#[command(about = "Lower textual SSA IR to machine instructions", long_about = None)]
#[command(version)]
struct Cli {
    /// Target architecture
    #[arg(short, long, default_value = "amd64")]
    target: String,

    /// Input file; stdin when omitted
    input: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Cap on passes per rewrite profile
    #[arg(long, default_value_t = DEFAULT_MAX_REWRITE_ITERATIONS)]
    max_rewrite_iterations: usize,

    /// Skip operand shape validation of emitted instructions
    #[arg(long)]
    no_validate: bool,

    /// Print compilation statistics to stderr
    #[arg(long)]
    stats: bool,

    /// List supported targets and exit
    #[arg(long)]
    list_targets: bool,
}

fn read_input(path: Option<&PathBuf>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn fail(err: &CompileError) -> ! {
    eprintln!("polyarch: {err}");
    process::exit(err.exit_code());
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_targets {
        for target in backend::supported_targets() {
            println!("{target}");
        }
        return;
    }

    // Reject the target before touching the input
    if let Err(err) = backend::select(&cli.target) {
        fail(&err);
    }

    let text = match read_input(cli.input.as_ref()) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("polyarch: cannot read input: {err}");
            process::exit(EXIT_BAD_INPUT);
        }
    };

    let functions = parse_module(&text).unwrap_or_else(|err| fail(&err));
    let options = CompileOptions::default()
        .with_jobs(cli.jobs)
        .with_max_rewrite_iterations(cli.max_rewrite_iterations)
        .with_validation(!cli.no_validate);

    let batch = backend::compile_all(&cli.target, functions, &SequentialAllocator, options)
        .unwrap_or_else(|err| fail(&err));

    for func in &batch.functions {
        println!("{func}");
    }
    if cli.stats {
        eprint!("{}", batch.stats);
    }
}
