//! Lift-script interpreter.
//!
//! Runs a lift script against the register file and prints, per block, the
//! values every read produced, the emitted IR and the live-out state. With
//! `--check` the CHECK directives in the script are validated instead;
//! `--arch` and `--stats` then take precedence over the script's RUN line.

use std::fs;
use std::io::{self, Read};
use std::process;

use clap::Parser;
use lifter::core::ArchConfig;
use lifter::test_ir::{run_source, RunOptions, TestRunner, TestSpec};

#[derive(Parser, Debug)]
#[command(name = "regtrace", about = "Trace register-file state through a lift script")]
struct Args {
    /// Architecture overriding the script's `arch` line (x86_64, x86_64-avx, aarch64)
    #[arg(long)]
    arch: Option<String>,

    /// Print register-file statistics after each block
    #[arg(long)]
    stats: bool,

    /// Validate the script's CHECK directives against the output
    #[arg(long)]
    check: bool,

    /// Print the output of a successful check
    #[arg(short, long)]
    verbose: bool,

    /// Script path, or `-` for stdin
    input: String,
}

fn read_input(path: &str) -> io::Result<String> {
    if path == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let source = read_input(&args.input)?;
    let arch = match args.arch.as_deref() {
        Some(name) => match ArchConfig::by_name(name) {
            Some(arch) => Some(arch),
            None => {
                eprintln!("Error: unknown architecture `{name}`");
                process::exit(2);
            }
        },
        None => None,
    };
    let options = RunOptions { arch, stats: args.stats };

    if args.check {
        let spec = TestSpec::parse(&source);
        match TestRunner::new(args.verbose).run_test_with(&spec, &options) {
            Ok(output) => {
                if args.verbose {
                    print!("{output}");
                }
                println!("{}: ok", args.input);
                Ok(())
            }
            Err(e) => {
                eprintln!("{}: {}", args.input, e);
                process::exit(1);
            }
        }
    } else {
        match run_source(&source, &options) {
            Ok(output) => {
                print!("{output}");
                Ok(())
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }
}
