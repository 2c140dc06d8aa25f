//! stsh CLI entry point.
//!
//! Usage:
//!   stsh                       # Interactive shell
//!   stsh -c <line>             # Run one line and exit

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use stsh_kernel::ShellConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("stsh: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            stsh_repl::run(ShellConfig::default())?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("stsh {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let line = args.get(2).context("-c requires a command argument")?;
            if stsh_repl::run_line(ShellConfig::default(), line)? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'stsh --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"stsh v{}: a job-control shell

Usage:
  stsh                         Interactive shell
  stsh -c <line>               Run one line and exit

Options:
  -c <line>                    Run a command line and exit
  -h, --help                   Show this help
  -V, --version                Show version

Builtins:
  fg <jobid>                   Continue a job in the foreground
  bg <jobid>                   Continue a job in the background
  halt <jobid> <index> | <pid> Stop one process
  cont <jobid> <index> | <pid> Continue one process
  slay <jobid> <index> | <pid> Kill one process
  jobs                         List jobs
  quit, exit                   Leave the shell

Environment:
  STSH_PROMPT                  Prompt string (default "stsh> ")
  RUST_LOG                     Log filter, e.g. stsh_kernel=debug
"#,
        env!("CARGO_PKG_VERSION")
    );
}
