//! stsh REPL: the input loop around the job-control kernel.
//!
//! Reads one line at a time, parses it into a pipeline, and hands it to the
//! kernel. Errors are reported as `stsh: <message>` and the loop carries on;
//! only `quit`/`exit`, end of input, or `SIGQUIT` end the session.
//!
//! Lines come from rustyline when standard input is a terminal, and are read
//! plainly otherwise (piped scripts, tests).

use std::io::{BufRead, IsTerminal};

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use stsh_kernel::signals;
use stsh_kernel::{parse, JobControl, JobRegistry, ShellConfig, ShellResult, SignalCell};

/// One shell session bound to a job registry.
pub struct Repl<'a> {
    control: JobControl<'a>,
}

impl<'a> Repl<'a> {
    pub fn new(jobs: &'a SignalCell<JobRegistry>, config: &ShellConfig) -> Self {
        Self {
            control: JobControl::new(jobs, config),
        }
    }

    /// Parse and run one line. Blank lines do nothing.
    pub fn process_line(&self, line: &str) -> ShellResult<()> {
        let Some(pipeline) = parse(line)? else {
            return Ok(());
        };
        self.control.execute(&pipeline)
    }

    /// Run a line, printing any error. Returns false if it failed.
    fn report(&self, line: &str) -> bool {
        match self.process_line(line) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(line, "line failed: {:?}", e);
                eprintln!("stsh: {e}");
                false
            }
        }
    }

    fn interactive(&self, prompt: &str) -> Result<()> {
        let mut rl: Editor<(), DefaultHistory> =
            Editor::new().context("Failed to create editor")?;

        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        if let Err(e) = rl.add_history_entry(line.as_str()) {
                            tracing::warn!("Failed to add history entry: {}", e);
                        }
                    }
                    self.report(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("stsh: {}", err);
                    break;
                }
            }
        }
        Ok(())
    }

    fn scripted(&self, input: impl BufRead) -> Result<()> {
        for line in input.lines() {
            let line = line.context("Failed to read input")?;
            self.report(&line);
        }
        Ok(())
    }
}

/// Run the REPL on standard input until end of input or `quit`.
pub fn run(config: ShellConfig) -> Result<()> {
    let jobs = SignalCell::new(JobRegistry::new());
    let _handlers = signals::install(&jobs).context("Failed to install signal handlers")?;
    let repl = Repl::new(&jobs, &config);

    if std::io::stdin().is_terminal() {
        repl.interactive(&config.prompt)
    } else {
        repl.scripted(std::io::stdin().lock())
    }
}

/// Run a single line (`stsh -c`). Returns false if the line failed.
pub fn run_line(config: ShellConfig, line: &str) -> Result<bool> {
    let jobs = SignalCell::new(JobRegistry::new());
    let _handlers = signals::install(&jobs).context("Failed to install signal handlers")?;
    Ok(Repl::new(&jobs, &config).report(line))
}
