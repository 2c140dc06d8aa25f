//! The job-control context shared by the executor and the builtins.

use crate::builtins;
use crate::config::ShellConfig;
use crate::error::ShellResult;
use crate::exec;
use crate::pipeline::Pipeline;
use crate::registry::JobRegistry;
use crate::signals::{Blocked, SignalCell, SignalGate};
use crate::terminal::Terminal;

/// Everything a job-control operation needs: the registry, the gate that
/// guards it, and the terminal (when there is one to manage).
///
/// The registry cell is owned by the caller, which also attaches it to the
/// signal handlers:
///
/// ```ignore
/// let jobs = SignalCell::new(JobRegistry::new());
/// let _handlers = signals::install(&jobs)?;
/// let control = JobControl::new(&jobs, &ShellConfig::default());
/// control.execute(&pipeline)?;
/// ```
pub struct JobControl<'a> {
    jobs: &'a SignalCell<JobRegistry>,
    gate: SignalGate,
    terminal: Option<Terminal>,
}

impl<'a> JobControl<'a> {
    pub fn new(jobs: &'a SignalCell<JobRegistry>, config: &ShellConfig) -> Self {
        let terminal = if config.job_control {
            Terminal::stdin()
        } else {
            None
        };
        match &terminal {
            Some(t) => tracing::debug!(shell_group = t.shell_group().as_raw(), "job control enabled"),
            None => tracing::debug!("job control without a terminal"),
        }
        Self {
            jobs,
            gate: SignalGate::job_control(),
            terminal,
        }
    }

    pub fn jobs(&self) -> &'a SignalCell<JobRegistry> {
        self.jobs
    }

    pub fn gate(&self) -> &SignalGate {
        &self.gate
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    /// Block the job-control signals.
    pub fn block(&self) -> ShellResult<Blocked> {
        self.gate.block()
    }

    /// Sleep until no job is in the foreground.
    pub fn wait_for_foreground(&self, blocked: &mut Blocked) {
        blocked.suspend_until(self.jobs, |jobs| !jobs.has_foreground_job());
    }

    /// Run a parsed line: a builtin if it names one, a new job otherwise.
    pub fn execute(&self, pipeline: &Pipeline) -> ShellResult<()> {
        if builtins::handle_builtin(self, pipeline)? {
            return Ok(());
        }
        exec::create_job(self, pipeline)
    }
}
