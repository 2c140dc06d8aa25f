//! Job creation: one forked process per command, connected by pipes, all in
//! one process group.
//!
//! The job-control signals stay blocked from the moment the job is registered
//! until the shell is done with it, so a child that exits straight away is
//! still recorded before the reconciler can look for it.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::sys::signal::Signal;
use nix::unistd::{close, dup2, execvp, fork, getpgrp, pipe2, setpgid, ForkResult, Pid};

use crate::control::JobControl;
use crate::error::{ShellError, ShellResult, SysContext};
use crate::job::{Job, JobId, Placement, Process};
use crate::pipeline::{Command, Pipeline};
use crate::registry::JobRegistry;
use crate::signals::{self, Blocked, SignalGate};
use crate::terminal::Terminal;

/// A command converted for `execvp` ahead of the fork.
#[derive(Debug)]
struct Prepared {
    name: String,
    program: CString,
    argv: Vec<CString>,
    text: String,
}

impl Prepared {
    fn new(command: &Command) -> ShellResult<Self> {
        let to_c = |s: &str| {
            CString::new(s).map_err(|_| {
                ShellError::Usage(format!("{}: argument contains a NUL byte", command.program))
            })
        };
        let program = to_c(&command.program)?;
        let mut argv = Vec::with_capacity(command.args.len() + 1);
        argv.push(program.clone());
        for arg in &command.args {
            argv.push(to_c(arg)?);
        }
        Ok(Self {
            name: command.program.clone(),
            program,
            argv,
            text: command.to_string(),
        })
    }
}

/// Create a job for `pipeline` and start its processes.
///
/// Foreground jobs block until they finish or stop; background jobs print
/// `[id] pid ...` and return at once.
#[tracing::instrument(level = "debug", skip(control, pipeline), fields(background = pipeline.background, command_count = pipeline.commands.len()))]
pub fn create_job(control: &JobControl<'_>, pipeline: &Pipeline) -> ShellResult<()> {
    if pipeline.commands.is_empty() {
        return Err(ShellError::Usage("empty pipeline".to_string()));
    }
    let commands = pipeline
        .commands
        .iter()
        .map(Prepared::new)
        .collect::<ShellResult<Vec<_>>>()?;

    let mut blocked = control.block()?;
    let placement = if pipeline.background {
        Placement::Background
    } else {
        Placement::Foreground
    };
    let id = control.jobs().get_mut(&mut blocked).add_job(placement);

    let result = launch(control, &mut blocked, id, pipeline, &commands);
    if let Err(e) = &result {
        tracing::debug!(job = %id, "job creation failed: {}", e);
        abandon(control.jobs().get_mut(&mut blocked), id);
    }
    result
}

fn launch(
    control: &JobControl<'_>,
    blocked: &mut Blocked,
    id: JobId,
    pipeline: &Pipeline,
    commands: &[Prepared],
) -> ShellResult<()> {
    let foreground = !pipeline.background;
    let terminal = control
        .terminal()
        .filter(|_| foreground && pipeline.input.is_none());
    // Taken before the first fork: that child grabs the terminal itself.
    let lease = terminal.map(Terminal::lease).transpose()?;

    // Both redirect targets open before anything forks.
    let mut input = pipeline.input.as_deref().map(open_input).transpose()?;
    let mut target = pipeline.output.as_deref().map(open_output).transpose()?;
    let last = commands.len() - 1;

    for (index, command) in commands.iter().enumerate() {
        let (output, next_input) = if index < last {
            let (read, write) = pipe2(OFlag::O_CLOEXEC).sys("pipe")?;
            (Some(write), Some(read))
        } else {
            (target.take(), None)
        };

        let jobs = control.jobs().get_mut(blocked);
        let group = jobs.job(id).and_then(Job::group_id);
        let setup = ChildSetup {
            group,
            terminal: terminal.filter(|_| index == 0),
            stdin: input.as_ref().map(AsRawFd::as_raw_fd),
            stdout: output.as_ref().map(AsRawFd::as_raw_fd),
            gate: control.gate(),
        };
        let pid = spawn(command, &setup)?;

        let job = jobs
            .job_mut(id)
            .ok_or_else(|| ShellError::Lookup(format!("job {id} vanished during creation")))?;
        job.add_process(Process::new(pid, command.text.clone()));
        join_group(pid, group.unwrap_or(pid))?;
        tracing::debug!(job = %id, pid = pid.as_raw(), command = %command.text, "started process");

        // The parent's copies close here; the children hold their own.
        drop(output);
        input = next_input;
    }

    let job = control
        .jobs()
        .get(blocked)
        .job(id)
        .ok_or_else(|| ShellError::Lookup(format!("job {id} vanished during creation")))?;
    let group = job.group_id();

    if foreground {
        tracing::info!(job = %id, "running in foreground");
        if let (Some(lease), Some(pgid)) = (&lease, group) {
            lease.give_to(pgid)?;
        }
        control.wait_for_foreground(blocked);
    } else {
        tracing::info!(job = %id, "running in background");
        println!("{}", job.started_notice());
    }
    Ok(())
}

/// Leave the registry consistent after a failed launch: forget a job with no
/// processes, and keep a partly started one tracked in the background.
fn abandon(jobs: &mut JobRegistry, id: JobId) {
    let started = jobs.job(id).map_or(0, |job| job.processes().len());
    if started == 0 {
        jobs.remove(id);
    } else if jobs.set_placement(id, Placement::Background).is_ok() {
        tracing::warn!(job = %id, started, "pipeline only partly started; job moved to background");
    }
}

fn open_input(path: &Path) -> ShellResult<OwnedFd> {
    File::open(path)
        .map(OwnedFd::from)
        .map_err(|source| ShellError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

fn open_output(path: &Path) -> ShellResult<OwnedFd> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map(OwnedFd::from)
        .map_err(|source| ShellError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

/// Put `pid` into `pgid` from the parent side.
///
/// The child makes the same call; whichever runs second finds the work done
/// (`EACCES` once the child has exec'd, `ESRCH` once it has exited).
fn join_group(pid: Pid, pgid: Pid) -> ShellResult<()> {
    match setpgid(pid, pgid) {
        Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(ShellError::SystemCall {
            op: "setpgid",
            errno,
        }),
    }
}

/// What a forked child does before exec.
struct ChildSetup<'a> {
    /// Group to join; `None` starts a new group led by the child.
    group: Option<Pid>,
    /// Set only for the first process of a foreground job reading the terminal.
    terminal: Option<&'a Terminal>,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    gate: &'a SignalGate,
}

impl ChildSetup<'_> {
    fn apply(&self) -> ShellResult<()> {
        signals::reset_to_default(&[
            Signal::SIGCHLD,
            Signal::SIGINT,
            Signal::SIGTSTP,
            Signal::SIGQUIT,
        ])?;
        self.gate.unblock()?;

        setpgid(Pid::from_raw(0), self.group.unwrap_or(Pid::from_raw(0))).sys("setpgid")?;
        if let Some(terminal) = self.terminal {
            terminal.give_to(getpgrp())?;
        }
        // SIGTTOU stays ignored until the terminal is ours.
        signals::reset_to_default(&[Signal::SIGTTIN, Signal::SIGTTOU])?;

        if let Some(fd) = self.stdin {
            redirect(fd, STDIN_FILENO)?;
        }
        if let Some(fd) = self.stdout {
            redirect(fd, STDOUT_FILENO)?;
        }
        Ok(())
    }
}

fn redirect(fd: RawFd, target: RawFd) -> ShellResult<()> {
    if fd == target {
        return Ok(());
    }
    dup2(fd, target).sys("dup2")?;
    close(fd).sys("close")
}

fn spawn(command: &Prepared, setup: &ChildSetup<'_>) -> ShellResult<Pid> {
    // SAFETY: the shell is single-threaded, and the child goes straight to
    // `run_child`, which never returns.
    match unsafe { fork() }.sys("fork")? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => run_child(command, setup),
    }
}

/// Child side of the fork: set up, exec, or die. Never returns to the caller.
fn run_child(command: &Prepared, setup: &ChildSetup<'_>) -> ! {
    let error = match setup.apply() {
        Ok(()) => exec(command),
        Err(e) => e,
    };
    let _ = writeln!(std::io::stderr(), "stsh: {error}");
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, none of which
    // belong to the child's copy of the shell.
    unsafe { nix::libc::_exit(error.child_exit_code()) }
}

fn exec(command: &Prepared) -> ShellError {
    match execvp(&command.program, &command.argv) {
        Ok(never) => match never {},
        Err(Errno::ENOENT) => ShellError::UnsupportedCommand(command.name.clone()),
        Err(errno) => ShellError::SystemCall { op: "execvp", errno },
    }
}
