//! slay, halt, cont: signal one process of a job.

use nix::sys::signal::{kill, Signal};

use super::{no_such_job, Target};
use crate::control::JobControl;
use crate::error::{ShellError, ShellResult, SysContext};
use crate::job::{Process, ProcessState};
use crate::registry::JobRegistry;

/// `slay`: SIGKILL, always sent to a live process.
pub(super) fn slay(control: &JobControl<'_>, target: Target) -> ShellResult<()> {
    send(control, target, Signal::SIGKILL, None)
}

/// `halt`: SIGSTOP, skipped when the process is already stopped.
pub(super) fn halt(control: &JobControl<'_>, target: Target) -> ShellResult<()> {
    send(control, target, Signal::SIGSTOP, Some(ProcessState::Stopped))
}

/// `cont`: SIGCONT, skipped when the process is already running.
pub(super) fn cont(control: &JobControl<'_>, target: Target) -> ShellResult<()> {
    send(control, target, Signal::SIGCONT, Some(ProcessState::Running))
}

fn send(
    control: &JobControl<'_>,
    target: Target,
    signal: Signal,
    already: Option<ProcessState>,
) -> ShellResult<()> {
    let blocked = control.block()?;
    let process = live(resolve(control.jobs().get(&blocked), target)?)?;
    let pid = process.pid();

    if Some(process.state()) == already {
        tracing::debug!(pid = pid.as_raw(), state = %process.state(), "nothing to do");
        return Ok(());
    }
    kill(pid, signal).sys("kill")?;
    tracing::info!(pid = pid.as_raw(), "sent {}", signal);
    Ok(())
}

fn resolve(jobs: &JobRegistry, target: Target) -> ShellResult<&Process> {
    match target {
        Target::Pid(pid) => jobs
            .job_with_pid(pid)
            .and_then(|job| job.process_with_pid(pid))
            .ok_or_else(|| ShellError::Lookup(format!("no job contains pid {pid}"))),
        Target::Indexed { job, index } => jobs
            .job(job)
            .ok_or_else(|| no_such_job(job))?
            .process(index)
            .ok_or_else(|| ShellError::Lookup(format!("job {job} has no process {index}"))),
    }
}

/// A terminated process may already have been reaped, and its pid reused.
fn live(process: &Process) -> ShellResult<&Process> {
    if process.state() == ProcessState::Terminated {
        return Err(ShellError::Lookup(format!(
            "process {} has already terminated",
            process.pid()
        )));
    }
    Ok(process)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, Placement};
    use nix::unistd::Pid;
    use rstest::rstest;

    fn registry() -> JobRegistry {
        let mut jobs = JobRegistry::new();
        let id = jobs.add_job(Placement::Background);
        let job = jobs.job_mut(id).unwrap();
        job.add_process(Process::new(Pid::from_raw(101), "yes"));
        job.add_process(Process::new(Pid::from_raw(102), "head -1"));
        jobs
    }

    #[rstest]
    #[case(Target::Pid(Pid::from_raw(102)), 102)]
    #[case(Target::Indexed { job: JobId(1), index: 0 }, 101)]
    #[case(Target::Indexed { job: JobId(1), index: 1 }, 102)]
    fn resolves(#[case] target: Target, #[case] expected: i32) {
        let jobs = registry();
        assert_eq!(resolve(&jobs, target).unwrap().pid(), Pid::from_raw(expected));
    }

    #[rstest]
    #[case(Target::Pid(Pid::from_raw(999)), "no job contains pid 999")]
    #[case(Target::Indexed { job: JobId(2), index: 0 }, "no job with id 2")]
    #[case(Target::Indexed { job: JobId(1), index: 2 }, "job 1 has no process 2")]
    fn unknown_targets_are_lookup_errors(#[case] target: Target, #[case] message: &str) {
        let jobs = registry();
        let err = resolve(&jobs, target).unwrap_err();
        assert!(matches!(err, ShellError::Lookup(_)));
        assert_eq!(err.to_string(), message);
    }

    #[rstest]
    #[case(ProcessState::Running)]
    #[case(ProcessState::Stopped)]
    fn live_processes_pass(#[case] state: ProcessState) {
        let mut process = Process::new(Pid::from_raw(101), "yes");
        process.set_state(state);
        assert_eq!(live(&process).unwrap().pid(), Pid::from_raw(101));
    }

    #[test]
    fn terminated_processes_are_lookup_errors() {
        let mut process = Process::new(Pid::from_raw(101), "yes");
        process.set_state(ProcessState::Terminated);
        let err = live(&process).unwrap_err();
        assert!(matches!(err, ShellError::Lookup(_)));
        assert_eq!(err.to_string(), "process 101 has already terminated");
    }
}
