//! fg, bg: continue a job in the foreground or background.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

use super::no_such_job;
use crate::control::JobControl;
use crate::error::{ShellError, ShellResult, SysContext};
use crate::job::{JobId, Placement};
use crate::registry::JobRegistry;
use crate::terminal::Terminal;

/// Process group of `id`, and whether any of its processes is stopped.
fn inspect(jobs: &JobRegistry, id: JobId) -> ShellResult<(Pid, bool)> {
    let job = jobs.job(id).ok_or_else(|| no_such_job(id))?;
    let group = job
        .group_id()
        .ok_or_else(|| ShellError::Lookup(format!("job {id} has no processes")))?;
    Ok((group, job.has_stopped()))
}

/// `fg <jobid>`: make the job the foreground job, give it the terminal,
/// continue it if stopped, and wait until it finishes or stops.
pub(super) fn foreground(control: &JobControl<'_>, id: JobId) -> ShellResult<()> {
    let mut blocked = control.block()?;
    let jobs = control.jobs().get_mut(&mut blocked);
    let (group, stopped) = inspect(jobs, id)?;

    let lease = control.terminal().map(Terminal::lease).transpose()?;
    jobs.set_placement(id, Placement::Foreground)?;

    let started = lease
        .as_ref()
        .map_or(Ok(()), |lease| lease.give_to(group))
        .and_then(|()| {
            if stopped {
                killpg(group, Signal::SIGCONT).sys("killpg")
            } else {
                Ok(())
            }
        });
    if let Err(e) = started {
        // Never leave a foreground job nobody is waiting on.
        let _ = jobs.set_placement(id, Placement::Background);
        return Err(e);
    }

    tracing::info!(job = %id, continued = stopped, "job moved to foreground");
    control.wait_for_foreground(&mut blocked);
    Ok(())
}

/// `bg <jobid>`: continue the job if stopped and leave it in the background.
pub(super) fn background(control: &JobControl<'_>, id: JobId) -> ShellResult<()> {
    let mut blocked = control.block()?;
    let jobs = control.jobs().get_mut(&mut blocked);
    let (group, stopped) = inspect(jobs, id)?;

    if stopped {
        killpg(group, Signal::SIGCONT).sys("killpg")?;
    }
    jobs.set_placement(id, Placement::Background)?;
    tracing::info!(job = %id, continued = stopped, "job moved to background");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Process, ProcessState};

    #[test]
    fn inspect_reports_group_and_stopped_members() {
        let mut jobs = JobRegistry::new();
        let id = jobs.add_job(Placement::Background);
        let job = jobs.job_mut(id).unwrap();
        job.add_process(Process::new(Pid::from_raw(71), "a"));
        job.add_process(Process::new(Pid::from_raw(72), "b"));
        assert_eq!(inspect(&jobs, id).unwrap(), (Pid::from_raw(71), false));

        jobs.update_process(Pid::from_raw(72), ProcessState::Stopped);
        assert_eq!(inspect(&jobs, id).unwrap(), (Pid::from_raw(71), true));
    }

    #[test]
    fn inspect_unknown_job_is_lookup_error() {
        let jobs = JobRegistry::new();
        let err = inspect(&jobs, JobId(9)).unwrap_err();
        assert_eq!(err.to_string(), "no job with id 9");
    }
}
