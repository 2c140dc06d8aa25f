//! The job registry: every live job, addressed by job id or member pid.
//!
//! The registry is an arena of job slots indexed by `id - 1`, so the smallest
//! free id is reused and callers hold integer keys rather than references.
//!
//! It is mutated from the `SIGCHLD` handler, so the operations reachable from
//! there ([`JobRegistry::update_process`], [`JobRegistry::synchronize`]) never
//! allocate or free: a finished job is moved into a retirement list whose
//! capacity was reserved ahead of time, and dropped later from main-line code.

use std::fmt;

use nix::unistd::Pid;

use crate::error::{ShellError, ShellResult};
use crate::job::{Job, JobId, Placement, ProcessState};

/// Owning collection of all live jobs.
#[derive(Debug, Default)]
pub struct JobRegistry {
    slots: Vec<Option<Job>>,
    retired: Vec<Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty job under the smallest free id.
    ///
    /// A foreground job demotes any other foreground job.
    pub fn add_job(&mut self, placement: Placement) -> JobId {
        self.collect_retired();

        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = JobId(index + 1);
        if placement == Placement::Foreground {
            self.demote_foreground();
        }
        self.slots[index] = Some(Job::new(id, placement));

        // Every live job may retire before the next call here.
        let live = self.len();
        self.retired.reserve(live);
        id
    }

    /// Drop jobs retired since the last call.
    pub fn collect_retired(&mut self) {
        self.retired.clear();
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        let index = id.0.checked_sub(1)?;
        self.slots.get(index)?.as_ref()
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        let index = id.0.checked_sub(1)?;
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn contains_job(&self, id: JobId) -> bool {
        self.job(id).is_some()
    }

    /// The job owning `pid`, if any.
    pub fn job_with_pid(&self, pid: Pid) -> Option<&Job> {
        self.iter().find(|job| job.contains_pid(pid))
    }

    pub fn foreground_job(&self) -> Option<&Job> {
        self.iter().find(|job| job.is_foreground())
    }

    pub fn has_foreground_job(&self) -> bool {
        self.foreground_job().is_some()
    }

    /// Move a job to the foreground or background.
    ///
    /// Moving a job to the foreground demotes whichever job held it before, so
    /// at most one job is ever in the foreground.
    pub fn set_placement(&mut self, id: JobId, placement: Placement) -> ShellResult<()> {
        if !self.contains_job(id) {
            return Err(ShellError::Lookup(format!("no job with id {id}")));
        }
        if placement == Placement::Foreground {
            self.demote_foreground();
        }
        if let Some(job) = self.job_mut(id) {
            job.set_placement(placement);
        }
        Ok(())
    }

    /// Apply a reported state change to the process with `pid` and
    /// synchronize its job. Returns false when no job owns `pid`.
    pub fn update_process(&mut self, pid: Pid, state: ProcessState) -> bool {
        let Some(id) = self.job_with_pid(pid).map(Job::id) else {
            return false;
        };
        if let Some(job) = self.job_mut(id) {
            job.set_process_state(pid, state);
        }
        self.synchronize(id);
        true
    }

    /// Bring a job's placement in line with its processes.
    ///
    /// A job whose processes have all terminated is removed. A foreground job
    /// whose live processes are all stopped is moved to the background.
    pub fn synchronize(&mut self, id: JobId) {
        let Some(job) = self.job_mut(id) else {
            return;
        };
        if job.is_complete() {
            self.remove(id);
        } else if job.is_foreground() && job.is_stopped() {
            job.set_placement(Placement::Background);
        }
    }

    /// Remove a job. The record is kept aside until the next `add_job` or
    /// `collect_retired`, so removal never frees memory.
    pub fn remove(&mut self, id: JobId) -> bool {
        let Some(index) = id.0.checked_sub(1) else {
            return false;
        };
        match self.slots.get_mut(index).and_then(Option::take) {
            Some(job) => {
                self.retired.push(job);
                true
            }
            None => false,
        }
    }

    /// Live jobs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    fn demote_foreground(&mut self) {
        for job in self.slots.iter_mut().flatten() {
            if job.is_foreground() {
                job.set_placement(Placement::Background);
            }
        }
    }
}

impl fmt::Display for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for job in self.iter() {
            write!(f, "{job}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Process;
    use rstest::rstest;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    fn spawn(registry: &mut JobRegistry, placement: Placement, pids: &[i32]) -> JobId {
        let id = registry.add_job(placement);
        let job = registry.job_mut(id).expect("job just added");
        for &p in pids {
            job.add_process(Process::new(pid(p), format!("cmd{p}")));
        }
        id
    }

    fn foreground_count(registry: &JobRegistry) -> usize {
        registry.iter().filter(|j| j.is_foreground()).count()
    }

    #[test]
    fn ids_start_at_one_and_are_reused() {
        let mut registry = JobRegistry::new();
        let a = spawn(&mut registry, Placement::Background, &[10]);
        let b = spawn(&mut registry, Placement::Background, &[20]);
        let c = spawn(&mut registry, Placement::Background, &[30]);
        assert_eq!((a, b, c), (JobId(1), JobId(2), JobId(3)));

        registry.update_process(pid(20), ProcessState::Terminated);
        assert!(!registry.contains_job(b));
        assert_eq!(spawn(&mut registry, Placement::Background, &[40]), JobId(2));
        assert_eq!(spawn(&mut registry, Placement::Background, &[50]), JobId(4));
    }

    #[test]
    fn pid_lookup_finds_owning_job() {
        let mut registry = JobRegistry::new();
        spawn(&mut registry, Placement::Background, &[10, 11]);
        let second = spawn(&mut registry, Placement::Background, &[20, 21, 22]);
        assert_eq!(registry.job_with_pid(pid(21)).map(Job::id), Some(second));
        assert!(registry.job_with_pid(pid(99)).is_none());
    }

    #[test]
    fn at_most_one_foreground_job() {
        let mut registry = JobRegistry::new();
        let a = spawn(&mut registry, Placement::Foreground, &[10]);
        let b = spawn(&mut registry, Placement::Foreground, &[20]);
        assert_eq!(foreground_count(&registry), 1);
        assert_eq!(registry.foreground_job().map(Job::id), Some(b));

        registry.set_placement(a, Placement::Foreground).unwrap();
        assert_eq!(foreground_count(&registry), 1);
        assert_eq!(registry.foreground_job().map(Job::id), Some(a));

        registry.set_placement(a, Placement::Background).unwrap();
        assert_eq!(foreground_count(&registry), 0);
    }

    #[test]
    fn set_placement_on_missing_job_is_lookup_error() {
        let mut registry = JobRegistry::new();
        let err = registry.set_placement(JobId(3), Placement::Foreground).unwrap_err();
        assert!(matches!(err, ShellError::Lookup(_)));
    }

    #[test]
    fn group_id_survives_state_changes() {
        let mut registry = JobRegistry::new();
        let id = spawn(&mut registry, Placement::Foreground, &[500, 501, 502]);
        registry.update_process(pid(500), ProcessState::Terminated);
        registry.update_process(pid(501), ProcessState::Stopped);
        registry.set_placement(id, Placement::Foreground).unwrap();
        assert_eq!(registry.job(id).and_then(Job::group_id), Some(pid(500)));
    }

    #[rstest]
    #[case(&[ProcessState::Terminated, ProcessState::Terminated, ProcessState::Terminated], true)]
    #[case(&[ProcessState::Terminated, ProcessState::Running, ProcessState::Terminated], false)]
    #[case(&[ProcessState::Terminated, ProcessState::Terminated, ProcessState::Stopped], false)]
    #[case(&[ProcessState::Running, ProcessState::Running, ProcessState::Running], false)]
    fn synchronize_removes_only_complete_jobs(
        #[case] states: &[ProcessState],
        #[case] removed: bool,
    ) {
        let mut registry = JobRegistry::new();
        let id = spawn(&mut registry, Placement::Background, &[1, 2, 3]);
        for (i, state) in states.iter().enumerate() {
            registry.update_process(pid(i as i32 + 1), *state);
        }
        assert_eq!(!registry.contains_job(id), removed);
    }

    #[test]
    fn fully_stopped_foreground_job_moves_to_background() {
        let mut registry = JobRegistry::new();
        let id = spawn(&mut registry, Placement::Foreground, &[1, 2]);
        registry.update_process(pid(1), ProcessState::Stopped);
        assert!(registry.has_foreground_job());
        registry.update_process(pid(2), ProcessState::Stopped);
        assert!(!registry.has_foreground_job());
        assert_eq!(registry.job(id).map(Job::placement), Some(Placement::Background));
    }

    #[test]
    fn continued_background_job_stays_in_background() {
        let mut registry = JobRegistry::new();
        let id = spawn(&mut registry, Placement::Background, &[1]);
        registry.update_process(pid(1), ProcessState::Stopped);
        registry.update_process(pid(1), ProcessState::Running);
        let job = registry.job(id).unwrap();
        assert_eq!(job.placement(), Placement::Background);
        assert_eq!(job.process(0).map(|p| p.state()), Some(ProcessState::Running));
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let mut registry = JobRegistry::new();
        spawn(&mut registry, Placement::Background, &[1]);
        assert!(!registry.update_process(pid(2), ProcessState::Terminated));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn retirement_does_not_grow_past_reserved_capacity() {
        let mut registry = JobRegistry::new();
        for p in 1..=8 {
            spawn(&mut registry, Placement::Background, &[p]);
        }
        let capacity = registry.retired.capacity();
        for p in 1..=8 {
            registry.update_process(pid(p), ProcessState::Terminated);
        }
        assert!(registry.is_empty());
        assert_eq!(registry.retired.len(), 8);
        assert_eq!(registry.retired.capacity(), capacity);
    }

    #[test]
    fn listing_is_in_id_order() {
        let mut registry = JobRegistry::new();
        spawn(&mut registry, Placement::Background, &[10]);
        spawn(&mut registry, Placement::Background, &[20]);
        let text = registry.to_string();
        let first = text.find("[1] 10").unwrap();
        let second = text.find("[2] 20").unwrap();
        assert!(first < second);
    }
}
