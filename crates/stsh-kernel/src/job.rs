//! Job and process records.
//!
//! A [`Job`] is the set of processes started for one pipeline. Its processes
//! keep pipeline order, so `halt 1 2` always names the third command of job 1.

use std::fmt;

use nix::unistd::Pid;

/// Small integer naming a live job. Ids are reused once a job is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run state of one process, as last reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Running, or continued after a stop.
    Running,
    /// Stopped by a signal (e.g., Ctrl-Z / SIGTSTP, `halt`).
    Stopped,
    /// Exited or killed by a signal.
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Running => write!(f, "Running"),
            ProcessState::Stopped => write!(f, "Stopped"),
            ProcessState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Whether a job owns the terminal and blocks the input loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Foreground => write!(f, "foreground"),
            Placement::Background => write!(f, "background"),
        }
    }
}

/// One OS process belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pid: Pid,
    state: ProcessState,
    command: String,
}

impl Process {
    /// A freshly forked process. Processes start out running.
    pub fn new(pid: Pid, command: impl Into<String>) -> Self {
        Self {
            pid,
            state: ProcessState::Running,
            command: command.into(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Command text the process was started from.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }
}

/// The processes of one pipeline, tracked as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    group_id: Option<Pid>,
    placement: Placement,
    processes: Vec<Process>,
}

impl Job {
    pub(crate) fn new(id: JobId, placement: Placement) -> Self {
        Self {
            id,
            group_id: None,
            placement,
            processes: Vec::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Process group of the job: the pid of its first process.
    ///
    /// `None` until the first process has been recorded; never changes after.
    pub fn group_id(&self) -> Option<Pid> {
        self.group_id
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn is_foreground(&self) -> bool {
        self.placement == Placement::Foreground
    }

    /// Processes in pipeline order.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn process(&self, index: usize) -> Option<&Process> {
        self.processes.get(index)
    }

    pub fn process_with_pid(&self, pid: Pid) -> Option<&Process> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    pub fn contains_pid(&self, pid: Pid) -> bool {
        self.process_with_pid(pid).is_some()
    }

    /// Record a newly forked process. The first one seeds the process group.
    pub(crate) fn add_process(&mut self, process: Process) {
        if self.group_id.is_none() {
            self.group_id = Some(process.pid);
        }
        self.processes.push(process);
    }

    pub(crate) fn set_placement(&mut self, placement: Placement) {
        self.placement = placement;
    }

    /// Returns false if no process has that pid.
    pub(crate) fn set_process_state(&mut self, pid: Pid, state: ProcessState) -> bool {
        match self.processes.iter_mut().find(|p| p.pid == pid) {
            Some(process) => {
                process.set_state(state);
                true
            }
            None => false,
        }
    }

    /// True once every process has terminated.
    pub fn is_complete(&self) -> bool {
        self.processes
            .iter()
            .all(|p| p.state == ProcessState::Terminated)
    }

    /// True when at least one process is still alive and every live one is stopped.
    pub fn is_stopped(&self) -> bool {
        let mut live = self
            .processes
            .iter()
            .filter(|p| p.state != ProcessState::Terminated)
            .peekable();
        live.peek().is_some() && live.all(|p| p.state == ProcessState::Stopped)
    }

    /// True when any process is stopped.
    pub fn has_stopped(&self) -> bool {
        self.processes
            .iter()
            .any(|p| p.state == ProcessState::Stopped)
    }

    /// The one-line notice printed when a background job starts: `[id] pid pid ...`.
    pub fn started_notice(&self) -> String {
        let mut notice = format!("[{}]", self.id);
        for process in &self.processes {
            notice.push_str(&format!(" {}", process.pid));
        }
        notice
    }
}

/// `jobs` listing: a `[id] pgid (placement)` header, then `pid  state  command`
/// for every process.
impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.group_id {
            Some(pgid) => writeln!(f, "[{}] {} ({})", self.id, pgid, self.placement)?,
            None => writeln!(f, "[{}] - ({})", self.id, self.placement)?,
        }
        for process in &self.processes {
            writeln!(f, "{}  {}  {}", process.pid, process.state, process.command)?;
        }
        Ok(())
    }
}
