//! Signal plumbing: masking, waiting, and the handlers that keep the job
//! registry current.
//!
//! Main-line code and the signal handlers share one [`JobRegistry`], and the
//! only mutual exclusion between them is the signal mask. The types here make
//! that rule hard to break:
//!
//! - [`SignalGate::block`] returns a [`Blocked`] guard that restores the
//!   previous mask when dropped.
//! - [`SignalCell`] only hands out the registry for as long as a `Blocked`
//!   guard is borrowed, so no registry reference outlives the block.
//! - [`Blocked::suspend_until`] needs the guard mutably, so nothing borrowed
//!   from the registry can be alive while it unblocks and sleeps.
//!
//! ```text
//!  main line                               SIGCHLD handler
//!  ─────────                               ───────────────
//!  let mut b = gate.block()?;
//!  cell.get_mut(&mut b).add_job(..)        (held off by the mask)
//!  fork / record pids ...
//!  b.suspend_until(cell, no_foreground) ─▶ reconcile(): waitpid(-1, WNOHANG ..)
//!         ▲                                  update_process / synchronize
//!         └──────── re-check ◀───────────── returns
//!  drop(b)
//! ```

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use nix::errno::Errno;
use nix::libc::c_int;
use nix::sys::signal::{
    killpg, pthread_sigmask, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::{ShellError, ShellResult, SysContext};
use crate::job::ProcessState;
use crate::registry::JobRegistry;

/// Signals whose handlers touch the registry.
pub const JOB_CONTROL_SIGNALS: [Signal; 3] = [Signal::SIGCHLD, Signal::SIGINT, Signal::SIGTSTP];

/// Blocks and unblocks a fixed set of signals for the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct SignalGate {
    set: SigSet,
}

impl SignalGate {
    pub fn new(signals: &[Signal]) -> Self {
        let mut set = SigSet::empty();
        for &signal in signals {
            set.add(signal);
        }
        Self { set }
    }

    /// The gate every job-control operation uses.
    pub fn job_control() -> Self {
        Self::new(&JOB_CONTROL_SIGNALS)
    }

    /// Block the gate's signals until the returned guard is dropped.
    ///
    /// Guards nest: each restores the mask it found.
    pub fn block(&self) -> ShellResult<Blocked> {
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&self.set), Some(&mut previous))
            .sys("sigprocmask")?;

        let nested = JOB_CONTROL_SIGNALS
            .iter()
            .any(|&signal| self.set.contains(signal) && previous.contains(signal));
        let mut wait_mask = previous;
        for &signal in &JOB_CONTROL_SIGNALS {
            if self.set.contains(signal) {
                wait_mask.remove(signal);
            }
        }

        Ok(Blocked {
            previous,
            wait_mask,
            nested,
        })
    }

    /// Unblock the gate's signals outright, regardless of any guard.
    ///
    /// Used by forked children, which inherit the parent's blocked mask.
    pub fn unblock(&self) -> ShellResult<()> {
        pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&self.set), None).sys("sigprocmask")
    }
}

/// Proof that the gate's signals are blocked. Restores the previous mask on drop.
#[derive(Debug)]
pub struct Blocked {
    previous: SigSet,
    wait_mask: SigSet,
    nested: bool,
}

impl Blocked {
    /// Sleep until `done` holds for the cell's contents.
    ///
    /// The check runs with signals blocked. Between checks the mask is swapped
    /// for the pre-block mask and the thread sleeps in one atomic
    /// `sigsuspend`, so a signal arriving right after a failed check still
    /// wakes the wait.
    pub fn suspend_until<T>(&mut self, cell: &SignalCell<T>, mut done: impl FnMut(&T) -> bool) {
        debug_assert!(!self.nested, "suspend_until on a nested signal block");
        loop {
            // SAFETY: the signals are blocked, so no handler runs during the check.
            let value = unsafe { &*cell.value.get() };
            if done(value) {
                return;
            }
            // SAFETY: `wait_mask` is a valid, initialised sigset. sigsuspend
            // always returns -1/EINTR once a handler has run.
            unsafe {
                nix::libc::sigsuspend(self.wait_mask.as_ref());
            }
        }
    }
}

impl Drop for Blocked {
    fn drop(&mut self) {
        if let Err(errno) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            tracing::warn!("failed to restore signal mask: {}", errno);
        }
    }
}

/// A value shared between main-line code and signal handlers.
///
/// Access goes through a [`Blocked`] guard, and the returned reference cannot
/// outlive that guard.
pub struct SignalCell<T> {
    value: UnsafeCell<T>,
}

// The value is only touched by the owning thread, either with the gate closed
// or from a handler running on that same thread.
unsafe impl<T: Send> Sync for SignalCell<T> {}

impl<T> SignalCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    pub fn get<'g>(&'g self, _blocked: &'g Blocked) -> &'g T {
        // SAFETY: handlers that touch the cell are masked while `_blocked` lives.
        unsafe { &*self.value.get() }
    }

    pub fn get_mut<'g>(&'g self, _blocked: &'g mut Blocked) -> &'g mut T {
        // SAFETY: as for `get`; the exclusive guard borrow rules out a second
        // reference obtained through the same guard.
        unsafe { &mut *self.value.get() }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Reconciler
// ═══════════════════════════════════════════════════════════════════════════

/// Classify a wait status as a process state change.
///
/// Returns `None` for statuses that say nothing about run state (still
/// alive, ptrace events).
pub fn classify(status: WaitStatus) -> Option<(Pid, ProcessState)> {
    match status {
        WaitStatus::Exited(pid, _) | WaitStatus::Signaled(pid, _, _) => {
            Some((pid, ProcessState::Terminated))
        }
        WaitStatus::Stopped(pid, _) => Some((pid, ProcessState::Stopped)),
        WaitStatus::Continued(pid) => Some((pid, ProcessState::Running)),
        _ => None,
    }
}

/// Drain every pending child status change into the registry.
///
/// Non-blocking and allocation-free, so it can run inside the `SIGCHLD`
/// handler. Returns how many changes belonged to tracked jobs.
pub fn reconcile(registry: &mut JobRegistry) -> usize {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    let mut applied = 0;
    loop {
        match waitpid(Pid::from_raw(-1), Some(flags)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                if let Some((pid, state)) = classify(status) {
                    if registry.update_process(pid, state) {
                        applied += 1;
                    }
                }
            }
            Err(Errno::EINTR) => continue,
            // ECHILD: nothing left to reap.
            Err(_) => break,
        }
    }
    applied
}

// ═══════════════════════════════════════════════════════════════════════════
// Handler registration
// ═══════════════════════════════════════════════════════════════════════════

static ACTIVE_REGISTRY: AtomicPtr<SignalCell<JobRegistry>> = AtomicPtr::new(ptr::null_mut());

/// Installed signal handlers. Dropping this restores the previous dispositions
/// and detaches the registry.
#[must_use = "handlers are removed when this is dropped"]
pub struct Handlers<'a> {
    previous: Vec<(Signal, SigAction)>,
    _registry: PhantomData<&'a SignalCell<JobRegistry>>,
}

/// Install the shell's signal handlers, all operating on `registry`.
///
/// - `SIGCHLD` runs [`reconcile`].
/// - `SIGINT` and `SIGTSTP` are forwarded to the foreground job's group, or
///   absorbed when there is none.
/// - `SIGQUIT` exits the shell.
/// - `SIGTTIN` and `SIGTTOU` are ignored so the shell can hand the terminal
///   around while outside the foreground group.
///
/// Only one registry can be attached at a time.
pub fn install(registry: &SignalCell<JobRegistry>) -> ShellResult<Handlers<'_>> {
    let target = registry as *const SignalCell<JobRegistry> as *mut SignalCell<JobRegistry>;
    if ACTIVE_REGISTRY
        .compare_exchange(ptr::null_mut(), target, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(ShellError::SystemCall {
            op: "sigaction",
            errno: Errno::EBUSY,
        });
    }

    let mut handlers = Handlers {
        previous: Vec::new(),
        _registry: PhantomData,
    };

    let mut mask = SigSet::empty();
    for signal in JOB_CONTROL_SIGNALS {
        mask.add(signal);
    }
    let flags = SaFlags::SA_RESTART;
    let dispositions = [
        (Signal::SIGCHLD, SigHandler::Handler(on_child_status)),
        (Signal::SIGINT, SigHandler::Handler(forward_to_foreground)),
        (Signal::SIGTSTP, SigHandler::Handler(forward_to_foreground)),
        (Signal::SIGQUIT, SigHandler::Handler(quit_immediately)),
        (Signal::SIGTTIN, SigHandler::SigIgn),
        (Signal::SIGTTOU, SigHandler::SigIgn),
    ];
    for (signal, handler) in dispositions {
        let action = SigAction::new(handler, flags, mask);
        // SAFETY: the handlers only touch the registry through the published
        // pointer, which outlives this registration.
        let previous = unsafe { sigaction(signal, &action) }.sys("sigaction")?;
        handlers.previous.push((signal, previous));
    }

    tracing::debug!("signal handlers installed");
    Ok(handlers)
}

impl Drop for Handlers<'_> {
    fn drop(&mut self) {
        for (signal, action) in self.previous.drain(..).rev() {
            // SAFETY: restoring a disposition that was in place before install.
            if let Err(errno) = unsafe { sigaction(signal, &action) } {
                tracing::warn!("failed to restore {} disposition: {}", signal, errno);
            }
        }
        ACTIVE_REGISTRY.store(ptr::null_mut(), Ordering::SeqCst);
    }
}

/// Reset dispositions to the default action. Forked children call this
/// before exec so they do not inherit ignored signals.
pub fn reset_to_default(signals: &[Signal]) -> ShellResult<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for &signal in signals {
        // SAFETY: installing SIG_DFL.
        unsafe { sigaction(signal, &action) }.sys("sigaction")?;
    }
    Ok(())
}

/// The attached registry, if any.
///
/// # Safety
///
/// Only callable from a handler for one of [`JOB_CONTROL_SIGNALS`]: those run
/// while main-line code holds no reference into the registry.
unsafe fn active_registry<'a>() -> Option<&'a mut JobRegistry> {
    let cell = ACTIVE_REGISTRY.load(Ordering::SeqCst);
    if cell.is_null() {
        return None;
    }
    Some(&mut *(*cell).value.get())
}

extern "C" fn on_child_status(_signum: c_int) {
    let saved = Errno::last();
    // SAFETY: SIGCHLD handler.
    if let Some(registry) = unsafe { active_registry() } {
        reconcile(registry);
    }
    saved.set();
}

extern "C" fn forward_to_foreground(signum: c_int) {
    let saved = Errno::last();
    // SAFETY: SIGINT/SIGTSTP handler.
    if let Some(registry) = unsafe { active_registry() } {
        let group = registry.foreground_job().and_then(|job| job.group_id());
        if let (Some(pgid), Ok(signal)) = (group, Signal::try_from(signum)) {
            let _ = killpg(pgid, signal);
        }
    }
    saved.set();
}

extern "C" fn quit_immediately(_signum: c_int) {
    // SAFETY: `_exit` is async-signal-safe; `std::process::exit` is not.
    unsafe { nix::libc::_exit(0) }
}
