//! Controlling-terminal ownership.
//!
//! Exactly one process group owns the terminal at a time. The shell lends it
//! to a foreground job through a [`TerminalLease`], which hands it back to the
//! previous owner when dropped, on error paths included.

use std::io::IsTerminal;
use std::os::fd::{BorrowedFd, RawFd};

use nix::libc::STDIN_FILENO;
use nix::unistd::{getpgrp, tcgetpgrp, tcsetpgrp, Pid};

use crate::error::{ShellResult, SysContext};

/// The shell's controlling terminal.
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
    fd: RawFd,
    shell_group: Pid,
}

impl Terminal {
    /// The terminal on standard input, if standard input is one.
    pub fn stdin() -> Option<Self> {
        if !std::io::stdin().is_terminal() {
            return None;
        }
        Some(Self {
            fd: STDIN_FILENO,
            shell_group: getpgrp(),
        })
    }

    fn fd(&self) -> BorrowedFd<'_> {
        // SAFETY: standard input stays open for the life of the shell.
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }

    /// Process group the shell itself runs in.
    pub fn shell_group(&self) -> Pid {
        self.shell_group
    }

    /// Process group currently owning the terminal.
    pub fn foreground_group(&self) -> ShellResult<Pid> {
        tcgetpgrp(self.fd()).sys("tcgetpgrp")
    }

    pub fn give_to(&self, pgid: Pid) -> ShellResult<()> {
        tcsetpgrp(self.fd(), pgid).sys("tcsetpgrp")
    }

    /// Remember the current owner so it can be restored later.
    pub fn lease(&self) -> ShellResult<TerminalLease<'_>> {
        let previous = self.foreground_group()?;
        Ok(TerminalLease {
            terminal: self,
            previous,
        })
    }
}

/// Restores the terminal to the group that owned it when the lease was taken.
#[derive(Debug)]
pub struct TerminalLease<'t> {
    terminal: &'t Terminal,
    previous: Pid,
}

impl TerminalLease<'_> {
    pub fn give_to(&self, pgid: Pid) -> ShellResult<()> {
        tracing::debug!(
            pgid = pgid.as_raw(),
            previous = self.previous.as_raw(),
            "giving terminal to job"
        );
        self.terminal.give_to(pgid)
    }
}

impl Drop for TerminalLease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.give_to(self.previous) {
            tracing::warn!("failed to reclaim terminal: {}", e);
        }
    }
}
