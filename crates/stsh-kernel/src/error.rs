//! Error types for job control.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::parser::ParseError;

/// Errors raised while building jobs or running builtins.
///
/// Every variant is recoverable from the shell's point of view: the outer
/// loop reports it and keeps reading input.
#[derive(Debug, Error)]
pub enum ShellError {
    /// An OS primitive failed (fork, pipe, dup2, setpgid, tcsetpgrp, kill, ...).
    #[error("{op}: {errno}")]
    SystemCall { op: &'static str, errno: Errno },

    /// A redirection target could not be opened.
    #[error("{}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed builtin arguments.
    #[error("{0}")]
    Usage(String),

    /// Unknown job id, process index, or pid.
    #[error("{0}")]
    Lookup(String),

    /// The target program could not be found on exec.
    #[error("{0}: command not found")]
    UnsupportedCommand(String),

    /// The input line could not be turned into a pipeline.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ShellError {
    /// Exit status a forked child uses when it fails before exec.
    pub fn child_exit_code(&self) -> i32 {
        match self {
            ShellError::UnsupportedCommand(_) => 127,
            _ => 126,
        }
    }
}

/// Result alias used throughout the kernel.
pub type ShellResult<T> = Result<T, ShellError>;

/// Attach the failing operation's name to a `nix` error.
pub(crate) trait SysContext<T> {
    fn sys(self, op: &'static str) -> ShellResult<T>;
}

impl<T> SysContext<T> for nix::Result<T> {
    fn sys(self, op: &'static str) -> ShellResult<T> {
        self.map_err(|errno| ShellError::SystemCall { op, errno })
    }
}
