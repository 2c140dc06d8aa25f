//! stsh-kernel: the job-control core of stsh.
//!
//! This crate provides:
//!
//! - **Lexer / Parser**: turn a command line into a [`Pipeline`]
//! - **Jobs**: [`Job`] and [`Process`] records, owned by the [`JobRegistry`]
//! - **Signals**: the [`SignalGate`] that guards the registry, the reconciler
//!   that applies child status changes, and handler registration
//! - **Terminal**: lending the controlling terminal to foreground jobs
//! - **Exec**: forking pipelines into process groups
//! - **Builtins**: `fg`, `bg`, `slay`, `halt`, `cont`, `jobs`, `quit`

pub mod builtins;
pub mod config;
pub mod control;
pub mod error;
pub mod exec;
pub mod job;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod signals;
pub mod terminal;

pub use builtins::{handle_builtin, Builtin, BuiltinKind, Target};
pub use config::ShellConfig;
pub use control::JobControl;
pub use error::{ShellError, ShellResult};
pub use exec::create_job;
pub use job::{Job, JobId, Placement, Process, ProcessState};
pub use parser::{parse, ParseError};
pub use pipeline::{Command, Pipeline};
pub use registry::JobRegistry;
pub use signals::{reconcile, Blocked, SignalCell, SignalGate};
