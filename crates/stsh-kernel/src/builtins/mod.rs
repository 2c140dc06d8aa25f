//! Job-control builtins.
//!
//! | Builtin        | Arguments                    | Effect                               |
//! |----------------|------------------------------|--------------------------------------|
//! | `quit`, `exit` |                              | exit the shell                       |
//! | `fg`           | `<jobid>`                    | continue a job in the foreground     |
//! | `bg`           | `<jobid>`                    | continue a job in the background     |
//! | `slay`         | `<jobid> <index>` or `<pid>` | SIGKILL one process                  |
//! | `halt`         | `<jobid> <index>` or `<pid>` | SIGSTOP one process                  |
//! | `cont`         | `<jobid> <index>` or `<pid>` | SIGCONT one process                  |
//! | `jobs`         |                              | list every job                       |
//!
//! Only the first command of a line is checked. Builtins ignore redirections
//! and a trailing `&`.

mod jobs;
mod kill;
mod resume;

use std::io::Write;

use nix::unistd::Pid;

use crate::control::JobControl;
use crate::error::{ShellError, ShellResult};
use crate::job::JobId;
use crate::pipeline::{Command, Pipeline};

pub use jobs::listing;

/// Builtin names, before their arguments are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Quit,
    Fg,
    Bg,
    Slay,
    Halt,
    Cont,
    Jobs,
}

impl BuiltinKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quit" | "exit" => Some(Self::Quit),
            "fg" => Some(Self::Fg),
            "bg" => Some(Self::Bg),
            "slay" => Some(Self::Slay),
            "halt" => Some(Self::Halt),
            "cont" => Some(Self::Cont),
            "jobs" => Some(Self::Jobs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Fg => "fg",
            Self::Bg => "bg",
            Self::Slay => "slay",
            Self::Halt => "halt",
            Self::Cont => "cont",
            Self::Jobs => "jobs",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Fg => "fg <jobid>",
            Self::Bg => "bg <jobid>",
            Self::Slay => "slay <jobid> <index> | <pid>",
            Self::Halt => "halt <jobid> <index> | <pid>",
            Self::Cont => "cont <jobid> <index> | <pid>",
            Self::Jobs => "jobs",
        }
    }

    fn usage_error(self) -> ShellError {
        ShellError::Usage(format!("usage: {}", self.usage()))
    }
}

/// The process a `slay`, `halt` or `cont` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Pid(Pid),
    /// The `index`-th process (from 0, pipeline order) of `job`.
    Indexed { job: JobId, index: usize },
}

/// A builtin with validated arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Quit,
    Fg(JobId),
    Bg(JobId),
    Slay(Target),
    Halt(Target),
    Cont(Target),
    Jobs,
}

impl Builtin {
    /// `None` when `command` is not a builtin; `Some(Err(_))` when it is but
    /// its arguments are wrong.
    pub fn parse(command: &Command) -> Option<ShellResult<Self>> {
        let kind = BuiltinKind::from_name(&command.program)?;
        Some(Self::from_args(kind, &command.args))
    }

    fn from_args(kind: BuiltinKind, args: &[String]) -> ShellResult<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match (kind, args.as_slice()) {
            // Extra words after quit are ignored.
            (BuiltinKind::Quit, _) => Ok(Self::Quit),
            (BuiltinKind::Jobs, []) => Ok(Self::Jobs),
            (BuiltinKind::Fg, [id]) => Ok(Self::Fg(parse_job_id(kind, id)?)),
            (BuiltinKind::Bg, [id]) => Ok(Self::Bg(parse_job_id(kind, id)?)),
            (BuiltinKind::Slay, rest) => Ok(Self::Slay(parse_target(kind, rest)?)),
            (BuiltinKind::Halt, rest) => Ok(Self::Halt(parse_target(kind, rest)?)),
            (BuiltinKind::Cont, rest) => Ok(Self::Cont(parse_target(kind, rest)?)),
            _ => Err(kind.usage_error()),
        }
    }

    pub fn kind(&self) -> BuiltinKind {
        match self {
            Self::Quit => BuiltinKind::Quit,
            Self::Fg(_) => BuiltinKind::Fg,
            Self::Bg(_) => BuiltinKind::Bg,
            Self::Slay(_) => BuiltinKind::Slay,
            Self::Halt(_) => BuiltinKind::Halt,
            Self::Cont(_) => BuiltinKind::Cont,
            Self::Jobs => BuiltinKind::Jobs,
        }
    }
}

fn no_such_job(id: JobId) -> ShellError {
    ShellError::Lookup(format!("no job with id {id}"))
}

fn parse_job_id(kind: BuiltinKind, text: &str) -> ShellResult<JobId> {
    text.parse::<usize>().map(JobId).map_err(|_| kind.usage_error())
}

fn parse_target(kind: BuiltinKind, args: &[&str]) -> ShellResult<Target> {
    match args {
        [pid] => match pid.parse::<i32>() {
            Ok(raw) if raw > 0 => Ok(Target::Pid(Pid::from_raw(raw))),
            _ => Err(kind.usage_error()),
        },
        [job, index] => {
            let job = parse_job_id(kind, job)?;
            let index = index.parse::<usize>().map_err(|_| kind.usage_error())?;
            Ok(Target::Indexed { job, index })
        }
        _ => Err(kind.usage_error()),
    }
}

/// Run the line's leading command if it is a builtin.
///
/// Returns `Ok(false)` when it is not, leaving the line to the executor.
#[tracing::instrument(level = "debug", skip(control, pipeline))]
pub fn handle_builtin(control: &JobControl<'_>, pipeline: &Pipeline) -> ShellResult<bool> {
    let Some(command) = pipeline.leading() else {
        return Ok(false);
    };
    let Some(builtin) = Builtin::parse(command) else {
        return Ok(false);
    };
    let builtin = builtin?;
    tracing::debug!(builtin = builtin.kind().name(), "running builtin");
    run(control, builtin)?;
    Ok(true)
}

fn run(control: &JobControl<'_>, builtin: Builtin) -> ShellResult<()> {
    match builtin {
        Builtin::Quit => {
            tracing::debug!("quit requested");
            let _ = std::io::stdout().flush();
            std::process::exit(0);
        }
        Builtin::Fg(id) => resume::foreground(control, id),
        Builtin::Bg(id) => resume::background(control, id),
        Builtin::Slay(target) => kill::slay(control, target),
        Builtin::Halt(target) => kill::halt(control, target),
        Builtin::Cont(target) => kill::cont(control, target),
        Builtin::Jobs => jobs::print(control),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(line: &[&str]) -> Option<ShellResult<Builtin>> {
        Builtin::parse(&Command::new(line[0]).args(line[1..].iter().copied()))
    }

    fn usage_of(line: &[&str]) -> String {
        match parse(line) {
            Some(Err(ShellError::Usage(msg))) => msg,
            other => panic!("expected a usage error, got {other:?}"),
        }
    }

    #[test]
    fn non_builtins_are_left_alone() {
        assert!(parse(&["ls", "-l"]).is_none());
        assert!(parse(&["FG", "1"]).is_none());
    }

    #[rstest]
    #[case(&["quit"], Builtin::Quit)]
    #[case(&["exit"], Builtin::Quit)]
    #[case(&["exit", "3"], Builtin::Quit)]
    #[case(&["jobs"], Builtin::Jobs)]
    #[case(&["fg", "2"], Builtin::Fg(JobId(2)))]
    #[case(&["bg", "1"], Builtin::Bg(JobId(1)))]
    #[case(&["halt", "1", "0"], Builtin::Halt(Target::Indexed { job: JobId(1), index: 0 }))]
    #[case(&["cont", "4321"], Builtin::Cont(Target::Pid(Pid::from_raw(4321))))]
    #[case(&["slay", "3", "2"], Builtin::Slay(Target::Indexed { job: JobId(3), index: 2 }))]
    fn parses(#[case] line: &[&str], #[case] expected: Builtin) {
        assert_eq!(parse(line).unwrap().unwrap(), expected);
    }

    #[rstest]
    #[case(&["fg"], "usage: fg <jobid>")]
    #[case(&["fg", "1", "2"], "usage: fg <jobid>")]
    #[case(&["bg", "one"], "usage: bg <jobid>")]
    #[case(&["bg", "-1"], "usage: bg <jobid>")]
    #[case(&["jobs", "-l"], "usage: jobs")]
    #[case(&["halt"], "usage: halt <jobid> <index> | <pid>")]
    #[case(&["halt", "1", "2", "3"], "usage: halt <jobid> <index> | <pid>")]
    #[case(&["slay", "0"], "usage: slay <jobid> <index> | <pid>")]
    #[case(&["cont", "1", "x"], "usage: cont <jobid> <index> | <pid>")]
    fn rejects_bad_arguments(#[case] line: &[&str], #[case] expected: &str) {
        assert_eq!(usage_of(line), expected);
    }

    #[test]
    fn kind_round_trips_through_name() {
        for kind in [
            BuiltinKind::Quit,
            BuiltinKind::Fg,
            BuiltinKind::Bg,
            BuiltinKind::Slay,
            BuiltinKind::Halt,
            BuiltinKind::Cont,
            BuiltinKind::Jobs,
        ] {
            assert_eq!(BuiltinKind::from_name(kind.name()), Some(kind));
        }
    }
}
