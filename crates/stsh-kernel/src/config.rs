//! Shell configuration.

use std::io::IsTerminal;

/// Prompt used when `STSH_PROMPT` is not set.
pub const DEFAULT_PROMPT: &str = "stsh> ";

/// Environment variable overriding the prompt.
pub const PROMPT_ENV: &str = "STSH_PROMPT";

/// Configuration for a shell session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Prompt printed before each line in interactive mode.
    pub prompt: String,

    /// Whether foreground jobs are given the controlling terminal.
    ///
    /// Only meaningful when standard input is a terminal; without one, jobs
    /// run in their own process groups but terminal ownership is left alone.
    pub job_control: bool,
}

fn prompt_from_env() -> String {
    std::env::var(PROMPT_ENV).unwrap_or_else(|_| DEFAULT_PROMPT.to_string())
}

impl Default for ShellConfig {
    /// Interactive when standard input is a terminal.
    fn default() -> Self {
        if std::io::stdin().is_terminal() {
            Self::interactive()
        } else {
            Self::non_interactive()
        }
    }
}

impl ShellConfig {
    /// Config for a human at a terminal.
    pub fn interactive() -> Self {
        Self {
            prompt: prompt_from_env(),
            job_control: true,
        }
    }

    /// Config for scripted input (`-c`, piped stdin, tests).
    pub fn non_interactive() -> Self {
        Self {
            prompt: String::new(),
            job_control: false,
        }
    }
}
