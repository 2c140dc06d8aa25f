//! Terminal hand-off scenarios: `stsh` runs as a session leader on a
//! pseudo-terminal, and the tests watch which process group owns it.
//!
//! `TERM=dumb` keeps the line editor in plain line mode, so the pty's own
//! line discipline turns `^Z` and `^C` into signals for the foreground group.

#![cfg(target_os = "linux")]

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nix::pty::{openpty, OpenptyResult};
use nix::unistd::{getpgid, setsid, tcgetpgrp, Pid};

const PROMPT: &str = "pty> ";
const CTRL_C: u8 = 0x03;
const CTRL_Z: u8 = 0x1a;

struct Session {
    child: Child,
    master: File,
    output: Arc<Mutex<String>>,
    shell: Pid,
}

impl Session {
    fn start() -> Self {
        let OpenptyResult { master, slave } = openpty(None, None).expect("openpty");
        let mut command = Command::new(env!("CARGO_BIN_EXE_stsh"));
        command
            .stdin(Stdio::from(slave.try_clone().expect("dup slave")))
            .stdout(Stdio::from(slave.try_clone().expect("dup slave")))
            .stderr(Stdio::from(slave))
            .env("TERM", "dumb")
            .env("STSH_PROMPT", PROMPT)
            .env_remove("RUST_LOG");
        // SAFETY: setsid and ioctl are async-signal-safe.
        unsafe {
            command.pre_exec(|| {
                setsid()?;
                if nix::libc::ioctl(0, nix::libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let child = command.spawn().expect("failed to start stsh");
        // Close our copies of the slave so the reader sees EOF once stsh exits.
        drop(command);

        let master = File::from(master);
        let output = Arc::new(Mutex::new(String::new()));
        let mut reader = master.try_clone().expect("dup master");
        let sink = Arc::clone(&output);
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 {
                    break;
                }
                sink.lock().unwrap().push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        });

        let shell = Pid::from_raw(child.id() as i32);
        let session = Self {
            child,
            master,
            output,
            shell,
        };
        session.wait_until("first prompt", |s| s.output().contains(PROMPT));
        session
    }

    fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    fn send(&mut self, bytes: &[u8]) {
        self.master.write_all(bytes).expect("write to pty");
    }

    /// Process group owning the terminal.
    fn owner(&self) -> Pid {
        tcgetpgrp(&self.master).expect("tcgetpgrp")
    }

    fn wait_until(&self, what: &str, done: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(self) {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {what}; output so far: {:?}",
                self.output()
            );
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Wait until a job's group owns the terminal and is running `program`.
    fn job_owner(&self, program: &str) -> Pid {
        self.wait_until("a job to own the terminal", |s| {
            let owner = s.owner();
            owner != s.shell && runs(owner, program)
        });
        self.owner()
    }

    fn exit(mut self) {
        self.send(b"exit\n");
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.child.try_wait().expect("try_wait").is_none() {
            assert!(Instant::now() < deadline, "stsh did not exit");
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn runs(pid: Pid, program: &str) -> bool {
    std::fs::read(format!("/proc/{pid}/cmdline"))
        .map(|cmdline| cmdline.split(|&b| b == 0).next() == Some(program.as_bytes()))
        .unwrap_or(false)
}

/// Pid printed in a `[id] pid ...` background notice.
fn notice_pid(out: &str, job: usize) -> Option<Pid> {
    let prefix = format!("[{job}] ");
    out.lines()
        .map(|l| l.trim_start_matches(PROMPT))
        .find(|l| l.starts_with(&prefix) && !l.contains('('))
        .and_then(|l| l[prefix.len()..].split_whitespace().next())
        .and_then(|pid| pid.parse().ok())
        .map(Pid::from_raw)
}

#[test]
fn shell_owns_the_terminal_at_the_prompt() {
    let session = Session::start();
    assert_eq!(session.owner(), session.shell);
    assert_eq!(getpgid(Some(session.shell)).unwrap(), session.shell);
    session.exit();
}

#[test]
fn foreground_job_owns_the_terminal_until_it_exits() {
    let mut session = Session::start();
    session.send(b"sleep 1\n");

    let job = session.job_owner("sleep");
    assert_eq!(getpgid(Some(job)).unwrap(), job);

    session.wait_until("the terminal to come back", |s| s.owner() == s.shell);
    session.exit();
}

#[test]
fn stop_key_hands_the_terminal_back() {
    let mut session = Session::start();
    session.send(b"sleep 5\n");
    session.job_owner("sleep");

    session.send(&[CTRL_Z]);
    session.wait_until("the terminal to come back", |s| s.owner() == s.shell);

    session.send(b"jobs\n");
    session.wait_until("the stopped listing", |s| {
        s.output().contains("Stopped  sleep 5")
    });
    session.send(b"slay 1 0\n");
    session.exit();
}

#[test]
fn fg_hands_the_terminal_to_the_job() {
    let mut session = Session::start();
    session.send(b"sleep 5 &\n");
    session.wait_until("the background notice", |s| notice_pid(&s.output(), 1).is_some());
    let leader = notice_pid(&session.output(), 1).unwrap();
    assert_eq!(session.owner(), session.shell);

    session.send(b"fg 1\n");
    session.wait_until("fg to hand over the terminal", |s| s.owner() == leader);

    session.send(&[CTRL_C]);
    session.wait_until("the terminal to come back", |s| s.owner() == s.shell);
    session.exit();
}
