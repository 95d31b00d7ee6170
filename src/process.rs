//! External command execution with a deadline.
//!
//! Commands run synchronously in their own process group. Output is drained
//! on reader threads into a channel so a chatty child cannot block on a full
//! pipe. The deadline bounds the whole call: the child is polled until it
//! exits, then its output is collected until the same deadline, and whatever
//! is left of the group is killed.

use crate::domain::ExecutionStatus;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Time allowed for readers to flush after a timed-out group is killed.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// What happened when a command was run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// The program could not be started at all.
    pub fn unavailable(&self) -> bool {
        self.status == ExecutionStatus::Error
    }

    fn spawn_error(err: std::io::Error, started: Instant) -> Self {
        Self {
            status: ExecutionStatus::Error,
            exit_code: None,
            stdout: String::new(),
            stderr: err.to_string(),
            duration: started.elapsed(),
        }
    }
}

/// Run `command` through `sh -c`.
pub fn run_shell(command: &str, timeout: Duration) -> Outcome {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    run(cmd, command, timeout)
}

/// Run `program` directly with `args`, optionally in `cwd`.
pub fn run_program(program: &str, args: &[&str], cwd: Option<&Path>, timeout: Duration) -> Outcome {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let label = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
    run(cmd, &label, timeout)
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    /// Gather chunks until every reader has finished or `deadline` passes.
    /// Returns whether all output was read.
    fn gather(&mut self, rx: &Receiver<(Stream, Vec<u8>)>, deadline: Instant) -> bool {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, bytes)) => self.stdout.extend_from_slice(&bytes),
                Ok((Stream::Stderr, bytes)) => self.stderr.extend_from_slice(&bytes),
                Err(RecvTimeoutError::Disconnected) => return true,
                Err(RecvTimeoutError::Timeout) => return false,
            }
        }
    }

    fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

fn run(mut cmd: Command, label: &str, timeout: Duration) -> Outcome {
    let started = Instant::now();
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(command = %label, error = %e, "failed to spawn command");
            return Outcome::spawn_error(e, started);
        }
    };

    let (tx, rx) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, tx.clone());
    drain(child.stderr.take(), Stream::Stderr, tx);
    let deadline = started + timeout;
    let mut captured = Captured::default();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !captured.gather(&rx, deadline) {
                    tracing::warn!(command = %label, "output still held open at the deadline, killing process group");
                    kill_group(child.id(), label);
                }
                let exit_code = status.code();
                tracing::debug!(command = %label, exit_code = ?exit_code, "command finished");
                return Outcome {
                    status: if status.success() {
                        ExecutionStatus::Success
                    } else {
                        ExecutionStatus::Failed
                    },
                    exit_code,
                    stdout: captured.stdout(),
                    stderr: captured.stderr(),
                    duration: started.elapsed(),
                };
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill(&mut child, label);
                    tracing::warn!(command = %label, timeout_secs = timeout.as_secs(), "command timed out and was killed");
                    captured.gather(&rx, Instant::now() + KILL_GRACE);
                    return Outcome {
                        status: ExecutionStatus::Timeout,
                        exit_code: None,
                        stdout: captured.stdout(),
                        stderr: format!("timed out after {}s", timeout.as_secs()),
                        duration: started.elapsed(),
                    };
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill(&mut child, label);
                return Outcome::spawn_error(e, started);
            }
        }
    }
}

fn kill(child: &mut Child, label: &str) {
    kill_group(child.id(), label);
    if let Err(e) = child.kill() {
        tracing::warn!(command = %label, error = %e, "failed to kill command");
    }
    if let Err(e) = child.wait() {
        tracing::warn!(command = %label, error = %e, "failed to reap command");
    }
}

/// SIGKILL everything in the child's process group. The child was spawned
/// with `process_group(0)`, so its pid is the group id.
#[cfg(unix)]
fn kill_group(pid: u32, label: &str) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(command = %label, pid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32, _label: &str) {}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    let Some(mut pipe) = pipe else {
        return;
    };
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_of_successful_command() {
        let outcome = run_shell("echo hello; echo oops >&2", Duration::from_secs(5));
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.stderr.trim(), "oops");
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[test]
    fn non_zero_exit_is_failed() {
        let outcome = run_shell("exit 3", Duration::from_secs(5));
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[test]
    fn slow_command_times_out() {
        let outcome = run_shell("sleep 5", Duration::from_millis(200));
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert!(outcome.duration < Duration::from_secs(4));
    }

    #[test]
    fn background_child_holding_output_does_not_outlive_deadline() {
        let started = Instant::now();
        let outcome = run_shell("sleep 4 & echo started", Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "started");
    }

    #[test]
    fn timeout_keeps_partial_output() {
        let outcome = run_shell("echo partial; sleep 5", Duration::from_millis(300));
        assert_eq!(outcome.status, ExecutionStatus::Timeout);
        assert_eq!(outcome.stdout.trim(), "partial");
    }

    #[test]
    fn missing_program_is_error_not_failure() {
        let outcome =
            run_program("definitely-not-a-real-binary-ws", &[], None, Duration::from_secs(1));
        assert!(outcome.unavailable());
    }
}
