use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::transport::TransportCommand;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long the output readers may lag behind a killed process group.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// `code` is `None` when the process was terminated by a signal.
    Exited { code: Option<i32> },
    /// Killed once the timeout expired.
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a command to completion, or until `timeout` expires.
///
/// An `Err` means the command could not be run at all; a command that ran
/// and failed is reported through [`CommandOutput::status`].
pub trait CommandRunner {
    fn run(&self, command: &TransportCommand, timeout: Duration) -> Result<CommandOutput>;
}

/// Spawns real processes, capturing stdout and stderr as text.
///
/// The process runs in its own process group, killed as a whole on timeout,
/// so nothing it forked can keep the run waiting past the deadline.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &TransportCommand, timeout: Duration) -> Result<CommandOutput> {
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(Error::from)
            .with_msg(format!("cannot spawn {:?}", command.program()))?;

        // drain both pipes while waiting so a chatty process never blocks
        let stdout = Drain::start(child.stdout.take());
        let stderr = Drain::start(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = wait_until(&mut child, deadline)?;

        // a leftover descendant may still hold the pipes open
        let drain_deadline = match status {
            CommandStatus::TimedOut => Instant::now() + DRAIN_GRACE,
            CommandStatus::Exited { .. } => deadline,
        };
        if !wait_drained(&[&stdout, &stderr], drain_deadline) {
            kill_group(&mut child);
            wait_drained(&[&stdout, &stderr], Instant::now() + DRAIN_GRACE);
        }

        Ok(CommandOutput {
            status,
            stdout: stdout.finish()?,
            stderr: stderr.finish()?,
        })
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<CommandStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(CommandStatus::Exited {
                code: status.code(),
            });
        }

        let now = Instant::now();
        if now >= deadline {
            kill_group(child);
            child.wait()?;
            return Ok(CommandStatus::TimedOut);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// SIGKILL to the whole process group led by `child`.
fn kill_group(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        // group already gone, the leader may still be unreaped
        let _ = child.kill();
    }
}

fn wait_drained(drains: &[&Drain], deadline: Instant) -> bool {
    loop {
        if drains.iter().all(|d| d.is_finished()) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Output read so far by a background thread.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl Drain {
    fn start<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let shared = buf.clone();
        let handle = std::thread::spawn(move || {
            let Some(mut pipe) = pipe else {
                return Ok(());
            };
            let mut chunk = [0u8; 8192];
            loop {
                let n = pipe.read(&mut chunk)?;
                if n == 0 {
                    return Ok(());
                }
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]);
            }
        });
        Self { buf, handle }
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// The captured text. A reader still blocked is left behind with what it
    /// got so far.
    fn finish(self) -> Result<String> {
        if self.handle.is_finished() {
            self.handle
                .join()
                .map_err(|_| std::io::Error::other("output reader thread panicked"))??;
        }
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> TransportCommand {
        TransportCommand::new("sh", ["-c", script])
    }

    #[test]
    fn test_run_success_captures_output() {
        let output = SystemCommandRunner
            .run(&sh("echo out; echo err >&2"), Duration::from_secs(10))
            .unwrap();

        assert_eq!(output.status, CommandStatus::Exited { code: Some(0) });
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_run_non_zero_exit() {
        let output = SystemCommandRunner
            .run(&sh("echo failing >&2; exit 3"), Duration::from_secs(10))
            .unwrap();

        assert_eq!(output.status, CommandStatus::Exited { code: Some(3) });
        assert_eq!(output.stderr, "failing\n");
    }

    #[test]
    fn test_run_timeout_kills_process() {
        let start = Instant::now();
        let output = SystemCommandRunner
            .run(
                &TransportCommand::new("sleep", ["30"]),
                Duration::from_millis(200),
            )
            .unwrap();

        assert_eq!(output.status, CommandStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_run_timeout_kills_forked_children() {
        let start = Instant::now();
        let output = SystemCommandRunner
            .run(
                &sh("echo started; sleep 8 & sleep 8; echo done"),
                Duration::from_millis(300),
            )
            .unwrap();

        assert_eq!(output.status, CommandStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(output.stdout, "started\n");
    }

    #[test]
    fn test_run_exit_with_lingering_child_is_bounded() {
        let start = Instant::now();
        let output = SystemCommandRunner
            .run(&sh("echo out; sleep 8 &"), Duration::from_millis(500))
            .unwrap();

        assert_eq!(output.status, CommandStatus::Exited { code: Some(0) });
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(output.stdout, "out\n");
    }

    #[test]
    fn test_run_missing_program_is_an_error() {
        let res = SystemCommandRunner.run(
            &TransportCommand::new("/nonexistent/qb-backup-transport", Vec::<&str>::new()),
            Duration::from_secs(1),
        );

        assert!(res.is_err());
    }
}
