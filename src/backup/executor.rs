//! One backup attempt for one host: take the host's lock, run the transport
//! under a timeout, classify what happened.

use crate::backup::function_path;
use crate::backup::host::Host;
use crate::backup::lock::FileLock;
use crate::backup::report::{bound, SharedReporter};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{LockError, WithDebugObjectAndFnName};
use crate::backup::transport::{
    CommandOutput, CommandRunner, CommandStatus, TransportCommand, TunnelConfig,
};
use derive_more::Display;
use function_name::named;
use std::time::Duration;
use tracing::Level;

/// How a single host attempt ended. Errors that prevent even trying (the
/// transport cannot be spawned, ...) are not outcomes, they abort the run.
#[derive(Debug)]
pub enum HostOutcome {
    Success,
    Failure(TransportFailure),
    /// The lock is held by another run; the transport was not invoked.
    LockUnavailable(LockError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum FailureKind {
    #[display("timed out ({}s)", _0.as_secs())]
    Timeout(Duration),
    #[display("returned {}", _0.map_or_else(|| "no exit code (killed by a signal)".to_string(), |c| c.to_string()))]
    NonZeroExit(Option<i32>),
}

#[derive(Clone, Debug)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub command: TransportCommand,
    pub stdout: String,
    pub stderr: String,
}

pub trait HostExecutor {
    fn execute(&self, host: &Host) -> Result<HostOutcome>;
}

pub struct HostBackupExecutor<R: CommandRunner> {
    runner: R,
    tunnel: TunnelConfig,
    reporter: SharedReporter,
}

impl<R: CommandRunner> HostBackupExecutor<R> {
    pub fn new(runner: R, tunnel: TunnelConfig, reporter: SharedReporter) -> Self {
        Self {
            runner,
            tunnel,
            reporter,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn classify(
        &self,
        host: &Host,
        command: TransportCommand,
        output: CommandOutput,
    ) -> HostOutcome {
        let kind = match output.status {
            CommandStatus::Exited { code: Some(0) } => {
                self.reporter.progress(
                    Level::INFO,
                    &format!("{:<20}: backup completed successfully", host.hostname()),
                );
                self.reporter.detail(
                    Level::INFO,
                    &bound(&output.stderr, &format!("stderr {}", host.hostname())),
                );
                return HostOutcome::Success;
            }
            CommandStatus::Exited { code } => FailureKind::NonZeroExit(code),
            CommandStatus::TimedOut => FailureKind::Timeout(*self.tunnel.timeout()),
        };

        HostOutcome::Failure(TransportFailure {
            kind,
            command,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl<R: CommandRunner> HostExecutor for HostBackupExecutor<R> {
    #[named]
    fn execute(&self, host: &Host) -> Result<HostOutcome> {
        self.reporter.progress(
            Level::INFO,
            &format!("{:<20}: starting backup", host.hostname()),
        );
        let command = TransportCommand::for_host(host, &self.tunnel);
        self.reporter
            .detail(Level::DEBUG, &format!("run command: {command}"));

        let mut lock = FileLock::new(host.lock());
        let output = {
            let _guard = match lock.lock() {
                Ok(guard) => guard,
                Err(e) => return Ok(HostOutcome::LockUnavailable(e)),
            };
            self.runner
                .run(&command, *self.tunnel.timeout())
                .with_debug_object_and_fn_name(host.clone(), function_path!())?
        };

        Ok(self.classify(host, command, output))
    }
}
