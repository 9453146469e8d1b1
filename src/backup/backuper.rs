use crate::backup::executor::{HostExecutor, HostOutcome, TransportFailure};
use crate::backup::host::Host;
use crate::backup::report::{bound, SharedReporter};
use crate::backup::result_error::result::Result;
use crate::backup::stopwatch::Stopwatch;
use bon::Builder;
use derive_more::Display;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};
use tracing::Level;

const SUMMARY_LABEL: &str = "Summary";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
}

/// Counters of a finished run. `succeeded + failed + skipped == total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RunSummary {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    total: usize,
    runtime_seconds: i64,
    status: RunStatus,
}

impl RunSummary {
    pub fn return_code(&self) -> i32 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Failure => 1,
        }
    }
}

/// Backs up hosts one after the other, in order.
///
/// With `failfast`, the first failing host stops the run; it is still counted
/// as failed, the hosts after it are counted as skipped.
#[derive(Builder)]
pub struct Backuper<E: HostExecutor> {
    hosts: Vec<Host>,
    #[builder(default)]
    failfast: bool,
    executor: E,
    reporter: SharedReporter,
}

impl<E: HostExecutor> Backuper<E> {
    /// Only errors that are not about a single host (the transport cannot be
    /// spawned at all, ...) end the run early with `Err`.
    pub fn run(&self) -> Result<RunSummary> {
        let mut rc = 0;
        let mut succeeded = 0;
        let mut failed = 0;
        let mut stopwatch = Stopwatch::default();
        {
            let _running = stopwatch.running();
            for host in &self.hosts {
                match self.executor.execute(host)? {
                    HostOutcome::Success => succeeded += 1,
                    HostOutcome::Failure(failure) => {
                        self.report_failure(host, &failure);
                        failed += 1;
                        rc = 1;
                    }
                    HostOutcome::LockUnavailable(e) => {
                        self.reporter.detail(
                            Level::WARN,
                            &format!("failed to take lock on file {:?}", e.path),
                        );
                        self.reporter.detail(
                            Level::WARN,
                            &format!("backup of host {} aborted", host.hostname()),
                        );
                        self.reporter.progress(
                            Level::WARN,
                            &format!("{:<20}: backup aborted, lock held elsewhere", host.hostname()),
                        );
                        failed += 1;
                        rc = 1;
                    }
                }
                if self.failfast && rc != 0 {
                    break;
                }
            }
        }

        let total = self.hosts.len();
        let summary = RunSummary {
            succeeded,
            failed,
            skipped: total - succeeded - failed,
            total,
            runtime_seconds: stopwatch
                .elapsed_whole_seconds()
                .map_or(0, |elapsed| elapsed.num_seconds()),
            status: if rc == 0 {
                RunStatus::Success
            } else {
                RunStatus::Failure
            },
        };

        self.reporter.summary(&summary);
        self.reporter.progress(
            Level::INFO,
            &format!("{SUMMARY_LABEL:<20}: RUNTIME {}", summary.runtime_seconds),
        );
        self.reporter.progress(Level::INFO, &digest(&summary));

        Ok(summary)
    }

    fn report_failure(&self, host: &Host, failure: &TransportFailure) {
        self.reporter.detail(
            Level::ERROR,
            &format!("backup of {} {}", host.hostname(), failure.kind),
        );
        self.reporter.progress(
            Level::ERROR,
            &format!(
                "{:<20}: backup failed. More details in another email",
                host.hostname()
            ),
        );
        self.reporter.detail(
            Level::ERROR,
            &format!("erroneous command: {}", failure.command),
        );
        self.reporter
            .detail(Level::ERROR, &bound(&failure.stderr, "stderr"));
        self.reporter
            .detail(Level::ERROR, &bound(&failure.stdout, "stdout"));
    }
}

fn digest(summary: &RunSummary) -> String {
    format!(
        "{SUMMARY_LABEL:<20}: SUCCESS {:>3}/{:<3}  FAILURE {:>3}/{:<3}  SKIPPED {:>3}/{:<3}",
        summary.succeeded,
        summary.total,
        summary.failed,
        summary.total,
        summary.skipped,
        summary.total
    )
}
