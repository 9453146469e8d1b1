//! Where the run reports to.
//!
//! Two channels: a detailed one carrying diagnostics (commands, captured
//! output) and a terse progress one meant for operators, plus one structured
//! summary record per run. The orchestrator and the executor receive a
//! [`Reporter`] instead of reaching for global loggers.

pub mod mail;
pub mod subscriber;

use crate::backup::backuper::RunSummary;
use std::sync::Arc;
use tracing::Level;

pub const DETAIL_TARGET: &str = "qb_backup::detail";
pub const PROGRESS_TARGET: &str = "qb_backup::progress";
pub const SUMMARY_TARGET: &str = "qb_backup::summary";

/// Summary fields usable as `$WORD` placeholders in mail subjects.
pub const SUBSTITUTE_WORDS: [&str; 6] = ["SUCCEEDED", "FAILED", "SKIPPED", "TOTAL", "RUNTIME", "STATUS"];

pub trait Reporter {
    fn detail(&self, level: Level, message: &str);
    fn progress(&self, level: Level, message: &str);
    fn summary(&self, summary: &RunSummary);
}

pub type SharedReporter = Arc<dyn Reporter + Send + Sync>;

macro_rules! event_at {
    ($target:expr, $level:expr, $message:expr) => {
        match $level {
            Level::ERROR => tracing::error!(target: $target, "{}", $message),
            Level::WARN => tracing::warn!(target: $target, "{}", $message),
            Level::INFO => tracing::info!(target: $target, "{}", $message),
            Level::DEBUG => tracing::debug!(target: $target, "{}", $message),
            _ => tracing::trace!(target: $target, "{}", $message),
        }
    };
}

/// Forwards everything to `tracing`, one target per channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn detail(&self, level: Level, message: &str) {
        event_at!(DETAIL_TARGET, level, message)
    }

    fn progress(&self, level: Level, message: &str) {
        event_at!(PROGRESS_TARGET, level, message)
    }

    fn summary(&self, summary: &RunSummary) {
        tracing::info!(
            target: SUMMARY_TARGET,
            SUCCEEDED = summary.succeeded(),
            FAILED = summary.failed(),
            SKIPPED = summary.skipped(),
            TOTAL = summary.total(),
            RUNTIME = summary.runtime_seconds(),
            STATUS = %summary.status(),
            "run summary"
        );
    }
}

/// Frames a block of captured output so it stands out in a log:
/// 40 `>` (title inlined) above, 40 `<` below.
pub fn bound(text: &str, title: &str) -> String {
    let title = if title.is_empty() {
        String::new()
    } else {
        format!(" {title} ")
    };
    format!(">>>{title:><37}\n{text}\n<<<{title:<<37}")
}
