use bon::Builder;
use chrono::{DateTime, TimeDelta, Utc};
use getset::CopyGetters;

/// Wall-clock timer for a whole run, in UTC.
///
/// Both endpoints are optional: asking for the elapsed time before the
/// stopwatch was started and stopped gives `None` rather than zero.
#[derive(Clone, Copy, Debug, Default, Builder, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Stopwatch {
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

impl Stopwatch {
    pub fn start(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.started_at = Some(now);
        now
    }

    pub fn stop(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.stopped_at = Some(now);
        now
    }

    /// Starts now and stops when the returned guard is dropped.
    pub fn running(&mut self) -> RunningStopwatch<'_> {
        self.start();
        RunningStopwatch { stopwatch: self }
    }

    pub fn elapsed(&self) -> Option<TimeDelta> {
        Some(self.stopped_at? - self.started_at?)
    }

    /// Elapsed time floored to whole seconds, 12345.6789s gives 12345s.
    pub fn elapsed_whole_seconds(&self) -> Option<TimeDelta> {
        let elapsed = self.elapsed()?;
        let mut secs = elapsed.num_seconds();
        // num_seconds truncates toward zero
        if elapsed < TimeDelta::seconds(secs) {
            secs -= 1;
        }
        Some(TimeDelta::seconds(secs))
    }
}

#[derive(Debug)]
pub struct RunningStopwatch<'a> {
    stopwatch: &'a mut Stopwatch,
}

impl Drop for RunningStopwatch<'_> {
    fn drop(&mut self) {
        self.stopwatch.stop();
    }
}
