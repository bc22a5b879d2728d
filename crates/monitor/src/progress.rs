use std::path::Path;
use std::time::{Duration, Instant};

use tracing::info;

/// Values logged with each progress line.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot<'a> {
    pub cursor: u64,
    pub head: u64,
    pub to_rules: usize,
    pub from_rules: usize,
    pub rules_file: &'a Path,
}

/// Emits a periodic "still alive" line; disabled when no interval is set.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: Option<Duration>,
    last_report: Instant,
    blocks_since: u64,
    reports: u64,
}

impl ProgressReporter {
    pub fn new(interval: Option<Duration>, now: Instant) -> Self {
        Self {
            interval,
            last_report: now,
            blocks_since: 0,
            reports: 0,
        }
    }

    pub fn record_blocks(&mut self, count: u64) {
        self.blocks_since += count;
    }

    /// Logs and resets the window once the interval has elapsed. Returns
    /// whether a line was emitted.
    pub fn maybe_report(&mut self, now: Instant, snapshot: ProgressSnapshot<'_>) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        if now.saturating_duration_since(self.last_report) < interval {
            return false;
        }

        self.reports += 1;
        info!(
            report = self.reports,
            cursor = snapshot.cursor,
            head = snapshot.head,
            blocks_since_last = self.blocks_since,
            to_rules = snapshot.to_rules,
            from_rules = snapshot.from_rules,
            rules_file = %snapshot.rules_file.display(),
            "monitor progress"
        );
        self.last_report = now;
        self.blocks_since = 0;
        true
    }

    #[cfg(test)]
    pub(crate) fn blocks_since(&self) -> u64 {
        self.blocks_since
    }

    #[cfg(test)]
    pub(crate) fn reports(&self) -> u64 {
        self.reports
    }
}
