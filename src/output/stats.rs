//! Crawl statistics
//!
//! A single mutex-guarded histogram of status codes shared by all workers,
//! plus the session start used for throughput figures.

use crate::document::NOT_CRAWLED;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Live crawl statistics
#[derive(Debug)]
pub struct CrawlStats {
    started_at: DateTime<Utc>,
    start: Instant,
    status_codes: Mutex<HashMap<i32, u64>>,
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
            status_codes: Mutex::new(HashMap::new()),
        }
    }

    /// Records one outcome; `-1` means no page status was obtained
    pub fn update(&self, code: i32) {
        *self
            .status_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(code)
            .or_insert(0) += 1;
    }

    /// Count recorded for one status code
    pub fn count(&self, code: i32) -> u64 {
        self.status_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .copied()
            .unwrap_or(0)
    }

    /// Total outcomes recorded
    pub fn total(&self) -> u64 {
        self.status_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Copy of the histogram ordered by status code
    pub fn snapshot(&self) -> BTreeMap<i32, u64> {
        self.status_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(code, count)| (*code, *count))
            .collect()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Human-readable report for the time elapsed so far
    pub fn report(&self) -> String {
        self.report_for(self.elapsed())
    }

    /// Human-readable report as of `elapsed`
    ///
    /// Empty when nothing was recorded.
    pub fn report_for(&self, elapsed: Duration) -> String {
        let mut classes: BTreeMap<String, u64> = BTreeMap::new();
        for (code, count) in self.snapshot() {
            *classes.entry(class_label(code)).or_insert(0) += count;
        }

        let total: u64 = classes.values().sum();
        if total == 0 {
            return String::new();
        }

        let secs = elapsed.as_secs_f64().max(1e-3);
        let per = |window: f64| (total as f64 * window / secs).floor() as u64;

        let mut report = String::new();
        let _ = writeln!(report, "[stats] Crawled: {} Elapsed: {:.2?}", commas(total), elapsed);
        let _ = writeln!(
            report,
            "[stats] Rate: {} per second, {} per minute, {} per hour, {} per day",
            commas(per(1.0)),
            commas(per(60.0)),
            commas(per(3_600.0)),
            commas(per(86_400.0))
        );

        let histogram = classes
            .iter()
            .map(|(label, count)| format!("{}: {} ({}%)", label, commas(*count), 100 * count / total))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(report, "[stats] {}", histogram);

        report
    }
}

fn class_label(code: i32) -> String {
    match code {
        NOT_CRAWLED => "Not Crawled".to_string(),
        100..=999 => format!("{}xx", code / 100),
        other => other.to_string(),
    }
}

/// Formats an integer with thousands separators
pub fn commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
