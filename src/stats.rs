//! # Statistics Module
//!
//! Collects counters about the crawl's operation.
//!
//! ## Overview
//!
//! The `StatCollector` is shared by every component of the engine. Fixed
//! counters are plain atomics; counters whose keys are only known at runtime
//! (ignore reasons, download error kinds, status codes, middleware-specific
//! values such as `retry_count`) live in `DashMap`s. At close the engine
//! records the finish reason and, when `stats_dump` is on, logs the whole
//! collection.
//!
//! ## Key Metrics Tracked
//!
//! - **Request Metrics**: enqueued, sent, succeeded, failed, rescheduled and ignored requests
//! - **Response Metrics**: received responses, status code distribution, bytes downloaded
//! - **Record Metrics**: scraped, processed and dropped records
//! - **Error Metrics**: failed units of work, per download error kind
//!
//! ## Example
//!
//! ```rust,ignore
//! let stats = crawler.get_stats();
//! println!("{}", stats.to_json_string_pretty()?);
//! println!("{}", stats);
//! ```

use crate::error::SpiderError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Key of the ignore counter, both in totals and as the prefix of per-reason keys.
pub const REQUEST_IGNORED_COUNT: &str = "request_ignored_count";

// A point-in-time copy of the counters, used for every export format.
#[derive(Debug, Serialize)]
struct StatsSnapshot {
    requests_enqueued: usize,
    requests_sent: usize,
    requests_succeeded: usize,
    requests_failed: usize,
    requests_rescheduled: usize,
    request_ignored_count: usize,
    responses_received: usize,
    total_bytes_downloaded: usize,
    records_scraped: usize,
    records_processed: usize,
    records_dropped: usize,
    errors: usize,
    ignore_reasons: BTreeMap<String, usize>,
    download_errors: BTreeMap<String, usize>,
    response_status_counts: BTreeMap<u16, usize>,
    values: BTreeMap<String, usize>,
    elapsed_secs: f64,
    finish_reason: Option<String>,
}

impl StatsSnapshot {
    fn requests_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.requests_sent as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;
        const GB: usize = 1024 * MB;

        if self.total_bytes_downloaded >= GB {
            format!("{:.2} GB", self.total_bytes_downloaded as f64 / GB as f64)
        } else if self.total_bytes_downloaded >= MB {
            format!("{:.2} MB", self.total_bytes_downloaded as f64 / MB as f64)
        } else if self.total_bytes_downloaded >= KB {
            format!("{:.2} KB", self.total_bytes_downloaded as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes_downloaded)
        }
    }
}

fn to_sorted<K: Ord + Clone + std::hash::Hash + Eq>(map: &DashMap<K, usize>) -> BTreeMap<K, usize> {
    map.iter().map(|e| (e.key().clone(), *e.value())).collect()
}

/// Collects and stores statistics about the crawl.
#[derive(Debug)]
pub struct StatCollector {
    pub start_time: Instant,
    finish: Mutex<Option<(String, Duration)>>,

    pub requests_enqueued: AtomicUsize,
    pub requests_sent: AtomicUsize,
    pub requests_succeeded: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub requests_rescheduled: AtomicUsize,
    pub requests_ignored: AtomicUsize,

    pub responses_received: AtomicUsize,
    pub total_bytes_downloaded: AtomicUsize,
    pub response_status_counts: DashMap<u16, usize>,

    pub records_scraped: AtomicUsize,
    pub records_processed: AtomicUsize,
    pub records_dropped: AtomicUsize,

    pub errors: AtomicUsize,
    ignore_reasons: DashMap<String, usize>,
    download_errors: DashMap<String, usize>,
    values: DashMap<String, usize>,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters initialized to zero.
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            finish: Mutex::new(None),
            requests_enqueued: AtomicUsize::new(0),
            requests_sent: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            requests_rescheduled: AtomicUsize::new(0),
            requests_ignored: AtomicUsize::new(0),
            responses_received: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
            response_status_counts: DashMap::new(),
            records_scraped: AtomicUsize::new(0),
            records_processed: AtomicUsize::new(0),
            records_dropped: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            ignore_reasons: DashMap::new(),
            download_errors: DashMap::new(),
            values: DashMap::new(),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let finish = self.finish.lock().clone();
        let elapsed = finish
            .as_ref()
            .map(|(_, elapsed)| *elapsed)
            .unwrap_or_else(|| self.start_time.elapsed());

        StatsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::SeqCst),
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            requests_rescheduled: self.requests_rescheduled.load(Ordering::SeqCst),
            request_ignored_count: self.requests_ignored.load(Ordering::SeqCst),
            responses_received: self.responses_received.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            records_scraped: self.records_scraped.load(Ordering::SeqCst),
            records_processed: self.records_processed.load(Ordering::SeqCst),
            records_dropped: self.records_dropped.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            ignore_reasons: to_sorted(&self.ignore_reasons),
            download_errors: to_sorted(&self.download_errors),
            response_status_counts: to_sorted(&self.response_status_counts),
            values: to_sorted(&self.values),
            elapsed_secs: elapsed.as_secs_f64(),
            finish_reason: finish.map(|(reason, _)| reason),
        }
    }

    pub(crate) fn increment_requests_enqueued(&self) {
        self.requests_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_rescheduled(&self) {
        self.requests_rescheduled.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a failed download under its error kind.
    pub(crate) fn record_download_error(&self, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
        *self.download_errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Counts an ignored request, in total and under its reason.
    pub(crate) fn record_ignored(&self, reason: Option<&str>) {
        self.requests_ignored.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = reason {
            *self.ignore_reasons.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    /// Records a response: its status code and body size.
    pub(crate) fn record_response(&self, status_code: u16, bytes: usize) {
        self.responses_received.fetch_add(1, Ordering::SeqCst);
        self.total_bytes_downloaded.fetch_add(bytes, Ordering::SeqCst);
        *self.response_status_counts.entry(status_code).or_insert(0) += 1;
    }

    pub(crate) fn increment_records_scraped(&self) {
        self.records_scraped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_records_processed(&self) {
        self.records_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_records_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    /// Increments a free-form counter, e.g. `retry_count`.
    pub fn inc_value(&self, key: &str) {
        *self.values.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn get_value(&self, key: &str) -> usize {
        self.values.get(key).map_or(0, |v| *v)
    }

    pub fn ignored_for(&self, reason: &str) -> usize {
        self.ignore_reasons.get(reason).map_or(0, |v| *v)
    }

    pub fn download_errors_for(&self, kind: &str) -> usize {
        self.download_errors.get(kind).map_or(0, |v| *v)
    }

    /// Marks the crawl as finished. Only the first call has an effect.
    pub(crate) fn close(&self, reason: &str) {
        let mut finish = self.finish.lock();
        if finish.is_none() {
            *finish = Some((reason.to_string(), self.start_time.elapsed()));
        }
    }

    pub fn finish_reason(&self) -> Option<String> {
        self.finish.lock().as_ref().map(|(reason, _)| reason.clone())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }

    pub fn to_json_string(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(
            f,
            "  finish reason : {}",
            snapshot.finish_reason.as_deref().unwrap_or("running")
        )?;
        writeln!(
            f,
            "  duration      : {:.2}s ({:.2} req/s)",
            snapshot.elapsed_secs,
            snapshot.requests_per_second()
        )?;
        writeln!(
            f,
            "  requests      : enqueued {}, sent {}, succeeded {}, failed {}, rescheduled {}, ignored {}",
            snapshot.requests_enqueued,
            snapshot.requests_sent,
            snapshot.requests_succeeded,
            snapshot.requests_failed,
            snapshot.requests_rescheduled,
            snapshot.request_ignored_count
        )?;
        writeln!(
            f,
            "  responses     : received {}, downloaded {}",
            snapshot.responses_received,
            snapshot.formatted_bytes()
        )?;
        writeln!(
            f,
            "  records       : scraped {}, processed {}, dropped {}",
            snapshot.records_scraped, snapshot.records_processed, snapshot.records_dropped
        )?;
        writeln!(f, "  errors        : {}", snapshot.errors)?;

        for (code, count) in &snapshot.response_status_counts {
            writeln!(f, "  status {code}    : {count}")?;
        }
        for (reason, count) in &snapshot.ignore_reasons {
            writeln!(f, "  {REQUEST_IGNORED_COUNT}/{reason} : {count}")?;
        }
        for (kind, count) in &snapshot.download_errors {
            writeln!(f, "  download_error/{kind} : {count}")?;
        }
        for (key, count) in &snapshot.values {
            writeln!(f, "  {key} : {count}")?;
        }
        Ok(())
    }
}
