//! Per-call statistics and their HdrHistogram summaries.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::System;

use super::config::Case;

/// Upper bound on preallocated statistics entries
pub const MAX_PREALLOCATED: usize = 100 * 1024 * 1024;

/// Outcome of one dispatched call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistic {
    pub cost: Duration,
    pub succeeded: bool,
}

/// Entries to reserve for a case: expected calls, capped by 100 Mi entries
/// and 60% of system memory
pub fn stats_capacity(case: &Case) -> usize {
    let expected = if case.repeat_timeout > 0 {
        case.maximum_tps
            .max(0)
            .saturating_mul(case.repeat_timeout)
            .saturating_mul(case.resource_count)
    } else {
        case.repeat_times.max(0).saturating_mul(case.resource_count)
    };
    let expected = usize::try_from(expected).unwrap_or(0);

    let mut sys = System::new();
    sys.refresh_memory();
    let memory_cap = (sys.total_memory() as usize / 10 * 6) / std::mem::size_of::<Statistic>();

    expected.min(MAX_PREALLOCATED).min(memory_cap)
}

/// Latency distribution of a case, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub p50_ms: f64,
    pub p75_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    /// Calls per second over the case duration
    pub rate: f64,
}

impl LatencySummary {
    /// Summarize recorded calls, optionally only the successful ones
    pub fn from_stats(stats: &[Statistic], succ_only: bool, elapsed: Duration) -> Self {
        // Latencies up to 10 minutes with 3 significant figures
        let mut hist = match Histogram::<u64>::new_with_bounds(1, 600_000_000, 3) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create latency histogram");
                return Self::default();
            }
        };
        for s in stats.iter().filter(|s| !succ_only || s.succeeded) {
            let us = s.cost.as_micros() as u64;
            hist.saturating_record(us.max(1));
        }

        let count = hist.len();
        if count == 0 {
            return Self::default();
        }
        let ms = |us: u64| us as f64 / 1000.0;
        let secs = elapsed.as_secs_f64();
        Self {
            count,
            min_ms: ms(hist.min()),
            max_ms: ms(hist.max()),
            mean_ms: hist.mean() / 1000.0,
            stddev_ms: hist.stdev() / 1000.0,
            p50_ms: ms(hist.value_at_quantile(0.50)),
            p75_ms: ms(hist.value_at_quantile(0.75)),
            p95_ms: ms(hist.value_at_quantile(0.95)),
            p99_ms: ms(hist.value_at_quantile(0.99)),
            p999_ms: ms(hist.value_at_quantile(0.999)),
            rate: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        }
    }
}

/// Distribution of the one second TPS samples
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpsSummary {
    pub max: u32,
    pub min: u32,
    pub avg: u32,
    pub median: u32,
}

impl TpsSummary {
    pub fn from_samples(mut samples: Vec<u32>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let len = samples.len();
        let sum: u64 = samples.iter().map(|&v| v as u64).sum();
        Some(Self {
            max: samples[len - 1],
            min: samples[0],
            avg: (sum / len as u64) as u32,
            median: samples[len / 2],
        })
    }
}

/// Successful calls and success rate in percent
pub fn success_rate(stats: &[Statistic]) -> (usize, f64) {
    let succeeded = stats.iter().filter(|s| s.succeeded).count();
    if stats.is_empty() {
        return (0, 0.0);
    }
    (succeeded, succeeded as f64 / stats.len() as f64 * 100.0)
}
