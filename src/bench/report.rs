//! Report generation for case results.

use serde::{Deserialize, Serialize};

use super::metrics::{LatencySummary, TpsSummary};

/// Result of one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub description: String,
    pub action: String,
    pub total_requests: usize,
    pub succeeded: usize,
    /// Percent
    pub success_rate: f64,
    /// None when the case finished before a TPS sample was taken
    pub tps: Option<TpsSummary>,
    pub latency: LatencySummary,
    pub elapsed_secs: f64,
}

impl CaseReport {
    /// Log lines in the format operators grep for
    pub fn log(&self) {
        tracing::info!(
            "Total Requests: {}, Succeed: {}, Rate: {:.2}%",
            self.total_requests,
            self.succeeded,
            self.success_rate
        );
        match &self.tps {
            Some(t) => tracing::info!(
                "Max TPS: {}, Min TPS: {}, Avg TPS: {}, Median: {}",
                t.max,
                t.min,
                t.avg,
                t.median
            ),
            None => tracing::info!("no TPS statistics"),
        }
    }
}

/// All case results of one perf run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub cases: Vec<CaseReport>,
}

impl BenchmarkReport {
    pub fn push(&mut self, report: CaseReport) {
        self.cases.push(report);
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        println!();
        println!("╔═══════════════════════════════════════════════════════════════════════════════════════════════════════════════╗");
        println!("║                                        CMQ PERFORMANCE RESULTS                                                ║");
        println!("╚═══════════════════════════════════════════════════════════════════════════════════════════════════════════════╝");

        for case in &self.cases {
            println!();
            println!("Case: {} ({})", case.description, case.action);
            println!("┌──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┐");
            println!("│  Total   │ Succeed  │  Rate%   │ TPS max  │ TPS avg  │ TPS med  │ p50(ms)  │ p95(ms)  │ p99(ms)  │ max(ms)  │");
            println!("├──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┤");
            let tps = case.tps.clone().unwrap_or_default();
            println!(
                "│ {:>8} │ {:>8} │ {:>7.2}% │ {:>8} │ {:>8} │ {:>8} │ {:>8.2} │ {:>8.2} │ {:>8.2} │ {:>8.2} │",
                case.total_requests,
                case.succeeded,
                case.success_rate,
                tps.max,
                tps.avg,
                tps.median,
                case.latency.p50_ms,
                case.latency.p95_ms,
                case.latency.p99_ms,
                case.latency.max_ms,
            );
            println!("└──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┘");
            println!(
                "Latency: count {}, min {:.2}ms, mean {:.2}ms, stddev {:.2}ms, p75 {:.2}ms, p99.9 {:.2}ms, rate {:.1}/s",
                case.latency.count,
                case.latency.min_ms,
                case.latency.mean_ms,
                case.latency.stddev_ms,
                case.latency.p75_ms,
                case.latency.p999_ms,
                case.latency.rate,
            );
            println!("TPS min: {}, elapsed: {:.2}s", tps.min, case.elapsed_secs);
        }
        println!();
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
