//! Performance harness for CMQ gateways.
//!
//! This module provides:
//! - JSON case files describing the load to generate
//! - A case runner with a worker pool, TPS cap and CRC32 client selection
//! - HdrHistogram latency summaries and sliding-window TPS statistics
//! - A mock CMQ gateway for tests and standalone runs

pub mod config;
pub mod metrics;
pub mod mock_server;
pub mod payload;
pub mod report;
pub mod runner;
pub mod tps;

pub use config::{load_cases, Action, Case, MockServerConfig};
pub use mock_server::MockCmqServer;
pub use report::{BenchmarkReport, CaseReport};
pub use runner::{CaseRunner, PerfOptions};
