//! Runtime instrumentation: query metrics, profiling and the query log.
//!
//! All three are plain values injected through the service registry, each
//! with an explicit `reset` for test isolation.

mod metrics;
mod profiler;
mod query_logger;

pub use metrics::{
    MetricsCollector, MetricsSnapshot, MetricsSummary, SlowQuery, DEFAULT_SLOW_QUERY_THRESHOLD_MS,
};
pub use profiler::{Checkpoint, PerformanceProfiler, ProfileSample};
pub use query_logger::{QueryLogger, QueryRecord, DEFAULT_QUERY_LOG_CAPACITY};

use sysinfo::System;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resident memory of this process in bytes, when the platform reports it.
pub fn process_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return None;
    }
    system.process(pid).map(|process| process.memory())
}

/// Resident memory in megabytes, `0.0` when unknown
pub fn process_memory_mb() -> f64 {
    process_memory_bytes()
        .map(|bytes| bytes as f64 / BYTES_PER_MB)
        .unwrap_or_default()
}

/// Round to two decimal places for reports
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
