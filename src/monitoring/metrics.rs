//! Query and persistence counters with a bounded slow-query log.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

/// Queries slower than this are sampled
pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: f64 = 100.0;

const SLOW_QUERY_CAPACITY: usize = 10;
const SLOW_QUERY_MAX_CHARS: usize = 100;
const PROMETHEUS_PREFIX: &str = "cycle_orm_";

/// A slow query sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuery {
    /// Query text, truncated to 100 characters
    pub query: String,
    pub duration_ms: f64,
    pub timestamp: String,
}

/// Point-in-time copy of every counter and the slow-query samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub slow_queries: Vec<SlowQuery>,
}

/// Derived ratios for dashboards and the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_queries: u64,
    pub failed_queries: u64,
    /// Failed over executed plus failed, in percent
    pub failure_rate: f64,
    /// Hits over lookups, in percent
    pub cache_hit_ratio: f64,
    pub slow_queries: u64,
    pub entities_persisted: u64,
    pub entities_loaded: u64,
}

/// Process-wide ORM metrics.
///
/// Counters are atomics; the slow-query ring is guarded by a mutex so the
/// FIFO bound holds under concurrent appends.
#[derive(Debug)]
pub struct MetricsCollector {
    queries_executed: AtomicU64,
    queries_failed: AtomicU64,
    entities_persisted: AtomicU64,
    entities_loaded: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    slow_query_count: AtomicU64,
    custom: Mutex<BTreeMap<String, u64>>,
    slow_queries: Mutex<VecDeque<SlowQuery>>,
    slow_threshold_ms: f64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SLOW_QUERY_THRESHOLD_MS)
    }

    pub fn with_threshold(slow_threshold_ms: f64) -> Self {
        Self {
            queries_executed: AtomicU64::new(0),
            queries_failed: AtomicU64::new(0),
            entities_persisted: AtomicU64::new(0),
            entities_loaded: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            slow_query_count: AtomicU64::new(0),
            custom: Mutex::new(BTreeMap::new()),
            slow_queries: Mutex::new(VecDeque::with_capacity(SLOW_QUERY_CAPACITY)),
            slow_threshold_ms,
        }
    }

    pub fn slow_threshold_ms(&self) -> f64 {
        self.slow_threshold_ms
    }

    fn builtin(&self, name: &str) -> Option<&AtomicU64> {
        match name {
            "queries_executed" => Some(&self.queries_executed),
            "queries_failed" => Some(&self.queries_failed),
            "entities_persisted" => Some(&self.entities_persisted),
            "entities_loaded" => Some(&self.entities_loaded),
            "cache_hits" => Some(&self.cache_hits),
            "cache_misses" => Some(&self.cache_misses),
            "slow_queries" => Some(&self.slow_query_count),
            _ => None,
        }
    }

    /// Add `by` to a named counter, creating custom counters on first use.
    pub fn increment(&self, name: &str, by: u64) {
        match self.builtin(name) {
            Some(counter) => {
                counter.fetch_add(by, Ordering::Relaxed);
            }
            None => {
                *self
                    .custom
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(name.to_string())
                    .or_default() += by;
            }
        }
    }

    /// Current value of a counter; unknown names read as zero
    pub fn get(&self, name: &str) -> u64 {
        match self.builtin(name) {
            Some(counter) => counter.load(Ordering::Relaxed),
            None => self
                .custom
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .copied()
                .unwrap_or_default(),
        }
    }

    /// Count an executed query, sampling it when slower than the threshold.
    pub fn record_query_time(&self, sql: &str, duration_ms: f64) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        if duration_ms <= self.slow_threshold_ms {
            return;
        }
        self.slow_query_count.fetch_add(1, Ordering::Relaxed);

        let sample = SlowQuery {
            query: sql.chars().take(SLOW_QUERY_MAX_CHARS).collect(),
            duration_ms,
            timestamp: Utc::now().to_rfc3339(),
        };
        let mut samples = self
            .slow_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        samples.push_back(sample);
        while samples.len() > SLOW_QUERY_CAPACITY {
            samples.pop_front();
        }
    }

    pub fn record_query_failure(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, count: u64) {
        self.entities_persisted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_loaded(&self, count: u64) {
        self.entities_loaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Slow-query samples, oldest first
    pub fn get_slow_queries(&self) -> Vec<SlowQuery> {
        self.slow_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters(),
            slow_queries: self.get_slow_queries(),
        }
    }

    /// Zero every counter and drop all samples.
    pub fn reset(&self) {
        for counter in [
            &self.queries_executed,
            &self.queries_failed,
            &self.entities_persisted,
            &self.entities_loaded,
            &self.cache_hits,
            &self.cache_misses,
            &self.slow_query_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.custom
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.slow_queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let executed = self.queries_executed.load(Ordering::Relaxed);
        let failed = self.queries_failed.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        MetricsSummary {
            total_queries: executed,
            failed_queries: failed,
            failure_rate: percent(failed, executed + failed),
            cache_hit_ratio: percent(hits, hits + misses),
            slow_queries: self.slow_query_count.load(Ordering::Relaxed),
            entities_persisted: self.entities_persisted.load(Ordering::Relaxed),
            entities_loaded: self.entities_loaded.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition, one `# TYPE` line and one sample per counter.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.counters() {
            let name = format!("{}{}", PROMETHEUS_PREFIX, sanitize_metric_name(&name));
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        }
        out
    }

    fn counters(&self) -> BTreeMap<String, u64> {
        let mut counters: BTreeMap<String, u64> = [
            "queries_executed",
            "queries_failed",
            "entities_persisted",
            "entities_loaded",
            "cache_hits",
            "cache_misses",
            "slow_queries",
        ]
        .into_iter()
        .map(|name| (name.to_string(), self.get(name)))
        .collect();
        counters.extend(
            self.custom
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(k, v)| (k.clone(), *v)),
        );
        counters
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        super::round2(part as f64 * 100.0 / whole as f64)
    }
}

fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
