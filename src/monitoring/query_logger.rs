//! Bounded log of recent queries.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

pub const DEFAULT_QUERY_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub sql: String,
    pub bindings: Vec<String>,
    pub duration_ms: f64,
    pub timestamp: String,
    pub connection: String,
}

impl QueryRecord {
    pub fn new(
        connection: impl Into<String>,
        sql: impl Into<String>,
        bindings: Vec<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            duration_ms,
            timestamp: Utc::now().to_rfc3339(),
            connection: connection.into(),
        }
    }
}

/// Ring buffer of the most recent queries; the oldest record is evicted first.
#[derive(Debug)]
pub struct QueryLogger {
    capacity: usize,
    records: Mutex<VecDeque<QueryRecord>>,
}

impl Default for QueryLogger {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_LOG_CAPACITY)
    }
}

impl QueryLogger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn log(&self, record: QueryRecord) {
        tracing::debug!(
            connection = %record.connection,
            duration_ms = record.duration_ms,
            bindings = ?record.bindings,
            "{}",
            record.sql
        );
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// The last `n` records, oldest first
    pub fn recent(&self, n: usize) -> Vec<QueryRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .skip(records.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sql: &str) -> QueryRecord {
        QueryRecord::new("default", sql, vec![], 1.0)
    }

    #[test]
    fn oldest_records_are_evicted() {
        let logger = QueryLogger::new(3);
        for i in 0..5 {
            logger.log(record(&format!("SELECT {}", i)));
        }
        assert_eq!(logger.len(), 3);
        let sql: Vec<String> = logger.recent(10).into_iter().map(|r| r.sql).collect();
        assert_eq!(sql, vec!["SELECT 2", "SELECT 3", "SELECT 4"]);
    }

    #[test]
    fn recent_returns_tail() {
        let logger = QueryLogger::default();
        logger.log(record("a"));
        logger.log(record("b"));
        logger.log(record("c"));
        let sql: Vec<String> = logger.recent(2).into_iter().map(|r| r.sql).collect();
        assert_eq!(sql, vec!["b", "c"]);
        assert_eq!(logger.capacity(), 100);
    }

    #[test]
    fn clear_empties_log() {
        let logger = QueryLogger::default();
        logger.log(record("a"));
        logger.clear();
        assert!(logger.is_empty());
    }
}
