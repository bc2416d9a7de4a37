//! Named timers and checkpoints.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::{process_memory_mb, round2};

/// Result of a finished timer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSample {
    pub name: String,
    pub duration_ms: f64,
    pub memory_delta_mb: f64,
    pub timestamp: String,
}

/// A point in time recorded relative to profiler creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    pub name: String,
    pub elapsed_ms: f64,
    pub memory_mb: f64,
    pub timestamp: String,
}

struct ActiveTimer {
    started: Instant,
    memory_mb: f64,
}

/// Named start/end timers plus a checkpoint log.
pub struct PerformanceProfiler {
    created: Instant,
    active: Mutex<HashMap<String, ActiveTimer>>,
    checkpoints: Mutex<Vec<Checkpoint>>,
}

impl Default for PerformanceProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceProfiler {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            active: Mutex::new(HashMap::new()),
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    /// Start (or restart) a named timer.
    pub fn start(&self, name: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                ActiveTimer {
                    started: Instant::now(),
                    memory_mb: process_memory_mb(),
                },
            );
    }

    /// Stop a timer; `None` if it was never started.
    pub fn end(&self, name: &str) -> Option<ProfileSample> {
        let timer = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)?;
        Some(ProfileSample {
            name: name.to_string(),
            duration_ms: round2(timer.started.elapsed().as_secs_f64() * 1000.0),
            memory_delta_mb: round2(process_memory_mb() - timer.memory_mb),
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn checkpoint(&self, name: &str) {
        let checkpoint = Checkpoint {
            name: name.to_string(),
            elapsed_ms: round2(self.created.elapsed().as_secs_f64() * 1000.0),
            memory_mb: round2(process_memory_mb()),
            timestamp: Utc::now().to_rfc3339(),
        };
        tracing::trace!(checkpoint = %checkpoint.name, elapsed_ms = checkpoint.elapsed_ms, "profiler checkpoint");
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(checkpoint);
    }

    /// Checkpoints in recording order
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Time a future under `name`.
    pub async fn measure<F, T>(&self, name: &str, future: F) -> (T, ProfileSample)
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let memory_mb = process_memory_mb();
        let output = future.await;
        let sample = ProfileSample {
            name: name.to_string(),
            duration_ms: round2(started.elapsed().as_secs_f64() * 1000.0),
            memory_delta_mb: round2(process_memory_mb() - memory_mb),
            timestamp: Utc::now().to_rfc3339(),
        };
        (output, sample)
    }

    /// Drop running timers and checkpoints.
    pub fn reset(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn end_returns_sample_once() {
        let profiler = PerformanceProfiler::new();
        profiler.start("boot");
        assert!(profiler.is_running("boot"));

        let sample = profiler.end("boot").unwrap();
        assert_eq!(sample.name, "boot");
        assert!(sample.duration_ms >= 0.0);
        assert!(profiler.end("boot").is_none());
    }

    #[test]
    fn end_without_start_is_none() {
        assert!(PerformanceProfiler::new().end("never").is_none());
    }

    #[test]
    fn checkpoints_keep_order_until_reset() {
        let profiler = PerformanceProfiler::new();
        profiler.checkpoint("config");
        profiler.checkpoint("schema");
        let names: Vec<String> = profiler.checkpoints().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["config", "schema"]);

        profiler.start("pending");
        profiler.reset();
        assert!(profiler.checkpoints().is_empty());
        assert!(!profiler.is_running("pending"));
    }

    #[tokio::test]
    async fn measure_times_the_future() {
        let profiler = PerformanceProfiler::new();
        let (value, sample) = profiler
            .measure("sleep", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                7
            })
            .await;
        assert_eq!(value, 7);
        assert!(sample.duration_ms >= 20.0);
    }
}
