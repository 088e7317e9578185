//! Call metrics.
//!
//! Counters shared by every dispatch path. Updates are lock-free except for
//! the per-code failure breakdown.

use armature_core::ErrorCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Shared call counters
#[derive(Debug, Default)]
pub struct CallMetrics {
    calls_started: AtomicU64,
    calls_succeeded: AtomicU64,
    calls_failed: AtomicU64,
    total_duration_us: AtomicU64,
    failures_by_code: Mutex<BTreeMap<ErrorCode, u64>>,
}

impl CallMetrics {
    /// Create zeroed metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call start
    pub fn record_start(&self) {
        self.calls_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful call
    pub fn record_success(&self, duration: Duration) {
        self.calls_succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_duration(duration);
    }

    /// Record a failed call
    pub fn record_failure(&self, code: ErrorCode, duration: Duration) {
        self.calls_failed.fetch_add(1, Ordering::Relaxed);
        self.add_duration(duration);
        *self
            .failures_by_code
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(code)
            .or_insert(0) += 1;
    }

    fn add_duration(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_duration_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Point-in-time copy
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let started = self.calls_started.load(Ordering::Relaxed);
        let succeeded = self.calls_succeeded.load(Ordering::Relaxed);
        let failed = self.calls_failed.load(Ordering::Relaxed);
        let finished = succeeded + failed;
        let total_us = self.total_duration_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            calls_started: started,
            calls_succeeded: succeeded,
            calls_failed: failed,
            in_flight: started.saturating_sub(finished),
            success_rate: if finished == 0 {
                1.0
            } else {
                succeeded as f64 / finished as f64
            },
            average_duration_ms: if finished == 0 {
                0.0
            } else {
                total_us as f64 / finished as f64 / 1000.0
            },
            failures_by_code: self
                .failures_by_code
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(code, count)| (code.as_str().to_string(), *count))
                .collect(),
        }
    }
}

/// Serializable metrics view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Calls dispatched
    pub calls_started: u64,
    /// Calls that succeeded
    pub calls_succeeded: u64,
    /// Calls that failed
    pub calls_failed: u64,
    /// Started but not finished
    pub in_flight: u64,
    /// Succeeded / finished (1.0 when nothing finished)
    pub success_rate: f64,
    /// Mean call duration
    pub average_duration_ms: f64,
    /// Failure count per error code
    pub failures_by_code: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let snapshot = CallMetrics::new().snapshot();
        assert_eq!(snapshot.calls_started, 0);
        assert_eq!(snapshot.success_rate, 1.0);
        assert_eq!(snapshot.average_duration_ms, 0.0);
    }

    #[test]
    fn test_metrics_rates() {
        let metrics = CallMetrics::new();
        for _ in 0..4 {
            metrics.record_start();
        }
        metrics.record_success(Duration::from_millis(10));
        metrics.record_success(Duration::from_millis(10));
        metrics.record_failure(ErrorCode::BadInputValue, Duration::from_millis(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.in_flight, 1);
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((snapshot.average_duration_ms - 10.0).abs() < 1e-9);
        assert_eq!(snapshot.failures_by_code["BAD_INPUT_VALUE"], 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = CallMetrics::new();
        metrics.record_start();
        metrics.record_failure(ErrorCode::Fatal, Duration::from_millis(1));
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["failures_by_code"]["FATAL"], 1);
    }
}
