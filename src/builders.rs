// Builder Patterns
// Fluent construction of metrics snapshots for callers that already hold typed values
// (tests, benches, embedding harnesses) rather than a JSON document.

use crate::types::MetricsSnapshot;
use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Fluent builder for creating MetricsSnapshots
#[derive(Debug, Clone)]
pub struct MetricsSnapshotBuilder {
    test_type: String,
    duration_ms: f64,
    virtual_users: f64,
    captured_at: Option<DateTime<Utc>>,
    metrics: IndexMap<String, f64>,
}

impl MetricsSnapshotBuilder {
    /// Create a new snapshot builder
    pub fn new() -> Self {
        Self {
            test_type: "unspecified".to_string(),
            duration_ms: 0.0,
            virtual_users: 0.0,
            captured_at: None,
            metrics: IndexMap::new(),
        }
    }

    /// Set the kind of test that produced the snapshot (load, stress, soak...)
    pub fn test_type(mut self, test_type: impl Into<String>) -> Self {
        self.test_type = test_type.into();
        self
    }

    /// Set the test duration
    pub fn duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the number of concurrent virtual users
    pub fn virtual_users(mut self, users: f64) -> Self {
        self.virtual_users = users;
        self
    }

    /// Set the capture time. Defaults to now.
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Add or replace a metric
    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Add several metrics at once
    pub fn metrics<I, K>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        for (name, value) in metrics {
            self.metrics.insert(name.into(), value);
        }
        self
    }

    /// Build the snapshot
    pub fn build(self) -> Result<MetricsSnapshot> {
        ensure!(
            self.duration_ms.is_finite() && self.duration_ms >= 0.0,
            "Snapshot duration must be a non-negative number"
        );
        ensure!(
            self.virtual_users.is_finite() && self.virtual_users >= 0.0,
            "Virtual user count must be a non-negative number"
        );
        for (name, value) in &self.metrics {
            ensure!(!name.is_empty(), "Metric name cannot be empty");
            ensure!(value.is_finite(), "Metric {} must be finite, got {}", name, value);
        }

        Ok(MetricsSnapshot::from_parts(
            self.test_type,
            self.duration_ms,
            self.virtual_users,
            self.captured_at.unwrap_or_else(Utc::now),
            self.metrics,
        ))
    }
}

impl Default for MetricsSnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_metrics() {
        let snapshot = MetricsSnapshotBuilder::new()
            .test_type("stress")
            .virtual_users(200.0)
            .duration_ms(120_000.0)
            .metric("api_response_time_p95", 850.0)
            .metrics([("api_error_rate", 0.01), ("api_throughput_rps", 90.0)])
            .build()
            .unwrap();

        assert_eq!(snapshot.test_type(), "stress");
        assert_eq!(snapshot.virtual_users(), 200.0);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("api_error_rate"), Some(0.01));
    }

    #[test]
    fn test_builder_rejects_non_finite_metric() {
        let result = MetricsSnapshotBuilder::new()
            .metric("api_response_time_p95", f64::NAN)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_negative_users() {
        assert!(MetricsSnapshotBuilder::new().virtual_users(-1.0).build().is_err());
    }
}
