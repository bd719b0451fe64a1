// Regression Detection
// Compares a snapshot against the baseline registry and classifies degradations.
// Pure: the same snapshot and registry always yield the same outcome.

use crate::baseline::{BaselineEntry, BaselineRegistry};
use crate::config::RegressionConfig;
use crate::observability::AnalysisEvent;
use crate::types::{Direction, MetricKind, MetricsSnapshot, RegressionSeverity};
use crate::validation::{SkipReason, SkippedMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A metric that degraded beyond the configured threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub metric: String,
    pub baseline: f64,
    pub current: f64,
    pub degradation_pct: f64,
    pub severity: RegressionSeverity,
    pub timestamp: DateTime<Utc>,
}

/// Everything one detection pass produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegressionOutcome {
    pub regressions: Vec<Regression>,
    pub skipped: Vec<SkippedMetric>,
    pub events: Vec<AnalysisEvent>,
}

/// Fractional degradation of `current` relative to `entry`, or `None` when the
/// entry cannot be evaluated or the change is not a degradation candidate.
pub fn degradation(entry: &BaselineEntry, current: f64) -> Option<f64> {
    if !entry.is_evaluable() {
        return None;
    }
    let target = entry.target_value;
    match (entry.kind, entry.direction) {
        // an already-clean error rate is never a regression
        (MetricKind::ErrorRate, _) if current <= target => None,
        (_, Direction::LowerIsBetter) => Some((current - target) / target),
        (_, Direction::HigherIsBetter) if current >= target => None,
        (_, Direction::HigherIsBetter) => Some((target - current) / target),
    }
}

/// Detect regressions for every baseline present in the snapshot
pub fn detect_regressions(
    snapshot: &MetricsSnapshot,
    baselines: &BaselineRegistry,
    config: &RegressionConfig,
) -> RegressionOutcome {
    let critical_threshold = config.critical_threshold();
    let mut outcome = RegressionOutcome::default();

    for entry in baselines.iter() {
        let Some(current) = snapshot.get(&entry.metric_name) else {
            outcome.skipped.push(SkippedMetric::new(
                entry.metric_name.clone(),
                SkipReason::MissingMetric,
            ));
            continue;
        };

        if !entry.is_evaluable() {
            outcome.skipped.push(SkippedMetric::new(
                entry.metric_name.clone(),
                SkipReason::InvalidBaseline,
            ));
            continue;
        }

        let Some(degradation) = degradation(entry, current) else {
            continue;
        };
        if degradation <= config.threshold {
            continue;
        }

        let severity = if degradation > critical_threshold {
            RegressionSeverity::Critical
        } else {
            RegressionSeverity::Warning
        };
        let degradation_pct = degradation * 100.0;

        outcome.events.push(AnalysisEvent::RegressionDetected {
            metric: entry.metric_name.clone(),
            severity,
            degradation_pct,
        });
        outcome.regressions.push(Regression {
            metric: entry.metric_name.clone(),
            baseline: entry.target_value,
            current,
            degradation_pct,
            severity,
            timestamp: snapshot.captured_at(),
        });
    }

    outcome.events.extend(
        outcome
            .skipped
            .iter()
            .map(|skipped| AnalysisEvent::MetricSkipped {
                metric: skipped.metric.clone(),
                reason: skipped.reason,
            }),
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::MetricsSnapshotBuilder;
    use crate::types::metric;

    fn registry() -> BaselineRegistry {
        BaselineRegistry::new()
            .with(BaselineEntry::duration(metric::DB_QUERY_TIME_P95, 100.0))
            .unwrap()
            .with(BaselineEntry::error_rate(metric::API_ERROR_RATE, 0.01))
            .unwrap()
            .with(BaselineEntry::success_rate(metric::PAYMENT_SUCCESS_RATE, 0.99))
            .unwrap()
    }

    fn detect(metrics: &[(&str, f64)]) -> RegressionOutcome {
        let snapshot = MetricsSnapshotBuilder::new()
            .metrics(metrics.iter().copied())
            .build()
            .unwrap();
        detect_regressions(&snapshot, &registry(), &RegressionConfig::default())
    }

    #[test]
    fn test_latency_warning_and_critical_tiers() {
        let outcome = detect(&[(metric::DB_QUERY_TIME_P95, 130.0)]);
        assert_eq!(outcome.regressions.len(), 1);
        assert_eq!(outcome.regressions[0].severity, RegressionSeverity::Warning);
        assert!((outcome.regressions[0].degradation_pct - 30.0).abs() < 1e-9);

        let outcome = detect(&[(metric::DB_QUERY_TIME_P95, 160.0)]);
        assert_eq!(outcome.regressions[0].severity, RegressionSeverity::Critical);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let outcome = detect(&[(metric::DB_QUERY_TIME_P95, 120.0)]);
        assert!(outcome.regressions.is_empty());
    }

    #[test]
    fn test_error_rate_below_target_is_not_regression() {
        let outcome = detect(&[(metric::API_ERROR_RATE, 0.0)]);
        assert!(outcome.regressions.is_empty());

        let outcome = detect(&[(metric::API_ERROR_RATE, 0.02)]);
        assert_eq!(outcome.regressions.len(), 1);
        assert_eq!(outcome.regressions[0].severity, RegressionSeverity::Critical);
    }

    #[test]
    fn test_higher_is_better_above_target_is_ignored() {
        let outcome = detect(&[(metric::PAYMENT_SUCCESS_RATE, 1.0)]);
        assert!(outcome.regressions.is_empty());

        let outcome = detect(&[(metric::PAYMENT_SUCCESS_RATE, 0.70)]);
        assert_eq!(outcome.regressions.len(), 1);
        assert_eq!(outcome.regressions[0].severity, RegressionSeverity::Warning);
    }

    #[test]
    fn test_higher_is_better_shares_critical_cutoff() {
        // 0.50 against 0.99 is a 49.5% drop, just inside the warning tier
        let outcome = detect(&[(metric::PAYMENT_SUCCESS_RATE, 0.50)]);
        assert_eq!(outcome.regressions[0].severity, RegressionSeverity::Warning);

        // 0.45 is a 54.5% drop, past the same 50% cutoff latency metrics use
        let outcome = detect(&[(metric::PAYMENT_SUCCESS_RATE, 0.45)]);
        let regression = &outcome.regressions[0];
        assert_eq!(regression.severity, RegressionSeverity::Critical);
        assert!((regression.degradation_pct - 54.5454545).abs() < 1e-6);
    }

    #[test]
    fn test_missing_metrics_are_skipped_not_flagged() {
        let outcome = detect(&[]);
        assert!(outcome.regressions.is_empty());
        assert_eq!(outcome.skipped.len(), 3);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::MissingMetric));
    }

    #[test]
    fn test_zero_baseline_is_skipped() {
        let baselines = BaselineRegistry::new()
            .with(BaselineEntry::duration("queue_wait_time", 0.0))
            .unwrap();
        let snapshot = MetricsSnapshotBuilder::new()
            .metric("queue_wait_time", 500.0)
            .build()
            .unwrap();
        let outcome = detect_regressions(&snapshot, &baselines, &RegressionConfig::default());
        assert!(outcome.regressions.is_empty());
        assert_eq!(outcome.skipped[0].reason, SkipReason::InvalidBaseline);
    }

    #[test]
    fn test_events_mirror_regressions() {
        let outcome = detect(&[(metric::DB_QUERY_TIME_P95, 200.0)]);
        let regression_events = outcome
            .events
            .iter()
            .filter(|e| matches!(e, AnalysisEvent::RegressionDetected { .. }))
            .count();
        assert_eq!(regression_events, outcome.regressions.len());
    }
}
