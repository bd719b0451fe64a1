// Baseline Registry
// Expected values for named metrics. Direction is stored explicitly on every entry
// at registration time instead of being guessed from the metric name.

use crate::types::{metric, Direction, MetricKind};
use crate::validation::AnalysisError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Expected value and comparison direction for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub metric_name: String,
    pub target_value: f64,
    pub direction: Direction,
    pub kind: MetricKind,
}

impl BaselineEntry {
    /// Create an entry whose direction follows from its kind
    pub fn new(metric_name: impl Into<String>, target_value: f64, kind: MetricKind) -> Self {
        Self {
            metric_name: metric_name.into(),
            target_value,
            direction: kind.natural_direction(),
            kind,
        }
    }

    pub fn duration(metric_name: impl Into<String>, target_ms: f64) -> Self {
        Self::new(metric_name, target_ms, MetricKind::Duration)
    }

    pub fn throughput(metric_name: impl Into<String>, target: f64) -> Self {
        Self::new(metric_name, target, MetricKind::Throughput)
    }

    pub fn success_rate(metric_name: impl Into<String>, target: f64) -> Self {
        Self::new(metric_name, target, MetricKind::SuccessRate)
    }

    pub fn error_rate(metric_name: impl Into<String>, target: f64) -> Self {
        Self::new(metric_name, target, MetricKind::ErrorRate)
    }

    /// A target of zero or below cannot be used as a ratio denominator
    pub fn is_evaluable(&self) -> bool {
        self.target_value > 0.0
    }

    fn check(&self) -> Result<(), AnalysisError> {
        if self.metric_name.is_empty() {
            return Err(AnalysisError::InvalidBaseline {
                metric: "<empty>".to_string(),
                reason: "metric name cannot be empty".to_string(),
            });
        }
        if !self.target_value.is_finite() {
            return Err(AnalysisError::InvalidBaseline {
                metric: self.metric_name.clone(),
                reason: format!("target {} is not finite", self.target_value),
            });
        }
        if self.direction != self.kind.natural_direction() {
            return Err(AnalysisError::InvalidBaseline {
                metric: self.metric_name.clone(),
                reason: format!(
                    "direction {:?} contradicts metric kind {:?}",
                    self.direction, self.kind
                ),
            });
        }
        Ok(())
    }
}

/// Fixed table of baselines keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineRegistry {
    entries: IndexMap<String, BaselineEntry>,
}

impl BaselineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an entry
    pub fn register(&mut self, entry: BaselineEntry) -> Result<(), AnalysisError> {
        entry.check()?;
        self.entries.insert(entry.metric_name.clone(), entry);
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, entry: BaselineEntry) -> Result<Self, AnalysisError> {
        self.register(entry)?;
        Ok(self)
    }

    /// Change the target of an existing entry
    pub fn set_target(&mut self, metric_name: &str, target: f64) -> Result<(), AnalysisError> {
        let entry = self
            .entries
            .get_mut(metric_name)
            .ok_or_else(|| AnalysisError::InvalidBaseline {
                metric: metric_name.to_string(),
                reason: "no baseline registered; a kind is required for new metrics".to_string(),
            })?;
        if !target.is_finite() {
            return Err(AnalysisError::InvalidBaseline {
                metric: metric_name.to_string(),
                reason: format!("target {target} is not finite"),
            });
        }
        entry.target_value = target;
        Ok(())
    }

    pub fn get(&self, metric_name: &str) -> Option<&BaselineEntry> {
        self.entries.get(metric_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BaselineEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reference baselines for the service under test
    pub fn with_defaults() -> Self {
        let defaults = [
            BaselineEntry::duration(metric::API_RESPONSE_TIME_P95, 500.0),
            BaselineEntry::error_rate(metric::API_ERROR_RATE, 0.01),
            BaselineEntry::throughput(metric::API_THROUGHPUT_RPS, 100.0),
            BaselineEntry::duration(metric::DB_QUERY_TIME_P95, 100.0),
            BaselineEntry::duration(metric::DB_CONNECTION_ACQUIRE_TIME, 50.0),
            BaselineEntry::duration(metric::EMAIL_PROCESSING_TIME_P95, 2000.0),
            BaselineEntry::success_rate(metric::EMAIL_SEND_SUCCESS_RATE, 0.98),
            BaselineEntry::duration(metric::BILLING_WEBHOOK_TIME_P95, 1000.0),
            BaselineEntry::success_rate(metric::PAYMENT_SUCCESS_RATE, 0.99),
            BaselineEntry::duration(metric::GDPR_EXPORT_DURATION, 120_000.0),
            BaselineEntry::duration(metric::GDPR_RESPONSE_TIME_P95, 1000.0),
            BaselineEntry::duration(metric::GDPR_CONSENT_CHECK_TIME, 100.0),
        ];

        let entries = defaults
            .into_iter()
            .map(|entry| (entry.metric_name.clone(), entry))
            .collect();
        Self { entries }
    }
}
