// Core Types
// Snapshot, component and classification types shared by every analysis stage.
// A MetricsSnapshot is immutable once built; analyses only ever borrow it.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric names produced by the upstream traffic generator
pub mod metric {
    pub const API_RESPONSE_TIME_P95: &str = "api_response_time_p95";
    pub const API_ERROR_RATE: &str = "api_error_rate";
    pub const API_THROUGHPUT_RPS: &str = "api_throughput_rps";
    pub const API_CPU_USAGE: &str = "api_cpu_usage";
    pub const API_MEMORY_USAGE_MB: &str = "api_memory_usage_mb";

    pub const DB_QUERY_TIME_P95: &str = "db_query_time_p95";
    pub const DB_CONNECTION_ACQUIRE_TIME: &str = "db_connection_acquire_time";
    pub const DB_RLS_POLICY_OVERHEAD: &str = "db_rls_policy_overhead";
    pub const DB_ACTIVE_CONNECTIONS: &str = "db_active_connections";

    pub const EMAIL_PROCESSING_TIME_P95: &str = "email_processing_time_p95";
    pub const EMAIL_SEND_SUCCESS_RATE: &str = "email_send_success_rate";
    pub const EMAIL_RATE_LIMIT_HITS: &str = "email_rate_limit_hits";
    pub const EMAIL_THROUGHPUT_PER_MINUTE: &str = "email_throughput_per_minute";
    pub const EMAIL_QUEUE_DEPTH: &str = "email_queue_depth";

    pub const BILLING_WEBHOOK_TIME_P95: &str = "billing_webhook_time_p95";
    pub const BILLING_USAGE_TRACKING_LATENCY: &str = "billing_usage_tracking_latency";
    pub const BILLING_WEBHOOKS_PER_MINUTE: &str = "billing_webhooks_per_minute";
    pub const PAYMENT_SUCCESS_RATE: &str = "payment_success_rate";

    pub const GDPR_EXPORT_DURATION: &str = "gdpr_export_duration";
    pub const GDPR_CONSENT_CHECK_TIME: &str = "gdpr_consent_check_time";
    pub const GDPR_RESPONSE_TIME_P95: &str = "gdpr_response_time_p95";
    pub const GDPR_CONCURRENT_EXPORTS: &str = "gdpr_concurrent_exports";
}

/// Logical service components with their own capacity model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    ApiServer,
    Database,
    EmailService,
    BillingService,
    GdprService,
}

impl Component {
    /// All components in report order
    pub const ALL: [Component; 5] = [
        Component::ApiServer,
        Component::Database,
        Component::EmailService,
        Component::BillingService,
        Component::GdprService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::ApiServer => "api_server",
            Component::Database => "database",
            Component::EmailService => "email_service",
            Component::BillingService => "billing_service",
            Component::GdprService => "gdpr_service",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown component '{s}'"))
    }
}

/// Which way a metric should move to count as an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// Shape of a metric, selects the scoring formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Latency or duration in milliseconds
    Duration,
    /// Requests or items per unit of time
    Throughput,
    /// Fraction of successful operations in [0, 1]
    SuccessRate,
    /// Fraction of failed operations in [0, 1]
    ErrorRate,
}

impl MetricKind {
    /// The direction implied by this kind of metric
    pub fn natural_direction(&self) -> Direction {
        match self {
            MetricKind::Duration | MetricKind::ErrorRate => Direction::LowerIsBetter,
            MetricKind::Throughput | MetricKind::SuccessRate => Direction::HigherIsBetter,
        }
    }
}

/// Bottleneck severity. Variant order is the canonical report order (critical first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        })
    }
}

/// Regression severity tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionSeverity {
    Critical,
    Warning,
}

impl fmt::Display for RegressionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegressionSeverity::Critical => "critical",
            RegressionSeverity::Warning => "warning",
        })
    }
}

/// Recommendation priority. Variant order is the canonical report order (critical first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        })
    }
}

/// One performance-test run's measurements
///
/// # Invariants
/// - Every metric value is finite
/// - Never mutated after construction (fields are private, no `&mut` accessors)
/// - Serializes to the same flat object `from_json_str` accepts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    test_type: String,
    duration_ms: f64,
    virtual_users: f64,
    #[serde(rename = "timestamp")]
    captured_at: DateTime<Utc>,
    #[serde(flatten)]
    metrics: IndexMap<String, f64>,
}

impl MetricsSnapshot {
    /// Construct from already-validated parts. Use `MetricsSnapshotBuilder` or
    /// `MetricsSnapshot::from_json_str` for checked construction.
    pub(crate) fn from_parts(
        test_type: String,
        duration_ms: f64,
        virtual_users: f64,
        captured_at: DateTime<Utc>,
        metrics: IndexMap<String, f64>,
    ) -> Self {
        Self {
            test_type,
            duration_ms,
            virtual_users,
            captured_at,
            metrics,
        }
    }

    pub fn test_type(&self) -> &str {
        &self.test_type
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn virtual_users(&self) -> f64 {
        self.virtual_users
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Look up a metric; `None` means "not measured in this run"
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn metrics(&self) -> &IndexMap<String, f64> {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_round_trips_through_str() {
        for component in Component::ALL {
            let parsed: Component = component.as_str().parse().unwrap();
            assert_eq!(parsed, component);
        }
        assert!("cache".parse::<Component>().is_err());
    }

    #[test]
    fn test_severity_orders_critical_first() {
        let mut severities = vec![Severity::Low, Severity::Critical, Severity::Medium, Severity::High];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        );
    }

    #[test]
    fn test_priority_urgency() {
        assert!(Priority::Critical.is_urgent());
        assert!(Priority::High.is_urgent());
        assert!(!Priority::Medium.is_urgent());
        assert!(!Priority::Low.is_urgent());
    }

    #[test]
    fn test_metric_kind_directions() {
        assert_eq!(MetricKind::Duration.natural_direction(), Direction::LowerIsBetter);
        assert_eq!(MetricKind::ErrorRate.natural_direction(), Direction::LowerIsBetter);
        assert_eq!(MetricKind::Throughput.natural_direction(), Direction::HigherIsBetter);
        assert_eq!(MetricKind::SuccessRate.natural_direction(), Direction::HigherIsBetter);
    }

    #[test]
    fn test_component_serializes_snake_case() {
        let json = serde_json::to_string(&Component::EmailService).unwrap();
        assert_eq!(json, "\"email_service\"");
    }
}
