// Capacity and Bottleneck Analysis
// One generic evaluator driven by per-component rule tables. Each rule reads a
// metric or a derived utilization, compares it to a fixed or capacity-derived
// limit and, when it fires, deducts a fixed number of points and records a Bottleneck.

use crate::capacity::{limit, CapacityModel, CapacityRegistry};
use crate::observability::AnalysisEvent;
use crate::pure::scoring::clamp_score;
use crate::types::{metric, Component, MetricsSnapshot, Severity};
use crate::validation::{AnalysisError, SkipReason, SkippedMetric};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a demand value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Demand {
    Metric(String),
    VirtualUsers,
}

impl Demand {
    fn read(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        match self {
            Demand::Metric(name) => snapshot.get(name),
            Demand::VirtualUsers => Some(snapshot.virtual_users()),
        }
    }

    fn label(&self) -> &str {
        match self {
            Demand::Metric(name) => name,
            Demand::VirtualUsers => "virtual_users",
        }
    }
}

/// A utilization dimension: demand divided by a (scaled) capacity ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRule {
    pub dimension: String,
    pub demand: Demand,
    pub capacity_key: String,
    pub scale: f64,
}

impl UtilizationRule {
    pub fn new(dimension: &str, demand: Demand, capacity_key: &str) -> Self {
        Self {
            dimension: dimension.to_string(),
            demand,
            capacity_key: capacity_key.to_string(),
            scale: 1.0,
        }
    }

    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// Value a check inspects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Metric(String),
    /// A dimension computed by one of the component's utilization rules
    Utilization(String),
}

/// Limit a check compares against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Fixed(f64),
    Capacity { key: String, scale: f64 },
}

impl Limit {
    pub fn capacity(key: &str) -> Self {
        Limit::Capacity {
            key: key.to_string(),
            scale: 1.0,
        }
    }

    fn resolve(&self, model: Option<&CapacityModel>) -> Option<f64> {
        match self {
            Limit::Fixed(value) => Some(*value),
            Limit::Capacity { key, scale } => model.and_then(|m| m.ceiling(key)).map(|c| c * scale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
}

impl Comparison {
    fn fires(&self, value: f64, limit: f64) -> bool {
        match self {
            Comparison::Above => value > limit,
            Comparison::Below => value < limit,
        }
    }
}

/// One threshold check from a component's rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckRule {
    pub bottleneck_type: String,
    pub label: String,
    pub measure: Measure,
    pub comparison: Comparison,
    pub limit: Limit,
    pub deduction: f64,
    pub severity: Severity,
    pub unit: String,
}

impl BottleneckRule {
    pub fn above(bottleneck_type: &str, label: &str, measure: Measure, limit: Limit) -> Self {
        Self {
            bottleneck_type: bottleneck_type.to_string(),
            label: label.to_string(),
            measure,
            comparison: Comparison::Above,
            limit,
            deduction: 0.0,
            severity: Severity::Medium,
            unit: String::new(),
        }
    }

    pub fn below(bottleneck_type: &str, label: &str, measure: Measure, limit: Limit) -> Self {
        Self {
            comparison: Comparison::Below,
            ..Self::above(bottleneck_type, label, measure, limit)
        }
    }

    pub fn deducts(mut self, points: f64, severity: Severity) -> Self {
        self.deduction = points;
        self.severity = severity;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }
}

/// Declarative rule set for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRules {
    pub component: Component,
    pub utilizations: Vec<UtilizationRule>,
    pub checks: Vec<BottleneckRule>,
}

/// A capacity dimension that crossed its safe threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub component: Component,
    #[serde(rename = "type")]
    pub bottleneck_type: String,
    pub severity: Severity,
    /// Raw measurement, or a ratio for utilization checks
    #[serde(rename = "value_or_utilization")]
    pub value: f64,
    pub limit: f64,
    pub deduction: f64,
    pub message: String,
}

/// Raw utilization ratios and measured values for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityAnalysis {
    pub component: Component,
    pub utilization: IndexMap<String, f64>,
    pub measurements: IndexMap<String, f64>,
}

impl CapacityAnalysis {
    pub fn utilization_of(&self, dimension: &str) -> Option<f64> {
        self.utilization.get(dimension).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub component: Component,
    pub score: f64,
}

/// Output of evaluating one component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentEvaluation {
    pub component: Component,
    /// `None` when no check had enough data to run
    pub score: Option<f64>,
    pub bottlenecks: Vec<Bottleneck>,
    pub capacity_analysis: CapacityAnalysis,
    pub skipped: Vec<SkippedMetric>,
    pub events: Vec<AnalysisEvent>,
}

/// Compute every utilization dimension the rules describe
pub fn compute_utilization(
    snapshot: &MetricsSnapshot,
    model: Option<&CapacityModel>,
    rules: &[UtilizationRule],
) -> IndexMap<String, f64> {
    rules
        .iter()
        .filter_map(|rule| {
            let demand = rule.demand.read(snapshot)?;
            let ceiling = model?.ceiling(&rule.capacity_key)? * rule.scale;
            (ceiling > 0.0).then(|| (rule.dimension.clone(), demand / ceiling))
        })
        .collect()
}

/// Evaluate one component against its rule table
pub fn evaluate_component(
    snapshot: &MetricsSnapshot,
    model: Option<&CapacityModel>,
    rules: &ComponentRules,
) -> ComponentEvaluation {
    let component = rules.component;
    let utilization = compute_utilization(snapshot, model, &rules.utilizations);
    let mut measurements = IndexMap::new();
    let mut bottlenecks = Vec::new();
    let mut skipped = Vec::new();
    let mut evaluated = 0usize;
    let mut score = 100.0;

    for check in &rules.checks {
        let value = match &check.measure {
            Measure::Metric(name) => match snapshot.get(name) {
                Some(value) => value,
                None => {
                    skipped.push(SkippedMetric::for_component(
                        component,
                        name.clone(),
                        SkipReason::MissingMetric,
                    ));
                    continue;
                }
            },
            Measure::Utilization(dimension) => match utilization.get(dimension) {
                Some(value) => *value,
                None => {
                    skipped.push(missing_dimension(snapshot, model, rules, dimension));
                    continue;
                }
            },
        };

        let Some(limit) = check.limit.resolve(model) else {
            let key = match &check.limit {
                Limit::Capacity { key, .. } => key.clone(),
                Limit::Fixed(_) => check.bottleneck_type.clone(),
            };
            skipped.push(SkippedMetric::for_component(
                component,
                key,
                SkipReason::InvalidCapacity,
            ));
            continue;
        };

        evaluated += 1;
        let measured_name = match &check.measure {
            Measure::Metric(name) | Measure::Utilization(name) => name.clone(),
        };
        measurements.insert(measured_name, value);

        if check.comparison.fires(value, limit) {
            score -= check.deduction;
            bottlenecks.push(Bottleneck {
                component,
                bottleneck_type: check.bottleneck_type.clone(),
                severity: check.severity,
                value,
                limit,
                deduction: check.deduction,
                message: describe(check, value, limit),
            });
        }
    }

    let events = bottlenecks
        .iter()
        .map(|b| AnalysisEvent::BottleneckDetected {
            component,
            bottleneck_type: b.bottleneck_type.clone(),
            severity: b.severity,
        })
        .chain(skipped.iter().map(|s| AnalysisEvent::MetricSkipped {
            metric: s.metric.clone(),
            reason: s.reason,
        }))
        .collect();

    ComponentEvaluation {
        component,
        score: (evaluated > 0).then(|| clamp_score(score)),
        bottlenecks,
        capacity_analysis: CapacityAnalysis {
            component,
            utilization,
            measurements,
        },
        skipped,
        events,
    }
}

/// Evaluate every rule set against the registry
pub fn analyze_capacity(
    snapshot: &MetricsSnapshot,
    registry: &CapacityRegistry,
    rule_sets: &[ComponentRules],
) -> Vec<ComponentEvaluation> {
    rule_sets
        .iter()
        .map(|rules| evaluate_component(snapshot, registry.get(rules.component), rules))
        .collect()
}

/// Stable sort, critical first
pub fn sort_bottlenecks(bottlenecks: &mut [Bottleneck]) {
    bottlenecks.sort_by_key(|b| b.severity);
}

/// Replace rule deductions from "<component>.<bottleneck_type>" keyed overrides
pub fn apply_deduction_overrides(
    rule_sets: &mut [ComponentRules],
    overrides: &IndexMap<String, f64>,
) -> Result<(), AnalysisError> {
    for (key, deduction) in overrides {
        let (component_name, bottleneck_type) = key.split_once('.').ok_or_else(|| {
            AnalysisError::invalid_config(format!("deductions.{key}"), "missing '.' separator")
        })?;
        let component: Component = component_name
            .parse()
            .map_err(|reason| AnalysisError::invalid_config(format!("deductions.{key}"), reason))?;

        let rule = rule_sets
            .iter_mut()
            .filter(|rules| rules.component == component)
            .flat_map(|rules| rules.checks.iter_mut())
            .find(|check| check.bottleneck_type == bottleneck_type)
            .ok_or_else(|| {
                AnalysisError::invalid_config(
                    format!("deductions.{key}"),
                    "no such bottleneck rule",
                )
            })?;
        rule.deduction = *deduction;
    }
    Ok(())
}

fn missing_dimension(
    snapshot: &MetricsSnapshot,
    model: Option<&CapacityModel>,
    rules: &ComponentRules,
    dimension: &str,
) -> SkippedMetric {
    let component = rules.component;
    match rules.utilizations.iter().find(|u| u.dimension == dimension) {
        Some(rule) if rule.demand.read(snapshot).is_none() => SkippedMetric::for_component(
            component,
            rule.demand.label(),
            SkipReason::MissingMetric,
        ),
        Some(rule) if model.and_then(|m| m.ceiling(&rule.capacity_key)).is_none() => {
            SkippedMetric::for_component(
                component,
                rule.capacity_key.clone(),
                SkipReason::InvalidCapacity,
            )
        }
        _ => SkippedMetric::for_component(component, dimension, SkipReason::MissingMetric),
    }
}

fn describe(check: &BottleneckRule, value: f64, limit: f64) -> String {
    let relation = match check.comparison {
        Comparison::Above => "above",
        Comparison::Below => "below",
    };
    format!(
        "{} is {}{} ({} limit {}{})",
        check.label,
        format_value(value),
        check.unit,
        relation,
        format_value(limit),
        check.unit
    )
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// Reference rule tables for the five components
pub fn default_rule_sets() -> Vec<ComponentRules> {
    let m = |name: &str| Measure::Metric(name.to_string());
    let u = |dimension: &str| Measure::Utilization(dimension.to_string());
    let demand = |name: &str| Demand::Metric(name.to_string());

    vec![
        ComponentRules {
            component: Component::ApiServer,
            utilizations: vec![
                UtilizationRule::new(
                    "throughput_utilization",
                    demand(metric::API_THROUGHPUT_RPS),
                    limit::MAX_RPS,
                ),
                UtilizationRule::new(
                    "user_utilization",
                    Demand::VirtualUsers,
                    limit::MAX_CONCURRENT_USERS,
                ),
                UtilizationRule::new(
                    "response_time_utilization",
                    demand(metric::API_RESPONSE_TIME_P95),
                    limit::MAX_RESPONSE_TIME_MS,
                ),
                UtilizationRule::new(
                    "cpu_utilization",
                    demand(metric::API_CPU_USAGE),
                    limit::MAX_CPU_PERCENT,
                ),
                UtilizationRule::new(
                    "memory_utilization",
                    demand(metric::API_MEMORY_USAGE_MB),
                    limit::MAX_MEMORY_MB,
                ),
            ],
            checks: vec![
                BottleneckRule::above(
                    "throughput_saturation",
                    "API throughput utilization",
                    u("throughput_utilization"),
                    Limit::Fixed(0.8),
                )
                .deducts(30.0, Severity::High),
                BottleneckRule::above(
                    "slow_responses",
                    "API p95 response time",
                    m(metric::API_RESPONSE_TIME_P95),
                    Limit::Fixed(3000.0),
                )
                .deducts(25.0, Severity::Medium)
                .unit("ms"),
                BottleneckRule::above(
                    "high_error_rate",
                    "API error rate",
                    m(metric::API_ERROR_RATE),
                    Limit::Fixed(0.05),
                )
                .deducts(35.0, Severity::Critical),
                BottleneckRule::above(
                    "cpu_saturation",
                    "API CPU usage",
                    m(metric::API_CPU_USAGE),
                    Limit::capacity(limit::MAX_CPU_PERCENT),
                )
                .deducts(20.0, Severity::High)
                .unit("%"),
            ],
        },
        ComponentRules {
            component: Component::Database,
            utilizations: vec![
                UtilizationRule::new(
                    "connection_utilization",
                    demand(metric::DB_ACTIVE_CONNECTIONS),
                    limit::MAX_CONNECTIONS,
                ),
                UtilizationRule::new(
                    "query_time_utilization",
                    demand(metric::DB_QUERY_TIME_P95),
                    limit::MAX_QUERY_TIME_MS,
                ),
            ],
            checks: vec![
                BottleneckRule::above(
                    "slow_queries",
                    "Database p95 query time",
                    m(metric::DB_QUERY_TIME_P95),
                    Limit::capacity(limit::MAX_QUERY_TIME_MS),
                )
                .deducts(30.0, Severity::High)
                .unit("ms"),
                BottleneckRule::above(
                    "connection_pool_contention",
                    "Database connection acquire time",
                    m(metric::DB_CONNECTION_ACQUIRE_TIME),
                    Limit::Fixed(1000.0),
                )
                .deducts(25.0, Severity::Medium)
                .unit("ms"),
                BottleneckRule::above(
                    "rls_policy_overhead",
                    "Row-level security policy overhead",
                    m(metric::DB_RLS_POLICY_OVERHEAD),
                    Limit::Fixed(100.0),
                )
                .deducts(15.0, Severity::Medium)
                .unit("ms"),
            ],
        },
        ComponentRules {
            component: Component::EmailService,
            utilizations: vec![
                UtilizationRule::new(
                    "throughput_utilization",
                    demand(metric::EMAIL_THROUGHPUT_PER_MINUTE),
                    limit::MAX_EMAILS_PER_MINUTE,
                ),
                UtilizationRule::new(
                    "queue_utilization",
                    demand(metric::EMAIL_QUEUE_DEPTH),
                    limit::MAX_QUEUE_DEPTH,
                ),
                UtilizationRule::new(
                    "processing_time_utilization",
                    demand(metric::EMAIL_PROCESSING_TIME_P95),
                    limit::MAX_PROCESSING_TIME_MS,
                ),
            ],
            checks: vec![
                BottleneckRule::above(
                    "slow_processing",
                    "Email p95 processing time",
                    m(metric::EMAIL_PROCESSING_TIME_P95),
                    Limit::capacity(limit::MAX_PROCESSING_TIME_MS),
                )
                .deducts(25.0, Severity::Medium)
                .unit("ms"),
                BottleneckRule::below(
                    "low_delivery_rate",
                    "Email send success rate",
                    m(metric::EMAIL_SEND_SUCCESS_RATE),
                    Limit::Fixed(0.95),
                )
                .deducts(35.0, Severity::High),
                BottleneckRule::above(
                    "provider_rate_limiting",
                    "Email provider rate-limit hits",
                    m(metric::EMAIL_RATE_LIMIT_HITS),
                    Limit::Fixed(5.0),
                )
                .deducts(20.0, Severity::Medium),
            ],
        },
        ComponentRules {
            component: Component::BillingService,
            utilizations: vec![
                UtilizationRule::new(
                    "webhook_utilization",
                    demand(metric::BILLING_WEBHOOKS_PER_MINUTE),
                    limit::MAX_WEBHOOKS_PER_MINUTE,
                ),
                UtilizationRule::new(
                    "webhook_time_utilization",
                    demand(metric::BILLING_WEBHOOK_TIME_P95),
                    limit::MAX_WEBHOOK_TIME_MS,
                ),
                UtilizationRule::new(
                    "usage_tracking_utilization",
                    demand(metric::BILLING_USAGE_TRACKING_LATENCY),
                    limit::MAX_USAGE_TRACKING_MS,
                ),
            ],
            checks: vec![
                BottleneckRule::above(
                    "slow_webhooks",
                    "Billing webhook p95 time",
                    m(metric::BILLING_WEBHOOK_TIME_P95),
                    Limit::capacity(limit::MAX_WEBHOOK_TIME_MS),
                )
                .deducts(25.0, Severity::Medium)
                .unit("ms"),
                BottleneckRule::above(
                    "slow_usage_tracking",
                    "Billing usage-tracking latency",
                    m(metric::BILLING_USAGE_TRACKING_LATENCY),
                    Limit::capacity(limit::MAX_USAGE_TRACKING_MS),
                )
                .deducts(20.0, Severity::Medium)
                .unit("ms"),
            ],
        },
        ComponentRules {
            component: Component::GdprService,
            utilizations: vec![
                UtilizationRule::new(
                    "export_time_utilization",
                    demand(metric::GDPR_EXPORT_DURATION),
                    limit::MAX_EXPORT_MINUTES,
                )
                .scaled(60_000.0),
                UtilizationRule::new(
                    "export_concurrency_utilization",
                    demand(metric::GDPR_CONCURRENT_EXPORTS),
                    limit::MAX_CONCURRENT_EXPORTS,
                ),
            ],
            checks: vec![
                BottleneckRule::above(
                    "slow_exports",
                    "GDPR export duration",
                    m(metric::GDPR_EXPORT_DURATION),
                    Limit::Capacity {
                        key: limit::MAX_EXPORT_MINUTES.to_string(),
                        scale: 60_000.0,
                    },
                )
                .deducts(20.0, Severity::Medium)
                .unit("ms"),
                BottleneckRule::above(
                    "slow_consent_checks",
                    "GDPR consent check time",
                    m(metric::GDPR_CONSENT_CHECK_TIME),
                    Limit::Fixed(500.0),
                )
                .deducts(15.0, Severity::Low)
                .unit("ms"),
            ],
        },
    ]
}
