// Growth Projection
// Replays a reduced capacity check at synthetic multiples of the current load.
// Depends only on the snapshot and the capacity registry, never on bottleneck output.

use crate::capacity::{limit, CapacityRegistry};
use crate::config::ProjectionConfig;
use crate::observability::AnalysisEvent;
use crate::types::{metric, Component, MetricsSnapshot, Severity};
use crate::validation::{SkipReason, SkippedMetric};
use serde::{Deserialize, Serialize};

/// How projected demand for a dimension is derived from the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectedDemand {
    /// Current request rate times the multiplier
    RequestRate,
    /// Current virtual users times the multiplier
    Users,
    /// Database connections estimated from users (one per `users_per_connection`)
    Connections,
    /// Any other metric scaled linearly
    Metric(String),
}

/// Remediation template for a projected issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    ScaleInstances,
    RaiseUserCapacity,
    ExpandConnectionPool,
    ScaleWorkers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRule {
    pub component: Component,
    pub dimension: String,
    pub demand: ProjectedDemand,
    pub capacity_key: String,
    pub remedy: Remedy,
}

/// A forecast capacity problem at one multiplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedIssue {
    pub component: Component,
    pub dimension: String,
    pub projected_value: f64,
    pub capacity: f64,
    pub utilization: f64,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthProjection {
    pub multiplier: u32,
    pub projected_users: f64,
    pub projected_rps: f64,
    pub estimated_issues: Vec<ProjectedIssue>,
    pub required_improvements: Vec<String>,
}

impl GrowthProjection {
    /// Key used in the report's projection map
    pub fn label(&self) -> String {
        format!("{}x", self.multiplier)
    }

    pub fn has_issue_for(&self, component: Component) -> bool {
        self.estimated_issues.iter().any(|i| i.component == component)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionOutcome {
    pub projections: Vec<GrowthProjection>,
    pub skipped: Vec<SkippedMetric>,
    pub events: Vec<AnalysisEvent>,
}

/// Project every multiplier in `config`
pub fn project_growth(
    snapshot: &MetricsSnapshot,
    registry: &CapacityRegistry,
    rules: &[ProjectionRule],
    config: &ProjectionConfig,
) -> ProjectionOutcome {
    let mut outcome = ProjectionOutcome::default();

    let current_users = snapshot.virtual_users();
    let current_rps = match snapshot.get(metric::API_THROUGHPUT_RPS) {
        Some(rps) => rps,
        None => {
            outcome.skipped.push(SkippedMetric::new(
                metric::API_THROUGHPUT_RPS,
                SkipReason::MissingMetric,
            ));
            0.0
        }
    };

    for &multiplier in &config.multipliers {
        let factor = f64::from(multiplier);
        let projected_users = current_users * factor;
        let projected_rps = current_rps * factor;
        let mut projection = GrowthProjection {
            multiplier,
            projected_users,
            projected_rps,
            estimated_issues: Vec::new(),
            required_improvements: Vec::new(),
        };

        for rule in rules {
            let projected_value = match &rule.demand {
                ProjectedDemand::RequestRate => projected_rps,
                ProjectedDemand::Users => projected_users,
                ProjectedDemand::Connections => projected_users / config.users_per_connection,
                ProjectedDemand::Metric(name) => match snapshot.get(name) {
                    Some(value) => value * factor,
                    None => continue,
                },
            };
            let Some(capacity) = registry
                .get(rule.component)
                .and_then(|model| model.ceiling(&rule.capacity_key))
            else {
                continue;
            };

            if projected_value <= capacity * config.trigger_ratio {
                continue;
            }

            let utilization = projected_value / capacity;
            let severity = if utilization > 1.0 {
                Severity::Critical
            } else {
                Severity::High
            };

            outcome.events.push(AnalysisEvent::ProjectedIssue {
                component: rule.component,
                multiplier,
                utilization,
            });
            projection
                .required_improvements
                .push(improvement(rule, projected_value, capacity));
            projection.estimated_issues.push(ProjectedIssue {
                component: rule.component,
                dimension: rule.dimension.clone(),
                projected_value,
                capacity,
                utilization,
                severity,
                description: format!(
                    "{} {} projected at {:.0}% of capacity at {}x load",
                    rule.component,
                    rule.dimension,
                    utilization * 100.0,
                    multiplier
                ),
            });
        }

        outcome.projections.push(projection);
    }

    // missing metric-driven demand is reported once, not per multiplier
    for rule in rules {
        if let ProjectedDemand::Metric(name) = &rule.demand {
            if !snapshot.contains(name) {
                outcome.skipped.push(SkippedMetric::for_component(
                    rule.component,
                    name.clone(),
                    SkipReason::MissingMetric,
                ));
            }
        }
    }

    outcome
}

fn improvement(rule: &ProjectionRule, projected: f64, capacity: f64) -> String {
    let units = (projected / capacity).ceil().max(1.0);
    match rule.remedy {
        Remedy::ScaleInstances => format!(
            "Scale {} to {:.0} instances to serve {:.0} {} (capacity {:.0} per instance)",
            rule.component, units, projected, rule.dimension, capacity
        ),
        Remedy::RaiseUserCapacity => format!(
            "Raise {} concurrent user capacity to {:.0} (currently {:.0})",
            rule.component,
            projected.ceil(),
            capacity
        ),
        Remedy::ExpandConnectionPool => format!(
            "Provision at least {:.0} database connections via a pooler or read replicas (currently {:.0})",
            projected.ceil(),
            capacity
        ),
        Remedy::ScaleWorkers => format!(
            "Scale {} to {:.0} workers to handle {:.0} {}",
            rule.component, units, projected, rule.dimension
        ),
    }
}

/// Reduced capacity checks for the three highest-weighted components
pub fn default_projection_rules() -> Vec<ProjectionRule> {
    vec![
        ProjectionRule {
            component: Component::ApiServer,
            dimension: "requests_per_second".to_string(),
            demand: ProjectedDemand::RequestRate,
            capacity_key: limit::MAX_RPS.to_string(),
            remedy: Remedy::ScaleInstances,
        },
        ProjectionRule {
            component: Component::ApiServer,
            dimension: "concurrent_users".to_string(),
            demand: ProjectedDemand::Users,
            capacity_key: limit::MAX_CONCURRENT_USERS.to_string(),
            remedy: Remedy::RaiseUserCapacity,
        },
        ProjectionRule {
            component: Component::Database,
            dimension: "connections".to_string(),
            demand: ProjectedDemand::Connections,
            capacity_key: limit::MAX_CONNECTIONS.to_string(),
            remedy: Remedy::ExpandConnectionPool,
        },
        ProjectionRule {
            component: Component::EmailService,
            dimension: "emails_per_minute".to_string(),
            demand: ProjectedDemand::Metric(metric::EMAIL_THROUGHPUT_PER_MINUTE.to_string()),
            capacity_key: limit::MAX_EMAILS_PER_MINUTE.to_string(),
            remedy: Remedy::ScaleWorkers,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::MetricsSnapshotBuilder;

    fn project(users: f64, metrics: &[(&str, f64)]) -> ProjectionOutcome {
        let snapshot = MetricsSnapshotBuilder::new()
            .virtual_users(users)
            .metrics(metrics.iter().copied())
            .build()
            .unwrap();
        project_growth(
            &snapshot,
            &CapacityRegistry::with_defaults(),
            &default_projection_rules(),
            &ProjectionConfig::default(),
        )
    }

    fn at(outcome: &ProjectionOutcome, multiplier: u32) -> &GrowthProjection {
        outcome
            .projections
            .iter()
            .find(|p| p.multiplier == multiplier)
            .unwrap()
    }

    #[test]
    fn test_api_issue_appears_at_20x_not_5x() {
        let outcome = project(10.0, &[(metric::API_THROUGHPUT_RPS, 50.0)]);
        assert_eq!(outcome.projections.len(), 4);

        let five = at(&outcome, 5);
        assert_eq!(five.projected_rps, 250.0);
        assert!(!five.has_issue_for(Component::ApiServer));

        let twenty = at(&outcome, 20);
        assert_eq!(twenty.projected_rps, 1000.0);
        assert!(twenty.has_issue_for(Component::ApiServer));
        assert_eq!(twenty.required_improvements.len(), 1);
        assert!(twenty.required_improvements[0].contains("1 instances"));
    }

    #[test]
    fn test_database_connections_estimated_from_users() {
        // 500 users -> 50 connections at 1x; 2x -> 100 > 80
        let outcome = project(500.0, &[]);
        let two = at(&outcome, 2);
        let issue = two
            .estimated_issues
            .iter()
            .find(|i| i.component == Component::Database)
            .unwrap();
        assert_eq!(issue.projected_value, 100.0);
        assert_eq!(issue.severity, Severity::High);

        let ten = at(&outcome, 10);
        let issue = ten
            .estimated_issues
            .iter()
            .find(|i| i.component == Component::Database)
            .unwrap();
        assert_eq!(issue.severity, Severity::Critical);
    }

    #[test]
    fn test_projection_uses_projected_not_measured_values() {
        let outcome = project(1.0, &[(metric::EMAIL_THROUGHPUT_PER_MINUTE, 100.0)]);
        assert!(!at(&outcome, 5).has_issue_for(Component::EmailService));
        assert!(at(&outcome, 10).has_issue_for(Component::EmailService));
    }

    #[test]
    fn test_missing_inputs_are_skipped_once() {
        let outcome = project(0.0, &[]);
        assert!(outcome
            .projections
            .iter()
            .all(|p| p.estimated_issues.is_empty()));
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[test]
    fn test_labels() {
        let outcome = project(1.0, &[]);
        let labels: Vec<_> = outcome.projections.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["2x", "5x", "10x", "20x"]);
    }
}
