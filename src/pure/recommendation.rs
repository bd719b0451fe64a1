// Recommendation Engine
// Turns capacity utilization into prioritized remediation and buckets the
// result into an immediate / short-term / long-term action plan.

use crate::pure::bottleneck::CapacityAnalysis;
use crate::types::{Component, Priority};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub component: Component,
    #[serde(rename = "type")]
    pub recommendation_type: String,
    pub priority: Priority,
    pub description: String,
    pub implementation: String,
    pub estimated_cost: String,
    pub timeline: String,
    pub utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub component: Component,
    pub dimension: String,
    /// Fires above this utilization; the engine default applies when unset
    pub threshold: Option<f64>,
    /// Above this utilization the priority becomes critical
    pub critical_above: Option<f64>,
    pub recommendation_type: String,
    pub priority: Priority,
    pub description: String,
    pub implementation: String,
    pub estimated_cost: String,
    pub timeline: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub immediate_actions: Vec<Recommendation>,
    pub short_term_actions: Vec<Recommendation>,
    pub long_term_actions: Vec<Recommendation>,
}

/// Emit recommendations for every rule whose dimension runs hot, sorted critical first
pub fn recommend(
    analyses: &[CapacityAnalysis],
    rules: &[RecommendationRule],
    default_threshold: f64,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = analyses
        .iter()
        .flat_map(|analysis| {
            rules
                .iter()
                .filter(move |rule| rule.component == analysis.component)
                .filter_map(move |rule| {
                    let utilization = analysis.utilization_of(&rule.dimension)?;
                    let threshold = rule.threshold.unwrap_or(default_threshold);
                    (utilization > threshold).then(|| build(rule, utilization))
                })
        })
        .collect();

    sort_recommendations(&mut recommendations);
    recommendations
}

fn build(rule: &RecommendationRule, utilization: f64) -> Recommendation {
    let priority = match rule.critical_above {
        Some(escalation) if utilization > escalation => Priority::Critical,
        _ => rule.priority,
    };
    Recommendation {
        component: rule.component,
        recommendation_type: rule.recommendation_type.clone(),
        priority,
        description: format!(
            "{} ({:.0}% of capacity)",
            rule.description,
            utilization * 100.0
        ),
        implementation: rule.implementation.clone(),
        estimated_cost: rule.estimated_cost.clone(),
        timeline: rule.timeline.clone(),
        utilization,
    }
}

/// Stable sort, critical first; ties keep encounter order
pub fn sort_recommendations(recommendations: &mut [Recommendation]) {
    recommendations.sort_by_key(|r| r.priority);
}

/// Bucket recommendations by urgency and timeline
pub fn build_action_plan(recommendations: &[Recommendation]) -> ActionPlan {
    let mut plan = ActionPlan::default();
    for recommendation in recommendations {
        let quick = recommendation.timeline.contains("week") || recommendation.timeline.contains('1');
        if recommendation.priority.is_urgent() && quick {
            plan.immediate_actions.push(recommendation.clone());
        } else if recommendation.priority.is_urgent() {
            plan.short_term_actions.push(recommendation.clone());
        } else {
            plan.long_term_actions.push(recommendation.clone());
        }
    }
    plan
}

#[allow(clippy::too_many_arguments)]
fn rule(
    component: Component,
    dimension: &str,
    recommendation_type: &str,
    priority: Priority,
    critical_above: Option<f64>,
    description: &str,
    implementation: &str,
    estimated_cost: &str,
    timeline: &str,
) -> RecommendationRule {
    RecommendationRule {
        component,
        dimension: dimension.to_string(),
        threshold: None,
        critical_above,
        recommendation_type: recommendation_type.to_string(),
        priority,
        description: description.to_string(),
        implementation: implementation.to_string(),
        estimated_cost: estimated_cost.to_string(),
        timeline: timeline.to_string(),
    }
}

/// Reference remediation catalogue
pub fn default_recommendation_rules() -> Vec<RecommendationRule> {
    use Component::*;
    use Priority::*;

    vec![
        rule(
            ApiServer,
            "throughput_utilization",
            "horizontal_scaling",
            High,
            Some(0.9),
            "API throughput is approaching capacity",
            "Add API server instances behind the load balancer and autoscale on request rate",
            "medium",
            "1-2 weeks",
        ),
        rule(
            ApiServer,
            "user_utilization",
            "session_scaling",
            High,
            None,
            "Concurrent users are approaching the API server limit",
            "Move sessions to a shared store so API instances can scale out",
            "medium",
            "2-3 months",
        ),
        rule(
            ApiServer,
            "cpu_utilization",
            "cpu_optimization",
            Medium,
            Some(1.0),
            "API CPU usage is high",
            "Profile hot endpoints and move heavy work to background jobs",
            "low",
            "2-4 weeks",
        ),
        rule(
            ApiServer,
            "response_time_utilization",
            "response_caching",
            Medium,
            None,
            "API response times are approaching the latency budget",
            "Cache read-heavy endpoints and add conditional request support",
            "low",
            "1 month",
        ),
        rule(
            ApiServer,
            "memory_utilization",
            "memory_optimization",
            Medium,
            None,
            "API memory usage is high",
            "Bound in-process caches and stream large payloads",
            "low",
            "2-4 weeks",
        ),
        rule(
            Database,
            "connection_utilization",
            "connection_pooling",
            High,
            Some(0.9),
            "Database connection pool is close to exhaustion",
            "Deploy transaction-mode connection pooling and tune pool sizes per service",
            "low",
            "1 week",
        ),
        rule(
            Database,
            "query_time_utilization",
            "query_optimization",
            High,
            None,
            "Database query latency is approaching its ceiling",
            "Index slow queries and simplify row-level security predicates",
            "low",
            "2-3 weeks",
        ),
        rule(
            EmailService,
            "throughput_utilization",
            "email_queue_scaling",
            High,
            Some(0.9),
            "Email throughput is approaching provider capacity",
            "Add queue workers and spread sends across provider accounts",
            "medium",
            "1-2 weeks",
        ),
        rule(
            EmailService,
            "queue_utilization",
            "queue_backpressure",
            Medium,
            None,
            "Email queue depth is high",
            "Apply backpressure and separate transactional from bulk sends",
            "low",
            "1 month",
        ),
        rule(
            EmailService,
            "processing_time_utilization",
            "template_optimization",
            Low,
            None,
            "Email processing time is high",
            "Pre-render templates and batch provider calls",
            "low",
            "2-3 months",
        ),
        rule(
            BillingService,
            "webhook_utilization",
            "async_webhooks",
            Medium,
            None,
            "Billing webhook volume is approaching capacity",
            "Acknowledge webhooks immediately and process them from a queue",
            "low",
            "2-4 weeks",
        ),
        rule(
            BillingService,
            "webhook_time_utilization",
            "webhook_optimization",
            Medium,
            None,
            "Billing webhook handling is slow",
            "Make webhook handlers idempotent and move side effects out of the request",
            "low",
            "1 month",
        ),
        rule(
            BillingService,
            "usage_tracking_utilization",
            "usage_batching",
            Low,
            None,
            "Usage tracking latency is high",
            "Batch usage-tracking writes and aggregate before reporting",
            "low",
            "2-3 months",
        ),
        rule(
            GdprService,
            "export_time_utilization",
            "background_exports",
            Low,
            None,
            "GDPR exports are approaching the completion deadline",
            "Run exports as background jobs that stream archives to object storage",
            "medium",
            "3-6 months",
        ),
        rule(
            GdprService,
            "export_concurrency_utilization",
            "export_throttling",
            Medium,
            None,
            "Concurrent GDPR exports are near the limit",
            "Throttle exports per tenant and queue the overflow",
            "low",
            "1 month",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn analysis(component: Component, utilization: &[(&str, f64)]) -> CapacityAnalysis {
        CapacityAnalysis {
            component,
            utilization: utilization
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            measurements: IndexMap::new(),
        }
    }

    fn recommendation(priority: Priority, timeline: &str) -> Recommendation {
        Recommendation {
            component: Component::ApiServer,
            recommendation_type: "test".to_string(),
            priority,
            description: String::new(),
            implementation: String::new(),
            estimated_cost: String::new(),
            timeline: timeline.to_string(),
            utilization: 0.0,
        }
    }

    #[test]
    fn test_threshold_and_escalation() {
        let rules = default_recommendation_rules();
        let analyses = vec![analysis(
            Component::ApiServer,
            &[("throughput_utilization", 0.75)],
        )];
        let recs = recommend(&analyses, &rules, 0.7);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].description, "API throughput is approaching capacity (75% of capacity)");

        let analyses = vec![analysis(
            Component::ApiServer,
            &[("throughput_utilization", 0.95)],
        )];
        assert_eq!(recommend(&analyses, &rules, 0.7)[0].priority, Priority::Critical);

        let analyses = vec![analysis(
            Component::ApiServer,
            &[("throughput_utilization", 0.70)],
        )];
        assert!(recommend(&analyses, &rules, 0.7).is_empty());
    }

    #[test]
    fn test_recommendations_sorted_critical_first() {
        let rules = default_recommendation_rules();
        let analyses = vec![
            analysis(Component::GdprService, &[("export_time_utilization", 0.8)]),
            analysis(Component::BillingService, &[("webhook_utilization", 0.8)]),
            analysis(Component::Database, &[("connection_utilization", 0.95)]),
            analysis(Component::EmailService, &[("throughput_utilization", 0.8)]),
        ];
        let recs = recommend(&analyses, &rules, 0.7);
        let priorities: Vec<_> = recs.iter().map(|r| r.priority).collect();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
        assert_eq!(recs[0].component, Component::Database);
    }

    #[test]
    fn test_action_plan_buckets() {
        let recs = vec![
            recommendation(Priority::Critical, "1 week"),
            recommendation(Priority::High, "2-3 months"),
            recommendation(Priority::High, "1-3 months"),
            recommendation(Priority::Medium, "1 week"),
            recommendation(Priority::Low, "3-6 months"),
        ];
        let plan = build_action_plan(&recs);
        assert_eq!(plan.immediate_actions.len(), 2);
        assert_eq!(plan.short_term_actions.len(), 1);
        assert_eq!(plan.short_term_actions[0].timeline, "2-3 months");
        assert_eq!(plan.long_term_actions.len(), 2);
    }

    #[test]
    fn test_rule_specific_threshold_overrides_default() {
        let mut rules = default_recommendation_rules();
        rules[0].threshold = Some(0.5);
        let analyses = vec![analysis(
            Component::ApiServer,
            &[("throughput_utilization", 0.6)],
        )];
        assert_eq!(recommend(&analyses, &rules, 0.7).len(), 1);
    }
}
