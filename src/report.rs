// Report Assembler
// PerformanceAnalyzer owns the registries and rule tables, runs the independent
// analyses (optionally on the rayon pool) and merges them into one report.

use crate::baseline::{BaselineEntry, BaselineRegistry};
use crate::capacity::CapacityRegistry;
use crate::config::AnalysisConfig;
use crate::gate::{evaluate_gate, BuildDecision};
use crate::observability::{AnalysisEvent, OperationContext, PerfTimer};
use crate::pure::bottleneck::{
    analyze_capacity, apply_deduction_overrides, default_rule_sets, evaluate_component,
    sort_bottlenecks, Bottleneck, CapacityAnalysis, ComponentEvaluation, ComponentRules,
    ComponentScore, Demand, Measure,
};
use crate::pure::projection::{
    default_projection_rules, project_growth, GrowthProjection, ProjectedDemand,
    ProjectionOutcome, ProjectionRule,
};
use crate::pure::recommendation::{
    build_action_plan, default_recommendation_rules, recommend, ActionPlan, Recommendation,
    RecommendationRule,
};
use crate::pure::regression::{detect_regressions, Regression, RegressionOutcome};
use crate::pure::scoring::{score_snapshot, weighted_component_mean, ScoreOutcome};
use crate::types::{Component, MetricsSnapshot, RegressionSeverity};
use crate::validation::{merge_skipped, AnalysisError, SkippedMetric};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Everything one analysis run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalabilityReport {
    pub generated_at: DateTime<Utc>,
    pub test_type: String,
    pub virtual_users: f64,
    pub duration_ms: f64,
    pub performance_score: f64,
    pub overall_score: f64,
    pub component_scores: Vec<ComponentScore>,
    pub regressions: Vec<Regression>,
    pub bottlenecks: Vec<Bottleneck>,
    pub capacity_analysis: Vec<CapacityAnalysis>,
    pub recommendations: Vec<Recommendation>,
    pub growth_projections: IndexMap<String, GrowthProjection>,
    pub action_plan: ActionPlan,
    pub skipped_metrics: Vec<SkippedMetric>,
}

impl ScalabilityReport {
    pub fn critical_regressions(&self) -> impl Iterator<Item = &Regression> {
        self.regressions
            .iter()
            .filter(|r| r.severity == RegressionSeverity::Critical)
    }

    pub fn component_score(&self, component: Component) -> Option<f64> {
        self.component_scores
            .iter()
            .find(|c| c.component == component)
            .map(|c| c.score)
    }

    pub fn to_json_pretty(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A report together with the telemetry events the analyses produced
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRun {
    pub report: ScalabilityReport,
    pub events: Vec<AnalysisEvent>,
}

/// Facade over the registries, rule tables and configuration
#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    config: AnalysisConfig,
    baselines: BaselineRegistry,
    capacity: CapacityRegistry,
    component_weights: IndexMap<Component, f64>,
    rule_sets: Vec<ComponentRules>,
    projection_rules: Vec<ProjectionRule>,
    recommendation_rules: Vec<RecommendationRule>,
}

impl PerformanceAnalyzer {
    /// Build the reference tables and apply the overrides from `config`
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;

        let mut baselines = BaselineRegistry::with_defaults();
        for (name, overridden) in &config.baselines {
            let kind = overridden.kind.or_else(|| baselines.get(name).map(|e| e.kind));
            match kind {
                Some(kind) if baselines.get(name).map(|e| e.kind) == Some(kind) => {
                    baselines.set_target(name, overridden.target)?
                }
                Some(kind) => baselines.register(BaselineEntry::new(
                    name.clone(),
                    overridden.target,
                    kind,
                ))?,
                None => {
                    return Err(AnalysisError::invalid_config(
                        format!("baselines.{name}"),
                        "new baselines need an explicit kind",
                    ))
                }
            }
        }

        let mut capacity = CapacityRegistry::with_defaults();
        for (component, limits) in &config.capacity {
            let component: Component = component.parse().map_err(|reason| {
                AnalysisError::invalid_config(format!("capacity.{component}"), reason)
            })?;
            for (key, value) in limits {
                capacity.set_limit(component, key, *value)?;
            }
        }

        let mut rule_sets = default_rule_sets();
        apply_deduction_overrides(&mut rule_sets, &config.deductions)?;

        let component_weights = config.components.resolved()?;

        debug!(
            baselines = baselines.len(),
            rule_sets = rule_sets.len(),
            "Analyzer configured"
        );

        Ok(Self {
            config,
            baselines,
            capacity,
            component_weights,
            rule_sets,
            projection_rules: default_projection_rules(),
            recommendation_rules: default_recommendation_rules(),
        })
    }

    pub fn with_baselines(mut self, baselines: BaselineRegistry) -> Self {
        self.baselines = baselines;
        self
    }

    pub fn with_capacity(mut self, capacity: CapacityRegistry) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_rule_sets(mut self, rule_sets: Vec<ComponentRules>) -> Self {
        self.rule_sets = rule_sets;
        self
    }

    pub fn with_projection_rules(mut self, rules: Vec<ProjectionRule>) -> Self {
        self.projection_rules = rules;
        self
    }

    pub fn with_recommendation_rules(mut self, rules: Vec<RecommendationRule>) -> Self {
        self.recommendation_rules = rules;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn baselines(&self) -> &BaselineRegistry {
        &self.baselines
    }

    pub fn capacity(&self) -> &CapacityRegistry {
        &self.capacity
    }

    /// Every metric name some analysis reads
    pub fn known_metrics(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> =
            self.baselines.iter().map(|e| e.metric_name.clone()).collect();
        names.extend(self.config.scoring.weights.keys().cloned());

        for rules in &self.rule_sets {
            for utilization in &rules.utilizations {
                if let Demand::Metric(name) = &utilization.demand {
                    names.insert(name.clone());
                }
            }
            for check in &rules.checks {
                if let Measure::Metric(name) = &check.measure {
                    names.insert(name.clone());
                }
            }
        }
        for rule in &self.projection_rules {
            if let ProjectedDemand::Metric(name) = &rule.demand {
                names.insert(name.clone());
            }
        }
        names
    }

    /// Parse JSON text using this analyzer's known metric names
    pub fn parse_snapshot(&self, input: &str) -> Result<MetricsSnapshot, AnalysisError> {
        MetricsSnapshot::from_json_str(input, &self.known_metrics())
    }

    /// Run every analysis over one snapshot and assemble the report
    #[instrument(skip(self, snapshot), fields(test_type = %snapshot.test_type(), metrics = snapshot.len()))]
    pub fn analyze(&self, snapshot: &MetricsSnapshot) -> AnalysisRun {
        let mut ctx = OperationContext::new("performance_analysis");
        ctx.add_attribute("test_type", snapshot.test_type());
        let _timer = PerfTimer::new("performance_analysis");

        let (regression, scoring, evaluations, projection) = if self.config.analysis.parallel {
            self.run_parallel(snapshot)
        } else {
            self.run_sequential(snapshot)
        };

        let run = self.assemble(snapshot, regression, scoring, evaluations, projection);
        info!(
            trace_id = %ctx.trace_id,
            overall_score = run.report.overall_score,
            performance_score = run.report.performance_score,
            regressions = run.report.regressions.len(),
            bottlenecks = run.report.bottlenecks.len(),
            elapsed_ms = ctx.elapsed().as_millis(),
            "Analysis complete"
        );
        run
    }

    /// Parse, analyze and gate in one step
    pub fn analyze_json(&self, input: &str) -> Result<(AnalysisRun, BuildDecision), AnalysisError> {
        let snapshot = self.parse_snapshot(input)?;
        let run = self.analyze(&snapshot);
        let decision = self.decide(&run.report);
        Ok((run, decision))
    }

    /// Apply the configured gate to a report
    pub fn decide(&self, report: &ScalabilityReport) -> BuildDecision {
        evaluate_gate(report, &self.config.gate)
    }

    fn run_sequential(
        &self,
        snapshot: &MetricsSnapshot,
    ) -> (
        RegressionOutcome,
        ScoreOutcome,
        Vec<ComponentEvaluation>,
        ProjectionOutcome,
    ) {
        (
            detect_regressions(snapshot, &self.baselines, &self.config.regression),
            score_snapshot(snapshot, &self.baselines, &self.config.scoring.weights),
            analyze_capacity(snapshot, &self.capacity, &self.rule_sets),
            project_growth(
                snapshot,
                &self.capacity,
                &self.projection_rules,
                &self.config.projection,
            ),
        )
    }

    fn run_parallel(
        &self,
        snapshot: &MetricsSnapshot,
    ) -> (
        RegressionOutcome,
        ScoreOutcome,
        Vec<ComponentEvaluation>,
        ProjectionOutcome,
    ) {
        let ((regression, scoring), (evaluations, projection)) = rayon::join(
            || {
                rayon::join(
                    || detect_regressions(snapshot, &self.baselines, &self.config.regression),
                    || score_snapshot(snapshot, &self.baselines, &self.config.scoring.weights),
                )
            },
            || {
                rayon::join(
                    || {
                        self.rule_sets
                            .par_iter()
                            .map(|rules| {
                                evaluate_component(
                                    snapshot,
                                    self.capacity.get(rules.component),
                                    rules,
                                )
                            })
                            .collect::<Vec<_>>()
                    },
                    || {
                        project_growth(
                            snapshot,
                            &self.capacity,
                            &self.projection_rules,
                            &self.config.projection,
                        )
                    },
                )
            },
        );
        (regression, scoring, evaluations, projection)
    }

    fn assemble(
        &self,
        snapshot: &MetricsSnapshot,
        regression: RegressionOutcome,
        scoring: ScoreOutcome,
        evaluations: Vec<ComponentEvaluation>,
        projection: ProjectionOutcome,
    ) -> AnalysisRun {
        let mut events = regression.events;
        let mut bottlenecks = Vec::new();
        let mut capacity_analysis = Vec::with_capacity(evaluations.len());
        let mut component_scores = Vec::new();
        let mut skipped_lists = vec![regression.skipped, scoring.skipped];

        for evaluation in evaluations {
            if let Some(score) = evaluation.score {
                component_scores.push(ComponentScore {
                    component: evaluation.component,
                    score,
                });
            }
            bottlenecks.extend(evaluation.bottlenecks);
            capacity_analysis.push(evaluation.capacity_analysis);
            skipped_lists.push(evaluation.skipped);
            events.extend(evaluation.events);
        }
        sort_bottlenecks(&mut bottlenecks);
        events.extend(projection.events);
        skipped_lists.push(projection.skipped);

        let scored: IndexMap<Component, f64> = component_scores
            .iter()
            .map(|c| (c.component, c.score))
            .collect();
        // with no scored component the overall score falls back to the metric score
        let overall_score = weighted_component_mean(&scored, &self.component_weights)
            .unwrap_or(scoring.score);

        let recommendations = recommend(
            &capacity_analysis,
            &self.recommendation_rules,
            self.config.recommendation.default_threshold,
        );
        let action_plan = build_action_plan(&recommendations);

        let growth_projections = projection
            .projections
            .into_iter()
            .map(|p| (p.label(), p))
            .collect();

        let report = ScalabilityReport {
            generated_at: Utc::now(),
            test_type: snapshot.test_type().to_string(),
            virtual_users: snapshot.virtual_users(),
            duration_ms: snapshot.duration_ms(),
            performance_score: scoring.score,
            overall_score,
            component_scores,
            regressions: regression.regressions,
            bottlenecks,
            capacity_analysis,
            recommendations,
            growth_projections,
            action_plan,
            skipped_metrics: merge_skipped(skipped_lists),
        };

        AnalysisRun { report, events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::MetricsSnapshotBuilder;
    use crate::config::BaselineOverride;
    use crate::types::{metric, MetricKind, Priority, Severity};
    use pretty_assertions::assert_eq;

    fn analyzer() -> PerformanceAnalyzer {
        PerformanceAnalyzer::new(AnalysisConfig::default()).unwrap()
    }

    fn healthy() -> MetricsSnapshot {
        MetricsSnapshotBuilder::new()
            .test_type("load")
            .virtual_users(100.0)
            .duration_ms(60_000.0)
            .metric(metric::API_RESPONSE_TIME_P95, 300.0)
            .metric(metric::API_ERROR_RATE, 0.001)
            .metric(metric::API_THROUGHPUT_RPS, 120.0)
            .metric(metric::DB_QUERY_TIME_P95, 40.0)
            .metric(metric::EMAIL_PROCESSING_TIME_P95, 900.0)
            .metric(metric::PAYMENT_SUCCESS_RATE, 0.999)
            .metric(metric::GDPR_RESPONSE_TIME_P95, 400.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_healthy_snapshot_passes() {
        let analyzer = analyzer();
        let run = analyzer.analyze(&healthy());
        let report = &run.report;

        // an error rate of 0.001 against 0.01 scores 90, costing 10 * 0.15 points
        assert_eq!(report.performance_score, 98.5);
        assert!(report.regressions.is_empty());
        assert!(report.bottlenecks.is_empty());
        assert_eq!(report.growth_projections.len(), 4);
        assert!(report.growth_projections.contains_key("20x"));
        assert!(!analyzer.decide(report).should_fail);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let snapshot = MetricsSnapshotBuilder::new()
            .virtual_users(900.0)
            .metric(metric::API_RESPONSE_TIME_P95, 2600.0)
            .metric(metric::API_THROUGHPUT_RPS, 850.0)
            .metric(metric::DB_ACTIVE_CONNECTIONS, 95.0)
            .metric(metric::DB_QUERY_TIME_P95, 180.0)
            .metric(metric::EMAIL_THROUGHPUT_PER_MINUTE, 900.0)
            .build()
            .unwrap();

        let parallel = analyzer().analyze(&snapshot);
        let mut config = AnalysisConfig::default();
        config.analysis.parallel = false;
        let mut sequential = PerformanceAnalyzer::new(config).unwrap().analyze(&snapshot);
        sequential.report.generated_at = parallel.report.generated_at;

        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_overall_score_excludes_unscored_components() {
        // only the email component has data
        let snapshot = MetricsSnapshotBuilder::new()
            .metric(metric::EMAIL_SEND_SUCCESS_RATE, 0.90)
            .build()
            .unwrap();
        let report = analyzer().analyze(&snapshot).report;

        assert_eq!(report.component_score(Component::EmailService), Some(65.0));
        assert_eq!(report.overall_score, 65.0);
        assert!(report.component_score(Component::GdprService).is_none());
    }

    #[test]
    fn test_report_orders_and_plans() {
        let snapshot = MetricsSnapshotBuilder::new()
            .virtual_users(4500.0)
            .metric(metric::API_THROUGHPUT_RPS, 950.0)
            .metric(metric::DB_ACTIVE_CONNECTIONS, 96.0)
            .metric(metric::EMAIL_QUEUE_DEPTH, 8000.0)
            .build()
            .unwrap();
        let report = analyzer().analyze(&snapshot).report;

        let severities: Vec<Severity> = report.bottlenecks.iter().map(|b| b.severity).collect();
        let mut sorted = severities.clone();
        sorted.sort();
        assert_eq!(severities, sorted);

        let priorities: Vec<Priority> =
            report.recommendations.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert_eq!(priorities.first(), Some(&Priority::Critical));

        let planned = report.action_plan.immediate_actions.len()
            + report.action_plan.short_term_actions.len()
            + report.action_plan.long_term_actions.len();
        assert_eq!(planned, report.recommendations.len());
    }

    #[test]
    fn test_skipped_metrics_are_reported_once() {
        let snapshot = MetricsSnapshotBuilder::new().build().unwrap();
        let report = analyzer().analyze(&snapshot).report;

        let names: Vec<_> = report
            .skipped_metrics
            .iter()
            .filter(|s| s.component.is_none())
            .map(|s| s.metric.as_str())
            .collect();
        let unique: BTreeSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.contains(&metric::API_RESPONSE_TIME_P95));
    }

    #[test]
    fn test_baseline_overrides() {
        let mut config = AnalysisConfig::default();
        config.baselines.insert(
            metric::API_RESPONSE_TIME_P95.to_string(),
            BaselineOverride {
                target: 250.0,
                kind: None,
            },
        );
        config.baselines.insert(
            "search_latency_p95".to_string(),
            BaselineOverride {
                target: 80.0,
                kind: Some(MetricKind::Duration),
            },
        );
        let analyzer = PerformanceAnalyzer::new(config).unwrap();

        assert_eq!(
            analyzer
                .baselines()
                .get(metric::API_RESPONSE_TIME_P95)
                .unwrap()
                .target_value,
            250.0
        );
        assert!(analyzer.known_metrics().contains("search_latency_p95"));

        let mut config = AnalysisConfig::default();
        config.baselines.insert(
            "unknown_metric".to_string(),
            BaselineOverride {
                target: 1.0,
                kind: None,
            },
        );
        assert!(PerformanceAnalyzer::new(config).is_err());
    }

    #[test]
    fn test_analyze_json_rejects_type_invalid_known_metric() {
        let err = analyzer()
            .analyze_json(r#"{"api_response_time_p95": "slow"}"#)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedSnapshot { .. }));

        let (run, decision) = analyzer()
            .analyze_json(r#"{"test_type": "smoke", "note": "ignored", "api_response_time_p95": 300}"#)
            .unwrap();
        assert_eq!(run.report.test_type, "smoke");
        assert!(!decision.should_fail);
    }
}
