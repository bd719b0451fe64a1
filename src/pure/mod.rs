// Pure Functions Module
// All analysis algorithms implemented as side-effect-free functions over an
// immutable snapshot. Telemetry is returned as events, never emitted here.

pub mod bottleneck;
pub mod projection;
pub mod recommendation;
pub mod regression;
pub mod scoring;

pub use bottleneck::{
    analyze_capacity, default_rule_sets, evaluate_component, sort_bottlenecks, Bottleneck,
    BottleneckRule, CapacityAnalysis, ComponentEvaluation, ComponentRules, ComponentScore,
};
pub use projection::{
    default_projection_rules, project_growth, GrowthProjection, ProjectedIssue, ProjectionRule,
};
pub use recommendation::{
    build_action_plan, default_recommendation_rules, recommend, ActionPlan, Recommendation,
    RecommendationRule,
};
pub use regression::{detect_regressions, Regression, RegressionOutcome};
pub use scoring::{clamp_score, metric_score, score_snapshot, weighted_component_mean};
