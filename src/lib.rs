// Perfgate - Performance Analysis & Scalability Projection Engine
// Root library module

pub mod baseline;
pub mod builders;
pub mod capacity;
pub mod config;
pub mod gate;
pub mod observability;
pub mod pure;
pub mod report;
pub mod types;
pub mod validation;

// Re-export key types
pub use observability::{
    default_filter, emit_events, init_logging, init_logging_with_default, init_logging_with_level,
    log_error_with_context, record_metric, AnalysisEvent, EventSummary, MetricType,
    OperationContext, PerfTimer, DEFAULT_LOG_LEVEL,
};

pub use types::{
    metric, Component, Direction, MetricKind, MetricsSnapshot, Priority, RegressionSeverity,
    Severity,
};

pub use validation::{AnalysisError, SkipReason, SkippedMetric};

// Re-export builders
pub use builders::MetricsSnapshotBuilder;

// Registries
pub use baseline::{BaselineEntry, BaselineRegistry};
pub use capacity::{limit, CapacityModel, CapacityRegistry};

pub use config::{AnalysisConfig, GateConfig, ScoreSource};

// Re-export pure analysis functions
pub use pure::{
    build_action_plan, clamp_score, detect_regressions, metric_score, project_growth, recommend,
    score_snapshot, weighted_component_mean, ActionPlan, Bottleneck, CapacityAnalysis,
    ComponentScore, GrowthProjection, Recommendation, Regression,
};

pub use gate::{evaluate_gate, BuildDecision, GateStatus};
pub use report::{AnalysisRun, PerformanceAnalyzer, ScalabilityReport};
