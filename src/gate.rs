// CI Gate
// Fixed decision policy over an assembled report. Rules are evaluated in order
// and the first failing rule decides; a report always yields a decision.

use crate::config::{GateConfig, ScoreSource};
use crate::report::ScalabilityReport;
use crate::types::Priority;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    PassedWithWarnings,
    Failed,
}

/// Verdict consumed by the release pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDecision {
    pub should_fail: bool,
    pub status: GateStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl BuildDecision {
    fn fail(reason: String, details: Vec<String>) -> Self {
        Self {
            should_fail: true,
            status: GateStatus::Failed,
            reason,
            details,
        }
    }

    /// Process exit code for CI runners
    pub fn exit_code(&self) -> i32 {
        i32::from(self.should_fail)
    }
}

/// Apply the gate policy to a report
pub fn evaluate_gate(report: &ScalabilityReport, config: &GateConfig) -> BuildDecision {
    let (label, score) = match config.score_source {
        ScoreSource::Overall => ("Overall", report.overall_score),
        ScoreSource::Performance => ("Performance", report.performance_score),
    };

    if score < config.min_score {
        warn!(score, min_score = config.min_score, "Build gate failed on score");
        return BuildDecision::fail(
            format!(
                "{} score {:.1} is below the minimum of {:.0}",
                label, score, config.min_score
            ),
            Vec::new(),
        );
    }

    let critical_regressions: Vec<_> = report.critical_regressions().collect();
    if !critical_regressions.is_empty() {
        warn!(
            count = critical_regressions.len(),
            "Build gate failed on critical regressions"
        );
        let details = critical_regressions
            .iter()
            .map(|r| {
                format!(
                    "{}: {:.1}% worse than baseline ({} vs {})",
                    r.metric, r.degradation_pct, r.current, r.baseline
                )
            })
            .collect();
        return BuildDecision::fail(
            format!(
                "{} critical performance regression(s) detected",
                critical_regressions.len()
            ),
            details,
        );
    }

    let critical_recommendations: Vec<_> = report
        .recommendations
        .iter()
        .filter(|r| r.priority == Priority::Critical)
        .collect();
    if critical_recommendations.len() > config.max_critical_recommendations {
        warn!(
            count = critical_recommendations.len(),
            "Build gate failed on critical recommendations"
        );
        let details = critical_recommendations
            .iter()
            .map(|r| format!("{} ({}): {}", r.component, r.recommendation_type, r.description))
            .collect();
        return BuildDecision::fail(
            format!(
                "{} critical recommendations exceed the limit of {}",
                critical_recommendations.len(),
                config.max_critical_recommendations
            ),
            details,
        );
    }

    let warnings = report.regressions.len() + report.recommendations.len();
    info!(score, warnings, "Build gate passed");
    if warnings == 0 {
        BuildDecision {
            should_fail: false,
            status: GateStatus::Passed,
            reason: "All performance gates passed".to_string(),
            details: Vec::new(),
        }
    } else {
        let details = report
            .regressions
            .iter()
            .map(|r| format!("regression {}: {:.1}% ({})", r.metric, r.degradation_pct, r.severity))
            .chain(
                report
                    .recommendations
                    .iter()
                    .map(|r| format!("recommendation {} ({}): {}", r.component, r.priority, r.description)),
            )
            .collect();
        BuildDecision {
            should_fail: false,
            status: GateStatus::PassedWithWarnings,
            reason: format!("Performance gates passed with {} warning(s)", warnings),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pure::{Recommendation, Regression};
    use crate::types::{Component, RegressionSeverity};
    use chrono::Utc;

    fn regression(severity: RegressionSeverity) -> Regression {
        Regression {
            metric: "db_query_time_p95".to_string(),
            baseline: 100.0,
            current: 180.0,
            degradation_pct: 80.0,
            severity,
            timestamp: Utc::now(),
        }
    }

    fn critical_recommendation() -> Recommendation {
        Recommendation {
            component: Component::Database,
            recommendation_type: "connection_pooling".to_string(),
            priority: Priority::Critical,
            description: "pool exhausted".to_string(),
            implementation: String::new(),
            estimated_cost: "low".to_string(),
            timeline: "1 week".to_string(),
            utilization: 0.95,
        }
    }

    fn report(overall: f64) -> ScalabilityReport {
        ScalabilityReport {
            overall_score: overall,
            performance_score: 100.0,
            ..ScalabilityReport::default()
        }
    }

    #[test]
    fn test_score_rule_wins_first() {
        let mut report = report(65.0);
        report.regressions.push(regression(RegressionSeverity::Critical));
        let decision = evaluate_gate(&report, &GateConfig::default());
        assert!(decision.should_fail);
        assert!(decision.reason.contains("65"));
        assert!(decision.reason.contains("70"));
    }

    #[test]
    fn test_score_at_threshold_passes_score_rule() {
        let decision = evaluate_gate(&report(70.0), &GateConfig::default());
        assert!(!decision.should_fail);
    }

    #[test]
    fn test_critical_recommendation_limit() {
        let mut report = report(95.0);
        report.recommendations = vec![critical_recommendation(); 2];
        assert!(!evaluate_gate(&report, &GateConfig::default()).should_fail);

        report.recommendations.push(critical_recommendation());
        let decision = evaluate_gate(&report, &GateConfig::default());
        assert!(decision.should_fail);
        assert!(decision.reason.starts_with("3 critical"));
        assert_eq!(decision.details.len(), 3);
    }

    #[test]
    fn test_warning_status_is_informational() {
        let mut report = report(95.0);
        report.regressions.push(regression(RegressionSeverity::Warning));
        let decision = evaluate_gate(&report, &GateConfig::default());
        assert!(!decision.should_fail);
        assert_eq!(decision.status, GateStatus::PassedWithWarnings);
        assert_eq!(decision.exit_code(), 0);
    }

    #[test]
    fn test_performance_score_source() {
        let mut report = report(95.0);
        report.performance_score = 50.0;
        let config = GateConfig {
            score_source: ScoreSource::Performance,
            ..GateConfig::default()
        };
        let decision = evaluate_gate(&report, &config);
        assert!(decision.should_fail);
        assert!(decision.reason.starts_with("Performance score 50.0"));
        assert_eq!(decision.exit_code(), 1);
    }
}
