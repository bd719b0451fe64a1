// Centralized Observability Infrastructure for Perfgate
// Structured logging, metric recording and telemetry emission.
// Analyses never touch counters directly: they return AnalysisEvents and
// emit_events turns those into log lines and metric records.

use crate::types::{Component, RegressionSeverity, Severity};
use crate::validation::SkipReason;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize the logging and tracing infrastructure
/// This should be called once at application startup
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    init_logging_with_default(verbose, quiet, DEFAULT_LOG_LEVEL)
}

/// Level used for perfgate targets when no flag, config or RUST_LOG says otherwise
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Filter directive for the given flags, with `default_level` applying to perfgate
/// targets when neither flag is set
pub fn default_filter(verbose: bool, quiet: bool, default_level: &str) -> String {
    if quiet {
        "error".to_string()
    } else if verbose {
        "perfgate=debug,info".to_string()
    } else {
        format!("perfgate={default_level},error")
    }
}

/// Initialize logging with a configured default level; the flags and RUST_LOG still win
pub fn init_logging_with_default(verbose: bool, quiet: bool, default_level: &str) -> Result<()> {
    let filter_level = EnvFilter::try_new(default_filter(verbose, quiet, default_level))?;

    // --quiet always wins over RUST_LOG
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    // Logs go to stderr so stdout stays clean for report JSON
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("Perfgate observability initialized");
            }
            Ok(())
        }
        Err(_) => {
            // Already initialized, which is fine in test environments
            Ok(())
        }
    }
}

/// Something an analysis stage observed, for optional telemetry emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    RegressionDetected {
        metric: String,
        severity: RegressionSeverity,
        degradation_pct: f64,
    },
    BottleneckDetected {
        component: Component,
        bottleneck_type: String,
        severity: Severity,
    },
    ProjectedIssue {
        component: Component,
        multiplier: u32,
        utilization: f64,
    },
    MetricSkipped {
        metric: String,
        reason: SkipReason,
    },
}

/// Metric types for performance monitoring
#[derive(Debug, Clone)]
pub enum MetricType {
    Counter {
        name: &'static str,
        value: u64,
    },
    Timer {
        name: &'static str,
        duration: Duration,
    },
}

/// Operation context for tracing an analysis run
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Record a metric
pub fn record_metric(metric: MetricType) {
    match metric {
        MetricType::Counter { name, value } => {
            debug!("metric.counter {} = {}", name, value);
        }
        MetricType::Timer { name, duration } => {
            debug!("metric.timer {} = {:?}", name, duration);
        }
    }
}

/// Counts of emitted events by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub regressions: u64,
    pub critical_regressions: u64,
    pub bottlenecks: u64,
    pub projected_issues: u64,
    pub skipped_metrics: u64,
}

/// Telemetry emission step: log every event and record aggregate counters
#[instrument(skip(ctx, events), fields(trace_id = %ctx.trace_id, events = events.len()))]
pub fn emit_events(ctx: &OperationContext, events: &[AnalysisEvent]) -> EventSummary {
    let mut summary = EventSummary::default();

    for event in events {
        match event {
            AnalysisEvent::RegressionDetected {
                metric,
                severity,
                degradation_pct,
            } => {
                summary.regressions += 1;
                if *severity == RegressionSeverity::Critical {
                    summary.critical_regressions += 1;
                }
                warn!(
                    trace_id = %ctx.trace_id,
                    metric = %metric,
                    severity = %severity,
                    degradation_pct = degradation_pct,
                    "Performance regression detected"
                );
            }
            AnalysisEvent::BottleneckDetected {
                component,
                bottleneck_type,
                severity,
            } => {
                summary.bottlenecks += 1;
                info!(
                    trace_id = %ctx.trace_id,
                    component = %component,
                    bottleneck_type = %bottleneck_type,
                    severity = %severity,
                    "Bottleneck detected"
                );
            }
            AnalysisEvent::ProjectedIssue {
                component,
                multiplier,
                utilization,
            } => {
                summary.projected_issues += 1;
                debug!(
                    trace_id = %ctx.trace_id,
                    component = %component,
                    multiplier = multiplier,
                    utilization = utilization,
                    "Projected capacity issue"
                );
            }
            AnalysisEvent::MetricSkipped { metric, reason } => {
                summary.skipped_metrics += 1;
                debug!(
                    trace_id = %ctx.trace_id,
                    metric = %metric,
                    reason = ?reason,
                    "Evaluation skipped"
                );
            }
        }
    }

    record_metric(MetricType::Counter {
        name: "analysis.regressions",
        value: summary.regressions,
    });
    record_metric(MetricType::Counter {
        name: "analysis.regressions.critical",
        value: summary.critical_regressions,
    });
    record_metric(MetricType::Counter {
        name: "analysis.bottlenecks",
        value: summary.bottlenecks,
    });
    record_metric(MetricType::Counter {
        name: "analysis.projected_issues",
        value: summary.projected_issues,
    });
    record_metric(MetricType::Counter {
        name: "analysis.skipped_metrics",
        value: summary.skipped_metrics,
    });

    summary
}

/// Structured error logging with context
#[instrument]
pub fn log_error_with_context(error: &anyhow::Error, ctx: &OperationContext) {
    let error_chain = error
        .chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");

    error!(
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        operation = %ctx.operation,
        error_chain = %error_chain,
        "Error occurred during operation"
    );
}

/// Performance timer for measuring operation duration
pub struct PerfTimer {
    name: String,
    start: Instant,
    ctx: OperationContext,
}

impl PerfTimer {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let ctx = OperationContext::new(&name);
        debug!(
            trace_id = %ctx.trace_id,
            span_id = %ctx.span_id,
            "Timer started: {}", name
        );
        Self {
            name,
            start: Instant::now(),
            ctx,
        }
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        debug!(
            trace_id = %self.ctx.trace_id,
            span_id = %self.ctx.span_id,
            elapsed_ms = elapsed.as_millis(),
            "Timer completed: {}", self.name
        );
        record_metric(MetricType::Timer {
            name: "analysis.duration",
            duration: elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_context_creation() {
        let ctx = OperationContext::new("analyze_snapshot");
        assert_eq!(ctx.operation, "analyze_snapshot");
        assert!(ctx.parent_span_id.is_none());

        let child = ctx.child("detect_regressions");
        assert_eq!(child.trace_id, ctx.trace_id);
        assert_eq!(child.parent_span_id, Some(ctx.span_id));
    }

    #[test]
    fn test_emit_events_counts_by_kind() {
        let ctx = OperationContext::new("emit");
        let events = vec![
            AnalysisEvent::RegressionDetected {
                metric: "db_query_time_p95".to_string(),
                severity: RegressionSeverity::Critical,
                degradation_pct: 80.0,
            },
            AnalysisEvent::RegressionDetected {
                metric: "api_response_time_p95".to_string(),
                severity: RegressionSeverity::Warning,
                degradation_pct: 25.0,
            },
            AnalysisEvent::BottleneckDetected {
                component: Component::Database,
                bottleneck_type: "slow_queries".to_string(),
                severity: Severity::High,
            },
            AnalysisEvent::MetricSkipped {
                metric: "gdpr_export_duration".to_string(),
                reason: SkipReason::MissingMetric,
            },
        ];

        let summary = emit_events(&ctx, &events);
        assert_eq!(summary.regressions, 2);
        assert_eq!(summary.critical_regressions, 1);
        assert_eq!(summary.bottlenecks, 1);
        assert_eq!(summary.projected_issues, 0);
        assert_eq!(summary.skipped_metrics, 1);
    }

    #[test]
    fn test_emit_events_is_stateless() {
        let ctx = OperationContext::new("emit");
        let events = vec![AnalysisEvent::ProjectedIssue {
            component: Component::ApiServer,
            multiplier: 20,
            utilization: 1.0,
        }];
        assert_eq!(emit_events(&ctx, &events), emit_events(&ctx, &events));
    }

    #[test]
    fn test_perf_timer_drops_cleanly() {
        let _timer = PerfTimer::new("test_timer");
    }

    #[test]
    fn test_logging_level_configurations() {
        assert_eq!(default_filter(true, false, "info"), "perfgate=debug,info");
        assert_eq!(default_filter(false, true, "debug"), "error");
        assert_eq!(default_filter(false, false, DEFAULT_LOG_LEVEL), "perfgate=warn,error");
        assert_eq!(default_filter(false, false, "trace"), "perfgate=trace,error");

        for (verbose, quiet) in [(false, false), (true, false), (false, true)] {
            let directive = default_filter(verbose, quiet, "info");
            assert!(
                EnvFilter::try_new(&directive).is_ok(),
                "Failed to create filter from {directive}"
            );
        }
    }
}
