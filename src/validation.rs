// Validation Layer
// Error taxonomy for the analysis engine and shape validation of incoming snapshots.
// Only structural problems are errors; per-metric gaps are recorded as SkippedMetric.

use crate::types::{Component, MetricsSnapshot};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Fatal analysis errors
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Malformed snapshot: {field} - {reason}")]
    MalformedSnapshot { field: String, reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Invalid baseline for {metric}: {reason}")]
    InvalidBaseline { metric: String, reason: String },

    #[error("Failed to parse snapshot JSON")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedSnapshot {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Why a single evaluation could not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The metric was not present in the snapshot
    MissingMetric,
    /// The baseline target was zero or negative
    InvalidBaseline,
    /// The capacity ceiling was missing, zero or negative
    InvalidCapacity,
}

/// An evaluation that was skipped instead of failing the run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkippedMetric {
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<Component>,
    pub reason: SkipReason,
}

impl SkippedMetric {
    pub fn new(metric: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            metric: metric.into(),
            component: None,
            reason,
        }
    }

    pub fn for_component(
        component: Component,
        metric: impl Into<String>,
        reason: SkipReason,
    ) -> Self {
        Self {
            metric: metric.into(),
            component: Some(component),
            reason,
        }
    }
}

/// Merge skip lists, keeping first-seen order and dropping duplicates
pub fn merge_skipped(lists: impl IntoIterator<Item = Vec<SkippedMetric>>) -> Vec<SkippedMetric> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for skipped in list {
            if seen.insert(skipped.clone()) {
                merged.push(skipped);
            }
        }
    }
    merged
}

const TEST_TYPE_FIELD: &str = "test_type";
const DURATION_FIELD: &str = "duration_ms";
const VIRTUAL_USERS_FIELD: &str = "virtual_users";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Parse a flat JSON object into a snapshot
///
/// `known_metrics` are the names some analysis actually reads. A non-numeric value
/// under one of those names is fatal; unknown non-numeric fields are ignored.
pub fn parse_snapshot(
    value: &Value,
    known_metrics: &BTreeSet<String>,
) -> Result<MetricsSnapshot, AnalysisError> {
    let object = value
        .as_object()
        .ok_or_else(|| AnalysisError::malformed("<root>", "snapshot must be a JSON object"))?;

    let test_type = match object.get(TEST_TYPE_FIELD) {
        None | Some(Value::Null) => "unspecified".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(AnalysisError::malformed(
                TEST_TYPE_FIELD,
                format!("expected a string, found {}", json_type_name(other)),
            ))
        }
    };

    let duration_ms = descriptive_number(object.get(DURATION_FIELD), DURATION_FIELD)?;
    let virtual_users = descriptive_number(object.get(VIRTUAL_USERS_FIELD), VIRTUAL_USERS_FIELD)?;

    let captured_at = match object.get(TIMESTAMP_FIELD) {
        None | Some(Value::Null) => Utc::now(),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| AnalysisError::malformed(TIMESTAMP_FIELD, e.to_string()))?,
        Some(other) => {
            return Err(AnalysisError::malformed(
                TIMESTAMP_FIELD,
                format!("expected an RFC3339 string, found {}", json_type_name(other)),
            ))
        }
    };

    let mut metrics = IndexMap::new();
    for (name, raw) in object {
        if matches!(
            name.as_str(),
            TEST_TYPE_FIELD | DURATION_FIELD | VIRTUAL_USERS_FIELD | TIMESTAMP_FIELD
        ) {
            continue;
        }
        match raw {
            Value::Null => {}
            Value::Number(n) => {
                let value = n.as_f64().ok_or_else(|| {
                    AnalysisError::malformed(name.clone(), "number is not representable as f64")
                })?;
                metrics.insert(name.clone(), value);
            }
            other if known_metrics.contains(name) => {
                return Err(AnalysisError::malformed(
                    name.clone(),
                    format!("expected a number, found {}", json_type_name(other)),
                ));
            }
            _ => debug!(field = %name, "Ignoring non-numeric snapshot field"),
        }
    }

    Ok(MetricsSnapshot::from_parts(
        test_type,
        duration_ms,
        virtual_users,
        captured_at,
        metrics,
    ))
}

impl MetricsSnapshot {
    /// Parse a snapshot from an already-decoded JSON value
    pub fn from_json_value(
        value: &Value,
        known_metrics: &BTreeSet<String>,
    ) -> Result<Self, AnalysisError> {
        parse_snapshot(value, known_metrics)
    }

    /// Parse a snapshot from JSON text
    pub fn from_json_str(
        input: &str,
        known_metrics: &BTreeSet<String>,
    ) -> Result<Self, AnalysisError> {
        let value: Value = serde_json::from_str(input)?;
        parse_snapshot(&value, known_metrics)
    }
}

fn descriptive_number(value: Option<&Value>, field: &str) -> Result<f64, AnalysisError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(value) if value.is_finite() && value >= 0.0 => Ok(value),
            Some(value) => Err(AnalysisError::malformed(
                field,
                format!("must be a non-negative number, got {value}"),
            )),
            None => Err(AnalysisError::malformed(
                field,
                "number is not representable as f64",
            )),
        },
        Some(other) => Err(AnalysisError::malformed(
            field,
            format!("expected a number, found {}", json_type_name(other)),
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn known() -> BTreeSet<String> {
        ["api_response_time_p95".to_string()].into_iter().collect()
    }

    #[test]
    fn test_parse_flat_snapshot() {
        let value = json!({
            "test_type": "load",
            "duration_ms": 60000,
            "virtual_users": 50,
            "timestamp": "2026-01-02T03:04:05Z",
            "api_response_time_p95": 420.5,
            "custom_metric": 3,
            "notes": "ignored",
            "absent": null
        });

        let snapshot = parse_snapshot(&value, &known()).unwrap();
        assert_eq!(snapshot.test_type(), "load");
        assert_eq!(snapshot.duration_ms(), 60000.0);
        assert_eq!(snapshot.virtual_users(), 50.0);
        assert_eq!(snapshot.get("api_response_time_p95"), Some(420.5));
        assert_eq!(snapshot.get("custom_metric"), Some(3.0));
        assert!(!snapshot.contains("notes"));
        assert!(!snapshot.contains("absent"));
        assert_eq!(snapshot.captured_at().to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = parse_snapshot(&json!([1, 2, 3]), &known()).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_non_numeric_known_metric_is_malformed() {
        let value = json!({ "api_response_time_p95": "fast" });
        let err = parse_snapshot(&value, &known()).unwrap_err();
        match err {
            AnalysisError::MalformedSnapshot { field, .. } => {
                assert_eq!(field, "api_response_time_p95")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_descriptive_field_is_malformed() {
        let value = json!({ "virtual_users": "fifty" });
        assert!(parse_snapshot(&value, &known()).is_err());
    }

    #[test]
    fn test_negative_descriptive_field_is_malformed() {
        for field in [VIRTUAL_USERS_FIELD, DURATION_FIELD] {
            let value = json!({ field: -5000, "api_response_time_p95": 300 });
            match parse_snapshot(&value, &known()).unwrap_err() {
                AnalysisError::MalformedSnapshot { field: reported, .. } => {
                    assert_eq!(reported, field)
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        let zero = parse_snapshot(&json!({ "virtual_users": 0 }), &known()).unwrap();
        assert_eq!(zero.virtual_users(), 0.0);
    }

    #[test]
    fn test_missing_descriptive_fields_default() {
        let snapshot = parse_snapshot(&json!({}), &known()).unwrap();
        assert_eq!(snapshot.test_type(), "unspecified");
        assert_eq!(snapshot.virtual_users(), 0.0);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_serialized_snapshot_parses_back() {
        let value = json!({
            "test_type": "soak",
            "duration_ms": 1000,
            "virtual_users": 5,
            "timestamp": "2026-01-02T03:04:05Z",
            "api_response_time_p95": 300.0
        });
        let snapshot = parse_snapshot(&value, &known()).unwrap();
        let text = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(MetricsSnapshot::from_json_str(&text, &known()).unwrap(), snapshot);
    }

    #[test]
    fn test_merge_skipped_deduplicates() {
        let a = vec![SkippedMetric::new("x", SkipReason::MissingMetric)];
        let b = vec![
            SkippedMetric::new("x", SkipReason::MissingMetric),
            SkippedMetric::new("y", SkipReason::InvalidBaseline),
        ];
        let merged = merge_skipped([a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].metric, "y");
    }
}
