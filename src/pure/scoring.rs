// Performance Scoring
// Penalty accumulation over weighted metrics, plus the weighted mean used for
// the overall component score. All scores live in [0, 100].

use crate::baseline::{BaselineEntry, BaselineRegistry};
use crate::types::{Component, MetricKind, MetricsSnapshot};
use crate::validation::{SkipReason, SkippedMetric};
use indexmap::IndexMap;

/// Result of scoring one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    /// Per-metric scores that contributed, in weight order
    pub metric_scores: IndexMap<String, f64>,
    pub skipped: Vec<SkippedMetric>,
}

/// Clamp into the score range, rounding away float noise below 1e-9
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    let rounded = (score * 1e9).round() / 1e9;
    rounded.clamp(0.0, 100.0)
}

/// Quality of a single metric relative to its baseline, in [0, 100]
pub fn metric_score(entry: &BaselineEntry, current: f64) -> f64 {
    let baseline = entry.target_value;
    let raw = match entry.kind {
        MetricKind::Duration => 100.0 - (current - baseline) / baseline * 100.0,
        MetricKind::Throughput | MetricKind::SuccessRate => current / baseline * 100.0,
        MetricKind::ErrorRate => 100.0 - current / baseline * 100.0,
    };
    clamp_score(raw)
}

/// Start at 100 and subtract each weighted metric's shortfall
pub fn score_snapshot(
    snapshot: &MetricsSnapshot,
    baselines: &BaselineRegistry,
    weights: &IndexMap<String, f64>,
) -> ScoreOutcome {
    let mut score = 100.0;
    let mut metric_scores = IndexMap::new();
    let mut skipped = Vec::new();

    for (name, weight) in weights {
        let Some(entry) = baselines.get(name) else {
            skipped.push(SkippedMetric::new(name.clone(), SkipReason::InvalidBaseline));
            continue;
        };
        if !entry.is_evaluable() {
            skipped.push(SkippedMetric::new(name.clone(), SkipReason::InvalidBaseline));
            continue;
        }
        let Some(current) = snapshot.get(name) else {
            skipped.push(SkippedMetric::new(name.clone(), SkipReason::MissingMetric));
            continue;
        };

        let value = metric_score(entry, current);
        score -= (100.0 - value) * weight;
        metric_scores.insert(name.clone(), value);
    }

    ScoreOutcome {
        score: clamp_score(score),
        metric_scores,
        skipped,
    }
}

/// Weighted mean over the components that produced a score.
/// Components without a score are excluded from numerator and denominator.
pub fn weighted_component_mean(
    scores: &IndexMap<Component, f64>,
    weights: &IndexMap<Component, f64>,
) -> Option<f64> {
    let (total, weight_sum) = scores
        .iter()
        .filter_map(|(component, score)| weights.get(component).map(|w| (*score, *w)))
        .fold((0.0, 0.0), |(total, weight_sum), (score, weight)| {
            (total + score * weight, weight_sum + weight)
        });

    if weight_sum > 0.0 {
        Some(clamp_score(total / weight_sum))
    } else {
        None
    }
}
