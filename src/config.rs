// Analysis Configuration
// Tunable thresholds, weights and deductions, loaded from TOML with environment overrides.
// Every field has a default so an empty file is a valid configuration.

use crate::observability::DEFAULT_LOG_LEVEL;
use crate::types::{metric, Component, MetricKind};
use crate::validation::AnalysisError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub analysis: RuntimeConfig,
    pub regression: RegressionConfig,
    pub scoring: ScoringConfig,
    pub components: ComponentWeightsConfig,
    pub gate: GateConfig,
    pub projection: ProjectionConfig,
    pub recommendation: RecommendationConfig,
    /// Deduction overrides keyed "<component>.<bottleneck_type>"
    pub deductions: IndexMap<String, f64>,
    /// Baseline overrides keyed by metric name
    pub baselines: IndexMap<String, BaselineOverride>,
    /// Capacity ceiling overrides keyed by component name
    pub capacity: IndexMap<String, IndexMap<String, f64>>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Evaluate independent analyses on the rayon pool
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Fractional degradation that counts as a regression
    pub threshold: f64,
    /// Critical when degradation exceeds threshold * critical_multiplier
    pub critical_multiplier: f64,
}

impl RegressionConfig {
    pub fn critical_threshold(&self) -> f64 {
        self.threshold * self.critical_multiplier
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ComponentWeightsConfig {
    /// Weight per component name, used for the overall score
    pub weights: IndexMap<String, f64>,
}

impl ComponentWeightsConfig {
    /// Weights keyed by parsed component
    pub fn resolved(&self) -> Result<IndexMap<Component, f64>, AnalysisError> {
        self.weights
            .iter()
            .map(|(name, weight)| {
                let component = name.parse::<Component>().map_err(|reason| {
                    AnalysisError::invalid_config(format!("components.weights.{name}"), reason)
                })?;
                Ok((component, *weight))
            })
            .collect()
    }
}

/// Which score the CI gate compares against `min_score`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Overall,
    Performance,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_score: f64,
    pub max_critical_recommendations: usize,
    pub score_source: ScoreSource,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub multipliers: Vec<u32>,
    /// Fraction of a ceiling at which a projected value becomes an issue
    pub trigger_ratio: f64,
    /// Concurrent users served per database connection
    pub users_per_connection: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Utilization above which a recommendation rule fires unless it sets its own
    pub default_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BaselineOverride {
    pub target: f64,
    /// Required when the metric has no built-in baseline
    #[serde(default)]
    pub kind: Option<MetricKind>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for perfgate targets; --verbose, --quiet and RUST_LOG override it
    pub level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.20,
            critical_multiplier: 2.5,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = [
            (metric::API_RESPONSE_TIME_P95, 0.25),
            (metric::DB_QUERY_TIME_P95, 0.20),
            (metric::EMAIL_PROCESSING_TIME_P95, 0.15),
            (metric::API_ERROR_RATE, 0.15),
            (metric::API_THROUGHPUT_RPS, 0.10),
            (metric::PAYMENT_SUCCESS_RATE, 0.10),
            (metric::GDPR_RESPONSE_TIME_P95, 0.05),
        ];
        Self {
            weights: weights
                .into_iter()
                .map(|(name, weight)| (name.to_string(), weight))
                .collect(),
        }
    }
}

impl Default for ComponentWeightsConfig {
    fn default() -> Self {
        let weights = [
            (Component::ApiServer, 0.35),
            (Component::Database, 0.30),
            (Component::EmailService, 0.20),
            (Component::BillingService, 0.10),
            (Component::GdprService, 0.05),
        ];
        Self {
            weights: weights
                .into_iter()
                .map(|(component, weight)| (component.as_str().to_string(), weight))
                .collect(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_score: 70.0,
            max_critical_recommendations: 2,
            score_source: ScoreSource::Overall,
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            multipliers: vec![2, 5, 10, 20],
            trigger_ratio: 0.8,
            users_per_connection: 10.0,
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.7,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis: RuntimeConfig::default(),
            regression: RegressionConfig::default(),
            scoring: ScoringConfig::default(),
            components: ComponentWeightsConfig::default(),
            gate: GateConfig::default(),
            projection: ProjectionConfig::default(),
            recommendation: RecommendationConfig::default(),
            deductions: IndexMap::new(),
            baselines: IndexMap::new(),
            capacity: IndexMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: AnalysisConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from PERFGATE_CONFIG (if set) and environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("PERFGATE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply PERFGATE_* environment variable overrides
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(threshold) = std::env::var("PERFGATE_REGRESSION_THRESHOLD") {
            self.regression.threshold = threshold.parse()?;
        }
        if let Ok(min_score) = std::env::var("PERFGATE_MIN_SCORE") {
            self.gate.min_score = min_score.parse()?;
        }
        if let Ok(parallel) = std::env::var("PERFGATE_PARALLEL") {
            self.analysis.parallel = parallel.parse()?;
        }
        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AnalysisError> {
        positive("regression.threshold", self.regression.threshold)?;
        positive(
            "regression.critical_multiplier",
            self.regression.critical_multiplier,
        )?;
        if self.regression.critical_multiplier < 1.0 {
            return Err(AnalysisError::invalid_config(
                "regression.critical_multiplier",
                "must be at least 1.0 so critical implies warning",
            ));
        }

        for (name, weight) in &self.scoring.weights {
            non_negative(&format!("scoring.weights.{name}"), *weight)?;
        }
        for (component, weight) in self.components.resolved()? {
            non_negative(&format!("components.weights.{component}"), weight)?;
        }
        if self.components.weights.values().sum::<f64>() <= 0.0 {
            return Err(AnalysisError::invalid_config(
                "components.weights",
                "at least one component weight must be positive",
            ));
        }

        if !(0.0..=100.0).contains(&self.gate.min_score) {
            return Err(AnalysisError::invalid_config(
                "gate.min_score",
                format!("must be within [0, 100], got {}", self.gate.min_score),
            ));
        }

        if self.projection.multipliers.is_empty() {
            return Err(AnalysisError::invalid_config(
                "projection.multipliers",
                "at least one multiplier is required",
            ));
        }
        if self.projection.multipliers.contains(&0) {
            return Err(AnalysisError::invalid_config(
                "projection.multipliers",
                "multipliers must be positive",
            ));
        }
        positive("projection.trigger_ratio", self.projection.trigger_ratio)?;
        positive(
            "projection.users_per_connection",
            self.projection.users_per_connection,
        )?;
        positive(
            "recommendation.default_threshold",
            self.recommendation.default_threshold,
        )?;

        for (key, deduction) in &self.deductions {
            if !key.contains('.') {
                return Err(AnalysisError::invalid_config(
                    format!("deductions.{key}"),
                    "keys must look like <component>.<bottleneck_type>",
                ));
            }
            non_negative(&format!("deductions.{key}"), *deduction)?;
        }
        for (name, baseline) in &self.baselines {
            if !baseline.target.is_finite() {
                return Err(AnalysisError::invalid_config(
                    format!("baselines.{name}.target"),
                    "must be finite",
                ));
            }
        }
        for (component, limits) in &self.capacity {
            component.parse::<Component>().map_err(|reason| {
                AnalysisError::invalid_config(format!("capacity.{component}"), reason)
            })?;
            for (key, value) in limits {
                positive(&format!("capacity.{component}.{key}"), *value)?;
            }
        }

        if self.logging.level.parse::<LevelFilter>().is_err() {
            return Err(AnalysisError::invalid_config(
                "logging.level",
                format!("unknown level {:?}", self.logging.level),
            ));
        }

        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::invalid_config(
            field,
            format!("must be a positive number, got {value}"),
        ))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::invalid_config(
            field,
            format!("must be a non-negative number, got {value}"),
        ))
    }
}
