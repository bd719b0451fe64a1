// Capacity Model Registry
// Maximum sustainable values for each component's resource dimensions.

use crate::types::Component;
use crate::validation::AnalysisError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Capacity dimension keys
pub mod limit {
    pub const MAX_RPS: &str = "max_rps";
    pub const MAX_CONCURRENT_USERS: &str = "max_concurrent_users";
    pub const MAX_RESPONSE_TIME_MS: &str = "max_response_time_ms";
    pub const MAX_CPU_PERCENT: &str = "max_cpu_percent";
    pub const MAX_MEMORY_MB: &str = "max_memory_mb";

    pub const MAX_CONNECTIONS: &str = "max_connections";
    pub const MAX_QUERY_TIME_MS: &str = "max_query_time_ms";

    pub const MAX_EMAILS_PER_MINUTE: &str = "max_emails_per_minute";
    pub const MAX_PROCESSING_TIME_MS: &str = "max_processing_time_ms";
    pub const MAX_QUEUE_DEPTH: &str = "max_queue_depth";

    pub const MAX_WEBHOOKS_PER_MINUTE: &str = "max_webhooks_per_minute";
    pub const MAX_WEBHOOK_TIME_MS: &str = "max_webhook_time_ms";
    pub const MAX_USAGE_TRACKING_MS: &str = "max_usage_tracking_ms";

    pub const MAX_EXPORT_MINUTES: &str = "max_export_minutes";
    pub const MAX_CONCURRENT_EXPORTS: &str = "max_concurrent_exports";
}

/// Ceilings for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityModel {
    pub component: Component,
    pub limits: IndexMap<String, f64>,
}

impl CapacityModel {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            limits: IndexMap::new(),
        }
    }

    pub fn with_limit(mut self, key: impl Into<String>, value: f64) -> Self {
        self.limits.insert(key.into(), value);
        self
    }

    /// A usable ceiling: present and strictly positive
    pub fn ceiling(&self, key: &str) -> Option<f64> {
        self.limits.get(key).copied().filter(|v| *v > 0.0)
    }
}

/// Capacity models for all components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRegistry {
    models: IndexMap<Component, CapacityModel>,
}

impl CapacityRegistry {
    pub fn empty() -> Self {
        Self {
            models: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, model: CapacityModel) {
        self.models.insert(model.component, model);
    }

    pub fn get(&self, component: Component) -> Option<&CapacityModel> {
        self.models.get(&component)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapacityModel> {
        self.models.values()
    }

    /// Override a single ceiling, creating the component's model if needed
    pub fn set_limit(
        &mut self,
        component: Component,
        key: &str,
        value: f64,
    ) -> Result<(), AnalysisError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(AnalysisError::invalid_config(
                format!("capacity.{component}.{key}"),
                format!("ceiling must be a positive number, got {value}"),
            ));
        }
        self.models
            .entry(component)
            .or_insert_with(|| CapacityModel::new(component))
            .limits
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Reference ceilings for the service under test
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            CapacityModel::new(Component::ApiServer)
                .with_limit(limit::MAX_RPS, 1000.0)
                .with_limit(limit::MAX_CONCURRENT_USERS, 5000.0)
                .with_limit(limit::MAX_RESPONSE_TIME_MS, 3000.0)
                .with_limit(limit::MAX_CPU_PERCENT, 80.0)
                .with_limit(limit::MAX_MEMORY_MB, 2048.0),
        );
        registry.insert(
            CapacityModel::new(Component::Database)
                .with_limit(limit::MAX_CONNECTIONS, 100.0)
                .with_limit(limit::MAX_QUERY_TIME_MS, 500.0),
        );
        registry.insert(
            CapacityModel::new(Component::EmailService)
                .with_limit(limit::MAX_EMAILS_PER_MINUTE, 1000.0)
                .with_limit(limit::MAX_PROCESSING_TIME_MS, 5000.0)
                .with_limit(limit::MAX_QUEUE_DEPTH, 10_000.0),
        );
        registry.insert(
            CapacityModel::new(Component::BillingService)
                .with_limit(limit::MAX_WEBHOOKS_PER_MINUTE, 500.0)
                .with_limit(limit::MAX_WEBHOOK_TIME_MS, 2000.0)
                .with_limit(limit::MAX_USAGE_TRACKING_MS, 500.0),
        );
        registry.insert(
            CapacityModel::new(Component::GdprService)
                .with_limit(limit::MAX_EXPORT_MINUTES, 5.0)
                .with_limit(limit::MAX_CONCURRENT_EXPORTS, 10.0),
        );
        registry
    }
}

impl Default for CapacityRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_component() {
        let registry = CapacityRegistry::with_defaults();
        for component in Component::ALL {
            assert!(registry.get(component).is_some(), "missing {component}");
        }
        let api = registry.get(Component::ApiServer).unwrap();
        assert_eq!(api.ceiling(limit::MAX_RPS), Some(1000.0));
    }

    #[test]
    fn test_zero_ceiling_is_unusable() {
        let model = CapacityModel::new(Component::Database).with_limit(limit::MAX_CONNECTIONS, 0.0);
        assert_eq!(model.ceiling(limit::MAX_CONNECTIONS), None);
        assert_eq!(model.ceiling("missing"), None);
    }

    #[test]
    fn test_set_limit_validates_and_creates_model() {
        let mut registry = CapacityRegistry::empty();
        registry
            .set_limit(Component::Database, limit::MAX_CONNECTIONS, 250.0)
            .unwrap();
        assert_eq!(
            registry
                .get(Component::Database)
                .unwrap()
                .ceiling(limit::MAX_CONNECTIONS),
            Some(250.0)
        );
        assert!(registry
            .set_limit(Component::Database, limit::MAX_CONNECTIONS, -5.0)
            .is_err());
    }
}
