use crate::catalog::{GraceWindow, TaskCatalog};
use crate::health::{CategoryWeights, ScoreWeights};
use crate::instance::TaskInstance;
use crate::system::SystemCategory;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine thresholds. Every field falls back to its default when absent
/// from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fallback due-soon window for instances whose definition is unknown.
    pub due_soon_days: i64,
    /// Fallback overdue-to-critical window for instances whose definition is unknown.
    pub critical_overdue_days: i64,
    pub extreme_cold_threshold_c: f64,
    pub weather_freshness_minutes: i64,
    pub system_alert_high_below: f64,
    pub system_alert_critical_below: f64,
    pub score_weights: ScoreWeights,
    pub category_weights: CategoryWeights,
    pub expected_service_days: BTreeMap<SystemCategory, i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            due_soon_days: GraceWindow::DEFAULT_DUE_SOON_DAYS,
            critical_overdue_days: GraceWindow::DEFAULT_CRITICAL_AFTER_DAYS,
            extreme_cold_threshold_c: -20.0,
            weather_freshness_minutes: 180,
            system_alert_high_below: 50.0,
            system_alert_critical_below: 30.0,
            score_weights: ScoreWeights::default(),
            category_weights: CategoryWeights::default(),
            expected_service_days: BTreeMap::from([
                (SystemCategory::Heating, 90),
                (SystemCategory::Water, 180),
                (SystemCategory::Ventilation, 90),
                (SystemCategory::Electrical, 30),
                (SystemCategory::Envelope, 180),
            ]),
        }
    }
}

impl EngineConfig {
    const FALLBACK_SERVICE_DAYS: i64 = 180;

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.due_soon_days < 0 || self.critical_overdue_days < 0 {
            return Err(ConfigError::Invalid(
                "grace windows must not be negative".into(),
            ));
        }
        if self.weather_freshness_minutes <= 0 {
            return Err(ConfigError::Invalid(format!(
                "weather_freshness_minutes must be positive (got {})",
                self.weather_freshness_minutes
            )));
        }
        if !self.extreme_cold_threshold_c.is_finite() {
            return Err(ConfigError::Invalid(
                "extreme_cold_threshold_c must be finite".into(),
            ));
        }
        if self.system_alert_critical_below >= self.system_alert_high_below {
            return Err(ConfigError::Invalid(format!(
                "system_alert_critical_below ({}) must be below system_alert_high_below ({})",
                self.system_alert_critical_below, self.system_alert_high_below
            )));
        }
        if let Some((category, days)) = self
            .expected_service_days
            .iter()
            .find(|(_, days)| **days <= 0)
        {
            return Err(ConfigError::Invalid(format!(
                "expected service interval for {category} must be positive (got {days})"
            )));
        }
        self.score_weights.validate().map_err(ConfigError::Invalid)?;
        self.category_weights
            .validate()
            .map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn weather_freshness(&self) -> Duration {
        Duration::minutes(self.weather_freshness_minutes)
    }

    pub fn expected_service_days(&self, category: SystemCategory) -> i64 {
        self.expected_service_days
            .get(&category)
            .copied()
            .unwrap_or(Self::FALLBACK_SERVICE_DAYS)
    }

    /// Due-soon window from the instance's own definition version.
    pub fn due_soon_window(&self, catalog: &TaskCatalog, instance: &TaskInstance) -> i64 {
        catalog
            .resolve(&instance.definition_id, instance.definition_version)
            .map(|definition| definition.grace.due_soon_days)
            .unwrap_or(self.due_soon_days)
    }

    /// Days overdue before an overdue alert escalates to critical.
    pub fn critical_window(&self, catalog: &TaskCatalog, instance: &TaskInstance) -> i64 {
        catalog
            .resolve(&instance.definition_id, instance.definition_version)
            .map(|definition| definition.grace.critical_after_days)
            .unwrap_or(self.critical_overdue_days)
    }
}
