use crate::catalog::TaskCatalog;
use crate::config::EngineConfig;
use crate::instance::TaskInstance;
use crate::status::TaskStatus;
use crate::system::{InspectionOutcome, System, SystemCategory, SystemId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const EPSILON: f64 = 1e-6;

/// Share of the 100-point scale each signal can take away. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub overdue: f64,
    pub recency: f64,
    pub due_soon: f64,
    pub inspection: f64,
    /// Points deducted per overdue task, up to the overdue cap.
    #[serde(default = "ScoreWeights::default_overdue_points")]
    pub points_per_overdue: f64,
    /// Points deducted per due-soon task, up to the due-soon cap.
    #[serde(default = "ScoreWeights::default_due_soon_points")]
    pub points_per_due_soon: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            overdue: 0.40,
            recency: 0.30,
            due_soon: 0.15,
            inspection: 0.15,
            points_per_overdue: Self::default_overdue_points(),
            points_per_due_soon: Self::default_due_soon_points(),
        }
    }
}

impl ScoreWeights {
    fn default_overdue_points() -> f64 {
        10.0
    }

    fn default_due_soon_points() -> f64 {
        5.0
    }

    pub fn validate(&self) -> Result<(), String> {
        let parts = [
            ("overdue", self.overdue),
            ("recency", self.recency),
            ("due_soon", self.due_soon),
            ("inspection", self.inspection),
            ("points_per_overdue", self.points_per_overdue),
            ("points_per_due_soon", self.points_per_due_soon),
        ];
        for (name, value) in parts {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("score weight {name} must be a non-negative number (got {value})"));
            }
        }
        let total = self.overdue + self.recency + self.due_soon + self.inspection;
        if (total - 1.0).abs() > EPSILON {
            return Err(format!("score weights must sum to 1.0 (got {total:.4})"));
        }
        Ok(())
    }
}

/// Per-category weights for the whole-home composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryWeights(BTreeMap<SystemCategory, f64>);

impl Default for CategoryWeights {
    /// Heating-heavy defaults for cold climates.
    fn default() -> Self {
        Self(BTreeMap::from([
            (SystemCategory::Heating, 0.35),
            (SystemCategory::Water, 0.25),
            (SystemCategory::Ventilation, 0.15),
            (SystemCategory::Electrical, 0.15),
            (SystemCategory::Envelope, 0.10),
        ]))
    }
}

impl CategoryWeights {
    pub fn new<I>(weights: I) -> Self
    where
        I: IntoIterator<Item = (SystemCategory, f64)>,
    {
        Self(weights.into_iter().collect())
    }

    pub fn weight(&self, category: SystemCategory) -> f64 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (category, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(format!(
                    "category weight for {category} must be a non-negative number (got {weight})"
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub overdue_penalty: f64,
    pub due_soon_penalty: f64,
    pub recency_penalty: f64,
    pub inspection_penalty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.overdue_penalty + self.due_soon_penalty + self.recency_penalty + self.inspection_penalty
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemScore {
    pub system_id: SystemId,
    pub category: SystemCategory,
    /// `None` when the system has no data to score.
    pub score: Option<f64>,
    pub overdue_count: usize,
    pub due_soon_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

/// Scores systems from their open instances, service history and inspections.
/// Holds no state of its own; the same inputs always give the same score.
pub struct HealthScorer<'a> {
    catalog: &'a TaskCatalog,
    config: &'a EngineConfig,
}

impl<'a> HealthScorer<'a> {
    pub fn new(catalog: &'a TaskCatalog, config: &'a EngineConfig) -> Self {
        Self { catalog, config }
    }

    pub fn system_score(
        &self,
        system: &System,
        instances: &[TaskInstance],
        as_of: NaiveDate,
    ) -> SystemScore {
        let open: Vec<&TaskInstance> = instances
            .iter()
            .filter(|instance| instance.system_id == system.id && instance.is_open())
            .collect();

        let mut overdue_count = 0;
        let mut due_soon_count = 0;
        for instance in &open {
            let window = self.config.due_soon_window(self.catalog, instance);
            match instance.status(window, as_of) {
                TaskStatus::Overdue => overdue_count += 1,
                TaskStatus::DueSoon => due_soon_count += 1,
                TaskStatus::Upcoming => {}
            }
        }

        let has_data = system.install_date.is_some()
            || system.last_service_date.is_some()
            || !system.inspections.is_empty()
            || !open.is_empty();
        if !has_data {
            return SystemScore {
                system_id: system.id.clone(),
                category: system.category,
                score: None,
                overdue_count,
                due_soon_count,
                breakdown: None,
            };
        }

        let weights = &self.config.score_weights;
        let breakdown = ScoreBreakdown {
            overdue_penalty: (weights.points_per_overdue * overdue_count as f64)
                .min(weights.overdue * 100.0),
            due_soon_penalty: (weights.points_per_due_soon * due_soon_count as f64)
                .min(weights.due_soon * 100.0),
            recency_penalty: weights.recency * 100.0 * self.recency_ratio(system, as_of),
            inspection_penalty: weights.inspection * 100.0 * inspection_factor(system),
        };

        SystemScore {
            system_id: system.id.clone(),
            category: system.category,
            score: Some((100.0 - breakdown.total()).clamp(0.0, 100.0)),
            overdue_count,
            due_soon_count,
            breakdown: Some(breakdown),
        }
    }

    /// 0 right after service, 1 once the expected interval has elapsed.
    /// A system that was never serviced counts as fully lapsed.
    fn recency_ratio(&self, system: &System, as_of: NaiveDate) -> f64 {
        let Some(reference) = system.service_reference_date() else {
            return 1.0;
        };
        let expected = self.config.expected_service_days(system.category);
        if expected <= 0 {
            return 1.0;
        }
        let elapsed = (as_of - reference).num_days().max(0) as f64;
        (elapsed / expected as f64).min(1.0)
    }
}

fn inspection_factor(system: &System) -> f64 {
    match system.latest_inspection().map(|record| record.outcome) {
        Some(InspectionOutcome::Fail) => 1.0,
        Some(InspectionOutcome::NeedsAttention) => 0.5,
        Some(InspectionOutcome::Pass) | None => 0.0,
    }
}

/// Weighted mean of `(score, weight)` pairs, skipping zero weights.
pub fn weighted_mean<I>(entries: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (numerator, denominator) = entries
        .into_iter()
        .filter(|(_, weight)| *weight > 0.0)
        .fold((0.0, 0.0), |(num, den), (score, weight)| {
            (num + score * weight, den + weight)
        });
    if denominator <= 0.0 {
        return None;
    }
    Some((numerator / denominator).clamp(0.0, 100.0))
}

/// Composite home score. Unscored systems are left out of both the
/// numerator and the denominator rather than counted as zero.
pub fn home_score(scores: &[SystemScore], weights: &CategoryWeights) -> Option<f64> {
    weighted_mean(
        scores
            .iter()
            .filter_map(|entry| entry.score.map(|score| (score, weights.weight(entry.category)))),
    )
}
