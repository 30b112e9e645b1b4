use crate::calendar::SeasonalAnchor;
use crate::system::SystemCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub type DefinitionId = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("invalid definition {id} v{version}: {reason}")]
    InvalidDefinition {
        id: DefinitionId,
        version: u32,
        reason: String,
    },
    #[error("malformed calendar anchor: {0}")]
    MalformedAnchor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// How often a task comes due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Fixed number of days after the last completion.
    Interval { days: i64 },
    /// Once a year at a calendar anchor.
    Seasonal { anchor: SeasonalAnchor },
}

impl Recurrence {
    pub fn every_days(days: i64) -> Self {
        Recurrence::Interval { days }
    }

    pub fn seasonal(anchor: &str) -> Result<Self, CatalogError> {
        Ok(Recurrence::Seasonal {
            anchor: anchor.parse()?,
        })
    }

    /// Nominal spacing between occurrences, in days.
    pub fn nominal_days(&self) -> i64 {
        match self {
            Recurrence::Interval { days } => *days,
            Recurrence::Seasonal { .. } => 365,
        }
    }
}

/// Windows around a due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceWindow {
    /// Days before the due date during which the task counts as due soon.
    #[serde(default = "GraceWindow::default_due_soon_days")]
    pub due_soon_days: i64,
    /// Days past the due date after which an overdue alert escalates to critical.
    #[serde(default = "GraceWindow::default_critical_after_days")]
    pub critical_after_days: i64,
}

impl GraceWindow {
    pub const DEFAULT_DUE_SOON_DAYS: i64 = 7;
    pub const DEFAULT_CRITICAL_AFTER_DAYS: i64 = 14;

    fn default_due_soon_days() -> i64 {
        Self::DEFAULT_DUE_SOON_DAYS
    }

    fn default_critical_after_days() -> i64 {
        Self::DEFAULT_CRITICAL_AFTER_DAYS
    }
}

impl Default for GraceWindow {
    fn default() -> Self {
        Self {
            due_soon_days: Self::DEFAULT_DUE_SOON_DAYS,
            critical_after_days: Self::DEFAULT_CRITICAL_AFTER_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: DefinitionId,
    #[serde(default = "TaskDefinition::first_version")]
    pub version: u32,
    pub title: String,
    pub category: SystemCategory,
    pub recurrence: Recurrence,
    pub default_priority: Priority,
    #[serde(default)]
    pub grace: GraceWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskDefinition {
    /// A century; longer intervals are treated as data-entry mistakes.
    pub const MAX_INTERVAL_DAYS: i64 = 36_500;

    pub fn new(
        id: impl Into<DefinitionId>,
        title: impl Into<String>,
        category: SystemCategory,
        recurrence: Recurrence,
        default_priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            version: 1,
            title: title.into(),
            category,
            recurrence,
            default_priority,
            grace: GraceWindow::default(),
            description: None,
        }
    }

    fn first_version() -> u32 {
        1
    }

    pub fn with_grace(mut self, grace: GraceWindow) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A copy of this definition under the next version number.
    pub fn revised(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next
    }

    fn invalid(&self, reason: impl Into<String>) -> CatalogError {
        CatalogError::InvalidDefinition {
            id: self.id.clone(),
            version: self.version,
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("definition id must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(self.invalid("title must not be empty"));
        }
        if self.version == 0 {
            return Err(self.invalid("versions start at 1"));
        }
        if let Recurrence::Interval { days } = self.recurrence {
            if days <= 0 {
                return Err(self.invalid(format!("interval must be positive (got {days} days)")));
            }
            if days > Self::MAX_INTERVAL_DAYS {
                return Err(self.invalid(format!(
                    "interval must be at most {} days (got {days} days)",
                    Self::MAX_INTERVAL_DAYS
                )));
            }
        }
        if self.grace.due_soon_days < 0 {
            return Err(self.invalid(format!(
                "due-soon window must not be negative (got {})",
                self.grace.due_soon_days
            )));
        }
        if self.grace.critical_after_days < 0 {
            return Err(self.invalid(format!(
                "critical window must not be negative (got {})",
                self.grace.critical_after_days
            )));
        }
        Ok(())
    }
}

/// Read-only, versioned set of task definitions.
///
/// Every published version is retained so instances created from an older
/// version keep resolving to the rules they were generated under.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    versions: BTreeMap<DefinitionId, BTreeMap<u32, TaskDefinition>>,
}

impl TaskCatalog {
    /// Load definitions, skipping any that fail validation. Rejected
    /// definitions are logged and returned alongside the catalog.
    pub fn load<I>(definitions: I) -> (Self, Vec<CatalogError>)
    where
        I: IntoIterator<Item = TaskDefinition>,
    {
        let mut catalog = TaskCatalog::default();
        let mut rejected = Vec::new();
        for definition in definitions {
            if let Err(err) = catalog.publish(definition) {
                warn!(
                    target: "frostline",
                    event = "catalog_definition_rejected",
                    error = %err
                );
                rejected.push(err);
            }
        }
        (catalog, rejected)
    }

    /// Load a JSON array of definitions. Entries that fail to parse, such as
    /// a malformed calendar anchor, are rejected individually.
    pub fn from_json_str(json: &str) -> Result<(Self, Vec<CatalogError>), serde_json::Error> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut parse_errors = Vec::new();
        let mut definitions = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry
                .get("id")
                .and_then(|value| value.as_str())
                .unwrap_or("<unknown>")
                .to_string();
            let version = entry
                .get("version")
                .and_then(|value| value.as_u64())
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or(1);
            match serde_json::from_value::<TaskDefinition>(entry) {
                Ok(definition) => definitions.push(definition),
                Err(err) => {
                    let err = CatalogError::InvalidDefinition {
                        id,
                        version,
                        reason: err.to_string(),
                    };
                    warn!(
                        target: "frostline",
                        event = "catalog_definition_rejected",
                        error = %err
                    );
                    parse_errors.push(err);
                }
            }
        }
        let (catalog, mut rejected) = Self::load(definitions);
        parse_errors.append(&mut rejected);
        Ok((catalog, parse_errors))
    }

    pub fn publish(&mut self, definition: TaskDefinition) -> Result<(), CatalogError> {
        definition.validate()?;
        let versions = self.versions.entry(definition.id.clone()).or_default();
        if versions.contains_key(&definition.version) {
            return Err(definition.invalid("version already published"));
        }
        versions.insert(definition.version, definition);
        Ok(())
    }

    pub fn current(&self, id: &str) -> Option<&TaskDefinition> {
        self.versions
            .get(id)
            .and_then(|versions| versions.values().next_back())
    }

    pub fn get(&self, id: &str, version: u32) -> Option<&TaskDefinition> {
        self.versions.get(id).and_then(|versions| versions.get(&version))
    }

    /// The exact version if it is still known, otherwise the current one.
    pub fn resolve(&self, id: &str, version: u32) -> Option<&TaskDefinition> {
        self.get(id, version).or_else(|| self.current(id))
    }

    pub fn current_definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.versions
            .values()
            .filter_map(|versions| versions.values().next_back())
    }

    pub fn for_category(&self, category: SystemCategory) -> Vec<&TaskDefinition> {
        self.current_definitions()
            .filter(|definition| definition.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Baseline catalog for extreme-cold households.
    pub fn cold_climate_defaults() -> Self {
        let (catalog, _) = Self::load(cold_climate_definitions());
        catalog
    }
}

fn cold_climate_definitions() -> Vec<TaskDefinition> {
    let mut definitions = vec![
        TaskDefinition::new(
            "furnace-filter",
            "Furnace Filter Replacement",
            SystemCategory::Heating,
            Recurrence::every_days(90),
            Priority::High,
        ),
        TaskDefinition::new(
            "hrv-core-cleaning",
            "HRV Core and Filter Cleaning",
            SystemCategory::Ventilation,
            Recurrence::every_days(90),
            Priority::Medium,
        ),
        TaskDefinition::new(
            "water-heater-flush",
            "Water Heater Flush",
            SystemCategory::Water,
            Recurrence::every_days(365),
            Priority::Medium,
        ),
        TaskDefinition::new(
            "smoke-co-test",
            "Smoke and CO Detector Test",
            SystemCategory::Electrical,
            Recurrence::every_days(30),
            Priority::High,
        )
        .with_grace(GraceWindow {
            due_soon_days: 3,
            critical_after_days: 7,
        }),
        TaskDefinition::new(
            "envelope-draft-check",
            "Door and Window Draft Check",
            SystemCategory::Envelope,
            Recurrence::every_days(180),
            Priority::Low,
        ),
    ];

    let seasonal = [
        (
            "furnace-inspection",
            "Annual Furnace Inspection",
            SystemCategory::Heating,
            "first week of october",
            Priority::High,
        ),
        (
            "heat-trace-check",
            "Heat Trace Cable Check",
            SystemCategory::Water,
            "first week of november",
            Priority::High,
        ),
        (
            "generator-load-test",
            "Backup Generator Load Test",
            SystemCategory::Electrical,
            "second saturday of november",
            Priority::Medium,
        ),
    ];
    for (id, title, category, anchor, priority) in seasonal {
        match Recurrence::seasonal(anchor) {
            Ok(recurrence) => {
                definitions.push(TaskDefinition::new(id, title, category, recurrence, priority))
            }
            Err(err) => warn!(target: "frostline", event = "catalog_anchor_invalid", error = %err),
        }
    }
    definitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_skips_invalid_definitions_and_keeps_the_rest() {
        let good = TaskDefinition::new(
            "filter",
            "Filter",
            SystemCategory::Heating,
            Recurrence::every_days(90),
            Priority::High,
        );
        let zero = TaskDefinition::new(
            "zero",
            "Zero interval",
            SystemCategory::Water,
            Recurrence::every_days(0),
            Priority::Low,
        );
        let negative_grace = TaskDefinition::new(
            "grace",
            "Bad grace",
            SystemCategory::Water,
            Recurrence::every_days(10),
            Priority::Low,
        )
        .with_grace(GraceWindow {
            due_soon_days: -1,
            critical_after_days: 14,
        });

        let (catalog, rejected) = TaskCatalog::load(vec![good, zero, negative_grace]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.current("filter").is_some());
        assert_eq!(rejected.len(), 2);
        assert!(matches!(
            &rejected[0],
            CatalogError::InvalidDefinition { id, .. } if id == "zero"
        ));
    }

    #[test]
    fn versions_are_retained_and_current_is_latest() {
        let v1 = TaskDefinition::new(
            "filter",
            "Filter",
            SystemCategory::Heating,
            Recurrence::every_days(90),
            Priority::High,
        );
        let mut v2 = v1.revised();
        v2.recurrence = Recurrence::every_days(60);

        let (catalog, rejected) = TaskCatalog::load(vec![v1.clone(), v2.clone()]);
        assert!(rejected.is_empty());
        assert_eq!(catalog.current("filter").map(|d| d.version), Some(2));
        assert_eq!(catalog.get("filter", 1), Some(&v1));
        assert_eq!(catalog.resolve("filter", 9).map(|d| d.version), Some(2));
    }

    #[test]
    fn republishing_same_version_is_rejected() {
        let def = TaskDefinition::new(
            "filter",
            "Filter",
            SystemCategory::Heating,
            Recurrence::every_days(90),
            Priority::High,
        );
        let (_, rejected) = TaskCatalog::load(vec![def.clone(), def]);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn json_catalog_rejects_malformed_anchor_entry() {
        let json = r#"[{
            "id": "x",
            "title": "X",
            "category": "heating",
            "recurrence": {"kind": "seasonal", "anchor": "tenth week of octember"},
            "default_priority": "high"
        }]"#;
        let (catalog, rejected) = TaskCatalog::from_json_str(json).unwrap();
        assert!(catalog.is_empty());
        assert!(matches!(
            rejected.as_slice(),
            [CatalogError::InvalidDefinition { id, .. }] if id == "x"
        ));
        assert!(TaskCatalog::from_json_str("{not json").is_err());
    }

    #[test]
    fn json_catalog_defaults_grace_and_version() {
        let json = r#"[{
            "id": "furnace-inspection",
            "title": "Furnace Inspection",
            "category": "heating",
            "recurrence": {"kind": "seasonal", "anchor": "first week of october"},
            "default_priority": "high"
        }]"#;
        let (catalog, rejected) = TaskCatalog::from_json_str(json).unwrap();
        assert!(rejected.is_empty());
        let def = catalog.current("furnace-inspection").unwrap();
        assert_eq!(def.version, 1);
        assert_eq!(def.grace, GraceWindow::default());
    }

    #[test]
    fn defaults_cover_every_core_category() {
        let catalog = TaskCatalog::cold_climate_defaults();
        for category in [
            SystemCategory::Heating,
            SystemCategory::Water,
            SystemCategory::Ventilation,
            SystemCategory::Electrical,
        ] {
            assert!(
                !catalog.for_category(category).is_empty(),
                "no defaults for {category}"
            );
        }
    }
}
