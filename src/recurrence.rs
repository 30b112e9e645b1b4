use crate::catalog::{CatalogError, DefinitionId, Recurrence, TaskDefinition};
use crate::instance::TaskInstance;
use crate::system::{System, SystemId};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Non-fatal data problems found while scheduling, surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    /// No completion, service or install date was known; scheduling fell
    /// back to the evaluation date.
    MissingHistory {
        system_id: SystemId,
        definition_id: DefinitionId,
    },
}

/// Result of expanding one system's definitions.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// Open instances that already existed before the call.
    pub existing: Vec<TaskInstance>,
    /// Instances created by this call; these still need to be persisted.
    pub created: Vec<TaskInstance>,
    pub issues: Vec<DataQualityIssue>,
    pub rejected: Vec<CatalogError>,
}

impl ScheduleOutcome {
    pub fn open_instances(&self) -> impl Iterator<Item = &TaskInstance> {
        self.existing.iter().chain(self.created.iter())
    }
}

/// Where the next occurrence is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Baseline {
    base: NaiveDate,
    previous_due: Option<NaiveDate>,
    defaulted: bool,
}

/// Compute the due date of the next occurrence of `definition`.
///
/// Interval rules add the interval to `base`. Seasonal rules pick the first
/// anchor on or after `as_of`, and strictly after the previous due date so a
/// season is never scheduled twice.
pub fn next_due_date(
    definition: &TaskDefinition,
    base: NaiveDate,
    previous_due: Option<NaiveDate>,
    as_of: NaiveDate,
) -> Result<NaiveDate, CatalogError> {
    definition.validate()?;
    match &definition.recurrence {
        Recurrence::Interval { days } => base
            .checked_add_signed(Duration::days(*days))
            .ok_or_else(|| CatalogError::InvalidDefinition {
                id: definition.id.clone(),
                version: definition.version,
                reason: format!("interval of {days} days from {base} is out of range"),
            }),
        Recurrence::Seasonal { anchor } => {
            let floor = match previous_due.and_then(|previous| previous.succ_opt()) {
                Some(after_previous) => as_of.max(after_previous),
                None => as_of,
            };
            anchor
                .next_on_or_after(floor)
                .ok_or_else(|| CatalogError::InvalidDefinition {
                    id: definition.id.clone(),
                    version: definition.version,
                    reason: format!("anchor '{anchor}' has no occurrence after {floor}"),
                })
        }
    }
}

/// Make sure `system` has exactly one open instance per applicable definition.
///
/// `known` holds every instance recorded for the system, open or closed.
/// Definitions that already have an open instance are left alone, which
/// makes the call idempotent: running it again over the same state creates
/// nothing new.
pub fn ensure_scheduled(
    system: &System,
    definitions: &[&TaskDefinition],
    known: &[TaskInstance],
    as_of: DateTime<Utc>,
) -> ScheduleOutcome {
    let as_of_date = as_of.date_naive();
    let mut outcome = ScheduleOutcome::default();

    let mut open_by_definition: HashMap<&str, Vec<&TaskInstance>> = HashMap::new();
    let mut latest_closed: HashMap<&str, &TaskInstance> = HashMap::new();
    let mut last_occurrence: HashMap<&str, u32> = HashMap::new();
    for instance in known.iter().filter(|i| i.system_id == system.id) {
        if instance.is_open() {
            open_by_definition
                .entry(instance.definition_id.as_str())
                .or_default()
                .push(instance);
        } else {
            last_occurrence
                .entry(instance.definition_id.as_str())
                .and_modify(|seen| *seen = (*seen).max(instance.occurrence))
                .or_insert(instance.occurrence);
            latest_closed
                .entry(instance.definition_id.as_str())
                .and_modify(|current| {
                    if (instance.due_date, instance.anchor_date())
                        > (current.due_date, current.anchor_date())
                    {
                        *current = instance;
                    }
                })
                .or_insert(instance);
        }
    }

    for definition in definitions
        .iter()
        .filter(|definition| definition.category == system.category)
    {
        if let Some(open) = open_by_definition.get(definition.id.as_str()) {
            outcome.existing.extend(open.iter().map(|i| (*i).clone()));
            continue;
        }

        let baseline = resolve_baseline(system, latest_closed.get(definition.id.as_str()), as_of_date);
        if baseline.defaulted {
            warn!(
                target: "frostline",
                event = "missing_service_history",
                system_id = %system.id,
                definition_id = %definition.id
            );
            outcome.issues.push(DataQualityIssue::MissingHistory {
                system_id: system.id.clone(),
                definition_id: definition.id.clone(),
            });
        }

        match next_due_date(definition, baseline.base, baseline.previous_due, as_of_date) {
            Ok(due_date) => {
                let occurrence = last_occurrence
                    .get(definition.id.as_str())
                    .map_or(1, |seen| seen.saturating_add(1));
                outcome.created.push(
                    TaskInstance::new(system, definition, due_date, as_of).as_occurrence(occurrence),
                );
            }
            Err(err) => {
                warn!(
                    target: "frostline",
                    event = "definition_skipped",
                    system_id = %system.id,
                    error = %err
                );
                outcome.rejected.push(err);
            }
        }
    }

    outcome
}

fn resolve_baseline(
    system: &System,
    latest_closed: Option<&&TaskInstance>,
    as_of: NaiveDate,
) -> Baseline {
    if let Some(closed) = latest_closed {
        if let Some(anchor) = closed.anchor_date() {
            return Baseline {
                base: anchor,
                previous_due: Some(closed.due_date),
                defaulted: false,
            };
        }
    }
    match system.service_reference_date() {
        Some(base) => Baseline {
            base,
            previous_due: None,
            defaulted: false,
        },
        None => Baseline {
            base: as_of,
            previous_due: None,
            defaulted: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Priority;
    use crate::instance::CompletionRecord;
    use crate::system::SystemCategory;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
    }

    fn filter_def() -> TaskDefinition {
        TaskDefinition::new(
            "filter",
            "Furnace Filter Replacement",
            SystemCategory::Heating,
            Recurrence::every_days(90),
            Priority::High,
        )
    }

    #[test]
    fn seasonal_floor_skips_the_previous_season() {
        let def = TaskDefinition::new(
            "inspection",
            "Inspection",
            SystemCategory::Heating,
            Recurrence::seasonal("first week of october").unwrap(),
            Priority::High,
        );
        // completed early, before the anchor date
        let due = next_due_date(&def, d(2025, 9, 20), Some(d(2025, 10, 1)), d(2025, 9, 20)).unwrap();
        assert_eq!(due, d(2026, 10, 1));

        let first = next_due_date(&def, d(2025, 1, 1), None, d(2025, 9, 20)).unwrap();
        assert_eq!(first, d(2025, 10, 1));
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let mut def = filter_def();
        def.recurrence = Recurrence::every_days(-5);
        let err = next_due_date(&def, d(2025, 1, 1), None, d(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition { .. }));

        let system = System::new("furnace", "home", "Furnace", SystemCategory::Heating)
            .installed_on(d(2024, 1, 1));
        let outcome = ensure_scheduled(&system, &[&def], &[], at(d(2025, 1, 1)));
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn interval_past_the_calendar_is_rejected_not_panicking() {
        let mut def = filter_def();
        def.recurrence = Recurrence::every_days(30_000);
        let err = next_due_date(&def, NaiveDate::MAX, None, d(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition { .. }));
    }

    #[test]
    fn closed_instance_drives_next_due_date() {
        let def = filter_def();
        let system = System::new("furnace", "home", "Furnace", SystemCategory::Heating)
            .installed_on(d(2024, 1, 1));
        let mut closed = TaskInstance::new(&system, &def, d(2024, 3, 31), at(d(2024, 1, 1)));
        closed.close(CompletionRecord::completed(at(d(2024, 4, 10))));

        let outcome = ensure_scheduled(&system, &[&def], &[closed], at(d(2024, 4, 10)));
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].due_date, d(2024, 7, 9));
        assert_eq!(outcome.created[0].occurrence, 2);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn definitions_for_other_categories_are_ignored() {
        let mut def = filter_def();
        def.category = SystemCategory::Water;
        let system = System::new("furnace", "home", "Furnace", SystemCategory::Heating)
            .installed_on(d(2024, 1, 1));
        let outcome = ensure_scheduled(&system, &[&def], &[], at(d(2025, 1, 1)));
        assert!(outcome.created.is_empty());
    }
}
