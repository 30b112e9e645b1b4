use crate::catalog::{DefinitionId, Priority, TaskDefinition};
use crate::status::{self, TaskStatus};
use crate::system::{HomeId, System, SystemId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const INSTANCE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b9e_8d4a_4e27_9a51_3c0d_7e82_f4a1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub kind: CompletionKind,
    pub closed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CompletionRecord {
    pub fn completed(closed_at: DateTime<Utc>) -> Self {
        Self {
            kind: CompletionKind::Completed,
            closed_at,
            performer: None,
            cost: None,
            notes: None,
        }
    }

    pub fn skipped(closed_at: DateTime<Utc>) -> Self {
        Self {
            kind: CompletionKind::Skipped,
            ..Self::completed(closed_at)
        }
    }

    pub fn by(mut self, performer: impl Into<String>) -> Self {
        self.performer = Some(performer.into());
        self
    }

    pub fn costing(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// One dated occurrence of a task definition for a single system.
///
/// `cached_status` is a cache only; [`TaskInstance::status`] is the
/// authoritative answer and is recomputed from the due date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: Uuid,
    pub home_id: HomeId,
    pub system_id: SystemId,
    pub definition_id: DefinitionId,
    pub definition_version: u32,
    pub title: String,
    pub due_date: NaiveDate,
    /// 1 for the first instance of a (system, definition) pair, then one
    /// more than the highest closed occurrence.
    #[serde(default = "TaskInstance::first_occurrence")]
    pub occurrence: u32,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_status: Option<TaskStatus>,
    /// Optimistic concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub revision: u32,
    pub created_at: DateTime<Utc>,
}

impl TaskInstance {
    pub fn new(
        system: &System,
        definition: &TaskDefinition,
        due_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::derive_id(&system.id, &definition.id, definition.version, due_date, 1),
            home_id: system.home_id.clone(),
            system_id: system.id.clone(),
            definition_id: definition.id.clone(),
            definition_version: definition.version,
            title: definition.title.clone(),
            due_date,
            occurrence: 1,
            priority: definition.default_priority,
            completion: None,
            cached_status: None,
            revision: 0,
            created_at,
        }
    }

    fn first_occurrence() -> u32 {
        1
    }

    /// Stable id for one occurrence of a definition version on a system.
    /// Two occurrences can share a due date, so the sequence number is
    /// part of the name.
    pub fn derive_id(
        system_id: &str,
        definition_id: &str,
        version: u32,
        due_date: NaiveDate,
        occurrence: u32,
    ) -> Uuid {
        let name = format!("{system_id}/{definition_id}/v{version}/{due_date}/#{occurrence}");
        Uuid::new_v5(&INSTANCE_NAMESPACE, name.as_bytes())
    }

    /// Renumber this instance as the `occurrence`-th of its pair.
    pub fn as_occurrence(mut self, occurrence: u32) -> Self {
        self.occurrence = occurrence;
        self.id = Self::derive_id(
            &self.system_id,
            &self.definition_id,
            self.definition_version,
            self.due_date,
            occurrence,
        );
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_open(&self) -> bool {
        self.completion.is_none()
    }

    pub fn status(&self, due_soon_days: i64, as_of: NaiveDate) -> TaskStatus {
        status::classify(self.due_date, due_soon_days, as_of)
    }

    /// Refresh the cached status; returns true when it changed.
    pub fn refresh_cached_status(&mut self, due_soon_days: i64, as_of: NaiveDate) -> bool {
        let current = Some(self.status(due_soon_days, as_of));
        if self.cached_status == current {
            return false;
        }
        self.cached_status = current;
        true
    }

    /// Date the next occurrence is measured from once this instance is closed.
    /// Completed work anchors at the completion day; a skip keeps the cadence.
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        self.completion.as_ref().map(|record| match record.kind {
            CompletionKind::Completed => record.closed_at.date_naive(),
            CompletionKind::Skipped => self.due_date,
        })
    }

    pub fn close(&mut self, record: CompletionRecord) {
        self.completion = Some(record);
        self.cached_status = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Recurrence;
    use crate::system::SystemCategory;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> TaskInstance {
        let system = System::new("furnace", "home-1", "Furnace", SystemCategory::Heating);
        let definition = TaskDefinition::new(
            "filter",
            "Furnace Filter Replacement",
            SystemCategory::Heating,
            Recurrence::every_days(90),
            Priority::High,
        );
        TaskInstance::new(
            &system,
            &definition,
            d(2025, 3, 1),
            Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn ids_are_stable_for_the_same_occurrence() {
        let a = sample();
        let b = sample();
        assert_eq!(a.id, b.id);
        assert_ne!(
            a.id,
            TaskInstance::derive_id("furnace", "filter", 1, d(2025, 3, 2), 1)
        );
        assert_ne!(a.id, sample().as_occurrence(2).id);
    }

    #[test]
    fn anchor_depends_on_completion_kind() {
        let closed_at = Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap();

        let mut completed = sample();
        completed.close(CompletionRecord::completed(closed_at));
        assert_eq!(completed.anchor_date(), Some(d(2025, 3, 10)));

        let mut skipped = sample();
        skipped.close(CompletionRecord::skipped(closed_at));
        assert_eq!(skipped.anchor_date(), Some(d(2025, 3, 1)));

        assert_eq!(sample().anchor_date(), None);
    }

    #[test]
    fn cached_status_refresh_reports_changes() {
        let mut instance = sample();
        assert!(instance.refresh_cached_status(7, d(2025, 1, 1)));
        assert!(!instance.refresh_cached_status(7, d(2025, 1, 2)));
        assert!(instance.refresh_cached_status(7, d(2025, 3, 2)));
        assert_eq!(instance.cached_status, Some(TaskStatus::Overdue));
    }
}
