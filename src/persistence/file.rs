use super::memory::{InMemoryStore, StoreState};
use super::{RepositoryError, RepositoryResult};
use crate::instance::{CompletionKind, TaskInstance};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    format: u32,
    state: StoreState,
}

impl StoreSnapshot {
    fn into_state(self) -> RepositoryResult<StoreState> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(RepositoryError::InvalidData(format!(
                "unsupported snapshot format {} (expected {SNAPSHOT_FORMAT})",
                self.format
            )));
        }
        for instance in self.state.instances.values() {
            super::validate_instance(instance)?;
        }
        let mut open_pairs = HashSet::new();
        for instance in self.state.instances.values().filter(|i| i.is_open()) {
            if !open_pairs.insert((instance.system_id.as_str(), instance.definition_id.as_str())) {
                return Err(RepositoryError::InvalidData(format!(
                    "more than one open instance of {} for system {}",
                    instance.definition_id, instance.system_id
                )));
            }
        }
        Ok(self.state)
    }
}

pub fn save_store_to_json<P: AsRef<Path>>(store: &InMemoryStore, path: P) -> RepositoryResult<()> {
    let snapshot = StoreSnapshot {
        format: SNAPSHOT_FORMAT,
        state: store.snapshot(),
    };
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &snapshot)?;
    Ok(())
}

pub fn load_store_from_json<P: AsRef<Path>>(path: P) -> RepositoryResult<InMemoryStore> {
    let file = File::open(path)?;
    let snapshot: StoreSnapshot = serde_json::from_reader(file)?;
    Ok(InMemoryStore::from_state(snapshot.into_state()?))
}

#[derive(Serialize)]
struct TimelineCsvRecord<'a> {
    instance_id: String,
    system_id: &'a str,
    definition_id: &'a str,
    definition_version: u32,
    title: &'a str,
    due_date: String,
    outcome: &'static str,
    closed_at: String,
    performer: &'a str,
    cost: String,
    notes: &'a str,
}

impl<'a> TimelineCsvRecord<'a> {
    fn from_instance(instance: &'a TaskInstance) -> Option<Self> {
        let record = instance.completion.as_ref()?;
        Some(Self {
            instance_id: instance.id.to_string(),
            system_id: &instance.system_id,
            definition_id: &instance.definition_id,
            definition_version: instance.definition_version,
            title: &instance.title,
            due_date: instance.due_date.format("%Y-%m-%d").to_string(),
            outcome: match record.kind {
                CompletionKind::Completed => "completed",
                CompletionKind::Skipped => "skipped",
            },
            closed_at: record.closed_at.to_rfc3339(),
            performer: record.performer.as_deref().unwrap_or_default(),
            cost: record.cost.map(|c| format!("{c:.2}")).unwrap_or_default(),
            notes: record.notes.as_deref().unwrap_or_default(),
        })
    }
}

/// Write the closed instances as a completion timeline, oldest first.
/// Open instances are not part of the history and are skipped.
pub fn export_timeline_csv<P: AsRef<Path>>(
    instances: &[TaskInstance],
    path: P,
) -> RepositoryResult<usize> {
    let mut rows: Vec<TimelineCsvRecord<'_>> = instances
        .iter()
        .filter_map(TimelineCsvRecord::from_instance)
        .collect();
    rows.sort_by(|a, b| a.closed_at.cmp(&b.closed_at).then_with(|| a.instance_id.cmp(&b.instance_id)));

    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}
