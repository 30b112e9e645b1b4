use crate::instance::TaskInstance;
use crate::system::{Home, System};
use crate::weather::ColdSnapTracker;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// Another writer got there first. Safe to retry after reloading.
    #[error("concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: String },
}

impl RepositoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::ConcurrentModification { .. })
    }

    fn instance_conflict(id: Uuid) -> Self {
        RepositoryError::ConcurrentModification {
            entity: "task instance",
            id: id.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// The narrow storage interface the engine reads and writes through.
///
/// Implementations enforce the scheduling invariants: at most one open
/// instance per (system, definition) pair, and optimistic revision checks on
/// every instance write.
pub trait MaintenanceStore: Send + Sync {
    fn load_home(&self, home_id: &str) -> RepositoryResult<Option<Home>>;
    fn list_homes(&self) -> RepositoryResult<Vec<Home>>;
    fn save_home(&self, home: &Home) -> RepositoryResult<()>;

    fn load_systems(&self, home_id: &str) -> RepositoryResult<Vec<System>>;
    fn save_system(&self, system: &System) -> RepositoryResult<()>;

    fn load_open_instances(&self, home_id: &str) -> RepositoryResult<Vec<TaskInstance>>;
    /// Closed instances for a home: the audit trail behind the timeline.
    fn load_instance_history(&self, home_id: &str) -> RepositoryResult<Vec<TaskInstance>>;
    fn load_instance(&self, id: Uuid) -> RepositoryResult<Option<TaskInstance>>;
    /// Insert or update an instance and return the stored copy with its new
    /// revision. Unsaved instances carry revision 0.
    fn save_instance(&self, instance: &TaskInstance) -> RepositoryResult<TaskInstance>;

    fn load_dismissed_alert_keys(&self, home_id: &str) -> RepositoryResult<HashSet<String>>;
    fn dismiss_alert(
        &self,
        home_id: &str,
        dedup_key: &str,
        dismissed_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Forget dismissals whose underlying condition has cleared, so the
    /// condition alerts again if it returns.
    fn clear_dismissed_alerts(&self, home_id: &str, dedup_keys: &[String]) -> RepositoryResult<()>;

    /// Snap state for a region; a fresh tracker when none was stored.
    fn load_cold_snap(&self, region: &str) -> RepositoryResult<ColdSnapTracker>;
    fn save_cold_snap(&self, tracker: &ColdSnapTracker) -> RepositoryResult<()>;
}

/// Check an instance write against what is stored and return the revision
/// the stored copy should carry.
pub(crate) fn next_revision(
    stored: Option<&TaskInstance>,
    open_sibling: Option<&TaskInstance>,
    incoming: &TaskInstance,
) -> RepositoryResult<u32> {
    match stored {
        Some(current) if current.revision != incoming.revision => {
            return Err(RepositoryError::instance_conflict(incoming.id));
        }
        None if incoming.revision != 0 => {
            return Err(RepositoryError::NotFound {
                entity: "task instance",
                id: incoming.id.to_string(),
            });
        }
        _ => {}
    }
    if incoming.is_open() {
        if let Some(sibling) = open_sibling {
            if sibling.id != incoming.id {
                return Err(RepositoryError::instance_conflict(incoming.id));
            }
        }
    }
    Ok(incoming.revision + 1)
}

/// A system id belongs to one home for its whole life.
pub(crate) fn check_system_owner(stored_home: Option<&str>, system: &System) -> RepositoryResult<()> {
    match stored_home {
        Some(owner) if owner != system.home_id => Err(RepositoryError::InvalidData(format!(
            "system {} already belongs to home {owner}",
            system.id
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn validate_instance(instance: &TaskInstance) -> RepositoryResult<()> {
    if instance.system_id.trim().is_empty() || instance.home_id.trim().is_empty() {
        return Err(RepositoryError::InvalidData(format!(
            "task instance {} is missing its system or home",
            instance.id
        )));
    }
    if let Some(cost) = instance.completion.as_ref().and_then(|record| record.cost) {
        if !cost.is_finite() || cost < 0.0 {
            return Err(RepositoryError::InvalidData(format!(
                "task instance {} has invalid cost {cost}",
                instance.id
            )));
        }
    }
    Ok(())
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{export_timeline_csv, load_store_from_json, save_store_to_json};
pub use memory::InMemoryStore;
