use super::{MaintenanceStore, RepositoryError, RepositoryResult};
use crate::instance::TaskInstance;
use crate::system::{Home, HomeId, System, SystemId};
use crate::weather::ColdSnapTracker;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Full store contents. Also the on-disk shape of a JSON snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    pub(crate) homes: BTreeMap<HomeId, Home>,
    #[serde(default)]
    pub(crate) systems: BTreeMap<SystemId, System>,
    #[serde(default)]
    pub(crate) instances: BTreeMap<Uuid, TaskInstance>,
    /// Home id to dismissed dedup keys and when they were dismissed.
    #[serde(default)]
    pub(crate) dismissed: BTreeMap<HomeId, BTreeMap<String, DateTime<Utc>>>,
    #[serde(default)]
    pub(crate) cold_snaps: BTreeMap<String, ColdSnapTracker>,
}

impl StoreState {
    fn open_sibling(&self, instance: &TaskInstance) -> Option<&TaskInstance> {
        self.instances.values().find(|other| {
            other.is_open()
                && other.id != instance.id
                && other.system_id == instance.system_id
                && other.definition_id == instance.definition_id
        })
    }

    fn home_instances<'a>(
        &'a self,
        home_id: &'a str,
    ) -> impl Iterator<Item = &'a TaskInstance> + 'a {
        self.instances
            .values()
            .filter(move |instance| instance.home_id == home_id)
    }
}

/// Thread-safe store kept entirely in memory. Backs the CLI and the HTTP
/// service, and can be snapshotted to JSON.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub(crate) fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }

    pub fn instance_count(&self) -> usize {
        self.state.read().instances.len()
    }
}

impl MaintenanceStore for InMemoryStore {
    fn load_home(&self, home_id: &str) -> RepositoryResult<Option<Home>> {
        Ok(self.state.read().homes.get(home_id).cloned())
    }

    fn list_homes(&self) -> RepositoryResult<Vec<Home>> {
        Ok(self.state.read().homes.values().cloned().collect())
    }

    fn save_home(&self, home: &Home) -> RepositoryResult<()> {
        if home.id.trim().is_empty() {
            return Err(RepositoryError::InvalidData("home id must not be empty".into()));
        }
        self.state.write().homes.insert(home.id.clone(), home.clone());
        Ok(())
    }

    fn load_systems(&self, home_id: &str) -> RepositoryResult<Vec<System>> {
        Ok(self
            .state
            .read()
            .systems
            .values()
            .filter(|system| system.home_id == home_id)
            .cloned()
            .collect())
    }

    fn save_system(&self, system: &System) -> RepositoryResult<()> {
        let mut state = self.state.write();
        if !state.homes.contains_key(&system.home_id) {
            return Err(RepositoryError::NotFound {
                entity: "home",
                id: system.home_id.clone(),
            });
        }
        super::check_system_owner(
            state.systems.get(&system.id).map(|stored| stored.home_id.as_str()),
            system,
        )?;
        state.systems.insert(system.id.clone(), system.clone());
        Ok(())
    }

    fn load_open_instances(&self, home_id: &str) -> RepositoryResult<Vec<TaskInstance>> {
        Ok(self
            .state
            .read()
            .home_instances(home_id)
            .filter(|instance| instance.is_open())
            .cloned()
            .collect())
    }

    fn load_instance_history(&self, home_id: &str) -> RepositoryResult<Vec<TaskInstance>> {
        Ok(self
            .state
            .read()
            .home_instances(home_id)
            .filter(|instance| !instance.is_open())
            .cloned()
            .collect())
    }

    fn load_instance(&self, id: Uuid) -> RepositoryResult<Option<TaskInstance>> {
        Ok(self.state.read().instances.get(&id).cloned())
    }

    fn save_instance(&self, instance: &TaskInstance) -> RepositoryResult<TaskInstance> {
        super::validate_instance(instance)?;
        let mut state = self.state.write();
        let revision = super::next_revision(
            state.instances.get(&instance.id),
            state.open_sibling(instance),
            instance,
        )?;
        let mut stored = instance.clone();
        stored.revision = revision;
        state.instances.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn load_dismissed_alert_keys(&self, home_id: &str) -> RepositoryResult<HashSet<String>> {
        Ok(self
            .state
            .read()
            .dismissed
            .get(home_id)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn dismiss_alert(
        &self,
        home_id: &str,
        dedup_key: &str,
        dismissed_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.state
            .write()
            .dismissed
            .entry(home_id.to_string())
            .or_default()
            .entry(dedup_key.to_string())
            .or_insert(dismissed_at);
        Ok(())
    }

    fn clear_dismissed_alerts(&self, home_id: &str, dedup_keys: &[String]) -> RepositoryResult<()> {
        let mut state = self.state.write();
        if let Some(keys) = state.dismissed.get_mut(home_id) {
            for key in dedup_keys {
                keys.remove(key);
            }
            if keys.is_empty() {
                state.dismissed.remove(home_id);
            }
        }
        Ok(())
    }

    fn load_cold_snap(&self, region: &str) -> RepositoryResult<ColdSnapTracker> {
        Ok(self
            .state
            .read()
            .cold_snaps
            .get(region)
            .cloned()
            .unwrap_or_else(|| ColdSnapTracker::new(region)))
    }

    fn save_cold_snap(&self, tracker: &ColdSnapTracker) -> RepositoryResult<()> {
        self.state
            .write()
            .cold_snaps
            .insert(tracker.region.clone(), tracker.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskCatalog;
    use crate::instance::CompletionRecord;
    use crate::system::SystemCategory;
    use chrono::{NaiveDate, TimeZone};

    fn seeded() -> (InMemoryStore, TaskInstance) {
        let store = InMemoryStore::new();
        store.save_home(&Home::new("h1", "Cabin", "whitehorse")).unwrap();
        let system = System::new("furnace", "h1", "Furnace", SystemCategory::Heating);
        store.save_system(&system).unwrap();
        let catalog = TaskCatalog::cold_climate_defaults();
        let definition = catalog.current("furnace-filter").unwrap();
        let instance = TaskInstance::new(
            &system,
            definition,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        (store, instance)
    }

    #[test]
    fn insert_bumps_revision_and_stale_writes_conflict() {
        let (store, instance) = seeded();
        let stored = store.save_instance(&instance).unwrap();
        assert_eq!(stored.revision, 1);

        let err = store.save_instance(&instance).unwrap_err();
        assert!(err.is_retryable());

        let mut closed = stored.clone();
        closed.close(CompletionRecord::completed(Utc::now()));
        let closed = store.save_instance(&closed).unwrap();
        assert_eq!(closed.revision, 2);
        assert!(store.save_instance(&stored).unwrap_err().is_retryable());
    }

    #[test]
    fn second_open_instance_for_same_pair_is_rejected() {
        let (store, instance) = seeded();
        store.save_instance(&instance).unwrap();
        let mut duplicate = instance.clone();
        duplicate.id = Uuid::from_u128(42);
        assert!(matches!(
            store.save_instance(&duplicate),
            Err(RepositoryError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn unknown_region_gets_a_fresh_tracker() {
        let store = InMemoryStore::new();
        let tracker = store.load_cold_snap("iqaluit").unwrap();
        assert_eq!(tracker.region, "iqaluit");
        assert!(!tracker.is_active());
    }
}
