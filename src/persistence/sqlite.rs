use super::{MaintenanceStore, RepositoryError, RepositoryResult};
use crate::instance::TaskInstance;
use crate::system::{Home, System};
use crate::weather::ColdSnapTracker;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// SQLite-backed store. Entities are kept as JSON documents next to the
/// columns needed for lookups and the open-instance uniqueness index.
pub struct SqliteMaintenanceStore {
    connection: Mutex<Connection>,
}

impl SqliteMaintenanceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> RepositoryResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> RepositoryResult<Self> {
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> RepositoryResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS homes (
                id TEXT PRIMARY KEY,
                home_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS systems (
                id TEXT PRIMARY KEY,
                home_id TEXT NOT NULL REFERENCES homes(id),
                system_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS task_instances (
                id TEXT PRIMARY KEY,
                home_id TEXT NOT NULL,
                system_id TEXT NOT NULL,
                definition_id TEXT NOT NULL,
                is_open INTEGER NOT NULL,
                revision INTEGER NOT NULL,
                instance_json TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS one_open_instance_per_definition
                ON task_instances (system_id, definition_id) WHERE is_open = 1;
            CREATE TABLE IF NOT EXISTS dismissed_alerts (
                home_id TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                dismissed_at TEXT NOT NULL,
                PRIMARY KEY (home_id, dedup_key)
            );
            CREATE TABLE IF NOT EXISTS cold_snaps (
                region TEXT PRIMARY KEY,
                tracker_json TEXT NOT NULL
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn query_documents<T: DeserializeOwned>(
        &self,
        sql: &str,
        key: &str,
    ) -> RepositoryResult<Vec<T>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        let mut documents = Vec::new();
        for json in rows {
            documents.push(serde_json::from_str(&json?)?);
        }
        Ok(documents)
    }

    fn stored_instance(tx: &Transaction<'_>, id: Uuid) -> RepositoryResult<Option<TaskInstance>> {
        let json: Option<String> = tx
            .query_row(
                "SELECT instance_json FROM task_instances WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(RepositoryError::from)
    }

    fn open_sibling(
        tx: &Transaction<'_>,
        instance: &TaskInstance,
    ) -> RepositoryResult<Option<TaskInstance>> {
        let json: Option<String> = tx
            .query_row(
                "SELECT instance_json FROM task_instances
                 WHERE system_id = ?1 AND definition_id = ?2 AND is_open = 1 AND id != ?3",
                params![
                    instance.system_id,
                    instance.definition_id,
                    instance.id.to_string()
                ],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(RepositoryError::from)
    }
}

impl MaintenanceStore for SqliteMaintenanceStore {
    fn load_home(&self, home_id: &str) -> RepositoryResult<Option<Home>> {
        Ok(self
            .query_documents("SELECT home_json FROM homes WHERE id = ?1", home_id)?
            .into_iter()
            .next())
    }

    fn list_homes(&self) -> RepositoryResult<Vec<Home>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare("SELECT home_json FROM homes ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut homes = Vec::new();
        for json in rows {
            homes.push(serde_json::from_str(&json?)?);
        }
        Ok(homes)
    }

    fn save_home(&self, home: &Home) -> RepositoryResult<()> {
        if home.id.trim().is_empty() {
            return Err(RepositoryError::InvalidData("home id must not be empty".into()));
        }
        let json = serde_json::to_string(home)?;
        self.connection.lock().execute(
            "INSERT INTO homes (id, home_json) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET home_json = excluded.home_json",
            params![home.id, json],
        )?;
        Ok(())
    }

    fn load_systems(&self, home_id: &str) -> RepositoryResult<Vec<System>> {
        self.query_documents(
            "SELECT system_json FROM systems WHERE home_id = ?1 ORDER BY id ASC",
            home_id,
        )
    }

    fn save_system(&self, system: &System) -> RepositoryResult<()> {
        if self.load_home(&system.home_id)?.is_none() {
            return Err(RepositoryError::NotFound {
                entity: "home",
                id: system.home_id.clone(),
            });
        }
        let json = serde_json::to_string(system)?;
        let connection = self.connection.lock();
        let owner: Option<String> = connection
            .query_row(
                "SELECT home_id FROM systems WHERE id = ?1",
                params![system.id],
                |row| row.get(0),
            )
            .optional()?;
        super::check_system_owner(owner.as_deref(), system)?;
        connection.execute(
            "INSERT INTO systems (id, home_id, system_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET system_json = excluded.system_json",
            params![system.id, system.home_id, json],
        )?;
        Ok(())
    }

    fn load_open_instances(&self, home_id: &str) -> RepositoryResult<Vec<TaskInstance>> {
        self.query_documents(
            "SELECT instance_json FROM task_instances
             WHERE home_id = ?1 AND is_open = 1 ORDER BY id ASC",
            home_id,
        )
    }

    fn load_instance_history(&self, home_id: &str) -> RepositoryResult<Vec<TaskInstance>> {
        self.query_documents(
            "SELECT instance_json FROM task_instances
             WHERE home_id = ?1 AND is_open = 0 ORDER BY id ASC",
            home_id,
        )
    }

    fn load_instance(&self, id: Uuid) -> RepositoryResult<Option<TaskInstance>> {
        Ok(self
            .query_documents(
                "SELECT instance_json FROM task_instances WHERE id = ?1",
                &id.to_string(),
            )?
            .into_iter()
            .next())
    }

    fn save_instance(&self, instance: &TaskInstance) -> RepositoryResult<TaskInstance> {
        super::validate_instance(instance)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let current = Self::stored_instance(&tx, instance.id)?;
        let sibling = Self::open_sibling(&tx, instance)?;
        let revision = super::next_revision(current.as_ref(), sibling.as_ref(), instance)?;

        let mut stored = instance.clone();
        stored.revision = revision;
        let json = serde_json::to_string(&stored)?;
        tx.execute(
            "INSERT INTO task_instances
                (id, home_id, system_id, definition_id, is_open, revision, instance_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET is_open = excluded.is_open,
                                           revision = excluded.revision,
                                           instance_json = excluded.instance_json",
            params![
                stored.id.to_string(),
                stored.home_id,
                stored.system_id,
                stored.definition_id,
                stored.is_open(),
                stored.revision,
                json
            ],
        )?;
        tx.commit()?;
        Ok(stored)
    }

    fn load_dismissed_alert_keys(&self, home_id: &str) -> RepositoryResult<HashSet<String>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare("SELECT dedup_key FROM dismissed_alerts WHERE home_id = ?1")?;
        let rows = stmt.query_map(params![home_id], |row| row.get::<_, String>(0))?;
        let mut keys = HashSet::new();
        for key in rows {
            keys.insert(key?);
        }
        Ok(keys)
    }

    fn dismiss_alert(
        &self,
        home_id: &str,
        dedup_key: &str,
        dismissed_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.connection.lock().execute(
            "INSERT OR IGNORE INTO dismissed_alerts (home_id, dedup_key, dismissed_at)
             VALUES (?1, ?2, ?3)",
            params![home_id, dedup_key, dismissed_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear_dismissed_alerts(&self, home_id: &str, dedup_keys: &[String]) -> RepositoryResult<()> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("DELETE FROM dismissed_alerts WHERE home_id = ?1 AND dedup_key = ?2")?;
            for key in dedup_keys {
                stmt.execute(params![home_id, key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_cold_snap(&self, region: &str) -> RepositoryResult<ColdSnapTracker> {
        Ok(self
            .query_documents("SELECT tracker_json FROM cold_snaps WHERE region = ?1", region)?
            .into_iter()
            .next()
            .unwrap_or_else(|| ColdSnapTracker::new(region)))
    }

    fn save_cold_snap(&self, tracker: &ColdSnapTracker) -> RepositoryResult<()> {
        let json = serde_json::to_string(tracker)?;
        self.connection.lock().execute(
            "INSERT INTO cold_snaps (region, tracker_json) VALUES (?1, ?2)
             ON CONFLICT(region) DO UPDATE SET tracker_json = excluded.tracker_json",
            params![tracker.region, json],
        )?;
        Ok(())
    }
}
