use crate::alerts::{Alert, AlertInputs, evaluate_alerts};
use crate::catalog::{CatalogError, TaskCatalog};
use crate::config::EngineConfig;
use crate::health::{HealthScorer, SystemScore, home_score};
use crate::instance::{CompletionKind, CompletionRecord, TaskInstance};
use crate::persistence::{MaintenanceStore, RepositoryError};
use crate::recurrence::{DataQualityIssue, ensure_scheduled};
use crate::status::TaskStatus;
use crate::system::{Home, HomeId, InspectionRecord, System};
use crate::weather::{RegionWeather, WeatherProvider};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("home {0} not found")]
    HomeNotFound(HomeId),
    #[error("system {0} not found")]
    SystemNotFound(String),
    #[error("task instance {0} not found")]
    InstanceNotFound(Uuid),
    #[error("task instance {0} is already closed")]
    InstanceAlreadyClosed(Uuid),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// True when the caller may reload and try again. The engine never
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Repository(err) if err.is_retryable())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// An open instance with its freshly derived status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: TaskInstance,
    pub status: TaskStatus,
}

/// Everything a dashboard needs for one home at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct HomeReport {
    pub home: Home,
    pub as_of: DateTime<Utc>,
    pub instances: Vec<InstanceView>,
    pub system_scores: Vec<SystemScore>,
    pub home_score: Option<f64>,
    pub alerts: Vec<Alert>,
    pub weather: RegionWeather,
    pub data_quality: Vec<DataQualityIssue>,
    /// Definitions that could not be expanded on this pass.
    pub rejected_definitions: Vec<String>,
}

impl HomeReport {
    pub fn overdue(&self) -> impl Iterator<Item = &InstanceView> {
        self.instances
            .iter()
            .filter(|view| view.status == TaskStatus::Overdue)
    }
}

/// Result of closing an instance: the stored closed copy and whatever the
/// expander scheduled in its place.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedInstance {
    pub closed: TaskInstance,
    pub scheduled: Vec<TaskInstance>,
}

/// Repository-backed orchestration around the pure scheduling, scoring and
/// alert functions. The catalog and config are injected and read-only.
pub struct MaintenanceEngine<S> {
    store: S,
    catalog: TaskCatalog,
    config: EngineConfig,
}

impl<S: MaintenanceStore> MaintenanceEngine<S> {
    pub fn new(store: S, catalog: TaskCatalog, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bring a home's schedule up to date and derive its scores and alerts.
    ///
    /// Missing instances are created, status caches that drifted are written
    /// back, and the region's cold-snap state is advanced. Two recomputes of
    /// the same home racing each other surface as
    /// [`RepositoryError::ConcurrentModification`] from the store.
    pub fn recompute_home(
        &self,
        home_id: &str,
        weather: &dyn WeatherProvider,
        as_of: DateTime<Utc>,
    ) -> EngineResult<HomeReport> {
        let home = self
            .store
            .load_home(home_id)?
            .ok_or_else(|| EngineError::HomeNotFound(home_id.to_string()))?;
        let systems = self.store.load_systems(home_id)?;
        let mut known = self.store.load_open_instances(home_id)?;
        known.extend(self.store.load_instance_history(home_id)?);

        let mut data_quality = Vec::new();
        let mut rejected = Vec::new();
        let mut open = Vec::new();
        for system in &systems {
            let definitions = self.catalog.for_category(system.category);
            let outcome = ensure_scheduled(system, &definitions, &known, as_of);
            open.extend(outcome.existing);
            for created in &outcome.created {
                open.push(self.store.save_instance(created)?);
            }
            data_quality.extend(outcome.issues);
            rejected.extend(outcome.rejected.iter().map(CatalogError::to_string));
        }

        let as_of_date = as_of.date_naive();
        let mut instances = Vec::with_capacity(open.len());
        for mut instance in open {
            let window = self.config.due_soon_window(&self.catalog, &instance);
            if instance.refresh_cached_status(window, as_of_date) {
                instance = self.store.save_instance(&instance)?;
            }
            let status = instance.status(window, as_of_date);
            instances.push(InstanceView { instance, status });
        }
        instances.sort_by(|a, b| {
            a.instance
                .due_date
                .cmp(&b.instance.due_date)
                .then_with(|| a.instance.id.cmp(&b.instance.id))
        });

        let region_weather = self.evaluate_weather(&home, weather, as_of)?;

        let open_instances: Vec<TaskInstance> =
            instances.iter().map(|view| view.instance.clone()).collect();
        let scorer = HealthScorer::new(&self.catalog, &self.config);
        let system_scores: Vec<SystemScore> = systems
            .iter()
            .map(|system| scorer.system_score(system, &open_instances, as_of_date))
            .collect();
        let composite = home_score(&system_scores, &self.config.category_weights);

        let dismissed = self.store.load_dismissed_alert_keys(home_id)?;
        let evaluation = evaluate_alerts(&AlertInputs {
            systems: &systems,
            instances: &open_instances,
            weather: std::slice::from_ref(&region_weather),
            dismissed: &dismissed,
            catalog: &self.catalog,
            config: &self.config,
            as_of,
        });
        let stale = evaluation.stale_dismissals(&dismissed);
        if !stale.is_empty() {
            self.store.clear_dismissed_alerts(home_id, &stale)?;
            debug!(
                target: "frostline",
                event = "dismissals_cleared",
                home_id = %home.id,
                count = stale.len()
            );
        }
        let alerts = evaluation.alerts;

        info!(
            target: "frostline",
            event = "home_recomputed",
            home_id = %home.id,
            systems = systems.len(),
            open_instances = instances.len(),
            alerts = alerts.len(),
            issues = data_quality.len()
        );

        Ok(HomeReport {
            home,
            as_of,
            instances,
            system_scores,
            home_score: composite,
            alerts,
            weather: region_weather,
            data_quality,
            rejected_definitions: rejected,
        })
    }

    /// Recompute several homes in parallel. Each entry carries its own
    /// result so one failing home does not hide the others.
    pub fn recompute_homes(
        &self,
        home_ids: &[HomeId],
        weather: &dyn WeatherProvider,
        as_of: DateTime<Utc>,
    ) -> Vec<(HomeId, EngineResult<HomeReport>)> {
        home_ids
            .par_iter()
            .map(|home_id| (home_id.clone(), self.recompute_home(home_id, weather, as_of)))
            .collect()
    }

    pub fn complete_instance(
        &self,
        instance_id: Uuid,
        record: CompletionRecord,
    ) -> EngineResult<ClosedInstance> {
        let record = CompletionRecord {
            kind: CompletionKind::Completed,
            ..record
        };
        self.close_instance(instance_id, record)
    }

    /// Close an instance without doing the work. The next occurrence keeps
    /// the original cadence.
    pub fn skip_instance(
        &self,
        instance_id: Uuid,
        skipped_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> EngineResult<ClosedInstance> {
        let record = CompletionRecord {
            notes: reason,
            ..CompletionRecord::skipped(skipped_at)
        };
        self.close_instance(instance_id, record)
    }

    pub fn dismiss_alert(
        &self,
        home_id: &str,
        dedup_key: &str,
        dismissed_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        if self.store.load_home(home_id)?.is_none() {
            return Err(EngineError::HomeNotFound(home_id.to_string()));
        }
        self.store.dismiss_alert(home_id, dedup_key, dismissed_at)?;
        debug!(target: "frostline", event = "alert_dismissed", home_id, dedup_key);
        Ok(())
    }

    pub fn record_inspection(
        &self,
        home_id: &str,
        system_id: &str,
        record: InspectionRecord,
    ) -> EngineResult<System> {
        let mut system = self.load_system(home_id, system_id)?;
        system.inspections.push(record);
        self.store.save_system(&system)?;
        Ok(system)
    }

    /// Closed instances for a home, most recently closed first.
    pub fn timeline(&self, home_id: &str) -> EngineResult<Vec<TaskInstance>> {
        if self.store.load_home(home_id)?.is_none() {
            return Err(EngineError::HomeNotFound(home_id.to_string()));
        }
        let mut history = self.store.load_instance_history(home_id)?;
        history.sort_by(|a, b| {
            let closed = |instance: &TaskInstance| {
                instance.completion.as_ref().map(|record| record.closed_at)
            };
            closed(b).cmp(&closed(a)).then_with(|| a.id.cmp(&b.id))
        });
        Ok(history)
    }

    fn close_instance(
        &self,
        instance_id: Uuid,
        record: CompletionRecord,
    ) -> EngineResult<ClosedInstance> {
        let mut instance = self
            .store
            .load_instance(instance_id)?
            .ok_or(EngineError::InstanceNotFound(instance_id))?;
        if !instance.is_open() {
            return Err(EngineError::InstanceAlreadyClosed(instance_id));
        }

        let closed_at = record.closed_at;
        let kind = record.kind;
        instance.close(record);
        let closed = self.store.save_instance(&instance)?;

        let mut system = self.load_system(&closed.home_id, &closed.system_id)?;
        if kind == CompletionKind::Completed {
            system.record_service(closed_at.date_naive());
            self.store.save_system(&system)?;
        }

        let mut known = self.store.load_open_instances(&closed.home_id)?;
        known.extend(self.store.load_instance_history(&closed.home_id)?);
        let definitions = self.catalog.for_category(system.category);
        let outcome = ensure_scheduled(&system, &definitions, &known, closed_at);
        let mut scheduled = Vec::with_capacity(outcome.created.len());
        for created in &outcome.created {
            scheduled.push(self.store.save_instance(created)?);
        }

        info!(
            target: "frostline",
            event = "instance_closed",
            instance_id = %closed.id,
            system_id = %closed.system_id,
            skipped = kind == CompletionKind::Skipped,
            scheduled = scheduled.len()
        );
        Ok(ClosedInstance { closed, scheduled })
    }

    fn load_system(&self, home_id: &str, system_id: &str) -> EngineResult<System> {
        self.store
            .load_systems(home_id)?
            .into_iter()
            .find(|system| system.id == system_id)
            .ok_or_else(|| EngineError::SystemNotFound(system_id.to_string()))
    }

    fn evaluate_weather(
        &self,
        home: &Home,
        weather: &dyn WeatherProvider,
        as_of: DateTime<Utc>,
    ) -> EngineResult<RegionWeather> {
        let previous = self.store.load_cold_snap(&home.region)?;
        let reading = weather.current_reading(&home.region);
        let evaluated = RegionWeather::evaluate(
            previous.clone(),
            reading.as_ref(),
            as_of,
            self.config.weather_freshness(),
            self.config.extreme_cold_threshold_c,
        );
        if !evaluated.assessment.is_known() {
            warn!(
                target: "frostline",
                event = "weather_unknown",
                region = %home.region,
                assessment = ?evaluated.assessment
            );
        }
        if evaluated.snap != previous {
            self.store.save_cold_snap(&evaluated.snap)?;
        }
        Ok(evaluated)
    }
}
