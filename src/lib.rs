pub mod alerts;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod health;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod instance;
pub mod persistence;
pub mod recurrence;
pub mod status;
pub mod system;
pub mod weather;

pub use alerts::{Alert, AlertEvaluation, AlertPriority, AlertType, derive_alerts, evaluate_alerts};
pub use catalog::{Priority, Recurrence, TaskCatalog, TaskDefinition};
pub use config::EngineConfig;
pub use engine::{EngineError, HomeReport, MaintenanceEngine};
pub use health::{CategoryWeights, HealthScorer, ScoreWeights, SystemScore};
pub use instance::{CompletionRecord, TaskInstance};
pub use persistence::{InMemoryStore, MaintenanceStore, RepositoryError};
pub use status::{TaskStatus, classify};
pub use system::{Home, InspectionOutcome, InspectionRecord, System, SystemCategory};
pub use weather::{ColdSnapTracker, StaticWeather, WeatherProvider, WeatherReading};
