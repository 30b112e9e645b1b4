use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::engine::{ClosedInstance, EngineError, HomeReport, MaintenanceEngine};
use crate::instance::{CompletionRecord, TaskInstance};
use crate::persistence::{InMemoryStore, MaintenanceStore, RepositoryError};
use crate::system::{Home, System};
use crate::weather::{StaticWeather, WeatherReading};

pub type Engine = MaintenanceEngine<InMemoryStore>;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    weather: Arc<StaticWeather>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
            weather: Arc::new(StaticWeather::new()),
        }
    }

    pub fn with_shared(engine: Arc<Engine>, weather: Arc<StaticWeather>) -> Self {
        Self { engine, weather }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn weather(&self) -> &StaticWeather {
        &self.weather
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    retryable: bool,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict { message: String, retryable: bool },
    Invalid(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::HomeNotFound(_)
            | EngineError::SystemNotFound(_)
            | EngineError::InstanceNotFound(_)
            | EngineError::Repository(RepositoryError::NotFound { .. }) => {
                ApiError::NotFound(message)
            }
            EngineError::InstanceAlreadyClosed(_) => ApiError::Conflict {
                message,
                retryable: false,
            },
            EngineError::Repository(RepositoryError::ConcurrentModification { .. }) => {
                ApiError::Conflict {
                    message,
                    retryable: true,
                }
            }
            EngineError::Repository(RepositoryError::InvalidData(_)) => ApiError::Invalid(message),
            EngineError::Repository(_) => ApiError::Internal(message),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::from(EngineError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, retryable) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, false),
            ApiError::Conflict { message, retryable } => {
                (StatusCode::CONFLICT, "conflict", message, retryable)
            }
            ApiError::Invalid(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message, false)
            }
            ApiError::Internal(message) => {
                warn!(target: "frostline", event = "http_internal_error", %message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    message,
                    false,
                )
            }
        };
        let body = Json(ErrorBody {
            error,
            message,
            retryable,
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletePayload {
    completed_at: Option<DateTime<Utc>>,
    performer: Option<String>,
    cost: Option<f64>,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SkipPayload {
    skipped_at: Option<DateTime<Utc>>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DismissPayload {
    dedup_key: String,
    dismissed_at: Option<DateTime<Utc>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/homes", post(create_home))
        .route("/homes/:id/systems", post(create_system))
        .route("/homes/:id/report", get(home_report))
        .route("/homes/:id/timeline", get(home_timeline))
        .route("/homes/:id/alerts/dismiss", post(dismiss_alert))
        .route("/instances/:id/complete", post(complete_instance))
        .route("/instances/:id/skip", post(skip_instance))
        .route("/regions/:region/weather", put(record_weather))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn create_home(
    State(state): State<AppState>,
    Json(home): Json<Home>,
) -> Result<(StatusCode, Json<Home>), ApiError> {
    let store = state.engine().store();
    if store.load_home(&home.id)?.is_some() {
        return Err(ApiError::Conflict {
            message: format!("home {} already exists", home.id),
            retryable: false,
        });
    }
    store.save_home(&home)?;
    Ok((StatusCode::CREATED, Json(home)))
}

async fn create_system(
    State(state): State<AppState>,
    Path(home_id): Path<String>,
    Json(system): Json<System>,
) -> Result<(StatusCode, Json<System>), ApiError> {
    if system.home_id != home_id {
        return Err(ApiError::Invalid(
            "home id in payload does not match path parameter".into(),
        ));
    }
    state.engine().store().save_system(&system)?;
    Ok((StatusCode::CREATED, Json(system)))
}

async fn home_report(
    State(state): State<AppState>,
    Path(home_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<HomeReport>, ApiError> {
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    let report = state
        .engine()
        .recompute_home(&home_id, state.weather(), as_of)?;
    Ok(Json(report))
}

async fn home_timeline(
    State(state): State<AppState>,
    Path(home_id): Path<String>,
) -> Result<Json<Vec<TaskInstance>>, ApiError> {
    Ok(Json(state.engine().timeline(&home_id)?))
}

async fn complete_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
    payload: Option<Json<CompletePayload>>,
) -> Result<Json<ClosedInstance>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    if let Some(cost) = payload.cost {
        if !cost.is_finite() || cost < 0.0 {
            return Err(ApiError::Invalid(format!("invalid cost {cost}")));
        }
    }
    let record = CompletionRecord {
        performer: payload.performer,
        cost: payload.cost,
        notes: payload.notes,
        ..CompletionRecord::completed(payload.completed_at.unwrap_or_else(Utc::now))
    };
    Ok(Json(state.engine().complete_instance(instance_id, record)?))
}

async fn skip_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
    payload: Option<Json<SkipPayload>>,
) -> Result<Json<ClosedInstance>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    let skipped_at = payload.skipped_at.unwrap_or_else(Utc::now);
    Ok(Json(state.engine().skip_instance(
        instance_id,
        skipped_at,
        payload.reason,
    )?))
}

async fn dismiss_alert(
    State(state): State<AppState>,
    Path(home_id): Path<String>,
    Json(payload): Json<DismissPayload>,
) -> Result<StatusCode, ApiError> {
    if payload.dedup_key.trim().is_empty() {
        return Err(ApiError::Invalid("dedup_key must not be empty".into()));
    }
    let at = payload.dismissed_at.unwrap_or_else(Utc::now);
    state
        .engine()
        .dismiss_alert(&home_id, &payload.dedup_key, at)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_weather(
    State(state): State<AppState>,
    Path(region): Path<String>,
    Json(reading): Json<WeatherReading>,
) -> StatusCode {
    state.weather().record(region, reading);
    StatusCode::NO_CONTENT
}
