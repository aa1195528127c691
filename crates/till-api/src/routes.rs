use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::payload::normalize_log;
use crate::store::{LogStore, ServerDb, ServerLog, SqliteEntityStore, SqliteLogStore};
use crate::undo::UndoEngine;

const MAX_LIST_LIMIT: usize = 1_000;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    db: Arc<Mutex<ServerDb>>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: ServerDb) -> Self {
        Self {
            config,
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn list_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_list_limit)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/logs", get(list_logs).post(create_log))
        .route("/logs/batch", post(create_batch))
        .route("/logs/store/{scope}", get(list_logs_by_scope))
        .route("/logs/type/{kind}", get(list_logs_by_kind))
        .route("/logs/{id}", get(get_log).delete(delete_log))
        .route("/logs/{id}/undo", post(undo_log))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Serialize)]
struct DataResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> DataResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

fn parse_log_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation(format!("invalid log id: {raw}")))
}

async fn create_log(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<DataResponse<ServerLog>>), AppError> {
    let log = normalize_log(&payload, Utc::now().timestamp_millis())?;

    let db = state.db.lock().await;
    let (stored, inserted) = SqliteLogStore::new(db.connection()).insert(&log)?;
    tracing::debug!(id = stored.id, kind = %stored.kind, inserted, "Stored log entry");

    let status = if inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(DataResponse {
            success: true,
            data: stored,
            message: Some(if inserted {
                "Log created".to_string()
            } else {
                "Log already recorded".to_string()
            }),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    logs: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    success: bool,
    message: String,
    inserted: usize,
    ids: std::collections::HashMap<String, i64>,
}

async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    if request.logs.len() > state.config.max_batch_size {
        return Err(AppError::validation(format!(
            "batch of {} exceeds the limit of {}",
            request.logs.len(),
            state.config.max_batch_size
        )));
    }

    let now = Utc::now().timestamp_millis();
    let logs = request
        .logs
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            normalize_log(payload, now).map_err(|error| {
                AppError::validation(format!("logs[{index}]: {error}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut db = state.db.lock().await;
    let tx = db.connection_mut().transaction()?;
    let outcome = SqliteLogStore::new(&tx).insert_batch(&logs)?;
    tx.commit()?;

    tracing::info!(
        received = logs.len(),
        inserted = outcome.inserted,
        "Stored log batch"
    );
    Ok(Json(BatchResponse {
        success: true,
        message: format!("Stored {} of {} logs", outcome.inserted, logs.len()),
        inserted: outcome.inserted,
        ids: outcome.ids,
    }))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DataResponse<Vec<ServerLog>>>, AppError> {
    let limit = state.list_limit(query.limit);
    let db = state.db.lock().await;
    let logs = SqliteLogStore::new(db.connection()).list(limit)?;
    Ok(DataResponse::ok(logs))
}

async fn list_logs_by_scope(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DataResponse<Vec<ServerLog>>>, AppError> {
    let limit = state.list_limit(query.limit);
    let db = state.db.lock().await;
    let logs = SqliteLogStore::new(db.connection()).list_by_scope(scope.trim(), limit)?;
    Ok(DataResponse::ok(logs))
}

async fn list_logs_by_kind(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DataResponse<Vec<ServerLog>>>, AppError> {
    let limit = state.list_limit(query.limit);
    let kind = kind
        .parse::<till_core::EventKind>()
        .map_or_else(|_| kind.trim().to_string(), |parsed| parsed.to_string());
    let db = state.db.lock().await;
    let logs = SqliteLogStore::new(db.connection()).list_by_kind(&kind, limit)?;
    Ok(DataResponse::ok(logs))
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<ServerLog>>, AppError> {
    let id = parse_log_id(&id)?;
    let db = state.db.lock().await;
    let log = SqliteLogStore::new(db.connection())
        .get(id)?
        .ok_or_else(|| AppError::not_found(format!("Log not found: {id}")))?;
    Ok(DataResponse::ok(log))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

async fn delete_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_log_id(&id)?;
    let db = state.db.lock().await;
    if !SqliteLogStore::new(db.connection()).delete(id)? {
        return Err(AppError::not_found(format!("Log not found: {id}")));
    }
    tracing::info!(id, "Deleted log entry");
    Ok(Json(MessageResponse {
        success: true,
        message: "Log deleted".to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UndoResponse {
    success: bool,
    message: String,
    original_log: ServerLog,
}

async fn undo_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UndoResponse>, AppError> {
    let id = parse_log_id(&id)?;
    let mut db = state.db.lock().await;

    // Dropping the transaction on error rolls back any partial reversal
    let tx = db.connection_mut().transaction()?;
    let outcome = {
        let logs = SqliteLogStore::new(&tx);
        let entities = SqliteEntityStore::new(&tx);
        UndoEngine::new(&logs, &entities).undo(id, Utc::now().timestamp_millis())?
    };
    tx.commit()?;

    Ok(Json(UndoResponse {
        success: true,
        message: outcome.message,
        original_log: outcome.original,
    }))
}
