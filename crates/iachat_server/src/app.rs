use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use iachat_contract::UPLOAD_PATH;
use iachat_llm::ChatModel;
use iachat_storage::UploadStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{chat, upload};

const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub default_model: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub contains: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: UploadStore,
    pub model: Arc<dyn ChatModel>,
    pub settings: Arc<ServerSettings>,
    pub log_buffer: Arc<RwLock<Vec<LogLine>>>,
}

impl AppState {
    pub fn new(store: UploadStore, model: Arc<dyn ChatModel>, settings: ServerSettings) -> Self {
        Self {
            store,
            model,
            settings: Arc::new(settings),
            log_buffer: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route(UPLOAD_PATH, post(upload::post_upload))
        .route("/api/files", get(upload::list_files))
        .route("/api/files/{stored_name}", get(upload::download_file))
        .route("/api/files/{stored_name}/delete", post(upload::delete_file))
        .route("/chat", post(chat::post_chat))
        .route("/v1/logs", get(get_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.store.ping().await.is_ok();
    let payload = Json(json!({
        "status": if ready { "ready" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339()
    }));

    if ready {
        (StatusCode::OK, payload).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, payload).into_response()
    }
}

async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(200);
    let level_filter = query.level.as_deref().map(str::to_ascii_lowercase);
    let contains_filter = query.contains.as_deref().map(str::to_owned);

    let logs = state.log_buffer.read().await;
    let mut items: Vec<LogLine> = logs
        .iter()
        .filter(|entry| {
            if let Some(level) = &level_filter {
                if entry.level.to_ascii_lowercase() != *level {
                    return false;
                }
            }

            if let Some(needle) = &contains_filter {
                if !entry.message.contains(needle) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    if items.len() > limit {
        let start = items.len().saturating_sub(limit);
        items = items.split_off(start);
    }

    Json(json!({ "items": items }))
}

pub(crate) fn internal_error(error: anyhow::Error) -> (StatusCode, Json<Value>) {
    error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
}

pub(crate) async fn write_log(state: &AppState, level: &str, message: &str) {
    match level {
        "error" => error!(message = %message, "server log entry"),
        "warn" => warn!(message = %message, "server log entry"),
        _ => info!(message = %message, "server log entry"),
    }

    let mut buffer = state.log_buffer.write().await;
    buffer.push(LogLine {
        timestamp: Utc::now().to_rfc3339(),
        level: level.to_string(),
        message: message.to_string(),
    });

    if buffer.len() > LOG_CAPACITY {
        let keep_start = buffer.len() - LOG_CAPACITY;
        let trimmed = buffer.split_off(keep_start);
        *buffer = trimmed;
    }
}
