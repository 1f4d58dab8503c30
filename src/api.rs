//! Frontera HTTP: consulta, reindexado administrativo y health check.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::{app_state::AppState, error::RagError, ingest::IndexSummary, models::QueryResult};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

// --- Payloads y respuestas ---

#[derive(Deserialize)]
pub struct QueryPayload {
    question: String,
    #[serde(default)]
    k: Option<i64>,
    #[serde(default)]
    device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReindexPayload {
    #[serde(default)]
    force: bool,
    #[serde(default)]
    device: Option<String>,
}

#[derive(Serialize)]
pub struct ReindexResponse {
    status: &'static str,
    message: &'static str,
    summary: IndexSummary,
}

/// Error de la API serializado como `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: "Invalid ADMIN_TOKEN".to_string(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = match err {
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/admin/reindex", post(reindex_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// --- Handlers ---

#[axum::debug_handler]
async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryPayload>, JsonRejection>,
) -> Result<Json<QueryResult>, ApiError> {
    let Json(payload) = payload?;
    // Un k negativo llega como 0 y el servicio lo rechaza como entrada inválida.
    let k = payload.k.map(|k| usize::try_from(k).unwrap_or(0));
    let result = state
        .service
        .answer_question(&payload.question, k, payload.device.as_deref())
        .await
        .map_err(|e| {
            error!("Error en /query [{}]: {e}", e.root_cause().kind());
            ApiError::from(e)
        })?;
    Ok(Json(result))
}

#[axum::debug_handler]
async fn reindex_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReindexResponse>, ApiError> {
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let authorized = state
        .admin_token
        .as_deref()
        .is_some_and(|expected| constant_time_eq(expected.as_bytes(), provided.as_bytes()));
    if !authorized {
        return Err(ApiError::unauthorized());
    }

    let payload = parse_reindex_body(&body)?;
    info!("Reindexado solicitado (force = {}).", payload.force);
    let summary = state
        .service
        .reindex(payload.force, payload.device.as_deref())
        .await
        .map_err(|e| {
            error!("Error en /admin/reindex [{}]: {e}", e.kind());
            ApiError::from(e)
        })?;

    Ok(Json(ReindexResponse {
        status: "ok",
        message: "Reindex triggered",
        summary,
    }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Cuerpo vacío significa valores por defecto; uno malformado es un 400.
fn parse_reindex_body(body: &[u8]) -> Result<ReindexPayload, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReindexPayload::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("cuerpo de reindexado inválido: {e}")))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
