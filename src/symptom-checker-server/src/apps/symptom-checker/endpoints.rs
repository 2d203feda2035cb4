use super::*;
use axum::extract::{Path, Query};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;

/// All routes of the service, with permissive CORS for the browser form.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/check-symptoms", post(check_symptoms))
        .route("/api/history", get(history))
        .route("/api/query/:id", get(get_query))
        .route("/api/disclaimer", get(disclaimer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Service and configuration status.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Healthcare Symptom Checker API is operational".to_string(),
        llm_provider: config.provider.to_string(),
        llm_configured: config.llm_configured(),
        stub_mode: config.stub_mode,
        allow_client_api_key: config.allow_client_api_key,
        heuristic_fallback: config.heuristic_fallback,
        persistence_enabled: config.persistence_enabled,
        persistence_ready: state.store.is_some(),
    })
}

pub async fn disclaimer() -> Json<DisclaimerResponse> {
    Json(DisclaimerResponse {
        disclaimer: MEDICAL_DISCLAIMER.to_string(),
    })
}

/// Requested page size, clamped. Missing, empty or non-numeric values give the default.
fn history_limit(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT) as usize
}

/// Recent queries, newest first. Always a list: persistence problems yield an empty one.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<QueryHistory>> {
    let Some(store) = state.store.clone() else {
        return Json(Vec::new());
    };

    let limit = history_limit(params.limit.as_deref());
    let session_id = params
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match store::run_blocking(store, move |s| s.history(limit, session_id.as_deref())).await {
        Ok(rows) => Json(rows),
        Err(e) => {
            warn!("Failed to read history: {}", e);
            Json(Vec::new())
        }
    }
}

/// One stored analysis by id.
pub async fn get_query(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<AnalysisResult>, CheckerError> {
    let not_found = || CheckerError::NotFound("Query not found".to_string());
    let Ok(id) = raw_id.trim().parse::<i64>() else {
        return Err(not_found());
    };
    let Some(store) = state.store.clone() else {
        return Err(not_found());
    };

    match store::run_blocking(store, move |s| s.get(id)).await {
        Ok(Some(stored)) => Ok(Json(stored.into_result())),
        Ok(None) => Err(not_found()),
        Err(e) => {
            warn!("Failed to read query {}: {}", id, e);
            Err(not_found())
        }
    }
}
