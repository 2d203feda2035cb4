// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod endpoints;
pub mod fallback;
pub mod llm;
pub mod normalize;
pub mod prompt;
pub mod store;
pub mod types;

pub use endpoints::router;
pub use fallback::heuristic_analysis;
pub use llm::{GenerativeModel, HttpModelClient, ModelError, ModelInvoker};
pub use normalize::normalize;
pub use prompt::build_prompt;
pub use store::QueryStore;
pub use types::*;

use crate::config::AppConfig;
use crate::AppState;
use crate::CheckerError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying a caller-supplied model credential.
pub const CLIENT_KEY_HEADER: &str = "x-llm-api-key";
/// Older name of the same header, still sent by the web form.
pub const LEGACY_CLIENT_KEY_HEADER: &str = "x-google-key";
/// Client keys of this length or shorter are ignored.
const MIN_CLIENT_KEY_LEN: usize = 20;

/// Credential from the request headers, when the server allows clients to supply one.
pub fn client_api_key(config: &AppConfig, headers: &HeaderMap) -> Option<String> {
    if !config.allow_client_api_key {
        return None;
    }
    [CLIENT_KEY_HEADER, LEGACY_CLIENT_KEY_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|key| key.len() > MIN_CLIENT_KEY_LEN)
        .map(str::to_string)
}

/// Produce the analysis core for a validated request.
///
/// Stub mode skips the model entirely. Otherwise operational failures fall back to the
/// keyword heuristic when the config allows it.
pub async fn analyze(
    state: &AppState,
    request: &ValidatedRequest,
    client_key: Option<&str>,
) -> Result<AnalysisCore, CheckerError> {
    if state.config.stub_mode {
        info!("Stub mode: answering with heuristic analysis");
        return Ok(heuristic_analysis(&request.symptoms));
    }

    match analyze_with_model(state, request, client_key).await {
        Ok(core) => Ok(core),
        Err(err) if err.is_operational() && state.config.heuristic_fallback => {
            warn!("Model analysis failed, using heuristic fallback: {}", err);
            Ok(heuristic_analysis(&request.symptoms))
        }
        Err(err) => Err(err),
    }
}

async fn analyze_with_model(
    state: &AppState,
    request: &ValidatedRequest,
    client_key: Option<&str>,
) -> Result<AnalysisCore, CheckerError> {
    let prompt = build_prompt(&request.symptoms, request.age, request.gender.as_deref());
    let api_key = client_key.or(state.config.api_key.as_deref());

    let raw = ModelInvoker::new(state.model.as_ref(), &state.config.candidate_models)
        .invoke(api_key, &prompt)
        .await?;

    normalize(&raw, &request.symptoms)
}

/// Analyze symptoms and return probable conditions with recommendations.
pub async fn check_symptoms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, CheckerError> {
    let Json(request) = payload.map_err(|e| CheckerError::Validation(e.body_text()))?;
    let request = request.validate().map_err(CheckerError::Validation)?;

    info!(
        "Processing symptom check ({} chars, age given: {}, gender given: {})",
        request.symptoms.chars().count(),
        request.age.is_some(),
        request.gender.is_some()
    );

    let client_key = client_api_key(&state.config, &headers);
    let core = analyze(&state, &request, client_key.as_deref()).await?;
    let mut result = AnalysisResult::from_core(core, Utc::now());

    if let Some(store) = &state.store {
        result.query_id = persist(store.clone(), &request, &result).await;
    }

    info!(
        "Symptom check complete: {} conditions, {} recommendations, warning: {}",
        result.probable_conditions.len(),
        result.recommendations.len(),
        result.emergency_warning.is_some()
    );

    Ok(Json(result))
}

/// Append the result to the query log. Failures are logged and never fail the request.
async fn persist(
    store: Arc<QueryStore>,
    request: &ValidatedRequest,
    result: &AnalysisResult,
) -> Option<i64> {
    let symptoms = request.symptoms.clone();
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let core = AnalysisCore {
        probable_conditions: result.probable_conditions.clone(),
        recommendations: result.recommendations.clone(),
        emergency_warning: result.emergency_warning.clone(),
    };
    let created_at = result.timestamp;

    let outcome = store::run_blocking(store, move |s| {
        s.insert(&symptoms, &core, &session_id, created_at)
    })
    .await;

    match outcome {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Failed to persist query: {}", e);
            None
        }
    }
}
