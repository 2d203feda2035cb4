// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

pub mod apps {
    #[path = "symptom-checker/mod.rs"]
    pub mod symptom_checker;
}

pub mod app {
    pub use crate::apps::symptom_checker::*;
}

pub mod config;

use crate::app::{GenerativeModel, QueryStore};
use crate::config::AppConfig;

/// App state shared by every handler. Built once at start-up, never mutated.
pub struct AppState {
    /// Configuration resolved from the environment.
    pub config: AppConfig,
    /// Provider backend the model invoker calls.
    pub model: Arc<dyn GenerativeModel>,
    /// Query log, present only when persistence is enabled and the store opened.
    pub store: Option<Arc<QueryStore>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        model: Arc<dyn GenerativeModel>,
        store: Option<Arc<QueryStore>>,
    ) -> Self {
        Self {
            config,
            model,
            store,
        }
    }
}

/// Errors surfaced by the symptom checker.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    #[error("model returned an empty response")]
    UpstreamEmptyResponse,
    #[error("model returned a non-JSON response: {0}")]
    UnparsableResponse(String),
    #[error("model provider error: {0}")]
    Upstream(String),
    #[error("{0}")]
    NotFound(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckerError {
    /// Operational failures that the heuristic fallback may stand in for.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            CheckerError::Configuration(_)
                | CheckerError::UpstreamEmptyResponse
                | CheckerError::UnparsableResponse(_)
                | CheckerError::Upstream(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CheckerError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            CheckerError::UpstreamEmptyResponse
            | CheckerError::UnparsableResponse(_)
            | CheckerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CheckerError::NotFound(_) => StatusCode::NOT_FOUND,
            CheckerError::Persistence(_) | CheckerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Implement IntoResponse for CheckerError.
impl IntoResponse for CheckerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "detail": self.to_string(),
        }));
        (status, body).into_response()
    }
}
