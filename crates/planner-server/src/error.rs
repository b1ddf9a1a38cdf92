//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gpu_planner::{AttestationError, PlannerError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request body is not valid JSON for the route.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Estimation, planning or manifest validation failed.
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// The service cannot produce or check attestations.
    #[error(transparent)]
    Attestation(#[from] AttestationError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Planner(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::Planner(_) | Self::Attestation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::InvalidBody(_) => "invalid_body",
            Self::Planner(PlannerError::NoFeasiblePlan) => "no_feasible_plan",
            Self::Planner(e) if e.is_validation() => "validation",
            Self::Planner(_) => "internal",
            Self::Attestation(_) => "configuration",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = json!({ "error": self.to_string(), "kind": self.kind() });
        (status, Json(body)).into_response()
    }
}
