//! HTTP error mapping.
//!
//! Every handler returns [`ApiError`], which turns domain errors into a
//! status code and a JSON body of the form `{ "error": "...", ... }`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rootcause::Report;
use serde_json::json;
use std::fmt;
use weaver_core::ParseIdError;
use weaver_workflow::{OrchestratorError, PersistenceError, ValidationError};

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request was malformed.
    BadRequest { message: String },
    /// The addressed resource does not exist.
    NotFound { message: String },
    /// The graph has blocking validation errors.
    Validation { errors: Vec<ValidationError> },
    /// The request conflicts with the current state.
    Conflict { message: String },
    /// The service is shutting down.
    Unavailable,
    /// Anything the client cannot fix.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest { message } => write!(f, "bad request: {message}"),
            Self::NotFound { message } => write!(f, "not found: {message}"),
            Self::Validation { errors } => {
                write!(f, "workflow has {} validation error(s)", errors.len())
            }
            Self::Conflict { message } => write!(f, "conflict: {message}"),
            Self::Unavailable => write!(f, "service is shutting down"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::WorkflowNotFound { .. } | PersistenceError::RunNotFound { .. } => {
                Self::NotFound {
                    message: e.to_string(),
                }
            }
            PersistenceError::RunImmutable { .. } => Self::Conflict {
                message: e.to_string(),
            },
            PersistenceError::Unavailable { .. } => Self::Internal {
                details: e.to_string(),
            },
        }
    }
}

impl From<Report<OrchestratorError>> for ApiError {
    fn from(report: Report<OrchestratorError>) -> Self {
        match report.current_context() {
            OrchestratorError::ValidationFailed { errors } => Self::Validation {
                errors: errors.clone(),
            },
            OrchestratorError::Persistence(e) => e.clone().into(),
            OrchestratorError::UnknownTrigger { node_id } => Self::BadRequest {
                message: format!("not a trigger node: {node_id}"),
            },
            OrchestratorError::RunNotActive { run_id } => Self::Conflict {
                message: format!("run is not active: {run_id}"),
            },
            OrchestratorError::ShuttingDown => Self::Unavailable,
            OrchestratorError::Planning { .. } => Self::Internal {
                details: report.to_string(),
            },
        }
    }
}

impl From<ParseIdError> for ApiError {
    fn from(e: ParseIdError) -> Self {
        Self::BadRequest {
            message: e.to_string(),
        }
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation { errors } => json!({ "error": self.to_string(), "errors": errors }),
            Self::Internal { details } => {
                tracing::error!(%details, "request failed");
                json!({ "error": "internal server error" })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_core::{WorkflowId, WorkflowRunId};

    fn from_orchestrator(e: OrchestratorError) -> ApiError {
        let report: Report<OrchestratorError> = e.into();
        ApiError::from(report)
    }

    #[test]
    fn orchestrator_errors_map_to_statuses() {
        let validation = from_orchestrator(OrchestratorError::ValidationFailed {
            errors: vec![ValidationError::NoTrigger],
        });
        assert_eq!(validation.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing = from_orchestrator(OrchestratorError::Persistence(
            PersistenceError::WorkflowNotFound {
                workflow_id: WorkflowId::new(),
            },
        ));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let inactive = from_orchestrator(OrchestratorError::RunNotActive {
            run_id: WorkflowRunId::new(),
        });
        assert_eq!(inactive.status(), StatusCode::CONFLICT);

        assert_eq!(
            from_orchestrator(OrchestratorError::ShuttingDown).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn store_outage_is_internal() {
        let err = ApiError::from(PersistenceError::Unavailable {
            reason: "pool closed".to_string(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
