//! RPC error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use civic_verification::EngineError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    Server(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl RpcError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            RpcError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            RpcError::Server(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
            RpcError::Engine(e) => match e {
                EngineError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated"),
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::InvalidLocation(_) => (StatusCode::BAD_REQUEST, "invalid_location"),
                EngineError::InvalidIssue(_) => (StatusCode::BAD_REQUEST, "invalid_issue"),
                EngineError::InvalidParams(_) => (StatusCode::BAD_REQUEST, "invalid_params"),
                EngineError::OutOfRange { .. } => (StatusCode::FORBIDDEN, "out_of_range"),
                EngineError::SelfVote => (StatusCode::FORBIDDEN, "self_vote"),
                EngineError::AlreadyVoted { .. } => (StatusCode::CONFLICT, "already_voted"),
                EngineError::IssueClosed { .. } => (StatusCode::CONFLICT, "issue_closed"),
                EngineError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition")
                }
                EngineError::PersistenceConflict { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "persistence_conflict")
                }
                EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            },
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}
