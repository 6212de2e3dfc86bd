//! API error types and responses.
//!
//! Every failed request answers with `{"error": {"code", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use agora_actor::ActorError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed identity headers.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A collaborator behind the actor failed.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// The organization's actor could not be reached.
    #[error("service unavailable")]
    Unavailable,

    /// The organization's actor did not answer in time.
    #[error("timed out")]
    Timeout,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::BadGateway(_) => "bad_gateway",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ActorError> for ApiError {
    fn from(err: ActorError) -> Self {
        match err {
            ActorError::RoomNotFound(_)
            | ActorError::MemberNotFound { .. }
            | ActorError::AgentConfigNotFound(_)
            | ActorError::ThreadRootNotFound(_)
            | ActorError::MessageNotFound(_)
            | ActorError::WorkflowNotFound(_) => Self::NotFound(err.to_string()),
            ActorError::ScheduleParse(_) | ActorError::InvalidFrame(_) => {
                Self::BadRequest(err.to_string())
            }
            ActorError::Routing(_) | ActorError::Model(_) => {
                tracing::warn!(error = %err, "Upstream collaborator failed");
                Self::BadGateway(err.to_string())
            }
            ActorError::ActorUnavailable(_) => Self::Unavailable,
            ActorError::Timeout => Self::Timeout,
            ActorError::Store(_) | ActorError::WorkflowExecution { .. } | ActorError::Internal(_) => {
                tracing::error!(error = %err, "Internal error");
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{OrganizationId, RoomId};

    #[test]
    fn error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("room".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn actor_errors_keep_their_status() {
        let errors = [
            ActorError::RoomNotFound(RoomId::generate()),
            ActorError::InvalidFrame("bad".into()),
            ActorError::ActorUnavailable(OrganizationId::generate()),
            ActorError::Timeout,
            ActorError::Internal("boom".into()),
        ];

        for err in errors {
            let expected = err.http_status_code();
            assert_eq!(ApiError::from(err).status_code().as_u16(), expected);
        }
    }

    #[test]
    fn not_found_message_names_the_resource() {
        let room_id = RoomId::generate();
        let err = ApiError::from(ActorError::RoomNotFound(room_id));
        assert_eq!(err.code(), "not_found");
        assert!(err.to_string().contains(&room_id.to_string()));
    }
}
