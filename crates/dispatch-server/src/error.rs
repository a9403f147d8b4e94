//! Error types for the dispatch HTTP layer.
//!
//! [`ApiError`] unifies every failure a handler can produce and converts
//! into a JSON response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation:
//!
//! ```json
//! { "error": "conflict: unit 1A-10 is assigned to call ...", "kind": "conflict", "status": 409 }
//! ```
//!
//! Retryable failures additionally carry `"retryable": true`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch_core::MutationError;
use dispatch_db::DbError;

/// Errors that can occur in the dispatch API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A mutation was rejected.
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// A read-side lookup found nothing.
    #[error("{0} not found")]
    NotFound(String),

    /// The caller did not identify themselves.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A path segment or query parameter could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The store could not serve a read.
    #[error("store unavailable: {0}")]
    Store(#[from] DbError),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Mutation(e) => match e {
                MutationError::NotFound { .. } => StatusCode::NOT_FOUND,
                MutationError::Forbidden(_) => StatusCode::FORBIDDEN,
                MutationError::Conflict(_) => StatusCode::CONFLICT,
                MutationError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                MutationError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Mutation(e) => e.kind(),
            Self::NotFound(_) => "notFound",
            Self::Unauthorized(_) => "unauthorized",
            Self::BadRequest(_) => "badRequest",
            Self::Store(_) => "unavailable",
        }
    }

    const fn retryable(&self) -> bool {
        match self {
            Self::Mutation(e) => e.retryable(),
            Self::Store(_) => true,
            Self::NotFound(_) | Self::Unauthorized(_) | Self::BadRequest(_) => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16(),
        });
        if self.retryable() {
            body["retryable"] = serde_json::Value::Bool(true);
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn mutation_errors_map_to_http_statuses() {
        let cases = [
            (MutationError::not_found("call", "x"), StatusCode::NOT_FOUND),
            (MutationError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (MutationError::Conflict("busy".into()), StatusCode::CONFLICT),
            (
                MutationError::Invalid("bad".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MutationError::Unavailable("slow".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[tokio::test]
    async fn unavailable_body_is_marked_retryable() {
        let response = ApiError::from(MutationError::Unavailable("timeout".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], "unavailable");
        assert_eq!(json["status"], 503);
        assert_eq!(json["retryable"], true);
    }
}
