use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::error::PostsError;

/// `{ "error": .., "details": [..] }`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Status code and body for a service error. Storage details stay in the log.
#[must_use]
pub fn error_response(e: &PostsError) -> (StatusCode, ErrorBody) {
    match e {
        PostsError::InvalidPayload(message) => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "Invalid payload".to_owned(),
                details: vec![message.clone()],
            },
        ),
        PostsError::Validation { entity, errors } => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: format!("Invalid {entity}"),
                details: errors.messages(),
            },
        ),
        PostsError::SourceNotFound(id) => (
            StatusCode::NOT_FOUND,
            ErrorBody {
                error: format!("Source {id} not found"),
                details: Vec::new(),
            },
        ),
        PostsError::MissingId(_) | PostsError::Storage(_) => {
            tracing::error!(error = %e, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "There was an error processing the request".to_owned(),
                    details: Vec::new(),
                },
            )
        }
    }
}

impl IntoResponse for PostsError {
    fn into_response(self) -> Response {
        let (status, body) = error_response(&self);
        (status, Json(body)).into_response()
    }
}
