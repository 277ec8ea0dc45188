use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures the record resolver can run into.
///
/// A missing farmer is not an error: the resolver reports it as `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    /// The phone number could not be read as an integer.
    #[error("Invalid phone number '{input}': expected an integer")]
    InvalidInput { input: String },
    /// The dataset could not be fetched or is malformed.
    #[error("Dataset unavailable: {0}")]
    UpstreamFetch(String),
    /// Feature derivation, prediction or explanation failed.
    #[error("Model step failed: {0}")]
    Model(String),
}

impl ResolveError {
    /// Stable identifier used in the `error_kind` response field.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::InvalidInput { .. } => "invalid_input",
            ResolveError::UpstreamFetch(_) => "upstream_fetch_failure",
            ResolveError::Model(_) => "model_failure",
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::UpstreamFetch(err.to_string())
    }
}

impl From<csv::Error> for ResolveError {
    fn from(err: csv::Error) -> Self {
        ResolveError::UpstreamFetch(format!("malformed dataset: {}", err))
    }
}

/// Application-specific HTTP error types.
///
/// Lookups never surface these; they cover request handling outside the resolver.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (unreadable body or form).
    BadRequest(String),
    /// No route matched.
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each variant to a status code and a JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
