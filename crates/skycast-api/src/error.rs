//! Error types for the Skycast API
//!
//! Errors are rendered as RFC 7807 problem details
//! (`application/problem+json`).

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use skycast_identity::{ConfigError, CredentialError};
use thiserror::Error;
use uuid::Uuid;

pub const PROBLEM_JSON: &str = "application/problem+json";

/// Errors returned by request handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Identity '{0}' is not registered")]
    IdentityNotFound(String),

    #[error("Token acquisition for identity '{identity}' failed: {source}")]
    Credential {
        identity: String,
        #[source]
        source: CredentialError,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::IdentityNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Credential { source, .. } => match source {
                CredentialError::InvalidScope(_) => StatusCode::BAD_REQUEST,
                CredentialError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ApiError::IdentityNotFound(_) => "Identity not found",
            ApiError::Credential { .. } => "Token acquisition failed",
            ApiError::BadRequest(_) => "Bad request",
            ApiError::NotFound(_) => "Not found",
            ApiError::Internal(_) => "An error occurred while processing your request",
        }
    }

    pub fn to_problem(&self) -> ProblemDetails {
        ProblemDetails::new(self.status_code(), self.title(), Some(self.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem = self.to_problem();

        if problem.status >= 500 {
            tracing::warn!(trace_id = %problem.trace_id, error = %self, "Request failed");
        } else {
            tracing::debug!(trace_id = %problem.trace_id, error = %self, "Request rejected");
        }

        problem.into_response()
    }
}

/// RFC 7807 problem details body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub trace_id: Uuid,
}

impl ProblemDetails {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            problem_type: problem_type_for(status).to_string(),
            title: title.into(),
            status: status.as_u16(),
            detail,
            trace_id: Uuid::new_v4(),
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, PROBLEM_JSON)], Json(self)).into_response()
    }
}

fn problem_type_for(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "https://tools.ietf.org/html/rfc9110#section-15.5.1",
        StatusCode::NOT_FOUND => "https://tools.ietf.org/html/rfc9110#section-15.5.5",
        StatusCode::BAD_GATEWAY => "https://tools.ietf.org/html/rfc9110#section-15.6.3",
        StatusCode::GATEWAY_TIMEOUT => "https://tools.ietf.org/html/rfc9110#section-15.6.5",
        _ => "https://tools.ietf.org/html/rfc9110#section-15.6.1",
    }
}

/// Errors raised while loading service configuration
#[derive(Error, Debug)]
pub enum ServiceConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid identity configuration: {0}")]
    Identity(#[from] ConfigError),
}
