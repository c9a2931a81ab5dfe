//! HTTP handler for the Skycast API
//!
//! Routes:
//! - `GET /weatherforecast` - five-day synthetic forecast
//! - `GET /identities` - configured managed identities
//! - `GET /identities/:name/probe` - acquire a token with one identity
//! - `GET /health`, `GET /alive` - health and liveness

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skycast_identity::{CredentialRegistry, ResolutionResult, TokenCredential};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ProblemDetails};
use crate::forecast::{self, WeatherForecast};

/// Scope probed when the caller does not name one
pub const DEFAULT_PROBE_SCOPE: &str = "https://management.azure.com/.default";

/// Application state
pub struct AppState {
    /// Credentials resolved at startup
    pub registry: Arc<CredentialRegistry>,
    /// Startup snapshot of the identity configuration
    pub identities: Vec<ResolutionResult>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Arc<CredentialRegistry>, identities: Vec<ResolutionResult>) -> Self {
        Self {
            registry,
            identities,
            started_at: Instant::now(),
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/weatherforecast", get(get_weather_forecast))
        .route("/identities", get(get_identities))
        .route("/identities/:name/probe", get(probe_identity))
        .route("/health", get(health_check))
        .route("/alive", get(alive))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Five-day forecast starting tomorrow
async fn get_weather_forecast() -> Json<Vec<WeatherForecast>> {
    let today = chrono::Local::now().date_naive();
    let mut rng = rand::thread_rng();
    Json(forecast::generate(today, &mut rng))
}

/// Configured identities, keyed by name
async fn get_identities(State(state): State<Arc<AppState>>) -> Json<IdentitiesResponse> {
    Json(IdentitiesResponse::from_results(&state.identities))
}

/// Acquire a token with a registered identity and report its expiry
async fn probe_identity(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ProbeQuery>,
) -> Result<Json<ProbeResponse>, ApiError> {
    let credential = state
        .registry
        .get(&name)
        .ok_or_else(|| ApiError::IdentityNotFound(name.clone()))?;

    let scope = query.scope.unwrap_or_else(|| DEFAULT_PROBE_SCOPE.to_string());

    let token = credential
        .get_token(&[scope.as_str()])
        .await
        .map_err(|source| ApiError::Credential {
            identity: name.clone(),
            source,
        })?;

    tracing::info!(identity = %name, scope = %scope, expires_on = %token.expires_on, "Identity probe succeeded");

    Ok(Json(ProbeResponse {
        name,
        client_id: credential.scope().client_id().map(str::to_string),
        scope,
        expires_on: token.expires_on,
    }))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        identities: state.registry.names().into_iter().map(str::to_string).collect(),
    })
}

/// Liveness endpoint
async fn alive() -> &'static str {
    "Healthy"
}

async fn not_found() -> ProblemDetails {
    ProblemDetails::new(StatusCode::NOT_FOUND, "Not found", None)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(panic = %detail, "Handler panicked");

    ApiError::Internal(detail).into_response()
}

/// One identity as shown by `GET /identities`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityStatus {
    pub client_id: String,
    pub is_configured: bool,
}

/// Body of `GET /identities`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentitiesResponse(pub BTreeMap<String, IdentityStatus>);

impl IdentitiesResponse {
    pub fn from_results(results: &[ResolutionResult]) -> Self {
        Self(
            results
                .iter()
                .map(|r| {
                    (
                        r.name.clone(),
                        IdentityStatus {
                            client_id: r.client_id.clone(),
                            is_configured: r.is_configured,
                        },
                    )
                })
                .collect(),
        )
    }
}

/// Probe query parameters
#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    pub scope: Option<String>,
}

/// Probe response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub scope: String,
    pub expires_on: DateTime<Utc>,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub identities: Vec<String>,
}
