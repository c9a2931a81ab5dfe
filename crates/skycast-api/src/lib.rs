//! Skycast API
//!
//! HTTP service exposing a synthetic weather forecast and the managed
//! identities resolved at startup.
//!
//! Identity configuration is read from the environment exactly once, in
//! [`bootstrap`]. Handlers only see the resulting registry and the startup
//! snapshot held in [`AppState`].

pub mod config;
pub mod error;
pub mod forecast;
pub mod handler;

pub use config::{ConfigOverrides, ServiceConfig};
pub use error::{ApiError, ProblemDetails, ServiceConfigError};
pub use forecast::WeatherForecast;
pub use handler::{create_router, AppState};

use skycast_identity::{
    CredentialResolver, IdentityConfig, IdentitySources, ManagedIdentityOptions,
};
use std::sync::Arc;

/// Read identity configuration and build the application state
pub fn bootstrap(config: &ServiceConfig) -> AppState {
    let options = ManagedIdentityOptions::from_env().with_timeout(config.token_timeout);
    tracing::info!(endpoint = options.endpoint.kind(), "Using managed identity endpoint");

    let resolver = CredentialResolver::managed_identity(options);
    build_state(&resolver, &config.identities.load())
}

/// Build the application state from already-loaded identity configuration
pub fn build_state(resolver: &CredentialResolver, configs: &[IdentityConfig]) -> AppState {
    let registry = resolver.resolve(configs);
    let identities = CredentialResolver::describe(configs);

    tracing::info!(identities = ?registry.names(), "Credential registry ready");

    AppState::new(Arc::new(registry), identities)
}

/// Pretty JSON of the identities `sources` resolve to, reading client ids
/// through `lookup`
pub fn identities_report(
    sources: &IdentitySources,
    lookup: impl Fn(&str) -> Option<String>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&CredentialResolver::describe(&sources.load_with(lookup)))
}
