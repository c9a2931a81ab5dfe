//! Credential resolution
//!
//! Turns identity configuration into a `CredentialRegistry`:
//!
//! | entry       | client id set        | client id empty / unset |
//! |-------------|----------------------|-------------------------|
//! | `default`   | scoped to client id  | ambient                 |
//! | any other   | scoped to client id  | omitted                 |
//!
//! Omission is not an error: an optional identity without a client id is
//! simply disabled. Resolution performs no I/O and never fails.

use crate::config::IdentityConfig;
use crate::credentials::{
    CredentialFactory, CredentialRegistry, CredentialScope, ManagedIdentityFactory,
    ManagedIdentityOptions, DEFAULT_IDENTITY,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Client id reported for identities without one
pub const NOT_CONFIGURED: &str = "Not configured";

/// Reporting view of one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub name: String,
    pub client_id: String,
    pub is_configured: bool,
}

impl ResolutionResult {
    fn from_config(config: &IdentityConfig) -> Self {
        match config.client_id() {
            Some(id) => Self {
                name: config.name.clone(),
                client_id: id.to_string(),
                is_configured: true,
            },
            None => Self {
                name: config.name.clone(),
                client_id: NOT_CONFIGURED.to_string(),
                is_configured: false,
            },
        }
    }
}

/// Builds credential registries through a pluggable factory
#[derive(Clone)]
pub struct CredentialResolver {
    factory: Arc<dyn CredentialFactory>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    pub fn new(factory: Arc<dyn CredentialFactory>) -> Self {
        Self { factory }
    }

    /// Resolver producing managed identity credentials
    pub fn managed_identity(options: ManagedIdentityOptions) -> Self {
        Self::new(Arc::new(ManagedIdentityFactory::new(options)))
    }

    /// Build the registry for `configs`
    ///
    /// Names are expected to be unique; if one repeats, its last occurrence
    /// wins.
    pub fn resolve(&self, configs: &[IdentityConfig]) -> CredentialRegistry {
        let mut registry = CredentialRegistry::new(CredentialScope::Ambient, self.factory.clone());

        let effective = effective_configs(configs);
        if effective.len() < configs.len() {
            tracing::warn!(
                declared = configs.len(),
                distinct = effective.len(),
                "Identity declared more than once, using last declaration"
            );
        }

        for config in effective {
            let scope = CredentialScope::from_client_id(config.client_id());

            if config.is_default() {
                tracing::info!(identity = DEFAULT_IDENTITY, scope = %scope, "Registered default credential");
                registry.insert(DEFAULT_IDENTITY, scope);
                continue;
            }

            match scope {
                CredentialScope::ClientId(_) => {
                    tracing::info!(identity = %config.name, scope = %scope, "Registered named credential");
                    registry.insert(config.name.clone(), scope);
                }
                CredentialScope::Ambient => {
                    tracing::debug!(identity = %config.name, "No client id configured, identity disabled");
                }
            }
        }

        registry
    }

    /// Reporting projection of `configs`
    ///
    /// One result per distinct name, in order of first appearance. A repeated
    /// name reports its last declaration, matching what `resolve` registers.
    pub fn describe(configs: &[IdentityConfig]) -> Vec<ResolutionResult> {
        effective_configs(configs)
            .into_iter()
            .map(ResolutionResult::from_config)
            .collect()
    }
}

/// Collapse repeated names, keeping the first position and the last value
fn effective_configs(configs: &[IdentityConfig]) -> Vec<&IdentityConfig> {
    let mut effective: Vec<&IdentityConfig> = Vec::with_capacity(configs.len());

    for config in configs {
        match effective.iter().position(|c| c.name == config.name) {
            Some(pos) => effective[pos] = config,
            None => effective.push(config),
        }
    }

    effective
}
