//! Skycast Identity
//!
//! Credential resolution for Skycast services. Identity configuration is read
//! once from the environment at startup and resolved into an immutable
//! `CredentialRegistry` that downstream client factories hold on to.
//!
//! # Resolution policy
//!
//! - The `default` identity is always registered: scoped to its client id
//!   when one is set, ambient otherwise.
//! - Every other identity is registered only when it has a non-empty client
//!   id. Without one it is silently left out.
//!
//! # Example
//!
//! ```rust,no_run
//! use skycast_identity::{
//!     CredentialResolver, IdentitySources, ManagedIdentityOptions, TokenCredential,
//! };
//!
//! # async fn run() -> Result<(), skycast_identity::CredentialError> {
//! let configs = IdentitySources::default().load();
//! let resolver = CredentialResolver::managed_identity(ManagedIdentityOptions::from_env());
//! let registry = resolver.resolve(&configs);
//!
//! let token = registry
//!     .default_credential()
//!     .get_token(&["https://vault.azure.net/.default"])
//!     .await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod resolver;

pub use config::{
    ConfigError, IdentityConfig, IdentitySource, IdentitySources, DEFAULT_CLIENT_ID_VAR,
    EXTERNAL_CLIENT_ID_VAR, EXTERNAL_IDENTITY,
};
pub use credentials::{
    AccessToken, CredentialError, CredentialFactory, CredentialRegistry, CredentialResult,
    CredentialScope, ManagedIdentityCredential, ManagedIdentityEndpoint, ManagedIdentityFactory,
    ManagedIdentityOptions, TokenCredential, DEFAULT_IDENTITY,
};
pub use resolver::{CredentialResolver, ResolutionResult, NOT_CONFIGURED};
