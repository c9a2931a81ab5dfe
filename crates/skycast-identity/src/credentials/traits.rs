//! Core traits for credential providers
//!
//! This module defines the traits every credential provider implements and
//! the factory seam the resolver builds providers through. Token acquisition
//! is async so remote identity endpoints can be queried without blocking.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while acquiring a token
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The identity endpoint could not be reached
    #[error("Identity endpoint unavailable: {0}")]
    Unavailable(String),

    /// The identity endpoint rejected the request
    #[error("Authentication failed ({status}): {message}")]
    AuthenticationFailed {
        status: u16,
        message: String,
    },

    /// The identity endpoint answered with a body we could not use
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// The requested scopes cannot be turned into a single resource
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Which managed identity a credential authenticates as
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CredentialScope {
    /// Ambient resolution: the host decides (system-assigned identity)
    Ambient,
    /// A user-assigned identity selected by its client id
    ClientId(String),
}

impl CredentialScope {
    /// Scope for an optional client id; empty counts as absent
    pub fn from_client_id(client_id: Option<&str>) -> Self {
        match client_id {
            Some(id) if !id.is_empty() => CredentialScope::ClientId(id.to_string()),
            _ => CredentialScope::Ambient,
        }
    }

    /// The client id this scope is pinned to, if any
    pub fn client_id(&self) -> Option<&str> {
        match self {
            CredentialScope::Ambient => None,
            CredentialScope::ClientId(id) => Some(id),
        }
    }

    pub fn is_ambient(&self) -> bool {
        matches!(self, CredentialScope::Ambient)
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialScope::Ambient => write!(f, "ambient"),
            CredentialScope::ClientId(id) => write!(f, "client_id={}", id),
        }
    }
}

/// A bearer token with its expiry
///
/// The token value is held as a secret and never shows up in `Debug` output.
#[derive(Debug)]
pub struct AccessToken {
    /// The raw bearer token
    pub token: SecretString,
    /// When the token stops being accepted
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_on,
        }
    }

    /// Whether the token expires within `within` from now
    ///
    /// A margin or expiry outside chrono's range counts as expiring.
    pub fn is_expiring(&self, within: Duration) -> bool {
        let Ok(margin) = chrono::Duration::from_std(within) else {
            return true;
        };

        match self.expires_on.checked_sub_signed(margin) {
            Some(refresh_at) => refresh_at <= Utc::now(),
            None => true,
        }
    }
}

impl Clone for AccessToken {
    fn clone(&self) -> Self {
        Self::new(self.token.expose_secret().clone(), self.expires_on)
    }
}

/// Core trait for credential providers
///
/// A `TokenCredential` obtains access tokens for a fixed identity. Providers
/// are shared across request tasks, so implementations must be thread-safe.
///
/// # Error Handling
///
/// Failures from the identity endpoint are returned as-is to the caller that
/// asked for the token. Providers impose no retry policy.
#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    /// Logical name of the registry entry this credential serves
    fn name(&self) -> &str;

    /// The identity this credential authenticates as
    fn scope(&self) -> &CredentialScope;

    /// Acquire a token for the given OAuth scopes
    ///
    /// # Arguments
    ///
    /// * `scopes` - Requested scopes, e.g. `https://management.azure.com/.default`
    async fn get_token(&self, scopes: &[&str]) -> CredentialResult<AccessToken>;
}

/// Builds credential providers for resolved identities
///
/// The resolver calls this lazily, at most once per registry entry, the first
/// time the entry is looked up.
pub trait CredentialFactory: Send + Sync {
    fn build(&self, name: &str, scope: &CredentialScope) -> Arc<dyn TokenCredential>;
}
