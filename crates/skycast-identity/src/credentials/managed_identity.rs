//! Azure Managed Identity credential
//!
//! Acquires tokens from the managed identity endpoint of the hosting
//! environment:
//!
//! - **App Service / Container Apps**: `IDENTITY_ENDPOINT` + `IDENTITY_HEADER`
//! - **Virtual machines, AKS, everything else**: the Instance Metadata
//!   Service (IMDS) at `169.254.169.254`
//!
//! An ambient credential lets the host pick its system-assigned identity; a
//! client-id scoped credential adds `client_id` to every token request to
//! select a user-assigned identity.
//!
//! # Example
//!
//! ```rust,ignore
//! use skycast_identity::credentials::{ManagedIdentityFactory, ManagedIdentityOptions};
//!
//! let factory = ManagedIdentityFactory::new(ManagedIdentityOptions::from_env());
//! let credential = factory.build("default", &CredentialScope::Ambient);
//! let token = credential.get_token(&["https://vault.azure.net/.default"]).await?;
//! ```

use super::traits::{
    AccessToken, CredentialError, CredentialFactory, CredentialResult, CredentialScope,
    TokenCredential,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default IMDS token endpoint
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Cached tokens are refreshed once they are this close to expiry
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Where token requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityEndpoint {
    /// App Service / Container Apps identity endpoint
    AppService {
        endpoint: String,
        header: String,
    },
    /// Instance Metadata Service
    Imds {
        endpoint: String,
    },
}

impl Default for ManagedIdentityEndpoint {
    fn default() -> Self {
        ManagedIdentityEndpoint::Imds {
            endpoint: IMDS_ENDPOINT.to_string(),
        }
    }
}

impl ManagedIdentityEndpoint {
    /// Detect the endpoint from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Detect the endpoint using an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint = lookup("IDENTITY_ENDPOINT").filter(|v| !v.is_empty());
        let header = lookup("IDENTITY_HEADER").filter(|v| !v.is_empty());

        match (endpoint, header) {
            (Some(endpoint), Some(header)) => ManagedIdentityEndpoint::AppService { endpoint, header },
            _ => ManagedIdentityEndpoint::default(),
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ManagedIdentityEndpoint::AppService { .. } => "app_service",
            ManagedIdentityEndpoint::Imds { .. } => "imds",
        }
    }
}

/// Options shared by every managed identity credential
#[derive(Debug, Clone)]
pub struct ManagedIdentityOptions {
    pub endpoint: ManagedIdentityEndpoint,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ManagedIdentityOptions {
    fn default() -> Self {
        Self {
            endpoint: ManagedIdentityEndpoint::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ManagedIdentityOptions {
    /// Load endpoint settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: ManagedIdentityEndpoint::from_env(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: ManagedIdentityEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Token credential backed by a managed identity
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    name: String,
    scope: CredentialScope,
    options: ManagedIdentityOptions,
    client: reqwest::Client,
    /// Tokens keyed by resource
    cache: RwLock<HashMap<String, AccessToken>>,
}

impl ManagedIdentityCredential {
    /// Create a credential with its own HTTP client
    pub fn new(name: impl Into<String>, scope: CredentialScope, options: ManagedIdentityOptions) -> Self {
        Self::with_client(name, scope, options, reqwest::Client::new())
    }

    /// Create a credential sharing an existing HTTP client
    pub fn with_client(
        name: impl Into<String>,
        scope: CredentialScope,
        options: ManagedIdentityOptions,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            options,
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn cached(&self, resource: &str) -> Option<AccessToken> {
        let cache = self.cache.read().await;
        cache
            .get(resource)
            .filter(|token| !token.is_expiring(TOKEN_REFRESH_MARGIN))
            .cloned()
    }

    fn build_request(&self, resource: &str) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(3);

        let request = match &self.options.endpoint {
            ManagedIdentityEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client.get(endpoint).header("X-IDENTITY-HEADER", header)
            }
            ManagedIdentityEndpoint::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.client.get(endpoint).header("Metadata", "true")
            }
        };

        query.push(("resource", resource));
        if let Some(client_id) = self.scope.client_id() {
            query.push(("client_id", client_id));
        }

        request.query(&query).timeout(self.options.timeout)
    }

    async fn request_token(&self, resource: &str) -> CredentialResult<AccessToken> {
        tracing::debug!(
            identity = %self.name,
            scope = %self.scope,
            endpoint = self.options.endpoint.kind(),
            resource = resource,
            "Requesting managed identity token"
        );

        let response = self.build_request(resource).send().await.map_err(|e| {
            if e.is_timeout() {
                CredentialError::Timeout(e.to_string())
            } else {
                CredentialError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CredentialError::AuthenticationFailed {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let expires_on = body.expires_on.to_datetime()?;
        Ok(AccessToken::new(body.access_token, expires_on))
    }
}

#[async_trait::async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> &CredentialScope {
        &self.scope
    }

    async fn get_token(&self, scopes: &[&str]) -> CredentialResult<AccessToken> {
        let resource = scope_to_resource(scopes)?;

        if let Some(token) = self.cached(&resource).await {
            return Ok(token);
        }

        let token = self.request_token(&resource).await.map_err(|e| {
            tracing::warn!(identity = %self.name, scope = %self.scope, error = %e, "Token acquisition failed");
            e
        })?;

        self.cache.write().await.insert(resource, token.clone());
        Ok(token)
    }
}

/// Factory producing managed identity credentials that share one HTTP client
#[derive(Debug, Clone)]
pub struct ManagedIdentityFactory {
    options: ManagedIdentityOptions,
    client: reqwest::Client,
}

impl ManagedIdentityFactory {
    pub fn new(options: ManagedIdentityOptions) -> Self {
        Self {
            options,
            client: reqwest::Client::new(),
        }
    }

    pub fn options(&self) -> &ManagedIdentityOptions {
        &self.options
    }
}

impl Default for ManagedIdentityFactory {
    fn default() -> Self {
        Self::new(ManagedIdentityOptions::default())
    }
}

impl CredentialFactory for ManagedIdentityFactory {
    fn build(&self, name: &str, scope: &CredentialScope) -> Arc<dyn TokenCredential> {
        Arc::new(ManagedIdentityCredential::with_client(
            name,
            scope.clone(),
            self.options.clone(),
            self.client.clone(),
        ))
    }
}

/// Convert OAuth scopes into the single resource managed identity expects
pub fn scope_to_resource(scopes: &[&str]) -> CredentialResult<String> {
    match scopes {
        [""] => Err(CredentialError::InvalidScope("empty scope".into())),
        [scope] => {
            let resource = scope.strip_suffix("/.default").unwrap_or(scope);
            Ok(resource.to_string())
        }
        [] => Err(CredentialError::InvalidScope("no scope requested".into())),
        _ => Err(CredentialError::InvalidScope(format!(
            "managed identity accepts exactly one scope, got {}",
            scopes.len()
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_on: EpochSeconds,
}

/// IMDS sends `expires_on` as a string, some hosts send a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Number(i64),
    Text(String),
}

impl EpochSeconds {
    fn to_datetime(&self) -> CredentialResult<DateTime<Utc>> {
        let secs = match self {
            EpochSeconds::Number(n) => *n,
            EpochSeconds::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                CredentialError::InvalidResponse(format!("expires_on is not a timestamp: {}", s))
            })?,
        };

        if secs < 0 {
            return Err(CredentialError::InvalidResponse(format!(
                "expires_on before the Unix epoch: {}",
                secs
            )));
        }

        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| CredentialError::InvalidResponse(format!("expires_on out of range: {}", secs)))
    }
}
