//! Identity configuration
//!
//! Maps logical identity names to the environment variables that carry their
//! client ids, and reads those variables once at startup.
//!
//! By default:
//! - `default` reads `AZURE_CLIENT_ID`
//! - `external` reads `EXTERNAL_IDENTITY_CLIENT_ID`
//!
//! Both variable names are configurable, and more named identities can be
//! added with `name=VAR` pairs.

use crate::credentials::DEFAULT_IDENTITY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable carrying the default identity's client id
pub const DEFAULT_CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";

/// Environment variable carrying the external identity's client id
pub const EXTERNAL_CLIENT_ID_VAR: &str = "EXTERNAL_IDENTITY_CLIENT_ID";

/// Name of the optional external identity
pub const EXTERNAL_IDENTITY: &str = "external";

/// Errors raised while parsing identity source declarations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid identity source '{0}': expected NAME=ENV_VAR")]
    InvalidSource(String),

    #[error("Identity name '{0}' is reserved; set the default variable instead")]
    ReservedName(String),
}

/// One named identity and its optional client id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl IdentityConfig {
    pub fn new(name: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            client_id,
        }
    }

    /// An identity left to ambient resolution
    pub fn ambient(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// An identity pinned to a client id
    pub fn scoped(name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(name, Some(client_id.into()))
    }

    /// The client id, treating an empty string the same as unset
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.client_id().is_some()
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_IDENTITY
    }
}

/// A named identity and the variable its client id is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySource {
    pub name: String,
    pub env_var: String,
}

impl IdentitySource {
    pub fn new(name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_var: env_var.into(),
        }
    }

    /// Parse a `name=ENV_VAR` declaration
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (name, var) = raw
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidSource(raw.to_string()))?;
        let source = Self::new(name.trim(), var.trim());

        match source.validate() {
            Err(ConfigError::InvalidSource(_)) => Err(ConfigError::InvalidSource(raw.to_string())),
            other => other.map(|_| source),
        }
    }

    /// Check the name and variable are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.env_var.is_empty() {
            return Err(ConfigError::InvalidSource(format!("{}={}", self.name, self.env_var)));
        }
        if self.name == DEFAULT_IDENTITY {
            return Err(ConfigError::ReservedName(self.name.clone()));
        }
        Ok(())
    }
}

impl std::str::FromStr for IdentitySource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Where each identity's client id comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySources {
    /// Variable for the `default` identity
    pub default_var: String,
    /// Additional named identities, in declaration order
    pub named: Vec<IdentitySource>,
}

impl Default for IdentitySources {
    fn default() -> Self {
        Self {
            default_var: DEFAULT_CLIENT_ID_VAR.to_string(),
            named: vec![IdentitySource::new(EXTERNAL_IDENTITY, EXTERNAL_CLIENT_ID_VAR)],
        }
    }
}

impl IdentitySources {
    /// Sources with only the default identity
    pub fn default_only(default_var: impl Into<String>) -> Self {
        Self {
            default_var: default_var.into(),
            named: Vec::new(),
        }
    }

    pub fn with_default_var(mut self, var: impl Into<String>) -> Self {
        self.default_var = var.into();
        self
    }

    /// Add a named source, replacing an existing one with the same name
    pub fn with_source(mut self, source: IdentitySource) -> Self {
        match self.named.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => *existing = source,
            None => self.named.push(source),
        }
        self
    }

    /// Read every source from the process environment
    pub fn load(&self) -> Vec<IdentityConfig> {
        self.load_with(|var| std::env::var(var).ok())
    }

    /// Read every source through `lookup`; `default` always comes first
    pub fn load_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Vec<IdentityConfig> {
        let mut configs = Vec::with_capacity(self.named.len() + 1);
        configs.push(IdentityConfig::new(DEFAULT_IDENTITY, lookup(&self.default_var)));

        for source in &self.named {
            configs.push(IdentityConfig::new(source.name.clone(), lookup(&source.env_var)));
        }

        configs
    }
}
