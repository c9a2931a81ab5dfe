//! Service configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! command-line flags and their environment variables.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! token_timeout_secs = 10
//!
//! [identities]
//! default_var = "AZURE_CLIENT_ID"
//!
//! [[identities.sources]]
//! name = "external"
//! env_var = "EXTERNAL_IDENTITY_CLIENT_ID"
//! ```

use crate::error::ServiceConfigError;
use serde::Deserialize;
use skycast_identity::{IdentitySource, IdentitySources};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Resolved configuration for the API service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout for managed identity token calls
    pub token_timeout: Duration,
    pub identities: IdentitySources,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            token_timeout: Duration::from_secs(10),
            identities: IdentitySources::default(),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layer in place
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token_timeout_secs: Option<u64>,
    pub default_identity_var: Option<String>,
    /// Extra or replacement named identities
    pub identities: Vec<IdentitySource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server: ServerSection,
    identities: IdentitiesSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    token_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct IdentitiesSection {
    default_var: Option<String>,
    /// Replaces the built-in named identities when present
    sources: Option<Vec<IdentitySource>>,
}

impl ServiceConfig {
    /// Build the configuration from an optional file plus overrides
    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ServiceConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    /// Read a TOML file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ServiceConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ServiceConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML content on top of the defaults
    pub fn from_toml(content: &str) -> Result<Self, ServiceConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(host) = file.server.host {
            config.host = host;
        }
        if let Some(port) = file.server.port {
            config.port = port;
        }
        if let Some(secs) = file.server.token_timeout_secs {
            config.token_timeout = Duration::from_secs(secs);
        }
        if let Some(var) = file.identities.default_var {
            config.identities.default_var = var;
        }
        if let Some(sources) = file.identities.sources {
            for source in &sources {
                source.validate()?;
            }
            config.identities.named = Vec::new();
            for source in sources {
                config.identities = config.identities.with_source(source);
            }
        }

        Ok(config)
    }

    /// Apply command-line values on top of this configuration
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(secs) = overrides.token_timeout_secs {
            self.token_timeout = Duration::from_secs(secs);
        }
        if let Some(var) = overrides.default_identity_var {
            self.identities.default_var = var;
        }
        for source in overrides.identities {
            self.identities = std::mem::take(&mut self.identities).with_source(source);
        }
    }

    /// Socket address string to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
