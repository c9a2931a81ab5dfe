//! Credential Registry
//!
//! Immutable, name-keyed set of resolved credentials. Entries are fixed when
//! the registry is built; the provider behind each entry is constructed on
//! first lookup and reused afterwards.

use super::traits::{CredentialFactory, CredentialScope, TokenCredential};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Name of the entry used when no named credential is requested
pub const DEFAULT_IDENTITY: &str = "default";

struct RegistryEntry {
    scope: CredentialScope,
    provider: OnceLock<Arc<dyn TokenCredential>>,
}

/// Name-keyed credential providers, always holding a `default` entry
pub struct CredentialRegistry {
    entries: HashMap<String, RegistryEntry>,
    factory: Arc<dyn CredentialFactory>,
}

impl std::fmt::Debug for CredentialRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scopes: Vec<(&str, String)> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.scope.to_string()))
            .collect();
        scopes.sort();

        f.debug_struct("CredentialRegistry")
            .field("entries", &scopes)
            .finish()
    }
}

impl CredentialRegistry {
    /// Build a registry holding only the default entry
    pub(crate) fn new(default_scope: CredentialScope, factory: Arc<dyn CredentialFactory>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(DEFAULT_IDENTITY.to_string(), RegistryEntry::new(default_scope));
        Self { entries, factory }
    }

    /// Register a named entry, replacing any previous one with the same name
    pub(crate) fn insert(&mut self, name: impl Into<String>, scope: CredentialScope) -> bool {
        self.entries
            .insert(name.into(), RegistryEntry::new(scope))
            .is_some()
    }

    /// The credential used when no name is requested
    pub fn default_credential(&self) -> Arc<dyn TokenCredential> {
        self.provider(DEFAULT_IDENTITY, &self.entries[DEFAULT_IDENTITY])
    }

    /// Look up a credential by logical name
    pub fn get(&self, name: &str) -> Option<Arc<dyn TokenCredential>> {
        self.entries
            .get(name)
            .map(|entry| self.provider(name, entry))
    }

    /// The identity an entry is bound to, without constructing its provider
    pub fn scope(&self, name: &str) -> Option<&CredentialScope> {
        self.entries.get(name).map(|entry| &entry.scope)
    }

    /// Whether the entry is pinned to an explicit client id
    pub fn is_configured(&self, name: &str) -> bool {
        matches!(self.scope(name), Some(CredentialScope::ClientId(_)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entry names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; the default entry is never absent
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn provider(&self, name: &str, entry: &RegistryEntry) -> Arc<dyn TokenCredential> {
        entry
            .provider
            .get_or_init(|| {
                tracing::debug!(identity = name, scope = %entry.scope, "Constructing credential provider");
                self.factory.build(name, &entry.scope)
            })
            .clone()
    }
}

impl RegistryEntry {
    fn new(scope: CredentialScope) -> Self {
        Self {
            scope,
            provider: OnceLock::new(),
        }
    }
}
