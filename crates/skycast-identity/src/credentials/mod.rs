//! Credential Providers
//!
//! Trait-based token credentials and the registry that holds them.
//!
//! # Architecture
//!
//! All providers implement `TokenCredential`. The resolver never constructs
//! providers itself; it records which identity each registry entry is bound
//! to and hands a `CredentialFactory` the job of building the provider the
//! first time the entry is used. `ManagedIdentityFactory` is the production
//! factory; tests plug in their own.

pub mod managed_identity;
pub mod registry;
pub mod traits;

pub use managed_identity::{
    ManagedIdentityCredential, ManagedIdentityEndpoint, ManagedIdentityFactory,
    ManagedIdentityOptions,
};
pub use registry::{CredentialRegistry, DEFAULT_IDENTITY};
pub use traits::{
    AccessToken, CredentialError, CredentialFactory, CredentialResult, CredentialScope,
    TokenCredential,
};
