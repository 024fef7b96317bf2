//! Infrastructure layer: stores, caches, key custody, token and certificate
//! services, bootstrap and configuration.

pub mod authorization;
pub mod bootstrap;
pub mod ca;
pub mod cache;
pub mod config;
pub mod fanout;
pub mod kms;
pub mod namespace;
pub mod resolver;
pub mod shared_store;
pub mod signer;
pub mod store;
pub mod token_service;

#[cfg(test)]
pub(crate) mod testing;

pub use authorization::{AccessDecision, AuthorizationService};
pub use bootstrap::{BootstrapReport, BootstrapService, NamespaceEventHandler};
pub use ca::{
    CaSettings, CertificateAuthority, CertificateStatus, CertificateValidation, IssuedCertificate,
};
pub use cache::{CacheConfig, RecordCache};
pub use config::{ConfigError, LogFormat, WardenConfig};
pub use kms::{InMemoryKeyCustody, KeyCustodyClient, KeyCustodyError, SignMechanism};
pub use namespace::{InMemoryNamespaceDirectory, NamespaceDirectory};
pub use resolver::PolicyResolver;
pub use shared_store::{InMemorySharedStore, SharedStore, SharedStoreError};
#[cfg(feature = "redis")]
pub use shared_store::RedisSharedStore;
pub use signer::DelegatedSigner;
pub use store::{
    CertificateStore, IdentityDirectory, InMemoryCertificateStore, InMemoryIdentityDirectory,
    InMemoryPolicyStore, InMemoryRoleStore, PolicyStore, RoleStore,
};
pub use token_service::{
    IssuedToken, TokenPair, TokenService, TokenSettings, TokenStatus, TokenValidation,
};
