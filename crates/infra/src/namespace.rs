//! Namespace existence checks.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::info;

use warden_core::{IamError, IamResult, Namespace};

/// Answers "does this namespace exist?" for namespace-scoped writes.
///
/// `use_cache` lets callers accept a possibly stale answer; writes that
/// create records in a namespace typically pass `true`.
#[async_trait]
pub trait NamespaceDirectory: Send + Sync {
    async fn exists(&self, namespace: &Namespace, use_cache: bool) -> IamResult<bool>;
}

/// Fail with `FailedPrecondition` unless `namespace` exists.
pub async fn require_namespace(
    directory: &dyn NamespaceDirectory,
    namespace: &Namespace,
) -> IamResult<()> {
    if directory.exists(namespace, true).await? {
        Ok(())
    } else {
        Err(IamError::failed_precondition(format!(
            "namespace '{namespace}' does not exist"
        )))
    }
}

/// In-memory namespace registry for tests/dev.
///
/// The global namespace always exists.
#[derive(Debug, Default)]
pub struct InMemoryNamespaceDirectory {
    names: RwLock<HashSet<Namespace>>,
}

impl InMemoryNamespaceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace. Returns `false` if it was already registered.
    pub fn register(&self, namespace: Namespace) -> IamResult<bool> {
        if namespace.is_global() {
            return Ok(false);
        }
        let mut names = self
            .names
            .write()
            .map_err(|_| IamError::internal("namespace directory lock poisoned"))?;
        let inserted = names.insert(namespace.clone());
        if inserted {
            info!(namespace = %namespace, "namespace registered");
        }
        Ok(inserted)
    }
}

#[async_trait]
impl NamespaceDirectory for InMemoryNamespaceDirectory {
    async fn exists(&self, namespace: &Namespace, _use_cache: bool) -> IamResult<bool> {
        if namespace.is_global() {
            return Ok(true);
        }
        let names = self
            .names
            .read()
            .map_err(|_| IamError::internal("namespace directory lock poisoned"))?;
        Ok(names.contains(namespace))
    }
}
