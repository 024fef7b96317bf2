use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use warden_auth::{Policy, PolicyRef};
use warden_core::{BuiltInKind, IamResult, Namespace, PolicyId};

use crate::cache::CacheConfig;
use crate::namespace::NamespaceDirectory;
use crate::store::{Repository, ensure_mutable};

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn create(&self, policy: Policy) -> IamResult<Policy>;

    async fn get(&self, namespace: &Namespace, uuid: PolicyId, use_cache: bool) -> IamResult<Policy>;

    /// Fetch many policies, possibly across namespaces. Missing references
    /// are absent from the result.
    async fn get_multiple(&self, refs: &[PolicyRef], use_cache: bool) -> IamResult<Vec<Policy>>;

    /// Replace the mutable content of a stored policy. Ownership is kept.
    async fn update(&self, policy: Policy) -> IamResult<Policy>;

    async fn delete(&self, namespace: &Namespace, uuid: PolicyId) -> IamResult<()>;

    async fn exist(&self, namespace: &Namespace, uuid: PolicyId) -> IamResult<bool>;

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Policy>>;

    async fn count(&self, namespace: &Namespace) -> IamResult<usize>;

    async fn find_built_in(&self, namespace: &Namespace, kind: BuiltInKind) -> IamResult<Option<Policy>>;

    async fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<Policy>>;

    /// Insert-if-absent keyed by built-in kind. Returns `(stored, inserted)`.
    async fn ensure_built_in(&self, policy: Policy) -> IamResult<(Policy, bool)>;
}

pub struct InMemoryPolicyStore {
    repo: Repository<Policy>,
}

impl InMemoryPolicyStore {
    pub fn new(cache: &CacheConfig, namespaces: Arc<dyn NamespaceDirectory>) -> Self {
        Self {
            repo: Repository::new(cache, namespaces),
        }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    #[instrument(skip(self, policy), fields(namespace = %policy.namespace, name = %policy.name), err)]
    async fn create(&self, policy: Policy) -> IamResult<Policy> {
        policy.validate()?;
        self.repo.create(policy).await
    }

    async fn get(&self, namespace: &Namespace, uuid: PolicyId, use_cache: bool) -> IamResult<Policy> {
        self.repo.get(namespace, *uuid.as_uuid(), use_cache).await
    }

    async fn get_multiple(&self, refs: &[PolicyRef], use_cache: bool) -> IamResult<Vec<Policy>> {
        self.repo
            .get_multiple(
                refs.iter()
                    .map(|r| (r.namespace.clone(), *r.uuid.as_uuid()))
                    .collect(),
                use_cache,
            )
            .await
    }

    #[instrument(skip(self, policy), fields(namespace = %policy.namespace, uuid = %policy.uuid), err)]
    async fn update(&self, policy: Policy) -> IamResult<Policy> {
        policy.validate()?;
        let (updated, ()) = self
            .repo
            .update(&policy.namespace, *policy.uuid.as_uuid(), |stored| {
                ensure_mutable(&*stored)?;
                stored.name = policy.name;
                stored.description = policy.description;
                stored.namespace_independent = policy.namespace_independent;
                stored.resources = policy.resources;
                stored.actions = policy.actions;
                stored.tags = policy.tags;
                Ok(())
            })
            .await?;
        Ok(updated)
    }

    async fn delete(&self, namespace: &Namespace, uuid: PolicyId) -> IamResult<()> {
        if let Ok(stored) = self.repo.get(namespace, *uuid.as_uuid(), false).await {
            ensure_mutable(&stored)?;
        }
        self.repo.delete(namespace, *uuid.as_uuid()).await
    }

    async fn exist(&self, namespace: &Namespace, uuid: PolicyId) -> IamResult<bool> {
        self.repo.exists(namespace, *uuid.as_uuid())
    }

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Policy>> {
        self.repo.list(namespace)
    }

    async fn count(&self, namespace: &Namespace) -> IamResult<usize> {
        self.repo.count(namespace)
    }

    async fn find_built_in(&self, namespace: &Namespace, kind: BuiltInKind) -> IamResult<Option<Policy>> {
        self.repo.find_built_in(namespace, kind)
    }

    async fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<Policy>> {
        self.repo.find_by_management(namespace, service, management_id)
    }

    async fn ensure_built_in(&self, policy: Policy) -> IamResult<(Policy, bool)> {
        self.repo.ensure_built_in(policy).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use warden_core::{IamError, ManagedBy};

    use super::*;
    use crate::namespace::InMemoryNamespaceDirectory;

    fn store() -> InMemoryPolicyStore {
        let dir = InMemoryNamespaceDirectory::new();
        dir.register(Namespace::new("acme")).unwrap();
        dir.register(Namespace::new("globex")).unwrap();
        InMemoryPolicyStore::new(&CacheConfig::default(), Arc::new(dir))
    }

    #[tokio::test]
    async fn invalid_entries_are_rejected_without_writing() {
        let store = store();
        let bad = Policy::new(Namespace::new("acme"), "bad", Utc::now()).with_resources(["order/*"]);
        assert!(matches!(
            store.create(bad).await.unwrap_err(),
            IamError::InvalidArgument(_)
        ));
        assert_eq!(store.count(&Namespace::new("acme")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_keeps_ownership_and_bumps_version() {
        let store = store();
        let mut p = Policy::new(Namespace::new("acme"), "orders", Utc::now())
            .with_resources(["order.*"])
            .with_actions(["read"]);
        p.managed_by = ManagedBy::OwnedByService {
            service: "sales".into(),
            reason: "order sync".into(),
            management_id: "orders".into(),
        };
        let created = store.create(p).await.unwrap();

        let mut edit = created.clone();
        edit.actions = vec!["read".into(), "write".into()];
        edit.managed_by = ManagedBy::Unmanaged;
        let updated = store.update(edit).await.unwrap();

        assert_eq!(updated.actions, vec!["read", "write"]);
        assert_eq!(updated.managed_by, created.managed_by);
        assert_eq!(updated.meta.version, created.meta.version + 1);
        assert_eq!(
            store
                .find_by_management(&created.namespace, "sales", "orders")
                .await
                .unwrap()
                .map(|p| p.uuid),
            Some(created.uuid)
        );
    }

    #[tokio::test]
    async fn get_multiple_spans_namespaces_and_skips_dangling_refs() {
        let store = store();
        let a = store
            .create(Policy::new(Namespace::new("acme"), "a", Utc::now()))
            .await
            .unwrap();
        let g = store
            .create(Policy::new(Namespace::new("globex"), "g", Utc::now()))
            .await
            .unwrap();
        let dangling = PolicyRef::new(Namespace::new("acme"), PolicyId::new());

        let got = store
            .get_multiple(&[a.reference(), g.reference(), dangling], false)
            .await
            .unwrap();
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn built_in_policies_are_read_only() {
        let store = store();
        let ns = Namespace::new("acme");
        let (root, _) = store
            .ensure_built_in(Policy::built_in(ns.clone(), BuiltInKind::NamespaceRoot, Utc::now()))
            .await
            .unwrap();

        assert!(matches!(
            store.update(root.clone()).await.unwrap_err(),
            IamError::FailedPrecondition(_)
        ));
        assert!(matches!(
            store.delete(&ns, root.uuid).await.unwrap_err(),
            IamError::FailedPrecondition(_)
        ));
        assert!(store.exist(&ns, root.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn delete_of_unknown_policy_is_not_found() {
        let store = store();
        assert_eq!(
            store
                .delete(&Namespace::new("acme"), PolicyId::new())
                .await
                .unwrap_err(),
            IamError::NotFound
        );
    }
}
