use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use warden_auth::{PolicyRef, Role, RoleRef};
use warden_core::{BuiltInKind, IamError, IamResult, Namespace, RoleId};

use crate::cache::CacheConfig;
use crate::namespace::NamespaceDirectory;
use crate::store::policy::PolicyStore;
use crate::store::{Repository, ensure_mutable};

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Create a role. Every referenced policy must exist at call time.
    async fn create(&self, role: Role) -> IamResult<Role>;

    async fn get(&self, namespace: &Namespace, uuid: RoleId, use_cache: bool) -> IamResult<Role>;

    async fn get_multiple(&self, refs: &[RoleRef], use_cache: bool) -> IamResult<Vec<Role>>;

    /// Replace name, description and tags. Policy references change only
    /// through [`RoleStore::add_policy`] / [`RoleStore::remove_policy`].
    async fn update(&self, role: Role) -> IamResult<Role>;

    async fn delete(&self, namespace: &Namespace, uuid: RoleId) -> IamResult<()>;

    async fn exist(&self, namespace: &Namespace, uuid: RoleId) -> IamResult<bool>;

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Role>>;

    async fn count(&self, namespace: &Namespace) -> IamResult<usize>;

    async fn add_policy(&self, namespace: &Namespace, uuid: RoleId, policy: PolicyRef) -> IamResult<Role>;

    async fn remove_policy(&self, namespace: &Namespace, uuid: RoleId, policy: PolicyRef) -> IamResult<Role>;

    async fn find_built_in(&self, namespace: &Namespace, kind: BuiltInKind) -> IamResult<Option<Role>>;

    async fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<Role>>;

    async fn ensure_built_in(&self, role: Role) -> IamResult<(Role, bool)>;
}

pub struct InMemoryRoleStore {
    repo: Repository<Role>,
    policies: Arc<dyn PolicyStore>,
}

impl InMemoryRoleStore {
    pub fn new(
        cache: &CacheConfig,
        namespaces: Arc<dyn NamespaceDirectory>,
        policies: Arc<dyn PolicyStore>,
    ) -> Self {
        Self {
            repo: Repository::new(cache, namespaces),
            policies,
        }
    }

    /// Best-effort: the policy may still be deleted right after this check.
    async fn require_policy(&self, policy: &PolicyRef) -> IamResult<()> {
        if self.policies.exist(&policy.namespace, policy.uuid).await? {
            Ok(())
        } else {
            Err(IamError::failed_precondition(format!(
                "policy {} does not exist in namespace '{}'",
                policy.uuid, policy.namespace
            )))
        }
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    #[instrument(skip(self, role), fields(namespace = %role.namespace, name = %role.name), err)]
    async fn create(&self, role: Role) -> IamResult<Role> {
        role.validate()?;
        for policy in &role.policies {
            self.require_policy(policy).await?;
        }
        self.repo.create(role).await
    }

    async fn get(&self, namespace: &Namespace, uuid: RoleId, use_cache: bool) -> IamResult<Role> {
        self.repo.get(namespace, *uuid.as_uuid(), use_cache).await
    }

    async fn get_multiple(&self, refs: &[RoleRef], use_cache: bool) -> IamResult<Vec<Role>> {
        self.repo
            .get_multiple(
                refs.iter()
                    .map(|r| (r.namespace.clone(), *r.uuid.as_uuid()))
                    .collect(),
                use_cache,
            )
            .await
    }

    #[instrument(skip(self, role), fields(namespace = %role.namespace, uuid = %role.uuid), err)]
    async fn update(&self, role: Role) -> IamResult<Role> {
        role.validate()?;
        let (updated, ()) = self
            .repo
            .update(&role.namespace, *role.uuid.as_uuid(), |stored| {
                ensure_mutable(&*stored)?;
                stored.name = role.name;
                stored.description = role.description;
                stored.tags = role.tags;
                Ok(())
            })
            .await?;
        Ok(updated)
    }

    async fn delete(&self, namespace: &Namespace, uuid: RoleId) -> IamResult<()> {
        if let Ok(stored) = self.repo.get(namespace, *uuid.as_uuid(), false).await {
            ensure_mutable(&stored)?;
        }
        self.repo.delete(namespace, *uuid.as_uuid()).await
    }

    async fn exist(&self, namespace: &Namespace, uuid: RoleId) -> IamResult<bool> {
        self.repo.exists(namespace, *uuid.as_uuid())
    }

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Role>> {
        self.repo.list(namespace)
    }

    async fn count(&self, namespace: &Namespace) -> IamResult<usize> {
        self.repo.count(namespace)
    }

    #[instrument(skip(self), err)]
    async fn add_policy(&self, namespace: &Namespace, uuid: RoleId, policy: PolicyRef) -> IamResult<Role> {
        self.require_policy(&policy).await?;
        let (role, attached) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| {
                ensure_mutable(&*stored)?;
                Ok(stored.attach_policy(policy))
            })
            .await?;
        if attached {
            info!(namespace = %namespace, role = %uuid, "policy attached to role");
        }
        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn remove_policy(&self, namespace: &Namespace, uuid: RoleId, policy: PolicyRef) -> IamResult<Role> {
        let (role, detached) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| {
                ensure_mutable(&*stored)?;
                Ok(stored.detach_policy(&policy))
            })
            .await?;
        if detached {
            info!(namespace = %namespace, role = %uuid, "policy detached from role");
        }
        Ok(role)
    }

    async fn find_built_in(&self, namespace: &Namespace, kind: BuiltInKind) -> IamResult<Option<Role>> {
        self.repo.find_built_in(namespace, kind)
    }

    async fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<Role>> {
        self.repo.find_by_management(namespace, service, management_id)
    }

    async fn ensure_built_in(&self, role: Role) -> IamResult<(Role, bool)> {
        self.repo.ensure_built_in(role).await
    }
}
