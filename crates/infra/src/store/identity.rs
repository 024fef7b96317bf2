use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use warden_auth::{Identity, PolicyRef, RoleRef};
use warden_core::{IamError, IamResult, IdentityId, Namespace};

use crate::cache::CacheConfig;
use crate::namespace::NamespaceDirectory;
use crate::store::Repository;
use crate::store::policy::PolicyStore;
use crate::store::role::RoleStore;

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn create(&self, identity: Identity) -> IamResult<Identity>;

    async fn get(&self, namespace: &Namespace, uuid: IdentityId, use_cache: bool) -> IamResult<Identity>;

    /// Rename. Activation, attachments and credentials have their own operations.
    async fn update(&self, identity: Identity) -> IamResult<Identity>;

    /// Delete the identity and its password credential.
    async fn delete(&self, namespace: &Namespace, uuid: IdentityId) -> IamResult<()>;

    async fn exist(&self, namespace: &Namespace, uuid: IdentityId) -> IamResult<bool>;

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Identity>>;

    async fn count(&self, namespace: &Namespace) -> IamResult<usize>;

    async fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<Identity>>;

    async fn set_active(&self, namespace: &Namespace, uuid: IdentityId, active: bool) -> IamResult<Identity>;

    /// Store (or replace) the identity's password hash.
    async fn set_password(&self, namespace: &Namespace, uuid: IdentityId, password: &str) -> IamResult<()>;

    /// Check a password and return the identity.
    ///
    /// `NotFound` for an unknown identity, `Unauthenticated` for a wrong
    /// password or an identity without one. The active flag is not checked.
    async fn verify_password(&self, namespace: &Namespace, uuid: IdentityId, password: &str) -> IamResult<Identity>;

    async fn add_policy(&self, namespace: &Namespace, uuid: IdentityId, policy: PolicyRef) -> IamResult<Identity>;

    async fn remove_policy(&self, namespace: &Namespace, uuid: IdentityId, policy: PolicyRef) -> IamResult<Identity>;

    async fn add_role(&self, namespace: &Namespace, uuid: IdentityId, role: RoleRef) -> IamResult<Identity>;

    async fn remove_role(&self, namespace: &Namespace, uuid: IdentityId, role: RoleRef) -> IamResult<Identity>;
}

type CredentialKey = (Namespace, IdentityId);

pub struct InMemoryIdentityDirectory {
    repo: Repository<Identity>,
    /// PHC strings; never part of the Identity record.
    credentials: RwLock<HashMap<CredentialKey, String>>,
    policies: Arc<dyn PolicyStore>,
    roles: Arc<dyn RoleStore>,
}

impl InMemoryIdentityDirectory {
    pub fn new(
        cache: &CacheConfig,
        namespaces: Arc<dyn NamespaceDirectory>,
        policies: Arc<dyn PolicyStore>,
        roles: Arc<dyn RoleStore>,
    ) -> Self {
        Self {
            repo: Repository::new(cache, namespaces),
            credentials: RwLock::new(HashMap::new()),
            policies,
            roles,
        }
    }

    async fn require_policy(&self, policy: &PolicyRef) -> IamResult<()> {
        if self.policies.exist(&policy.namespace, policy.uuid).await? {
            return Ok(());
        }
        Err(IamError::failed_precondition(format!(
            "policy {} does not exist in namespace '{}'",
            policy.uuid, policy.namespace
        )))
    }

    async fn require_role(&self, role: &RoleRef) -> IamResult<()> {
        if self.roles.exist(&role.namespace, role.uuid).await? {
            return Ok(());
        }
        Err(IamError::failed_precondition(format!(
            "role {} does not exist in namespace '{}'",
            role.uuid, role.namespace
        )))
    }

    fn stored_hash(&self, namespace: &Namespace, uuid: IdentityId) -> IamResult<Option<String>> {
        let credentials = self
            .credentials
            .read()
            .map_err(|_| IamError::internal("credential table lock poisoned"))?;
        Ok(credentials.get(&(namespace.clone(), uuid)).cloned())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    #[instrument(skip(self, identity), fields(namespace = %identity.namespace, name = %identity.name), err)]
    async fn create(&self, identity: Identity) -> IamResult<Identity> {
        identity.validate()?;
        for policy in &identity.policies {
            self.require_policy(policy).await?;
        }
        for role in &identity.roles {
            self.require_role(role).await?;
        }
        self.repo.create(identity).await
    }

    async fn get(&self, namespace: &Namespace, uuid: IdentityId, use_cache: bool) -> IamResult<Identity> {
        self.repo.get(namespace, *uuid.as_uuid(), use_cache).await
    }

    async fn update(&self, identity: Identity) -> IamResult<Identity> {
        identity.validate()?;
        let (updated, ()) = self
            .repo
            .update(&identity.namespace, *identity.uuid.as_uuid(), |stored| {
                stored.name = identity.name;
                Ok(())
            })
            .await?;
        Ok(updated)
    }

    async fn delete(&self, namespace: &Namespace, uuid: IdentityId) -> IamResult<()> {
        self.repo.delete(namespace, *uuid.as_uuid()).await?;
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| IamError::internal("credential table lock poisoned"))?;
        credentials.remove(&(namespace.clone(), uuid));
        Ok(())
    }

    async fn exist(&self, namespace: &Namespace, uuid: IdentityId) -> IamResult<bool> {
        self.repo.exists(namespace, *uuid.as_uuid())
    }

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Identity>> {
        self.repo.list(namespace)
    }

    async fn count(&self, namespace: &Namespace) -> IamResult<usize> {
        self.repo.count(namespace)
    }

    async fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<Identity>> {
        self.repo.find_by_management(namespace, service, management_id)
    }

    #[instrument(skip(self), err)]
    async fn set_active(&self, namespace: &Namespace, uuid: IdentityId, active: bool) -> IamResult<Identity> {
        let (identity, ()) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| {
                stored.active = active;
                Ok(())
            })
            .await?;
        info!(namespace = %namespace, identity = %uuid, active, "identity activation changed");
        Ok(identity)
    }

    #[instrument(skip(self, password), err)]
    async fn set_password(&self, namespace: &Namespace, uuid: IdentityId, password: &str) -> IamResult<()> {
        if password.is_empty() {
            return Err(IamError::invalid_argument("password must not be empty"));
        }
        if !self.repo.exists(namespace, *uuid.as_uuid())? {
            return Err(IamError::not_found());
        }

        let password = password.to_owned();
        let phc = tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut rand::rngs::OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await
        .map_err(|e| IamError::internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| IamError::internal(format!("password hashing failed: {e}")))?;

        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| IamError::internal("credential table lock poisoned"))?;
        credentials.insert((namespace.clone(), uuid), phc);
        info!(namespace = %namespace, identity = %uuid, "password set");
        Ok(())
    }

    async fn verify_password(&self, namespace: &Namespace, uuid: IdentityId, password: &str) -> IamResult<Identity> {
        let identity = self.repo.get(namespace, *uuid.as_uuid(), false).await?;
        let Some(phc) = self.stored_hash(namespace, uuid)? else {
            warn!(namespace = %namespace, identity = %uuid, "password login for identity without password");
            return Err(IamError::unauthenticated("invalid credentials"));
        };

        let password = password.to_owned();
        let verified = tokio::task::spawn_blocking(move || {
            let hash = PasswordHash::new(&phc).map_err(|e| IamError::internal(format!("stored hash unreadable: {e}")))?;
            Ok::<bool, IamError>(
                Argon2::default()
                    .verify_password(password.as_bytes(), &hash)
                    .is_ok(),
            )
        })
        .await
        .map_err(|e| IamError::internal(format!("password verification task failed: {e}")))??;

        if verified {
            Ok(identity)
        } else {
            warn!(namespace = %namespace, identity = %uuid, "password mismatch");
            Err(IamError::unauthenticated("invalid credentials"))
        }
    }

    #[instrument(skip(self), err)]
    async fn add_policy(&self, namespace: &Namespace, uuid: IdentityId, policy: PolicyRef) -> IamResult<Identity> {
        self.require_policy(&policy).await?;
        let (identity, _) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| Ok(stored.attach_policy(policy)))
            .await?;
        Ok(identity)
    }

    #[instrument(skip(self), err)]
    async fn remove_policy(&self, namespace: &Namespace, uuid: IdentityId, policy: PolicyRef) -> IamResult<Identity> {
        let (identity, _) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| Ok(stored.detach_policy(&policy)))
            .await?;
        Ok(identity)
    }

    #[instrument(skip(self), err)]
    async fn add_role(&self, namespace: &Namespace, uuid: IdentityId, role: RoleRef) -> IamResult<Identity> {
        self.require_role(&role).await?;
        let (identity, _) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| Ok(stored.attach_role(role)))
            .await?;
        Ok(identity)
    }

    #[instrument(skip(self), err)]
    async fn remove_role(&self, namespace: &Namespace, uuid: IdentityId, role: RoleRef) -> IamResult<Identity> {
        let (identity, _) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| Ok(stored.detach_role(&role)))
            .await?;
        Ok(identity)
    }
}
