//! Effective-policy resolution for an identity.

use std::sync::Arc;

use tracing::debug;

use warden_auth::{Identity, Policy, PolicyRef};
use warden_core::IamResult;

use crate::store::{PolicyStore, RoleStore};

/// Expands an identity's direct policies and roles into Policy records.
#[derive(Clone)]
pub struct PolicyResolver {
    roles: Arc<dyn RoleStore>,
    policies: Arc<dyn PolicyStore>,
}

impl PolicyResolver {
    pub fn new(roles: Arc<dyn RoleStore>, policies: Arc<dyn PolicyStore>) -> Self {
        Self { roles, policies }
    }

    /// Direct policies plus every policy referenced by the identity's roles.
    ///
    /// The result may contain duplicates. References to deleted roles or
    /// policies are simply absent.
    pub async fn resolve_effective_policies(&self, identity: &Identity) -> IamResult<Vec<Policy>> {
        let mut refs: Vec<PolicyRef> = identity.policies.clone();
        if !identity.roles.is_empty() {
            let roles = self.roles.get_multiple(&identity.roles, true).await?;
            for role in roles {
                refs.extend(role.policies);
            }
        }
        let policies = self.policies.get_multiple(&refs, true).await?;
        debug!(
            namespace = %identity.namespace,
            identity = %identity.uuid,
            references = refs.len(),
            resolved = policies.len(),
            "effective policies resolved"
        );
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use warden_auth::{Role, Scope, policies_allow};
    use warden_core::Namespace;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::namespace::{InMemoryNamespaceDirectory, NamespaceDirectory};
    use crate::store::{InMemoryPolicyStore, InMemoryRoleStore};

    #[tokio::test]
    async fn role_granted_order_scope() {
        let dir = InMemoryNamespaceDirectory::new();
        dir.register(Namespace::new("acme")).unwrap();
        let dir: Arc<dyn NamespaceDirectory> = Arc::new(dir);
        let cache = CacheConfig::default();
        let policies = Arc::new(InMemoryPolicyStore::new(&cache, Arc::clone(&dir)));
        let roles = Arc::new(InMemoryRoleStore::new(&cache, dir, policies.clone()));
        let resolver = PolicyResolver::new(roles.clone(), policies.clone());

        let ns = Namespace::new("acme");
        let p = policies
            .create(
                Policy::new(ns.clone(), "orders", Utc::now())
                    .with_resources(["order.*"])
                    .with_actions(["read", "write"]),
            )
            .await
            .unwrap();
        let r = roles
            .create(Role::new(ns.clone(), "clerk", Utc::now()).with_policies([p.reference()]))
            .await
            .unwrap();
        let mut identity = Identity::new(ns.clone(), "i", Utc::now());
        identity.roles = vec![r.reference()];

        let effective = resolver.resolve_effective_policies(&identity).await.unwrap();
        assert_eq!(effective.len(), 1);

        let order = Scope::new(ns.clone(), ["order.123"], ["read"]);
        let invoice = Scope::new(ns.clone(), ["invoice.1"], ["read"]);
        assert!(policies_allow(&effective, &[order]));
        assert!(!policies_allow(&effective, &[invoice]));
    }

    #[tokio::test]
    async fn no_attachments_resolve_to_nothing() {
        let dir: Arc<dyn NamespaceDirectory> = Arc::new(InMemoryNamespaceDirectory::new());
        let cache = CacheConfig::default();
        let policies = Arc::new(InMemoryPolicyStore::new(&cache, Arc::clone(&dir)));
        let roles = Arc::new(InMemoryRoleStore::new(&cache, dir, policies.clone()));
        let resolver = PolicyResolver::new(roles, policies);

        let identity = Identity::new(Namespace::global(), "nobody", Utc::now());
        assert!(resolver.resolve_effective_policies(&identity).await.unwrap().is_empty());
    }
}
