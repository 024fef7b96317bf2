use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{BuiltInKind, IamResult, ManagedBy, Namespace, Record, RecordMeta, RoleId};

use crate::policy::{PolicyRef, validate_name};

/// Reference to a Role in (possibly) another namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    pub namespace: Namespace,
    pub uuid: RoleId,
}

impl RoleRef {
    pub fn new(namespace: Namespace, uuid: RoleId) -> Self {
        Self { namespace, uuid }
    }
}

/// Named bag of Policy references.
///
/// A role never copies policy content. References to deleted policies are
/// kept and simply resolve to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub namespace: Namespace,
    pub uuid: RoleId,
    pub name: String,
    pub description: String,
    pub managed_by: ManagedBy,
    pub policies: Vec<PolicyRef>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Role {
    pub fn new(namespace: Namespace, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            namespace,
            uuid: RoleId::new(),
            name: name.into(),
            description: String::new(),
            managed_by: ManagedBy::Unmanaged,
            policies: Vec::new(),
            tags: Vec::new(),
            meta: RecordMeta::new(now),
        }
    }

    pub fn with_policies(mut self, policies: impl IntoIterator<Item = PolicyRef>) -> Self {
        self.policies = policies.into_iter().collect();
        self
    }

    /// System-provisioned role referencing the built-in policy of the same kind.
    pub fn built_in(
        namespace: Namespace,
        kind: BuiltInKind,
        policy: PolicyRef,
        now: DateTime<Utc>,
    ) -> Self {
        let mut role = Role::new(namespace, kind.as_str(), now);
        role.managed_by = ManagedBy::built_in(kind);
        role.description = format!("Built-in role for the {kind} policy");
        role.policies = vec![policy];
        role
    }

    pub fn reference(&self) -> RoleRef {
        RoleRef::new(self.namespace.clone(), self.uuid)
    }

    pub fn validate(&self) -> IamResult<()> {
        validate_name(&self.name)
    }

    /// Attach a policy reference. Returns `false` if it was already attached.
    pub fn attach_policy(&mut self, policy: PolicyRef) -> bool {
        if self.policies.contains(&policy) {
            return false;
        }
        self.policies.push(policy);
        true
    }

    /// Detach a policy reference. Returns `false` if it was not attached.
    pub fn detach_policy(&mut self, policy: &PolicyRef) -> bool {
        let before = self.policies.len();
        self.policies.retain(|p| p != policy);
        self.policies.len() != before
    }
}

impl Record for Role {
    const KIND: &'static str = "role";

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn uuid(&self) -> uuid::Uuid {
        *self.uuid.as_uuid()
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use warden_core::PolicyId;

    use super::*;

    #[test]
    fn attach_is_idempotent() {
        let ns = Namespace::new("acme");
        let mut role = Role::new(ns.clone(), "ops", Utc::now());
        let p = PolicyRef::new(ns, PolicyId::new());

        assert!(role.attach_policy(p.clone()));
        assert!(!role.attach_policy(p.clone()));
        assert_eq!(role.policies.len(), 1);

        assert!(role.detach_policy(&p));
        assert!(!role.detach_policy(&p));
        assert!(role.policies.is_empty());
    }

    #[test]
    fn built_in_role_references_its_policy() {
        let ns = Namespace::new("acme");
        let policy = PolicyRef::new(ns.clone(), PolicyId::new());
        let role = Role::built_in(ns, BuiltInKind::NamespaceRoot, policy.clone(), Utc::now());
        assert_eq!(role.name, "NAMESPACE_ROOT");
        assert_eq!(role.policies, vec![policy]);
        assert_eq!(role.managed_by.built_in_kind(), Some(BuiltInKind::NamespaceRoot));
    }
}
