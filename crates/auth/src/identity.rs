//! Identity (principal) records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{IamResult, IdentityId, ManagedBy, Namespace, Record, RecordMeta};

use crate::policy::{PolicyRef, validate_name};
use crate::role::RoleRef;

/// Reference to an Identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityRef {
    pub namespace: Namespace,
    pub uuid: IdentityId,
}

/// A principal (user or service) with direct Policy/Role attachments.
///
/// # Invariants
/// - An inactive identity is never granted a token and never passes an
///   access check, whatever it has attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub namespace: Namespace,
    pub uuid: IdentityId,
    pub name: String,
    pub active: bool,
    pub managed_by: ManagedBy,
    pub policies: Vec<PolicyRef>,
    pub roles: Vec<RoleRef>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Identity {
    pub fn new(namespace: Namespace, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            namespace,
            uuid: IdentityId::new(),
            name: name.into(),
            active: true,
            managed_by: ManagedBy::Unmanaged,
            policies: Vec::new(),
            roles: Vec::new(),
            meta: RecordMeta::new(now),
        }
    }

    pub fn reference(&self) -> IdentityRef {
        IdentityRef {
            namespace: self.namespace.clone(),
            uuid: self.uuid,
        }
    }

    pub fn validate(&self) -> IamResult<()> {
        validate_name(&self.name)
    }

    pub fn attach_policy(&mut self, policy: PolicyRef) -> bool {
        if self.policies.contains(&policy) {
            return false;
        }
        self.policies.push(policy);
        true
    }

    pub fn detach_policy(&mut self, policy: &PolicyRef) -> bool {
        let before = self.policies.len();
        self.policies.retain(|p| p != policy);
        self.policies.len() != before
    }

    pub fn attach_role(&mut self, role: RoleRef) -> bool {
        if self.roles.contains(&role) {
            return false;
        }
        self.roles.push(role);
        true
    }

    pub fn detach_role(&mut self, role: &RoleRef) -> bool {
        let before = self.roles.len();
        self.roles.retain(|r| r != role);
        self.roles.len() != before
    }
}

impl Record for Identity {
    const KIND: &'static str = "identity";

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
    use warden_core::RoleId;

    use super::*;

    #[test]
    fn new_identity_is_active_and_bare() {
        let id = Identity::new(Namespace::new("acme"), "alice", Utc::now());
        assert!(id.active);
        assert!(id.policies.is_empty());
        assert!(id.roles.is_empty());
        assert_eq!(id.meta.version, 1);
    }

    #[test]
    fn role_attachment_round_trip() {
        let ns = Namespace::new("acme");
        let mut id = Identity::new(ns.clone(), "alice", Utc::now());
        let role = RoleRef::new(ns, RoleId::new());
        assert!(id.attach_role(role.clone()));
        assert!(!id.attach_role(role.clone()));
        assert!(id.detach_role(&role));
        assert!(id.roles.is_empty());
    }
}
