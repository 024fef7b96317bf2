//! Ownership classification shared by Policies, Roles and Identities.

use serde::{Deserialize, Serialize};

use crate::{IdentityId, Namespace};

/// Kind of a system-provisioned primitive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuiltInKind {
    /// Grants nothing.
    Empty,
    /// `*`/`*` restricted to the owning namespace.
    NamespaceRoot,
    /// `*`/`*` in every namespace. Only provisioned in the global namespace.
    GlobalRoot,
}

impl BuiltInKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltInKind::Empty => "EMPTY",
            BuiltInKind::NamespaceRoot => "NAMESPACE_ROOT",
            BuiltInKind::GlobalRoot => "GLOBAL_ROOT",
        }
    }

    /// Built-ins provisioned for a namespace.
    pub fn for_namespace(namespace: &Namespace) -> &'static [BuiltInKind] {
        if namespace.is_global() {
            &[
                BuiltInKind::Empty,
                BuiltInKind::NamespaceRoot,
                BuiltInKind::GlobalRoot,
            ]
        } else {
            &[BuiltInKind::Empty, BuiltInKind::NamespaceRoot]
        }
    }
}

impl core::fmt::Display for BuiltInKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who owns (and may mutate) a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManagedBy {
    /// Freely editable by administrators.
    #[default]
    Unmanaged,
    /// Provisioned by the bootstrap service.
    BuiltIn { kind: BuiltInKind },
    /// Owned by a specific identity.
    OwnedByIdentity {
        namespace: Namespace,
        identity: IdentityId,
    },
    /// Owned by another service. A non-empty `management_id` makes creation
    /// idempotent on `(service, management_id)`.
    OwnedByService {
        service: String,
        reason: String,
        management_id: String,
    },
}

impl ManagedBy {
    pub fn built_in(kind: BuiltInKind) -> Self {
        Self::BuiltIn { kind }
    }

    pub fn built_in_kind(&self) -> Option<BuiltInKind> {
        match self {
            ManagedBy::BuiltIn { kind } => Some(*kind),
            ManagedBy::Unmanaged
            | ManagedBy::OwnedByIdentity { .. }
            | ManagedBy::OwnedByService { .. } => None,
        }
    }

    /// `(service, management_id)` when this is a deduplicated service-managed record.
    pub fn management_key(&self) -> Option<(&str, &str)> {
        match self {
            ManagedBy::OwnedByService {
                service,
                management_id,
                ..
            } if !management_id.is_empty() => Some((service.as_str(), management_id.as_str())),
            ManagedBy::OwnedByService { .. }
            | ManagedBy::Unmanaged
            | ManagedBy::BuiltIn { .. }
            | ManagedBy::OwnedByIdentity { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_key_requires_non_empty_id() {
        let with_id = ManagedBy::OwnedByService {
            service: "catalog".into(),
            reason: "sku sync".into(),
            management_id: "sku-1".into(),
        };
        assert_eq!(with_id.management_key(), Some(("catalog", "sku-1")));

        let without_id = ManagedBy::OwnedByService {
            service: "catalog".into(),
            reason: "adhoc".into(),
            management_id: String::new(),
        };
        assert_eq!(without_id.management_key(), None);
        assert_eq!(ManagedBy::Unmanaged.management_key(), None);
    }

    #[test]
    fn global_namespace_gets_global_root() {
        assert!(BuiltInKind::for_namespace(&Namespace::global()).contains(&BuiltInKind::GlobalRoot));
        assert!(!BuiltInKind::for_namespace(&Namespace::new("acme")).contains(&BuiltInKind::GlobalRoot));
    }

    #[test]
    fn managed_by_serializes_as_tagged_variant() {
        let json = serde_json::to_value(ManagedBy::built_in(BuiltInKind::NamespaceRoot)).unwrap();
        assert_eq!(json["type"], "built_in");
        assert_eq!(json["kind"], "NAMESPACE_ROOT");
    }
}
