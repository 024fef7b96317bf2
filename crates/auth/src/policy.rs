use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{BuiltInKind, IamError, IamResult, ManagedBy, Namespace, PolicyId, Record, RecordMeta};

/// Reference to a Policy in (possibly) another namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyRef {
    pub namespace: Namespace,
    pub uuid: PolicyId,
}

impl PolicyRef {
    pub fn new(namespace: Namespace, uuid: PolicyId) -> Self {
        Self { namespace, uuid }
    }
}

/// Named bundle of allowed resource/action strings.
///
/// Entries are opaque dotted names (e.g. `"order.read"`) with an optional
/// trailing `*` wildcard (e.g. `"order.*"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub namespace: Namespace,
    pub uuid: PolicyId,
    pub name: String,
    pub description: String,
    pub managed_by: ManagedBy,
    /// Grants in every namespace, not just `namespace`.
    pub namespace_independent: bool,
    pub resources: Vec<String>,
    pub actions: Vec<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Policy {
    pub fn new(namespace: Namespace, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            namespace,
            uuid: PolicyId::new(),
            name: name.into(),
            description: String::new(),
            managed_by: ManagedBy::Unmanaged,
            namespace_independent: false,
            resources: Vec::new(),
            actions: Vec::new(),
            tags: Vec::new(),
            meta: RecordMeta::new(now),
        }
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// System-provisioned policy for `kind`.
    pub fn built_in(namespace: Namespace, kind: BuiltInKind, now: DateTime<Utc>) -> Self {
        let mut policy = Policy::new(namespace, kind.as_str(), now);
        policy.managed_by = ManagedBy::built_in(kind);
        match kind {
            BuiltInKind::Empty => {
                policy.description = "Grants nothing".to_string();
            }
            BuiltInKind::NamespaceRoot => {
                policy.description = "Full access within the namespace".to_string();
                policy.resources = vec!["*".to_string()];
                policy.actions = vec!["*".to_string()];
            }
            BuiltInKind::GlobalRoot => {
                policy.description = "Full access in every namespace".to_string();
                policy.namespace_independent = true;
                policy.resources = vec!["*".to_string()];
                policy.actions = vec!["*".to_string()];
            }
        }
        policy
    }

    pub fn reference(&self) -> PolicyRef {
        PolicyRef::new(self.namespace.clone(), self.uuid)
    }

    /// Validate caller-supplied content before it is stored.
    pub fn validate(&self) -> IamResult<()> {
        validate_name(&self.name)?;
        if self.namespace_independent && !self.namespace.is_global() {
            return Err(IamError::invalid_argument(
                "namespace-independent policies must live in the global namespace",
            ));
        }
        for r in &self.resources {
            validate_entry("resource", r)?;
        }
        for a in &self.actions {
            validate_entry("action", a)?;
        }
        Ok(())
    }
}

impl Record for Policy {
    const KIND: &'static str = "policy";

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

/// Record names must be non-empty and printable.
pub fn validate_name(name: &str) -> IamResult<()> {
    if name.trim().is_empty() {
        return Err(IamError::invalid_argument("name must not be empty"));
    }
    if name.chars().any(char::is_control) {
        return Err(IamError::invalid_argument("name contains control characters"));
    }
    Ok(())
}

/// Resource/action entries match `^[A-Za-z0-9._]*\*?$`.
pub fn validate_entry(what: &str, entry: &str) -> IamResult<()> {
    let body = entry.strip_suffix('*').unwrap_or(entry);
    if body
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        Ok(())
    } else {
        Err(IamError::invalid_argument(format!(
            "{what} '{entry}' must match [A-Za-z0-9._]* with an optional trailing '*'"
        )))
    }
}
