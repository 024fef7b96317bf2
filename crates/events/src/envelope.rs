use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::Namespace;

/// Envelope for a published message.
///
/// `message_id` is stable across redeliveries so handlers can log and
/// correlate duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    message_id: Uuid,
    published_at: DateTime<Utc>,
    payload: M,
}

impl<M> Envelope<M> {
    pub fn new(payload: M) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            published_at: Utc::now(),
            payload,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    pub fn into_payload(self) -> M {
        self.payload
    }
}

/// Lifecycle events about namespaces, emitted by the namespace registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamespaceEvent {
    Created { namespace: Namespace },
}

impl NamespaceEvent {
    pub fn created(namespace: Namespace) -> Self {
        Self::Created { namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        match self {
            NamespaceEvent::Created { namespace } => namespace,
        }
    }
}
