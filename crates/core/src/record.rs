//! Persisted record metadata shared by every stored document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Namespace;

/// Timestamps + monotonically increasing version.
///
/// Concurrent updates to the same record interleave; `version` records how
/// many updates were applied but is not used to reject stale writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub version: u64,
}

impl RecordMeta {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created: now,
            updated: now,
            version: 1,
        }
    }

    /// Mark the record as updated at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated = now;
        self.version += 1;
    }
}

/// Namespace-partitioned stored document.
pub trait Record: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Collection name (e.g. "policy").
    const KIND: &'static str;

    fn namespace(&self) -> &Namespace;

    /// Primary key (`_id`) within the namespace.
    fn uuid(&self) -> Uuid;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn version(&self) -> u64 {
        self.meta().version
    }
}
