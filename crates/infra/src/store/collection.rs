use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_core::{IamError, IamResult, Namespace, Record};

/// Namespace-partitioned in-memory document collection.
///
/// One partition per namespace, keyed by record uuid. A namespace with no
/// partition behaves exactly like an empty one (reads are "not found").
/// Every operation is atomic per document; no lock is held across an await.
#[derive(Debug)]
pub struct Collection<R: Record> {
    partitions: RwLock<HashMap<Namespace, HashMap<Uuid, R>>>,
}

impl<R: Record> Default for Collection<R> {
    fn default() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<R: Record>() -> IamError {
    IamError::internal(format!("{} collection lock poisoned", R::KIND))
}

impl<R: Record> Collection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record; `AlreadyExists` if its uuid is taken.
    pub fn insert(&self, record: R) -> IamResult<()> {
        self.insert_unless(record, |_| false).map(|_| ())
    }

    /// Insert `record` unless an existing record in the same namespace
    /// matches `conflict`, in which case that record is returned instead.
    ///
    /// Check and insert happen under one write lock.
    pub fn insert_unless<F>(&self, record: R, conflict: F) -> IamResult<Option<R>>
    where
        F: Fn(&R) -> bool,
    {
        let mut parts = self.partitions.write().map_err(|_| poisoned::<R>())?;
        let part = parts.entry(record.namespace().clone()).or_default();

        if let Some(existing) = part.values().find(|r| conflict(r)) {
            return Ok(Some(existing.clone()));
        }
        if part.contains_key(&record.uuid()) {
            return Err(IamError::already_exists(format!(
                "{} {} already exists",
                R::KIND,
                record.uuid()
            )));
        }
        part.insert(record.uuid(), record);
        Ok(None)
    }

    pub fn get(&self, namespace: &Namespace, uuid: Uuid) -> IamResult<Option<R>> {
        let parts = self.partitions.read().map_err(|_| poisoned::<R>())?;
        Ok(parts.get(namespace).and_then(|p| p.get(&uuid)).cloned())
    }

    /// Multi-key read within one namespace; unknown keys are skipped.
    pub fn get_many(&self, namespace: &Namespace, uuids: &[Uuid]) -> IamResult<Vec<R>> {
        let parts = self.partitions.read().map_err(|_| poisoned::<R>())?;
        let Some(part) = parts.get(namespace) else {
            return Ok(Vec::new());
        };
        Ok(uuids.iter().filter_map(|u| part.get(u).cloned()).collect())
    }

    /// Apply `mutate` to a copy of the stored record and write it back with
    /// bumped metadata. The stored record is untouched if `mutate` fails.
    pub fn update<T, F>(
        &self,
        namespace: &Namespace,
        uuid: Uuid,
        now: DateTime<Utc>,
        mutate: F,
    ) -> IamResult<(R, T)>
    where
        F: FnOnce(&mut R) -> IamResult<T>,
    {
        let mut parts = self.partitions.write().map_err(|_| poisoned::<R>())?;
        let stored = parts
            .get_mut(namespace)
            .and_then(|p| p.get_mut(&uuid))
            .ok_or_else(IamError::not_found)?;

        let mut next = stored.clone();
        let out = mutate(&mut next)?;
        next.meta_mut().touch(now);
        *stored = next.clone();
        Ok((next, out))
    }

    /// Returns `false` if nothing was deleted.
    pub fn delete(&self, namespace: &Namespace, uuid: Uuid) -> IamResult<bool> {
        let mut parts = self.partitions.write().map_err(|_| poisoned::<R>())?;
        Ok(parts
            .get_mut(namespace)
            .map(|p| p.remove(&uuid).is_some())
            .unwrap_or(false))
    }

    pub fn exists(&self, namespace: &Namespace, uuid: Uuid) -> IamResult<bool> {
        let parts = self.partitions.read().map_err(|_| poisoned::<R>())?;
        Ok(parts.get(namespace).is_some_and(|p| p.contains_key(&uuid)))
    }

    /// All records of a namespace, oldest first.
    pub fn list(&self, namespace: &Namespace) -> IamResult<Vec<R>> {
        let parts = self.partitions.read().map_err(|_| poisoned::<R>())?;
        let mut out: Vec<R> = parts
            .get(namespace)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| {
            a.meta()
                .created
                .cmp(&b.meta().created)
                .then_with(|| a.uuid().cmp(&b.uuid()))
        });
        Ok(out)
    }

    pub fn count(&self, namespace: &Namespace) -> IamResult<usize> {
        let parts = self.partitions.read().map_err(|_| poisoned::<R>())?;
        Ok(parts.get(namespace).map_or(0, HashMap::len))
    }

    /// First record of `namespace` matching `pred` (secondary-index lookup).
    pub fn find<F>(&self, namespace: &Namespace, pred: F) -> IamResult<Option<R>>
    where
        F: Fn(&R) -> bool,
    {
        let parts = self.partitions.read().map_err(|_| poisoned::<R>())?;
        Ok(parts
            .get(namespace)
            .and_then(|p| p.values().find(|r| pred(r)).cloned()))
    }
}
