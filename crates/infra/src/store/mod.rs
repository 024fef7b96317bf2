//! Namespace-partitioned record stores.
//!
//! Each store pairs a [`Collection`] with a read-through [`RecordCache`] and
//! checks namespace existence before creating records.

pub mod certificate;
pub mod collection;
pub mod identity;
pub mod policy;
pub mod role;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use warden_auth::{Identity, Policy, Role};
use warden_core::{BuiltInKind, IamError, IamResult, ManagedBy, Namespace, Record};

use crate::cache::{CacheConfig, RecordCache};
use crate::fanout::fan_out_by_namespace;
use crate::namespace::{NamespaceDirectory, require_namespace};

pub use certificate::{CertificateStore, InMemoryCertificateStore};
pub use collection::Collection;
pub use identity::{IdentityDirectory, InMemoryIdentityDirectory};
pub use policy::{InMemoryPolicyStore, PolicyStore};
pub use role::{InMemoryRoleStore, RoleStore};

/// Records carrying an ownership classification.
pub trait ManagedRecord: Record {
    fn managed_by(&self) -> &ManagedBy;
}

impl ManagedRecord for Policy {
    fn managed_by(&self) -> &ManagedBy {
        &self.managed_by
    }
}

impl ManagedRecord for Role {
    fn managed_by(&self) -> &ManagedBy {
        &self.managed_by
    }
}

impl ManagedRecord for Identity {
    fn managed_by(&self) -> &ManagedBy {
        &self.managed_by
    }
}

/// Collection + cache + namespace check shared by every store.
pub(crate) struct Repository<R: Record> {
    records: Arc<Collection<R>>,
    cache: RecordCache<R>,
    namespaces: Arc<dyn NamespaceDirectory>,
}

impl<R: Record> Repository<R> {
    pub(crate) fn new(cache: &CacheConfig, namespaces: Arc<dyn NamespaceDirectory>) -> Self {
        Self {
            records: Arc::new(Collection::new()),
            cache: RecordCache::new(cache),
            namespaces,
        }
    }

    /// Insert after checking the namespace; see [`Collection::insert_unless`].
    pub(crate) async fn insert_unless<F>(&self, record: R, conflict: F) -> IamResult<Option<R>>
    where
        F: Fn(&R) -> bool,
    {
        require_namespace(self.namespaces.as_ref(), record.namespace()).await?;
        self.records.insert_unless(record, conflict)
    }

    pub(crate) async fn get(&self, namespace: &Namespace, uuid: Uuid, use_cache: bool) -> IamResult<R> {
        if use_cache {
            if let Some(hit) = self.cache.get(namespace, uuid).await {
                return Ok(hit);
            }
        }
        let generation = self.cache.generation();
        let record = self
            .records
            .get(namespace, uuid)?
            .ok_or_else(IamError::not_found)?;
        self.cache.fill(&record, generation).await;
        Ok(record)
    }

    /// Batch read across namespaces. Unknown references are skipped.
    pub(crate) async fn get_multiple(
        &self,
        refs: Vec<(Namespace, Uuid)>,
        use_cache: bool,
    ) -> IamResult<Vec<R>> {
        let mut found = Vec::new();
        let mut misses = Vec::new();
        for (ns, uuid) in refs {
            let hit = if use_cache {
                self.cache.get(&ns, uuid).await
            } else {
                None
            };
            match hit {
                Some(record) => found.push(record),
                None => misses.push((ns, uuid)),
            }
        }
        if misses.is_empty() {
            return Ok(found);
        }

        let generation = self.cache.generation();
        let records = Arc::clone(&self.records);
        let fetched = fan_out_by_namespace(misses, move |ns, uuids| {
            let records = Arc::clone(&records);
            async move { records.get_many(&ns, &uuids) }
        })
        .await?;
        debug!(kind = R::KIND, hits = found.len(), fetched = fetched.len(), "batch read");

        for record in &fetched {
            self.cache.fill(record, generation).await;
        }
        found.extend(fetched);
        Ok(found)
    }

    /// Mutate a stored record. The cached copy is dropped whatever the outcome.
    pub(crate) async fn update<T, F>(&self, namespace: &Namespace, uuid: Uuid, mutate: F) -> IamResult<(R, T)>
    where
        F: FnOnce(&mut R) -> IamResult<T>,
    {
        let result = self.records.update(namespace, uuid, Utc::now(), mutate);
        self.cache.invalidate(namespace, uuid).await;
        result
    }

    pub(crate) async fn delete(&self, namespace: &Namespace, uuid: Uuid) -> IamResult<()> {
        let deleted = self.records.delete(namespace, uuid)?;
        self.cache.invalidate(namespace, uuid).await;
        if !deleted {
            return Err(IamError::not_found());
        }
        info!(kind = R::KIND, namespace = %namespace, %uuid, "record deleted");
        Ok(())
    }

    pub(crate) fn exists(&self, namespace: &Namespace, uuid: Uuid) -> IamResult<bool> {
        self.records.exists(namespace, uuid)
    }

    pub(crate) fn list(&self, namespace: &Namespace) -> IamResult<Vec<R>> {
        self.records.list(namespace)
    }

    pub(crate) fn count(&self, namespace: &Namespace) -> IamResult<usize> {
        self.records.count(namespace)
    }

    pub(crate) fn find<F>(&self, namespace: &Namespace, pred: F) -> IamResult<Option<R>>
    where
        F: Fn(&R) -> bool,
    {
        self.records.find(namespace, pred)
    }
}

impl<R: ManagedRecord> Repository<R> {
    /// Create a caller-supplied record.
    ///
    /// A service-managed record with a management id is unique on
    /// `(service, management_id)` within its namespace.
    pub(crate) async fn create(&self, record: R) -> IamResult<R> {
        if record.managed_by().built_in_kind().is_some() {
            return Err(IamError::invalid_argument(format!(
                "built-in {} records are provisioned by bootstrap only",
                R::KIND
            )));
        }
        let key = owned_management_key(record.managed_by());
        let created = record.clone();
        let conflict = self
            .insert_unless(record, |r| {
                key.is_some() && owned_management_key(r.managed_by()) == key
            })
            .await?;
        if let Some(existing) = conflict {
            return Err(IamError::already_exists(format!(
                "{} {} has the same service management id",
                R::KIND,
                existing.uuid()
            )));
        }
        info!(kind = R::KIND, namespace = %created.namespace(), uuid = %created.uuid(), "record created");
        Ok(created)
    }

    /// Insert a built-in record unless one of the same kind exists.
    ///
    /// Returns the stored record and whether this call inserted it. An
    /// existing record is never overwritten.
    pub(crate) async fn ensure_built_in(&self, record: R) -> IamResult<(R, bool)> {
        let kind = record
            .managed_by()
            .built_in_kind()
            .ok_or_else(|| IamError::invalid_argument(format!("{} is not built-in", R::KIND)))?;
        let inserted = record.clone();
        match self
            .insert_unless(record, |r| r.managed_by().built_in_kind() == Some(kind))
            .await?
        {
            Some(existing) => Ok((existing, false)),
            None => {
                info!(kind = R::KIND, namespace = %inserted.namespace(), built_in = %kind, "built-in record inserted");
                Ok((inserted, true))
            }
        }
    }

    pub(crate) fn find_built_in(&self, namespace: &Namespace, kind: BuiltInKind) -> IamResult<Option<R>> {
        self.find(namespace, |r| r.managed_by().built_in_kind() == Some(kind))
    }

    pub(crate) fn find_by_management(
        &self,
        namespace: &Namespace,
        service: &str,
        management_id: &str,
    ) -> IamResult<Option<R>> {
        self.find(namespace, |r| {
            r.managed_by().management_key() == Some((service, management_id))
        })
    }
}

fn owned_management_key(managed_by: &ManagedBy) -> Option<(String, String)> {
    managed_by
        .management_key()
        .map(|(service, id)| (service.to_string(), id.to_string()))
}

/// Built-in records are read-only outside bootstrap.
pub(crate) fn ensure_mutable<R: ManagedRecord>(record: &R) -> IamResult<()> {
    match record.managed_by().built_in_kind() {
        Some(kind) => Err(IamError::failed_precondition(format!(
            "built-in {} {kind} cannot be modified",
            R::KIND
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::namespace::InMemoryNamespaceDirectory;

    fn repo() -> Repository<Policy> {
        let dir = InMemoryNamespaceDirectory::new();
        dir.register(Namespace::new("acme")).unwrap();
        let cache = CacheConfig::builder()
            .ttl(Duration::from_secs(60))
            .build()
            .unwrap();
        Repository::new(&cache, Arc::new(dir))
    }

    fn service_policy(name: &str, management_id: &str) -> Policy {
        let mut p = Policy::new(Namespace::new("acme"), name, Utc::now());
        p.managed_by = ManagedBy::OwnedByService {
            service: "catalog".into(),
            reason: "sku sync".into(),
            management_id: management_id.into(),
        };
        p
    }

    #[tokio::test]
    async fn service_managed_create_is_deduplicated() {
        let repo = repo();
        repo.create(service_policy("a", "sku-1")).await.unwrap();
        let err = repo.create(service_policy("b", "sku-1")).await.unwrap_err();
        assert!(matches!(err, IamError::AlreadyExists(_)));

        repo.create(service_policy("c", "sku-2")).await.unwrap();
        // An empty management id opts out of deduplication.
        repo.create(service_policy("d", "")).await.unwrap();
        repo.create(service_policy("e", "")).await.unwrap();
        assert_eq!(repo.count(&Namespace::new("acme")).unwrap(), 4);
    }

    #[tokio::test]
    async fn create_in_unknown_namespace_is_a_precondition_failure() {
        let repo = repo();
        let p = Policy::new(Namespace::new("ghost"), "p", Utc::now());
        assert!(matches!(
            repo.create(p).await.unwrap_err(),
            IamError::FailedPrecondition(_)
        ));
    }

    #[tokio::test]
    async fn cached_read_is_dropped_on_update() {
        let repo = repo();
        let p = repo
            .create(Policy::new(Namespace::new("acme"), "before", Utc::now()))
            .await
            .unwrap();
        let id = *p.uuid.as_uuid();

        assert_eq!(repo.get(&p.namespace, id, true).await.unwrap().name, "before");
        repo.update(&p.namespace, id, |r| {
            r.name = "after".into();
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(repo.get(&p.namespace, id, true).await.unwrap().name, "after");
    }

    #[tokio::test]
    async fn get_in_unknown_namespace_is_not_found() {
        let repo = repo();
        let err = repo
            .get(&Namespace::new("ghost"), Uuid::now_v7(), true)
            .await
            .unwrap_err();
        assert_eq!(err, IamError::NotFound);
        assert!(!repo.exists(&Namespace::new("ghost"), Uuid::now_v7()).unwrap());
    }

    #[tokio::test]
    async fn ensure_built_in_never_overwrites() {
        let repo = repo();
        let ns = Namespace::new("acme");
        let (first, inserted) = repo
            .ensure_built_in(Policy::built_in(ns.clone(), BuiltInKind::Empty, Utc::now()))
            .await
            .unwrap();
        assert!(inserted);

        let (second, inserted) = repo
            .ensure_built_in(Policy::built_in(ns.clone(), BuiltInKind::Empty, Utc::now()))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(second.uuid, first.uuid);
        assert_eq!(
            repo.find_built_in(&ns, BuiltInKind::Empty).unwrap().map(|p| p.uuid),
            Some(first.uuid)
        );
        assert!(ensure_mutable(&second).is_err());
    }

    #[tokio::test]
    async fn get_multiple_mixes_cache_hits_and_fetches() {
        let repo = repo();
        let ns = Namespace::new("acme");
        let a = repo.create(Policy::new(ns.clone(), "a", Utc::now())).await.unwrap();
        let b = repo.create(Policy::new(ns.clone(), "b", Utc::now())).await.unwrap();
        repo.get(&ns, *a.uuid.as_uuid(), true).await.unwrap();

        let mut names: Vec<String> = repo
            .get_multiple(
                vec![
                    (ns.clone(), *a.uuid.as_uuid()),
                    (ns.clone(), *b.uuid.as_uuid()),
                    (ns.clone(), Uuid::now_v7()),
                ],
                true,
            )
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
