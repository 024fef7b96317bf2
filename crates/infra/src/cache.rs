//! Process-local caches.
//!
//! - [`RecordCache`]: TTL read-through cache for Policy/Role/Identity records
//!   keyed by `(kind, namespace, uuid)`. Writes pre-invalidate the key.
//! - [`ExpiringCell`]: a single lazily loaded value behind a read/write lock
//!   that is forcibly reloaded after a fixed window.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::future::Cache;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use warden_core::{Namespace, Record};

use crate::config::ConfigError;

// ───────────────────────────────────────────────────────────────────────────
// CacheConfig
// ───────────────────────────────────────────────────────────────────────────

const DEFAULT_MAX_ENTRIES: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

const MIN_TTL: Duration = Duration::from_secs(1);

/// Configuration for a record cache.
///
/// `max_entries` must be >= 1 and `ttl` >= 1 second. Use
/// [`CacheConfig::disabled()`] to turn caching off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    max_entries: u64,
    ttl: Duration,
    enabled: bool,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_entries: 0,
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            enabled: true,
        }
    }
}

pub struct CacheConfigBuilder {
    max_entries: u64,
    ttl: Duration,
}

impl CacheConfigBuilder {
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                value: self.max_entries.to_string(),
                min: "1".to_owned(),
            });
        }
        if self.ttl < MIN_TTL {
            return Err(ConfigError::BelowMinimum {
                field: "ttl",
                value: format!("{}ms", self.ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        Ok(CacheConfig {
            max_entries: self.max_entries,
            ttl: self.ttl,
            enabled: true,
        })
    }
}

// ───────────────────────────────────────────────────────────────────────────
// RecordCache
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: &'static str,
    namespace: Namespace,
    uuid: Uuid,
}

impl CacheKey {
    fn new<R: Record>(namespace: &Namespace, uuid: Uuid) -> Self {
        Self {
            kind: R::KIND,
            namespace: namespace.clone(),
            uuid,
        }
    }
}

/// TTL cache of one record kind.
///
/// Only present records are cached; a miss always falls through to the store.
///
/// Read-through fills race with writes: a reader can load a record, lose the
/// CPU to a writer that updates and invalidates, then cache its stale copy.
/// Every invalidation bumps a generation counter, and a fill whose read began
/// before a bump evicts what it just inserted.
#[derive(Clone)]
pub struct RecordCache<R: Record> {
    cache: Option<Cache<CacheKey, R>>,
    generation: Arc<AtomicU64>,
}

impl<R: Record> RecordCache<R> {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = if config.enabled() {
            Some(
                Cache::builder()
                    .max_capacity(config.max_entries())
                    .time_to_live(config.ttl())
                    .build(),
            )
        } else {
            None
        };
        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&CacheConfig::disabled())
    }

    pub async fn get(&self, namespace: &Namespace, uuid: Uuid) -> Option<R> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(&CacheKey::new::<R>(namespace, uuid)).await;
        if hit.is_some() {
            trace!(kind = R::KIND, namespace = %namespace, %uuid, "record cache hit");
        }
        hit
    }

    /// Take before reading the store; pass to [`RecordCache::fill`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cache `record`, read from the store after `observed` was taken.
    pub async fn fill(&self, record: &R, observed: u64) {
        let Some(cache) = &self.cache else {
            return;
        };
        let key = CacheKey::new::<R>(record.namespace(), record.uuid());
        if self.generation() != observed {
            return;
        }
        cache.insert(key.clone(), record.clone()).await;
        // A write may have invalidated between the check and the insert.
        if self.generation() != observed {
            trace!(kind = R::KIND, uuid = %record.uuid(), "stale fill dropped");
            cache.invalidate(&key).await;
        }
    }

    /// Drop the cached copy. Call after the store write has landed.
    pub async fn invalidate(&self, namespace: &Namespace, uuid: Uuid) {
        if let Some(cache) = &self.cache {
            self.generation.fetch_add(1, Ordering::SeqCst);
            cache.invalidate(&CacheKey::new::<R>(namespace, uuid)).await;
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// ExpiringCell
// ───────────────────────────────────────────────────────────────────────────

struct Loaded<T> {
    value: T,
    loaded_at: Instant,
}

/// A lazily loaded value with a hard eviction window.
///
/// Readers take the read lock and only see a value younger than `ttl`.
/// Loaders hold the write lock for the entire load, so at most one load runs
/// per cell at a time.
pub struct ExpiringCell<T> {
    slot: RwLock<Option<Loaded<T>>>,
    ttl: Duration,
}

impl<T: Clone> ExpiringCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    /// Current value, if loaded and not yet evicted.
    pub async fn get(&self) -> Option<T> {
        let guard = self.slot.read().await;
        guard
            .as_ref()
            .filter(|l| l.loaded_at.elapsed() < self.ttl)
            .map(|l| l.value.clone())
    }

    /// Return the current value or run `load` under the write lock.
    ///
    /// A failed load leaves the cell empty.
    pub async fn get_or_try_load<F, Fut, E>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(v) = self.get().await {
            return Ok(v);
        }

        let mut guard = self.slot.write().await;
        if let Some(l) = guard.as_ref().filter(|l| l.loaded_at.elapsed() < self.ttl) {
            return Ok(l.value.clone());
        }

        *guard = None;
        let value = load().await?;
        *guard = Some(Loaded {
            value: value.clone(),
            loaded_at: Instant::now(),
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use warden_auth::Policy;

    use super::*;

    #[test]
    fn builder_rejects_degenerate_values() {
        assert!(CacheConfig::builder().max_entries(0).build().is_err());
        assert!(CacheConfig::builder().ttl(Duration::from_millis(10)).build().is_err());
        let ok = CacheConfig::builder()
            .max_entries(5)
            .ttl(Duration::from_secs(2))
            .build()
            .unwrap();
        assert!(ok.enabled());
        assert_eq!(ok.max_entries(), 5);
    }

    #[tokio::test]
    async fn record_cache_round_trip_and_invalidate() {
        let cache = RecordCache::<Policy>::new(&CacheConfig::default());
        let policy = Policy::new(Namespace::new("acme"), "p", Utc::now());
        let id = *policy.uuid.as_uuid();

        assert!(cache.get(&policy.namespace, id).await.is_none());
        cache.fill(&policy, cache.generation()).await;
        assert_eq!(cache.get(&policy.namespace, id).await, Some(policy.clone()));

        // Same uuid in another namespace is a different key.
        assert!(cache.get(&Namespace::new("globex"), id).await.is_none());

        cache.invalidate(&policy.namespace, id).await;
        assert!(cache.get(&policy.namespace, id).await.is_none());
    }

    #[tokio::test]
    async fn fill_that_straddles_a_write_is_not_cached() {
        let cache = RecordCache::<Policy>::new(&CacheConfig::default());
        let stale = Policy::new(Namespace::new("acme"), "before", Utc::now());
        let id = *stale.uuid.as_uuid();

        // Reader samples the generation and loads the record...
        let observed = cache.generation();
        // ...a writer lands and invalidates...
        cache.invalidate(&stale.namespace, id).await;
        // ...then the reader tries to cache what it loaded.
        cache.fill(&stale, observed).await;
        assert!(cache.get(&stale.namespace, id).await.is_none());

        // A read that starts after the write caches normally.
        cache.fill(&stale, cache.generation()).await;
        assert!(cache.get(&stale.namespace, id).await.is_some());
    }

    #[tokio::test]
    async fn disabled_record_cache_never_hits() {
        let cache = RecordCache::<Policy>::new(&CacheConfig::disabled());
        let policy = Policy::new(Namespace::new("acme"), "p", Utc::now());
        cache.fill(&policy, cache.generation()).await;
        assert!(cache.get(&policy.namespace, *policy.uuid.as_uuid()).await.is_none());
    }

    #[tokio::test]
    async fn expiring_cell_loads_once_then_reloads_after_window() {
        let cell = ExpiringCell::<u32>::new(Duration::from_millis(50));
        let counter = AtomicU32::new(0);
        let loads = &counter;
        let load = move || async move { Ok::<_, ()>(loads.fetch_add(1, Ordering::SeqCst) + 1) };

        assert_eq!(cell.get_or_try_load(load).await, Ok(1));
        assert_eq!(cell.get_or_try_load(load).await, Ok(1));
        assert_eq!(cell.get().await, Some(1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cell.get().await, None);
        assert_eq!(cell.get_or_try_load(load).await, Ok(2));
    }

    #[tokio::test]
    async fn failed_load_leaves_cell_empty() {
        let cell = ExpiringCell::<u32>::new(Duration::from_secs(60));
        let r: Result<u32, &str> = cell.get_or_try_load(|| async { Err("sealed") }).await;
        assert_eq!(r, Err("sealed"));
        assert_eq!(cell.get().await, None);

        cell.get_or_try_load(|| async { Ok::<_, &str>(7) }).await.unwrap();
        cell.invalidate().await;
        assert_eq!(cell.get().await, None);
    }
}
