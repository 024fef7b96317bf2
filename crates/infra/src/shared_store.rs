//! Shared key/value store used to converge multiple instances on one value.
//!
//! Only two primitives are needed: read, and set-if-absent. The CA uses them
//! to publish its root certificate exactly once across processes.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use warden_core::IamError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedStoreError {
    #[error("shared store connection error: {0}")]
    Connection(String),

    #[error("shared store command error: {0}")]
    Command(String),
}

impl From<SharedStoreError> for IamError {
    fn from(value: SharedStoreError) -> Self {
        IamError::internal(value.to_string())
    }
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError>;

    /// Write `value` unless `key` is already set. Returns `true` if this call
    /// wrote the value.
    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, SharedStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySharedStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SharedStoreError::Command("shared store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, SharedStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SharedStoreError::Command("shared store lock poisoned".into()))?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }
}

#[cfg(feature = "redis")]
pub use redis_store::RedisSharedStore;

#[cfg(feature = "redis")]
mod redis_store {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tracing::instrument;

    use super::{SharedStore, SharedStoreError};

    /// Redis-backed shared store (`GET` / `SET key value NX`).
    ///
    /// The client is synchronous; each command runs on the blocking pool.
    #[derive(Debug, Clone)]
    pub struct RedisSharedStore {
        client: Arc<redis::Client>,
    }

    impl RedisSharedStore {
        pub fn new(redis_url: impl AsRef<str>) -> Result<Self, SharedStoreError> {
            let client = redis::Client::open(redis_url.as_ref())
                .map_err(|e| SharedStoreError::Connection(e.to_string()))?;
            Ok(Self {
                client: Arc::new(client),
            })
        }

        async fn run<T, F>(&self, f: F) -> Result<T, SharedStoreError>
        where
            T: Send + 'static,
            F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
        {
            let client = Arc::clone(&self.client);
            tokio::task::spawn_blocking(move || {
                let mut conn = client
                    .get_connection()
                    .map_err(|e| SharedStoreError::Connection(e.to_string()))?;
                f(&mut conn).map_err(|e| SharedStoreError::Command(e.to_string()))
            })
            .await
            .map_err(|e| SharedStoreError::Command(format!("redis task failed: {e}")))?
        }
    }

    #[async_trait]
    impl SharedStore for RedisSharedStore {
        #[instrument(skip(self))]
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError> {
            let key = key.to_string();
            self.run(move |conn| redis::cmd("GET").arg(&key).query(conn))
                .await
        }

        #[instrument(skip(self, value), fields(len = value.len()))]
        async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, SharedStoreError> {
            let key = key.to_string();
            let value = value.to_vec();
            let reply: Option<String> = self
                .run(move |conn| {
                    redis::cmd("SET")
                        .arg(&key)
                        .arg(value)
                        .arg("NX")
                        .query(conn)
                })
                .await?;
            Ok(reply.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_writer_wins() {
        let store = InMemorySharedStore::new();
        assert_eq!(store.get("root").await.unwrap(), None);

        assert!(store.set_if_absent("root", b"one").await.unwrap());
        assert!(!store.set_if_absent("root", b"two").await.unwrap());
        assert_eq!(store.get("root").await.unwrap(), Some(b"one".to_vec()));
    }
}
