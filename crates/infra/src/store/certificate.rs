use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use warden_auth::Certificate;
use warden_core::{CertificateId, IamResult, Namespace};

use crate::cache::CacheConfig;
use crate::namespace::NamespaceDirectory;
use crate::store::Repository;

/// Client-certificate records. Reads always go to the store: a disabled
/// flag must take effect immediately.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn create(&self, certificate: Certificate) -> IamResult<Certificate>;

    async fn get(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<Certificate>;

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Certificate>>;

    async fn set_disabled(&self, namespace: &Namespace, uuid: CertificateId, disabled: bool) -> IamResult<Certificate>;

    async fn delete(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<()>;
}

pub struct InMemoryCertificateStore {
    repo: Repository<Certificate>,
}

impl InMemoryCertificateStore {
    pub fn new(namespaces: Arc<dyn NamespaceDirectory>) -> Self {
        Self {
            repo: Repository::new(&CacheConfig::disabled(), namespaces),
        }
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn create(&self, certificate: Certificate) -> IamResult<Certificate> {
        let created = certificate.clone();
        // Serial numbers derive from the uuid, so the uuid is the only unique key.
        self.repo.insert_unless(certificate, |_| false).await?;
        info!(namespace = %created.namespace, certificate = %created.uuid, identity = %created.identity, "certificate record created");
        Ok(created)
    }

    async fn get(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<Certificate> {
        self.repo.get(namespace, *uuid.as_uuid(), false).await
    }

    async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Certificate>> {
        self.repo.list(namespace)
    }

    async fn set_disabled(&self, namespace: &Namespace, uuid: CertificateId, disabled: bool) -> IamResult<Certificate> {
        let (certificate, ()) = self
            .repo
            .update(namespace, *uuid.as_uuid(), |stored| {
                stored.disabled = disabled;
                Ok(())
            })
            .await?;
        info!(namespace = %namespace, certificate = %uuid, disabled, "certificate state changed");
        Ok(certificate)
    }

    async fn delete(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<()> {
        self.repo.delete(namespace, *uuid.as_uuid()).await
    }
}
