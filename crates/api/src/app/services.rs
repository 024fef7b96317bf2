use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use tokio::runtime::Handle;

use warden_core::{IamError, IamResult, Namespace};
use warden_events::{
    Consumer, ConsumerHandle, Envelope, EventBus, InMemoryEventBus, NamespaceEvent, RetryPolicy,
};
use warden_infra::{
    AuthorizationService, BootstrapService, CaSettings, CertificateAuthority, IdentityDirectory,
    InMemoryCertificateStore, InMemoryIdentityDirectory, InMemoryNamespaceDirectory,
    InMemoryPolicyStore, InMemoryRoleStore, InMemorySharedStore, KeyCustodyClient,
    NamespaceDirectory, NamespaceEventHandler, PolicyResolver, PolicyStore, RoleStore,
    SharedStore, TokenService, TokenSettings, WardenConfig,
};

type NamespaceBus = InMemoryEventBus<Envelope<NamespaceEvent>>;

/// Everything the HTTP handlers need, wired once at startup.
pub struct AppServices {
    pub namespaces: Arc<InMemoryNamespaceDirectory>,
    pub policies: Arc<dyn PolicyStore>,
    pub roles: Arc<dyn RoleStore>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub tokens: Arc<TokenService>,
    pub authorization: AuthorizationService,
    pub ca: Arc<CertificateAuthority>,
    bus: Arc<NamespaceBus>,
    consumer: Mutex<Option<ConsumerHandle<Envelope<NamespaceEvent>>>>,
}

/// Wire stores and services around `custody`, start the namespace
/// bootstrap consumer and provision the global namespace.
///
/// Must run inside a tokio runtime.
pub async fn build_services(
    config: &WardenConfig,
    custody: Arc<dyn KeyCustodyClient>,
) -> anyhow::Result<AppServices> {
    let cache = config.record_cache()?;

    let namespaces = Arc::new(InMemoryNamespaceDirectory::new());
    let directory: Arc<dyn NamespaceDirectory> = namespaces.clone();
    let policies: Arc<dyn PolicyStore> =
        Arc::new(InMemoryPolicyStore::new(&cache, Arc::clone(&directory)));
    let roles: Arc<dyn RoleStore> = Arc::new(InMemoryRoleStore::new(
        &cache,
        Arc::clone(&directory),
        Arc::clone(&policies),
    ));
    let identities: Arc<dyn IdentityDirectory> = Arc::new(InMemoryIdentityDirectory::new(
        &cache,
        Arc::clone(&directory),
        Arc::clone(&policies),
        Arc::clone(&roles),
    ));
    let certificates = Arc::new(InMemoryCertificateStore::new(directory));

    let resolver = PolicyResolver::new(Arc::clone(&roles), Arc::clone(&policies));
    let tokens = Arc::new(TokenService::new(
        Arc::clone(&custody),
        Arc::clone(&identities),
        resolver.clone(),
        TokenSettings::from_config(config),
    )?);
    let authorization =
        AuthorizationService::new(Arc::clone(&identities), resolver, Arc::clone(&tokens));
    let ca = Arc::new(CertificateAuthority::new(
        custody,
        shared_store()?,
        certificates,
        Arc::clone(&identities),
        CaSettings::from_config(config),
    ));

    let bootstrap = BootstrapService::new(Arc::clone(&policies), Arc::clone(&roles));
    bootstrap
        .ensure_built_ins(&Namespace::global())
        .await
        .context("bootstrapping the global namespace")?;

    let bus: Arc<NamespaceBus> = Arc::new(InMemoryEventBus::new());
    let consumer = Consumer::spawn(
        "namespace.bootstrap",
        &*bus,
        Handle::current(),
        Arc::new(NamespaceEventHandler::new(bootstrap)),
        RetryPolicy::exponential(
            config.bootstrap_max_attempts,
            Duration::from_millis(200),
            Duration::from_secs(30),
        ),
    )
    .context("spawning the namespace bootstrap consumer")?;

    Ok(AppServices {
        namespaces,
        policies,
        roles,
        identities,
        tokens,
        authorization,
        ca,
        bus,
        consumer: Mutex::new(Some(consumer)),
    })
}

#[cfg(not(feature = "redis"))]
fn shared_store() -> anyhow::Result<Arc<dyn SharedStore>> {
    Ok(Arc::new(InMemorySharedStore::new()))
}

/// `REDIS_URL` selects the Redis-backed store so several instances share one CA root.
#[cfg(feature = "redis")]
fn shared_store() -> anyhow::Result<Arc<dyn SharedStore>> {
    match std::env::var("REDIS_URL") {
        Ok(url) => {
            let store = warden_infra::RedisSharedStore::new(&url)?;
            tracing::info!("CA root shared through redis");
            Ok(Arc::new(store))
        }
        Err(_) => {
            tracing::warn!("REDIS_URL not set; CA root is local to this process");
            Ok(Arc::new(InMemorySharedStore::new()))
        }
    }
}

impl AppServices {
    /// Register `namespace` and publish its creation event.
    ///
    /// The event is published even for a known namespace so a caller can
    /// re-trigger a bootstrap that previously dead-lettered.
    pub fn create_namespace(&self, namespace: &Namespace) -> IamResult<bool> {
        let created = self.namespaces.register(namespace.clone())?;
        self.bus
            .publish(Envelope::new(NamespaceEvent::created(namespace.clone())))
            .map_err(|e| IamError::internal(format!("namespace event not published: {e}")))?;
        Ok(created)
    }

    /// Stop the bootstrap consumer. Blocks until its thread exits.
    pub fn shutdown(&self) {
        let handle = match self.consumer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let dead = handle.take_dead_letters();
            if !dead.is_empty() {
                tracing::error!(count = dead.len(), "namespace events left unprocessed");
            }
            handle.shutdown();
        }
    }
}
