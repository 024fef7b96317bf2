//! Built-in policies and roles for new namespaces.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, instrument};

use warden_auth::{Policy, Role};
use warden_core::{BuiltInKind, IamResult, Namespace};
use warden_events::{Envelope, HandlerOutcome, MessageHandler, NamespaceEvent};

use crate::store::{PolicyStore, RoleStore};

/// Documents written by one bootstrap run. Zero on a re-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub inserted_policies: usize,
    pub inserted_roles: usize,
}

impl BootstrapReport {
    pub fn is_noop(&self) -> bool {
        self.inserted_policies == 0 && self.inserted_roles == 0
    }
}

#[derive(Clone)]
pub struct BootstrapService {
    policies: Arc<dyn PolicyStore>,
    roles: Arc<dyn RoleStore>,
}

impl BootstrapService {
    pub fn new(policies: Arc<dyn PolicyStore>, roles: Arc<dyn RoleStore>) -> Self {
        Self { policies, roles }
    }

    /// Insert whichever built-ins `namespace` is missing; existing ones are
    /// never overwritten.
    #[instrument(skip(self), fields(namespace = %namespace), err)]
    pub async fn ensure_built_ins(&self, namespace: &Namespace) -> IamResult<BootstrapReport> {
        let mut report = BootstrapReport::default();
        for &kind in BuiltInKind::for_namespace(namespace) {
            let now = Utc::now();
            let (policy, inserted) = self
                .policies
                .ensure_built_in(Policy::built_in(namespace.clone(), kind, now))
                .await?;
            report.inserted_policies += usize::from(inserted);

            let (_, inserted) = self
                .roles
                .ensure_built_in(Role::built_in(namespace.clone(), kind, policy.reference(), now))
                .await?;
            report.inserted_roles += usize::from(inserted);
        }

        if report.is_noop() {
            info!("built-ins already present");
        } else {
            info!(
                policies = report.inserted_policies,
                roles = report.inserted_roles,
                "built-ins inserted"
            );
        }
        Ok(report)
    }
}

/// Runs bootstrap for every namespace-creation message.
///
/// Any failure nacks; the consumer redelivers with backoff.
pub struct NamespaceEventHandler {
    bootstrap: BootstrapService,
}

impl NamespaceEventHandler {
    pub fn new(bootstrap: BootstrapService) -> Self {
        Self { bootstrap }
    }
}

#[async_trait]
impl MessageHandler<Envelope<NamespaceEvent>> for NamespaceEventHandler {
    async fn handle(&self, message: &Envelope<NamespaceEvent>) -> HandlerOutcome {
        let namespace = message.payload().namespace();
        match self.bootstrap.ensure_built_ins(namespace).await {
            Ok(_) => HandlerOutcome::Ack,
            Err(e) => {
                error!(
                    message_id = %message.message_id(),
                    namespace = %namespace,
                    error = %e,
                    "namespace bootstrap failed"
                );
                HandlerOutcome::nack()
            }
        }
    }
}
