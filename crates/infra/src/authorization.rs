//! Authorization facade: password logins, refresh and access checks.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use warden_auth::{AccessExplanation, Identity, Scope, explain_scopes, policies_allow};
use warden_core::{IamError, IamResult, IdentityId, Namespace};

use crate::resolver::PolicyResolver;
use crate::store::IdentityDirectory;
use crate::token_service::{IssuedToken, TokenPair, TokenService, TokenStatus};

/// Result of an access check. Denials are not errors.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub explanation: AccessExplanation,
}

impl AccessDecision {
    fn from_explanation(explanation: AccessExplanation) -> Self {
        Self {
            granted: explanation.granted,
            explanation,
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService {
    identities: Arc<dyn IdentityDirectory>,
    resolver: PolicyResolver,
    tokens: Arc<TokenService>,
}

impl AuthorizationService {
    pub fn new(
        identities: Arc<dyn IdentityDirectory>,
        resolver: PolicyResolver,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            identities,
            resolver,
            tokens,
        }
    }

    /// Log in with a password and receive a token pair.
    ///
    /// Requested scopes must be covered by the identity's effective policies;
    /// no scopes means all of them.
    #[instrument(skip(self, password, scopes), fields(namespace = %namespace, identity = %identity, scopes = scopes.len()), err)]
    pub async fn create_token_with_password(
        &self,
        namespace: &Namespace,
        identity: IdentityId,
        password: &str,
        scopes: Vec<Scope>,
    ) -> IamResult<TokenPair> {
        let identity = self.authenticate(namespace, identity, password).await?;
        if !scopes.is_empty() {
            let policies = self.resolver.resolve_effective_policies(&identity).await?;
            if !policies_allow(&policies, &scopes) {
                warn!("requested scopes exceed the identity's policies");
                return Err(IamError::permission_denied(
                    "requested scopes are not granted to the identity",
                ));
            }
        }
        let pair = self.tokens.issue(&identity, scopes).await?;
        info!("password login succeeded");
        Ok(pair)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> IamResult<IssuedToken> {
        self.tokens.refresh(refresh_token).await
    }

    /// Are `scopes` covered by the bearer's token?
    ///
    /// A bearer that does not validate, a refresh token, or an identity that
    /// is gone or inactive is `Unauthenticated`.
    #[instrument(skip(self, bearer, scopes), fields(scopes = scopes.len()), err)]
    pub async fn check_access_with_token(&self, bearer: &str, scopes: &[Scope]) -> IamResult<AccessDecision> {
        require_scopes(scopes)?;
        let validation = self.tokens.validate(bearer).await?;
        let token = match (validation.status, validation.token) {
            (TokenStatus::Ok, Some(token)) => token,
            (status, _) => {
                return Err(IamError::unauthenticated(format!(
                    "bearer token rejected: {status:?}"
                )));
            }
        };
        if token.refresh {
            return Err(IamError::unauthenticated(
                "refresh tokens cannot be used for access checks",
            ));
        }

        let identity = match self.identities.get(&token.namespace, token.identity, true).await {
            Ok(identity) => identity,
            Err(IamError::NotFound) => {
                return Err(IamError::unauthenticated("identity no longer exists"));
            }
            Err(e) => return Err(e),
        };
        ensure_active(&identity)?;

        Ok(AccessDecision::from_explanation(explain_scopes(
            &token.scopes,
            scopes,
        )))
    }

    /// Are `scopes` covered by the identity's current effective policies?
    #[instrument(skip(self, password, scopes), fields(namespace = %namespace, identity = %identity, scopes = scopes.len()), err)]
    pub async fn check_access_with_password(
        &self,
        namespace: &Namespace,
        identity: IdentityId,
        password: &str,
        scopes: &[Scope],
    ) -> IamResult<AccessDecision> {
        require_scopes(scopes)?;
        let identity = self.authenticate(namespace, identity, password).await?;
        let policies = self.resolver.resolve_effective_policies(&identity).await?;
        Ok(AccessDecision::from_explanation(explain_scopes(
            &policies, scopes,
        )))
    }

    async fn authenticate(
        &self,
        namespace: &Namespace,
        identity: IdentityId,
        password: &str,
    ) -> IamResult<Identity> {
        let identity = match self.identities.verify_password(namespace, identity, password).await {
            Ok(identity) => identity,
            // Unknown identities look like wrong passwords.
            Err(IamError::NotFound) => {
                return Err(IamError::unauthenticated("invalid credentials"));
            }
            Err(e) => return Err(e),
        };
        ensure_active(&identity)?;
        Ok(identity)
    }
}

fn require_scopes(scopes: &[Scope]) -> IamResult<()> {
    if scopes.is_empty() {
        return Err(IamError::invalid_argument("at least one scope is required"));
    }
    Ok(())
}

fn ensure_active(identity: &Identity) -> IamResult<()> {
    if identity.active {
        Ok(())
    } else {
        warn!(namespace = %identity.namespace, identity = %identity.uuid, "inactive identity refused");
        Err(IamError::unauthenticated("identity is inactive"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use proptest::prelude::*;
    use warden_auth::Policy;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::namespace::{InMemoryNamespaceDirectory, NamespaceDirectory};
    use crate::store::{InMemoryIdentityDirectory, InMemoryPolicyStore, InMemoryRoleStore, PolicyStore};
    use crate::testing::custody_with;
    use crate::token_service::TokenSettings;

    struct Fixture {
        policies: Arc<InMemoryPolicyStore>,
        identities: Arc<InMemoryIdentityDirectory>,
        tokens: Arc<TokenService>,
        auth: AuthorizationService,
    }

    fn fixture() -> Fixture {
        let custody = custody_with(&["tok"]);
        let dir = InMemoryNamespaceDirectory::new();
        dir.register(Namespace::new("acme")).unwrap();
        let dir: Arc<dyn NamespaceDirectory> = Arc::new(dir);
        // Record cache off so deactivation is visible immediately.
        let cache = CacheConfig::disabled();
        let policies = Arc::new(InMemoryPolicyStore::new(&cache, Arc::clone(&dir)));
        let roles = Arc::new(InMemoryRoleStore::new(&cache, Arc::clone(&dir), policies.clone()));
        let identities = Arc::new(InMemoryIdentityDirectory::new(
            &cache,
            dir,
            policies.clone(),
            roles.clone(),
        ));
        let resolver = PolicyResolver::new(roles, policies.clone());
        let tokens = Arc::new(
            TokenService::new(
                custody,
                identities.clone(),
                resolver.clone(),
                TokenSettings {
                    key_name: "tok".into(),
                    access_ttl: Duration::from_secs(60),
                    refresh_ttl: Duration::from_secs(600),
                    public_key_cache: Duration::from_secs(60),
                    validation_cache: Duration::ZERO,
                },
            )
            .unwrap(),
        );
        let auth = AuthorizationService::new(identities.clone(), resolver, tokens.clone());
        Fixture {
            policies,
            identities,
            tokens,
            auth,
        }
    }

    fn acme() -> Namespace {
        Namespace::new("acme")
    }

    fn read_order() -> Scope {
        Scope::new(acme(), ["order.1"], ["read"])
    }

    async fn alice(f: &Fixture) -> Identity {
        let p = f
            .policies
            .create(
                Policy::new(acme(), "orders", Utc::now())
                    .with_resources(["order.*"])
                    .with_actions(["read"]),
            )
            .await
            .unwrap();
        let mut identity = Identity::new(acme(), "alice", Utc::now());
        identity.policies = vec![p.reference()];
        let identity = f.identities.create(identity).await.unwrap();
        f.identities
            .set_password(&acme(), identity.uuid, "hunter2")
            .await
            .unwrap();
        identity
    }

    #[tokio::test]
    async fn password_login_then_token_check() {
        let f = fixture();
        let alice = alice(&f).await;

        let pair = f
            .auth
            .create_token_with_password(&acme(), alice.uuid, "hunter2", vec![])
            .await
            .unwrap();
        let decision = f
            .auth
            .check_access_with_token(&pair.access.bearer, &[read_order()])
            .await
            .unwrap();
        assert!(decision.granted);
        assert_eq!(decision.explanation.scopes[0].granted_by, Some(0));

        let write = Scope::new(acme(), ["order.1"], ["write"]);
        let denied = f
            .auth
            .check_access_with_token(&pair.access.bearer, &[write])
            .await
            .unwrap();
        assert!(!denied.granted);

        let err = f
            .auth
            .check_access_with_token(&pair.refresh.bearer, &[read_order()])
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::Unauthenticated(_)));

        let refreshed = f.auth.refresh_token(&pair.refresh.bearer).await.unwrap();
        assert!(f.tokens.validate(&refreshed.bearer).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn narrowed_login_only_grants_what_was_asked() {
        let f = fixture();
        let alice = alice(&f).await;

        let pair = f
            .auth
            .create_token_with_password(&acme(), alice.uuid, "hunter2", vec![read_order()])
            .await
            .unwrap();
        let other = Scope::new(acme(), ["order.2"], ["read"]);
        assert!(
            !f.auth
                .check_access_with_token(&pair.access.bearer, &[other])
                .await
                .unwrap()
                .granted
        );

        let too_much = Scope::new(acme(), ["invoice.1"], ["read"]);
        let err = f
            .auth
            .create_token_with_password(&acme(), alice.uuid, "hunter2", vec![too_much])
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthenticated() {
        let f = fixture();
        let alice = alice(&f).await;

        for (uuid, password) in [(alice.uuid, "wrong"), (IdentityId::new(), "hunter2")] {
            let err = f
                .auth
                .create_token_with_password(&acme(), uuid, password, vec![])
                .await
                .unwrap_err();
            assert!(matches!(err, IamError::Unauthenticated(_)));
        }
        let err = f
            .auth
            .check_access_with_token("garbage", &[read_order()])
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn empty_scope_checks_are_rejected() {
        let f = fixture();
        let alice = alice(&f).await;
        let err = f
            .auth
            .check_access_with_password(&acme(), alice.uuid, "hunter2", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn deactivation_revokes_existing_tokens() {
        let f = fixture();
        let alice = alice(&f).await;
        let pair = f
            .auth
            .create_token_with_password(&acme(), alice.uuid, "hunter2", vec![])
            .await
            .unwrap();

        f.identities.set_active(&acme(), alice.uuid, false).await.unwrap();
        let err = f
            .auth
            .check_access_with_token(&pair.access.bearer, &[read_order()])
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::Unauthenticated(_)));
    }

    fn scope_strategy() -> impl Strategy<Value = Scope> {
        (
            prop::sample::select(vec!["order.1", "order.*", "invoice.9", "*"]),
            prop::sample::select(vec!["read", "write", "*"]),
        )
            .prop_map(|(resource, action)| Scope::new(acme(), [resource], [action]))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn inactive_identity_is_never_granted(scopes in prop::collection::vec(scope_strategy(), 1..4)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let f = fixture();
                let root = f
                    .policies
                    .create(
                        Policy::new(acme(), "everything", Utc::now())
                            .with_resources(["*"])
                            .with_actions(["*"]),
                    )
                    .await
                    .unwrap();
                let mut identity = Identity::new(acme(), "mallory", Utc::now());
                identity.policies = vec![root.reference()];
                let identity = f.identities.create(identity).await.unwrap();
                f.identities.set_password(&acme(), identity.uuid, "pw").await.unwrap();
                f.identities.set_active(&acme(), identity.uuid, false).await.unwrap();

                let check = f
                    .auth
                    .check_access_with_password(&acme(), identity.uuid, "pw", &scopes)
                    .await;
                assert!(!matches!(check, Ok(AccessDecision { granted: true, .. })));

                let login = f
                    .auth
                    .create_token_with_password(&acme(), identity.uuid, "pw", scopes.clone())
                    .await;
                assert!(login.is_err());
            });
        }
    }
}
