//! Signed bearer tokens.
//!
//! A bearer is `base64url(payload) "." base64url(signature)` where the payload
//! is the JSON-encoded [`Token`] and the signature is RSA-SHA256 produced by
//! the key-custody service. Nothing here ever holds the private key.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use warden_auth::{Identity, Scope, Token, TokenValidationError, policies_allow, validate_claims};
use warden_core::{IamError, IamResult, TokenId};

use crate::cache::ExpiringCell;
use crate::config::WardenConfig;
use crate::kms::{KeyCustodyClient, KeyCustodyError};
use crate::resolver::PolicyResolver;
use crate::signer::{DelegatedSigner, verify_sha256};
use crate::store::IdentityDirectory;

/// Outcome of validating a bearer string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Ok,
    Expired,
    /// The signing key is currently unusable (custody sealed).
    Disabled,
    /// Malformed, bad signature, or an impossible time window.
    Invalid,
    /// The signing key does not exist.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidation {
    pub status: TokenStatus,
    /// The decoded token, when its signature verified.
    pub token: Option<Token>,
}

impl TokenValidation {
    fn rejected(status: TokenStatus) -> Self {
        Self { status, token: None }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TokenStatus::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub bearer: String,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub key_name: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// How long the verification key is trusted before it is re-fetched.
    pub public_key_cache: Duration,
    /// Zero disables the validation cache.
    pub validation_cache: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self::from_config(&WardenConfig::default())
    }
}

impl TokenSettings {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            key_name: config.token_key_name.clone(),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
            public_key_cache: config.public_key_cache(),
            validation_cache: config.validation_cache(),
        }
    }
}

pub struct TokenService {
    signer: DelegatedSigner,
    public_key: ExpiringCell<Vec<u8>>,
    /// Bearers whose signature already verified.
    verified: Option<Cache<String, Token>>,
    identities: Arc<dyn IdentityDirectory>,
    resolver: PolicyResolver,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

fn to_chrono(d: Duration) -> IamResult<chrono::Duration> {
    chrono::Duration::from_std(d).map_err(|e| IamError::internal(format!("token lifetime out of range: {e}")))
}

impl TokenService {
    pub fn new(
        custody: Arc<dyn KeyCustodyClient>,
        identities: Arc<dyn IdentityDirectory>,
        resolver: PolicyResolver,
        settings: TokenSettings,
    ) -> IamResult<Self> {
        let verified = (!settings.validation_cache.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(100_000)
                .time_to_live(settings.validation_cache)
                .build()
        });
        Ok(Self {
            signer: DelegatedSigner::new(custody, settings.key_name),
            public_key: ExpiringCell::new(settings.public_key_cache),
            verified,
            identities,
            resolver,
            access_ttl: to_chrono(settings.access_ttl)?,
            refresh_ttl: to_chrono(settings.refresh_ttl)?,
        })
    }

    /// Create the signing key in custody if it is missing.
    pub async fn ensure_key(&self) -> IamResult<()> {
        self.signer
            .custody()
            .ensure_key_pair(self.signer.key_name())
            .await?;
        Ok(())
    }

    /// Mint an access/refresh pair for `identity`.
    ///
    /// Empty `scopes` means "everything the identity currently has". Non-empty
    /// scopes must already have been checked against the identity's policies.
    #[instrument(skip(self, identity, scopes), fields(namespace = %identity.namespace, identity = %identity.uuid), err)]
    pub async fn issue(&self, identity: &Identity, scopes: Vec<Scope>) -> IamResult<TokenPair> {
        if !identity.active {
            return Err(IamError::unauthenticated("identity is inactive"));
        }
        let scopes = if scopes.is_empty() {
            let policies = self.resolver.resolve_effective_policies(identity).await?;
            policies.iter().map(Scope::from).collect()
        } else {
            scopes
        };

        let now = Utc::now();
        let access = self
            .mint(Token {
                uuid: TokenId::new(),
                namespace: identity.namespace.clone(),
                identity: identity.uuid,
                scopes: scopes.clone(),
                refresh: false,
                issued_at: now,
                expires_at: now + self.access_ttl,
            })
            .await?;
        let refresh = self
            .mint(Token {
                uuid: TokenId::new(),
                namespace: identity.namespace.clone(),
                identity: identity.uuid,
                scopes,
                refresh: true,
                issued_at: now,
                expires_at: now + self.refresh_ttl,
            })
            .await?;

        info!(
            access = %access.token.uuid,
            refresh = %refresh.token.uuid,
            scopes = access.token.scopes.len(),
            "token pair issued"
        );
        Ok(TokenPair { access, refresh })
    }

    pub async fn validate(&self, bearer: &str) -> IamResult<TokenValidation> {
        self.validate_at(bearer, Utc::now()).await
    }

    /// Validate against an explicit clock. Only custody transport failures
    /// are errors; everything else is a status.
    pub async fn validate_at(&self, bearer: &str, now: DateTime<Utc>) -> IamResult<TokenValidation> {
        if let Some(cache) = &self.verified {
            if let Some(token) = cache.get(bearer).await {
                return Ok(check_window(token, now));
            }
        }

        let Some((payload, signature)) = decode_bearer(bearer) else {
            debug!("bearer is malformed");
            return Ok(TokenValidation::rejected(TokenStatus::Invalid));
        };

        let spki = match self.verification_key().await {
            Ok(spki) => spki,
            Err(KeyCustodyError::Sealed) => {
                warn!(key_name = %self.signer.key_name(), "token validation refused: key custody sealed");
                return Ok(TokenValidation::rejected(TokenStatus::Disabled));
            }
            Err(KeyCustodyError::NotFound(_)) => {
                return Ok(TokenValidation::rejected(TokenStatus::NotFound));
            }
            Err(e @ KeyCustodyError::Transport(_)) => return Err(e.into()),
        };

        if !verify_sha256(&spki, &payload, &signature)? {
            debug!("bearer signature mismatch");
            return Ok(TokenValidation::rejected(TokenStatus::Invalid));
        }
        let Ok(token) = serde_json::from_slice::<Token>(&payload) else {
            return Ok(TokenValidation::rejected(TokenStatus::Invalid));
        };

        if let Some(cache) = &self.verified {
            cache.insert(bearer.to_string(), token.clone()).await;
        }
        Ok(check_window(token, now))
    }

    /// Exchange a refresh token for a new access token with the same scopes.
    ///
    /// The identity is re-read from the store (never the cache) and its
    /// current policies must still cover the token's scopes.
    #[instrument(skip(self, bearer), err)]
    pub async fn refresh(&self, bearer: &str) -> IamResult<IssuedToken> {
        let validation = self.validate(bearer).await?;
        let token = match (validation.status, validation.token) {
            (TokenStatus::Ok, Some(token)) => token,
            (TokenStatus::Disabled, _) => {
                return Err(IamError::failed_precondition("token signing key is unavailable"));
            }
            (status, _) => {
                debug!(?status, "refresh rejected");
                return Err(IamError::invalid_argument("refresh token is invalid or expired"));
            }
        };
        if !token.refresh {
            return Err(IamError::invalid_argument("not a refresh token"));
        }

        let identity = match self.identities.get(&token.namespace, token.identity, false).await {
            Ok(identity) => identity,
            Err(IamError::NotFound) => return Err(IamError::unauthenticated("identity no longer exists")),
            Err(e) => return Err(e),
        };
        if !identity.active {
            warn!(namespace = %identity.namespace, identity = %identity.uuid, "refresh for inactive identity");
            return Err(IamError::unauthenticated("identity is inactive"));
        }

        let policies = self.resolver.resolve_effective_policies(&identity).await?;
        if !policies_allow(&policies, &token.scopes) {
            warn!(namespace = %identity.namespace, identity = %identity.uuid, "refresh scopes no longer granted");
            return Err(IamError::permission_denied("token scopes are no longer granted"));
        }

        let now = Utc::now();
        let access = self
            .mint(Token {
                uuid: TokenId::new(),
                namespace: token.namespace,
                identity: token.identity,
                scopes: token.scopes,
                refresh: false,
                issued_at: now,
                expires_at: now + self.access_ttl,
            })
            .await?;
        info!(access = %access.token.uuid, "access token refreshed");
        Ok(access)
    }

    async fn verification_key(&self) -> Result<Vec<u8>, KeyCustodyError> {
        let custody = self.signer.custody();
        let key_name = self.signer.key_name();
        self.public_key
            .get_or_try_load(|| custody.get_public_key(key_name))
            .await
    }

    async fn mint(&self, token: Token) -> IamResult<IssuedToken> {
        let payload = serde_json::to_vec(&token)?;
        let signature = match self.signer.sign(&payload).await {
            Err(KeyCustodyError::NotFound(_)) => {
                self.ensure_key().await?;
                self.signer.sign(&payload).await?
            }
            other => other?,
        };
        let bearer = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(&signature)
        );
        Ok(IssuedToken { bearer, token })
    }
}

fn decode_bearer(bearer: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let (payload, signature) = bearer.split_once('.')?;
    let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    Some((payload, signature))
}

fn check_window(token: Token, now: DateTime<Utc>) -> TokenValidation {
    let status = match validate_claims(&token, now) {
        Ok(()) => TokenStatus::Ok,
        Err(TokenValidationError::Expired) => TokenStatus::Expired,
        Err(TokenValidationError::NotYetValid | TokenValidationError::InvalidTimeWindow) => {
            return TokenValidation::rejected(TokenStatus::Invalid);
        }
    };
    TokenValidation {
        status,
        token: Some(token),
    }
}
