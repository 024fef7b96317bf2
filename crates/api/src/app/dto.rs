use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::{
    AccessExplanation, Certificate, Identity, Policy, PolicyRef, Role, RoleRef, Scope, Token,
};
use warden_core::{
    CertificateId, IamError, IamResult, IdentityId, ManagedBy, Namespace, PolicyId, RecordMeta,
    RoleId,
};
use warden_infra::{
    AccessDecision, CertificateStatus, CertificateValidation, IssuedCertificate, IssuedToken,
    TokenPair, TokenStatus, TokenValidation,
};

/// Namespaces arrive as untrusted strings; `""` is the global namespace.
pub fn namespace(raw: &str) -> IamResult<Namespace> {
    Namespace::parse(raw)
}

pub fn decode_der(field: &str, raw: &str) -> IamResult<Vec<u8>> {
    STANDARD
        .decode(raw.trim())
        .map_err(|e| IamError::invalid_argument(format!("{field} is not base64: {e}")))
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct NamespaceRequest {
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct PolicyKeyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: PolicyId,
    #[serde(default)]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct PolicyRefsRequest {
    pub refs: Vec<PolicyRef>,
    #[serde(default)]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default)]
    pub namespace_independent: bool,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePolicyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: PolicyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub namespace_independent: bool,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleKeyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: RoleId,
    #[serde(default)]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleRefsRequest {
    pub refs: Vec<RoleRef>,
    #[serde(default)]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default)]
    pub policies: Vec<PolicyRef>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RolePolicyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: RoleId,
    pub policy: PolicyRef,
}

#[derive(Debug, Deserialize)]
pub struct IdentityKeyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: IdentityId,
    #[serde(default)]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateIdentityRequest {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub managed_by: ManagedBy,
    #[serde(default)]
    pub policies: Vec<PolicyRef>,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIdentityRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: IdentityId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: IdentityId,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: IdentityId,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentityPolicyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: IdentityId,
    pub policy: PolicyRef,
}

#[derive(Debug, Deserialize)]
pub struct IdentityRoleRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: IdentityId,
    pub role: RoleRef,
}

#[derive(Debug, Deserialize)]
pub struct PasswordTokenRequest {
    #[serde(default)]
    pub namespace: String,
    pub identity: IdentityId,
    pub password: String,
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenAccessRequest {
    pub token: String,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordAccessRequest {
    #[serde(default)]
    pub namespace: String,
    pub identity: IdentityId,
    pub password: String,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueCertificateRequest {
    #[serde(default)]
    pub namespace: String,
    pub identity: IdentityId,
    /// Base64 DER SubjectPublicKeyInfo.
    pub public_key_der: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CertificateKeyRequest {
    #[serde(default)]
    pub namespace: String,
    pub uuid: CertificateId,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCertificateRequest {
    /// Base64 DER certificate.
    pub certificate_der: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
pub struct ExistBody {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct NamespaceBody {
    pub namespace: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct PolicyBody {
    pub policy: Policy,
}

#[derive(Debug, Serialize)]
pub struct PoliciesBody {
    pub policies: Vec<Policy>,
}

#[derive(Debug, Serialize)]
pub struct RoleBody {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct RolesBody {
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize)]
pub struct IdentityBody {
    pub identity: Identity,
}

#[derive(Debug, Serialize)]
pub struct IdentitiesBody {
    pub identities: Vec<Identity>,
}

#[derive(Debug, Serialize)]
pub struct TokenPairBody {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenPairBody {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access.bearer,
            access_expires_at: pair.access.token.expires_at,
            refresh_token: pair.refresh.bearer,
            refresh_expires_at: pair.refresh.token.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessTokenBody {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for AccessTokenBody {
    fn from(issued: IssuedToken) -> Self {
        Self {
            expires_at: issued.token.expires_at,
            access_token: issued.bearer,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessBody {
    pub granted: bool,
    pub explanation: AccessExplanation,
}

impl From<AccessDecision> for AccessBody {
    fn from(decision: AccessDecision) -> Self {
        Self {
            granted: decision.granted,
            explanation: decision.explanation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenValidationBody {
    pub token_status: TokenStatus,
    pub token: Option<Token>,
}

impl From<TokenValidation> for TokenValidationBody {
    fn from(v: TokenValidation) -> Self {
        Self {
            token_status: v.status,
            token: v.token,
        }
    }
}

/// Certificate record with its key as base64.
#[derive(Debug, Serialize)]
pub struct CertificateView {
    pub namespace: Namespace,
    pub uuid: CertificateId,
    pub identity: IdentityId,
    pub description: String,
    pub disabled: bool,
    pub public_key_der: String,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl From<Certificate> for CertificateView {
    fn from(c: Certificate) -> Self {
        Self {
            public_key_der: STANDARD.encode(&c.public_key_der),
            namespace: c.namespace,
            uuid: c.uuid,
            identity: c.identity,
            description: c.description,
            disabled: c.disabled,
            meta: c.meta,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateBody {
    pub certificate: CertificateView,
}

#[derive(Debug, Serialize)]
pub struct CertificatesBody {
    pub certificates: Vec<CertificateView>,
}

#[derive(Debug, Serialize)]
pub struct IssuedCertificateBody {
    pub certificate: CertificateView,
    pub der: String,
    pub pem: String,
}

impl From<IssuedCertificate> for IssuedCertificateBody {
    fn from(issued: IssuedCertificate) -> Self {
        Self {
            der: STANDARD.encode(&issued.der),
            pem: issued.pem,
            certificate: issued.record.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateValidationBody {
    pub certificate_status: CertificateStatus,
    pub certificate: Option<CertificateView>,
}

impl From<CertificateValidation> for CertificateValidationBody {
    fn from(v: CertificateValidation) -> Self {
        Self {
            certificate_status: v.status,
            certificate: v.certificate.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaBody {
    pub der: String,
    pub pem: String,
}
