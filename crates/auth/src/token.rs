use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{IdentityId, Namespace, TokenId};

use crate::Scope;

/// Signed bearer-token payload (transport-agnostic).
///
/// Encoding and signature verification live in the token service; this
/// type only carries what the token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub uuid: TokenId,

    /// Namespace of the identity the token was issued to.
    pub namespace: Namespace,

    pub identity: IdentityId,

    /// Permissions frozen at issue time.
    pub scopes: Vec<Scope>,

    /// Refresh tokens can only be exchanged for new access tokens.
    pub refresh: bool,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the token time window.
///
/// Signature verification is not done here.
pub fn validate_claims(token: &Token, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if token.expires_at <= token.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < token.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= token.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
