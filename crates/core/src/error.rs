//! IAM error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the IAM crates.
pub type IamResult<T> = Result<T, IamError>;

/// Explicit outcome classification carried by every response.
///
/// This is separate from transport-level success: a well-formed request that
/// hits an unknown record is delivered fine and answered with `NotFound`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    PermissionDenied,
    Unauthenticated,
    Internal,
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::NotFound => "not_found",
            Status::AlreadyExists => "already_exists",
            Status::InvalidArgument => "invalid_argument",
            Status::FailedPrecondition => "failed_precondition",
            Status::PermissionDenied => "permission_denied",
            Status::Unauthenticated => "unauthenticated",
            Status::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// IAM-level error.
///
/// On reads an unknown namespace is reported as `NotFound`, exactly like an
/// unknown record, so callers cannot probe which namespaces exist. Writes into
/// one are a `FailedPrecondition`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IamError {
    /// Unknown uuid, or unknown namespace.
    #[error("not found")]
    NotFound,

    /// Duplicate unique key (e.g. service-managed dedup).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed uuid, namespace, or resource/action syntax.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced record/namespace does not exist yet, or the key-custody
    /// service is sealed.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is refused for this record (e.g. signing a disabled certificate).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Credentials were presented but are not acceptable (wrong password,
    /// inactive identity, revoked refresh).
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Storage, transport or serialization failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl IamError {
    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> Status {
        match self {
            IamError::NotFound => Status::NotFound,
            IamError::AlreadyExists(_) => Status::AlreadyExists,
            IamError::InvalidArgument(_) => Status::InvalidArgument,
            IamError::FailedPrecondition(_) => Status::FailedPrecondition,
            IamError::PermissionDenied(_) => Status::PermissionDenied,
            IamError::Unauthenticated(_) => Status::Unauthenticated,
            IamError::Internal(_) => Status::Internal,
        }
    }
}

impl From<serde_json::Error> for IamError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_non_ok_status() {
        let errors = [
            IamError::not_found(),
            IamError::already_exists("x"),
            IamError::invalid_argument("x"),
            IamError::failed_precondition("x"),
            IamError::permission_denied("x"),
            IamError::unauthenticated("x"),
            IamError::internal("x"),
        ];
        for e in errors {
            assert_ne!(e.status(), Status::Ok, "{e}");
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&Status::FailedPrecondition).unwrap();
        assert_eq!(json, "\"failed_precondition\"");
        assert_eq!(Status::FailedPrecondition.to_string(), "failed_precondition");
    }
}
