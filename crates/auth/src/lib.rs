//! `warden-auth`: IAM record model and the pure scope resolution engine.
//!
//! This crate is intentionally decoupled from HTTP, storage and key custody.

pub mod certificate;
pub mod identity;
pub mod policy;
pub mod role;
pub mod scope;
pub mod token;

pub use certificate::{Certificate, SERIAL_LEN, certificate_id_from_serial};
pub use identity::{Identity, IdentityRef};
pub use policy::{Policy, PolicyRef, validate_entry, validate_name};
pub use role::{Role, RoleRef};
pub use scope::{
    AccessExplanation, DenialKind, DenialReason, Grant, Scope, ScopeDecision, covers, covers_all,
    explain_scopes, grant_satisfies, policies_allow,
};
pub use token::{Token, TokenValidationError, validate_claims};
