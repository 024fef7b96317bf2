//! `warden-core`: IAM foundation building blocks.
//!
//! This crate contains pure primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod managed_by;
pub mod record;

pub use error::{IamError, IamResult, Status};
pub use id::{CertificateId, IdentityId, Namespace, PolicyId, RoleId, TokenId};
pub use managed_by::{BuiltInKind, ManagedBy};
pub use record::{Record, RecordMeta};
