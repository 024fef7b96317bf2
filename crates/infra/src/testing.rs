//! Shared fixtures for unit tests.

use std::sync::{Arc, OnceLock};

use rsa::RsaPrivateKey;

use crate::kms::InMemoryKeyCustody;

/// One 2048-bit key per test binary; generation dominates test time otherwise.
pub(crate) fn test_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("test key generation")
    })
    .clone()
}

/// Custody holding the shared test key under `names`.
pub(crate) fn custody_with(names: &[&str]) -> Arc<InMemoryKeyCustody> {
    let custody = names
        .iter()
        .fold(InMemoryKeyCustody::new(), |c, name| c.with_key(*name, test_key()));
    Arc::new(custody)
}
