//! Delegated RSA-SHA256 signing through the key-custody client.
//!
//! The signer hashes locally, wraps the digest in a DER DigestInfo and hands
//! only that block to the custody service's raw-sign primitive.

use std::sync::Arc;

use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;

use warden_core::{IamError, IamResult};

use crate::kms::{KeyCustodyClient, KeyCustodyError, SignMechanism};

/// DER prefix of a DigestInfo for SHA-256 (RFC 8017 §9.2 note 1).
pub const SHA256_DIGEST_INFO_PREFIX: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

/// `DigestInfo(SHA-256(message))`.
pub fn sha256_digest_info(message: &[u8]) -> Vec<u8> {
    let digest = Sha256::digest(message);
    let mut block = Vec::with_capacity(SHA256_DIGEST_INFO_PREFIX.len() + digest.len());
    block.extend_from_slice(&SHA256_DIGEST_INFO_PREFIX);
    block.extend_from_slice(&digest);
    block
}

/// Verify an RSA PKCS#1 v1.5 SHA-256 signature against a DER SPKI key.
///
/// `Ok(false)` for a bad signature; `Err` only when the key itself is unusable.
pub fn verify_sha256(spki_der: &[u8], message: &[u8], signature: &[u8]) -> IamResult<bool> {
    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| IamError::internal(format!("unusable public key: {e}")))?;
    Ok(key
        .verify(
            Pkcs1v15Sign::new_unprefixed(),
            &sha256_digest_info(message),
            signature,
        )
        .is_ok())
}

/// Signing capability bound to one custody key.
#[derive(Clone)]
pub struct DelegatedSigner {
    custody: Arc<dyn KeyCustodyClient>,
    key_name: String,
}

impl DelegatedSigner {
    pub fn new(custody: Arc<dyn KeyCustodyClient>, key_name: impl Into<String>) -> Self {
        Self {
            custody,
            key_name: key_name.into(),
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn custody(&self) -> &Arc<dyn KeyCustodyClient> {
        &self.custody
    }

    /// RSA-SHA256 signature over `message`.
    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyCustodyError> {
        let block = sha256_digest_info(message);
        self.custody
            .raw_sign(&self.key_name, &block, SignMechanism::RsaPkcs1v15Raw)
            .await
    }

    /// Adapter for certificate builders that sign synchronously.
    ///
    /// `spki_der` is the key's DER SubjectPublicKeyInfo as returned by the
    /// custody service. The returned value must only be used from a blocking
    /// context (e.g. inside `spawn_blocking`).
    pub fn remote_key_pair(&self, runtime: Handle, spki_der: &[u8]) -> IamResult<RemoteRsaKey> {
        let pkcs1 = RsaPublicKey::from_public_key_der(spki_der)
            .map_err(|e| IamError::internal(format!("unusable public key: {e}")))?
            .to_pkcs1_der()
            .map_err(|e| IamError::internal(format!("public key encoding failed: {e}")))?;
        Ok(RemoteRsaKey {
            signer: self.clone(),
            runtime,
            pkcs1_der: pkcs1.as_bytes().to_vec(),
        })
    }
}

/// `rcgen` remote key backed by a [`DelegatedSigner`].
pub struct RemoteRsaKey {
    signer: DelegatedSigner,
    runtime: Handle,
    pkcs1_der: Vec<u8>,
}

impl rcgen::RemoteKeyPair for RemoteRsaKey {
    fn public_key(&self) -> &[u8] {
        &self.pkcs1_der
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        self.runtime
            .block_on(self.signer.sign(msg))
            .map_err(|_| rcgen::Error::RemoteKeyError)
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        &rcgen::PKCS_RSA_SHA256
    }
}
