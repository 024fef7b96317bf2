//! Key-custody client.
//!
//! Private keys never leave the custody service. Callers get the public key
//! (DER SubjectPublicKeyInfo) and a raw-sign primitive over an opaque block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;
use tracing::{info, warn};

use warden_core::IamError;

/// Default RSA modulus size for generated keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyCustodyError {
    #[error("key '{0}' not found")]
    NotFound(String),

    /// The service is temporarily unable to use its keys.
    #[error("key custody service is sealed")]
    Sealed,

    #[error("key custody transport error: {0}")]
    Transport(String),
}

impl From<KeyCustodyError> for IamError {
    fn from(value: KeyCustodyError) -> Self {
        match value {
            KeyCustodyError::NotFound(_) | KeyCustodyError::Sealed => {
                IamError::failed_precondition(value.to_string())
            }
            KeyCustodyError::Transport(msg) => IamError::internal(msg),
        }
    }
}

/// Raw signing mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMechanism {
    /// RSA PKCS#1 v1.5 padding applied to the block as-is (the caller has
    /// already built the DigestInfo).
    RsaPkcs1v15Raw,
}

#[async_trait]
pub trait KeyCustodyClient: Send + Sync {
    /// DER SubjectPublicKeyInfo of `key_name`.
    async fn get_public_key(&self, key_name: &str) -> Result<Vec<u8>, KeyCustodyError>;

    /// Create the key pair if it does not exist yet.
    async fn ensure_key_pair(&self, key_name: &str) -> Result<(), KeyCustodyError>;

    async fn raw_sign(
        &self,
        key_name: &str,
        block: &[u8],
        mechanism: SignMechanism,
    ) -> Result<Vec<u8>, KeyCustodyError>;
}

/// In-process key custody for tests/dev.
///
/// Holds real RSA keys and can be sealed to simulate an unavailable service.
#[derive(Debug)]
pub struct InMemoryKeyCustody {
    keys: RwLock<HashMap<String, RsaPrivateKey>>,
    sealed: AtomicBool,
    bits: usize,
}

impl Default for InMemoryKeyCustody {
    fn default() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            sealed: AtomicBool::new(false),
            bits: DEFAULT_KEY_BITS,
        }
    }
}

impl InMemoryKeyCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load an existing key (tests reuse one generated key).
    pub fn with_key(self, key_name: impl Into<String>, key: RsaPrivateKey) -> Self {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(key_name.into(), key);
        }
        self
    }

    pub fn seal(&self) {
        warn!("key custody sealed");
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn unseal(&self) {
        info!("key custody unsealed");
        self.sealed.store(false, Ordering::SeqCst);
    }

    fn check_unsealed(&self) -> Result<(), KeyCustodyError> {
        if self.sealed.load(Ordering::SeqCst) {
            Err(KeyCustodyError::Sealed)
        } else {
            Ok(())
        }
    }

    fn key(&self, key_name: &str) -> Result<RsaPrivateKey, KeyCustodyError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| KeyCustodyError::Transport("key table lock poisoned".into()))?;
        keys.get(key_name)
            .cloned()
            .ok_or_else(|| KeyCustodyError::NotFound(key_name.to_string()))
    }
}

#[async_trait]
impl KeyCustodyClient for InMemoryKeyCustody {
    async fn get_public_key(&self, key_name: &str) -> Result<Vec<u8>, KeyCustodyError> {
        self.check_unsealed()?;
        let key = self.key(key_name)?;
        RsaPublicKey::from(&key)
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyCustodyError::Transport(format!("public key encoding failed: {e}")))
    }

    async fn ensure_key_pair(&self, key_name: &str) -> Result<(), KeyCustodyError> {
        self.check_unsealed()?;
        if self.key(key_name).is_ok() {
            return Ok(());
        }

        let bits = self.bits;
        let generated = tokio::task::spawn_blocking(move || {
            RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        })
        .await
        .map_err(|e| KeyCustodyError::Transport(format!("key generation task failed: {e}")))?
        .map_err(|e| KeyCustodyError::Transport(format!("key generation failed: {e}")))?;

        let mut keys = self
            .keys
            .write()
            .map_err(|_| KeyCustodyError::Transport("key table lock poisoned".into()))?;
        // Another caller may have generated it meanwhile; first writer wins.
        if !keys.contains_key(key_name) {
            info!(key_name = %key_name, bits, "key pair generated");
            keys.insert(key_name.to_string(), generated);
        }
        Ok(())
    }

    async fn raw_sign(
        &self,
        key_name: &str,
        block: &[u8],
        mechanism: SignMechanism,
    ) -> Result<Vec<u8>, KeyCustodyError> {
        self.check_unsealed()?;
        let key = self.key(key_name)?;
        match mechanism {
            SignMechanism::RsaPkcs1v15Raw => key
                .sign(Pkcs1v15Sign::new_unprefixed(), block)
                .map_err(|e| KeyCustodyError::Transport(format!("signing failed: {e}"))),
        }
    }
}
