use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{CertificateId, IdentityId, Namespace, Record, RecordMeta};

/// Length of an X.509 serial derived from a certificate uuid.
pub const SERIAL_LEN: usize = 16;

/// Stored client-certificate record.
///
/// Only the subject public key is kept. The signed X.509 document is handed
/// back to the caller at issue/regenerate time and can be re-created at any
/// point while the record is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub namespace: Namespace,
    pub uuid: CertificateId,
    pub identity: IdentityId,
    pub description: String,
    pub disabled: bool,
    /// DER-encoded SubjectPublicKeyInfo.
    pub public_key_der: Vec<u8>,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Certificate {
    pub fn new(
        namespace: Namespace,
        identity: IdentityId,
        public_key_der: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace,
            uuid: CertificateId::new(),
            identity,
            description: String::new(),
            disabled: false,
            public_key_der,
            meta: RecordMeta::new(now),
        }
    }

    /// X.509 serial: the 16 raw bytes of the uuid (its hex form, decoded).
    pub fn serial(&self) -> [u8; SERIAL_LEN] {
        *self.uuid.as_uuid().as_bytes()
    }
}

/// Recover the certificate uuid from a raw serial.
///
/// DER integers drop leading zero bytes (and may gain one for the sign bit),
/// so the value is normalised before being padded back to 16 bytes.
pub fn certificate_id_from_serial(raw: &[u8]) -> Option<CertificateId> {
    let trimmed: &[u8] = {
        let first = raw.iter().position(|b| *b != 0).unwrap_or(raw.len());
        &raw[first..]
    };
    if trimmed.len() > SERIAL_LEN {
        return None;
    }
    let mut bytes = [0u8; SERIAL_LEN];
    bytes[SERIAL_LEN - trimmed.len()..].copy_from_slice(trimmed);
    Some(CertificateId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

impl Record for Certificate {
    const KIND: &'static str = "certificate";

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn uuid(&self) -> uuid::Uuid {
        *self.uuid.as_uuid()
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}
