//! Certificate authority backed by a custody-held key.
//!
//! The root certificate is self-signed once and published through the
//! [`SharedStore`] with set-if-absent, so concurrent instances converge on a
//! single root. Client certificates carry the record uuid as their serial,
//! the identity uuid as subject CN and the namespace as subject O.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber, SubjectPublicKeyInfo,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use warden_auth::{Certificate, certificate_id_from_serial};
use warden_core::{CertificateId, IamError, IamResult, IdentityId, Namespace};

use crate::cache::ExpiringCell;
use crate::config::WardenConfig;
use crate::kms::{KeyCustodyClient, KeyCustodyError};
use crate::shared_store::SharedStore;
use crate::signer::{DelegatedSigner, RemoteRsaKey};
use crate::store::{CertificateStore, IdentityDirectory};

/// Shared-store key of the published root certificate (DER).
pub const ROOT_STORE_KEY: &str = "warden:ca:root";

const ROOT_COMMON_NAME: &str = "Warden Root CA";
const ROOT_ORGANIZATION: &str = "warden";
const ROOT_VALIDITY_DAYS: i64 = 30 * 365;

/// Result of checking a raw client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Ok,
    InvalidFormat,
    SignatureInvalid,
    NotFound,
    Disabled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateValidation {
    pub status: CertificateStatus,
    pub certificate: Option<Certificate>,
}

impl CertificateValidation {
    fn rejected(status: CertificateStatus) -> Self {
        Self {
            status,
            certificate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub der: Vec<u8>,
    pub pem: String,
    pub record: Certificate,
}

#[derive(Debug, Clone)]
pub struct CaSettings {
    pub key_name: String,
    /// How long CA material is trusted before it is reloaded from custody.
    pub material_cache: Duration,
    pub leaf_validity_days: u64,
}

impl CaSettings {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            key_name: config.ca_key_name.clone(),
            material_cache: config.public_key_cache(),
            leaf_validity_days: config.cert_validity_days,
        }
    }
}

impl Default for CaSettings {
    fn default() -> Self {
        Self::from_config(&WardenConfig::default())
    }
}

/// Loaded CA state. The private key stays in custody; `issuer_key` only
/// forwards signing requests.
#[derive(Clone)]
struct CaMaterial {
    public_spki: Vec<u8>,
    root_der: Vec<u8>,
    issuer: Arc<rcgen::Certificate>,
    issuer_key: Arc<KeyPair>,
}

pub struct CertificateAuthority {
    signer: DelegatedSigner,
    shared: Arc<dyn SharedStore>,
    certificates: Arc<dyn CertificateStore>,
    identities: Arc<dyn IdentityDirectory>,
    material: ExpiringCell<CaMaterial>,
    leaf_validity: time::Duration,
}

impl CertificateAuthority {
    pub fn new(
        custody: Arc<dyn KeyCustodyClient>,
        shared: Arc<dyn SharedStore>,
        certificates: Arc<dyn CertificateStore>,
        identities: Arc<dyn IdentityDirectory>,
        settings: CaSettings,
    ) -> Self {
        let days = i64::try_from(settings.leaf_validity_days).unwrap_or(i64::MAX / 86_400);
        Self {
            signer: DelegatedSigner::new(custody, settings.key_name),
            shared,
            certificates,
            identities,
            material: ExpiringCell::new(settings.material_cache),
            leaf_validity: time::Duration::days(days),
        }
    }

    /// Load (or create and publish) the CA key and root certificate.
    pub async fn ensure_ready(&self) -> IamResult<()> {
        self.material().await.map(|_| ())
    }

    /// Root certificate as `(der, pem)`.
    pub async fn ca_certificate(&self) -> IamResult<(Vec<u8>, String)> {
        let material = self.material().await?;
        let pem = pem_encode(&material.root_der);
        Ok((material.root_der, pem))
    }

    /// Store a certificate record for `identity` and sign a client
    /// certificate for `public_key_der` (DER SubjectPublicKeyInfo).
    #[instrument(skip_all, fields(namespace = %namespace, identity = %identity), err)]
    pub async fn issue(
        &self,
        namespace: &Namespace,
        identity: IdentityId,
        public_key_der: Vec<u8>,
        description: impl Into<String>,
    ) -> IamResult<IssuedCertificate> {
        SubjectPublicKeyInfo::from_der(&public_key_der)
            .map_err(|e| IamError::invalid_argument(format!("public key is not a DER SubjectPublicKeyInfo: {e}")))?;
        if !self.identities.exist(namespace, identity).await? {
            return Err(IamError::failed_precondition(format!(
                "identity {identity} does not exist in namespace '{namespace}'"
            )));
        }
        let material = self.material().await?;

        let mut record = Certificate::new(namespace.clone(), identity, public_key_der, Utc::now());
        record.description = description.into();
        let record = self.certificates.create(record).await?;

        match self.sign_leaf(&material, &record).await {
            Ok(der) => {
                info!(certificate = %record.uuid, "client certificate issued");
                Ok(IssuedCertificate {
                    pem: pem_encode(&der),
                    der,
                    record,
                })
            }
            Err(e) => {
                if let Err(cleanup) = self.certificates.delete(namespace, record.uuid).await {
                    warn!(certificate = %record.uuid, error = %cleanup, "failed to remove unsigned certificate record");
                }
                Err(e)
            }
        }
    }

    /// Re-sign the stored key and serial with a fresh validity window.
    #[instrument(skip(self), err)]
    pub async fn regenerate(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<IssuedCertificate> {
        let record = self.certificates.get(namespace, uuid).await?;
        if record.disabled {
            return Err(IamError::permission_denied(format!("certificate {uuid} is disabled")));
        }
        let material = self.material().await?;
        let der = self.sign_leaf(&material, &record).await?;
        info!(certificate = %uuid, "client certificate regenerated");
        Ok(IssuedCertificate {
            pem: pem_encode(&der),
            der,
            record,
        })
    }

    pub async fn get(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<Certificate> {
        self.certificates.get(namespace, uuid).await
    }

    pub async fn list(&self, namespace: &Namespace) -> IamResult<Vec<Certificate>> {
        self.certificates.list(namespace).await
    }

    /// Disabled certificates fail validation and cannot be regenerated.
    pub async fn disable(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<Certificate> {
        self.certificates.set_disabled(namespace, uuid, true).await
    }

    pub async fn delete(&self, namespace: &Namespace, uuid: CertificateId) -> IamResult<()> {
        self.certificates.delete(namespace, uuid).await
    }

    pub async fn validate_raw(&self, der: &[u8]) -> IamResult<CertificateValidation> {
        self.validate_raw_at(der, Utc::now()).await
    }

    /// Check a raw certificate against the root and its stored record.
    ///
    /// Only infrastructure failures are errors; verdicts are statuses.
    pub async fn validate_raw_at(&self, der: &[u8], now: DateTime<Utc>) -> IamResult<CertificateValidation> {
        let Ok((_, leaf)) = x509_parser::parse_x509_certificate(der) else {
            return Ok(CertificateValidation::rejected(CertificateStatus::InvalidFormat));
        };

        let material = self.material().await?;
        let (_, root_key) = x509_parser::x509::SubjectPublicKeyInfo::from_der(&material.public_spki)
            .map_err(|e| IamError::internal(format!("CA public key unreadable: {e}")))?;
        if leaf.verify_signature(Some(&root_key)).is_err() {
            debug!("certificate not signed by the CA");
            return Ok(CertificateValidation::rejected(CertificateStatus::SignatureInvalid));
        }

        let ts = now.timestamp();
        if ts < leaf.validity().not_before.timestamp() || ts > leaf.validity().not_after.timestamp() {
            return Ok(CertificateValidation::rejected(CertificateStatus::Expired));
        }

        let Some((namespace, uuid, common_name)) = subject_claims(&leaf) else {
            return Ok(CertificateValidation::rejected(CertificateStatus::InvalidFormat));
        };

        let record = match self.certificates.get(&namespace, uuid).await {
            Ok(record) => record,
            Err(IamError::NotFound) => {
                return Ok(CertificateValidation::rejected(CertificateStatus::NotFound));
            }
            Err(e) => return Err(e),
        };

        if !same_public_key(&record.public_key_der, leaf.public_key().subject_public_key.data.as_ref())
            || common_name != record.identity.to_string()
        {
            warn!(namespace = %namespace, certificate = %uuid, "certificate does not match its stored record");
            return Ok(CertificateValidation::rejected(CertificateStatus::SignatureInvalid));
        }
        if record.disabled {
            return Ok(CertificateValidation::rejected(CertificateStatus::Disabled));
        }

        Ok(CertificateValidation {
            status: CertificateStatus::Ok,
            certificate: Some(record),
        })
    }

    async fn material(&self) -> IamResult<CaMaterial> {
        self.material.get_or_try_load(|| self.load_material()).await
    }

    #[instrument(skip(self), fields(key_name = %self.signer.key_name()), err)]
    async fn load_material(&self) -> IamResult<CaMaterial> {
        let custody = self.signer.custody();
        let key_name = self.signer.key_name();
        let public_spki = match custody.get_public_key(key_name).await {
            Err(KeyCustodyError::NotFound(_)) => {
                info!("CA key missing; asking custody to create it");
                custody.ensure_key_pair(key_name).await?;
                custody.get_public_key(key_name).await?
            }
            other => other?,
        };

        let root_der = match self.shared.get(ROOT_STORE_KEY).await? {
            Some(der) => der,
            None => {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                let not_after = now + ROOT_VALIDITY_DAYS * 86_400;
                let (root, _) = self.self_sign_root(&public_spki, now, not_after).await?;
                let der = root.der().to_vec();
                if self.shared.set_if_absent(ROOT_STORE_KEY, &der).await? {
                    info!("CA root certificate published");
                    der
                } else {
                    info!("another instance published the CA root first; using it");
                    self.shared
                        .get(ROOT_STORE_KEY)
                        .await?
                        .ok_or_else(|| IamError::internal("CA root vanished from the shared store"))?
                }
            }
        };

        let (not_before, not_after) = root_validity(&root_der, &public_spki)?;
        let (issuer, issuer_key) = self.self_sign_root(&public_spki, not_before, not_after).await?;
        Ok(CaMaterial {
            public_spki,
            root_der,
            issuer: Arc::new(issuer),
            issuer_key: Arc::new(issuer_key),
        })
    }

    async fn self_sign_root(
        &self,
        public_spki: &[u8],
        not_before: i64,
        not_after: i64,
    ) -> IamResult<(rcgen::Certificate, KeyPair)> {
        let params = root_params(public_spki, not_before, not_after)?;
        let remote = self.signer.remote_key_pair(Handle::current(), public_spki)?;
        blocking(move || {
            let key = remote_key(remote)?;
            let cert = params.self_signed(&key).map_err(signing_error)?;
            Ok((cert, key))
        })
        .await
    }

    async fn sign_leaf(&self, material: &CaMaterial, record: &Certificate) -> IamResult<Vec<u8>> {
        let params = self.leaf_params(record)?;
        let public_key = record.public_key_der.clone();
        let issuer = Arc::clone(&material.issuer);
        let issuer_key = Arc::clone(&material.issuer_key);
        blocking(move || {
            let subject = SubjectPublicKeyInfo::from_der(&public_key)
                .map_err(|e| IamError::invalid_argument(format!("stored public key unusable: {e}")))?;
            let cert = params
                .signed_by(&subject, &issuer, &issuer_key)
                .map_err(signing_error)?;
            Ok(cert.der().to_vec())
        })
        .await
    }

    fn leaf_params(&self, record: &Certificate) -> IamResult<CertificateParams> {
        let now = OffsetDateTime::now_utc();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, record.identity.to_string());
        dn.push(DnType::OrganizationName, record.namespace.as_str());
        params.distinguished_name = dn;
        params.serial_number = Some(SerialNumber::from_slice(&record.serial()));
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        params.use_authority_key_identifier_extension = true;
        params.not_before = at(now.unix_timestamp())?;
        params.not_after = now
            .checked_add(self.leaf_validity)
            .ok_or_else(|| IamError::internal("certificate validity overflows"))?;
        Ok(params)
    }
}

/// Deterministic root template: the same key and validity always produce
/// the same certificate.
fn root_params(public_spki: &[u8], not_before: i64, not_after: i64) -> IamResult<CertificateParams> {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, ROOT_COMMON_NAME);
    dn.push(DnType::OrganizationName, ROOT_ORGANIZATION);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyCertSign];

    // Positive 16-byte serial derived from the key.
    let digest = Sha256::digest(public_spki);
    let mut serial = digest[..16].to_vec();
    serial[0] &= 0x7f;
    params.serial_number = Some(SerialNumber::from_slice(&serial));

    params.not_before = at(not_before)?;
    params.not_after = at(not_after)?;
    Ok(params)
}

/// Validity of a stored root, after checking it belongs to `public_spki`.
fn root_validity(root_der: &[u8], public_spki: &[u8]) -> IamResult<(i64, i64)> {
    let (_, root) = x509_parser::parse_x509_certificate(root_der)
        .map_err(|e| IamError::internal(format!("stored CA root is unreadable: {e}")))?;
    if !same_public_key(public_spki, root.public_key().subject_public_key.data.as_ref()) {
        return Err(IamError::internal(
            "stored CA root was issued for a different key",
        ));
    }
    Ok((
        root.validity().not_before.timestamp(),
        root.validity().not_after.timestamp(),
    ))
}

/// `(namespace, certificate uuid, common name)` from the subject and serial.
fn subject_claims(leaf: &X509Certificate<'_>) -> Option<(Namespace, CertificateId, String)> {
    let organization = leaf.subject().iter_organization().next()?.as_str().ok()?;
    let common_name = leaf.subject().iter_common_name().next()?.as_str().ok()?;
    let uuid = certificate_id_from_serial(leaf.raw_serial())?;
    Some((Namespace::new(organization), uuid, common_name.to_string()))
}

fn same_public_key(stored_spki: &[u8], presented_bits: &[u8]) -> bool {
    match x509_parser::x509::SubjectPublicKeyInfo::from_der(stored_spki) {
        Ok((_, stored)) => stored.subject_public_key.data.as_ref() == presented_bits,
        Err(_) => false,
    }
}

fn at(unix: i64) -> IamResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| IamError::internal(format!("certificate time out of range: {e}")))
}

fn remote_key(remote: RemoteRsaKey) -> IamResult<KeyPair> {
    KeyPair::from_remote(Box::new(remote)).map_err(signing_error)
}

fn signing_error(e: rcgen::Error) -> IamError {
    match e {
        rcgen::Error::RemoteKeyError => {
            IamError::failed_precondition("key custody refused to sign for the CA")
        }
        other => IamError::internal(format!("certificate signing failed: {other}")),
    }
}

/// Run certificate signing off the async workers; the remote key blocks on
/// custody calls.
async fn blocking<T, F>(f: F) -> IamResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> IamResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IamError::internal(format!("signing task failed: {e}")))?
}

fn pem_encode(der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

#[cfg(test)]
mod tests {
    use rsa::RsaPublicKey;
    use rsa::pkcs8::EncodePublicKey;
    use warden_auth::Identity;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::kms::InMemoryKeyCustody;
    use crate::namespace::{InMemoryNamespaceDirectory, NamespaceDirectory};
    use crate::shared_store::InMemorySharedStore;
    use crate::store::{
        InMemoryCertificateStore, InMemoryIdentityDirectory, InMemoryPolicyStore, InMemoryRoleStore,
    };
    use crate::testing::{custody_with, test_key};

    struct Fixture {
        custody: Arc<InMemoryKeyCustody>,
        shared: Arc<InMemorySharedStore>,
        identities: Arc<InMemoryIdentityDirectory>,
        certificates: Arc<InMemoryCertificateStore>,
        ca: CertificateAuthority,
    }

    fn settings() -> CaSettings {
        CaSettings {
            key_name: "ca".into(),
            material_cache: Duration::from_secs(60),
            leaf_validity_days: 365,
        }
    }

    fn fixture() -> Fixture {
        let custody = custody_with(&["ca"]);
        let dir = InMemoryNamespaceDirectory::new();
        dir.register(Namespace::new("acme")).unwrap();
        let dir: Arc<dyn NamespaceDirectory> = Arc::new(dir);
        let cache = CacheConfig::default();
        let policies = Arc::new(InMemoryPolicyStore::new(&cache, Arc::clone(&dir)));
        let roles = Arc::new(InMemoryRoleStore::new(&cache, Arc::clone(&dir), policies.clone()));
        let identities = Arc::new(InMemoryIdentityDirectory::new(
            &cache,
            Arc::clone(&dir),
            policies,
            roles,
        ));
        let certificates = Arc::new(InMemoryCertificateStore::new(dir));
        let shared = Arc::new(InMemorySharedStore::new());
        let ca = CertificateAuthority::new(
            custody.clone(),
            shared.clone(),
            certificates.clone(),
            identities.clone(),
            settings(),
        );
        Fixture {
            custody,
            shared,
            identities,
            certificates,
            ca,
        }
    }

    fn client_spki() -> Vec<u8> {
        RsaPublicKey::from(&test_key())
            .to_public_key_der()
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    async fn alice(f: &Fixture) -> Identity {
        f.identities
            .create(Identity::new(Namespace::new("acme"), "alice", Utc::now()))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn issued_certificate_validates() {
        let f = fixture();
        let identity = alice(&f).await;
        let issued = f
            .ca
            .issue(&identity.namespace, identity.uuid, client_spki(), "laptop")
            .await
            .unwrap();
        assert!(issued.pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(issued.record.description, "laptop");

        let v = f.ca.validate_raw(&issued.der).await.unwrap();
        assert_eq!(v.status, CertificateStatus::Ok);
        assert_eq!(v.certificate.map(|c| c.uuid), Some(issued.record.uuid));

        let (_, leaf) = x509_parser::parse_x509_certificate(&issued.der).unwrap();
        assert_eq!(
            certificate_id_from_serial(leaf.raw_serial()),
            Some(issued.record.uuid)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tampered_certificate_never_validates() {
        let f = fixture();
        let identity = alice(&f).await;
        let issued = f
            .ca
            .issue(&identity.namespace, identity.uuid, client_spki(), "")
            .await
            .unwrap();

        for idx in [issued.der.len() / 2, issued.der.len() - 1] {
            let mut tampered = issued.der.clone();
            tampered[idx] ^= 0x01;
            let status = f.ca.validate_raw(&tampered).await.unwrap().status;
            assert!(
                matches!(
                    status,
                    CertificateStatus::SignatureInvalid | CertificateStatus::InvalidFormat
                ),
                "byte {idx}: {status:?}"
            );
        }
        assert_eq!(
            f.ca.validate_raw(b"not a certificate").await.unwrap().status,
            CertificateStatus::InvalidFormat
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabled_certificate_cannot_be_regenerated() {
        let f = fixture();
        let identity = alice(&f).await;
        let issued = f
            .ca
            .issue(&identity.namespace, identity.uuid, client_spki(), "")
            .await
            .unwrap();

        let again = f
            .ca
            .regenerate(&identity.namespace, issued.record.uuid)
            .await
            .unwrap();
        assert_eq!(f.ca.validate_raw(&again.der).await.unwrap().status, CertificateStatus::Ok);

        f.ca.disable(&identity.namespace, issued.record.uuid).await.unwrap();
        assert!(matches!(
            f.ca
                .regenerate(&identity.namespace, issued.record.uuid)
                .await
                .unwrap_err(),
            IamError::PermissionDenied(_)
        ));
        assert_eq!(
            f.ca.validate_raw(&issued.der).await.unwrap().status,
            CertificateStatus::Disabled
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deleted_record_is_not_found_and_expiry_is_checked() {
        let f = fixture();
        let identity = alice(&f).await;
        let issued = f
            .ca
            .issue(&identity.namespace, identity.uuid, client_spki(), "")
            .await
            .unwrap();

        let far_future = Utc::now() + chrono::Duration::days(400);
        assert_eq!(
            f.ca.validate_raw_at(&issued.der, far_future).await.unwrap().status,
            CertificateStatus::Expired
        );

        f.ca.delete(&identity.namespace, issued.record.uuid).await.unwrap();
        assert_eq!(
            f.ca.validate_raw(&issued.der).await.unwrap().status,
            CertificateStatus::NotFound
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn issue_checks_identity_and_key() {
        let f = fixture();
        assert!(matches!(
            f.ca
                .issue(&Namespace::new("acme"), IdentityId::new(), client_spki(), "")
                .await
                .unwrap_err(),
            IamError::FailedPrecondition(_)
        ));

        let identity = alice(&f).await;
        assert!(matches!(
            f.ca
                .issue(&identity.namespace, identity.uuid, vec![1, 2, 3], "")
                .await
                .unwrap_err(),
            IamError::InvalidArgument(_)
        ));
        assert!(f.certificates.list(&identity.namespace).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn instances_converge_on_one_root() {
        let f = fixture();
        f.ca.ensure_ready().await.unwrap();
        let (first_der, _) = f.ca.ca_certificate().await.unwrap();

        // A second instance sharing custody and store reuses the published root.
        let other = CertificateAuthority::new(
            f.custody.clone(),
            f.shared.clone(),
            f.certificates.clone(),
            f.identities.clone(),
            settings(),
        );
        let (second_der, pem) = other.ca_certificate().await.unwrap();
        assert_eq!(first_der, second_der);
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));
        assert_eq!(
            f.shared.get(ROOT_STORE_KEY).await.unwrap(),
            Some(first_der.clone())
        );

        // Certificates issued by one instance validate on the other.
        let identity = alice(&f).await;
        let issued = other
            .issue(&identity.namespace, identity.uuid, client_spki(), "")
            .await
            .unwrap();
        assert_eq!(f.ca.validate_raw(&issued.der).await.unwrap().status, CertificateStatus::Ok);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sealed_custody_blocks_loading() {
        let f = fixture();
        f.custody.seal();
        assert!(matches!(
            f.ca.ensure_ready().await.unwrap_err(),
            IamError::FailedPrecondition(_)
        ));
        f.custody.unseal();
        f.ca.ensure_ready().await.unwrap();
    }
}
