use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::app::dto::{
    self, CaBody, CertificateBody, CertificateKeyRequest, CertificateValidationBody,
    CertificatesBody, Empty, IssueCertificateRequest, IssuedCertificateBody, NamespaceRequest,
    ValidateCertificateRequest,
};
use crate::app::errors::{ApiResult, reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/issue", post(issue))
        .route("/get", post(get))
        .route("/list", post(list))
        .route("/regenerate", post(regenerate))
        .route("/disable", post(disable))
        .route("/delete", post(delete))
        .route("/validate_raw", post(validate_raw))
        .route("/ca", post(ca))
}

pub async fn issue(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IssueCertificateRequest>, JsonRejection>,
) -> ApiResult<IssuedCertificateBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let public_key = dto::decode_der("public_key_der", &req.public_key_der)?;
    let issued = services
        .ca
        .issue(&namespace, req.identity, public_key, req.description)
        .await?;
    reply(issued.into())
}

pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CertificateKeyRequest>, JsonRejection>,
) -> ApiResult<CertificateBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let certificate = services.ca.get(&namespace, req.uuid).await?;
    reply(CertificateBody {
        certificate: certificate.into(),
    })
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NamespaceRequest>, JsonRejection>,
) -> ApiResult<CertificatesBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let certificates = services.ca.list(&namespace).await?;
    reply(CertificatesBody {
        certificates: certificates.into_iter().map(Into::into).collect(),
    })
}

pub async fn regenerate(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CertificateKeyRequest>, JsonRejection>,
) -> ApiResult<IssuedCertificateBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let issued = services.ca.regenerate(&namespace, req.uuid).await?;
    reply(issued.into())
}

pub async fn disable(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CertificateKeyRequest>, JsonRejection>,
) -> ApiResult<CertificateBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let certificate = services.ca.disable(&namespace, req.uuid).await?;
    reply(CertificateBody {
        certificate: certificate.into(),
    })
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CertificateKeyRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    services.ca.delete(&namespace, req.uuid).await?;
    reply(Empty {})
}

pub async fn validate_raw(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<ValidateCertificateRequest>, JsonRejection>,
) -> ApiResult<CertificateValidationBody> {
    let Json(req) = payload?;
    let der = dto::decode_der("certificate_der", &req.certificate_der)?;
    let validation = services.ca.validate_raw(&der).await?;
    reply(validation.into())
}

pub async fn ca(Extension(services): Extension<Arc<AppServices>>) -> ApiResult<CaBody> {
    let (der, pem) = services.ca.ca_certificate().await?;
    reply(CaBody {
        der: STANDARD.encode(der),
        pem,
    })
}
