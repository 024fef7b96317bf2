use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};
use chrono::Utc;

use warden_auth::Policy;

use crate::app::dto::{
    self, CreatePolicyRequest, Empty, ExistBody, NamespaceRequest, PoliciesBody, PolicyBody,
    PolicyKeyRequest, PolicyRefsRequest, UpdatePolicyRequest,
};
use crate::app::errors::{ApiResult, reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/create", post(create))
        .route("/get", post(get))
        .route("/get_multiple", post(get_multiple))
        .route("/update", post(update))
        .route("/delete", post(delete))
        .route("/exist", post(exist))
        .route("/list", post(list))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CreatePolicyRequest>, JsonRejection>,
) -> ApiResult<PolicyBody> {
    let Json(req) = payload?;
    let mut policy = Policy::new(dto::namespace(&req.namespace)?, req.name, Utc::now());
    policy.description = req.description;
    policy.managed_by = req.managed_by;
    policy.namespace_independent = req.namespace_independent;
    policy.resources = req.resources;
    policy.actions = req.actions;
    policy.tags = req.tags;
    let policy = services.policies.create(policy).await?;
    reply(PolicyBody { policy })
}

pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<PolicyKeyRequest>, JsonRejection>,
) -> ApiResult<PolicyBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let policy = services.policies.get(&namespace, req.uuid, req.use_cache).await?;
    reply(PolicyBody { policy })
}

pub async fn get_multiple(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<PolicyRefsRequest>, JsonRejection>,
) -> ApiResult<PoliciesBody> {
    let Json(req) = payload?;
    let policies = services.policies.get_multiple(&req.refs, req.use_cache).await?;
    reply(PoliciesBody { policies })
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<UpdatePolicyRequest>, JsonRejection>,
) -> ApiResult<PolicyBody> {
    let Json(req) = payload?;
    let mut policy = Policy::new(dto::namespace(&req.namespace)?, req.name, Utc::now());
    policy.uuid = req.uuid;
    policy.description = req.description;
    policy.namespace_independent = req.namespace_independent;
    policy.resources = req.resources;
    policy.actions = req.actions;
    policy.tags = req.tags;
    let policy = services.policies.update(policy).await?;
    reply(PolicyBody { policy })
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<PolicyKeyRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    services.policies.delete(&namespace, req.uuid).await?;
    reply(Empty {})
}

pub async fn exist(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<PolicyKeyRequest>, JsonRejection>,
) -> ApiResult<ExistBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let exists = services.policies.exist(&namespace, req.uuid).await?;
    reply(ExistBody { exists })
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NamespaceRequest>, JsonRejection>,
) -> ApiResult<PoliciesBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let policies = services.policies.list(&namespace).await?;
    reply(PoliciesBody { policies })
}
