use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};
use chrono::Utc;

use warden_auth::Identity;

use crate::app::dto::{
    self, CreateIdentityRequest, Empty, ExistBody, IdentitiesBody, IdentityBody,
    IdentityKeyRequest, IdentityPolicyRequest, IdentityRoleRequest, NamespaceRequest,
    SetActiveRequest, SetPasswordRequest, UpdateIdentityRequest,
};
use crate::app::errors::{ApiResult, reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/create", post(create))
        .route("/get", post(get))
        .route("/update", post(update))
        .route("/delete", post(delete))
        .route("/exist", post(exist))
        .route("/list", post(list))
        .route("/set_active", post(set_active))
        .route("/set_password", post(set_password))
        .route("/add_policy", post(add_policy))
        .route("/remove_policy", post(remove_policy))
        .route("/add_role", post(add_role))
        .route("/remove_role", post(remove_role))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CreateIdentityRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let mut identity = Identity::new(dto::namespace(&req.namespace)?, req.name, Utc::now());
    identity.managed_by = req.managed_by;
    identity.policies = req.policies;
    identity.roles = req.roles;
    let identity = services.identities.create(identity).await?;
    reply(IdentityBody { identity })
}

pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityKeyRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identity = services.identities.get(&namespace, req.uuid, req.use_cache).await?;
    reply(IdentityBody { identity })
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<UpdateIdentityRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let mut identity = Identity::new(dto::namespace(&req.namespace)?, req.name, Utc::now());
    identity.uuid = req.uuid;
    let identity = services.identities.update(identity).await?;
    reply(IdentityBody { identity })
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityKeyRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    services.identities.delete(&namespace, req.uuid).await?;
    reply(Empty {})
}

pub async fn exist(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityKeyRequest>, JsonRejection>,
) -> ApiResult<ExistBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let exists = services.identities.exist(&namespace, req.uuid).await?;
    reply(ExistBody { exists })
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NamespaceRequest>, JsonRejection>,
) -> ApiResult<IdentitiesBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identities = services.identities.list(&namespace).await?;
    reply(IdentitiesBody { identities })
}

pub async fn set_active(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<SetActiveRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identity = services
        .identities
        .set_active(&namespace, req.uuid, req.active)
        .await?;
    reply(IdentityBody { identity })
}

pub async fn set_password(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<SetPasswordRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    services
        .identities
        .set_password(&namespace, req.uuid, &req.password)
        .await?;
    reply(Empty {})
}

pub async fn add_policy(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityPolicyRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identity = services
        .identities
        .add_policy(&namespace, req.uuid, req.policy)
        .await?;
    reply(IdentityBody { identity })
}

pub async fn remove_policy(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityPolicyRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identity = services
        .identities
        .remove_policy(&namespace, req.uuid, req.policy)
        .await?;
    reply(IdentityBody { identity })
}

pub async fn add_role(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityRoleRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identity = services.identities.add_role(&namespace, req.uuid, req.role).await?;
    reply(IdentityBody { identity })
}

pub async fn remove_role(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<IdentityRoleRequest>, JsonRejection>,
) -> ApiResult<IdentityBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let identity = services
        .identities
        .remove_role(&namespace, req.uuid, req.role)
        .await?;
    reply(IdentityBody { identity })
}
