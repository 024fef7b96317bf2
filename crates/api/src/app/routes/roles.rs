use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};
use chrono::Utc;

use warden_auth::Role;

use crate::app::dto::{
    self, CreateRoleRequest, Empty, ExistBody, NamespaceRequest, RoleBody, RoleKeyRequest,
    RolePolicyRequest, RoleRefsRequest, RolesBody, UpdateRoleRequest,
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
        .route("/add_policy", post(add_policy))
        .route("/remove_policy", post(remove_policy))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<CreateRoleRequest>, JsonRejection>,
) -> ApiResult<RoleBody> {
    let Json(req) = payload?;
    let mut role = Role::new(dto::namespace(&req.namespace)?, req.name, Utc::now())
        .with_policies(req.policies);
    role.description = req.description;
    role.managed_by = req.managed_by;
    role.tags = req.tags;
    let role = services.roles.create(role).await?;
    reply(RoleBody { role })
}

pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RoleKeyRequest>, JsonRejection>,
) -> ApiResult<RoleBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let role = services.roles.get(&namespace, req.uuid, req.use_cache).await?;
    reply(RoleBody { role })
}

pub async fn get_multiple(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RoleRefsRequest>, JsonRejection>,
) -> ApiResult<RolesBody> {
    let Json(req) = payload?;
    let roles = services.roles.get_multiple(&req.refs, req.use_cache).await?;
    reply(RolesBody { roles })
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> ApiResult<RoleBody> {
    let Json(req) = payload?;
    let mut role = Role::new(dto::namespace(&req.namespace)?, req.name, Utc::now());
    role.uuid = req.uuid;
    role.description = req.description;
    role.tags = req.tags;
    let role = services.roles.update(role).await?;
    reply(RoleBody { role })
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RoleKeyRequest>, JsonRejection>,
) -> ApiResult<Empty> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    services.roles.delete(&namespace, req.uuid).await?;
    reply(Empty {})
}

pub async fn exist(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RoleKeyRequest>, JsonRejection>,
) -> ApiResult<ExistBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let exists = services.roles.exist(&namespace, req.uuid).await?;
    reply(ExistBody { exists })
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NamespaceRequest>, JsonRejection>,
) -> ApiResult<RolesBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let roles = services.roles.list(&namespace).await?;
    reply(RolesBody { roles })
}

pub async fn add_policy(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RolePolicyRequest>, JsonRejection>,
) -> ApiResult<RoleBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let role = services.roles.add_policy(&namespace, req.uuid, req.policy).await?;
    reply(RoleBody { role })
}

pub async fn remove_policy(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RolePolicyRequest>, JsonRejection>,
) -> ApiResult<RoleBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let role = services.roles.remove_policy(&namespace, req.uuid, req.policy).await?;
    reply(RoleBody { role })
}
