use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};

use crate::app::dto::{
    self, AccessBody, AccessTokenBody, PasswordAccessRequest, PasswordTokenRequest,
    RefreshTokenRequest, TokenAccessRequest, TokenPairBody,
};
use crate::app::errors::{ApiResult, reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/create_token_with_password", post(create_token_with_password))
        .route("/refresh_token", post(refresh_token))
        .route("/check_access_with_token", post(check_access_with_token))
        .route("/check_access_with_password", post(check_access_with_password))
}

pub async fn create_token_with_password(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<PasswordTokenRequest>, JsonRejection>,
) -> ApiResult<TokenPairBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let pair = services
        .authorization
        .create_token_with_password(&namespace, req.identity, &req.password, req.scopes)
        .await?;
    reply(pair.into())
}

pub async fn refresh_token(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> ApiResult<AccessTokenBody> {
    let Json(req) = payload?;
    let issued = services.authorization.refresh_token(&req.refresh_token).await?;
    reply(issued.into())
}

pub async fn check_access_with_token(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<TokenAccessRequest>, JsonRejection>,
) -> ApiResult<AccessBody> {
    let Json(req) = payload?;
    let decision = services
        .authorization
        .check_access_with_token(&req.token, &req.scopes)
        .await?;
    reply(decision.into())
}

pub async fn check_access_with_password(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<PasswordAccessRequest>, JsonRejection>,
) -> ApiResult<AccessBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let decision = services
        .authorization
        .check_access_with_password(&namespace, req.identity, &req.password, &req.scopes)
        .await?;
    reply(decision.into())
}
