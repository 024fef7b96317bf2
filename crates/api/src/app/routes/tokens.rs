use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};

use crate::app::dto::{TokenValidationBody, ValidateTokenRequest};
use crate::app::errors::{ApiResult, reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/validate", post(validate))
}

/// Verdicts (expired, invalid, ...) come back as `token_status` with
/// `status: ok`; only infrastructure failures set `status`.
pub async fn validate(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<ValidateTokenRequest>, JsonRejection>,
) -> ApiResult<TokenValidationBody> {
    let Json(req) = payload?;
    let validation = services.tokens.validate(&req.token).await?;
    reply(validation.into())
}
