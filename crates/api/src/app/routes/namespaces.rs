use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, Router, routing::post};

use crate::app::dto::{self, NamespaceBody, NamespaceRequest};
use crate::app::errors::{ApiResult, reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/create", post(create))
}

/// Register a namespace; built-in policies and roles follow asynchronously.
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<NamespaceRequest>, JsonRejection>,
) -> ApiResult<NamespaceBody> {
    let Json(req) = payload?;
    let namespace = dto::namespace(&req.namespace)?;
    let created = services.create_namespace(&namespace)?;
    tracing::info!(namespace = %namespace, created, "namespace creation requested");
    reply(NamespaceBody {
        namespace: namespace.as_str().to_string(),
        created,
    })
}
