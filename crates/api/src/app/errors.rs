use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use warden_core::{IamError, Status};

/// Every handler answers with an explicit logical `status` next to its
/// fields. Transport-level success is separate: logical failures are
/// still HTTP 200.
pub type ApiResult<T> = Result<Reply<T>, ApiError>;

/// Successful reply; `T` is flattened next to `"status": "ok"`.
#[derive(Debug)]
pub struct Reply<T>(pub T);

pub fn reply<T>(body: T) -> ApiResult<T> {
    Ok(Reply(body))
}

#[derive(Serialize)]
struct Body<T> {
    status: Status,
    #[serde(flatten)]
    body: T,
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(Body {
                status: Status::Ok,
                body: self.0,
            }),
        )
            .into_response()
    }
}

#[derive(Debug)]
pub struct ApiError {
    http: StatusCode,
    error: IamError,
}

impl From<IamError> for ApiError {
    fn from(error: IamError) -> Self {
        Self {
            http: StatusCode::OK,
            error,
        }
    }
}

/// Undecodable request bodies are the only transport-level failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            http: StatusCode::BAD_REQUEST,
            error: IamError::invalid_argument(rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status == Status::Internal {
            tracing::error!(error = %self.error, "request failed");
        }
        json_error(self.http, status, self.error.to_string())
    }
}

pub fn json_error(http: StatusCode, status: Status, message: impl Into<String>) -> Response {
    (
        http,
        Json(serde_json::json!({
            "status": status,
            "message": message.into(),
        })),
    )
        .into_response()
}
