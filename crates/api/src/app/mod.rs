//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, key-custody and background consumer wiring
//! - `routes/`: HTTP routes + handlers (one file per record kind)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: status-carrying replies

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/v1", routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
