use axum::Router;

pub mod auth;
pub mod certificates;
pub mod identities;
pub mod namespaces;
pub mod policies;
pub mod roles;
pub mod system;
pub mod tokens;

/// Router for the `/v1` RPC surface.
pub fn router() -> Router {
    Router::new()
        .nest("/policy", policies::router())
        .nest("/role", roles::router())
        .nest("/identity", identities::router())
        .nest("/namespace", namespaces::router())
        .nest("/auth", auth::router())
        .nest("/token", tokens::router())
        .nest("/certificate", certificates::router())
}
