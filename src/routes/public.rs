use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        .route("/auth/login", post(handlers::login))
        // POST /auth/register?role=Auth
        // The role hint only ever yields an author or a plain user.
        .route("/auth/register", post(handlers::register))
}
