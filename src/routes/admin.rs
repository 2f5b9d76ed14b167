use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// User administration and article moderation. Authentication is enforced by the
/// layer in `create_router`; the admin role is decided by the authorization policy
/// inside each operation, so non-admin listings come back empty and non-admin
/// single-record actions are refused with `403`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Users ---
        .route("/user/list", get(handlers::list_users))
        .route("/user/search", get(handlers::search_users))
        .route("/user/detailById", get(handlers::user_detail))
        .route("/user/deleteById", post(handlers::delete_user))
        // --- Moderation ---
        // GET /article/admin/list
        // Every article, drafts and soft-deleted ones included.
        .route("/article/admin/list", get(handlers::review_queue))
        // POST /article/admin/accessPublish?id=
        // The draft -> published gate; idempotent.
        .route("/article/admin/accessPublish", post(handlers::approve_article))
}
