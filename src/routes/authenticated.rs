use crate::{AppState, handlers, storage::MAX_UPLOAD_BYTES};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every handler here takes the `Caller` extractor, which only succeeds behind the
/// required-identity layer.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session & own account ---
        .route("/auth/logout", post(handlers::logout))
        .route("/user/detail", get(handlers::get_profile))
        .route("/user/update", post(handlers::update_profile))
        .route("/user/updatePassWord", post(handlers::change_password))
        // --- Article management ---
        // GET /article/managerList (+ search and tag variants)
        // Authors see their own articles in any status; plain users get an empty page.
        .route("/article/managerList", get(handlers::my_articles))
        .route("/article/searchMyArticle", get(handlers::my_articles))
        .route("/article/myArticleByTags", get(handlers::my_articles))
        // POST /article/publish
        // Creates a draft; publishing is the admin gate's job.
        .route("/article/publish", post(handlers::publish_article))
        .route("/article/update", post(handlers::update_article))
        // POST /article/delete, /article/auth/delete
        // Soft delete with an ownership check for authors.
        .route("/article/delete", post(handlers::delete_article))
        .route("/article/auth/delete", post(handlers::delete_article))
        // POST /upload/file
        .route(
            "/upload/file",
            post(handlers::upload_file)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
}
