use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Catalog Router Module
///
/// Read-only catalog endpoints. Wrapped in the optional-identity layer: anonymous
/// callers are evaluated as the lowest-privilege role.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // GET /article/list, /article/search, /article/listByTags
        // One listing with optional keyword, category and tag filters.
        .route("/article/list", get(handlers::list_articles))
        .route("/article/search", get(handlers::list_articles))
        .route("/article/listByTags", get(handlers::list_articles))
        // GET /article/detail?id=
        // Counts a view on every successful read.
        .route("/article/detail", get(handlers::article_detail))
        // GET /article/hotList?page=&size=
        .route("/article/hotList", get(handlers::hot_articles))
        // GET /category/hotList
        .route("/category/hotList", get(handlers::hot_categories))
}
