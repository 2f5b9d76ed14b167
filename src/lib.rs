use axum::{Router, extract::FromRef, http::HeaderName, middleware::from_fn_with_state};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authorization core.
pub mod context;
pub mod middleware;
pub mod policy;
pub mod token;
pub mod visibility;

// Application services and collaborators.
pub mod accounts;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod storage;

// Routing segregated by access tier.
pub mod routes;
use routes::{admin, authenticated, catalog, public};

// --- Public Re-exports ---

pub use accounts::AccountService;
pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use token::TokenService;
pub use visibility::ContentVisibilityEngine;

/// ApiDoc
///
/// OpenAPI document assembled from the `#[utoipa::path]` handlers and `ToSchema`
/// models, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::register, handlers::logout, handlers::get_profile,
        handlers::update_profile, handlers::change_password, handlers::list_users,
        handlers::search_users, handlers::user_detail, handlers::delete_user,
        handlers::list_articles, handlers::article_detail, handlers::hot_articles,
        handlers::hot_categories, handlers::my_articles, handlers::publish_article,
        handlers::update_article, handlers::delete_article, handlers::review_queue,
        handlers::approve_article, handlers::upload_file
    ),
    components(
        schemas(
            models::Role, models::ArticleStatus, models::Category, models::LoginRequest,
            models::RegisterRequest, models::UpdateProfileRequest, models::ChangePasswordRequest,
            models::ArticleDraft, models::UpdateArticleRequest, models::ArticleIdRequest,
            models::LoginResponse, models::ArticleView, models::UserView, models::UploadResponse,
        )
    ),
    tags(
        (name = "blog-portal", description = "Blog & travel catalog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The shared, immutable container of every collaborator. Cloned per request; all
/// fields are reference counted or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator (Postgres or in-memory).
    pub repo: RepositoryState,
    /// Object storage collaborator (S3/MinIO or mock).
    pub storage: StorageState,
    pub config: AppConfig,
    /// Signs and verifies session tokens with the configured secret.
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let tokens = TokenService::from_config(&config);
        Self {
            repo,
            storage,
            config,
            tokens,
        }
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(self.repo.clone(), self.tokens.clone())
    }

    pub fn catalog(&self) -> ContentVisibilityEngine {
        ContentVisibilityEngine::new(self.repo.clone())
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

/// create_router
///
/// Assembles the route groups, attaches the authentication layer matching each group's
/// tier and wraps everything in the request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let require_identity = || from_fn_with_state(state.clone(), middleware::require_identity);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(catalog::catalog_routes().route_layer(from_fn_with_state(
            state.clone(),
            middleware::optional_identity,
        )))
        .merge(authenticated::authenticated_routes().route_layer(require_identity()))
        .merge(admin::admin_routes().route_layer(require_identity()))
        .with_state(state.clone());

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its
/// `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
