use crate::{
    AppState,
    error::{ApiResponse, ApiResult, AppError},
    extract::{ApiJson, ApiQuery},
    middleware::{Caller, MaybeCaller},
    models::{
        ArticleDraft, ArticleIdRequest, ArticleSearch, ArticleSearchQuery, ArticleView,
        Category, ChangePasswordRequest, IdQuery, LoginRequest, LoginResponse, Page, PageQuery,
        RegisterQuery, RegisterRequest, UpdateArticleRequest, UpdateProfileRequest,
        UploadResponse, UserSearchQuery, UserView,
    },
    storage::{check_upload_size, upload_key},
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

fn parse_search(query: ArticleSearchQuery) -> Result<ArticleSearch, AppError> {
    ArticleSearch::try_from(query)
        .map_err(|e| AppError::validation(format!("invalid category id: {e}")))
}

// --- Authentication ---

/// login
///
/// [Public Route] Exchanges a username and password for a session token carrying the
/// account's role.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<LoginResponse> {
    ok(state.accounts().login(payload).await?)
}

/// register
///
/// [Public Route] Creates an account. `role=Auth` registers an author; anything else
/// registers a plain user.
#[utoipa::path(
    post,
    path = "/auth/register",
    params(RegisterQuery),
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = UserView),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RegisterQuery>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<UserView> {
    ok(state
        .accounts()
        .register(payload, query.role.as_deref())
        .await?)
}

/// logout
///
/// [Authenticated Route] Marks the caller offline. The token itself stays valid until
/// it expires.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout(Caller(caller): Caller, State(state): State<AppState>) -> ApiResult<()> {
    state.accounts().logout(&caller).await?;
    ok(())
}

// --- Own account ---

#[utoipa::path(
    get,
    path = "/user/detail",
    responses((status = 200, description = "The caller's account", body = UserView))
)]
pub async fn get_profile(
    Caller(caller): Caller,
    State(state): State<AppState>,
) -> ApiResult<UserView> {
    ok(state.accounts().profile(&caller).await?)
}

#[utoipa::path(
    post,
    path = "/user/update",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Profile updated", body = UserView))
)]
pub async fn update_profile(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> ApiResult<UserView> {
    ok(state.accounts().update_profile(&caller, payload).await?)
}

/// change_password
///
/// [Authenticated Route] Requires the current password.
#[utoipa::path(
    post,
    path = "/user/updatePassWord",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Old password incorrect or new password empty")
    )
)]
pub async fn change_password(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<()> {
    state.accounts().change_password(&caller, payload).await?;
    ok(())
}

// --- User administration ---

/// list_users
///
/// [Admin Route] Paged account listing. Callers without the admin role receive an
/// empty page rather than an error.
#[utoipa::path(
    get,
    path = "/user/list",
    params(PageQuery),
    responses((status = 200, description = "Accounts", body = [UserView]))
)]
pub async fn list_users(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<UserView>> {
    ok(state
        .accounts()
        .list_users(&caller, query.page_request())
        .await?)
}

#[utoipa::path(
    get,
    path = "/user/search",
    params(UserSearchQuery),
    responses((status = 200, description = "Accounts matching the keyword", body = [UserView]))
)]
pub async fn search_users(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserSearchQuery>,
) -> ApiResult<Page<UserView>> {
    let page = PageQuery {
        page: query.page,
        size: query.size,
    }
    .page_request();
    ok(state
        .accounts()
        .search_users(&caller, query.keyword.as_deref(), page)
        .await?)
}

#[utoipa::path(
    get,
    path = "/user/detailById",
    params(IdQuery),
    responses(
        (status = 200, description = "Account", body = UserView),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn user_detail(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> ApiResult<UserView> {
    ok(state.accounts().user_detail(&caller, query.id).await?)
}

#[utoipa::path(
    post,
    path = "/user/deleteById",
    params(IdQuery),
    responses(
        (status = 200, description = "Account deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> ApiResult<()> {
    state.accounts().delete_user(&caller, query.id).await?;
    ok(())
}

// --- Catalog (identity optional) ---

/// list_articles
///
/// [Catalog Route] Articles visible to the caller, newest update first. Also serves
/// `/article/search` and `/article/listByTags`; every filter is optional.
#[utoipa::path(
    get,
    path = "/article/list",
    params(ArticleSearchQuery),
    responses((status = 200, description = "Visible articles", body = [ArticleView]))
)]
pub async fn list_articles(
    MaybeCaller(caller): MaybeCaller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ArticleSearchQuery>,
) -> ApiResult<Vec<ArticleView>> {
    let search = parse_search(query)?;
    ok(state.catalog().list_articles(caller.as_ref(), search).await?)
}

/// article_detail
///
/// [Catalog Route] One article, if visible to the caller. Each successful read counts
/// as a view.
#[utoipa::path(
    get,
    path = "/article/detail",
    params(IdQuery),
    responses(
        (status = 200, description = "Article", body = ArticleView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn article_detail(
    MaybeCaller(caller): MaybeCaller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> ApiResult<ArticleView> {
    ok(state
        .catalog()
        .article_detail(caller.as_ref(), query.id)
        .await?)
}

#[utoipa::path(
    get,
    path = "/article/hotList",
    params(PageQuery),
    responses((status = 200, description = "Most viewed visible articles", body = [ArticleView]))
)]
pub async fn hot_articles(
    MaybeCaller(caller): MaybeCaller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<ArticleView>> {
    ok(state
        .catalog()
        .hot_articles(caller.as_ref(), query.page_request())
        .await?)
}

#[utoipa::path(
    get,
    path = "/category/hotList",
    responses((status = 200, description = "Most recently created categories", body = [Category]))
)]
pub async fn hot_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    ok(state.catalog().hot_categories().await?)
}

// --- Article management ---

/// my_articles
///
/// [Authenticated Route] The management list: an author's own articles in any status,
/// every article for an admin, nothing for a plain user. Also serves
/// `/article/searchMyArticle` and `/article/myArticleByTags`.
#[utoipa::path(
    get,
    path = "/article/managerList",
    params(ArticleSearchQuery, PageQuery),
    responses((status = 200, description = "Manageable articles", body = [ArticleView]))
)]
pub async fn my_articles(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ArticleSearchQuery>,
    ApiQuery(paging): ApiQuery<PageQuery>,
) -> ApiResult<Page<ArticleView>> {
    let search = parse_search(query)?;
    ok(state
        .catalog()
        .my_articles(&caller, search, paging.page_request())
        .await?)
}

/// publish_article
///
/// [Authenticated Route] Saves a new draft owned by the caller. The category is
/// created on first use. Publishing it for readers is a separate admin step.
#[utoipa::path(
    post,
    path = "/article/publish",
    request_body = ArticleDraft,
    responses(
        (status = 200, description = "Draft created", body = ArticleView),
        (status = 403, description = "Role may not write articles")
    )
)]
pub async fn publish_article(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ArticleDraft>,
) -> ApiResult<ArticleView> {
    ok(state.catalog().create_article(&caller, payload).await?)
}

#[utoipa::path(
    post,
    path = "/article/update",
    request_body = UpdateArticleRequest,
    responses(
        (status = 200, description = "Article updated", body = ArticleView),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_article(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateArticleRequest>,
) -> ApiResult<ArticleView> {
    ok(state.catalog().update_article(&caller, payload).await?)
}

/// delete_article
///
/// [Authenticated Route] Soft delete. Authors may delete their own articles, admins any.
#[utoipa::path(
    post,
    path = "/article/delete",
    request_body = ArticleIdRequest,
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_article(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ArticleIdRequest>,
) -> ApiResult<()> {
    state.catalog().delete_article(&caller, payload.id).await?;
    ok(())
}

#[utoipa::path(
    get,
    path = "/article/admin/list",
    params(PageQuery),
    responses((status = 200, description = "Every article", body = [ArticleView]))
)]
pub async fn review_queue(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Page<ArticleView>> {
    ok(state
        .catalog()
        .review_queue(&caller, query.page_request())
        .await?)
}

/// approve_article
///
/// [Admin Route] Moves a draft to published. Approving a published article is a no-op.
#[utoipa::path(
    post,
    path = "/article/admin/accessPublish",
    params(IdQuery),
    responses(
        (status = 200, description = "Published", body = ArticleView),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn approve_article(
    Caller(caller): Caller,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> ApiResult<ArticleView> {
    ok(state.catalog().approve_article(&caller, query.id).await?)
}

// --- Uploads ---

/// upload_file
///
/// [Authenticated Route] Stores the multipart field `file` under
/// `uploads/<uuid>.<ext>` and returns its URL.
#[utoipa::path(
    post,
    path = "/upload/file",
    responses(
        (status = 200, description = "Stored", body = UploadResponse),
        (status = 400, description = "Missing, empty or oversized file")
    )
)]
pub async fn upload_file(
    Caller(caller): Caller,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadResponse> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!(error = %e, "Malformed multipart body");
        AppError::validation("invalid multipart body")
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let key = upload_key(field.file_name());
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("failed to read upload: {e}")))?;
        check_upload_size(bytes.len())?;

        let url = state
            .storage
            .put_object(&key, bytes.to_vec(), &content_type)
            .await?;

        tracing::info!(key = %key, by = %caller.username, "File uploaded");
        return ok(UploadResponse { url, key });
    }

    Err(AppError::validation("multipart field `file` is required"))
}
