use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Roles & Identity ---

/// Role
///
/// The single role assigned to an account at registration. It is embedded into every
/// session token issued for that account and trusted for the token's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Author,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Author => "author",
            Role::User => "user",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Maps the registration hint onto a role. `"Auth"` (any case) asks for an author
    /// account; every other value, including none, yields a plain user. Admin accounts
    /// are never created through registration.
    pub fn from_registration_hint(hint: Option<&str>) -> Role {
        match hint.map(|h| h.trim().to_ascii_lowercase()) {
            Some(h) if h == "auth" || h == "author" => Role::Author,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(Role::Admin),
            "author" | "auth" => Ok(Role::Author),
            "user" => Ok(Role::User),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

/// Identity
///
/// The resolved caller of a request: who they are and which role their token carries.
/// Produced once at login and then only ever read back out of verified tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

// --- Stored records ---

/// User
///
/// An account record joined with its role assignment.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub intro: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub online: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Input for creating an account together with its role assignment.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
        }
    }
}

impl TryFrom<String> for ArticleStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "draft" => Ok(ArticleStatus::Draft),
            "published" => Ok(ArticleStatus::Published),
            _ => Err(UnknownVariant {
                kind: "article status",
                value,
            }),
        }
    }
}

/// Article
///
/// A catalog entry. `status` only ever moves draft -> published, `is_deleted` is a
/// soft-delete flag with no way back, and `view_count` never decreases.
#[derive(Debug, Clone, FromRow)]
pub struct Article {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub summary: Option<String>,
    pub content: String,
    pub thumbnail: Option<String>,
    pub is_top: bool,
    pub allow_comment: bool,
    #[sqlx(try_from = "String")]
    pub status: ArticleStatus,
    pub is_deleted: bool,
    #[sqlx(try_from = "i64")]
    pub view_count: u64,
    pub version: i32,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[sqlx(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a new article. New articles always start as drafts.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub owner_id: Uuid,
    pub category_id: Uuid,
    pub draft: ArticleDraft,
}

/// Column changes for an article update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub category_id: Option<Uuid>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub thumbnail: Option<String>,
    pub is_top: Option<bool>,
    pub allow_comment: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Pagination ---

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// PageRequest
///
/// 1-based page number and a page size clamped to `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Page
///
/// One page of a listing plus the total number of matching records.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn empty(request: PageRequest) -> Self {
        Self {
            records: vec![],
            total: 0,
            page: request.page,
            size: request.size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            records: self.records.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// RegisterRequest
///
/// The password is hashed before it reaches the store and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Query string of `POST /auth/register`. `role=Auth` (or the legacy `isAuth=Auth`)
/// registers an author.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct RegisterQuery {
    #[serde(alias = "isAuth")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[serde(alias = "oldPassWord")]
    pub old_password: String,
    #[serde(alias = "passWord")]
    pub new_password: String,
}

/// ArticleDraft
///
/// Payload for `POST /article/publish`. The category is referenced by name and created
/// on first use.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ArticleDraft {
    #[serde(alias = "categoryName")]
    pub category_name: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, alias = "isTop")]
    pub is_top: bool,
    #[serde(default = "default_true", alias = "isComment")]
    pub allow_comment: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "name")]
    pub place_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// UpdateArticleRequest
///
/// Partial update for `POST /article/update`; only provided fields change.
/// Status is not updatable here: publishing goes through the admin gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateArticleRequest {
    pub id: Uuid,
    #[serde(default, alias = "categoryName", skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, alias = "isTop", skip_serializing_if = "Option::is_none")]
    pub is_top: Option<bool>,
    #[serde(default, alias = "isComment", skip_serializing_if = "Option::is_none")]
    pub allow_comment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArticleIdRequest {
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct IdQuery {
    pub id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct UserSearchQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub keyword: Option<String>,
}

/// ArticleSearchQuery
///
/// Catalog search parameters. Category ids and tags may be repeated
/// (`?tag=a&tag=b`), comma-separated (`?tag=a,b`) or both.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ArticleSearchQuery {
    #[serde(default, alias = "keyWord")]
    pub keyword: Option<String>,
    #[serde(default, alias = "categoryId")]
    pub category_ids: Vec<String>,
    #[serde(default, alias = "tag")]
    pub tags: Vec<String>,
}

/// Parsed form of [`ArticleSearchQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleSearch {
    pub keyword: Option<String>,
    pub category_ids: Vec<Uuid>,
    pub tags: Vec<String>,
}

impl ArticleSearch {
    pub fn keyword(keyword: &str) -> Self {
        Self {
            keyword: Some(keyword.to_string()),
            ..Self::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl TryFrom<ArticleSearchQuery> for ArticleSearch {
    type Error = uuid::Error;

    fn try_from(query: ArticleSearchQuery) -> Result<Self, Self::Error> {
        let category_ids = split_list(&query.category_ids)
            .map(|id| Uuid::parse_str(&id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            keyword: query
                .keyword
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            category_ids,
            tags: split_list(&query.tags).collect(),
        })
    }
}

fn split_list(raw: &[String]) -> impl Iterator<Item = String> + '_ {
    raw.iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// --- Output Schemas ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
}

/// ArticleView
///
/// An article enriched with its author's username and category name. Either may be
/// `None` when the referenced record no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ArticleView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub author: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub content: String,
    pub thumbnail: Option<String>,
    pub is_top: bool,
    pub allow_comment: bool,
    pub status: ArticleStatus,
    pub is_deleted: bool,
    pub view_count: u64,
    pub tags: Vec<String>,
    pub place_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl ArticleView {
    pub fn new(article: Article, author: Option<String>, category_name: Option<String>) -> Self {
        Self {
            id: article.id,
            owner_id: article.owner_id,
            author,
            category_id: article.category_id,
            category_name,
            title: article.title,
            summary: article.summary,
            content: article.content,
            thumbnail: article.thumbnail,
            is_top: article.is_top,
            allow_comment: article.allow_comment,
            status: article.status,
            is_deleted: article.is_deleted,
            view_count: article.view_count,
            tags: article.tags,
            place_name: article.place_name,
            latitude: article.latitude,
            longitude: article.longitude,
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

/// UserView
///
/// The public projection of an account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub intro: Option<String>,
    pub role: Role,
    pub online: bool,
    #[ts(type = "string | null")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            nickname: user.nickname,
            email: user.email,
            avatar: user.avatar,
            intro: user.intro,
            role: user.role,
            online: user.online,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UploadResponse {
    /// Public URL of the stored object.
    pub url: String,
    /// Object key inside the bucket.
    pub key: String,
}
