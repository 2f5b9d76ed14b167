use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::RepoError,
    models::{
        Article, ArticleChanges, ArticleSearch, ArticleStatus, Category, NewArticle, NewUser,
        Page, PageRequest, UpdateProfileRequest, User,
    },
    policy::ArticleScope,
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Sort order of article listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArticleOrder {
    /// Most recently updated first.
    #[default]
    RecentlyUpdated,
    /// Highest view count first ("hot" listings).
    MostViewed,
}

/// ArticleQuery
///
/// A catalog query: the visibility scope decided by the policy, optional search
/// filters and the sort order. Implementations must apply the scope to every row.
#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub scope: ArticleScope,
    pub search: ArticleSearch,
    pub order: ArticleOrder,
}

impl ArticleQuery {
    pub fn new(scope: ArticleScope) -> Self {
        Self {
            scope,
            search: ArticleSearch::default(),
            order: ArticleOrder::RecentlyUpdated,
        }
    }

    pub fn with_search(mut self, search: ArticleSearch) -> Self {
        self.search = search;
        self
    }

    pub fn ordered_by(mut self, order: ArticleOrder) -> Self {
        self.order = order;
        self
    }
}

/// Repository Trait
///
/// The persistence collaborator. Handlers and services only ever see this contract;
/// the concrete store is chosen at startup.
///
/// Methods taking an `owner_guard` touch any row when it is `None`. When it is `Some`,
/// they only touch a live row owned by that user, so an ownership or deletion check
/// made earlier cannot be raced.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    /// Creates the account and its role assignment atomically. A taken username yields
    /// `RepoError::Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn update_profile(
        &self,
        id: Uuid,
        changes: UpdateProfileRequest,
    ) -> Result<Option<User>, RepoError>;
    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<bool, RepoError>;
    /// Marks the account online (stamping the login time) or offline.
    async fn set_presence(&self, id: Uuid, online: bool) -> Result<(), RepoError>;
    /// Non-deleted accounts, newest first, optionally filtered by a username substring.
    async fn list_users(
        &self,
        keyword: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<User>, RepoError>;
    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, RepoError>;
    async fn usernames(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, RepoError>;

    // --- Articles ---
    async fn find_article(&self, id: Uuid) -> Result<Option<Article>, RepoError>;
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>, RepoError>;
    async fn page_articles(
        &self,
        query: &ArticleQuery,
        page: PageRequest,
    ) -> Result<Page<Article>, RepoError>;
    /// Inserts a draft article owned by `article.owner_id`.
    async fn insert_article(&self, article: NewArticle) -> Result<Article, RepoError>;
    async fn update_article(
        &self,
        id: Uuid,
        owner_guard: Option<Uuid>,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, RepoError>;
    async fn soft_delete_article(
        &self,
        id: Uuid,
        owner_guard: Option<Uuid>,
    ) -> Result<bool, RepoError>;
    async fn set_article_status(
        &self,
        id: Uuid,
        status: ArticleStatus,
    ) -> Result<Option<Article>, RepoError>;
    /// Atomically adds one to the view counter and returns the new value.
    async fn increment_view_count(&self, id: Uuid) -> Result<Option<u64>, RepoError>;

    // --- Categories & Search ---
    /// Returns the category with this name, creating it first if absent. Concurrent
    /// calls with the same new name resolve to a single record.
    async fn upsert_category(&self, name: &str) -> Result<Category, RepoError>;
    async fn category_names(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, RepoError>;
    async fn recent_categories(&self, limit: u32) -> Result<Vec<Category>, RepoError>;
    /// Bumps the per-keyword search counter, creating it on first use.
    async fn record_search(&self, keyword: &str) -> Result<(), RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Escapes `LIKE` metacharacters and wraps the term for a substring match.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
