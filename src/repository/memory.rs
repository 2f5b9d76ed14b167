use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{ArticleOrder, ArticleQuery, Repository};
use crate::{
    error::RepoError,
    models::{
        Article, ArticleChanges, ArticleStatus, Category, NewArticle, NewUser, Page,
        PageRequest, UpdateProfileRequest, User,
    },
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    articles: HashMap<Uuid, Article>,
    categories: HashMap<Uuid, Category>,
    searches: BTreeMap<String, u64>,
    last_stamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// A strictly increasing timestamp so "most recent first" orderings are stable even
    /// when several writes land within the same clock tick.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(next);
        next
    }
}

/// MemoryRepository
///
/// An in-process `Repository` used for local development without a database and by the
/// test suite. A single mutex serializes every operation, which gives the same atomicity
/// the SQL statements of `PostgresRepository` provide.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How many times `keyword` has been searched for.
    pub fn search_count(&self, keyword: &str) -> u64 {
        self.state().searches.get(keyword).copied().unwrap_or(0)
    }
}

fn matches_search(article: &Article, query: &ArticleQuery) -> bool {
    let search = &query.search;
    if let Some(keyword) = &search.keyword {
        if !article
            .title
            .to_lowercase()
            .contains(&keyword.to_lowercase())
        {
            return false;
        }
    }
    if !search.category_ids.is_empty()
        && !article
            .category_id
            .is_some_and(|c| search.category_ids.contains(&c))
    {
        return false;
    }
    if !search.tags.is_empty() && !article.tags.iter().any(|t| search.tags.contains(t)) {
        return false;
    }
    true
}

fn select_articles(state: &MemoryState, query: &ArticleQuery) -> Vec<Article> {
    let mut rows: Vec<Article> = state
        .articles
        .values()
        .filter(|a| query.scope.admits(a) && matches_search(a, query))
        .cloned()
        .collect();

    match query.order {
        ArticleOrder::RecentlyUpdated => rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        }),
        ArticleOrder::MostViewed => rows.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
    rows
}

/// Mirrors the SQL owner guard: non-admin writes need an owned, live row.
fn guard_allows(owner_guard: Option<Uuid>, article: &Article) -> bool {
    owner_guard.is_none_or(|owner| article.owner_id == owner && !article.is_deleted)
}

fn paginate<T>(rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let records = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page {
        records,
        total,
        page: page.page,
        size: page.size,
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.state().users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .state()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let mut state = self.state();
        if state.users.values().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict("username".to_string()));
        }

        let now = state.stamp();
        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            nickname: None,
            email: None,
            avatar: None,
            intro: None,
            role: user.role,
            online: false,
            last_login_at: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: UpdateProfileRequest,
    ) -> Result<Option<User>, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        let Some(user) = state.users.get_mut(&id).filter(|u| !u.is_deleted) else {
            return Ok(None);
        };

        if let Some(nickname) = changes.nickname {
            user.nickname = Some(nickname);
        }
        if let Some(email) = changes.email {
            user.email = Some(email);
        }
        if let Some(intro) = changes.intro {
            user.intro = Some(intro);
        }
        if let Some(avatar) = changes.avatar {
            user.avatar = Some(avatar);
        }
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<bool, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        match state.users.get_mut(&id).filter(|u| !u.is_deleted) {
            Some(user) => {
                user.password_hash = password_hash;
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_presence(&self, id: Uuid, online: bool) -> Result<(), RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        if let Some(user) = state.users.get_mut(&id) {
            user.online = online;
            if online {
                user.last_login_at = Some(now);
            }
        }
        Ok(())
    }

    async fn list_users(
        &self,
        keyword: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<User>, RepoError> {
        let needle = keyword.map(str::to_lowercase);
        let mut rows: Vec<User> = self
            .state()
            .users
            .values()
            .filter(|u| !u.is_deleted)
            .filter(|u| {
                needle
                    .as_deref()
                    .is_none_or(|n| u.username.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(paginate(rows, page))
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        match state.users.get_mut(&id) {
            Some(user) => {
                user.is_deleted = true;
                user.online = false;
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn usernames(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, RepoError> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|u| (*id, u.username.clone())))
            .collect())
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>, RepoError> {
        Ok(self.state().articles.get(&id).cloned())
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>, RepoError> {
        Ok(select_articles(&self.state(), query))
    }

    async fn page_articles(
        &self,
        query: &ArticleQuery,
        page: PageRequest,
    ) -> Result<Page<Article>, RepoError> {
        let rows = select_articles(&self.state(), query);
        Ok(paginate(rows, page))
    }

    async fn insert_article(&self, article: NewArticle) -> Result<Article, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        let draft = article.draft;
        let record = Article {
            id: Uuid::new_v4(),
            owner_id: article.owner_id,
            category_id: Some(article.category_id),
            title: draft.title,
            summary: draft.summary,
            content: draft.content,
            thumbnail: draft.thumbnail,
            is_top: draft.is_top,
            allow_comment: draft.allow_comment,
            status: ArticleStatus::Draft,
            is_deleted: false,
            view_count: 0,
            version: 0,
            place_name: draft.place_name,
            latitude: draft.latitude,
            longitude: draft.longitude,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        };
        state.articles.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_article(
        &self,
        id: Uuid,
        owner_guard: Option<Uuid>,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        let Some(article) = state
            .articles
            .get_mut(&id)
            .filter(|a| guard_allows(owner_guard, a))
        else {
            return Ok(None);
        };

        if let Some(category_id) = changes.category_id {
            article.category_id = Some(category_id);
        }
        if let Some(title) = changes.title {
            article.title = title;
        }
        if let Some(summary) = changes.summary {
            article.summary = Some(summary);
        }
        if let Some(content) = changes.content {
            article.content = content;
        }
        if let Some(thumbnail) = changes.thumbnail {
            article.thumbnail = Some(thumbnail);
        }
        if let Some(is_top) = changes.is_top {
            article.is_top = is_top;
        }
        if let Some(allow_comment) = changes.allow_comment {
            article.allow_comment = allow_comment;
        }
        if let Some(tags) = changes.tags {
            article.tags = tags;
        }
        if let Some(place_name) = changes.place_name {
            article.place_name = Some(place_name);
        }
        if let Some(latitude) = changes.latitude {
            article.latitude = Some(latitude);
        }
        if let Some(longitude) = changes.longitude {
            article.longitude = Some(longitude);
        }
        article.version += 1;
        article.updated_at = now;
        Ok(Some(article.clone()))
    }

    async fn soft_delete_article(
        &self,
        id: Uuid,
        owner_guard: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        match state
            .articles
            .get_mut(&id)
            .filter(|a| guard_allows(owner_guard, a))
        {
            Some(article) => {
                article.is_deleted = true;
                article.version += 1;
                article.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_article_status(
        &self,
        id: Uuid,
        status: ArticleStatus,
    ) -> Result<Option<Article>, RepoError> {
        let mut state = self.state();
        let now = state.stamp();
        let Some(article) = state.articles.get_mut(&id) else {
            return Ok(None);
        };
        if article.status != status {
            article.status = status;
            article.version += 1;
            article.updated_at = now;
        }
        Ok(Some(article.clone()))
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<Option<u64>, RepoError> {
        let mut state = self.state();
        Ok(state.articles.get_mut(&id).map(|article| {
            article.view_count += 1;
            article.view_count
        }))
    }

    async fn upsert_category(&self, name: &str) -> Result<Category, RepoError> {
        let mut state = self.state();
        if let Some(existing) = state.categories.values().find(|c| c.name == name) {
            return Ok(existing.clone());
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: state.stamp(),
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn category_names(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, RepoError> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.categories.get(id).map(|c| (*id, c.name.clone())))
            .collect())
    }

    async fn recent_categories(&self, limit: u32) -> Result<Vec<Category>, RepoError> {
        let mut rows: Vec<Category> = self.state().categories.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn record_search(&self, keyword: &str) -> Result<(), RepoError> {
        *self
            .state()
            .searches
            .entry(keyword.to_string())
            .or_default() += 1;
        Ok(())
    }
}
