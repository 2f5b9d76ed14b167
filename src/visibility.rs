//! Catalog reads and writes under the authorization policy.
//!
//! Every listing asks [`AuthorizationPolicy`] for a scope and hands it to the
//! repository; a denied listing yields an empty result. Single-record operations
//! surface a denial as an error and pass an owner guard down to the store so the
//! ownership check is repeated where the write happens.

use std::collections::{BTreeSet, HashSet};

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        Article, ArticleChanges, ArticleDraft, ArticleSearch, ArticleStatus, ArticleView,
        Category, Identity, NewArticle, Page, PageRequest, Role, UpdateArticleRequest,
    },
    policy::{ArticleScope, AuthorizationPolicy, Operation},
    repository::{ArticleOrder, ArticleQuery, RepositoryState},
};

/// Number of entries in the category hot list.
pub const HOT_CATEGORY_LIMIT: u32 = 10;

/// ContentVisibilityEngine
///
/// Stateless apart from its repository handle; cheap to clone per request.
#[derive(Clone)]
pub struct ContentVisibilityEngine {
    repo: RepositoryState,
}

impl ContentVisibilityEngine {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    fn listing_scope(caller: Option<&Identity>, operation: Operation) -> Option<ArticleScope> {
        let scope = AuthorizationPolicy::decide(caller, operation).listing_scope();
        if scope.is_none() {
            tracing::debug!(?operation, "Listing denied, returning an empty result");
        }
        scope
    }

    // --- Listings ---

    /// list_articles
    ///
    /// Catalog listing with optional keyword, category and tag filters, newest update
    /// first. A keyword search bumps that keyword's search counter.
    pub async fn list_articles(
        &self,
        caller: Option<&Identity>,
        search: ArticleSearch,
    ) -> Result<Vec<ArticleView>, AppError> {
        let Some(scope) = Self::listing_scope(caller, Operation::ListArticles) else {
            return Ok(vec![]);
        };

        if let Some(keyword) = &search.keyword {
            if let Err(e) = self.repo.record_search(keyword).await {
                tracing::warn!(error = %e, keyword = %keyword, "Failed to record search keyword");
            }
        }

        let query = ArticleQuery::new(scope).with_search(search);
        let articles = self.repo.list_articles(&query).await?;
        self.views(articles).await
    }

    /// Visible articles ordered by view count, highest first.
    pub async fn hot_articles(
        &self,
        caller: Option<&Identity>,
        page: PageRequest,
    ) -> Result<Page<ArticleView>, AppError> {
        let Some(scope) = Self::listing_scope(caller, Operation::ListArticles) else {
            return Ok(Page::empty(page));
        };
        let query = ArticleQuery::new(scope).ordered_by(ArticleOrder::MostViewed);
        self.page(&query, page).await
    }

    /// my_articles
    ///
    /// The management view: an author's own non-deleted articles in any status, every
    /// article for an admin, nothing for a plain user.
    pub async fn my_articles(
        &self,
        caller: &Identity,
        search: ArticleSearch,
        page: PageRequest,
    ) -> Result<Page<ArticleView>, AppError> {
        let Some(scope) = Self::listing_scope(Some(caller), Operation::ListOwnArticles) else {
            return Ok(Page::empty(page));
        };
        let query = ArticleQuery::new(scope).with_search(search);
        self.page(&query, page).await
    }

    /// The admin moderation queue: every article, drafts and deleted ones included.
    pub async fn review_queue(
        &self,
        caller: &Identity,
        page: PageRequest,
    ) -> Result<Page<ArticleView>, AppError> {
        let Some(scope) = Self::listing_scope(Some(caller), Operation::ReviewArticles) else {
            return Ok(Page::empty(page));
        };
        self.page(&ArticleQuery::new(scope), page).await
    }

    // --- Single records ---

    /// article_detail
    ///
    /// Returns one article if the caller may see it and counts the view. An article the
    /// caller may not see is reported exactly like a missing one.
    pub async fn article_detail(
        &self,
        caller: Option<&Identity>,
        id: Uuid,
    ) -> Result<ArticleView, AppError> {
        let scope = AuthorizationPolicy::decide(caller, Operation::ReadArticle)
            .listing_scope()
            .ok_or(AppError::NotFound("article"))?;

        let mut article = self
            .repo
            .find_article(id)
            .await?
            .filter(|a| scope.admits(a))
            .ok_or(AppError::NotFound("article"))?;

        article.view_count = self
            .repo
            .increment_view_count(id)
            .await?
            .ok_or(AppError::NotFound("article"))?;

        self.view(article).await
    }

    /// create_article
    ///
    /// Stores a new draft owned by the caller, creating its category if needed.
    pub async fn create_article(
        &self,
        caller: &Identity,
        mut draft: ArticleDraft,
    ) -> Result<ArticleView, AppError> {
        AuthorizationPolicy::decide(Some(caller), Operation::CreateArticle).check()?;

        draft.title = draft.title.trim().to_string();
        if draft.title.is_empty() {
            return Err(AppError::validation("title must not be empty"));
        }
        draft.tags = normalize_tags(draft.tags);

        let category = self.resolve_category(&draft.category_name).await?;
        let article = self
            .repo
            .insert_article(NewArticle {
                owner_id: caller.user_id,
                category_id: category.id,
                draft,
            })
            .await?;

        tracing::info!(article_id = %article.id, owner = %caller.username, "Article created");
        self.view(article).await
    }

    /// update_article
    ///
    /// Applies the provided fields. Authors may only touch their own articles; the
    /// store re-checks ownership as part of the write.
    pub async fn update_article(
        &self,
        caller: &Identity,
        request: UpdateArticleRequest,
    ) -> Result<ArticleView, AppError> {
        let existing = self.mutable_article(caller, request.id).await?;
        AuthorizationPolicy::decide(
            Some(caller),
            Operation::UpdateArticle {
                owner: existing.owner_id,
            },
        )
        .check()?;

        let title = match request.title.map(|t| t.trim().to_string()) {
            Some(t) if t.is_empty() => return Err(AppError::validation("title must not be empty")),
            other => other,
        };
        let category_id = match request.category_name.as_deref() {
            Some(name) => Some(self.resolve_category(name).await?.id),
            None => None,
        };

        let changes = ArticleChanges {
            category_id,
            title,
            summary: request.summary,
            content: request.content,
            thumbnail: request.thumbnail,
            is_top: request.is_top,
            allow_comment: request.allow_comment,
            tags: request.tags.map(normalize_tags),
            place_name: request.place_name,
            latitude: request.latitude,
            longitude: request.longitude,
        };

        let updated = self
            .repo
            .update_article(request.id, owner_guard(caller), changes)
            .await?
            .ok_or(AppError::NotFound("article"))?;

        tracing::info!(article_id = %updated.id, editor = %caller.username, "Article updated");
        self.view(updated).await
    }

    /// Soft-deletes an article. Admins may delete any article, authors only their own.
    pub async fn delete_article(&self, caller: &Identity, id: Uuid) -> Result<(), AppError> {
        let existing = self.mutable_article(caller, id).await?;
        AuthorizationPolicy::decide(
            Some(caller),
            Operation::DeleteArticle {
                owner: existing.owner_id,
            },
        )
        .check()?;

        if !self.repo.soft_delete_article(id, owner_guard(caller)).await? {
            return Err(AppError::NotFound("article"));
        }
        tracing::info!(article_id = %id, by = %caller.username, "Article deleted");
        Ok(())
    }

    /// approve_article
    ///
    /// The admin publish gate. Approving an already published article changes nothing.
    pub async fn approve_article(
        &self,
        caller: &Identity,
        id: Uuid,
    ) -> Result<ArticleView, AppError> {
        AuthorizationPolicy::decide(Some(caller), Operation::PublishArticle).check()?;

        let article = self
            .repo
            .set_article_status(id, ArticleStatus::Published)
            .await?
            .ok_or(AppError::NotFound("article"))?;

        tracing::info!(article_id = %id, "Article published");
        self.view(article).await
    }

    // --- Categories ---

    pub async fn hot_categories(&self) -> Result<Vec<Category>, AppError> {
        Ok(self.repo.recent_categories(HOT_CATEGORY_LIMIT).await?)
    }

    /// Finds the category by name, creating it if absent.
    pub async fn resolve_category(&self, name: &str) -> Result<Category, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("category name must not be empty"));
        }
        Ok(self.repo.upsert_category(name).await?)
    }

    // --- Helpers ---

    /// Loads the target of a mutation. Deleted articles only exist for admins.
    async fn mutable_article(&self, caller: &Identity, id: Uuid) -> Result<Article, AppError> {
        self.repo
            .find_article(id)
            .await?
            .filter(|a| caller.role == Role::Admin || !a.is_deleted)
            .ok_or(AppError::NotFound("article"))
    }

    async fn page(
        &self,
        query: &ArticleQuery,
        page: PageRequest,
    ) -> Result<Page<ArticleView>, AppError> {
        let result = self.repo.page_articles(query, page).await?;
        let views = self.views(result.records).await?;
        Ok(Page {
            records: views,
            total: result.total,
            page: result.page,
            size: result.size,
        })
    }

    async fn view(&self, article: Article) -> Result<ArticleView, AppError> {
        let mut views = self.views(vec![article]).await?;
        views
            .pop()
            .ok_or_else(|| AppError::internal("article view enrichment dropped a record"))
    }

    /// Attaches author usernames and category names. A dangling reference becomes
    /// `None` instead of failing the whole listing.
    async fn views(&self, articles: Vec<Article>) -> Result<Vec<ArticleView>, AppError> {
        let owner_ids: Vec<Uuid> = articles
            .iter()
            .map(|a| a.owner_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let category_ids: Vec<Uuid> = articles
            .iter()
            .filter_map(|a| a.category_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let authors = self.repo.usernames(&owner_ids).await?;
        let categories = self.repo.category_names(&category_ids).await?;

        Ok(articles
            .into_iter()
            .map(|article| {
                let author = authors.get(&article.owner_id).cloned();
                let category = article
                    .category_id
                    .and_then(|id| categories.get(&id).cloned());
                ArticleView::new(article, author, category)
            })
            .collect())
    }
}

/// Admins write unguarded; everyone else only where they own the row.
fn owner_guard(caller: &Identity) -> Option<Uuid> {
    match caller.role {
        Role::Admin => None,
        _ => Some(caller.user_id),
    }
}

/// Trims, drops empties and deduplicates tag names.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
