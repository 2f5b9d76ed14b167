use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{ArticleOrder, ArticleQuery, Repository, like_pattern};
use crate::{
    error::RepoError,
    models::{
        Article, ArticleChanges, ArticleStatus, Category, NewArticle, NewUser, Page,
        PageRequest, UpdateProfileRequest, User,
    },
    policy::ArticleScope,
};

const USER_COLUMNS: &str = r#"
    SELECT u.id, u.username, u.password_hash, u.nickname, u.email, u.avatar, u.intro,
           r.role_key AS role, u.online, u.last_login_at, u.is_deleted,
           u.created_at, u.updated_at
    FROM users u
    JOIN user_roles r ON r.user_id = u.id
"#;

const ARTICLE_COLUMNS: &str = r#"
    SELECT a.id, a.owner_id, a.category_id, a.title, a.summary, a.content, a.thumbnail,
           a.is_top, a.allow_comment, a.status, a.is_deleted, a.view_count, a.version,
           a.place_name, a.latitude, a.longitude,
           ARRAY(
               SELECT t.name FROM article_tags at JOIN tags t ON t.id = at.tag_id
               WHERE at.article_id = a.id ORDER BY t.name
           ) AS tags,
           a.created_at, a.updated_at
    FROM articles a
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Visibility scopes are
/// translated into `WHERE` clauses with `QueryBuilder`, so every user-provided value
/// is bound rather than interpolated.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies every pending migration from `migrations/`.
    pub async fn migrate(&self) -> Result<(), RepoError> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepoError::Backend(format!("Failed to run migrations: {e}")))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_article(&self, id: Uuid) -> Result<Option<Article>, RepoError> {
        let mut builder = QueryBuilder::<Postgres>::new(ARTICLE_COLUMNS);
        builder.push(" WHERE a.id = ").push_bind(id);
        Ok(builder
            .build_query_as::<Article>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn count_articles(&self, query: &ArticleQuery) -> Result<u64, RepoError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM articles a");
        push_filters(&mut builder, query);
        let total: i64 = builder.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }
}

/// Appends the scope predicate and search filters as a `WHERE` clause.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ArticleQuery) {
    builder.push(" WHERE ");
    match query.scope {
        ArticleScope::Unrestricted => {
            builder.push("TRUE");
        }
        ArticleScope::OwnOrPublished { owner } => {
            builder
                .push("a.is_deleted = FALSE AND (a.status = 'published' OR a.owner_id = ")
                .push_bind(owner)
                .push(")");
        }
        ArticleScope::OwnedBy { owner } => {
            builder
                .push("a.is_deleted = FALSE AND a.owner_id = ")
                .push_bind(owner);
        }
        ArticleScope::PublishedOnly => {
            builder.push("a.status = 'published' AND a.is_deleted = FALSE");
        }
    }

    let search = &query.search;
    if let Some(keyword) = &search.keyword {
        builder
            .push(" AND a.title ILIKE ")
            .push_bind(like_pattern(keyword));
    }
    if !search.category_ids.is_empty() {
        builder
            .push(" AND a.category_id = ANY(")
            .push_bind(search.category_ids.clone())
            .push(")");
    }
    if !search.tags.is_empty() {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM article_tags at JOIN tags t ON t.id = at.tag_id \
                 WHERE at.article_id = a.id AND t.name = ANY(",
            )
            .push_bind(search.tags.clone())
            .push("))");
    }
}

fn push_order(builder: &mut QueryBuilder<'_, Postgres>, order: ArticleOrder) {
    match order {
        ArticleOrder::RecentlyUpdated => builder.push(" ORDER BY a.updated_at DESC, a.id"),
        ArticleOrder::MostViewed => {
            builder.push(" ORDER BY a.view_count DESC, a.updated_at DESC, a.id")
        }
    };
}

/// Replaces the tag set of an article, creating unknown tags by name.
async fn replace_tags(
    tx: &mut Transaction<'_, Postgres>,
    article_id: Uuid,
    tags: &[String],
) -> Result<(), RepoError> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = $1")
        .bind(article_id)
        .execute(&mut **tx)
        .await?;

    for name in tags {
        let tag_id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO tags (id, name) VALUES ($1, $2)
               ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
               RETURNING id"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            "INSERT INTO article_tags (article_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(article_id)
        .bind(tag_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql = format!("{USER_COLUMNS} WHERE u.id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("{USER_COLUMNS} WHERE u.username = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_user
    ///
    /// Inserts the account and its role row in one transaction. The unique constraint
    /// on `users.username` turns a concurrent duplicate registration into a conflict.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO users (id, username, password_hash, created_at, updated_at)
               VALUES ($1, $2, $3, NOW(), NOW())"#,
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_roles (user_id, role_key) VALUES ($1, $2)")
            .bind(id)
            .bind(user.role.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_user(id)
            .await?
            .ok_or_else(|| RepoError::Backend(format!("user {id} vanished after insert")))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: UpdateProfileRequest,
    ) -> Result<Option<User>, RepoError> {
        let updated = sqlx::query(
            r#"UPDATE users
               SET nickname = COALESCE($2, nickname),
                   email = COALESCE($3, email),
                   intro = COALESCE($4, intro),
                   avatar = COALESCE($5, avatar),
                   updated_at = NOW()
               WHERE id = $1 AND is_deleted = FALSE"#,
        )
        .bind(id)
        .bind(changes.nickname)
        .bind(changes.email)
        .bind(changes.intro)
        .bind(changes.avatar)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_user(id).await
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<bool, RepoError> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_presence(&self, id: Uuid, online: bool) -> Result<(), RepoError> {
        sqlx::query(
            r#"UPDATE users
               SET online = $2,
                   last_login_at = CASE WHEN $2 THEN NOW() ELSE last_login_at END
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(online)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_users(
        &self,
        keyword: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<User>, RepoError> {
        let pattern = keyword.map(like_pattern);

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM users u WHERE u.is_deleted = FALSE",
        );
        if let Some(p) = &pattern {
            count.push(" AND u.username ILIKE ").push_bind(p.clone());
        }
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut builder = QueryBuilder::<Postgres>::new(USER_COLUMNS);
        builder.push(" WHERE u.is_deleted = FALSE");
        if let Some(p) = pattern {
            builder.push(" AND u.username ILIKE ").push_bind(p);
        }
        builder
            .push(" ORDER BY u.created_at DESC, u.id LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let records = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            records,
            total: total.max(0) as u64,
            page: page.page,
            size: page.size,
        })
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, RepoError> {
        let res = sqlx::query(
            "UPDATE users SET is_deleted = TRUE, online = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn usernames(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE id = ANY($1)")
                .bind(ids.to_vec())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>, RepoError> {
        self.fetch_article(id).await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>, RepoError> {
        let mut builder = QueryBuilder::<Postgres>::new(ARTICLE_COLUMNS);
        push_filters(&mut builder, query);
        push_order(&mut builder, query.order);
        Ok(builder
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn page_articles(
        &self,
        query: &ArticleQuery,
        page: PageRequest,
    ) -> Result<Page<Article>, RepoError> {
        let total = self.count_articles(query).await?;

        let mut builder = QueryBuilder::<Postgres>::new(ARTICLE_COLUMNS);
        push_filters(&mut builder, query);
        push_order(&mut builder, query.order);
        builder
            .push(" LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let records = builder
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            records,
            total,
            page: page.page,
            size: page.size,
        })
    }

    /// insert_article
    ///
    /// New articles are always inserted as drafts; only the publish gate changes that.
    async fn insert_article(&self, article: NewArticle) -> Result<Article, RepoError> {
        let id = Uuid::new_v4();
        let draft = article.draft;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO articles (
                   id, owner_id, category_id, title, summary, content, thumbnail,
                   is_top, allow_comment, status, is_deleted, view_count, version,
                   place_name, latitude, longitude, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'draft', FALSE, 0, 0,
                       $10, $11, $12, NOW(), NOW())"#,
        )
        .bind(id)
        .bind(article.owner_id)
        .bind(article.category_id)
        .bind(&draft.title)
        .bind(&draft.summary)
        .bind(&draft.content)
        .bind(&draft.thumbnail)
        .bind(draft.is_top)
        .bind(draft.allow_comment)
        .bind(&draft.place_name)
        .bind(draft.latitude)
        .bind(draft.longitude)
        .execute(&mut *tx)
        .await?;

        replace_tags(&mut tx, id, &draft.tags).await?;
        tx.commit().await?;

        self.fetch_article(id)
            .await?
            .ok_or_else(|| RepoError::Backend(format!("article {id} vanished after insert")))
    }

    /// update_article
    ///
    /// Uses `COALESCE` so only provided fields change. The owner guard, including the
    /// live-row check for non-admins, is part of the `WHERE` clause.
    async fn update_article(
        &self,
        id: Uuid,
        owner_guard: Option<Uuid>,
        changes: ArticleChanges,
    ) -> Result<Option<Article>, RepoError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE articles
               SET category_id = COALESCE($3, category_id),
                   title = COALESCE($4, title),
                   summary = COALESCE($5, summary),
                   content = COALESCE($6, content),
                   thumbnail = COALESCE($7, thumbnail),
                   is_top = COALESCE($8, is_top),
                   allow_comment = COALESCE($9, allow_comment),
                   place_name = COALESCE($10, place_name),
                   latitude = COALESCE($11, latitude),
                   longitude = COALESCE($12, longitude),
                   version = version + 1,
                   updated_at = NOW()
               WHERE id = $1 AND ($2::uuid IS NULL OR (owner_id = $2 AND is_deleted = FALSE))"#,
        )
        .bind(id)
        .bind(owner_guard)
        .bind(changes.category_id)
        .bind(changes.title)
        .bind(changes.summary)
        .bind(changes.content)
        .bind(changes.thumbnail)
        .bind(changes.is_top)
        .bind(changes.allow_comment)
        .bind(changes.place_name)
        .bind(changes.latitude)
        .bind(changes.longitude)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        if let Some(tags) = &changes.tags {
            replace_tags(&mut tx, id, tags).await?;
        }
        tx.commit().await?;

        self.fetch_article(id).await
    }

    async fn soft_delete_article(
        &self,
        id: Uuid,
        owner_guard: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        let res = sqlx::query(
            r#"UPDATE articles
               SET is_deleted = TRUE, version = version + 1, updated_at = NOW()
               WHERE id = $1 AND ($2::uuid IS NULL OR (owner_id = $2 AND is_deleted = FALSE))"#,
        )
        .bind(id)
        .bind(owner_guard)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_article_status(
        &self,
        id: Uuid,
        status: ArticleStatus,
    ) -> Result<Option<Article>, RepoError> {
        let res = sqlx::query(
            r#"UPDATE articles
               SET status = $2, version = version + 1, updated_at = NOW()
               WHERE id = $1 AND status <> $2"#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            tracing::debug!(article_id = %id, status = status.as_str(), "Status unchanged");
        }
        self.fetch_article(id).await
    }

    /// increment_view_count
    ///
    /// A single `UPDATE ... SET view_count = view_count + 1`, so concurrent readers
    /// never lose increments.
    async fn increment_view_count(&self, id: Uuid) -> Result<Option<u64>, RepoError> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE articles SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.map(|c| c.max(0) as u64))
    }

    /// upsert_category
    ///
    /// `ON CONFLICT (name) DO UPDATE` makes the insert-or-fetch a single atomic
    /// statement backed by the unique index on `categories.name`.
    async fn upsert_category(&self, name: &str) -> Result<Category, RepoError> {
        Ok(sqlx::query_as::<_, Category>(
            r#"INSERT INTO categories (id, name, created_at) VALUES ($1, $2, NOW())
               ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
               RETURNING id, name, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn category_names(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, name FROM categories WHERE id = ANY($1)")
                .bind(ids.to_vec())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn recent_categories(&self, limit: u32) -> Result<Vec<Category>, RepoError> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, created_at FROM categories ORDER BY created_at DESC, id LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_search(&self, keyword: &str) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO search_history (keyword, search_times, created_at, updated_at)
               VALUES ($1, 1, NOW(), NOW())
               ON CONFLICT (keyword)
               DO UPDATE SET search_times = search_history.search_times + 1, updated_at = NOW()"#,
        )
        .bind(keyword)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
