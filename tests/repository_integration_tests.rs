//! Runs against a real PostgreSQL database when `DATABASE_URL` is set and is skipped
//! otherwise. Every test uses unique names so runs can share a database.

use blog_portal::{
    error::RepoError,
    models::{
        ArticleChanges, ArticleDraft, ArticleSearch, ArticleStatus, NewArticle, NewUser, Role,
    },
    policy::ArticleScope,
    repository::{ArticleQuery, PostgresRepository, Repository},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

async fn repository() -> Option<Arc<PostgresRepository>> {
    dotenv::dotenv().ok();
    let Ok(db_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres repository test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .expect("Failed to connect to Postgres in tests");
    let repo = PostgresRepository::new(pool);
    repo.migrate().await.expect("migrations");
    Some(Arc::new(repo))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..12])
}

async fn user(repo: &PostgresRepository, role: Role) -> Uuid {
    repo.create_user(NewUser {
        username: unique("pg"),
        password_hash: "$argon2id$test".to_string(),
        role,
    })
    .await
    .unwrap()
    .id
}

async fn article(repo: &PostgresRepository, owner: Uuid, title: &str, tags: &[&str]) -> Uuid {
    let category = repo.upsert_category(&unique("cat")).await.unwrap();
    repo.insert_article(NewArticle {
        owner_id: owner,
        category_id: category.id,
        draft: ArticleDraft {
            category_name: category.name,
            title: title.to_string(),
            content: "body".to_string(),
            allow_comment: true,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..ArticleDraft::default()
        },
    })
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn test_username_uniqueness_is_a_conflict() {
    let Some(repo) = repository().await else { return };
    let username = unique("dup");

    let first = NewUser {
        username: username.clone(),
        password_hash: "h1".to_string(),
        role: Role::User,
    };
    repo.create_user(first.clone()).await.unwrap();

    let second = repo
        .create_user(NewUser {
            password_hash: "h2".to_string(),
            ..first
        })
        .await;
    assert!(matches!(second, Err(RepoError::Conflict(_))));

    let stored = repo.find_user_by_username(&username).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, "h1");
    assert_eq!(stored.role, Role::User);
}

#[tokio::test]
async fn test_scope_is_applied_in_sql() {
    let Some(repo) = repository().await else { return };
    let owner = user(&repo, Role::Author).await;
    let marker = unique("scope");

    let draft = article(&repo, owner, &format!("{marker} draft"), &[]).await;
    let published = article(&repo, owner, &format!("{marker} published"), &[]).await;
    repo.set_article_status(published, ArticleStatus::Published)
        .await
        .unwrap();
    let deleted = article(&repo, owner, &format!("{marker} deleted"), &[]).await;
    repo.set_article_status(deleted, ArticleStatus::Published)
        .await
        .unwrap();
    assert!(repo.soft_delete_article(deleted, None).await.unwrap());

    let ids = |scope: ArticleScope| {
        let repo = repo.clone();
        let marker = marker.clone();
        async move {
            let query = ArticleQuery::new(scope).with_search(ArticleSearch::keyword(&marker));
            repo.list_articles(&query)
                .await
                .unwrap()
                .into_iter()
                .map(|a| a.id)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(ids(ArticleScope::PublishedOnly).await, vec![published]);

    let mut own = ids(ArticleScope::OwnedBy { owner }).await;
    own.sort();
    let mut expected = vec![draft, published];
    expected.sort();
    assert_eq!(own, expected);

    assert_eq!(ids(ArticleScope::Unrestricted).await.len(), 3);
}

#[tokio::test]
async fn test_owner_guard_blocks_foreign_writes() {
    let Some(repo) = repository().await else { return };
    let owner = user(&repo, Role::Author).await;
    let stranger = user(&repo, Role::Author).await;
    let id = article(&repo, owner, "Guarded", &[]).await;

    let changes = ArticleChanges {
        title: Some("Hijacked".to_string()),
        ..ArticleChanges::default()
    };
    assert!(
        repo.update_article(id, Some(stranger), changes.clone())
            .await
            .unwrap()
            .is_none()
    );
    assert!(!repo.soft_delete_article(id, Some(stranger)).await.unwrap());

    let stored = repo.find_article(id).await.unwrap().unwrap();
    assert_eq!(stored.title, "Guarded");
    assert!(!stored.is_deleted);

    let updated = repo
        .update_article(id, Some(owner), changes)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "Hijacked");
}

#[tokio::test]
async fn test_owner_guard_blocks_writes_to_deleted_articles() {
    let Some(repo) = repository().await else { return };
    let owner = user(&repo, Role::Author).await;
    let id = article(&repo, owner, "Buried", &[]).await;
    assert!(repo.soft_delete_article(id, None).await.unwrap());

    let changes = ArticleChanges {
        title: Some("Exhumed".to_string()),
        ..ArticleChanges::default()
    };
    assert!(
        repo.update_article(id, Some(owner), changes.clone())
            .await
            .unwrap()
            .is_none()
    );
    assert!(!repo.soft_delete_article(id, Some(owner)).await.unwrap());
    assert_eq!(repo.find_article(id).await.unwrap().unwrap().title, "Buried");

    let by_admin = repo.update_article(id, None, changes).await.unwrap().unwrap();
    assert_eq!(by_admin.title, "Exhumed");
}

#[tokio::test]
async fn test_concurrent_view_increments_are_not_lost() {
    let Some(repo) = repository().await else { return };
    let owner = user(&repo, Role::Author).await;
    let id = article(&repo, owner, "Popular", &[]).await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.increment_view_count(id).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = repo.find_article(id).await.unwrap().unwrap();
    assert_eq!(stored.view_count, 25);
}

#[tokio::test]
async fn test_concurrent_category_upserts_converge() {
    let Some(repo) = repository().await else { return };
    let name = unique("shared");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        let name = name.clone();
        handles.push(tokio::spawn(async move {
            repo.upsert_category(&name).await.unwrap().id
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn test_tags_round_trip_and_filter() {
    let Some(repo) = repository().await else { return };
    let owner = user(&repo, Role::Author).await;
    let tag = unique("tag");
    let id = article(&repo, owner, "Tagged", &[tag.as_str(), "common"]).await;

    let stored = repo.find_article(id).await.unwrap().unwrap();
    let mut expected = vec!["common".to_string(), tag.clone()];
    expected.sort();
    assert_eq!(stored.tags, expected);

    let query =
        ArticleQuery::new(ArticleScope::Unrestricted).with_search(ArticleSearch::tags([tag]));
    let found = repo.list_articles(&query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);
}

#[tokio::test]
async fn test_publish_gate_is_idempotent() {
    let Some(repo) = repository().await else { return };
    let owner = user(&repo, Role::Author).await;
    let id = article(&repo, owner, "Gate", &[]).await;

    let first = repo
        .set_article_status(id, ArticleStatus::Published)
        .await
        .unwrap()
        .unwrap();
    let second = repo
        .set_article_status(id, ArticleStatus::Published)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, ArticleStatus::Published);
    assert_eq!(second.updated_at, first.updated_at);
}
