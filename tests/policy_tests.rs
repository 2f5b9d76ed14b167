use blog_portal::{
    error::AuthzError,
    models::{Article, ArticleStatus, Identity, Role},
    policy::{ArticleScope, AuthorizationPolicy, Decision, Operation},
};
use chrono::Utc;
use uuid::Uuid;

// --- Helpers ---

fn caller(role: Role) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        username: format!("{role}-caller"),
        role,
    }
}

fn article(owner_id: Uuid, status: ArticleStatus, is_deleted: bool) -> Article {
    let now = Utc::now();
    Article {
        id: Uuid::new_v4(),
        owner_id,
        category_id: None,
        title: "A walk in the park".to_string(),
        summary: None,
        content: String::new(),
        thumbnail: None,
        is_top: false,
        allow_comment: true,
        status,
        is_deleted,
        view_count: 0,
        version: 0,
        place_name: None,
        latitude: None,
        longitude: None,
        tags: vec![],
        created_at: now,
        updated_at: now,
    }
}

/// Every combination of status and deletion flag, owned by `owner`.
fn all_states(owner: Uuid) -> Vec<Article> {
    [ArticleStatus::Draft, ArticleStatus::Published]
        .into_iter()
        .flat_map(|s| [article(owner, s, false), article(owner, s, true)])
        .collect()
}

// --- Read visibility ---

#[test]
fn test_admin_sees_everything() {
    let admin = caller(Role::Admin);
    let scope = AuthorizationPolicy::decide(Some(&admin), Operation::ListArticles)
        .listing_scope()
        .unwrap();
    assert_eq!(scope, ArticleScope::Unrestricted);
    assert!(all_states(Uuid::new_v4()).iter().all(|a| scope.admits(a)));
}

#[test]
fn test_author_sees_own_any_status_and_others_published() {
    let author = caller(Role::Author);
    let scope = AuthorizationPolicy::article_scope(Some(&author));

    let own = all_states(author.user_id);
    let visible_own: Vec<_> = own.iter().filter(|a| scope.admits(a)).collect();
    assert_eq!(visible_own.len(), 2, "own draft and own published, not deleted");
    assert!(visible_own.iter().all(|a| !a.is_deleted));

    let others = all_states(Uuid::new_v4());
    let visible_others: Vec<_> = others.iter().filter(|a| scope.admits(a)).collect();
    assert_eq!(visible_others.len(), 1);
    assert_eq!(visible_others[0].status, ArticleStatus::Published);
    assert!(!visible_others[0].is_deleted);
}

#[test]
fn test_user_and_anonymous_see_only_published_live_articles() {
    let user = caller(Role::User);
    for who in [Some(&user), None] {
        let decision = AuthorizationPolicy::decide(who, Operation::ReadArticle);
        let scope = decision.listing_scope().unwrap();
        assert_eq!(scope, ArticleScope::PublishedOnly);

        // Even the caller's own drafts stay hidden for a plain user.
        let mut pool = all_states(Uuid::new_v4());
        pool.extend(all_states(user.user_id));
        let visible: Vec<_> = pool.iter().filter(|a| scope.admits(a)).collect();
        assert_eq!(visible.len(), 2);
        assert!(
            visible
                .iter()
                .all(|a| a.status == ArticleStatus::Published && !a.is_deleted)
        );
    }
}

#[test]
fn test_deleted_articles_hidden_from_every_non_admin_scope() {
    let owner = Uuid::new_v4();
    let scopes = [
        ArticleScope::OwnOrPublished { owner },
        ArticleScope::OwnedBy { owner },
        ArticleScope::PublishedOnly,
    ];
    for scope in scopes {
        for a in all_states(owner).iter().filter(|a| a.is_deleted) {
            assert!(!scope.admits(a), "{scope:?} admitted a deleted article");
        }
    }
}

// --- Management listings ---

#[test]
fn test_list_own_articles_by_role() {
    let admin = caller(Role::Admin);
    let author = caller(Role::Author);
    let user = caller(Role::User);

    assert_eq!(
        AuthorizationPolicy::decide(Some(&admin), Operation::ListOwnArticles).listing_scope(),
        Some(ArticleScope::Unrestricted)
    );
    assert_eq!(
        AuthorizationPolicy::decide(Some(&author), Operation::ListOwnArticles).listing_scope(),
        Some(ArticleScope::OwnedBy {
            owner: author.user_id
        })
    );
    // Denied listings degrade to an empty result, signalled by no scope.
    assert_eq!(
        AuthorizationPolicy::decide(Some(&user), Operation::ListOwnArticles).listing_scope(),
        None
    );
    assert_eq!(
        AuthorizationPolicy::decide(None, Operation::ListOwnArticles).listing_scope(),
        None
    );
}

#[test]
fn test_review_queue_is_admin_only() {
    assert_eq!(
        AuthorizationPolicy::decide(Some(&caller(Role::Admin)), Operation::ReviewArticles),
        Decision::Allow
    );
    for role in [Role::Author, Role::User] {
        assert!(
            !AuthorizationPolicy::decide(Some(&caller(role)), Operation::ReviewArticles)
                .is_allowed()
        );
    }
}

// --- Mutations ---

#[test]
fn test_create_article_rights() {
    for role in [Role::Admin, Role::Author] {
        assert!(
            AuthorizationPolicy::decide(Some(&caller(role)), Operation::CreateArticle)
                .is_allowed()
        );
    }
    assert_eq!(
        AuthorizationPolicy::decide(Some(&caller(Role::User)), Operation::CreateArticle).check(),
        Err(AuthzError::InsufficientRole)
    );
    assert_eq!(
        AuthorizationPolicy::decide(None, Operation::CreateArticle).check(),
        Err(AuthzError::InsufficientRole)
    );
}

#[test]
fn test_update_and_delete_require_ownership_for_authors() {
    let author = caller(Role::Author);
    let stranger = Uuid::new_v4();

    for op in [
        Operation::UpdateArticle {
            owner: author.user_id,
        },
        Operation::DeleteArticle {
            owner: author.user_id,
        },
    ] {
        assert_eq!(AuthorizationPolicy::decide(Some(&author), op), Decision::Allow);
    }

    for op in [
        Operation::UpdateArticle { owner: stranger },
        Operation::DeleteArticle { owner: stranger },
    ] {
        assert_eq!(
            AuthorizationPolicy::decide(Some(&author), op).check(),
            Err(AuthzError::NotOwner)
        );
        assert_eq!(
            AuthorizationPolicy::decide(Some(&caller(Role::Admin)), op),
            Decision::Allow
        );
        assert_eq!(
            AuthorizationPolicy::decide(Some(&caller(Role::User)), op).check(),
            Err(AuthzError::InsufficientRole)
        );
    }
}

#[test]
fn test_plain_user_cannot_mutate_even_own_records() {
    let user = caller(Role::User);
    let op = Operation::UpdateArticle {
        owner: user.user_id,
    };
    assert_eq!(
        AuthorizationPolicy::decide(Some(&user), op).check(),
        Err(AuthzError::InsufficientRole)
    );
}

#[test]
fn test_admin_only_operations() {
    let ops = [
        Operation::PublishArticle,
        Operation::ListUsers,
        Operation::ReadUser,
        Operation::DeleteUser,
    ];
    for op in ops {
        assert_eq!(
            AuthorizationPolicy::decide(Some(&caller(Role::Admin)), op),
            Decision::Allow
        );
        for role in [Role::Author, Role::User] {
            assert_eq!(
                AuthorizationPolicy::decide(Some(&caller(role)), op),
                Decision::Deny(AuthzError::InsufficientRole),
                "{role} must not be allowed {op:?}"
            );
        }
        assert!(!AuthorizationPolicy::decide(None, op).is_allowed());
    }
}

#[test]
fn test_every_authenticated_role_may_update_own_profile() {
    for role in [Role::Admin, Role::Author, Role::User] {
        assert!(
            AuthorizationPolicy::decide(Some(&caller(role)), Operation::UpdateOwnProfile)
                .is_allowed()
        );
    }
    assert!(!AuthorizationPolicy::decide(None, Operation::UpdateOwnProfile).is_allowed());
}
