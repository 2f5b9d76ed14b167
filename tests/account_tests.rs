use blog_portal::{
    AccountService, MemoryRepository, TokenService,
    error::{AppError, AuthError, AuthzError},
    models::{
        ChangePasswordRequest, Identity, LoginRequest, PageRequest, RegisterRequest, Role,
        UpdateProfileRequest,
    },
    repository::{Repository, RepositoryState},
};
use std::sync::Arc;
use uuid::Uuid;

// --- Test Context ---

struct Accounts {
    repo: Arc<MemoryRepository>,
    tokens: TokenService,
    service: AccountService,
}

impl Accounts {
    fn setup() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let state: RepositoryState = repo.clone();
        let tokens = TokenService::new("account-tests", 24);
        Self {
            service: AccountService::new(state, tokens.clone()),
            repo,
            tokens,
        }
    }

    async fn register(&self, username: &str, password: &str, hint: Option<&str>) -> Identity {
        let view = self
            .service
            .register(
                RegisterRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                hint,
            )
            .await
            .expect("register");
        Identity {
            user_id: view.id,
            username: view.username,
            role: view.role,
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<Identity, AppError> {
        let session = self
            .service
            .login(LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        Ok(self.tokens.verify(&session.token)?)
    }

    async fn admin(&self) -> Identity {
        self.service.ensure_admin("root", "rootpw").await.unwrap();
        self.login("root", "rootpw").await.unwrap()
    }
}

// --- Registration ---

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let a = Accounts::setup();
    a.register("alice", "pw1", None).await;

    let second = a
        .service
        .register(
            RegisterRequest {
                username: "alice".to_string(),
                password: "pw2".to_string(),
            },
            None,
        )
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))));

    let page = a.repo.list_users(None, PageRequest::default()).await.unwrap();
    assert_eq!(page.total, 1, "no second identity may be created");

    // The original password still works; the rejected one does not.
    assert!(a.login("alice", "pw1").await.is_ok());
    assert!(a.login("alice", "pw2").await.is_err());
}

#[tokio::test]
async fn test_role_hint_selects_author_or_user() {
    let a = Accounts::setup();
    assert_eq!(a.register("writer", "pw", Some("Auth")).await.role, Role::Author);
    assert_eq!(a.register("reader", "pw", Some("user")).await.role, Role::User);
    assert_eq!(a.register("anon", "pw", None).await.role, Role::User);
    // Admin can never be self-assigned.
    assert_eq!(a.register("sneaky", "pw", Some("admin")).await.role, Role::User);
}

#[tokio::test]
async fn test_registration_validation() {
    let a = Accounts::setup();
    for (username, password) in [("", "pw"), ("   ", "pw"), ("bob", "")] {
        let result = a
            .service
            .register(
                RegisterRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                None,
            )
            .await;
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "({username:?}, {password:?}) should be invalid"
        );
    }
}

#[tokio::test]
async fn test_password_is_never_stored_in_plain_text() {
    let a = Accounts::setup();
    a.register("dora", "hunter2", None).await;
    let stored = a.repo.find_user_by_username("dora").await.unwrap().unwrap();
    assert_ne!(stored.password_hash, "hunter2");
    assert!(stored.password_hash.starts_with("$argon2"));
}

// --- Login / logout ---

#[tokio::test]
async fn test_login_embeds_role_and_marks_presence() {
    let a = Accounts::setup();
    let registered = a.register("erin", "pw", Some("Auth")).await;

    let identity = a.login("erin", "pw").await.unwrap();
    assert_eq!(identity, registered);

    let stored = a.repo.find_user(registered.user_id).await.unwrap().unwrap();
    assert!(stored.online);
    assert!(stored.last_login_at.is_some());

    a.service.logout(&identity).await.unwrap();
    let stored = a.repo.find_user(registered.user_id).await.unwrap().unwrap();
    assert!(!stored.online);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let a = Accounts::setup();
    a.register("fred", "right", None).await;

    let wrong_password = a.login("fred", "wrong").await.unwrap_err();
    let unknown_user = a.login("ghost", "right").await.unwrap_err();

    for err in [wrong_password, unknown_user] {
        assert!(matches!(err, AppError::Auth(AuthError::InvalidCredentials)));
        assert_eq!(err.public_message(), "invalid username or password");
    }
}

// --- Profile ---

#[tokio::test]
async fn test_profile_update_never_changes_username() {
    let a = Accounts::setup();
    let me = a.register("gina", "pw", None).await;

    let updated = a
        .service
        .update_profile(
            &me,
            UpdateProfileRequest {
                nickname: Some("G".to_string()),
                email: Some("gina@example.com".to_string()),
                ..UpdateProfileRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.username, "gina");
    assert_eq!(updated.nickname.as_deref(), Some("G"));

    let profile = a.service.profile(&me).await.unwrap();
    assert_eq!(profile.email.as_deref(), Some("gina@example.com"));
    assert_eq!(profile.role, Role::User);
}

#[tokio::test]
async fn test_change_password_requires_old_password() {
    let a = Accounts::setup();
    let me = a.register("hank", "old", None).await;

    let wrong = a
        .service
        .change_password(
            &me,
            ChangePasswordRequest {
                old_password: "nope".to_string(),
                new_password: "new".to_string(),
            },
        )
        .await;
    assert!(matches!(wrong, Err(AppError::Validation(_))));

    let empty = a
        .service
        .change_password(
            &me,
            ChangePasswordRequest {
                old_password: "old".to_string(),
                new_password: String::new(),
            },
        )
        .await;
    assert!(matches!(empty, Err(AppError::Validation(_))));

    a.service
        .change_password(
            &me,
            ChangePasswordRequest {
                old_password: "old".to_string(),
                new_password: "new".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(a.login("hank", "old").await.is_err());
    assert!(a.login("hank", "new").await.is_ok());
}

// --- Administration ---

#[tokio::test]
async fn test_user_listing_is_empty_for_non_admins() {
    let a = Accounts::setup();
    let admin = a.admin().await;
    let author = a.register("ivan", "pw", Some("Auth")).await;
    let user = a.register("jill", "pw", None).await;

    let full = a
        .service
        .list_users(&admin, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(full.total, 3);

    for caller in [&author, &user] {
        let page = a
            .service
            .list_users(caller, PageRequest::default())
            .await
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, 0);

        let search = a
            .service
            .search_users(caller, Some("i"), PageRequest::default())
            .await
            .unwrap();
        assert!(search.records.is_empty());
    }

    let found = a
        .service
        .search_users(&admin, Some("JI"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.records[0].username, "jill");
}

#[tokio::test]
async fn test_single_user_admin_operations_deny_with_error() {
    let a = Accounts::setup();
    let author = a.register("kate", "pw", Some("Auth")).await;
    let victim = a.register("liam", "pw", None).await;

    let detail = a.service.user_detail(&author, victim.user_id).await;
    assert!(matches!(
        detail,
        Err(AppError::Authz(AuthzError::InsufficientRole))
    ));

    let delete = a.service.delete_user(&author, victim.user_id).await;
    assert!(matches!(
        delete,
        Err(AppError::Authz(AuthzError::InsufficientRole))
    ));
    assert!(!a.repo.find_user(victim.user_id).await.unwrap().unwrap().is_deleted);
}

#[tokio::test]
async fn test_admin_soft_deletes_user_and_login_stops_working() {
    let a = Accounts::setup();
    let admin = a.admin().await;
    let victim = a.register("mona", "pw", None).await;

    let detail = a.service.user_detail(&admin, victim.user_id).await.unwrap();
    assert_eq!(detail.username, "mona");

    a.service.delete_user(&admin, victim.user_id).await.unwrap();

    let login = a.login("mona", "pw").await;
    assert!(matches!(
        login,
        Err(AppError::Auth(AuthError::InvalidCredentials))
    ));
    assert!(matches!(
        a.service.user_detail(&admin, victim.user_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        a.service.delete_user(&admin, Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        a.service.delete_user(&admin, admin.user_id).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_bootstrap_admin_is_created_once() {
    let a = Accounts::setup();
    assert!(a.service.ensure_admin("root", "rootpw").await.unwrap());
    assert!(!a.service.ensure_admin("root", "other").await.unwrap());

    let admin = a.login("root", "rootpw").await.unwrap();
    assert_eq!(admin.role, Role::Admin);
}
