use uuid::Uuid;

use crate::{
    error::{AppError, AuthError, RepoError},
    models::{
        ChangePasswordRequest, Identity, LoginRequest, LoginResponse, NewUser, Page,
        PageRequest, RegisterRequest, Role, UpdateProfileRequest, User, UserView,
    },
    password::{hash_password, verify_password},
    policy::{AuthorizationPolicy, Operation},
    repository::RepositoryState,
    token::TokenService,
};

const MAX_USERNAME_LEN: usize = 32;

/// AccountService
///
/// Login, registration and account administration. The role of an account is resolved
/// here exactly once, at login, and embedded in the issued token.
#[derive(Clone)]
pub struct AccountService {
    repo: RepositoryState,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(repo: RepositoryState, tokens: TokenService) -> Self {
        Self { repo, tokens }
    }

    /// login
    ///
    /// Unknown usernames, wrong passwords and deleted accounts all fail with the same
    /// `InvalidCredentials` error.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        let username = request.username.trim();
        let user = self
            .repo
            .find_user_by_username(username)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash)? {
            tracing::debug!(username = %username, "Login rejected: password mismatch");
            return Err(AuthError::InvalidCredentials.into());
        }

        let identity = user.identity();
        let session = self.tokens.issue(&identity)?;
        self.repo.set_presence(user.id, true).await?;

        tracing::info!(username = %identity.username, role = %identity.role, "User logged in");
        Ok(LoginResponse {
            token: session.token,
            username: identity.username,
            role: identity.role,
            expires_at: session.expires_at,
        })
    }

    /// register
    ///
    /// Creates an account with the role derived from `role_hint`. Admin accounts cannot
    /// be registered. A taken username is a conflict and creates nothing.
    pub async fn register(
        &self,
        request: RegisterRequest,
        role_hint: Option<&str>,
    ) -> Result<UserView, AppError> {
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::validation("username must not be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AppError::validation(format!(
                "username must be at most {MAX_USERNAME_LEN} characters"
            )));
        }
        if request.password.is_empty() {
            return Err(AppError::validation("password must not be empty"));
        }

        if self.repo.find_user_by_username(&username).await?.is_some() {
            return Err(AppError::Conflict("username already taken".to_string()));
        }

        let role = Role::from_registration_hint(role_hint);
        let user = self
            .create(NewUser {
                username,
                password_hash: hash_password(&request.password)?,
                role,
            })
            .await?;

        tracing::info!(username = %user.username, role = %user.role, "User registered");
        Ok(user.into())
    }

    pub async fn logout(&self, caller: &Identity) -> Result<(), AppError> {
        self.repo.set_presence(caller.user_id, false).await?;
        tracing::info!(username = %caller.username, "User logged out");
        Ok(())
    }

    /// The caller's own account.
    pub async fn profile(&self, caller: &Identity) -> Result<UserView, AppError> {
        Ok(self.active_user(caller.user_id).await?.into())
    }

    /// Updates nickname, email, intro and avatar. The username never changes.
    pub async fn update_profile(
        &self,
        caller: &Identity,
        changes: UpdateProfileRequest,
    ) -> Result<UserView, AppError> {
        AuthorizationPolicy::decide(Some(caller), Operation::UpdateOwnProfile).check()?;
        let user = self
            .repo
            .update_profile(caller.user_id, changes)
            .await?
            .ok_or(AppError::NotFound("user"))?;
        Ok(user.into())
    }

    pub async fn change_password(
        &self,
        caller: &Identity,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        AuthorizationPolicy::decide(Some(caller), Operation::UpdateOwnProfile).check()?;
        if request.new_password.is_empty() {
            return Err(AppError::validation("new password must not be empty"));
        }

        let user = self.active_user(caller.user_id).await?;
        if !verify_password(&request.old_password, &user.password_hash)? {
            return Err(AppError::validation("old password is incorrect"));
        }

        if !self
            .repo
            .update_password(user.id, hash_password(&request.new_password)?)
            .await?
        {
            return Err(AppError::NotFound("user"));
        }
        tracing::info!(username = %caller.username, "Password changed");
        Ok(())
    }

    // --- Administration ---

    /// Paged account listing. Non-admin callers get an empty page.
    pub async fn list_users(
        &self,
        caller: &Identity,
        page: PageRequest,
    ) -> Result<Page<UserView>, AppError> {
        self.search_users(caller, None, page).await
    }

    pub async fn search_users(
        &self,
        caller: &Identity,
        keyword: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<UserView>, AppError> {
        if !AuthorizationPolicy::decide(Some(caller), Operation::ListUsers).is_allowed() {
            tracing::debug!(username = %caller.username, "User listing denied, returning an empty page");
            return Ok(Page::empty(page));
        }
        let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
        let users = self.repo.list_users(keyword, page).await?;
        Ok(users.map(UserView::from))
    }

    pub async fn user_detail(&self, caller: &Identity, id: Uuid) -> Result<UserView, AppError> {
        AuthorizationPolicy::decide(Some(caller), Operation::ReadUser).check()?;
        Ok(self.active_user(id).await?.into())
    }

    /// Soft-deletes an account. Admins cannot delete themselves.
    pub async fn delete_user(&self, caller: &Identity, id: Uuid) -> Result<(), AppError> {
        AuthorizationPolicy::decide(Some(caller), Operation::DeleteUser).check()?;
        if id == caller.user_id {
            return Err(AppError::validation("administrators cannot delete their own account"));
        }

        self.active_user(id).await?;
        if !self.repo.soft_delete_user(id).await? {
            return Err(AppError::NotFound("user"));
        }
        tracing::info!(user_id = %id, by = %caller.username, "User deleted");
        Ok(())
    }

    /// ensure_admin
    ///
    /// Creates the bootstrap administrator unless an account with that username exists.
    /// Returns whether an account was created.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<bool, AppError> {
        if self.repo.find_user_by_username(username).await?.is_some() {
            return Ok(false);
        }
        if password.is_empty() {
            return Err(AppError::validation("bootstrap admin password must not be empty"));
        }

        let admin = self
            .create(NewUser {
                username: username.to_string(),
                password_hash: hash_password(password)?,
                role: Role::Admin,
            })
            .await?;
        tracing::info!(username = %admin.username, "Bootstrap admin created");
        Ok(true)
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        self.repo.create_user(user).await.map_err(|e| match e {
            RepoError::Conflict(_) => AppError::Conflict("username already taken".to_string()),
            other => other.into(),
        })
    }

    async fn active_user(&self, id: Uuid) -> Result<User, AppError> {
        self.repo
            .find_user(id)
            .await?
            .filter(|u| !u.is_deleted)
            .ok_or(AppError::NotFound("user"))
    }
}
