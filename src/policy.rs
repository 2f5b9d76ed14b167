//! Role-based authorization decisions.
//!
//! Everything here is a pure function of the caller (possibly absent), the operation
//! and, for single-record mutations, the target's owner. No I/O happens in this module.
//! An absent caller is always evaluated as the lowest-privilege role.

use uuid::Uuid;

use crate::{
    error::AuthzError,
    models::{Article, ArticleStatus, Identity, Role},
};

/// ArticleScope
///
/// The visibility predicate a listing or read must apply to catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleScope {
    /// Every article: any status, any owner, soft-deleted ones included.
    Unrestricted,
    /// The caller's own non-deleted articles in any status, plus everyone's published,
    /// non-deleted articles.
    OwnOrPublished { owner: Uuid },
    /// Only the caller's own non-deleted articles, in any status.
    OwnedBy { owner: Uuid },
    /// Published, non-deleted articles.
    PublishedOnly,
}

impl ArticleScope {
    pub fn admits(&self, article: &Article) -> bool {
        let public = article.status == ArticleStatus::Published && !article.is_deleted;
        match self {
            ArticleScope::Unrestricted => true,
            ArticleScope::OwnOrPublished { owner } => {
                public || (article.owner_id == *owner && !article.is_deleted)
            }
            ArticleScope::OwnedBy { owner } => article.owner_id == *owner && !article.is_deleted,
            ArticleScope::PublishedOnly => public,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListArticles,
    ReadArticle,
    /// The author's management view of their own articles.
    ListOwnArticles,
    CreateArticle,
    UpdateArticle { owner: Uuid },
    DeleteArticle { owner: Uuid },
    /// The moderation queue: every article regardless of status or owner.
    ReviewArticles,
    /// The draft -> published gate.
    PublishArticle,
    ListUsers,
    ReadUser,
    DeleteUser,
    UpdateOwnProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Allowed, restricted to records admitted by the scope.
    Filter(ArticleScope),
    Deny(AuthzError),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny(_))
    }

    /// For single-record operations: a denial becomes an error.
    pub fn check(self) -> Result<(), AuthzError> {
        match self {
            Decision::Deny(err) => Err(err),
            Decision::Allow | Decision::Filter(_) => Ok(()),
        }
    }

    /// For listings: the scope to query with, or `None` when the result must be empty.
    pub fn listing_scope(self) -> Option<ArticleScope> {
        match self {
            Decision::Allow => Some(ArticleScope::Unrestricted),
            Decision::Filter(scope) => Some(scope),
            Decision::Deny(_) => None,
        }
    }
}

/// AuthorizationPolicy
///
/// The decision table mapping (caller role, operation) to a decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationPolicy;

impl AuthorizationPolicy {
    pub fn decide(caller: Option<&Identity>, operation: Operation) -> Decision {
        let role = caller.map(|c| c.role);
        let caller_id = caller.map(|c| c.user_id);

        match operation {
            Operation::ListArticles | Operation::ReadArticle => {
                Decision::Filter(Self::article_scope(caller))
            }

            Operation::ListOwnArticles => match (role, caller_id) {
                (Some(Role::Admin), _) => Decision::Filter(ArticleScope::Unrestricted),
                (Some(Role::Author), Some(owner)) => {
                    Decision::Filter(ArticleScope::OwnedBy { owner })
                }
                _ => Decision::Deny(AuthzError::InsufficientRole),
            },

            Operation::CreateArticle => match role {
                Some(Role::Admin) | Some(Role::Author) => Decision::Allow,
                _ => Decision::Deny(AuthzError::InsufficientRole),
            },

            Operation::UpdateArticle { owner } | Operation::DeleteArticle { owner } => {
                match (role, caller_id) {
                    (Some(Role::Admin), _) => Decision::Allow,
                    (Some(Role::Author), Some(id)) if id == owner => Decision::Allow,
                    (Some(Role::Author), _) => Decision::Deny(AuthzError::NotOwner),
                    _ => Decision::Deny(AuthzError::InsufficientRole),
                }
            }

            Operation::ReviewArticles
            | Operation::PublishArticle
            | Operation::ListUsers
            | Operation::ReadUser
            | Operation::DeleteUser => match role {
                Some(Role::Admin) => Decision::Allow,
                _ => Decision::Deny(AuthzError::InsufficientRole),
            },

            Operation::UpdateOwnProfile => match caller {
                Some(_) => Decision::Allow,
                None => Decision::Deny(AuthzError::InsufficientRole),
            },
        }
    }

    /// Read visibility for the caller; an absent caller sees what a plain user sees.
    pub fn article_scope(caller: Option<&Identity>) -> ArticleScope {
        match caller {
            Some(Identity {
                role: Role::Admin, ..
            }) => ArticleScope::Unrestricted,
            Some(Identity {
                role: Role::Author,
                user_id,
                ..
            }) => ArticleScope::OwnOrPublished { owner: *user_id },
            _ => ArticleScope::PublishedOnly,
        }
    }
}
