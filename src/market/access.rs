//! Ownership authorization.
//!
//! Every authenticated principal may read every ad and comment. Mutations
//! are reserved for the resource's author and for admins. Resources whose
//! author is gone can therefore only be changed by an admin.

use crate::db::models::{Ad, Comment};
use crate::error::AppError;
use crate::extractors::CurrentUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Post,
    Comment,
}

impl ResourceKind {
    pub fn denial_message(&self) -> &'static str {
        match self {
            ResourceKind::Post => "you are not the owner or administrator of this post",
            ResourceKind::Comment => "You are not the owner or administrator of this comment",
        }
    }
}

/// A resource with a single, possibly missing, author.
pub trait Owned {
    const KIND: ResourceKind;

    fn author_id(&self) -> Option<i64>;
}

impl Owned for Ad {
    const KIND: ResourceKind = ResourceKind::Post;

    fn author_id(&self) -> Option<i64> {
        self.author
    }
}

impl Owned for Comment {
    const KIND: ResourceKind = ResourceKind::Comment;

    fn author_id(&self) -> Option<i64> {
        self.author
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("Authentication credentials were not provided.")]
    Unauthenticated,

    #[error("{}", .0.denial_message())]
    Forbidden(ResourceKind),
}

impl From<AccessDenied> for AppError {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            AccessDenied::Unauthenticated => AppError::Unauthenticated,
            AccessDenied::Forbidden(kind) => AppError::Forbidden(kind.denial_message().to_string()),
        }
    }
}

/// Pure decision: may `principal` perform `action` on `resource`?
pub fn authorize<R: Owned>(principal: &CurrentUser, action: Action, resource: &R) -> bool {
    match action {
        Action::Read => true,
        Action::Write | Action::Delete => {
            principal.role.is_privileged() || resource.author_id() == Some(principal.id)
        }
    }
}

/// Authentication is checked before ownership, so an anonymous caller is
/// always told to authenticate rather than that it lacks permission.
pub fn ensure_permitted<R: Owned>(
    principal: Option<&CurrentUser>,
    action: Action,
    resource: &R,
) -> Result<(), AccessDenied> {
    let principal = principal.ok_or(AccessDenied::Unauthenticated)?;
    if authorize(principal, action, resource) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = principal.id,
            ?action,
            kind = ?R::KIND,
            "Ownership check denied"
        );
        Err(AccessDenied::Forbidden(R::KIND))
    }
}

/// Comment permission evaluator for nested routes. The comment must belong
/// to the ad named in the path; a mismatch is reported as not found.
pub fn ensure_comment_permitted(
    principal: &CurrentUser,
    action: Action,
    ad_id: i64,
    comment: &Comment,
) -> Result<(), AppError> {
    if comment.ad != ad_id {
        tracing::warn!(
            comment_id = comment.id,
            path_ad_id = ad_id,
            "Comment resolved outside its parent ad"
        );
        return Err(AppError::NotFound);
    }
    ensure_permitted(Some(principal), action, comment)?;
    Ok(())
}

/// Account records: non-admins only ever see themselves. Reads and updates
/// of someone else answer "not found"; deletes answer "forbidden".
pub fn ensure_user_permitted(
    principal: &CurrentUser,
    action: Action,
    target_id: i64,
) -> Result<(), AppError> {
    if principal.id == target_id || principal.role.is_privileged() {
        return Ok(());
    }
    match action {
        Action::Delete => Err(AppError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        )),
        Action::Read | Action::Write => Err(AppError::NotFound),
    }
}
