use crate::error::{Error, Result};

/// Resolved identity of the requester, valid for one request. Produced once by
/// [`crate::auth::AuthResolver`] and threaded explicitly through every core
/// call; never persisted, never re-derived mid-pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerContext {
    Anonymous,
    Authenticated(AuthUser),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i32,
    pub username: String,
}

impl ViewerContext {
    pub fn authenticated(user_id: i32, username: impl Into<String>) -> Self {
        ViewerContext::Authenticated(AuthUser {
            user_id,
            username: username.into(),
        })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, ViewerContext::Anonymous)
    }

    pub fn user_id(&self) -> Option<i32> {
        match self {
            ViewerContext::Anonymous => None,
            ViewerContext::Authenticated(user) => Some(user.user_id),
        }
    }

    /// Fails closed for operations that declare authentication required.
    pub fn require(&self) -> Result<&AuthUser> {
        match self {
            ViewerContext::Anonymous => Err(Error::Unauthorized),
            ViewerContext::Authenticated(user) => Ok(user),
        }
    }
}
