use crate::Action;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,
    /// `reason` is kept for server-side logs only and is not part of `Display`.
    #[error("forbidden: cannot {action} {subject}")]
    Forbidden {
        action: Action,
        subject: String,
        reason: Option<String>,
    },
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("malformed rule: {0}")]
    MalformedRule(String),
}

impl AuthzError {
    pub fn forbidden(action: Action, subject: impl Into<String>, reason: Option<String>) -> Self {
        AuthzError::Forbidden {
            action,
            subject: subject.into(),
            reason,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        AuthzError::MalformedRule(message.into())
    }

    /// True for the two caller-facing denial variants.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuthzError::Unauthenticated | AuthzError::Forbidden { .. }
        )
    }
}

pub type AuthzResult<T> = Result<T, AuthzError>;
