//! Error types for store operations

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Errors returned by the store client
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Message not found: {0}")]
    MessageNotFound(String),
    #[error("User {user} is not a participant of conversation {conversation}")]
    NotParticipant { conversation: String, user: String },
    #[error("User {user} did not send message {message}")]
    NotSender { message: String, user: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Object already exists: {bucket}/{path}")]
    ObjectExists { bucket: String, path: String },
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Machine-readable code, when the error has one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            StoreError::Database(_) if self.is_unique_violation() => Some("UNIQUE_VIOLATION"),
            StoreError::Database(_) => None,
            StoreError::ConversationNotFound(_) | StoreError::MessageNotFound(_) => {
                Some("NOT_FOUND")
            }
            StoreError::NotParticipant { .. } | StoreError::NotSender { .. } => {
                Some("FORBIDDEN")
            }
            StoreError::InvalidRequest(_) => Some("INVALID_REQUEST"),
            StoreError::ObjectExists { .. } => Some("DUPLICATE"),
            StoreError::Storage(_) => Some("STORAGE_ERROR"),
        }
    }

    /// Whether this is a unique/primary-key constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(e) => is_unique_violation(e),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ConversationNotFound(_) | StoreError::MessageNotFound(_)
        )
    }
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("UNIQUE constraint failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            StoreError::MessageNotFound("m1".into()).code(),
            Some("NOT_FOUND")
        );
        assert_eq!(
            StoreError::NotSender {
                message: "m1".into(),
                user: "u2".into()
            }
            .code(),
            Some("FORBIDDEN")
        );
        assert_eq!(
            StoreError::Database(DbErr::Custom("boom".into())).code(),
            None
        );
    }

    #[test]
    fn test_unique_violation_from_message() {
        let err = DbErr::Custom("UNIQUE constraint failed: messages.id".into());
        assert!(StoreError::Database(err).is_unique_violation());
        assert!(!StoreError::InvalidRequest("x".into()).is_unique_violation());
    }
}
