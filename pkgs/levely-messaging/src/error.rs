//! Error types for messaging operations

use levely_store::StoreError;
use thiserror::Error;

use crate::channel::ChannelState;

/// Errors that can occur in messaging operations
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A message is already being sent")]
    SendInFlight,
    #[error("An image is already being uploaded")]
    UploadInFlight,
    #[error("Channel is not ready: {0:?}")]
    NotReady(ChannelState),
    #[error("File is too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },
    #[error("File type not allowed: {0}")]
    InvalidFileType(String),
    #[error("Video is too long: {duration}s (max {max}s)")]
    VideoTooLong { duration: u32, max: u32 },
    #[error("Only the sender can delete this message")]
    NotSender,
    #[error("Deletion was not confirmed")]
    DeleteCancelled,
    #[error("XP amount must be positive")]
    InvalidXpAmount,
    #[error("User {0} is not part of this conversation")]
    NotParticipant(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

impl MessagingError {
    /// Errors caught before any backend call. These are shown inline and are
    /// not logged as failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MessagingError::EmptyMessage
                | MessagingError::FileTooLarge { .. }
                | MessagingError::InvalidFileType(_)
                | MessagingError::VideoTooLong { .. }
                | MessagingError::InvalidXpAmount
        )
    }

    /// Machine-readable code for UI mapping
    pub fn code(&self) -> Option<&'static str> {
        match self {
            MessagingError::EmptyMessage => Some("EMPTY_MESSAGE"),
            MessagingError::FileTooLarge { .. } => Some("FILE_TOO_LARGE"),
            MessagingError::InvalidFileType(_) => Some("INVALID_FILE_TYPE"),
            MessagingError::VideoTooLong { .. } => Some("VIDEO_TOO_LONG"),
            MessagingError::SendInFlight | MessagingError::UploadInFlight => Some("BUSY"),
            MessagingError::NotSender | MessagingError::NotParticipant(_) => Some("FORBIDDEN"),
            MessagingError::Store(e) => e.code(),
            _ => None,
        }
    }
}
