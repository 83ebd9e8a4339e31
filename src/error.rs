use std::time::Duration;

use thiserror::Error;

// Basic error handling with thiserror
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("Not authenticated")]
    Unauthenticated, // No credential held when a mutating action was attempted

    #[error("Credential rejected by server (HTTP 401)")]
    TokenExpired,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Playback rejected: {0}")]
    PlaybackRejected(String), // Autoplay policy and similar platform refusals

    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Comment cannot be empty")]
    EmptyComment,

    #[error("Feed session is no longer running")]
    SessionClosed,

    #[error("Task panicked or cancelled")]
    TaskJoinError(#[from] tokio::task::JoinError),
}

/// How a failure is presented to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Absorbed into a state transition, never shown (e.g. autoplay refusal).
    RecoverableSilent,
    /// Reverted or retryable, shown as a transient notice.
    RecoverableNotified,
    /// Blocked before any mutation; the viewer is asked to sign in.
    Gate,
}

impl FeedError {
    /// Classify the error for the rendering layer. Nothing here is fatal to
    /// the session.
    pub fn class(&self) -> ErrorClass {
        match self {
            FeedError::PlaybackRejected(_) | FeedError::MediaUnavailable(_) => {
                ErrorClass::RecoverableSilent
            }
            FeedError::Unauthenticated | FeedError::TokenExpired => ErrorClass::Gate,
            _ => ErrorClass::RecoverableNotified,
        }
    }

    pub(crate) fn is_playback_rejection(&self) -> bool {
        matches!(self, FeedError::PlaybackRejected(_))
    }
}
