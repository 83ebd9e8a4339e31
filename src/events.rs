use crate::models::{EntityKey, InteractionView, ItemId};
use crate::playback::PlaybackSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    /// The action needs a signed-in viewer
    SignInRequired,
}

/// Transient, non-blocking message for the viewer (a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn sign_in_required(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::SignInRequired,
            message: message.into(),
        }
    }
}

// Event types broadcast to the rendering layer
#[derive(Debug, Clone)]
pub enum FeedEvent {
    FeedLoaded { item_count: usize },
    ActiveItemChanged { index: usize, item_id: ItemId },
    ScrollRequested { index: usize, item_id: ItemId },
    DetailRequested { item_id: ItemId },
    PlaybackChanged(PlaybackSnapshot),
    InteractionChanged { key: EntityKey, view: InteractionView },
    CommentsLoaded { video_id: ItemId, count: usize },
    Notice(Notice),
}

impl FeedEvent {
    // Get the name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::FeedLoaded { .. } => "feedLoaded",
            FeedEvent::ActiveItemChanged { .. } => "activeItemChanged",
            FeedEvent::ScrollRequested { .. } => "scrollRequested",
            FeedEvent::DetailRequested { .. } => "detailRequested",
            FeedEvent::PlaybackChanged(_) => "playbackChanged",
            FeedEvent::InteractionChanged { .. } => "interactionChanged",
            FeedEvent::CommentsLoaded { .. } => "commentsLoaded",
            FeedEvent::Notice(_) => "notice",
        }
    }

    /// If this event is a Notice, returns it
    /// Otherwise returns None
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            FeedEvent::Notice(notice) => Some(notice),
            _ => None,
        }
    }
}
