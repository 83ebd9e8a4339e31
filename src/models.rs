use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::utils::deserialize_tags;

/// Opaque identity of a feed item, as issued by the backend.
pub type ItemId = String;

// Author reference embedded in videos and comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub followers: Option<u64>,
}

/// One entry of the vertical feed.
///
/// Everything but `like_count` and `liked` is immutable once loaded; those two
/// only describe the state the backend reported and are superseded by the
/// interaction store for display purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub video_url: String,
    pub user: Author,
    #[serde(default)]
    pub caption: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default, rename = "likes")]
    pub like_count: u64,
    #[serde(default, rename = "comments")]
    pub comment_count: u64,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub liked: bool,
}

impl FeedItem {
    /// Absolute media locator, resolving backend-relative paths against `base_url`.
    pub fn media_url(&self, base_url: &str) -> String {
        if self.video_url.starts_with("http://") || self.video_url.starts_with("https://") {
            self.video_url.clone()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), self.video_url)
        }
    }

    /// Path of the detail view for this item.
    pub fn detail_path(&self) -> String {
        format!("/video/{}", self.id)
    }

    /// Public link to the detail view, as handed to the share sheet or clipboard.
    pub fn share_url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.detail_path())
    }

    /// Declared tags followed by any `#hashtags` in the caption, without duplicates.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        for tag in crate::utils::caption_hashtags(&self.caption) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub user: Author,
    #[serde(default, rename = "likes")]
    pub like_count: u64,
    #[serde(default, rename = "isLiked")]
    pub liked: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LikeStatusResponse {
    pub liked: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FollowStatusResponse {
    pub is_following: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    VideoLike,
    Follow,
    CommentLike,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::VideoLike => "videoLike",
            InteractionKind::Follow => "follow",
            InteractionKind::CommentLike => "commentLike",
        }
    }

    /// Message shown when the action is attempted without a credential.
    pub fn sign_in_prompt(self) -> &'static str {
        match self {
            InteractionKind::VideoLike => "You must be logged in to like videos",
            InteractionKind::Follow => "You must be logged in to follow users",
            InteractionKind::CommentLike => "You must be logged in to like comments",
        }
    }
}

/// Key of one interaction record: which entity, and which toggle on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: InteractionKind,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(kind: InteractionKind, entity_id: &str) -> Self {
        Self {
            kind,
            entity_id: entity_id.to_string(),
        }
    }

    pub fn video_like(video_id: &str) -> Self {
        Self::new(InteractionKind::VideoLike, video_id)
    }

    pub fn follow(user_id: &str) -> Self {
        Self::new(InteractionKind::Follow, user_id)
    }

    pub fn comment_like(comment_id: &str) -> Self {
        Self::new(InteractionKind::CommentLike, comment_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.entity_id)
    }
}

/// A rendered item crossed the visibility threshold in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityEvent {
    pub item_id: ItemId,
    pub ratio_visible: f64,
    pub timestamp: Instant,
}

impl VisibilityEvent {
    pub fn new(item_id: &str, ratio_visible: f64) -> Self {
        Self {
            item_id: item_id.to_string(),
            ratio_visible: ratio_visible.clamp(0.0, 1.0),
            timestamp: Instant::now(),
        }
    }
}

/// Read model for one toggle as the rendering layer should draw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionView {
    pub active: bool,
    pub count: u64,
    pub pending: bool,
}

/// Read model for one feed item: the immutable record plus its live like state.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItemView {
    pub item: FeedItem,
    pub liked: bool,
    pub like_count: u64,
    pub is_active: bool,
}
