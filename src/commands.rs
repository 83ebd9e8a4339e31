use crate::models::{EntityKey, ItemId, VisibilityEvent};

// Commands queued into a running session
#[derive(Debug, Clone)]
pub enum FeedCommand {
    Next,
    Previous,
    TogglePlayPause,
    SetMuted { muted: bool },
    Open { item_id: ItemId },
    Toggle { key: EntityKey },
    Reload,
    Shutdown,
}

impl FeedCommand {
    pub fn name(&self) -> &'static str {
        match self {
            FeedCommand::Next => "next",
            FeedCommand::Previous => "previous",
            FeedCommand::TogglePlayPause => "togglePlayPause",
            FeedCommand::SetMuted { .. } => "setMuted",
            FeedCommand::Open { .. } => "open",
            FeedCommand::Toggle { .. } => "toggle",
            FeedCommand::Reload => "reload",
            FeedCommand::Shutdown => "shutdown",
        }
    }
}

/// Everything the session processes, in one arrival-ordered queue.
#[derive(Debug, Clone)]
pub enum FeedInput {
    Visibility(VisibilityEvent),
    Command(FeedCommand),
}
