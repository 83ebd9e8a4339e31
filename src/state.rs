/// Transport state of the single active media slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    /// No item owns the media slot
    Idle,
    /// Start issued, completion pending
    Starting,
    /// Active item is playing
    Playing,
    /// Active item is paused (by the viewer, by a switch, or after a refused start)
    Paused,
}

impl MediaStatus {
    /// Get string representation of the state
    pub fn as_str(self) -> &'static str {
        match self {
            MediaStatus::Idle => "IDLE",
            MediaStatus::Starting => "STARTING",
            MediaStatus::Playing => "PLAYING",
            MediaStatus::Paused => "PAUSED",
        }
    }

    /// True while the transport holds (or is acquiring) the item, i.e. a stop
    /// is owed before anything else may start.
    pub fn is_engaged(self) -> bool {
        matches!(self, MediaStatus::Starting | MediaStatus::Playing)
    }
}

/// Trait for types that have a playback state
pub trait HasPlaybackState {
    /// Get the current playback state
    fn status(&self) -> MediaStatus;

    /// Check if media is currently playing
    fn is_playing(&self) -> bool {
        self.status() == MediaStatus::Playing
    }

    /// Check if media is currently paused
    fn is_paused(&self) -> bool {
        self.status() == MediaStatus::Paused
    }

    /// Check if no item owns the media slot
    fn is_idle(&self) -> bool {
        self.status() == MediaStatus::Idle
    }
}

/// Per-key toggle state held by the interaction store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InteractionRecord {
    /// What the viewer currently sees
    pub optimistic_state: bool,
    /// Last state the server acknowledged; `None` until anything was confirmed
    pub server_confirmed_state: Option<bool>,
    /// Sequence number of the most recently issued request
    pub pending_request_seq: u64,
    /// Displayed count minus `base_count`
    pub counter_delta: i64,
    pub(crate) base_state: bool,
    pub(crate) base_count: u64,
    pub(crate) confirmed_delta: i64,
    pub(crate) settled_seq: u64,
}

impl InteractionRecord {
    pub(crate) fn seeded(state: bool, count: u64) -> Self {
        Self {
            optimistic_state: state,
            server_confirmed_state: Some(state),
            base_state: state,
            base_count: count,
            ..Self::default()
        }
    }

    /// A request has been issued whose outcome has not been applied yet.
    pub fn is_pending(&self) -> bool {
        self.pending_request_seq > self.settled_seq
    }

    pub fn displayed_count(&self) -> u64 {
        let count = self.base_count as i64 + self.counter_delta;
        count.max(0) as u64
    }

    /// State a failed request falls back to.
    pub(crate) fn rollback_state(&self) -> bool {
        self.server_confirmed_state.unwrap_or(self.base_state)
    }
}

/// Progress of a fetch the viewer is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}
