use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::FeedError;
use crate::events::FeedEvent;
use crate::models::ItemId;
use crate::state::{HasPlaybackState, MediaStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// First activation of the item in this session; start at zero
    pub from_beginning: bool,
    pub muted: bool,
}

/// The platform's media element(s). `start` may be refused (autoplay policy)
/// by resolving to [`FeedError::PlaybackRejected`].
///
/// Calling `start`/`stop` issues the command; the returned future reports its
/// completion. Implementations must record the command at call time.
pub trait MediaTransport: Send + Sync {
    fn start(
        &self,
        item_id: &str,
        options: StartOptions,
    ) -> BoxFuture<'static, Result<(), FeedError>>;
    fn stop(&self, item_id: &str) -> BoxFuture<'static, ()>;
    fn set_muted(&self, item_id: &str, muted: bool);
}

/// What the rendering layer needs to draw the transport controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub active_item_id: Option<ItemId>,
    pub status: MediaStatus,
    pub muted: bool,
}

impl HasPlaybackState for PlaybackSnapshot {
    fn status(&self) -> MediaStatus {
        self.status
    }
}

struct ControllerState {
    active: Option<ItemId>,
    status: MediaStatus,
    muted: bool,
    // Bumped on every ownership change; a start completing under an older
    // generation no longer owns the media slot.
    generation: u64,
    started: HashSet<ItemId>,
}

impl ControllerState {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            active_item_id: self.active.clone(),
            status: self.status,
            muted: self.muted,
        }
    }
}

/// Owner of the single active media slot.
///
/// At most one item is ever engaged with the transport: a switch awaits the
/// stop of the previous item before the next start is issued.
#[derive(Clone)]
pub struct PlaybackController {
    state: Arc<Mutex<ControllerState>>,
    transport: Arc<dyn MediaTransport>,
    snapshot_tx: Arc<watch::Sender<PlaybackSnapshot>>,
    event_sender: broadcast::Sender<FeedEvent>,
}

impl PlaybackController {
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        start_muted: bool,
        event_sender: broadcast::Sender<FeedEvent>,
    ) -> Self {
        let state = ControllerState {
            active: None,
            status: MediaStatus::Idle,
            muted: start_muted,
            generation: 0,
            started: HashSet::new(),
        };
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        Self {
            state: Arc::new(Mutex::new(state)),
            transport,
            snapshot_tx: Arc::new(snapshot_tx),
            event_sender,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &ControllerState) {
        let snapshot = state.snapshot();
        let changed = self.snapshot_tx.send_if_modified(|prev| {
            if *prev != snapshot {
                *prev = snapshot.clone();
                true
            } else {
                false
            }
        });
        if changed {
            let _ = self.event_sender.send(FeedEvent::PlaybackChanged(snapshot));
        }
    }

    /// Get a channel that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.lock_state().snapshot()
    }

    pub fn active_item_id(&self) -> Option<ItemId> {
        self.lock_state().active.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.lock_state().muted
    }

    pub fn is_item_playing(&self, item_id: &str) -> bool {
        let state = self.lock_state();
        state.active.as_deref() == Some(item_id) && state.status == MediaStatus::Playing
    }

    /// Make `item_id` the playing item. The previous item, if still engaged, is
    /// stopped first. Returns the task that settles the start, or `None` when
    /// the item already owns the slot.
    pub async fn activate(&self, item_id: &str) -> Option<JoinHandle<MediaStatus>> {
        let previous = {
            let mut state = self.lock_state();
            if state.active.as_deref() == Some(item_id) && state.status.is_engaged() {
                trace!(item_id, "Item already owns the media slot");
                return None;
            }
            state.generation += 1;
            match state.active.as_deref() {
                Some(prev) if prev != item_id && state.status.is_engaged() => {
                    Some(prev.to_string())
                }
                _ => None,
            }
        };

        if let Some(previous) = previous {
            debug!(from = %previous, to = item_id, "Stopping previous item before switch");
            self.transport.stop(&previous).await;
        }

        Some(self.issue_start(item_id))
    }

    /// Pause `item_id` if it is the engaged item. Ownership of the slot is kept.
    pub async fn deactivate(&self, item_id: &str) -> bool {
        {
            let mut state = self.lock_state();
            if state.active.as_deref() != Some(item_id) || !state.status.is_engaged() {
                return false;
            }
            state.generation += 1;
            state.status = MediaStatus::Paused;
            self.publish(&state);
        }
        self.transport.stop(item_id).await;
        true
    }

    /// Pause or resume the active item. Does nothing when no item is active.
    pub async fn toggle_play_pause(&self) -> Option<JoinHandle<MediaStatus>> {
        let (item_id, engaged) = {
            let state = self.lock_state();
            (state.active.clone()?, state.status.is_engaged())
        };
        if engaged {
            self.deactivate(&item_id).await;
            None
        } else {
            Some(self.issue_start(&item_id))
        }
    }

    pub fn set_muted(&self, muted: bool) {
        let mut state = self.lock_state();
        if state.muted == muted {
            return;
        }
        state.muted = muted;
        if let Some(active) = state.active.as_deref() {
            self.transport.set_muted(active, muted);
        }
        self.publish(&state);
    }

    /// Give up the media slot entirely (e.g. the feed became empty).
    pub async fn release(&self) {
        let previous = {
            let mut state = self.lock_state();
            state.generation += 1;
            let previous = if state.status.is_engaged() {
                state.active.clone()
            } else {
                None
            };
            state.active = None;
            state.status = MediaStatus::Idle;
            self.publish(&state);
            previous
        };
        if let Some(previous) = previous {
            self.transport.stop(&previous).await;
        }
    }

    fn issue_start(&self, item_id: &str) -> JoinHandle<MediaStatus> {
        let (generation, start) = {
            let mut state = self.lock_state();
            state.generation += 1;
            let options = StartOptions {
                from_beginning: state.started.insert(item_id.to_string()),
                muted: state.muted,
            };
            state.active = Some(item_id.to_string());
            state.status = MediaStatus::Starting;
            self.publish(&state);
            trace!(item_id, ?options, "Issuing start");
            (state.generation, self.transport.start(item_id, options))
        };

        let controller = self.clone();
        let item_id = item_id.to_string();
        tokio::spawn(async move { controller.settle_start(item_id, generation, start).await })
    }

    async fn settle_start(
        self,
        item_id: ItemId,
        mut generation: u64,
        start: BoxFuture<'static, Result<(), FeedError>>,
    ) -> MediaStatus {
        let mut result = start.await;
        let mut retried = false;

        loop {
            let step = {
                let mut state = self.lock_state();
                if state.generation != generation {
                    // Another switch or pause happened while this start was in flight
                    let still_engaged = state.active.as_deref() == Some(item_id.as_str())
                        && state.status.is_engaged();
                    if result.is_ok() && !still_engaged {
                        SettleStep::StopStale
                    } else {
                        SettleStep::Done(MediaStatus::Paused)
                    }
                } else {
                    match &result {
                        Ok(()) => {
                            state.status = MediaStatus::Playing;
                            self.publish(&state);
                            info!(item_id = %item_id, muted = state.muted, "Playback started");
                            SettleStep::Done(MediaStatus::Playing)
                        }
                        Err(e) if e.is_playback_rejection() && !state.muted && !retried => {
                            debug!(item_id = %item_id, error = %e, "Start refused, retrying muted");
                            state.muted = true;
                            state.generation += 1;
                            generation = state.generation;
                            self.publish(&state);
                            SettleStep::Retry(self.transport.start(
                                &item_id,
                                StartOptions {
                                    from_beginning: false,
                                    muted: true,
                                },
                            ))
                        }
                        Err(e) => {
                            // Recoverable: leave the item paused, nothing to surface
                            debug!(item_id = %item_id, error = %e, "Start failed, leaving item paused");
                            state.status = MediaStatus::Paused;
                            self.publish(&state);
                            SettleStep::Done(MediaStatus::Paused)
                        }
                    }
                }
            };

            match step {
                SettleStep::Done(status) => return status,
                SettleStep::Retry(retry) => {
                    retried = true;
                    result = retry.await;
                }
                SettleStep::StopStale => {
                    trace!(item_id = %item_id, "Stopping item whose start completed after a switch");
                    self.transport.stop(&item_id).await;
                    return MediaStatus::Paused;
                }
            }
        }
    }
}

enum SettleStep {
    Done(MediaStatus),
    Retry(BoxFuture<'static, Result<(), FeedError>>),
    StopStale,
}
