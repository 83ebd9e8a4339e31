use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::events::FeedEvent;
use crate::models::{ItemId, VisibilityEvent};
use crate::playback::PlaybackController;
use crate::state::MediaStatus;

/// The scrolling surface that renders the feed.
pub trait FeedView: Send + Sync {
    /// Bring the item at `index` into the viewport. Activation follows from the
    /// visibility report this produces, not from the request itself.
    fn scroll_into_view(&self, index: usize, item_id: &str);
}

/// Receives "open the detail view for this item" intents.
pub trait Navigator: Send + Sync {
    fn open_detail(&self, item_id: &str);
}

/// Single authority over which feed item is active.
///
/// `active_index` only moves when a visibility report for another item reaches
/// the threshold (or on (re)load). Keyboard navigation merely asks the view to
/// scroll; the resulting visibility report does the switch.
pub struct FeedPlaybackCoordinator {
    items: Vec<ItemId>,
    active_index: Option<usize>,
    // Where keyboard navigation is heading while the scroll is in progress
    navigation_target: Option<usize>,
    threshold: f64,
    controller: PlaybackController,
    view: Arc<dyn FeedView>,
    navigator: Arc<dyn Navigator>,
    event_sender: broadcast::Sender<FeedEvent>,
}

impl FeedPlaybackCoordinator {
    pub fn new(
        controller: PlaybackController,
        view: Arc<dyn FeedView>,
        navigator: Arc<dyn Navigator>,
        threshold: f64,
        event_sender: broadcast::Sender<FeedEvent>,
    ) -> Self {
        Self {
            items: Vec::new(),
            active_index: None,
            navigation_target: None,
            threshold,
            controller,
            view,
            navigator,
            event_sender,
        }
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn active_item_id(&self) -> Option<&str> {
        self.active_index
            .and_then(|i| self.items.get(i))
            .map(String::as_str)
    }

    pub fn navigation_target(&self) -> Option<usize> {
        self.navigation_target
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|id| id == item_id)
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    /// Replace the ordered item list. The active item survives by id when it
    /// is still present; otherwise the first item becomes active. An empty
    /// list leaves nothing active and the media slot idle.
    pub async fn set_items(&mut self, items: Vec<ItemId>) {
        let previous_active = self.active_item_id().map(str::to_string);
        self.items = items;
        self.navigation_target = None;

        if self.items.is_empty() {
            info!("Feed is empty, releasing playback");
            self.active_index = None;
            self.controller.release().await;
            return;
        }

        match previous_active.as_deref().and_then(|id| self.index_of(id)) {
            // Same item stays active; a paused or playing slot is left as it is
            Some(index) => self.move_active(index),
            None => {
                // The old index may point at a different item now
                self.active_index = None;
                self.set_active(0).await;
            }
        }
    }

    /// Apply one visibility report. Returns true if the active item changed.
    ///
    /// When several items cross in the same batch the last report wins, which
    /// matches where scrolling settles.
    pub async fn handle_visibility(&mut self, event: &VisibilityEvent) -> bool {
        let Some(index) = self.index_of(&event.item_id) else {
            trace!(item_id = %event.item_id, "Visibility report for unknown item");
            return false;
        };
        if event.ratio_visible < self.threshold {
            trace!(index, ratio = event.ratio_visible, "Item fell below threshold");
            return false;
        }
        if self.active_index == Some(index) {
            if self.navigation_target == Some(index) {
                self.navigation_target = None;
            }
            return false;
        }

        debug!(
            from = ?self.active_index,
            to = index,
            ratio = event.ratio_visible,
            "Visibility switch"
        );
        self.set_active(index).await;
        true
    }

    /// Request a scroll to the following item. No-op at the end of the feed.
    pub fn next(&mut self) -> bool {
        self.step(true)
    }

    /// Request a scroll to the preceding item. No-op at the start of the feed.
    pub fn previous(&mut self) -> bool {
        self.step(false)
    }

    /// Forward a click on an item to the detail view. Never changes the
    /// active item.
    pub fn open(&self, item_id: &str) -> bool {
        if self.index_of(item_id).is_none() {
            return false;
        }
        self.navigator.open_detail(item_id);
        let _ = self.event_sender.send(FeedEvent::DetailRequested {
            item_id: item_id.to_string(),
        });
        true
    }

    pub async fn toggle_play_pause(&self) -> Option<JoinHandle<MediaStatus>> {
        self.controller.toggle_play_pause().await
    }

    pub fn set_muted(&self, muted: bool) {
        self.controller.set_muted(muted);
    }

    fn step(&mut self, forward: bool) -> bool {
        let Some(from) = self.navigation_target.or(self.active_index) else {
            return false;
        };
        let to = if forward {
            from + 1
        } else if from > 0 {
            from - 1
        } else {
            return false;
        };
        let Some(item_id) = self.items.get(to) else {
            return false;
        };

        trace!(from, to, "Navigation requested");
        self.navigation_target = Some(to);
        self.view.scroll_into_view(to, item_id);
        let _ = self.event_sender.send(FeedEvent::ScrollRequested {
            index: to,
            item_id: item_id.clone(),
        });
        true
    }

    /// Drop every item and give up the media slot. Used when the session ends.
    pub async fn shutdown(&mut self) {
        debug!(items = self.items.len(), "Coordinator shutting down");
        self.set_items(Vec::new()).await;
    }

    fn move_active(&mut self, index: usize) {
        self.navigation_target = None;
        if self.active_index != Some(index) {
            self.active_index = Some(index);
            let _ = self.event_sender.send(FeedEvent::ActiveItemChanged {
                index,
                item_id: self.items[index].clone(),
            });
        }
    }

    async fn set_active(&mut self, index: usize) {
        let item_id = self.items[index].clone();
        self.move_active(index);
        // The settle task runs on its own; state is observable via the controller
        let _ = self.controller.activate(&item_id).await;
    }
}
