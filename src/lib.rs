mod auth;
pub use auth::{Credential, CredentialProvider, SessionCredentials};
mod client;
pub use client::{interaction_route, ApiClient, FeedSource};
mod commands;
pub use commands::{FeedCommand, FeedInput};
mod coordinator;
pub use coordinator::{FeedPlaybackCoordinator, FeedView, Navigator};
mod error;
pub use error::{ErrorClass, FeedError};
mod events;
pub use events::{FeedEvent, Notice, NoticeKind};
mod interaction;
pub use interaction::{InteractionBackend, InteractionStateManager, Resolution, ToggleHandle};
pub mod models;
pub use models::{
    Author, Comment, EntityKey, FeedItem, FeedItemView, InteractionKind, InteractionView, ItemId,
    VisibilityEvent,
};
mod playback;
pub use playback::{MediaTransport, PlaybackController, PlaybackSnapshot, StartOptions};
mod settings;
pub use settings::{Settings, SETTINGS};
mod state;
pub use state::{HasPlaybackState, InteractionRecord, LoadState, MediaStatus};
mod utils;
pub use utils::{caption_hashtags, parse_tags};
mod viewport;
pub use viewport::{ElementHandle, ViewportObserver, VisibilityCallback};

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// The external parties a session talks to.
///
/// The data source, the interaction backend, and the credential holder cover
/// the network side; the transport, view, and navigator cover the rendering side.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn FeedSource>,
    pub backend: Arc<dyn InteractionBackend>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub transport: Arc<dyn MediaTransport>,
    pub view: Arc<dyn FeedView>,
    pub navigator: Arc<dyn Navigator>,
}

impl Collaborators {
    /// Use one REST client as both data source and interaction backend.
    pub fn with_api(
        api: Arc<ApiClient>,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn MediaTransport>,
        view: Arc<dyn FeedView>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            source: api.clone(),
            backend: api,
            credentials,
            transport,
            view,
            navigator,
        }
    }
}

/// Composition root of a vertical video feed.
///
/// Holds the ordered items and wires the viewport observer, the playback
/// coordinator and the interaction store together. Visibility reports from the
/// [`ViewportObserver`] are queued and processed in arrival order before any
/// command issued on the session, so the active item is only ever changed on
/// one logical thread.
///
/// # Logging
///
/// This library uses the `tracing` crate for logging. To see the logs,
/// install a subscriber in your application, e.g. `tracing_subscriber::fmt::init()`.
pub struct FeedSession {
    session_id: Uuid,
    settings: Settings,
    items: Vec<FeedItem>,
    comments: HashMap<ItemId, Vec<Comment>>,
    load_state: LoadState,
    coordinator: FeedPlaybackCoordinator,
    interactions: InteractionStateManager,
    viewport: Arc<ViewportObserver>,
    source: Arc<dyn FeedSource>,
    credentials: Arc<dyn CredentialProvider>,
    event_sender: broadcast::Sender<FeedEvent>,
    input_tx: mpsc::UnboundedSender<FeedInput>,
    input_rx: mpsc::UnboundedReceiver<FeedInput>,
}

impl FeedSession {
    /// Create a session configured from the environment (see [`SETTINGS`]).
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_settings(SETTINGS.clone(), collaborators)
    }

    pub fn with_settings(settings: Settings, collaborators: Collaborators) -> Self {
        let (event_sender, _) = broadcast::channel(settings.event_buffer_capacity.max(1));
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let visibility_tx = input_tx.clone();
        let viewport = Arc::new(ViewportObserver::new(Box::new(move |event| {
            let _ = visibility_tx.send(FeedInput::Visibility(event));
        })));

        let controller = PlaybackController::new(
            collaborators.transport,
            settings.start_muted,
            event_sender.clone(),
        );
        let coordinator = FeedPlaybackCoordinator::new(
            controller,
            collaborators.view,
            collaborators.navigator,
            settings.visibility_threshold,
            event_sender.clone(),
        );
        let interactions = InteractionStateManager::new(
            collaborators.backend,
            collaborators.credentials.clone(),
            settings.interaction_timeout,
            event_sender.clone(),
        );

        let session_id = Uuid::new_v4();
        debug!(%session_id, "Feed session created");

        Self {
            session_id,
            settings,
            items: Vec::new(),
            comments: HashMap::new(),
            load_state: LoadState::Idle,
            coordinator,
            interactions,
            viewport,
            source: collaborators.source,
            credentials: collaborators.credentials,
            event_sender,
            input_tx,
            input_rx,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Threshold the rendering layer should register items with.
    pub fn visibility_threshold(&self) -> f64 {
        self.settings.visibility_threshold
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_sender.subscribe()
    }

    pub fn playback_receiver(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.coordinator.controller().subscribe()
    }

    /// The observer the platform adapter reports intersection ratios to.
    pub fn viewport(&self) -> Arc<ViewportObserver> {
        self.viewport.clone()
    }

    pub fn interactions(&self) -> &InteractionStateManager {
        &self.interactions
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.coordinator.active_index()
    }

    pub fn current_active_item_id(&self) -> Option<&str> {
        self.coordinator.active_item_id()
    }

    pub fn is_playing(&self) -> bool {
        self.coordinator.controller().snapshot().is_playing()
    }

    pub fn is_muted(&self) -> bool {
        self.coordinator.controller().is_muted()
    }

    /// An item with its live like state.
    pub fn item_view(&self, item_id: &str) -> Option<FeedItemView> {
        let item = self.items.iter().find(|item| item.id == item_id)?;
        let view = self.interactions.view(&EntityKey::video_like(&item.id));
        Some(FeedItemView {
            item: item.clone(),
            liked: view.active,
            like_count: view.count,
            is_active: self.coordinator.active_item_id() == Some(item.id.as_str()),
        })
    }

    pub fn comments(&self, video_id: &str) -> &[Comment] {
        self.comments
            .get(video_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn notify(&self, notice: Notice) {
        let _ = self.event_sender.send(FeedEvent::Notice(notice));
    }

    /// Fetch the feed and install it. On failure the previous items stay in
    /// place, a notice is broadcast and the call may simply be repeated.
    pub async fn load_feed(&mut self) -> Result<usize, FeedError> {
        self.process_pending().await;
        self.fetch_and_install().await
    }

    async fn fetch_and_install(&mut self) -> Result<usize, FeedError> {
        self.load_state = LoadState::Loading;
        let items = match self.source.fetch_feed_items().await {
            Ok(items) => items,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Failed to load feed");
                let message = "Failed to load videos. Please try again later.";
                self.load_state = LoadState::Failed(message.to_string());
                self.notify(Notice::error(message));
                return Err(e);
            }
        };

        for item in &items {
            self.interactions.seed(
                &EntityKey::video_like(&item.id),
                item.liked,
                item.like_count,
            );
        }
        self.hydrate_like_status(&items).await;

        let ids = items.iter().map(|item| item.id.clone()).collect();
        self.items = items;
        self.load_state = LoadState::Loaded;
        let item_count = self.items.len();
        info!(session_id = %self.session_id, item_count, "Feed loaded");
        let _ = self.event_sender.send(FeedEvent::FeedLoaded { item_count });

        self.coordinator.set_items(ids).await;
        Ok(item_count)
    }

    // Per-viewer like flags are not part of the feed payload
    async fn hydrate_like_status(&self, items: &[FeedItem]) {
        let Some(credential) = self.credentials.current_credential() else {
            return;
        };
        let checks = items.iter().map(|item| {
            let key = EntityKey::video_like(&item.id);
            let request = self.source.fetch_like_status(&credential, &key);
            async move { (key, request.await) }
        });

        for ((key, result), item) in join_all(checks).await.into_iter().zip(items) {
            match result {
                Ok(Some(liked)) => {
                    self.interactions.seed(&key, liked, item.like_count);
                }
                Ok(None) => {}
                Err(e) => debug!(key = %key, error = %e, "Like status check failed"),
            }
        }
    }

    pub async fn load_comments(&mut self, video_id: &str) -> Result<usize, FeedError> {
        self.process_pending().await;
        match self.source.fetch_comments(video_id).await {
            Ok(comments) => {
                for comment in &comments {
                    self.interactions.seed(
                        &EntityKey::comment_like(&comment.id),
                        comment.liked,
                        comment.like_count,
                    );
                }
                let count = comments.len();
                self.comments.insert(video_id.to_string(), comments);
                let _ = self.event_sender.send(FeedEvent::CommentsLoaded {
                    video_id: video_id.to_string(),
                    count,
                });
                Ok(count)
            }
            Err(e) => {
                warn!(video_id, error = %e, "Failed to load comments");
                self.notify(Notice::error("Failed to load comments"));
                Err(e)
            }
        }
    }

    pub async fn post_comment(&mut self, video_id: &str, content: &str) -> Result<Comment, FeedError> {
        let Some(credential) = self.credentials.current_credential() else {
            self.notify(Notice::sign_in_required("You must be logged in to comment"));
            return Err(FeedError::Unauthenticated);
        };
        let content = content.trim();
        if content.is_empty() {
            self.notify(Notice::error("Comment cannot be empty"));
            return Err(FeedError::EmptyComment);
        }

        match self.source.post_comment(&credential, video_id, content).await {
            Ok(comment) => {
                self.interactions.seed(
                    &EntityKey::comment_like(&comment.id),
                    comment.liked,
                    comment.like_count,
                );
                self.comments
                    .entry(video_id.to_string())
                    .or_default()
                    .insert(0, comment.clone());
                self.notify(Notice::success("Comment posted!"));
                Ok(comment)
            }
            Err(e) => {
                warn!(video_id, error = %e, "Failed to post comment");
                self.notify(Notice::error("Failed to post comment"));
                Err(e)
            }
        }
    }

    /// Apply a visibility report directly, after anything already queued.
    pub async fn handle_visibility(&mut self, event: VisibilityEvent) -> bool {
        self.process_pending().await;
        self.coordinator.handle_visibility(&event).await
    }

    pub async fn next(&mut self) -> bool {
        self.process_pending().await;
        self.coordinator.next()
    }

    pub async fn previous(&mut self) -> bool {
        self.process_pending().await;
        self.coordinator.previous()
    }

    /// Item click: hand the item to the detail view.
    pub async fn open(&mut self, item_id: &str) -> bool {
        self.process_pending().await;
        self.coordinator.open(item_id)
    }

    pub async fn toggle_play_pause(&mut self) -> Option<JoinHandle<MediaStatus>> {
        self.process_pending().await;
        self.coordinator.toggle_play_pause().await
    }

    pub async fn set_muted(&mut self, muted: bool) {
        self.process_pending().await;
        self.coordinator.set_muted(muted);
    }

    pub fn toggle(&self, key: &EntityKey) -> Result<ToggleHandle, FeedError> {
        self.interactions.toggle(key)
    }

    pub fn toggle_video_like(&self, video_id: &str) -> Result<ToggleHandle, FeedError> {
        self.toggle(&EntityKey::video_like(video_id))
    }

    pub fn toggle_follow(&self, user_id: &str) -> Result<ToggleHandle, FeedError> {
        self.toggle(&EntityKey::follow(user_id))
    }

    pub fn toggle_comment_like(&self, comment_id: &str) -> Result<ToggleHandle, FeedError> {
        self.toggle(&EntityKey::comment_like(comment_id))
    }

    /// Install server-reported state, e.g. a profile's follow flag and follower count.
    pub fn seed_interaction(&self, key: &EntityKey, state: bool, count: u64) -> bool {
        self.interactions.seed(key, state, count)
    }

    /// Process every queued input in arrival order. Returns how many were handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(input) = self.input_rx.try_recv() {
            handled += 1;
            if !self.process(input).await {
                break;
            }
        }
        handled
    }

    async fn process(&mut self, input: FeedInput) -> bool {
        match input {
            FeedInput::Visibility(event) => {
                self.coordinator.handle_visibility(&event).await;
            }
            FeedInput::Command(command) => {
                trace!(command = command.name(), "Processing command");
                match command {
                    FeedCommand::Next => {
                        self.coordinator.next();
                    }
                    FeedCommand::Previous => {
                        self.coordinator.previous();
                    }
                    FeedCommand::TogglePlayPause => {
                        let _ = self.coordinator.toggle_play_pause().await;
                    }
                    FeedCommand::SetMuted { muted } => self.coordinator.set_muted(muted),
                    FeedCommand::Open { item_id } => {
                        self.coordinator.open(&item_id);
                    }
                    FeedCommand::Toggle { key } => {
                        // Failures are surfaced to the viewer as notices
                        let _ = self.interactions.toggle(&key);
                    }
                    FeedCommand::Reload => {
                        let _ = self.fetch_and_install().await;
                    }
                    FeedCommand::Shutdown => return false,
                }
            }
        }
        true
    }

    /// Move the session onto its own task. All further input goes through the
    /// returned handle (and the viewport observer) and is processed in order.
    pub fn spawn(self) -> FeedSessionHandle {
        let session_id = self.session_id;
        let input_tx = self.input_tx.clone();
        let event_sender = self.event_sender.clone();
        let playback = self.coordinator.controller().subscribe();
        let interactions = self.interactions.clone();
        let viewport = self.viewport.clone();

        let task = tokio::spawn(self.run());
        FeedSessionHandle {
            session_id,
            input_tx,
            event_sender,
            playback,
            interactions,
            viewport,
            task: Arc::new(AsyncMutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        info!(session_id = %self.session_id, "Feed session loop started");
        while let Some(input) = self.input_rx.recv().await {
            if !self.process(input).await {
                break;
            }
        }
        self.coordinator.shutdown().await;
        info!(session_id = %self.session_id, "Feed session loop finished");
    }
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession")
            .field("session_id", &self.session_id)
            .field("items", &self.items.len())
            .field("active_index", &self.coordinator.active_index())
            .field("load_state", &self.load_state)
            .finish()
    }
}

/// Cloneable front of a spawned [`FeedSession`].
#[derive(Clone)]
pub struct FeedSessionHandle {
    session_id: Uuid,
    input_tx: mpsc::UnboundedSender<FeedInput>,
    event_sender: broadcast::Sender<FeedEvent>,
    playback: watch::Receiver<PlaybackSnapshot>,
    interactions: InteractionStateManager,
    viewport: Arc<ViewportObserver>,
    task: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
}

impl FeedSessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn send(&self, command: FeedCommand) -> Result<(), FeedError> {
        self.input_tx
            .send(FeedInput::Command(command))
            .map_err(|_| FeedError::SessionClosed)
    }

    pub fn next(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Next)
    }

    pub fn previous(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Previous)
    }

    pub fn toggle_play_pause(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::TogglePlayPause)
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), FeedError> {
        self.send(FeedCommand::SetMuted { muted })
    }

    pub fn open(&self, item_id: &str) -> Result<(), FeedError> {
        self.send(FeedCommand::Open {
            item_id: item_id.to_string(),
        })
    }

    pub fn toggle(&self, key: &EntityKey) -> Result<(), FeedError> {
        self.send(FeedCommand::Toggle { key: key.clone() })
    }

    pub fn reload(&self) -> Result<(), FeedError> {
        self.send(FeedCommand::Reload)
    }

    pub fn viewport(&self) -> Arc<ViewportObserver> {
        self.viewport.clone()
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_sender.subscribe()
    }

    pub fn playback_receiver(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.playback.clone()
    }

    pub fn playback(&self) -> PlaybackSnapshot {
        self.playback.borrow().clone()
    }

    pub fn current_active_item_id(&self) -> Option<ItemId> {
        self.playback().active_item_id
    }

    pub fn is_playing(&self) -> bool {
        self.playback().is_playing()
    }

    pub fn is_muted(&self) -> bool {
        self.playback().muted
    }

    pub fn interaction(&self, key: &EntityKey) -> InteractionView {
        self.interactions.view(key)
    }

    /// Stop the session loop and wait for it to release playback.
    pub async fn shutdown(&self) -> Result<(), FeedError> {
        // The loop may already be gone; that is fine
        let _ = self.send(FeedCommand::Shutdown);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await?;
        }
        Ok(())
    }
}
