#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

use reel_feed::{
    Author, Collaborators, Comment, Credential, EntityKey, FeedError, FeedEvent, FeedItem,
    FeedSession, FeedSource, FeedView, InteractionBackend, MediaTransport, Navigator, Notice,
    SessionCredentials, Settings, StartOptions,
};

pub fn author(id: &str) -> Author {
    Author {
        id: id.to_string(),
        username: format!("user_{}", id),
        avatar: None,
        followers: None,
    }
}

pub fn item(id: &str) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        video_url: format!("/uploads/{}.mp4", id),
        user: author("creator"),
        caption: String::new(),
        tags: Vec::new(),
        like_count: 0,
        comment_count: 0,
        sound: None,
        created_at: None,
        liked: false,
    }
}

pub fn items(ids: &[&str]) -> Vec<FeedItem> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn comment(id: &str, content: &str) -> Comment {
    Comment {
        id: id.to_string(),
        content: content.to_string(),
        user: author("commenter"),
        like_count: 0,
        liked: false,
        created_at: None,
    }
}

pub fn test_settings() -> Settings {
    Settings {
        visibility_threshold: 0.7,
        interaction_timeout: Duration::from_secs(10),
        request_timeout: Duration::from_secs(10),
        event_buffer_capacity: 256,
        api_base_url: "http://localhost:5000".to_string(),
        start_muted: true,
    }
}

/// Let spawned settle/reconcile tasks run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn drain_events(rx: &mut broadcast::Receiver<FeedEvent>) -> Vec<FeedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn notices(rx: &mut broadcast::Receiver<FeedEvent>) -> Vec<Notice> {
    drain_events(rx)
        .iter()
        .filter_map(|event| event.notice().cloned())
        .collect()
}

// Media transport that logs every command and checks the single-slot rule at call time
#[derive(Default)]
pub struct RecordingTransport {
    log: Mutex<Vec<String>>,
    engaged: Mutex<HashSet<String>>,
    max_engaged: AtomicUsize,
    reject_unmuted: AtomicBool,
    fail_all: AtomicBool,
    delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse unmuted starts the way an autoplay policy does.
    pub fn reject_unmuted(&self) {
        self.reject_unmuted.store(true, Ordering::SeqCst);
    }

    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// Make starts of `item_id` complete only after `delay`.
    pub fn delay_start(&self, item_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(item_id.to_string(), delay);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn engaged(&self) -> HashSet<String> {
        self.engaged.lock().unwrap().clone()
    }

    pub fn max_engaged(&self) -> usize {
        self.max_engaged.load(Ordering::SeqCst)
    }
}

impl MediaTransport for RecordingTransport {
    fn start(&self, item_id: &str, options: StartOptions) -> BoxFuture<'static, Result<(), FeedError>> {
        self.log.lock().unwrap().push(format!(
            "start:{}:{}",
            item_id,
            if options.muted { "muted" } else { "sound" }
        ));

        let refused = self.fail_all.load(Ordering::SeqCst)
            || (self.reject_unmuted.load(Ordering::SeqCst) && !options.muted);
        if !refused {
            let mut engaged = self.engaged.lock().unwrap();
            engaged.insert(item_id.to_string());
            self.max_engaged.fetch_max(engaged.len(), Ordering::SeqCst);
        }

        let delay = self.delays.lock().unwrap().get(item_id).copied();
        let item_id = item_id.to_string();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if refused {
                Err(FeedError::PlaybackRejected(format!("autoplay blocked for {}", item_id)))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn stop(&self, item_id: &str) -> BoxFuture<'static, ()> {
        self.log.lock().unwrap().push(format!("stop:{}", item_id));
        self.engaged.lock().unwrap().remove(item_id);
        async {}.boxed()
    }

    fn set_muted(&self, item_id: &str, muted: bool) {
        self.log
            .lock()
            .unwrap()
            .push(format!("mute:{}:{}", item_id, muted));
    }
}

// Backend whose responses are released by the test, in any order
#[derive(Default)]
pub struct ScriptedBackend {
    calls: Mutex<Vec<(EntityKey, bool)>>,
    pending: Mutex<Vec<Option<oneshot::Sender<Result<(), FeedError>>>>>,
    manual: bool,
    fail: bool,
}

impl ScriptedBackend {
    /// Every request succeeds immediately.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Every request fails immediately.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Requests stay in flight until [`respond`](Self::respond) is called.
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(EntityKey, bool)> {
        self.calls.lock().unwrap().clone()
    }

    /// Release the response of the `index`-th request (zero based).
    pub fn respond(&self, index: usize, result: Result<(), FeedError>) {
        let sender = self.pending.lock().unwrap()[index].take();
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }
}

impl InteractionBackend for ScriptedBackend {
    fn set_like_state(
        &self,
        _credential: &Credential,
        key: &EntityKey,
        desired: bool,
    ) -> BoxFuture<'static, Result<(), FeedError>> {
        self.calls.lock().unwrap().push((key.clone(), desired));
        if !self.manual {
            let fail = self.fail;
            return async move {
                if fail {
                    Err(FeedError::InvalidResponse("500 Internal Server Error".to_string()))
                } else {
                    Ok(())
                }
            }
            .boxed();
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(Some(tx));
        async move {
            match rx.await {
                Ok(result) => result,
                // Never answered; only the timeout can end this request
                Err(_) => futures::future::pending().await,
            }
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct MockSource {
    pub items: Mutex<Vec<FeedItem>>,
    pub comments: Mutex<HashMap<String, Vec<Comment>>>,
    pub like_status: Mutex<HashMap<String, bool>>,
    pub fail_feed: AtomicBool,
    pub fail_comments: AtomicBool,
    pub feed_calls: AtomicUsize,
    pub posted: Mutex<Vec<(String, String)>>,
}

impl MockSource {
    pub fn with_items(items: Vec<FeedItem>) -> Self {
        let source = Self::default();
        *source.items.lock().unwrap() = items;
        source
    }
}

impl FeedSource for MockSource {
    fn fetch_feed_items(&self) -> BoxFuture<'static, Result<Vec<FeedItem>, FeedError>> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_feed.load(Ordering::SeqCst) {
            Err(FeedError::InvalidResponse("503 Service Unavailable".to_string()))
        } else {
            Ok(self.items.lock().unwrap().clone())
        };
        async move { result }.boxed()
    }

    fn fetch_comments(&self, video_id: &str) -> BoxFuture<'static, Result<Vec<Comment>, FeedError>> {
        let result = if self.fail_comments.load(Ordering::SeqCst) {
            Err(FeedError::InvalidResponse("500 Internal Server Error".to_string()))
        } else {
            Ok(self
                .comments
                .lock()
                .unwrap()
                .get(video_id)
                .cloned()
                .unwrap_or_default())
        };
        async move { result }.boxed()
    }

    fn fetch_like_status(
        &self,
        _credential: &Credential,
        key: &EntityKey,
    ) -> BoxFuture<'static, Result<Option<bool>, FeedError>> {
        let status = self.like_status.lock().unwrap().get(&key.entity_id).copied();
        async move { Ok(status) }.boxed()
    }

    fn post_comment(
        &self,
        _credential: &Credential,
        video_id: &str,
        content: &str,
    ) -> BoxFuture<'static, Result<Comment, FeedError>> {
        let mut posted = self.posted.lock().unwrap();
        posted.push((video_id.to_string(), content.to_string()));
        let created = comment(&format!("c{}", posted.len()), content);
        async move { Ok(created) }.boxed()
    }
}

#[derive(Default)]
pub struct RecordingView {
    pub scrolls: Mutex<Vec<(usize, String)>>,
}

impl FeedView for RecordingView {
    fn scroll_into_view(&self, index: usize, item_id: &str) {
        self.scrolls
            .lock()
            .unwrap()
            .push((index, item_id.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub opened: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn open_detail(&self, item_id: &str) {
        self.opened.lock().unwrap().push(item_id.to_string());
    }
}

pub struct Harness {
    pub session: FeedSession,
    pub source: Arc<MockSource>,
    pub backend: Arc<ScriptedBackend>,
    pub credentials: Arc<SessionCredentials>,
    pub transport: Arc<RecordingTransport>,
    pub view: Arc<RecordingView>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub fn new(feed: Vec<FeedItem>, backend: ScriptedBackend, signed_in: bool) -> Self {
        Self::with_settings(feed, backend, signed_in, test_settings())
    }

    pub fn with_settings(
        feed: Vec<FeedItem>,
        backend: ScriptedBackend,
        signed_in: bool,
        settings: Settings,
    ) -> Self {
        let source = Arc::new(MockSource::with_items(feed));
        let backend = Arc::new(backend);
        let credentials = Arc::new(if signed_in {
            SessionCredentials::with_credential(Credential::new("test-token"))
        } else {
            SessionCredentials::new()
        });
        let transport = Arc::new(RecordingTransport::new());
        let view = Arc::new(RecordingView::default());
        let navigator = Arc::new(RecordingNavigator::default());

        let session = FeedSession::with_settings(
            settings,
            Collaborators {
                source: source.clone(),
                backend: backend.clone(),
                credentials: credentials.clone(),
                transport: transport.clone(),
                view: view.clone(),
                navigator: navigator.clone(),
            },
        );

        Self {
            session,
            source,
            backend,
            credentials,
            transport,
            view,
            navigator,
        }
    }

    /// Register every loaded item with the viewport at the session threshold.
    pub fn observe_all(&self) {
        let viewport = self.session.viewport();
        let threshold = self.session.visibility_threshold();
        for (i, item) in self.session.items().iter().enumerate() {
            viewport.observe(&item.id, reel_feed::ElementHandle(i as u64), threshold);
        }
    }
}
