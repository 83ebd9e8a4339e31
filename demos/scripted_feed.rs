use futures::future::{BoxFuture, FutureExt};
use std::error::Error;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use reel_feed::{
    ApiClient, Author, Collaborators, Comment, Credential, EntityKey, FeedError, FeedEvent,
    FeedItem, FeedSession, FeedSource, FeedView, InteractionBackend, MediaTransport, Navigator,
    SessionCredentials, StartOptions, SETTINGS,
};

// Prints what a real media element would be told to do
struct ConsoleTransport;

impl MediaTransport for ConsoleTransport {
    fn start(&self, item_id: &str, options: StartOptions) -> BoxFuture<'static, Result<(), FeedError>> {
        println!(
            "  [media] start {} (muted: {}, from beginning: {})",
            item_id, options.muted, options.from_beginning
        );
        async {
            sleep(Duration::from_millis(30)).await;
            Ok(())
        }
        .boxed()
    }

    fn stop(&self, item_id: &str) -> BoxFuture<'static, ()> {
        println!("  [media] stop {}", item_id);
        async {}.boxed()
    }

    fn set_muted(&self, item_id: &str, muted: bool) {
        println!("  [media] {} muted: {}", item_id, muted);
    }
}

struct ConsoleView;

impl FeedView for ConsoleView {
    fn scroll_into_view(&self, index: usize, item_id: &str) {
        println!("  [view] scroll to #{} ({})", index, item_id);
    }
}

impl Navigator for ConsoleView {
    fn open_detail(&self, item_id: &str) {
        println!("  [nav] open /video/{}", item_id);
    }
}

// Offline stand-in for the REST backend
struct DemoBackend;

fn demo_item(id: &str, caption: &str, likes: u64) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        video_url: format!("/uploads/{}.mp4", id),
        user: Author {
            id: "creator".to_string(),
            username: "demo_creator".to_string(),
            avatar: None,
            followers: Some(42),
        },
        caption: caption.to_string(),
        tags: Vec::new(),
        like_count: likes,
        comment_count: 0,
        sound: None,
        created_at: None,
        liked: false,
    }
}

impl FeedSource for DemoBackend {
    fn fetch_feed_items(&self) -> BoxFuture<'static, Result<Vec<FeedItem>, FeedError>> {
        async {
            Ok(vec![
                demo_item("v1", "Sunrise timelapse #nature", 10),
                demo_item("v2", "Latte art #coffee", 3),
                demo_item("v3", "Kickflip #skate", 27),
            ])
        }
        .boxed()
    }

    fn fetch_comments(&self, _video_id: &str) -> BoxFuture<'static, Result<Vec<Comment>, FeedError>> {
        async { Ok(Vec::new()) }.boxed()
    }

    fn fetch_like_status(
        &self,
        _credential: &Credential,
        _key: &EntityKey,
    ) -> BoxFuture<'static, Result<Option<bool>, FeedError>> {
        async { Ok(None) }.boxed()
    }

    fn post_comment(
        &self,
        _credential: &Credential,
        _video_id: &str,
        content: &str,
    ) -> BoxFuture<'static, Result<Comment, FeedError>> {
        let content = content.to_string();
        async move {
            Ok(Comment {
                id: "c1".to_string(),
                content,
                user: Author {
                    id: "me".to_string(),
                    username: "me".to_string(),
                    avatar: None,
                    followers: None,
                },
                like_count: 0,
                liked: false,
                created_at: None,
            })
        }
        .boxed()
    }
}

impl InteractionBackend for DemoBackend {
    fn set_like_state(
        &self,
        _credential: &Credential,
        key: &EntityKey,
        desired: bool,
    ) -> BoxFuture<'static, Result<(), FeedError>> {
        println!("  [api] {} -> {}", key, desired);
        async {
            sleep(Duration::from_millis(80)).await;
            Ok(())
        }
        .boxed()
    }
}

/// Drives a feed session through a scripted scroll, like and shutdown.
///
/// Pass `--api` to read the feed from the backend at `FEED_API_URL` instead of
/// the built-in items.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut log_level = Level::INFO;
    let mut use_api = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--trace" | "-t" => log_level = Level::TRACE,
            "--debug" | "-d" => log_level = Level::DEBUG,
            "--api" => use_api = true,
            _ => {}
        }
    }

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let credentials = Arc::new(SessionCredentials::new());
    credentials.login(Credential::new("demo-token"));
    let view = Arc::new(ConsoleView);

    let collaborators = if use_api {
        let api = Arc::new(ApiClient::from_settings(&SETTINGS)?);
        info!("Using backend at {}", api.base_url());
        Collaborators::with_api(api, credentials, Arc::new(ConsoleTransport), view.clone(), view)
    } else {
        let backend = Arc::new(DemoBackend);
        Collaborators {
            source: backend.clone(),
            backend,
            credentials,
            transport: Arc::new(ConsoleTransport),
            view: view.clone(),
            navigator: view,
        }
    };

    let mut session = FeedSession::new(collaborators);
    let mut events = session.event_receiver();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                FeedEvent::Notice(notice) => println!("  [toast] {}", notice.message),
                FeedEvent::ActiveItemChanged { index, item_id } => {
                    println!("  [feed] active #{} ({})", index, item_id)
                }
                _ => {}
            }
        }
    });

    if let Err(e) = session.load_feed().await {
        error!("Could not load the feed: {}", e);
        return Ok(());
    }

    let ids: Vec<String> = session.items().iter().map(|item| item.id.clone()).collect();
    let viewport = session.viewport();
    for (i, id) in ids.iter().enumerate() {
        viewport.observe(id, reel_feed::ElementHandle(i as u64), session.visibility_threshold());
    }
    let first_like = ids.first().map(|id| EntityKey::video_like(id));

    let handle = session.spawn();
    sleep(Duration::from_millis(100)).await;

    println!("Viewer presses down");
    handle.next()?;
    if let Some(second) = ids.get(1) {
        // The platform reports the scrolled-to item as dominant
        viewport.report(&ids[0], 0.2);
        viewport.report(second, 0.92);
    }
    sleep(Duration::from_millis(100)).await;

    if let Some(key) = first_like {
        println!("Viewer double-taps like on {}", key.entity_id);
        handle.toggle(&key)?;
        handle.toggle(&key)?;
        sleep(Duration::from_millis(300)).await;
        let view = handle.interaction(&key);
        info!(liked = view.active, count = view.count, "Like settled");
    }

    println!("Viewer unmutes");
    handle.set_muted(false)?;
    sleep(Duration::from_millis(50)).await;

    handle.shutdown().await?;
    info!(playing = handle.is_playing(), "Session closed");
    Ok(())
}
