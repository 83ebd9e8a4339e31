use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, trace};

use crate::auth::Credential;
use crate::error::FeedError;
use crate::interaction::InteractionBackend;
use crate::models::{
    Comment, EntityKey, FeedItem, FollowStatusResponse, InteractionKind, LikeStatusResponse,
};
use crate::settings::Settings;

/// Read side of the backend: feed, comments and per-viewer status.
pub trait FeedSource: Send + Sync {
    fn fetch_feed_items(&self) -> BoxFuture<'static, Result<Vec<FeedItem>, FeedError>>;

    fn fetch_comments(&self, video_id: &str) -> BoxFuture<'static, Result<Vec<Comment>, FeedError>>;

    /// Whether the viewer holds the toggle for `key`. `None` when the backend
    /// has no way to tell.
    fn fetch_like_status(
        &self,
        credential: &Credential,
        key: &EntityKey,
    ) -> BoxFuture<'static, Result<Option<bool>, FeedError>>;

    fn post_comment(
        &self,
        credential: &Credential,
        video_id: &str,
        content: &str,
    ) -> BoxFuture<'static, Result<Comment, FeedError>>;
}

/// Route for driving `key` to `desired`.
pub fn interaction_route(key: &EntityKey, desired: bool) -> (Method, String) {
    let id = &key.entity_id;
    match (key.kind, desired) {
        (InteractionKind::VideoLike, true) => (Method::POST, format!("/api/videos/{}/like", id)),
        (InteractionKind::VideoLike, false) => {
            (Method::DELETE, format!("/api/videos/{}/unlike", id))
        }
        (InteractionKind::CommentLike, true) => {
            (Method::POST, format!("/api/comments/{}/like", id))
        }
        (InteractionKind::CommentLike, false) => {
            (Method::DELETE, format!("/api/comments/{}/unlike", id))
        }
        (InteractionKind::Follow, true) => (Method::POST, format!("/api/users/follow/{}", id)),
        (InteractionKind::Follow, false) => {
            (Method::DELETE, format!("/api/users/unfollow/{}", id))
        }
    }
}

/// REST client for the video backend.
#[derive(Clone)]
pub struct ApiClient {
    client: Arc<Client>,
    base_url: String,
}

impl ApiClient {
    /// Create a client for `base_url`. Optionally accepts a custom reqwest
    /// client for connection reuse and shared configuration.
    pub fn new(base_url: &str, custom_client: Option<Arc<Client>>) -> Result<Self, FeedError> {
        let client = match custom_client {
            Some(client) => client,
            None => Arc::new(Client::builder().build()?),
        };
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout)
            .build()?;
        Self::new(&settings.api_base_url, Some(Arc::new(client)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str, credential: Option<&Credential>) -> RequestBuilder {
        let request = self.client.request(method, self.url(path));
        match credential {
            Some(credential) => request.header("Authorization", credential.bearer()),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response, FeedError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FeedError::TokenExpired);
        }
        if !status.is_success() {
            let url = response.url().to_string();
            let body_text = response.text().await.unwrap_or_default();
            let error_msg = format!("{} from {}: {}", status, url, body_text);
            error!("{}", error_msg);
            return Err(FeedError::InvalidResponse(error_msg));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FeedError> {
        let response = Self::check_status(request.send().await?).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl FeedSource for ApiClient {
    fn fetch_feed_items(&self) -> BoxFuture<'static, Result<Vec<FeedItem>, FeedError>> {
        let request = self.request(Method::GET, "/api/videos", None);
        async move {
            debug!("Fetching feed items");
            let items: Vec<FeedItem> = Self::send_json(request).await?;
            debug!(count = items.len(), "Fetched feed items");
            Ok(items)
        }
        .boxed()
    }

    fn fetch_comments(&self, video_id: &str) -> BoxFuture<'static, Result<Vec<Comment>, FeedError>> {
        let request = self.request(
            Method::GET,
            &format!("/api/videos/{}/comments", video_id),
            None,
        );
        async move { Self::send_json(request).await }.boxed()
    }

    fn fetch_like_status(
        &self,
        credential: &Credential,
        key: &EntityKey,
    ) -> BoxFuture<'static, Result<Option<bool>, FeedError>> {
        match key.kind {
            InteractionKind::VideoLike => {
                let request = self.request(
                    Method::GET,
                    &format!("/api/videos/{}/check-like", key.entity_id),
                    Some(credential),
                );
                async move {
                    let status: LikeStatusResponse = Self::send_json(request).await?;
                    Ok(Some(status.liked))
                }
                .boxed()
            }
            InteractionKind::Follow => {
                let request = self.request(
                    Method::GET,
                    &format!("/api/users/check-follow/{}", key.entity_id),
                    Some(credential),
                );
                async move {
                    let status: FollowStatusResponse = Self::send_json(request).await?;
                    Ok(Some(status.is_following))
                }
                .boxed()
            }
            // Comment like state only arrives embedded in the comment list
            InteractionKind::CommentLike => async { Ok(None) }.boxed(),
        }
    }

    fn post_comment(
        &self,
        credential: &Credential,
        video_id: &str,
        content: &str,
    ) -> BoxFuture<'static, Result<Comment, FeedError>> {
        let request = self
            .request(
                Method::POST,
                &format!("/api/videos/{}/comments", video_id),
                Some(credential),
            )
            .json(&json!({ "content": content }));
        async move { Self::send_json(request).await }.boxed()
    }
}

impl InteractionBackend for ApiClient {
    fn set_like_state(
        &self,
        credential: &Credential,
        key: &EntityKey,
        desired: bool,
    ) -> BoxFuture<'static, Result<(), FeedError>> {
        let (method, path) = interaction_route(key, desired);
        trace!(%method, %path, "Sending interaction request");
        let mut request = self.request(method.clone(), &path, Some(credential));
        if method == Method::POST {
            request = request.json(&json!({}));
        }
        async move {
            Self::check_status(request.send().await?).await?;
            Ok(())
        }
        .boxed()
    }
}
