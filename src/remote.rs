//! HTTP-backed collaborators.
//!
//! - [`RemoteSurface`] checks video payloads with `HEAD` requests and keeps
//!   the results in an LRU cache so revisiting an item is instant.
//! - [`HttpEffects`] confirms likes, saves, replies and shares against the
//!   API.
//! - [`fetch_sequence`] and [`load_playlist`] supply the item list.

use crate::interaction::EffectsBackend;
use crate::media::{ItemId, MediaItem, PayloadRef};
use crate::playback::{MediaSurface, PlayerState, Volume};
use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use lru::LruCache;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Header carrying a media resource's length in seconds.
pub const DURATION_HEADER: &str = "X-Content-Duration";

const HEAD_CACHE_ENTRIES: usize = 256;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    items: Vec<T>,
}

/// A playlist file is either a bare array or an API-style `{"items": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlaylistFile {
    List(Vec<MediaItem>),
    Wrapped(ListResponse<MediaItem>),
}

/// Normalise the API base so relative joins append instead of replacing the
/// last path segment.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).with_context(|| format!("Invalid API URL `{raw}`"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve a payload against the API base. Inline payloads have no URL.
pub fn resolve_payload(base: &Url, payload: &PayloadRef) -> Result<Url> {
    match payload {
        PayloadRef::Remote(raw) if raw.starts_with("http://") || raw.starts_with("https://") => {
            Url::parse(raw).with_context(|| format!("Invalid payload URL `{raw}`"))
        }
        PayloadRef::Remote(raw) => base
            .join(raw)
            .with_context(|| format!("Cannot resolve `{raw}` against {base}")),
        PayloadRef::Inline(_) => anyhow::bail!("payload is inline content, not a URL"),
    }
}

/// Parse an `X-Content-Duration` value (seconds, fractional allowed).
pub fn parse_duration_header(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Fetch the story list from the API.
pub async fn fetch_sequence(client: &Client, base: &Url, token: Option<&str>) -> Result<Vec<MediaItem>> {
    let url = base.join("api/stories").context("Invalid stories URL")?;
    let mut request = client.get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let res = request
        .send()
        .await
        .context("Failed to send request")?
        .error_for_status()
        .context("Server returned error")?;
    let parsed: ListResponse<MediaItem> = res.json().await.context("Failed to parse story list")?;
    tracing::info!("Fetched {} items", parsed.items.len());
    Ok(parsed.items)
}

/// Load a playlist from a local JSON file.
pub async fn load_playlist(path: &Path) -> Result<Vec<MediaItem>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read playlist {}", path.display()))?;
    let items = match serde_json::from_str(&json).context("Failed to parse playlist")? {
        PlaylistFile::List(items) => items,
        PlaylistFile::Wrapped(list) => list.items,
    };
    tracing::info!("Loaded playlist with {} items", items.len());
    Ok(items)
}

#[derive(Debug, Clone, Copy)]
struct HeadInfo {
    duration: Option<Duration>,
    size: Option<u64>,
}

#[derive(Debug)]
struct SurfaceState {
    player: PlayerState,
    current: Option<ItemId>,
    muted: bool,
    volume: Volume,
}

/// Headless video surface that checks availability over HTTP.
///
/// Nothing is decoded. Readiness means the payload answered a `HEAD`
/// request; the natural length comes from [`DURATION_HEADER`].
pub struct RemoteSurface {
    client: Client,
    base: Url,
    token: Option<String>,
    heads: Mutex<LruCache<ItemId, HeadInfo>>,
    state: Mutex<SurfaceState>,
}

impl RemoteSurface {
    pub fn new(client: Client, base: Url, token: Option<String>) -> Self {
        let capacity = NonZeroUsize::new(HEAD_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            base,
            token,
            heads: Mutex::new(LruCache::new(capacity)),
            state: Mutex::new(SurfaceState {
                player: PlayerState::Stopped,
                current: None,
                muted: false,
                volume: Volume::default(),
            }),
        }
    }

    pub fn player_state(&self) -> PlayerState {
        self.state
            .lock()
            .map(|s| s.player)
            .unwrap_or(PlayerState::Stopped)
    }

    /// Number of cached HEAD results.
    pub fn cached(&self) -> usize {
        self.heads.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn cached_head(&self, id: &ItemId) -> Option<HeadInfo> {
        // `get` promotes the entry to most recently used.
        self.heads.lock().ok()?.get(id).copied()
    }

    async fn fetch_head(&self, item: &MediaItem) -> Result<HeadInfo> {
        if let Some(head) = self.cached_head(&item.id) {
            return Ok(head);
        }

        let url = resolve_payload(&self.base, &item.payload_ref)?;
        tracing::debug!("Requesting HEAD for {} at {}", item.id, url);

        let mut request = self.client.head(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .context("Failed to send request")?
            .error_for_status()
            .context("Server returned error")?;

        let duration = response
            .headers()
            .get(DURATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_duration_header);
        let head = HeadInfo {
            duration,
            size: response.content_length(),
        };

        tracing::debug!(
            "Checked {}: duration {:?}, {:.2} KB",
            item.id,
            head.duration,
            head.size.unwrap_or(0) as f64 / 1024.0
        );

        if let Ok(mut heads) = self.heads.lock() {
            heads.put(item.id.clone(), head);
        }
        Ok(head)
    }

    fn update(&self, f: impl FnOnce(&mut SurfaceState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}

impl MediaSurface for RemoteSurface {
    fn load<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.fetch_head(item).await?;
            Ok(())
        })
    }

    fn duration<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, Option<Duration>> {
        Box::pin(async move { self.cached_head(&item.id).and_then(|h| h.duration) })
    }

    fn play(&self, item: &MediaItem) {
        tracing::debug!("Playing {}", item.id);
        self.update(|s| {
            s.player = PlayerState::Playing;
            s.current = Some(item.id.clone());
        });
    }

    fn pause(&self) {
        self.update(|s| s.player = PlayerState::Paused);
    }

    fn stop(&self) {
        self.update(|s| {
            s.player = PlayerState::Stopped;
            s.current = None;
        });
    }

    fn set_muted(&self, muted: bool) {
        self.update(|s| s.muted = muted);
    }

    fn set_volume(&self, volume: Volume) {
        self.update(|s| s.volume = volume);
    }
}

/// Interaction confirmations over the REST API.
pub struct HttpEffects {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpEffects {
    pub fn new(client: Client, base: Url, token: Option<String>) -> Self {
        Self {
            client,
            base,
            token,
        }
    }

    /// URL of an item sub-resource, e.g. `api/items/{id}/like`.
    pub fn item_url(&self, item: &ItemId, resource: &str) -> Result<Url> {
        let path = format!(
            "api/items/{}/{}",
            urlencoding::encode(item.as_str()),
            resource
        );
        self.base
            .join(&path)
            .with_context(|| format!("Cannot build URL for {item}"))
    }

    fn call(
        &self,
        item: &ItemId,
        resource: &str,
        build: impl FnOnce(&Client, Url) -> RequestBuilder,
    ) -> BoxFuture<'static, Result<()>> {
        let request = self.item_url(item, resource).map(|url| {
            let request = build(&self.client, url);
            match &self.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        });
        let item = item.clone();

        Box::pin(async move {
            request?
                .send()
                .await
                .with_context(|| format!("Failed to reach API for {item}"))?
                .error_for_status()
                .context("Server returned error")?;
            Ok(())
        })
    }
}

impl EffectsBackend for HttpEffects {
    fn like_item(&self, item: ItemId) -> BoxFuture<'static, Result<()>> {
        self.call(&item, "like", |c, url| c.post(url))
    }

    fn unlike_item(&self, item: ItemId) -> BoxFuture<'static, Result<()>> {
        self.call(&item, "like", |c, url| c.delete(url))
    }

    fn save_item(&self, item: ItemId) -> BoxFuture<'static, Result<()>> {
        self.call(&item, "save", |c, url| c.post(url))
    }

    fn unsave_item(&self, item: ItemId) -> BoxFuture<'static, Result<()>> {
        self.call(&item, "save", |c, url| c.delete(url))
    }

    fn send_reply(&self, item: ItemId, text: String) -> BoxFuture<'static, Result<()>> {
        let body = serde_json::json!({ "text": text });
        self.call(&item, "replies", move |c, url| c.post(url).json(&body))
    }

    fn record_share(&self, item: ItemId) -> BoxFuture<'static, Result<()>> {
        self.call(&item, "shares", |c, url| c.post(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let base = parse_base_url("https://api.example.com/v1").unwrap();
        assert_eq!(base.as_str(), "https://api.example.com/v1/");
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn resolves_relative_and_absolute_payloads() {
        let base = parse_base_url("http://localhost:8090").unwrap();

        let relative = PayloadRef::from("/files/b.mp4".to_string());
        assert_eq!(
            resolve_payload(&base, &relative).unwrap().as_str(),
            "http://localhost:8090/files/b.mp4"
        );

        let absolute = PayloadRef::from("https://cdn.example.com/b.mp4".to_string());
        assert_eq!(
            resolve_payload(&base, &absolute).unwrap().as_str(),
            "https://cdn.example.com/b.mp4"
        );

        let inline = PayloadRef::Inline("hello".into());
        assert!(resolve_payload(&base, &inline).is_err());
    }

    #[test]
    fn parses_duration_header() {
        assert_eq!(parse_duration_header("8"), Some(Duration::from_secs(8)));
        assert_eq!(
            parse_duration_header(" 12.5 "),
            Some(Duration::from_millis(12_500))
        );
        assert_eq!(parse_duration_header("-1"), None);
        assert_eq!(parse_duration_header("NaN"), None);
        assert_eq!(parse_duration_header("inf"), None);
        assert_eq!(parse_duration_header("1e20"), None);
        assert_eq!(parse_duration_header("soon"), None);
    }

    #[test]
    fn item_urls_are_encoded() {
        let effects = HttpEffects::new(
            Client::new(),
            parse_base_url("http://localhost:8090/").unwrap(),
            None,
        );
        let url = effects.item_url(&ItemId::from("a b/c"), "like").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8090/api/items/a%20b%2Fc/like"
        );
    }

    #[test]
    fn playlist_accepts_both_shapes() {
        let bare = r#"[{"id":"a","kind":"text","payloadRef":"hi","defaultDurationMs":1000}]"#;
        let wrapped = r#"{"items":[{"id":"a","kind":"text","payloadRef":"hi"}]}"#;

        assert!(matches!(
            serde_json::from_str::<PlaylistFile>(bare).unwrap(),
            PlaylistFile::List(items) if items.len() == 1
        ));
        assert!(matches!(
            serde_json::from_str::<PlaylistFile>(wrapped).unwrap(),
            PlaylistFile::Wrapped(list) if list.items.len() == 1
        ));
    }

    #[tokio::test]
    async fn inline_video_fails_to_load() {
        let surface = RemoteSurface::new(
            Client::new(),
            parse_base_url("http://localhost:8090").unwrap(),
            None,
        );
        let mut item = MediaItem::video("v", "/v.mp4");
        item.payload_ref = PayloadRef::Inline("not a url".into());

        assert!(surface.load(&item).await.is_err());
        assert_eq!(surface.duration(&item).await, None);
        assert_eq!(surface.cached(), 0);
    }

    #[test]
    fn surface_tracks_player_state() {
        let surface = RemoteSurface::new(
            Client::new(),
            parse_base_url("http://localhost:8090").unwrap(),
            None,
        );
        let item = MediaItem::video("v", "/v.mp4");

        surface.play(&item);
        assert_eq!(surface.player_state(), PlayerState::Playing);
        surface.pause();
        assert_eq!(surface.player_state(), PlayerState::Paused);
        surface.stop();
        assert_eq!(surface.player_state(), PlayerState::Stopped);
    }
}
