//! Media item model.
//!
//! Items are supplied by the feed collaborator and never mutated by the
//! engine. A `Sequence` is the validated, non-empty ordered list a session
//! plays through.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

/// Stable identifier of an item within a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of surface an item needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Text,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Text => "text",
        }
    }
}

/// Where the content of an item lives.
///
/// Absolute http(s) URLs and server-relative paths (leading `/`) are remote
/// and get resolved against the API base URL; anything else is inline
/// content such as the body of a text card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PayloadRef {
    Remote(String),
    Inline(String),
}

impl PayloadRef {
    pub fn is_remote(&self) -> bool {
        matches!(self, PayloadRef::Remote(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            PayloadRef::Remote(s) | PayloadRef::Inline(s) => s,
        }
    }
}

impl From<String> for PayloadRef {
    fn from(value: String) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") || value.starts_with('/') {
            PayloadRef::Remote(value)
        } else {
            PayloadRef::Inline(value)
        }
    }
}

impl From<PayloadRef> for String {
    fn from(value: PayloadRef) -> Self {
        match value {
            PayloadRef::Remote(s) | PayloadRef::Inline(s) => s,
        }
    }
}

/// One playable unit of a story or reel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: ItemId,
    pub kind: MediaKind,
    pub payload_ref: PayloadRef,
    /// Display time for image and text items. Ignored for video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration_ms: Option<NonZeroU64>,
}

impl MediaItem {
    pub fn image(id: &str, url: &str, duration_ms: u64) -> Self {
        Self {
            id: ItemId::from(id),
            kind: MediaKind::Image,
            payload_ref: PayloadRef::from(url.to_string()),
            default_duration_ms: NonZeroU64::new(duration_ms),
        }
    }

    pub fn video(id: &str, url: &str) -> Self {
        Self {
            id: ItemId::from(id),
            kind: MediaKind::Video,
            payload_ref: PayloadRef::from(url.to_string()),
            default_duration_ms: None,
        }
    }

    pub fn text(id: &str, body: &str, duration_ms: u64) -> Self {
        Self {
            id: ItemId::from(id),
            kind: MediaKind::Text,
            payload_ref: PayloadRef::Inline(body.to_string()),
            default_duration_ms: NonZeroU64::new(duration_ms),
        }
    }

    /// Check if this is a video item.
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Display duration for still items, or `None` for video and for stills
    /// without an explicit duration.
    pub fn display_duration(&self) -> Option<Duration> {
        match self.kind {
            MediaKind::Image | MediaKind::Text => self
                .default_duration_ms
                .map(|ms| Duration::from_millis(ms.get())),
            MediaKind::Video => None,
        }
    }
}

/// Validated, non-empty, immutable list of items.
///
/// Cloning is cheap; the items are shared.
#[derive(Debug, Clone)]
pub struct Sequence {
    items: Arc<[MediaItem]>,
}

impl Sequence {
    pub fn new(items: Vec<MediaItem>) -> Result<Self> {
        if items.is_empty() {
            return Err(EngineError::EmptySequence);
        }

        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(&item.id) {
                return Err(EngineError::DuplicateItem(item.id.clone()));
            }
        }

        Ok(Self {
            items: items.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.items.get(index)
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }
}
