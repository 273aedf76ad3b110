//! Playback device adapter.
//!
//! Presents one interface over image, video and text items. Only video has a
//! real surface behind it; stills resolve immediately and ignore play/pause.
//! Mute and volume are session preferences that are re-applied to every video
//! the adapter activates.

use crate::error::{EngineError, Result};
use crate::media::{ItemId, MediaItem, MediaKind};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const VOLUME_STEP: f32 = 0.1;

/// Volume level, clamped to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    pub fn new(volume: f32) -> Self {
        if volume.is_nan() {
            return Self(0.0);
        }
        Self(volume.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn increase(self) -> Self {
        Self::new(self.0 + VOLUME_STEP)
    }

    pub fn decrease(self) -> Self {
        Self::new(self.0 - VOLUME_STEP)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Mute/volume preference carried from item to item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSettings {
    pub muted: bool,
    pub volume: Volume,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            muted: false,
            volume: Volume::default(),
        }
    }
}

/// State of the video surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

/// The actual media surface behind the adapter.
///
/// `load` and `duration` are only ever called for video items.
pub trait MediaSurface: Send + Sync {
    /// Resolve once the media is buffered and ready to show.
    fn load<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Natural length of a loaded item, once the surface knows it.
    fn duration<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, Option<Duration>>;

    fn play(&self, item: &MediaItem);
    fn pause(&self);
    fn stop(&self);
    fn set_muted(&self, muted: bool);
    fn set_volume(&self, volume: Volume);

    /// Warm caches for an upcoming item. Defaults to a full load.
    fn prefetch<'a>(&'a self, item: &'a MediaItem) -> BoxFuture<'a, anyhow::Result<()>> {
        self.load(item)
    }
}

/// What `load` found out about an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loaded {
    Still,
    Video { reported: Option<Duration> },
}

#[derive(Debug, Clone, Copy)]
pub struct AdapterTiming {
    pub load_timeout: Duration,
    pub duration_grace: Duration,
}

/// Uniform play/pause/mute front over a [`MediaSurface`].
pub struct PlaybackAdapter {
    surface: Arc<dyn MediaSurface>,
    timing: AdapterTiming,
    device: Mutex<DeviceSettings>,
    state: Mutex<PlayerState>,
    current: Mutex<Option<MediaItem>>,
}

impl PlaybackAdapter {
    pub fn new(surface: Arc<dyn MediaSurface>, timing: AdapterTiming, device: DeviceSettings) -> Self {
        Self {
            surface,
            timing,
            device: Mutex::new(device),
            state: Mutex::new(PlayerState::Stopped),
            current: Mutex::new(None),
        }
    }

    /// Get `item` ready to display.
    ///
    /// Stills resolve immediately. Videos wait for the surface (bounded by
    /// the load timeout) and then give it the grace period to report a
    /// duration; a missing duration is not a failure.
    pub async fn load(&self, item: &MediaItem) -> Result<Loaded> {
        match item.kind {
            MediaKind::Image | MediaKind::Text => Ok(Loaded::Still),
            MediaKind::Video => {
                tracing::debug!("Loading video {}", item.id);

                match tokio::time::timeout(self.timing.load_timeout, self.surface.load(item)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        return Err(EngineError::Load {
                            item: item.id.clone(),
                            reason: format!("{e:#}"),
                        })
                    }
                    Err(_) => {
                        return Err(EngineError::Load {
                            item: item.id.clone(),
                            reason: format!(
                                "not ready after {} ms",
                                self.timing.load_timeout.as_millis()
                            ),
                        })
                    }
                }

                let reported =
                    tokio::time::timeout(self.timing.duration_grace, self.surface.duration(item))
                        .await
                        .ok()
                        .flatten();

                Ok(Loaded::Video { reported })
            }
        }
    }

    /// Warm the surface for upcoming items. Failures only get logged.
    pub async fn prefetch(&self, items: &[MediaItem]) {
        for item in items.iter().filter(|item| item.is_video()) {
            tracing::debug!("Prefetching {}", item.id);
            if let Err(e) = self.surface.prefetch(item).await {
                tracing::warn!("Failed to prefetch {}: {}", item.id, e);
            }
        }
    }

    /// Put a loaded item on screen, applying the stored mute/volume to video.
    pub fn activate(&self, item: &MediaItem, paused: bool) {
        self.deactivate();

        if item.is_video() {
            let device = self.device();
            self.surface.set_muted(device.muted);
            self.surface.set_volume(device.volume);
            if paused {
                self.set_state(PlayerState::Paused);
            } else {
                self.surface.play(item);
                self.set_state(PlayerState::Playing);
            }
        }

        if let Ok(mut current) = self.current.lock() {
            *current = Some(item.clone());
        }
    }

    /// Take the current item off screen.
    pub fn deactivate(&self) {
        let previous = self.current.lock().ok().and_then(|mut c| c.take());
        if previous.is_some_and(|item| item.is_video()) {
            self.surface.stop();
        }
        self.set_state(PlayerState::Stopped);
    }

    pub fn play(&self) {
        if let Some(item) = self.current_video() {
            self.surface.play(&item);
            self.set_state(PlayerState::Playing);
        }
    }

    pub fn pause(&self) {
        if self.current_video().is_some() {
            self.surface.pause();
            self.set_state(PlayerState::Paused);
        }
    }

    pub fn set_muted(&self, muted: bool) {
        if let Ok(mut device) = self.device.lock() {
            device.muted = muted;
        }
        if self.current_video().is_some() {
            self.surface.set_muted(muted);
        }
    }

    pub fn set_volume(&self, volume: Volume) {
        if let Ok(mut device) = self.device.lock() {
            device.volume = volume;
        }
        if self.current_video().is_some() {
            self.surface.set_volume(volume);
        }
    }

    pub fn device(&self) -> DeviceSettings {
        self.device.lock().map(|d| *d).unwrap_or_default()
    }

    pub fn state(&self) -> PlayerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PlayerState::Stopped)
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.current.lock().ok()?.as_ref().map(|item| item.id.clone())
    }

    fn current_video(&self) -> Option<MediaItem> {
        self.current
            .lock()
            .ok()?
            .as_ref()
            .filter(|item| item.is_video())
            .cloned()
    }

    fn set_state(&self, next: PlayerState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }
}
