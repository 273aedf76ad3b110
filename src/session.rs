//! One viewing session.
//!
//! `Session` is the synchronous core of the engine: it owns the sequence,
//! the timeline, navigation and interaction state, and publishes
//! [`EngineEvent`]s. It never awaits. Work that has to happen off the loop
//! (loading the next item, confirming an interaction, prefetching) is queued
//! and picked up by the driver through the `take_*` methods; results come
//! back through [`Session::load_resolved`] and [`Session::effect_settled`].

use crate::error::{EngineError, ErrorKind, Result};
use crate::interaction::{
    ActionId, Dispatched, EffectRequest, InteractionDispatcher, InteractionState,
};
use crate::media::{ItemId, MediaItem, Sequence};
use crate::navigation::{NavOutcome, NavigationManager, SegmentState};
use crate::playback::{DeviceSettings, Loaded, PlaybackAdapter, Volume};
use crate::settings::{AdvanceMode, EngineConfig};
use crate::timeline::{Target, TickOutcome, TimelineController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Events published to the surrounding UI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ProgressChanged { index: usize, fraction: f32 },
    ActiveIndexChanged(usize),
    SequenceExhausted,
    InteractionStateChanged { item: ItemId, state: InteractionState },
    Error { kind: ErrorKind, item: Option<ItemId> },
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Token identifying one visit to one item. Bumped on every index change
/// and on close, so late `load` results can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

/// A load the driver should run for the active item.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub generation: Generation,
    pub index: usize,
    pub item: MediaItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Played or navigated past the last item.
    Exhausted,
    /// Closed by the viewer.
    Closed,
}

pub struct Session {
    sequence: Sequence,
    config: EngineConfig,
    nav: NavigationManager,
    timeline: TimelineController,
    adapter: Arc<PlaybackAdapter>,
    interactions: InteractionDispatcher,
    events: EventSender,
    generation: Generation,
    pending_load: Option<LoadRequest>,
    outbox: Vec<EffectRequest>,
    prefetch: Vec<MediaItem>,
    user_paused: bool,
    composer_paused: bool,
    closed: Option<CloseReason>,
}

impl Session {
    /// Open the viewer on `start`. The first item's load is queued
    /// immediately.
    pub fn open(
        sequence: Sequence,
        start: usize,
        config: EngineConfig,
        adapter: Arc<PlaybackAdapter>,
        events: EventSender,
    ) -> Result<Self> {
        config.validate()?;
        let nav = NavigationManager::new(sequence.len(), start)?;

        tracing::info!(
            "Opening session: {} items, starting at {}, {:?} advance",
            sequence.len(),
            start,
            config.advance
        );

        let mut session = Self {
            sequence,
            config,
            nav,
            timeline: TimelineController::new(),
            adapter,
            interactions: InteractionDispatcher::new(),
            events,
            generation: Generation(0),
            pending_load: None,
            outbox: Vec::new(),
            prefetch: Vec::new(),
            user_paused: false,
            composer_paused: false,
            closed: None,
        };
        session.enter(start);
        Ok(session)
    }

    // ---- driver interface -------------------------------------------------

    pub fn take_load(&mut self) -> Option<LoadRequest> {
        self.pending_load.take()
    }

    pub fn take_effects(&mut self) -> Vec<EffectRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_prefetch(&mut self) -> Vec<MediaItem> {
        std::mem::take(&mut self.prefetch)
    }

    /// Feed elapsed time into the active item's timeline.
    pub fn tick(&mut self, delta: Duration) {
        if self.closed.is_some() {
            return;
        }

        let index = self.nav.active_index();
        match self.timeline.tick(delta) {
            TickOutcome::Idle => {}
            // An unbounded item has no progress to report.
            TickOutcome::Progress(_) if self.timeline.target() == Target::Unbounded => {}
            TickOutcome::Progress(fraction) => {
                self.emit(EngineEvent::ProgressChanged { index, fraction });
            }
            TickOutcome::Completed => {
                self.emit(EngineEvent::ProgressChanged {
                    index,
                    fraction: 1.0,
                });
                tracing::debug!("Item {} completed", index);
                self.finish_item();
            }
        }
    }

    /// Result of a load issued for `generation`. Stale results are ignored.
    ///
    /// Returns true when the active item's timer started, so the driver can
    /// rebase its clock and not bill load time to the item.
    pub fn load_resolved(&mut self, generation: Generation, result: Result<Loaded>) -> bool {
        if self.closed.is_some() || generation != self.generation {
            tracing::debug!("Ignoring stale load result ({:?})", generation);
            return false;
        }

        let index = self.nav.active_index();
        let Some(item) = self.sequence.get(index).cloned() else {
            return false;
        };

        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Skipping item {} ({}): {}", index, item.id, e);
                self.emit(EngineEvent::Error {
                    kind: ErrorKind::LoadFailed,
                    item: Some(item.id.clone()),
                });
                self.finish_item();
                return false;
            }
        };

        let target = self.target_for(&item, loaded);
        tracing::debug!("Starting item {} ({}) with {:?}", index, item.id, target);
        self.timeline.start(target);
        self.adapter.activate(&item, self.timeline.is_paused());

        let ahead = self.config.prefetch_ahead;
        self.prefetch = self
            .sequence
            .items()
            .iter()
            .skip(index + 1)
            .take(ahead)
            .cloned()
            .collect();
        true
    }

    /// Result of an outbound interaction call.
    pub fn effect_settled(&mut self, action: ActionId, outcome: anyhow::Result<()>) {
        let ok = match &outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Interaction {} failed: {:#}", action, e);
                false
            }
        };

        let Some(settled) = self.interactions.settle(action, ok) else {
            return;
        };

        if let Some(state) = settled.reverted_state {
            self.emit(EngineEvent::InteractionStateChanged {
                item: settled.item.clone(),
                state,
            });
        }
        if settled.failed {
            self.emit(EngineEvent::Error {
                kind: ErrorKind::InteractionFailed,
                item: Some(settled.item),
            });
        }
    }

    // ---- navigation -------------------------------------------------------

    /// Explicit "next" tap. Past the last item this exhausts the sequence.
    pub fn next(&mut self) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.nav.advance();
        self.apply_nav(outcome);
        Ok(())
    }

    pub fn previous(&mut self) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.nav.retreat();
        self.apply_nav(outcome);
        Ok(())
    }

    pub fn jump_to(&mut self, index: usize) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.nav.jump_to(index)?;
        self.apply_nav(outcome);
        Ok(())
    }

    /// Tear the session down. Pending loads become stale.
    pub fn close(&mut self) {
        self.shutdown(CloseReason::Closed);
    }

    // ---- playback controls ------------------------------------------------

    pub fn pause(&mut self) {
        self.user_paused = true;
        self.sync_pause();
    }

    pub fn resume(&mut self) {
        self.user_paused = false;
        self.sync_pause();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.adapter.set_muted(muted);
    }

    pub fn toggle_mute(&mut self) {
        let muted = self.adapter.device().muted;
        self.adapter.set_muted(!muted);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.adapter.set_volume(Volume::new(volume));
    }

    pub fn volume_up(&mut self) {
        let volume = self.adapter.device().volume;
        self.adapter.set_volume(volume.increase());
    }

    pub fn volume_down(&mut self) {
        let volume = self.adapter.device().volume;
        self.adapter.set_volume(volume.decrease());
    }

    // ---- interactions -----------------------------------------------------

    pub fn like(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.set_liked(item, true);
        self.record(item, dispatched);
        Ok(())
    }

    pub fn unlike(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.set_liked(item, false);
        self.record(item, dispatched);
        Ok(())
    }

    pub fn toggle_like(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.toggle_like(item);
        self.record(item, Some(dispatched));
        Ok(())
    }

    pub fn save(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.set_saved(item, true);
        self.record(item, dispatched);
        Ok(())
    }

    pub fn unsave(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.set_saved(item, false);
        self.record(item, dispatched);
        Ok(())
    }

    pub fn toggle_save(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.toggle_save(item);
        self.record(item, Some(dispatched));
        Ok(())
    }

    pub fn share(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.share(item);
        self.record(item, Some(dispatched));
        Ok(())
    }

    /// Focus the reply input. Playback holds until the composer closes.
    pub fn open_composer(&mut self, item: &ItemId) -> Result<()> {
        self.ensure_item(item)?;
        if self.interactions.open_composer(item) {
            self.composer_paused = true;
            self.sync_pause();
        }
        Ok(())
    }

    /// Blur or cancel the reply input.
    pub fn close_composer(&mut self) {
        if self.interactions.close_composer().is_some() {
            self.composer_paused = false;
            self.sync_pause();
        }
    }

    pub fn edit_reply(&mut self, item: &ItemId, text: &str) -> Result<()> {
        self.ensure_item(item)?;
        let state = self.interactions.edit_reply(item, text);
        self.emit(EngineEvent::InteractionStateChanged {
            item: item.clone(),
            state,
        });
        Ok(())
    }

    /// Send `text` as a reply. Closes the composer if it is open on `item`.
    pub fn submit_reply(&mut self, item: &ItemId, text: &str) -> Result<()> {
        self.ensure_item(item)?;
        let dispatched = self.interactions.submit_reply(item, text)?;
        self.record(item, Some(dispatched));
        if self.interactions.composing() == Some(item) {
            self.close_composer();
        }
        Ok(())
    }

    /// Send whatever is in `item`'s reply buffer.
    pub fn submit_pending_reply(&mut self, item: &ItemId) -> Result<()> {
        let text = self.interactions.state(item).pending_reply_text;
        self.submit_reply(item, &text)
    }

    // ---- queries ----------------------------------------------------------

    pub fn active_index(&self) -> usize {
        self.nav.active_index()
    }

    pub fn active_item(&self) -> &MediaItem {
        // The navigation manager keeps the index inside the sequence.
        &self.sequence.items()[self.nav.active_index()]
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn elapsed(&self) -> Duration {
        self.timeline.elapsed()
    }

    pub fn progress(&self) -> f32 {
        self.timeline.progress()
    }

    pub fn target(&self) -> Target {
        self.timeline.target()
    }

    /// True once the active item has loaded and its timer is running.
    pub fn is_playing(&self) -> bool {
        self.timeline.is_running() && !self.timeline.is_paused()
    }

    pub fn is_paused(&self) -> bool {
        self.timeline.is_paused()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.closed
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.nav.is_completed(index)
    }

    pub fn completed(&self) -> Vec<usize> {
        self.nav.completed().collect()
    }

    pub fn segments(&self) -> Vec<SegmentState> {
        self.nav.segments()
    }

    pub fn interaction(&self, item: &ItemId) -> InteractionState {
        self.interactions.state(item)
    }

    pub fn device(&self) -> DeviceSettings {
        self.adapter.device()
    }

    // ---- internals --------------------------------------------------------

    fn enter(&mut self, index: usize) {
        self.generation = Generation(self.generation.0 + 1);
        self.adapter.deactivate();
        self.timeline.reset();
        self.user_paused = false;
        if self.interactions.close_composer().is_some() {
            self.composer_paused = false;
        }
        self.prefetch.clear();

        if let Some(item) = self.sequence.get(index) {
            self.pending_load = Some(LoadRequest {
                generation: self.generation,
                index,
                item: item.clone(),
            });
        }

        self.emit(EngineEvent::ActiveIndexChanged(index));
        self.emit(EngineEvent::ProgressChanged {
            index,
            fraction: 0.0,
        });
    }

    /// The active item is done, either naturally or because it failed to load.
    fn finish_item(&mut self) {
        if self.sequence.len() == 1 {
            self.exhaust();
            return;
        }
        let outcome = self.nav.advance();
        self.apply_nav(outcome);
    }

    fn apply_nav(&mut self, outcome: NavOutcome) {
        match outcome {
            NavOutcome::Moved { from, to } => {
                tracing::debug!("Navigating {} -> {}", from, to);
                self.enter(to);
            }
            NavOutcome::Stayed => {}
            NavOutcome::Exhausted => self.exhaust(),
        }
    }

    fn exhaust(&mut self) {
        tracing::info!("Sequence exhausted");
        self.emit(EngineEvent::SequenceExhausted);
        self.shutdown(CloseReason::Exhausted);
    }

    fn shutdown(&mut self, reason: CloseReason) {
        if self.closed.is_some() {
            return;
        }
        self.closed = Some(reason);
        self.generation = Generation(self.generation.0 + 1);
        self.pending_load = None;
        self.prefetch.clear();
        self.timeline.reset();
        self.interactions.close_composer();
        self.composer_paused = false;
        self.user_paused = false;
        self.adapter.deactivate();
        tracing::info!("Session closed ({:?})", reason);
    }

    fn target_for(&self, item: &MediaItem, loaded: Loaded) -> Target {
        let target = match loaded {
            Loaded::Still => item
                .display_duration()
                .unwrap_or_else(|| self.config.default_display()),
            Loaded::Video {
                reported: Some(natural),
            } => natural.min(self.config.max_video_duration()),
            Loaded::Video { reported: None } => {
                tracing::warn!(
                    "No duration reported for {}, using {} ms",
                    item.id,
                    self.config.max_video_duration_ms
                );
                self.emit(EngineEvent::Error {
                    kind: ErrorKind::DurationUnavailable,
                    item: Some(item.id.clone()),
                });
                self.config.max_video_duration()
            }
        };

        match self.config.advance {
            AdvanceMode::Auto => Target::Timed(target),
            AdvanceMode::Manual => Target::Unbounded,
        }
    }

    fn sync_pause(&mut self) {
        let hold = self.user_paused || self.composer_paused;
        if hold == self.timeline.is_paused() {
            return;
        }
        if hold {
            self.timeline.pause();
            self.adapter.pause();
        } else {
            self.timeline.resume();
            self.adapter.play();
        }
    }

    fn record(&mut self, item: &ItemId, dispatched: Option<Dispatched>) {
        let Some(dispatched) = dispatched else {
            return;
        };
        if let Some(state) = dispatched.state {
            self.emit(EngineEvent::InteractionStateChanged {
                item: item.clone(),
                state,
            });
        }
        self.outbox.push(dispatched.request);
    }

    fn ensure_open(&self) -> Result<()> {
        match self.closed {
            Some(_) => Err(EngineError::SessionClosed),
            None => Ok(()),
        }
    }

    fn ensure_item(&self, item: &ItemId) -> Result<()> {
        self.ensure_open()?;
        match self.sequence.position(item) {
            Some(_) => Ok(()),
            None => Err(EngineError::UnknownItem(item.clone())),
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
