//! Async driver for a [`Session`].
//!
//! The player is the single place session state changes. Ticks, viewer
//! commands, load completions and interaction results are multiplexed in
//! one loop, so navigation calls are applied strictly one after another.
//! Loads and outbound calls run as spawned tasks and report back through
//! channels.

use crate::clock::Ticker;
use crate::error::{EngineError, Result};
use crate::interaction::{self, ActionId, EffectsBackend};
use crate::media::{ItemId, Sequence};
use crate::playback::{
    AdapterTiming, DeviceSettings, Loaded, MediaSurface, PlaybackAdapter, Volume,
};
use crate::session::{CloseReason, EventSender, Generation, Session};
use crate::settings::EngineConfig;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Requests from the viewer UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Next,
    Previous,
    JumpTo(usize),
    Pause,
    Resume,
    SetMuted(bool),
    ToggleMute,
    SetVolume(f32),
    VolumeUp,
    VolumeDown,
    Like(ItemId),
    Unlike(ItemId),
    ToggleLike(ItemId),
    Save(ItemId),
    Unsave(ItemId),
    ToggleSave(ItemId),
    Share(ItemId),
    OpenComposer(ItemId),
    EditReply(ItemId, String),
    /// Send `text`, or the item's reply buffer when `None`.
    SubmitReply(ItemId, Option<String>),
    CloseComposer,
    Close,
}

/// Handle for sending commands to a running player.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Command>,
}

impl PlayerHandle {
    /// Queue a command. Returns false once the player has stopped.
    pub async fn send(&self, command: Command) -> bool {
        self.tx.send(command).await.is_ok()
    }

    pub async fn close(&self) {
        let _ = self.tx.send(Command::Close).await;
    }
}

struct LoadDone {
    generation: Generation,
    result: Result<Loaded>,
}

struct EffectDone {
    action: ActionId,
    outcome: anyhow::Result<()>,
}

enum Step {
    Command(Option<Command>),
    Load(LoadDone),
    Effect(EffectDone),
    Tick(Duration),
}

pub struct Player<T: Ticker> {
    session: Session,
    adapter: Arc<PlaybackAdapter>,
    effects: Arc<dyn EffectsBackend>,
    ticker: T,
    commands: mpsc::Receiver<Command>,
    load_tx: mpsc::UnboundedSender<LoadDone>,
    load_rx: mpsc::UnboundedReceiver<LoadDone>,
    effect_tx: mpsc::UnboundedSender<EffectDone>,
    effect_rx: mpsc::UnboundedReceiver<EffectDone>,
    load_task: Option<JoinHandle<()>>,
}

impl<T: Ticker> Player<T> {
    /// Build a player and open its session on `start`.
    pub fn open(
        sequence: Sequence,
        start: usize,
        config: EngineConfig,
        surface: Arc<dyn MediaSurface>,
        effects: Arc<dyn EffectsBackend>,
        ticker: T,
        events: EventSender,
    ) -> Result<(Self, PlayerHandle)> {
        let adapter = Arc::new(PlaybackAdapter::new(
            surface,
            AdapterTiming {
                load_timeout: config.load_timeout(),
                duration_grace: config.duration_grace(),
            },
            DeviceSettings {
                muted: config.start_muted,
                volume: Volume::new(config.initial_volume),
            },
        ));
        let session = Session::open(sequence, start, config, adapter.clone(), events)?;

        let (tx, commands) = mpsc::channel(64);
        let (load_tx, load_rx) = mpsc::unbounded_channel();
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();

        let player = Self {
            session,
            adapter,
            effects,
            ticker,
            commands,
            load_tx,
            load_rx,
            effect_tx,
            effect_rx,
            load_task: None,
        };
        Ok((player, PlayerHandle { tx }))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the sequence is exhausted or the viewer closes. Dropping
    /// every [`PlayerHandle`] counts as closing.
    pub async fn run(mut self) -> CloseReason {
        self.ticker.start();

        loop {
            self.dispatch();
            if let Some(reason) = self.session.close_reason() {
                self.teardown();
                return reason;
            }

            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(done) = self.load_rx.recv() => Step::Load(done),
                Some(done) = self.effect_rx.recv() => Step::Effect(done),
                delta = self.ticker.tick() => Step::Tick(delta),
            };

            match step {
                Step::Command(Some(command)) => self.apply(command),
                Step::Command(None) => self.session.close(),
                Step::Load(done) => {
                    if self.session.load_resolved(done.generation, done.result) {
                        self.ticker.rebase();
                    }
                }
                Step::Effect(done) => self.session.effect_settled(done.action, done.outcome),
                Step::Tick(delta) => self.session.tick(delta),
            }
        }
    }

    fn apply(&mut self, command: Command) {
        tracing::debug!("Command: {:?}", command);
        let session = &mut self.session;
        let result = match command {
            Command::Next => session.next(),
            Command::Previous => session.previous(),
            Command::JumpTo(index) => session.jump_to(index),
            Command::Pause => {
                session.pause();
                Ok(())
            }
            Command::Resume => {
                session.resume();
                Ok(())
            }
            Command::SetMuted(muted) => {
                session.set_muted(muted);
                Ok(())
            }
            Command::ToggleMute => {
                session.toggle_mute();
                Ok(())
            }
            Command::SetVolume(volume) => {
                session.set_volume(volume);
                Ok(())
            }
            Command::VolumeUp => {
                session.volume_up();
                Ok(())
            }
            Command::VolumeDown => {
                session.volume_down();
                Ok(())
            }
            Command::Like(item) => session.like(&item),
            Command::Unlike(item) => session.unlike(&item),
            Command::ToggleLike(item) => session.toggle_like(&item),
            Command::Save(item) => session.save(&item),
            Command::Unsave(item) => session.unsave(&item),
            Command::ToggleSave(item) => session.toggle_save(&item),
            Command::Share(item) => session.share(&item),
            Command::OpenComposer(item) => session.open_composer(&item),
            Command::EditReply(item, text) => session.edit_reply(&item, &text),
            Command::SubmitReply(item, Some(text)) => session.submit_reply(&item, &text),
            Command::SubmitReply(item, None) => session.submit_pending_reply(&item),
            Command::CloseComposer => {
                session.close_composer();
                Ok(())
            }
            Command::Close => {
                session.close();
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!("Command rejected: {}", e);
        }
    }

    /// Start whatever work the session queued.
    fn dispatch(&mut self) {
        if let Some(request) = self.session.take_load() {
            if let Some(task) = self.load_task.take() {
                task.abort();
            }

            let adapter = self.adapter.clone();
            let tx = self.load_tx.clone();
            self.load_task = Some(tokio::spawn(async move {
                // A panicking surface must still resolve the generation.
                let result = AssertUnwindSafe(adapter.load(&request.item))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(EngineError::Load {
                            item: request.item.id.clone(),
                            reason: "media surface panicked".into(),
                        })
                    });
                let _ = tx.send(LoadDone {
                    generation: request.generation,
                    result,
                });
            }));
        }

        for request in self.session.take_effects() {
            let action = request.action;
            tracing::debug!("Issuing {} for {}", request.call.name(), request.call.item());
            let call = interaction::perform(self.effects.as_ref(), request.call);
            let tx = self.effect_tx.clone();
            tokio::spawn(async move {
                let outcome = call.await;
                let _ = tx.send(EffectDone { action, outcome });
            });
        }

        let upcoming = self.session.take_prefetch();
        if !upcoming.is_empty() {
            let adapter = self.adapter.clone();
            tokio::spawn(async move {
                if AssertUnwindSafe(adapter.prefetch(&upcoming))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::warn!("Prefetch aborted: media surface panicked");
                }
            });
        }
    }

    fn teardown(&mut self) {
        self.ticker.stop();
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
    }
}
