//! Playback and interaction engine for story and reel viewers.
//!
//! A [`Session`] walks an ordered [`Sequence`] of images, videos and text
//! cards, advancing on a timer and tracking which items were seen. Likes,
//! saves, replies and shares are applied optimistically and confirmed by an
//! [`EffectsBackend`]. The async [`Player`] drives a session from a
//! [`Ticker`], viewer [`Command`]s and the results of spawned work.

pub mod clock;
pub mod demo;
pub mod error;
pub mod interaction;
pub mod media;
pub mod navigation;
pub mod playback;
pub mod player;
pub mod remote;
pub mod session;
pub mod settings;
pub mod timeline;

pub use clock::{IntervalTicker, ManualClock, ManualTicker, Ticker};
pub use error::{EngineError, ErrorKind, Result};
pub use interaction::{EffectsBackend, InteractionState};
pub use media::{ItemId, MediaItem, MediaKind, PayloadRef, Sequence};
pub use navigation::SegmentState;
pub use playback::{DeviceSettings, MediaSurface, PlaybackAdapter, PlayerState, Volume};
pub use player::{Command, Player, PlayerHandle};
pub use session::{event_channel, CloseReason, EngineEvent, EventReceiver, EventSender, Session};
pub use settings::{AdvanceMode, EngineConfig, Settings};
pub use timeline::Target;
