//! Error types for the playback engine.
//!
//! `EngineError` is returned from API calls that can be misused (bad index,
//! unknown item, empty reply). Runtime media and interaction faults never
//! surface as `Err`; they are published as advisory `ErrorKind`s on the
//! event stream instead.

use crate::media::ItemId;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("sequence must contain at least one item")]
    EmptySequence,

    #[error("start index {index} is out of range for a sequence of {len}")]
    StartOutOfRange { index: usize, len: usize },

    #[error("item id `{0}` appears more than once in the sequence")]
    DuplicateItem(ItemId),

    #[error("index {index} is out of range for a sequence of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("item `{0}` is not part of this session")]
    UnknownItem(ItemId),

    #[error("reply text is empty")]
    EmptyReply,

    #[error("session is closed")]
    SessionClosed,

    #[error("failed to load `{item}`: {reason}")]
    Load { item: ItemId, reason: String },

    #[error("invalid settings: {0}")]
    Settings(String),
}

/// Advisory fault categories carried by `EngineEvent::Error`.
///
/// None of these stop the session: load failures skip the item, missing
/// durations fall back to the engine maximum and failed interactions are
/// reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LoadFailed,
    DurationUnavailable,
    InteractionFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LoadFailed => "load_failed",
            ErrorKind::DurationUnavailable => "duration_unavailable",
            ErrorKind::InteractionFailed => "interaction_failed",
        }
    }
}
