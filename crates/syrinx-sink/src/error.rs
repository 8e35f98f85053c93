#![forbid(unsafe_code)]

use thiserror::Error;

use crate::track::TrackId;

/// Result type used by `syrinx-sink`.
pub type SinkResult<T> = Result<T, SinkError>;

/// Sink orchestration errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Adapter failure, propagated verbatim. The in-memory manifest keeps
    /// the attempted mutation; the next successful publication reissues the
    /// full document set.
    #[error("storage error: {0}")]
    Storage(#[from] syrinx_storage::StorageError),

    #[error("track {0} is finished")]
    TrackFinished(TrackId),

    #[error("duplicate track: {0}")]
    DuplicateTrack(TrackId),

    #[error("unknown track: {0}")]
    UnknownTrack(TrackId),

    #[error("track {0} is not persisted")]
    NotPersisted(TrackId),

    #[error("unsupported topology: {0}")]
    UnsupportedTopology(String),

    #[error("pad {track} cannot accept {event} in its current state")]
    InvalidTransition {
        track: TrackId,
        event: &'static str,
    },

    #[error("sink task is gone")]
    ChannelClosed,
}
