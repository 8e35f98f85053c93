#![forbid(unsafe_code)]

use tokio::sync::broadcast;

use crate::track::TrackId;

/// Notifications emitted by the sink for monitoring and host integration.
#[derive(Clone, Debug)]
pub enum SinkEvent {
    /// The track's first fragment is committed and referenced by the
    /// published manifests. Emitted exactly once per track.
    StreamPlayable { track: TrackId },
    /// A media segment blob was written.
    SegmentStored {
        track: TrackId,
        name: String,
        byte_size: u64,
    },
    /// Segments slid out of the window and were deleted from storage.
    SegmentsEvicted { track: TrackId, names: Vec<String> },
    /// A set of manifests was (re)published.
    ManifestsPublished { count: usize },
    /// A discontinuity was requested; the new header blob is stored.
    Discontinuity { track: TrackId, header_name: String },
    /// The track received end-of-stream and its playlist carries the
    /// end-of-list marker.
    TrackEnded { track: TrackId },
    /// A pad event failed. The pad receives no further demand.
    Error {
        track: Option<TrackId>,
        message: String,
    },
}

/// Event bus for the sink.
///
/// All components receive a cloned `EventBus` and publish events directly.
/// `publish()` is a sync call; if there are no subscribers, events are
/// silently dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SinkEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: SinkEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events.
    ///
    /// Each subscriber gets an independent receiver. Slow subscribers
    /// receive `RecvError::Lagged(n)` instead of blocking producers.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }
}
