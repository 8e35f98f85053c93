#![forbid(unsafe_code)]

use std::time::Duration;

use crate::serialize::SerializerKind;

/// Sink configuration.
///
/// The storage adapter is passed separately to the controller constructor.
#[derive(Clone, Debug)]
pub struct SinkOptions {
    /// Base name for the master manifest.
    pub manifest_name: String,
    /// Output dialect.
    pub serializer: SerializerKind,
    /// Republish manifests after every fragment. When `false`, manifests
    /// are written only at end-of-stream.
    pub windowed: bool,
    /// Eviction threshold per track; `None` keeps every segment live.
    pub target_window_duration: Option<Duration>,
    /// Advisory upper bound, seeds each track's recorded maximum segment
    /// duration.
    pub target_fragment_duration: Duration,
    /// Retain evicted segments so a track can be replayed from the
    /// beginning (VOD view of a live stream).
    pub persist: bool,
    /// Capacity of the events broadcast channel.
    pub event_capacity: usize,
    /// Capacity of the bounded pad-event queue of a spawned sink.
    pub queue_capacity: usize,
    /// Capacity of the outbound demand channel.
    pub demand_capacity: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            manifest_name: "index".to_string(),
            serializer: SerializerKind::Hls,
            windowed: true,
            target_window_duration: None,
            target_fragment_duration: Duration::ZERO,
            persist: false,
            event_capacity: 32,
            queue_capacity: 8,
            demand_capacity: 16,
        }
    }
}

impl SinkOptions {
    pub fn new(manifest_name: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
            ..Self::default()
        }
    }

    /// Set the output dialect.
    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    /// Enable or disable per-fragment manifest republication.
    pub fn with_windowed(mut self, windowed: bool) -> Self {
        self.windowed = windowed;
        self
    }

    /// Set the sliding-window eviction threshold.
    pub fn with_target_window_duration(mut self, duration: Option<Duration>) -> Self {
        self.target_window_duration = duration;
        self
    }

    /// Set the advisory fragment duration seed.
    pub fn with_target_fragment_duration(mut self, duration: Duration) -> Self {
        self.target_fragment_duration = duration;
        self
    }

    /// Retain evicted segments for from-the-beginning replay.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the pad-event queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the demand channel capacity.
    pub fn with_demand_capacity(mut self, capacity: usize) -> Self {
        self.demand_capacity = capacity;
        self
    }
}
