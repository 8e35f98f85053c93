#![forbid(unsafe_code)]

//! Sink controller.
//!
//! Binds per-pad lifecycle events to manifest operations and storage
//! commits. One [`SinkController`] serves one presentation; all handlers
//! run serially against its state (`&mut self`), and a spawned [`Sink`]
//! wraps the controller in a single owning task fed by a bounded queue.
//!
//! Backpressure: the controller issues one unit of demand per pad on the
//! outbound demand channel — once on start-of-stream, then once after each
//! fully committed write. After any error on a pad no further demand is
//! issued for it, so a demand-driven upstream stalls that pad while others
//! continue.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use syrinx_storage::Storage;

use crate::{
    events::{EventBus, SinkEvent},
    serialize::ManifestSerializer,
    track::{Changeset, ChangesetEntry, TrackCaps, TrackConfig, TrackId},
    Manifest, MediaChunk, SinkError, SinkOptions, SinkResult,
};

/// Pad lifecycle events, delivered per pad in FIFO order.
#[derive(Debug, Clone)]
pub enum PadEvent {
    /// Stream format arrived; registers the track and stores its header.
    Caps { track: TrackId, caps: TrackCaps },
    /// The pad is about to produce buffers.
    StartOfStream { track: TrackId },
    /// One encoded fragment.
    Write { track: TrackId, chunk: MediaChunk },
    /// Decoder parameters change; `init` is the new header blob.
    Discontinuity { track: TrackId, init: Bytes },
    /// No further buffers will arrive on this pad.
    EndOfStream { track: TrackId },
}

impl PadEvent {
    pub fn track(&self) -> &TrackId {
        match self {
            Self::Caps { track, .. }
            | Self::StartOfStream { track }
            | Self::Write { track, .. }
            | Self::Discontinuity { track, .. }
            | Self::EndOfStream { track } => track,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Caps { .. } => "caps",
            Self::StartOfStream { .. } => "start_of_stream",
            Self::Write { .. } => "write",
            Self::Discontinuity { .. } => "discontinuity",
            Self::EndOfStream { .. } => "end_of_stream",
        }
    }
}

/// Per-pad progress. A pad with no entry is still awaiting caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PadState {
    AwaitingStart,
    Streaming,
    Ended,
}

/// The sink state machine. Handlers must not run concurrently; the hosting
/// task owns the controller and delivers events one at a time.
pub struct SinkController<S> {
    options: SinkOptions,
    storage: S,
    manifest: Manifest,
    serializer: Box<dyn ManifestSerializer>,
    pads: HashMap<TrackId, PadState>,
    /// Pads whose first committed write still owes a `StreamPlayable`.
    to_notify: HashSet<TrackId>,
    events: EventBus,
    demand_tx: mpsc::Sender<TrackId>,
}

impl<S: Storage> SinkController<S> {
    /// Create a controller and the receiving side of its demand channel.
    /// The upstream producer should send one buffer per received demand.
    pub fn new(options: SinkOptions, storage: S) -> (Self, mpsc::Receiver<TrackId>) {
        let (demand_tx, demand_rx) = mpsc::channel(options.demand_capacity.max(1));
        let serializer = options.serializer.create();
        let manifest = Manifest::new(options.manifest_name.clone());
        let events = EventBus::new(options.event_capacity);
        let controller = Self {
            options,
            storage,
            manifest,
            serializer,
            pads: HashMap::new(),
            to_notify: HashSet::new(),
            events,
            demand_tx,
        };
        (controller, demand_rx)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Dispatch one pad event.
    pub async fn handle(&mut self, event: PadEvent) -> SinkResult<()> {
        trace!(track = %event.track(), event = event.kind(), "pad event");
        match event {
            PadEvent::Caps { track, caps } => self.handle_caps(track, caps).await,
            PadEvent::StartOfStream { track } => self.handle_start_of_stream(track).await,
            PadEvent::Write { track, chunk } => self.handle_write(track, chunk).await,
            PadEvent::Discontinuity { track, init } => {
                self.handle_discontinuity(track, init).await
            }
            PadEvent::EndOfStream { track } => self.handle_end_of_stream(track).await,
        }
    }

    /// Register the track and persist its first header blob.
    pub async fn handle_caps(&mut self, track: TrackId, caps: TrackCaps) -> SinkResult<()> {
        if self.pads.contains_key(&track) {
            return Err(SinkError::DuplicateTrack(track));
        }
        let config = TrackConfig {
            id: track.clone(),
            content_type: caps.content_type,
            init_extension: caps.init_extension,
            fragment_extension: caps.fragment_extension,
            target_segment_duration: self.options.target_fragment_duration,
            target_window_duration: self.options.target_window_duration,
            persisted: self.options.persist,
        };
        let header_name = self.manifest.add_track(config)?;
        debug!(track = %track, header = %header_name, "caps accepted");

        // The pad advances only once the header is durably stored; retry
        // policy belongs to the adapter.
        self.storage.store_init(&header_name, caps.init).await?;
        self.pads.insert(track, PadState::AwaitingStart);
        Ok(())
    }

    /// Arm the pad: it owes a playability notification and one buffer of
    /// demand.
    pub async fn handle_start_of_stream(&mut self, track: TrackId) -> SinkResult<()> {
        match self.pads.get_mut(&track) {
            Some(state @ PadState::AwaitingStart) => *state = PadState::Streaming,
            _ => {
                return Err(SinkError::InvalidTransition {
                    track,
                    event: "start_of_stream",
                })
            }
        }
        debug!(track = %track, "streaming");
        self.to_notify.insert(track.clone());
        self.issue_demand(&track);
        Ok(())
    }

    /// Commit one fragment: manifest append, segment blob, evictions,
    /// manifest republication (windowed mode), playability notification,
    /// then one unit of demand.
    ///
    /// On a storage error the manifest mutation stays committed (the
    /// in-memory view is the source of truth and the next successful
    /// publication reissues the whole document set), no demand is issued,
    /// and the error propagates.
    pub async fn handle_write(&mut self, track: TrackId, chunk: MediaChunk) -> SinkResult<()> {
        if self.pads.get(&track) != Some(&PadState::Streaming) {
            return Err(SinkError::InvalidTransition {
                track,
                event: "write",
            });
        }

        let changeset = self.manifest.add_chunk(&track, &chunk)?;
        self.apply_changeset(&track, &chunk, changeset).await?;

        if self.options.windowed {
            self.publish_manifests().await?;
        }

        if self.to_notify.remove(&track) {
            info!(track = %track, "stream playable");
            self.events.publish(SinkEvent::StreamPlayable {
                track: track.clone(),
            });
        }

        self.issue_demand(&track);
        Ok(())
    }

    /// Rotate the header: the next fragment opens a discontinuity and the
    /// new init blob is stored now under the returned name.
    pub async fn handle_discontinuity(&mut self, track: TrackId, init: Bytes) -> SinkResult<()> {
        if self.pads.get(&track) != Some(&PadState::Streaming) {
            return Err(SinkError::InvalidTransition {
                track,
                event: "discontinuity",
            });
        }
        let header_name = self.manifest.discontinue_track(&track)?;
        self.storage.store_init(&header_name, init).await?;
        debug!(track = %track, header = %header_name, "discontinuity armed");
        self.events.publish(SinkEvent::Discontinuity { track, header_name });
        Ok(())
    }

    /// Finish the track and republish manifests regardless of windowed
    /// mode, so the end-of-list marker reaches consumers.
    pub async fn handle_end_of_stream(&mut self, track: TrackId) -> SinkResult<()> {
        if self.pads.get(&track) != Some(&PadState::Streaming) {
            return Err(SinkError::InvalidTransition {
                track,
                event: "end_of_stream",
            });
        }
        let changeset = self.manifest.finish_track(&track)?;
        debug_assert!(changeset.is_empty());

        self.publish_manifests().await?;
        self.pads.insert(track.clone(), PadState::Ended);
        info!(track = %track, "end of stream");
        self.events.publish(SinkEvent::TrackEnded { track });
        Ok(())
    }

    async fn apply_changeset(
        &mut self,
        track: &TrackId,
        chunk: &MediaChunk,
        changeset: Changeset,
    ) -> SinkResult<()> {
        for entry in &changeset.to_add {
            match entry {
                ChangesetEntry::Header { name } => {
                    // The blob was persisted when the discontinuity was
                    // requested; this entry only positions the header in
                    // the playlist.
                    trace!(track = %track, header = %name, "header takes effect");
                }
                ChangesetEntry::Segment(segment) => {
                    self.storage
                        .store_segment(&segment.name, chunk.payload.clone())
                        .await?;
                    trace!(track = %track, segment = %segment.name, "segment committed");
                    self.events.publish(SinkEvent::SegmentStored {
                        track: track.clone(),
                        name: segment.name.clone(),
                        byte_size: segment.byte_size,
                    });
                }
            }
        }

        if !changeset.to_remove.is_empty() {
            self.storage.remove_segments(&changeset.to_remove).await?;
            debug!(track = %track, evicted = changeset.to_remove.len(), "stale segments removed");
            self.events.publish(SinkEvent::SegmentsEvicted {
                track: track.clone(),
                names: changeset.to_remove,
            });
        }
        Ok(())
    }

    async fn publish_manifests(&mut self) -> SinkResult<()> {
        let serialized = self.serializer.serialize(&self.manifest)?;
        let blobs = serialized.into_blobs();
        self.storage.store_manifests(&blobs).await?;
        trace!(count = blobs.len(), "manifests published");
        self.events
            .publish(SinkEvent::ManifestsPublished { count: blobs.len() });
        Ok(())
    }

    fn issue_demand(&self, track: &TrackId) {
        if self.demand_tx.try_send(track.clone()).is_err() {
            // A full channel means the producer is not consuming demand;
            // dropping the token stalls the pad rather than the sink.
            warn!(track = %track, "demand channel saturated");
        }
    }
}

/// Handle to a sink running in its own task.
///
/// Events sent through the handle are processed serially by the owning
/// task; the bounded queue provides the cooperative execution model.
pub struct Sink {
    tx: mpsc::Sender<PadEvent>,
    events: EventBus,
    task: tokio::task::JoinHandle<()>,
}

impl Sink {
    /// Spawn a sink over the given storage. Returns the handle and the
    /// demand channel: the producer should send one buffer per demand
    /// token received.
    pub fn spawn<S>(options: SinkOptions, storage: S) -> (Self, mpsc::Receiver<TrackId>)
    where
        S: Storage + Send + 'static,
    {
        let queue_capacity = options.queue_capacity.max(1);
        let (controller, demand_rx) = SinkController::new(options, storage);
        let events = controller.events().clone();
        let (tx, mut rx) = mpsc::channel::<PadEvent>(queue_capacity);

        let task = tokio::spawn(async move {
            let mut controller = controller;
            while let Some(event) = rx.recv().await {
                let track = event.track().clone();
                let kind = event.kind();
                if let Err(err) = controller.handle(event).await {
                    warn!(track = %track, event = kind, %err, "pad event failed");
                    controller.events().publish(SinkEvent::Error {
                        track: Some(track),
                        message: err.to_string(),
                    });
                }
            }
            debug!("pad event queue closed; sink task exiting");
        });

        (Self { tx, events, task }, demand_rx)
    }

    /// Subscribe to sink notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }

    pub async fn send(&self, event: PadEvent) -> SinkResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SinkError::ChannelClosed)
    }

    pub async fn caps(&self, track: impl Into<TrackId>, caps: TrackCaps) -> SinkResult<()> {
        self.send(PadEvent::Caps {
            track: track.into(),
            caps,
        })
        .await
    }

    pub async fn start_of_stream(&self, track: impl Into<TrackId>) -> SinkResult<()> {
        self.send(PadEvent::StartOfStream {
            track: track.into(),
        })
        .await
    }

    pub async fn write(&self, track: impl Into<TrackId>, chunk: MediaChunk) -> SinkResult<()> {
        self.send(PadEvent::Write {
            track: track.into(),
            chunk,
        })
        .await
    }

    pub async fn discontinuity(&self, track: impl Into<TrackId>, init: Bytes) -> SinkResult<()> {
        self.send(PadEvent::Discontinuity {
            track: track.into(),
            init,
        })
        .await
    }

    pub async fn end_of_stream(&self, track: impl Into<TrackId>) -> SinkResult<()> {
        self.send(PadEvent::EndOfStream {
            track: track.into(),
        })
        .await
    }

    /// Close the queue and wait for the task to drain in-flight events.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}
