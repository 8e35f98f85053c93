#![forbid(unsafe_code)]

//! `syrinx-sink`
//!
//! Sink element for a streaming media pipeline: ingests timestamped
//! encoded fragments per track and publishes an HTTP Adaptive Streaming
//! presentation — textual manifests plus the header and segment blobs they
//! reference — through a [`syrinx_storage::Storage`] adapter.
//!
//! Layers, leaves first:
//! - [`Track`] — per-input-stream state: segment naming, monotonic
//!   sequencing, sliding-window eviction, discontinuities, end-of-stream.
//! - [`Manifest`] — tracks keyed by id; each mutation yields a
//!   [`Changeset`] telling storage what to add and remove.
//! - [`serialize`] — pluggable manifest dialects; [`HlsSerializer`] is the
//!   reference (RFC 8216).
//! - [`SinkController`] / [`Sink`] — the per-pad state machine binding
//!   pipeline events to manifest operations and storage commits, with
//!   demand-driven backpressure and an [`EventBus`] for notifications.

mod chunk;
mod error;
mod events;
mod manifest;
mod options;
pub mod serialize;
mod sink;
mod track;

pub use chunk::MediaChunk;
pub use error::{SinkError, SinkResult};
pub use events::{EventBus, SinkEvent};
pub use manifest::Manifest;
pub use options::SinkOptions;
pub use serialize::{
    HlsSerializer, ManifestSerializer, SerializedManifest, SerializedManifests, SerializerKind,
};
pub use sink::{PadEvent, Sink, SinkController};
pub use track::{
    Changeset, ChangesetEntry, ContentType, Segment, Track, TrackCaps, TrackConfig, TrackId,
};
