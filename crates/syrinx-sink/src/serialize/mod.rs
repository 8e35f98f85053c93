#![forbid(unsafe_code)]

//! Manifest serialization.
//!
//! A serializer turns the in-memory [`Manifest`] into named text documents:
//! one master manifest plus one sub-manifest per track. The output dialect
//! is pluggable; [`HlsSerializer`] is the reference implementation.

mod hls;

pub use hls::HlsSerializer;

use crate::{Manifest, SinkResult, TrackId};

/// One serialized manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedManifest {
    pub name: String,
    pub content: String,
}

/// Full output of one serializer pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedManifests {
    pub master: SerializedManifest,
    /// Sub-manifests, keyed by track. Empty for single-track
    /// presentations, where the master is the track manifest.
    pub per_track: Vec<(TrackId, SerializedManifest)>,
}

impl SerializedManifests {
    /// Named text blobs in publication order, master first.
    pub fn into_blobs(self) -> Vec<(String, String)> {
        let mut blobs = vec![(self.master.name, self.master.content)];
        blobs.extend(
            self.per_track
                .into_iter()
                .map(|(_, manifest)| (manifest.name, manifest.content)),
        );
        blobs
    }
}

/// Capability a manifest dialect must provide.
pub trait ManifestSerializer: Send + Sync {
    fn serialize(&self, manifest: &Manifest) -> SinkResult<SerializedManifests>;
}

/// Output dialect selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializerKind {
    #[default]
    Hls,
}

impl SerializerKind {
    pub fn create(self) -> Box<dyn ManifestSerializer> {
        match self {
            Self::Hls => Box::new(HlsSerializer),
        }
    }
}
