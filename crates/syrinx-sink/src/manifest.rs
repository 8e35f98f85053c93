#![forbid(unsafe_code)]

//! Presentation-level coordinator.
//!
//! A [`Manifest`] owns the tracks of one presentation and dispatches each
//! operation to the addressed [`Track`], returning its changeset. Tracks
//! are kept in a `BTreeMap` so iteration (and therefore serialization) is
//! deterministic.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    track::{Changeset, Track, TrackConfig, TrackId},
    MediaChunk, SinkError, SinkResult,
};

pub struct Manifest {
    name: String,
    tracks: BTreeMap<TrackId, Track>,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new track. Returns the name of its first header blob so
    /// the caller can persist the init bytes.
    pub fn add_track(&mut self, config: TrackConfig) -> SinkResult<String> {
        if self.tracks.contains_key(&config.id) {
            return Err(SinkError::DuplicateTrack(config.id));
        }
        let id = config.id.clone();
        let track = Track::new(&self.name, config);
        let header_name = track.header_name().to_string();
        debug!(track = %id, header = %header_name, "track added to manifest");
        self.tracks.insert(id, track);
        Ok(header_name)
    }

    pub fn add_chunk(&mut self, id: &TrackId, chunk: &MediaChunk) -> SinkResult<Changeset> {
        self.track_mut(id)?.add_chunk(chunk)
    }

    /// Request a discontinuity on the addressed track; returns the new
    /// header name.
    pub fn discontinue_track(&mut self, id: &TrackId) -> SinkResult<String> {
        self.track_mut(id)?.discontinue()
    }

    pub fn finish_track(&mut self, id: &TrackId) -> SinkResult<Changeset> {
        self.track_mut(id)?.finish()
    }

    /// Restore a persisted track's full history (media sequence zero).
    pub fn from_beginning(&mut self, id: &TrackId) -> SinkResult<()> {
        self.track_mut(id)?.from_beginning()
    }

    pub fn has_track(&self, id: &TrackId) -> bool {
        self.tracks.contains_key(id)
    }

    pub fn is_persisted(&self, id: &TrackId) -> SinkResult<bool> {
        Ok(self.track(id)?.is_persisted())
    }

    /// Every retained segment name, per track, in presentation order.
    pub fn all_segments_per_track(&self) -> BTreeMap<TrackId, Vec<String>> {
        self.tracks
            .iter()
            .map(|(id, track)| (id.clone(), track.all_segments()))
            .collect()
    }

    pub fn track(&self, id: &TrackId) -> SinkResult<&Track> {
        self.tracks
            .get(id)
            .ok_or_else(|| SinkError::UnknownTrack(id.clone()))
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_mut(&mut self, id: &TrackId) -> SinkResult<&mut Track> {
        self.tracks
            .get_mut(id)
            .ok_or_else(|| SinkError::UnknownTrack(id.clone()))
    }
}
