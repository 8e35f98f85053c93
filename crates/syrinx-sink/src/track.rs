#![forbid(unsafe_code)]

//! Per-track sink state.
//!
//! A [`Track`] owns the ordered segment sequence for one input stream: it
//! assigns segment and header names, keeps the monotonic sequence counter,
//! applies the sliding-window eviction policy, and records discontinuities
//! and end-of-stream. Every mutation returns a [`Changeset`] describing
//! what storage must add and remove to stay in lockstep with the playlist.

use std::{collections::VecDeque, fmt, time::Duration};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{MediaChunk, SinkError, SinkResult};

/// Opaque identifier for one input stream (pad) within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Audio,
    Video,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream format advertised by an upstream pad on arrival.
#[derive(Debug, Clone)]
pub struct TrackCaps {
    pub content_type: ContentType,
    /// File extension for init blobs (e.g. `"mp4"`).
    pub init_extension: String,
    /// File extension for media fragments (e.g. `"m4s"`).
    pub fragment_extension: String,
    /// Raw initialization bytes for the first header blob.
    pub init: Bytes,
}

/// Configuration for creating a [`Track`].
#[derive(Debug, Clone)]
pub struct TrackConfig {
    pub id: TrackId,
    pub content_type: ContentType,
    pub init_extension: String,
    pub fragment_extension: String,
    /// Seed for the recorded maximum segment duration.
    pub target_segment_duration: Duration,
    /// `None` means an unbounded window: nothing is ever evicted.
    pub target_window_duration: Option<Duration>,
    /// Retain evicted segments for later [`Track::from_beginning`] replay.
    pub persisted: bool,
}

/// Descriptor of one media segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub duration: Duration,
    pub byte_size: u64,
    pub independent: bool,
    /// `false` for an in-progress partial segment not yet sealed.
    pub complete: bool,
    /// True when this segment opens a discontinuity (decoder reset).
    pub discontinuity: bool,
    /// Name of the header blob in effect for this segment.
    pub header_name: String,
}

/// One entry on the to-add side of a [`Changeset`], in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangesetEntry {
    /// A fresh header takes effect before the following segment. The blob
    /// itself is persisted when the discontinuity is requested.
    Header { name: String },
    Segment(Segment),
}

/// What storage must change after a track mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub to_add: Vec<ChangesetEntry>,
    /// Names of evicted segments to delete. Empty for persisted tracks.
    pub to_remove: Vec<String>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// State machine for one input stream.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    content_type: ContentType,
    manifest_name: String,
    init_extension: String,
    fragment_extension: String,

    header_name: String,
    header_seq: u64,

    /// Maximum segment duration ever observed; never decreases.
    target_segment_duration: Duration,
    target_window_duration: Option<Duration>,

    segments: VecDeque<Segment>,
    stale_segments: Vec<Segment>,

    /// Sequence number of the next segment to be appended.
    current_seq_num: u64,

    persisted: bool,
    finished: bool,
    discontinuity_pending: bool,
}

impl Track {
    pub fn new(manifest_name: &str, config: TrackConfig) -> Self {
        let header_name = format!(
            "{}_{}_header_0.{}",
            manifest_name, config.id, config.init_extension
        );
        Self {
            id: config.id,
            content_type: config.content_type,
            manifest_name: manifest_name.to_string(),
            init_extension: config.init_extension,
            fragment_extension: config.fragment_extension,
            header_name,
            header_seq: 0,
            target_segment_duration: config.target_segment_duration,
            target_window_duration: config.target_window_duration,
            segments: VecDeque::new(),
            stale_segments: Vec::new(),
            current_seq_num: 0,
            persisted: config.persisted,
            finished: false,
            discontinuity_pending: false,
        }
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Name of the header blob currently in effect.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Live (windowed) segments, oldest first.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Sequence number of the first live segment.
    pub fn media_sequence(&self) -> u64 {
        self.current_seq_num - self.segments.len() as u64
    }

    pub fn current_seq_num(&self) -> u64 {
        self.current_seq_num
    }

    /// Maximum segment duration observed so far (monotone).
    pub fn target_segment_duration(&self) -> Duration {
        self.target_segment_duration
    }

    pub fn target_window_duration(&self) -> Option<Duration> {
        self.target_window_duration
    }

    /// Sum of live segment durations.
    pub fn live_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append one fragment as a new segment.
    ///
    /// Assigns the segment name, advances the sequence counter, raises the
    /// recorded maximum duration, tags a pending discontinuity, and applies
    /// windowed eviction. The returned changeset lists the new header (on
    /// discontinuity) and segment to add, plus evicted segment names to
    /// remove for non-persisted tracks.
    pub fn add_chunk(&mut self, chunk: &MediaChunk) -> SinkResult<Changeset> {
        if self.finished {
            return Err(SinkError::TrackFinished(self.id.clone()));
        }

        let name = format!(
            "{}_{}_segment_{}.{}",
            self.manifest_name, self.id, self.current_seq_num, self.fragment_extension
        );
        let discontinuity = self.discontinuity_pending;
        self.discontinuity_pending = false;

        let segment = Segment {
            name,
            duration: chunk.duration,
            byte_size: chunk.byte_size(),
            independent: chunk.independent,
            complete: chunk.complete,
            discontinuity,
            header_name: self.header_name.clone(),
        };

        self.current_seq_num += 1;
        if chunk.duration > self.target_segment_duration {
            self.target_segment_duration = chunk.duration;
        }

        let mut changeset = Changeset::default();
        if discontinuity {
            changeset.to_add.push(ChangesetEntry::Header {
                name: self.header_name.clone(),
            });
        }
        trace!(
            track = %self.id,
            segment = %segment.name,
            duration_ms = chunk.duration.as_millis() as u64,
            discontinuity,
            "segment appended"
        );
        changeset.to_add.push(ChangesetEntry::Segment(segment.clone()));
        self.segments.push_back(segment);

        self.evict(&mut changeset);
        Ok(changeset)
    }

    /// Evict head segments until the live duration fits the window.
    ///
    /// Strictly head-first; an incomplete (unsealed) head blocks eviction
    /// until it seals.
    fn evict(&mut self, changeset: &mut Changeset) {
        let Some(window) = self.target_window_duration else {
            return;
        };

        let mut live = self.live_duration();
        while live > window {
            match self.segments.front() {
                Some(head) if head.complete => {}
                _ => break,
            }
            let Some(seg) = self.segments.pop_front() else {
                break;
            };
            live = live.saturating_sub(seg.duration);
            debug!(track = %self.id, segment = %seg.name, "segment evicted from window");
            if self.persisted {
                self.stale_segments.push(seg);
            } else {
                changeset.to_remove.push(seg.name);
            }
        }
    }

    /// Request a discontinuity: the next appended segment is preceded by a
    /// fresh header. Returns the new header name so the caller can persist
    /// the new init blob.
    pub fn discontinue(&mut self) -> SinkResult<String> {
        if self.finished {
            return Err(SinkError::TrackFinished(self.id.clone()));
        }
        self.header_seq += 1;
        self.header_name = format!(
            "{}_{}_header_{}.{}",
            self.manifest_name, self.id, self.header_seq, self.init_extension
        );
        self.discontinuity_pending = true;
        debug!(track = %self.id, header = %self.header_name, "discontinuity pending");
        Ok(self.header_name.clone())
    }

    /// Mark the track finished. Serialization thereafter includes the
    /// end-of-list marker; further mutations fail.
    pub fn finish(&mut self) -> SinkResult<Changeset> {
        if self.finished {
            return Err(SinkError::TrackFinished(self.id.clone()));
        }
        self.finished = true;
        debug!(track = %self.id, "track finished");
        Ok(Changeset::default())
    }

    /// Prepend all evicted-but-retained segments back onto the live
    /// sequence, restoring a from-the-start (VOD) view. Only valid for
    /// persisted tracks.
    pub fn from_beginning(&mut self) -> SinkResult<()> {
        if !self.persisted {
            return Err(SinkError::NotPersisted(self.id.clone()));
        }
        // Prepending everything restores |segments| == current_seq_num,
        // which makes media_sequence zero by definition.
        for seg in self.stale_segments.drain(..).rev() {
            self.segments.push_front(seg);
        }
        Ok(())
    }

    /// Names of every segment retained for this track, stale first, in
    /// presentation order.
    pub fn all_segments(&self) -> Vec<String> {
        self.stale_segments
            .iter()
            .chain(self.segments.iter())
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn chunk(secs: f64) -> MediaChunk {
        MediaChunk::new(
            Bytes::from_static(b"payload"),
            Duration::from_secs_f64(secs),
        )
    }

    fn config(window: Option<Duration>, persisted: bool) -> TrackConfig {
        TrackConfig {
            id: TrackId::from("v"),
            content_type: ContentType::Video,
            init_extension: "mp4".into(),
            fragment_extension: "m4s".into(),
            target_segment_duration: Duration::ZERO,
            target_window_duration: window,
            persisted,
        }
    }

    #[fixture]
    fn unbounded_track() -> Track {
        Track::new("index", config(None, false))
    }

    #[fixture]
    fn windowed_track() -> Track {
        Track::new("index", config(Some(Duration::from_secs(7)), false))
    }

    fn added_segment(changeset: &Changeset) -> &Segment {
        changeset
            .to_add
            .iter()
            .find_map(|entry| match entry {
                ChangesetEntry::Segment(seg) => Some(seg),
                ChangesetEntry::Header { .. } => None,
            })
            .expect("changeset must contain the appended segment")
    }

    #[rstest]
    fn names_and_sequence_numbers(mut unbounded_track: Track) {
        let c0 = unbounded_track.add_chunk(&chunk(4.0)).unwrap();
        let c1 = unbounded_track.add_chunk(&chunk(5.0)).unwrap();

        assert_eq!(added_segment(&c0).name, "index_v_segment_0.m4s");
        assert_eq!(added_segment(&c1).name, "index_v_segment_1.m4s");
        assert_eq!(unbounded_track.current_seq_num(), 2);
        assert_eq!(unbounded_track.media_sequence(), 0);
        assert_eq!(unbounded_track.header_name(), "index_v_header_0.mp4");
    }

    #[rstest]
    fn media_sequence_invariant_holds_through_eviction(mut windowed_track: Track) {
        for i in 0..40 {
            let secs = 2.0 + f64::from(i % 5);
            windowed_track.add_chunk(&chunk(secs)).unwrap();

            // media_sequence + |segments| == current_seq_num, always.
            assert_eq!(
                windowed_track.media_sequence() + windowed_track.segment_count() as u64,
                windowed_track.current_seq_num()
            );
            // Post-eviction window bound.
            assert!(windowed_track.live_duration() <= Duration::from_secs(7));
        }
    }

    #[rstest]
    fn eviction_removes_head_segments(mut windowed_track: Track) {
        let c0 = windowed_track.add_chunk(&chunk(4.0)).unwrap();
        assert!(c0.to_remove.is_empty());

        // 4 + 5 = 9 > 7: the head goes.
        let c1 = windowed_track.add_chunk(&chunk(5.0)).unwrap();
        assert_eq!(c1.to_remove, vec!["index_v_segment_0.m4s".to_string()]);

        // 5 + 3 = 8 > 7: the next head goes too.
        let c2 = windowed_track.add_chunk(&chunk(3.0)).unwrap();
        assert_eq!(c2.to_remove, vec!["index_v_segment_1.m4s".to_string()]);

        assert_eq!(windowed_track.media_sequence(), 2);
        assert_eq!(windowed_track.segment_count(), 1);
    }

    #[rstest]
    fn removed_segments_form_a_prefix() {
        let mut track = Track::new("index", config(Some(Duration::from_secs(10)), false));
        let mut appended: Vec<String> = Vec::new();
        let mut removed: Vec<String> = Vec::new();

        for i in 0..25 {
            let changeset = track.add_chunk(&chunk(1.0 + f64::from(i % 4))).unwrap();
            appended.push(added_segment(&changeset).name.clone());
            removed.extend(changeset.to_remove);
        }

        assert_eq!(removed, appended[..removed.len()].to_vec());
    }

    #[rstest]
    fn incomplete_head_blocks_eviction() {
        let mut track = Track::new("index", config(Some(Duration::from_secs(5)), false));
        track
            .add_chunk(&chunk(4.0).with_complete(false))
            .unwrap();

        // 4 + 4 = 8 > 5, but the unsealed head is not evictable.
        let changeset = track.add_chunk(&chunk(4.0)).unwrap();
        assert!(changeset.to_remove.is_empty());
        assert_eq!(track.segment_count(), 2);
    }

    #[rstest]
    fn persisted_eviction_retains_stale_segments() {
        let mut track = Track::new("index", config(Some(Duration::from_secs(7)), true));
        track.add_chunk(&chunk(4.0)).unwrap();
        track.add_chunk(&chunk(5.0)).unwrap();
        let c2 = track.add_chunk(&chunk(3.0)).unwrap();

        assert!(c2.to_remove.is_empty());
        assert_eq!(track.media_sequence(), 2);
        assert_eq!(
            track.all_segments(),
            vec![
                "index_v_segment_0.m4s",
                "index_v_segment_1.m4s",
                "index_v_segment_2.m4s",
            ]
        );
    }

    #[rstest]
    fn from_beginning_restores_full_history() {
        let mut track = Track::new("index", config(Some(Duration::from_secs(7)), true));
        for secs in [4.0, 5.0, 3.0, 2.0] {
            track.add_chunk(&chunk(secs)).unwrap();
        }
        assert!(track.media_sequence() > 0);

        track.from_beginning().unwrap();
        assert_eq!(track.media_sequence(), 0);
        assert_eq!(track.segment_count(), 4);
        assert_eq!(
            track.all_segments(),
            vec![
                "index_v_segment_0.m4s",
                "index_v_segment_1.m4s",
                "index_v_segment_2.m4s",
                "index_v_segment_3.m4s",
            ]
        );
    }

    #[rstest]
    fn from_beginning_requires_persistence(mut unbounded_track: Track) {
        assert!(matches!(
            unbounded_track.from_beginning(),
            Err(SinkError::NotPersisted(_))
        ));
    }

    #[rstest]
    fn finished_track_rejects_mutation(mut unbounded_track: Track) {
        let changeset = unbounded_track.finish().unwrap();
        assert!(changeset.is_empty());
        assert!(unbounded_track.is_finished());

        assert!(matches!(
            unbounded_track.add_chunk(&chunk(1.0)),
            Err(SinkError::TrackFinished(_))
        ));
        assert!(matches!(
            unbounded_track.discontinue(),
            Err(SinkError::TrackFinished(_))
        ));
        assert!(matches!(
            unbounded_track.finish(),
            Err(SinkError::TrackFinished(_))
        ));
    }

    #[rstest]
    fn discontinuity_emits_header_then_segment(mut unbounded_track: Track) {
        unbounded_track.add_chunk(&chunk(4.0)).unwrap();
        unbounded_track.add_chunk(&chunk(4.0)).unwrap();

        let new_header = unbounded_track.discontinue().unwrap();
        assert_eq!(new_header, "index_v_header_1.mp4");
        assert_ne!(new_header, "index_v_header_0.mp4");

        let changeset = unbounded_track.add_chunk(&chunk(4.0)).unwrap();
        assert_eq!(changeset.to_add.len(), 2);
        assert_eq!(
            changeset.to_add[0],
            ChangesetEntry::Header {
                name: new_header.clone()
            }
        );
        let seg = added_segment(&changeset);
        assert!(seg.discontinuity);
        assert_eq!(seg.header_name, new_header);

        // The flag is one-shot.
        let next = unbounded_track.add_chunk(&chunk(4.0)).unwrap();
        assert_eq!(next.to_add.len(), 1);
        assert!(!added_segment(&next).discontinuity);
    }

    #[rstest]
    #[case(&[4.0, 5.0, 3.0], 5.0)]
    #[case(&[1.0, 1.5], 1.5)]
    #[case(&[6.0, 2.0, 2.0], 6.0)]
    fn target_duration_tracks_the_maximum(#[case] durations: &[f64], #[case] expected: f64) {
        let mut track = Track::new("index", config(None, false));
        for &secs in durations {
            track.add_chunk(&chunk(secs)).unwrap();
        }
        assert_eq!(
            track.target_segment_duration(),
            Duration::from_secs_f64(expected)
        );
    }

    #[rstest]
    fn target_duration_never_decreases_under_eviction() {
        let mut track = Track::new("index", config(Some(Duration::from_secs(4)), false));
        track.add_chunk(&chunk(4.0)).unwrap();
        track.add_chunk(&chunk(1.0)).unwrap();
        track.add_chunk(&chunk(1.0)).unwrap();

        // The 4s segment has been evicted; the recorded maximum stays.
        assert_eq!(track.target_segment_duration(), Duration::from_secs(4));
    }

    #[rstest]
    fn names_are_unique_across_lifetime() {
        let mut track = Track::new("index", config(Some(Duration::from_secs(3)), true));
        for i in 0..30 {
            track.add_chunk(&chunk(1.0 + f64::from(i % 3))).unwrap();
            if i == 10 || i == 20 {
                track.discontinue().unwrap();
            }
        }
        let mut names = track.all_segments();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
