#![forbid(unsafe_code)]

//! HLS (RFC 8216) playlist generation.
//!
//! Supports at most one audio and one video track. With both present, the
//! master playlist advertises the video rendition with the audio attached
//! as an alternative-rendition group; with a single track the master *is*
//! the track playlist and no sub-manifests are emitted.

use std::time::Duration;

use crate::{
    serialize::{ManifestSerializer, SerializedManifest, SerializedManifests},
    track::{ContentType, Track},
    Manifest, SinkError, SinkResult,
};

const VERSION: u32 = 7;

// Advertised variant attributes. Rate adaptation is out of scope, so the
// master carries a single fixed variant.
const VIDEO_BANDWIDTH: u64 = 2_560_000;
const VIDEO_CODECS: &str = "avc1.42e00a";
const AUDIO_GROUP: &str = "a";

#[derive(Debug, Clone, Copy, Default)]
pub struct HlsSerializer;

impl ManifestSerializer for HlsSerializer {
    fn serialize(&self, manifest: &Manifest) -> SinkResult<SerializedManifests> {
        let mut audio: Option<&Track> = None;
        let mut video: Option<&Track> = None;
        for track in manifest.tracks() {
            let slot = match track.content_type() {
                ContentType::Audio => &mut audio,
                ContentType::Video => &mut video,
            };
            if slot.replace(track).is_some() {
                return Err(SinkError::UnsupportedTopology(format!(
                    "more than one {} track",
                    track.content_type()
                )));
            }
        }

        let master_name = format!("{}.m3u8", manifest.name());
        match (audio, video) {
            (Some(audio), Some(video)) => Ok(SerializedManifests {
                master: SerializedManifest {
                    name: master_name,
                    content: master_playlist(),
                },
                per_track: vec![
                    (audio.id().clone(), track_manifest(audio)),
                    (video.id().clone(), track_manifest(video)),
                ],
            }),
            (Some(track), None) | (None, Some(track)) => Ok(SerializedManifests {
                // Single rendition: the master is the media playlist.
                master: SerializedManifest {
                    name: master_name,
                    content: media_playlist(track),
                },
                per_track: Vec::new(),
            }),
            (None, None) => Ok(SerializedManifests {
                master: SerializedManifest {
                    name: master_name,
                    content: format!("#EXTM3U\n#EXT-X-VERSION:{VERSION}\n"),
                },
                per_track: Vec::new(),
            }),
        }
    }
}

fn track_manifest(track: &Track) -> SerializedManifest {
    SerializedManifest {
        name: format!("{}.m3u8", track.content_type()),
        content: media_playlist(track),
    }
}

fn master_playlist() -> String {
    format!(
        "#EXTM3U\n\
         #EXT-X-VERSION:{VERSION}\n\
         #EXT-X-INDEPENDENT-SEGMENTS\n\
         #EXT-X-STREAM-INF:BANDWIDTH={VIDEO_BANDWIDTH},CODECS=\"{VIDEO_CODECS}\",AUDIO=\"{AUDIO_GROUP}\"\n\
         video.m3u8\n\
         #EXT-X-MEDIA:TYPE=AUDIO,NAME=\"{AUDIO_GROUP}\",GROUP-ID=\"{AUDIO_GROUP}\",AUTOSELECT=YES,DEFAULT=YES,URI=\"audio.m3u8\"\n"
    )
}

fn media_playlist(track: &Track) -> String {
    // Unsealed partial segments are not published.
    let listed: Vec<_> = track.segments().filter(|s| s.complete).collect();

    let top_map = listed
        .first()
        .map_or(track.header_name(), |s| s.header_name.as_str());

    let mut playlist = format!(
        "#EXTM3U\n\
         #EXT-X-VERSION:{VERSION}\n\
         #EXT-X-TARGETDURATION:{}\n\
         #EXT-X-MEDIA-SEQUENCE:{}\n\
         #EXT-X-MAP:URI=\"{top_map}\"\n",
        target_duration_ceil(track.target_segment_duration()),
        track.media_sequence(),
    );

    let mut current_map = top_map;
    for segment in listed {
        if segment.header_name != current_map {
            playlist.push_str("#EXT-X-DISCONTINUITY\n");
            playlist.push_str(&format!("#EXT-X-MAP:URI=\"{}\"\n", segment.header_name));
            current_map = segment.header_name.as_str();
        }
        playlist.push_str(&format!(
            "#EXTINF:{},\n{}\n",
            extinf_seconds(segment.duration),
            segment.name
        ));
    }

    if track.is_finished() {
        playlist.push_str("#EXT-X-ENDLIST\n");
    }

    playlist
}

/// Whole-second ceiling, computed on the fixed-point duration (never via
/// floating point).
fn target_duration_ceil(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Render seconds for `EXTINF`. Whole values keep one decimal place
/// (`4.0`), fractional values print exactly (`4.25`).
fn extinf_seconds(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{secs:.1}")
    } else {
        format!("{secs}")
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        track::{TrackConfig, TrackId},
        MediaChunk,
    };

    fn config(id: &str, content_type: ContentType) -> TrackConfig {
        TrackConfig {
            id: TrackId::from(id),
            content_type,
            init_extension: "mp4".into(),
            fragment_extension: "m4s".into(),
            target_segment_duration: Duration::ZERO,
            target_window_duration: None,
            persisted: false,
        }
    }

    fn chunk(secs: f64) -> MediaChunk {
        MediaChunk::new(Bytes::from_static(b"x"), Duration::from_secs_f64(secs))
    }

    #[fixture]
    fn video_manifest() -> Manifest {
        let mut manifest = Manifest::new("index");
        manifest.add_track(config("v", ContentType::Video)).unwrap();
        manifest
    }

    #[rstest]
    #[case(Duration::from_secs(4), 4)]
    #[case(Duration::from_millis(4001), 5)]
    #[case(Duration::from_millis(4999), 5)]
    #[case(Duration::ZERO, 0)]
    #[case(Duration::from_nanos(1), 1)]
    fn target_duration_rounds_up(#[case] duration: Duration, #[case] expected: u64) {
        assert_eq!(target_duration_ceil(duration), expected);
    }

    #[rstest]
    #[case(Duration::from_secs(4), "4.0")]
    #[case(Duration::from_millis(4250), "4.25")]
    #[case(Duration::from_millis(500), "0.5")]
    fn extinf_rendering(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(extinf_seconds(duration), expected);
    }

    #[rstest]
    fn single_track_master_is_the_media_playlist(mut video_manifest: Manifest) {
        let id = TrackId::from("v");
        for secs in [4.0, 5.0, 3.0] {
            video_manifest.add_chunk(&id, &chunk(secs)).unwrap();
        }

        let out = HlsSerializer.serialize(&video_manifest).unwrap();
        assert!(out.per_track.is_empty());
        assert_eq!(out.master.name, "index.m3u8");
        assert_eq!(
            out.master.content,
            "#EXTM3U\n\
             #EXT-X-VERSION:7\n\
             #EXT-X-TARGETDURATION:5\n\
             #EXT-X-MEDIA-SEQUENCE:0\n\
             #EXT-X-MAP:URI=\"index_v_header_0.mp4\"\n\
             #EXTINF:4.0,\nindex_v_segment_0.m4s\n\
             #EXTINF:5.0,\nindex_v_segment_1.m4s\n\
             #EXTINF:3.0,\nindex_v_segment_2.m4s\n"
        );
    }

    #[rstest]
    fn endlist_appears_iff_finished(mut video_manifest: Manifest) {
        let id = TrackId::from("v");
        video_manifest.add_chunk(&id, &chunk(4.0)).unwrap();

        let live = HlsSerializer.serialize(&video_manifest).unwrap();
        assert!(!live.master.content.contains("#EXT-X-ENDLIST"));

        video_manifest.finish_track(&id).unwrap();
        let finished = HlsSerializer.serialize(&video_manifest).unwrap();
        assert!(finished.master.content.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[rstest]
    fn audio_video_master_matches_template() {
        let mut manifest = Manifest::new("index");
        manifest.add_track(config("a", ContentType::Audio)).unwrap();
        manifest.add_track(config("v", ContentType::Video)).unwrap();

        let out = HlsSerializer.serialize(&manifest).unwrap();
        assert_eq!(
            out.master.content,
            "#EXTM3U\n\
             #EXT-X-VERSION:7\n\
             #EXT-X-INDEPENDENT-SEGMENTS\n\
             #EXT-X-STREAM-INF:BANDWIDTH=2560000,CODECS=\"avc1.42e00a\",AUDIO=\"a\"\n\
             video.m3u8\n\
             #EXT-X-MEDIA:TYPE=AUDIO,NAME=\"a\",GROUP-ID=\"a\",AUTOSELECT=YES,DEFAULT=YES,URI=\"audio.m3u8\"\n"
        );

        let names: Vec<_> = out
            .per_track
            .iter()
            .map(|(_, m)| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["audio.m3u8", "video.m3u8"]);
    }

    #[rstest]
    fn rejects_two_tracks_of_same_type() {
        let mut manifest = Manifest::new("index");
        manifest
            .add_track(config("v1", ContentType::Video))
            .unwrap();
        manifest
            .add_track(config("v2", ContentType::Video))
            .unwrap();

        assert!(matches!(
            HlsSerializer.serialize(&manifest),
            Err(SinkError::UnsupportedTopology(_))
        ));
    }

    #[rstest]
    fn discontinuity_switches_the_map(mut video_manifest: Manifest) {
        let id = TrackId::from("v");
        video_manifest.add_chunk(&id, &chunk(4.0)).unwrap();
        video_manifest.add_chunk(&id, &chunk(4.0)).unwrap();
        let new_header = video_manifest.discontinue_track(&id).unwrap();
        video_manifest.add_chunk(&id, &chunk(4.0)).unwrap();

        let out = HlsSerializer.serialize(&video_manifest).unwrap();
        let content = &out.master.content;
        assert!(content.contains("#EXT-X-MAP:URI=\"index_v_header_0.mp4\"\n"));
        assert!(content.contains(&format!(
            "#EXT-X-DISCONTINUITY\n#EXT-X-MAP:URI=\"{new_header}\"\n"
        )));
    }

    #[rstest]
    fn unsealed_segments_are_not_listed(mut video_manifest: Manifest) {
        let id = TrackId::from("v");
        video_manifest.add_chunk(&id, &chunk(4.0)).unwrap();
        video_manifest
            .add_chunk(&id, &chunk(2.0).with_complete(false))
            .unwrap();

        let out = HlsSerializer.serialize(&video_manifest).unwrap();
        assert!(out.master.content.contains("index_v_segment_0.m4s"));
        assert!(!out.master.content.contains("index_v_segment_1.m4s"));
    }

    #[rstest]
    fn serialization_is_deterministic(mut video_manifest: Manifest) {
        let id = TrackId::from("v");
        for secs in [4.0, 5.0] {
            video_manifest.add_chunk(&id, &chunk(secs)).unwrap();
        }

        let first = HlsSerializer.serialize(&video_manifest).unwrap();
        let second = HlsSerializer.serialize(&video_manifest).unwrap();
        assert_eq!(first, second);
    }
}
