//! Disc metadata model and the lookup seam
//!
//! Fetching is done by whatever `MetadataSource` the host wires in; this
//! module only knows the MusicBrainz ws/2 release shape and how to label the
//! current track.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// As printed on the medium, usually "1", "2", ... but may be "A1"
    pub number: String,
    pub title: String,
    pub length_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscMetadata {
    pub id: Option<String>,
    pub title: String,
    pub artist: String,
    pub tracks: Vec<TrackInfo>,
    pub cover_art_url: Option<String>,
}

/// Metadata lookup, keyed by disc id with a title to fall back on
pub trait MetadataSource: Send + Sync {
    fn fetch(&self, disc_id: Option<&str>, fallback_title: &str) -> Option<DiscMetadata>;
}

/// Source that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataSource for NoMetadata {
    fn fetch(&self, _disc_id: Option<&str>, _fallback_title: &str) -> Option<DiscMetadata> {
        None
    }
}

pub fn cover_art_url(release_id: &str) -> String {
    format!("https://coverartarchive.org/release/{}/front", release_id)
}

/// Build metadata from a MusicBrainz ws/2 release object
///
/// Missing fields degrade to the unknown placeholders. Returns `None` only
/// when `release` is not an object.
pub fn parse_release(release: &Value) -> Option<DiscMetadata> {
    let release = release.as_object()?;

    let id = release.get("id").and_then(Value::as_str).map(str::to_string);
    let title = release
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_ALBUM)
        .to_string();

    let artist = release
        .get("artist-credit")
        .and_then(Value::as_array)
        .and_then(|credits| credits.first())
        .and_then(|credit| {
            credit
                .pointer("/artist/name")
                .or_else(|| credit.get("name"))
                .and_then(Value::as_str)
        })
        .unwrap_or(UNKNOWN_ARTIST)
        .to_string();

    let tracks = release
        .get("media")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|medium| medium.get("tracks").and_then(Value::as_array))
        .flatten()
        .enumerate()
        .map(|(i, track)| parse_track(track, i + 1))
        .collect();

    let cover_art_url = id.as_deref().map(cover_art_url);

    Some(DiscMetadata {
        id,
        title,
        artist,
        tracks,
        cover_art_url,
    })
}

fn parse_track(track: &Value, position: usize) -> TrackInfo {
    let number = match track.get("number") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => position.to_string(),
    };

    // Recording title is canonical; the track title may carry medium-specific credits
    let title = track
        .pointer("/recording/title")
        .or_else(|| track.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let length_ms = track
        .pointer("/recording/length")
        .and_then(Value::as_u64)
        .or_else(|| track.get("length").and_then(Value::as_u64));

    TrackInfo {
        number,
        title,
        length_ms,
    }
}

/// Status line for the given one-based track
pub fn now_playing_label(metadata: Option<&DiscMetadata>, track_index: u32) -> String {
    let Some(meta) = metadata else {
        return UNKNOWN_ALBUM.to_string();
    };

    let track = (track_index as usize)
        .checked_sub(1)
        .and_then(|i| meta.tracks.get(i));

    match track {
        Some(t) => format!("{}. {} - {}", t.number, t.title, meta.artist),
        None => format!("{}. {} - {}", track_index, meta.title, meta.artist),
    }
}
