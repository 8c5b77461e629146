//! Playback observation types.
//!
//! A `PlaybackSample` is one snapshot of what the media player is doing,
//! as scraped by the browser extension. Samples are ephemeral: a new one
//! is ingested every scrape interval and nothing is ever persisted.

use serde::{Deserialize, Serialize};

/// Substituted when the scraper could not read a title.
pub const UNKNOWN_TITLE: &str = "Unknown Song";
/// Substituted when the scraper could not read an artist.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// One observation of the media player's current playback state.
///
/// Invariants (enforced by [`UpdatePayload::into_sample`]):
/// `title` and `artist` are never empty, and `position_secs` never
/// exceeds `duration_secs` when a duration is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSample {
    pub is_playing: bool,
    pub title: String,
    pub artist: String,
    /// Playback position in whole seconds.
    pub position_secs: u64,
    /// Track length in whole seconds. 0 when unknown (e.g. live radio).
    pub duration_secs: u64,
    /// Unix milliseconds at which the observation was taken.
    pub observed_at_ms: u64,
}

impl PlaybackSample {
    /// The implied moment playback of this track started, in unix
    /// milliseconds. Two observations of the same uninterrupted playback
    /// share this value (modulo clock drift), while a seek or restart
    /// shifts it.
    pub fn start_offset_ms(&self) -> i64 {
        self.observed_at_ms as i64 - (self.position_secs as i64) * 1000
    }

    /// Whether this sample describes the same dispatch-worthy state as
    /// `other`: identical track and play state, and implied start
    /// offsets within `tolerance_ms` of each other.
    pub fn is_equivalent(&self, other: &PlaybackSample, tolerance_ms: u64) -> bool {
        self.title == other.title
            && self.artist == other.artist
            && self.is_playing == other.is_playing
            && self.start_offset_ms().abs_diff(other.start_offset_ms()) < tolerance_ms
    }
}

/// Body of `POST /update` as sent by the extension's content script.
/// Field aliases cover the two payload dialects the extension shipped
/// with (`artist`/`artistName`, `currentTime`/`positionSeconds`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "artistName")]
    pub artist: Option<String>,
    #[serde(default, alias = "currentTime")]
    pub position_seconds: f64,
    #[serde(default, alias = "duration")]
    pub duration_seconds: f64,
}

impl UpdatePayload {
    /// Normalizes the raw payload into a well-formed sample stamped with
    /// `observed_at_ms`.
    pub fn into_sample(self, observed_at_ms: u64) -> PlaybackSample {
        let title = match self.title {
            Some(t) if !t.trim().is_empty() => t,
            _ => UNKNOWN_TITLE.to_string(),
        };
        let artist = match self.artist {
            Some(a) if !a.trim().is_empty() => a,
            _ => UNKNOWN_ARTIST.to_string(),
        };

        let duration_secs = self.duration_seconds.max(0.0) as u64;
        let mut position_secs = self.position_seconds.max(0.0) as u64;
        if duration_secs > 0 {
            position_secs = position_secs.min(duration_secs);
        }

        PlaybackSample {
            is_playing: self.is_playing,
            title,
            artist,
            position_secs,
            duration_secs,
            observed_at_ms,
        }
    }
}
