//! Discord activity payload model.
//!
//! Field names follow the RPC SET_ACTIVITY wire format.

use serde::Serialize;

use super::sample::PlaybackSample;

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    /// First presence line: the track title.
    pub details: String,
    /// Second presence line: the artist.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
    pub assets: Assets,
    pub instance: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timestamps {
    /// Unix milliseconds at which playback of the track started.
    pub start: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assets {
    pub large_image: String,
    pub large_text: String,
    pub small_image: String,
    pub small_text: String,
}

impl Activity {
    /// Maps a sample onto the displayed activity. Timestamps are derived
    /// as `now - position` / `start + duration` and only attached while
    /// playing with a known track length, so the client renders a
    /// progress bar exactly when one is meaningful.
    pub fn from_sample(sample: &PlaybackSample, now_ms: u64) -> Self {
        let timestamps = if sample.is_playing && sample.duration_secs > 0 {
            let start = now_ms.saturating_sub(sample.position_secs * 1000);
            Some(Timestamps {
                start,
                end: Some(start + sample.duration_secs * 1000),
            })
        } else {
            None
        };

        Self {
            details: sample.title.clone(),
            state: sample.artist.clone(),
            timestamps,
            assets: Assets {
                large_image: "applemusic".to_string(),
                large_text: "Apple Music".to_string(),
                small_image: if sample.is_playing { "play" } else { "pause" }.to_string(),
                small_text: if sample.is_playing { "Playing" } else { "Paused" }.to_string(),
            },
            instance: false,
        }
    }
}
