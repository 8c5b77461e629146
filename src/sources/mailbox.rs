//! Single-slot sample store bridging the push-style ingest API to the
//! pull-style relay loop.
//!
//! The extension posts whenever it scrapes; the relay only ever cares
//! about the freshest observation, so each store overwrites the last.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::common::types::now_ms;
use crate::protocol::PlaybackSample;

use super::{SampleSource, SourceError};

#[derive(Default)]
pub struct SampleMailbox {
    slot: RwLock<Option<PlaybackSample>>,
}

impl SampleMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored sample.
    pub fn store(&self, sample: PlaybackSample) {
        *self.slot.write() = Some(sample);
    }

    /// Drops the stored sample (used by `POST /clear`).
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn latest(&self) -> Option<PlaybackSample> {
        self.slot.read().clone()
    }
}

/// `SampleSource` backed by the ingest mailbox. A sample older than the
/// freshness window means the extension stopped posting (tab closed,
/// page navigated away) and is reported as no data.
pub struct MailboxSource {
    mailbox: Arc<SampleMailbox>,
    freshness_ms: u64,
}

impl MailboxSource {
    pub fn new(mailbox: Arc<SampleMailbox>, freshness_ms: u64) -> Self {
        Self {
            mailbox,
            freshness_ms,
        }
    }

    fn sample_at(&self, now_ms: u64) -> Result<PlaybackSample, SourceError> {
        let sample = self.mailbox.latest().ok_or(SourceError::Unavailable)?;
        if now_ms.saturating_sub(sample.observed_at_ms) > self.freshness_ms {
            return Err(SourceError::Unavailable);
        }
        Ok(sample)
    }
}

#[async_trait]
impl SampleSource for MailboxSource {
    async fn sample(&self) -> Result<PlaybackSample, SourceError> {
        self.sample_at(now_ms())
    }
}
