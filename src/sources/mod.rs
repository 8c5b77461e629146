use async_trait::async_trait;

use crate::protocol::PlaybackSample;

pub mod mailbox;

pub use mailbox::{MailboxSource, SampleMailbox};

/// Failure modes of a sampling collaborator. All of them are
/// recoverable: a failed sample just means "no data this tick".
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no playback data available")]
    Unavailable,
}

/// Produces playback observations on demand. Called at most once per
/// healthy relay tick.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn sample(&self) -> Result<PlaybackSample, SourceError>;
}
