use async_trait::async_trait;

use crate::protocol::PlaybackSample;

pub mod discord;

pub use discord::DiscordSink;

/// Failure modes of a presence sink. Both are recoverable and feed the
/// availability tracker; neither terminates the relay.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink process could not be reached (socket missing, broken
    /// pipe, handshake failed, timeout).
    #[error("presence sink unreachable: {0}")]
    Unreachable(String),
    /// The sink answered but refused the request (e.g. it is not yet
    /// connected to its own backend). Treated like unreachable for
    /// backoff purposes.
    #[error("presence sink rejected request: {0}")]
    Rejected(String),
}

/// Accepts presence updates. Any operation may fail transiently; calls
/// never panic across this boundary.
#[async_trait]
pub trait PresenceSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap reachability check, distinct from a full dispatch.
    /// Idempotent and safe to call repeatedly.
    async fn probe(&self) -> Result<(), SinkError>;

    /// Pushes the full current sample. Overwrites whatever the sink
    /// displayed before, so re-sending identical state is harmless.
    async fn publish(&self, sample: &PlaybackSample) -> Result<(), SinkError>;

    /// Removes the displayed presence.
    async fn clear(&self) -> Result<(), SinkError>;
}
