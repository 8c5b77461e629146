use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::configs::Config;
use crate::sources::SampleMailbox;

/// State shared with the ingest HTTP handlers. The relay task itself is
/// not reachable from here; handlers communicate with it only through
/// the mailbox and the `clear_requested` flag.
pub struct AppState {
    pub config: Config,
    pub mailbox: Arc<SampleMailbox>,
    /// Consumed by the relay on its next healthy tick.
    pub clear_requested: Arc<AtomicBool>,
    /// Mirror of the relay's sink health, written only by the relay.
    pub sink_healthy: Arc<AtomicBool>,
    pub started_at_ms: u64,
}
