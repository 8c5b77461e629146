//! The presence relay loop.
//!
//! Drives the sample -> decide -> dispatch cycle on a fixed period:
//! probe the sink while it is unhealthy, otherwise pull one sample,
//! dedup it against the last dispatch, and publish. A single task owns
//! all relay state, so ticks can never overlap and no locking exists
//! around `RelayState`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::configs::RelayConfig;
use crate::protocol::PlaybackSample;
use crate::sinks::PresenceSink;
use crate::sources::{SampleSource, SourceError};

pub mod availability;

pub use availability::AvailabilityTracker;

/// Loop tuning, derived from [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub period: Duration,
    pub dedup_tolerance_ms: u64,
    pub failure_threshold: u32,
    pub probe_timeout: Duration,
    pub shutdown_clear_timeout: Duration,
    pub clear_on_pause: bool,
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            period: Duration::from_millis(config.period_ms),
            dedup_tolerance_ms: config.dedup_tolerance_ms,
            failure_threshold: config.failure_threshold.max(1),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            shutdown_clear_timeout: Duration::from_millis(config.shutdown_clear_timeout_ms),
            clear_on_pause: config.clear_on_pause,
        }
    }
}

/// Dispatch bookkeeping. Touched only inside `tick`, never serialized.
struct RelayState {
    last_dispatched: Option<PlaybackSample>,
    consecutive_failures: u32,
}

pub struct RelayLoop {
    source: Arc<dyn SampleSource>,
    sink: Arc<dyn PresenceSink>,
    opts: RelayOptions,
    tracker: AvailabilityTracker,
    state: RelayState,
    /// Set by the ingest API, consumed at the top of a healthy tick.
    clear_requested: Arc<AtomicBool>,
    /// Write-only mirror of the tracker health, read by `GET /ping`.
    sink_healthy: Arc<AtomicBool>,
}

impl RelayLoop {
    pub fn new(
        source: Arc<dyn SampleSource>,
        sink: Arc<dyn PresenceSink>,
        opts: RelayOptions,
        clear_requested: Arc<AtomicBool>,
        sink_healthy: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            sink,
            opts,
            tracker: AvailabilityTracker::new(),
            state: RelayState {
                last_dispatched: None,
                consecutive_failures: 0,
            },
            clear_requested,
            sink_healthy,
        }
    }

    /// Runs until `shutdown` fires. Ticks missed while a dispatch is in
    /// flight are collapsed, never queued, so a stale sample can never
    /// be dispatched after a fresher one.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.opts.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => break,
            }
        }

        if self.opts.clear_on_pause && self.state.last_dispatched.is_some() {
            debug!("clearing presence before exit");
            let _ = tokio::time::timeout(self.opts.shutdown_clear_timeout, self.sink.clear())
                .await;
        }
    }

    /// One relay cycle. Every collaborator failure is absorbed here;
    /// nothing propagates to the scheduler.
    pub async fn tick(&mut self) {
        if !self.tracker.is_healthy() {
            // Probe-only tick: deliberately no sampling, so probe and
            // dispatch stay decoupled.
            self.tracker
                .probe(self.sink.as_ref(), self.opts.probe_timeout)
                .await;
            self.publish_health();
            return;
        }

        if self.clear_requested.swap(false, Ordering::SeqCst) {
            self.dispatch_clear().await;
            return;
        }

        let sample = match self.source.sample().await {
            Ok(sample) => sample,
            Err(SourceError::Unavailable) => {
                trace!("no sample this tick");
                return;
            }
        };

        if !sample.is_playing {
            // Paused/stopped state is never broadcast. With the policy
            // enabled, standing presence is torn down instead.
            if self.opts.clear_on_pause && self.state.last_dispatched.is_some() {
                debug!("playback stopped, clearing presence");
                self.dispatch_clear().await;
            }
            return;
        }

        if let Some(last) = &self.state.last_dispatched {
            if sample.is_equivalent(last, self.opts.dedup_tolerance_ms) {
                trace!("sample equivalent to last dispatch, skipping");
                return;
            }
        }

        match self.sink.publish(&sample).await {
            Ok(()) => {
                info!("presence updated: {} by {}", sample.title, sample.artist);
                self.state.last_dispatched = Some(sample);
                self.state.consecutive_failures = 0;
            }
            Err(e) => {
                warn!("dispatch failed: {e}");
                self.record_dispatch_failure();
            }
        }
    }

    async fn dispatch_clear(&mut self) {
        match self.sink.clear().await {
            Ok(()) => {
                self.state.last_dispatched = None;
                self.state.consecutive_failures = 0;
            }
            Err(e) => {
                warn!("presence clear failed: {e}");
                self.record_dispatch_failure();
            }
        }
    }

    fn record_dispatch_failure(&mut self) {
        self.state.consecutive_failures += 1;
        if self.state.consecutive_failures >= self.opts.failure_threshold {
            self.tracker.mark_unhealthy();
            self.publish_health();
        }
    }

    fn publish_health(&self) {
        self.sink_healthy
            .store(self.tracker.is_healthy(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::sinks::SinkError;

    fn opts() -> RelayOptions {
        RelayOptions {
            period: Duration::from_millis(5000),
            dedup_tolerance_ms: 2000,
            failure_threshold: 1,
            probe_timeout: Duration::from_millis(2000),
            shutdown_clear_timeout: Duration::from_millis(1500),
            clear_on_pause: false,
        }
    }

    fn playing(title: &str, position_secs: u64, observed_at_ms: u64) -> PlaybackSample {
        PlaybackSample {
            is_playing: true,
            title: title.to_string(),
            artist: "Artist X".to_string(),
            position_secs,
            duration_secs: 200,
            observed_at_ms,
        }
    }

    fn paused(title: &str) -> PlaybackSample {
        PlaybackSample {
            is_playing: false,
            ..playing(title, 0, 0)
        }
    }

    /// Replays a fixed script of sample results, then goes silent.
    struct ScriptSource {
        script: Mutex<VecDeque<Result<PlaybackSample, SourceError>>>,
        calls: AtomicUsize,
    }

    impl ScriptSource {
        fn new(script: Vec<Result<PlaybackSample, SourceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SampleSource for ScriptSource {
        async fn sample(&self) -> Result<PlaybackSample, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Err(SourceError::Unavailable))
        }
    }

    /// Fabricates a distinct playing sample per call. Used where the
    /// relay must keep finding dispatch-worthy data.
    struct EndlessSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SampleSource for EndlessSource {
        async fn sample(&self) -> Result<PlaybackSample, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(playing(&format!("Song {n}"), 0, 1_000_000 + n as u64))
        }
    }

    /// Records every sink interaction; fails the first N probes and the
    /// first M publishes, optionally stalling each publish.
    struct RecordingSink {
        probe_failures: AtomicUsize,
        publish_failures: AtomicUsize,
        publishes: Mutex<Vec<PlaybackSample>>,
        clears: AtomicUsize,
        publish_delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingSink {
        fn healthy() -> Self {
            Self::failing(0, 0)
        }

        fn failing(probe_failures: usize, publish_failures: usize) -> Self {
            Self {
                probe_failures: AtomicUsize::new(probe_failures),
                publish_failures: AtomicUsize::new(publish_failures),
                publishes: Mutex::new(Vec::new()),
                clears: AtomicUsize::new(0),
                publish_delay: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn publishes(&self) -> Vec<PlaybackSample> {
            self.publishes.lock().clone()
        }

        fn clears(&self) -> usize {
            self.clears.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PresenceSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn probe(&self) -> Result<(), SinkError> {
            let remaining = self.probe_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.probe_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SinkError::Unreachable("probe refused".into()));
            }
            Ok(())
        }

        async fn publish(&self, sample: &PlaybackSample) -> Result<(), SinkError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            self.publishes.lock().push(sample.clone());
            if let Some(delay) = self.publish_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let remaining = self.publish_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.publish_failures.store(remaining - 1, Ordering::SeqCst);
                // Still counts as a recorded attempt; the caller sees a
                // rejection.
                self.publishes.lock().pop();
                return Err(SinkError::Rejected("not ready".into()));
            }
            Ok(())
        }

        async fn clear(&self) -> Result<(), SinkError> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn relay(
        source: Arc<dyn SampleSource>,
        sink: Arc<dyn PresenceSink>,
        opts: RelayOptions,
    ) -> RelayLoop {
        RelayLoop::new(
            source,
            sink,
            opts,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_unhealthy_ticks_probe_without_sampling() {
        // Scenario: probe fails three consecutive ticks, then succeeds.
        let source = Arc::new(ScriptSource::new(vec![Ok(playing("Song A", 10, 1_000_000))]));
        let sink = Arc::new(RecordingSink::failing(3, 0));
        let mut relay = relay(source.clone(), sink.clone(), opts());

        for _ in 0..3 {
            relay.tick().await;
            assert!(!relay.tracker.is_healthy());
            assert_eq!(source.calls(), 0);
        }

        // Fourth probe succeeds; still a probe-only tick.
        relay.tick().await;
        assert!(relay.tracker.is_healthy());
        assert_eq!(source.calls(), 0);
        assert!(sink.publishes().is_empty());

        // First healthy tick samples and dispatches exactly once.
        relay.tick().await;
        assert_eq!(source.calls(), 1);
        assert_eq!(sink.publishes().len(), 1);
    }

    #[tokio::test]
    async fn test_equivalent_sample_is_not_redispatched() {
        // Same track 5s later, position advanced by 5s: same implied
        // start offset, so the second tick is a no-op.
        let source = Arc::new(ScriptSource::new(vec![
            Ok(playing("Song A", 10, 1_000_000)),
            Ok(playing("Song A", 15, 1_005_000)),
        ]));
        let sink = Arc::new(RecordingSink::healthy());
        let mut relay = relay(source.clone(), sink.clone(), opts());

        relay.tick().await; // probe
        relay.tick().await;
        relay.tick().await;

        assert_eq!(source.calls(), 2);
        assert_eq!(sink.publishes().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_is_redispatched() {
        // Position jumps back to 0: a restart, not elapsed time.
        let source = Arc::new(ScriptSource::new(vec![
            Ok(playing("Song A", 10, 1_000_000)),
            Ok(playing("Song A", 0, 1_005_000)),
        ]));
        let sink = Arc::new(RecordingSink::healthy());
        let mut relay = relay(source, sink.clone(), opts());

        relay.tick().await; // probe
        relay.tick().await;
        relay.tick().await;

        assert_eq!(sink.publishes().len(), 2);
    }

    #[tokio::test]
    async fn test_paused_samples_are_never_published() {
        let source = Arc::new(ScriptSource::new(vec![
            Ok(paused("Song A")),
            Ok(paused("Song A")),
        ]));
        let sink = Arc::new(RecordingSink::healthy());
        let mut relay = relay(source, sink.clone(), opts());

        relay.tick().await; // probe
        relay.tick().await;
        relay.tick().await;

        assert!(sink.publishes().is_empty());
        // Default policy leaves any standing presence alone.
        assert_eq!(sink.clears(), 0);
    }

    #[tokio::test]
    async fn test_clear_on_pause_policy() {
        let source = Arc::new(ScriptSource::new(vec![
            Ok(playing("Song A", 10, 1_000_000)),
            Ok(paused("Song A")),
            Ok(paused("Song A")),
        ]));
        let sink = Arc::new(RecordingSink::healthy());
        let mut relay = relay(
            source,
            sink.clone(),
            RelayOptions {
                clear_on_pause: true,
                ..opts()
            },
        );

        relay.tick().await; // probe
        relay.tick().await; // publish
        relay.tick().await; // pause -> clear
        relay.tick().await; // still paused, nothing standing to clear

        assert_eq!(sink.publishes().len(), 1);
        assert_eq!(sink.clears(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_skips_tick() {
        let source = Arc::new(ScriptSource::new(vec![
            Err(SourceError::Unavailable),
            Ok(playing("Song A", 10, 1_000_000)),
        ]));
        let sink = Arc::new(RecordingSink::healthy());
        let mut relay = relay(source, sink.clone(), opts());

        relay.tick().await; // probe
        relay.tick().await; // no data
        assert!(sink.publishes().is_empty());
        assert!(relay.tracker.is_healthy());

        relay.tick().await;
        assert_eq!(sink.publishes().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_forces_probe_mode() {
        let source = Arc::new(ScriptSource::new(vec![
            Ok(playing("Song A", 10, 1_000_000)),
            Ok(playing("Song B", 0, 1_010_000)),
        ]));
        let sink = Arc::new(RecordingSink::failing(0, 1));
        let sink_healthy = Arc::new(AtomicBool::new(false));
        let mut relay = RelayLoop::new(
            source.clone(),
            sink.clone(),
            opts(),
            Arc::new(AtomicBool::new(false)),
            sink_healthy.clone(),
        );

        relay.tick().await; // probe ok
        assert!(sink_healthy.load(Ordering::SeqCst));

        relay.tick().await; // publish fails, threshold 1 trips
        assert!(!relay.tracker.is_healthy());
        assert!(!sink_healthy.load(Ordering::SeqCst));

        relay.tick().await; // back in probe mode, no sample taken
        assert_eq!(source.calls(), 1);
        assert!(relay.tracker.is_healthy());

        // Recovery dispatches the fresher sample, not the failed one.
        relay.tick().await;
        let publishes = sink.publishes();
        assert_eq!(publishes.len(), 1);
        assert_eq!(publishes[0].title, "Song B");
    }

    #[tokio::test]
    async fn test_clear_request_consumed_on_healthy_tick_only() {
        let source = Arc::new(ScriptSource::new(vec![Ok(playing("Song A", 10, 1_000_000))]));
        let sink = Arc::new(RecordingSink::failing(1, 0));
        let clear_requested = Arc::new(AtomicBool::new(true));
        let mut relay = RelayLoop::new(
            source.clone(),
            sink.clone(),
            opts(),
            clear_requested.clone(),
            Arc::new(AtomicBool::new(false)),
        );

        relay.tick().await; // probe fails; request must survive
        assert!(clear_requested.load(Ordering::SeqCst));
        assert_eq!(sink.clears(), 0);

        relay.tick().await; // probe ok
        relay.tick().await; // healthy tick consumes the request
        assert!(!clear_requested.load(Ordering::SeqCst));
        assert_eq!(sink.clears(), 1);
        // The clear tick takes no sample.
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_dispatch_drops_overlapping_ticks() {
        let source = Arc::new(EndlessSource {
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink {
            publish_delay: Some(Duration::from_millis(12_000)),
            ..RecordingSink::healthy()
        });
        let relay = relay(source.clone(), sink.clone(), opts());

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(relay.run(shutdown_rx));

        // t=0 probe, t=5s first sample + publish (stalls until t=17s).
        // The ticks at t=10s and t=15s fire into a busy loop and must be
        // dropped, not queued.
        tokio::time::sleep(Duration::from_millis(12_500)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.publishes().len(), 1);
        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);

        handle.abort();
    }
}
