//! Two-state reachability model for the presence sink.
//!
//! The tracker holds nothing but the current health bit; probe pacing
//! comes from the relay tick cadence, not from an internal timer.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::sinks::PresenceSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

pub struct AvailabilityTracker {
    health: Health,
}

impl AvailabilityTracker {
    /// Starts `Unhealthy`: reachability is never assumed, the first
    /// probe has to prove it.
    pub fn new() -> Self {
        Self {
            health: Health::Unhealthy,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == Health::Healthy
    }

    /// Reports a dispatch failure observed by the relay.
    pub fn mark_unhealthy(&mut self) {
        if self.health == Health::Healthy {
            warn!("presence sink marked unhealthy, falling back to probing");
        }
        self.health = Health::Unhealthy;
    }

    /// Runs one reachability probe against the sink, bounded by
    /// `timeout`. A success transitions to `Healthy`, any failure
    /// (including timeout) to `Unhealthy`.
    pub async fn probe(&mut self, sink: &dyn PresenceSink, timeout: Duration) {
        let outcome = tokio::time::timeout(timeout, sink.probe()).await;
        match outcome {
            Ok(Ok(())) => {
                if self.health == Health::Unhealthy {
                    info!("presence sink {} is reachable", sink.name());
                }
                self.health = Health::Healthy;
            }
            Ok(Err(e)) => {
                debug!("probe failed: {e}");
                self.health = Health::Unhealthy;
            }
            Err(_) => {
                debug!("probe timed out after {timeout:?}");
                self.health = Health::Unhealthy;
            }
        }
    }
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}
