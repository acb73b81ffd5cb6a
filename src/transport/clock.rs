//! Server-synchronized clock.
//!
//! The device has no wall clock of its own. The server sends its epoch
//! seconds in the bootstrap frame and in every payload's `createdAt`; the
//! clock keeps the offset between that and the local uptime and stamps
//! outbound frames with it. The offset survives reconnects.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ServerClock {
    started: Instant,
    /// server epoch milliseconds minus local uptime milliseconds
    base_millis: Option<i64>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            base_millis: None,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns `false` and keeps the old offset when the timestamp is out
    /// of range
    pub fn sync(&mut self, server_epoch_secs: u64) -> bool {
        self.sync_at(server_epoch_secs, self.uptime())
    }

    pub fn sync_at(&mut self, server_epoch_secs: u64, uptime: Duration) -> bool {
        let base = i64::try_from(server_epoch_secs)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
            .zip(i64::try_from(uptime.as_millis()).ok())
            .and_then(|(server_millis, uptime_millis)| server_millis.checked_sub(uptime_millis));

        match base {
            Some(base) => {
                self.base_millis = Some(base);
                true
            }
            None => {
                warn!("Ignoring out of range server time {}", server_epoch_secs);
                false
            }
        }
    }

    pub fn is_synced(&self) -> bool {
        self.base_millis.is_some()
    }

    /// Server epoch seconds, 0 while not synced
    pub fn now(&self) -> u64 {
        self.now_at(self.uptime())
    }

    pub fn now_at(&self, uptime: Duration) -> u64 {
        let uptime_millis = i64::try_from(uptime.as_millis()).unwrap_or(i64::MAX);
        match self.base_millis {
            Some(base) => (base.saturating_add(uptime_millis) / 1000).max(0) as u64,
            None => 0,
        }
    }

    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        if !self.is_synced() {
            return None;
        }
        DateTime::from_timestamp(self.now() as i64, 0)
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}
