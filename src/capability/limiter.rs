//! Rate limiter for outbound events.
//!
//! Every capability holds one [`EventLimiter`] per event kind. Within a
//! limiter each instance (`None` is the default instance) gets its own slot,
//! created on first use. The first call is always allowed.
//!
//! Callers that keep hammering the limiter are slowed down further: once more
//! than `minimum_distance / 4` rejected calls pile up, the next window grows
//! by another `minimum_distance`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use super::lock_or_recover;

/// Minimum distance for discrete state changes
pub const EVENT_LIMIT_STATE: Duration = Duration::from_millis(1000);

/// Minimum distance for periodic sensor values
pub const EVENT_LIMIT_SENSOR_VALUE: Duration = Duration::from_millis(60_000);

/// Limits a [`crate::capability::DeviceHandle`] hands to its capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLimits {
    pub state: Duration,
    pub sensor_value: Duration,
}

impl Default for EventLimits {
    fn default() -> Self {
        Self {
            state: EVENT_LIMIT_STATE,
            sensor_value: EVENT_LIMIT_SENSOR_VALUE,
        }
    }
}

#[derive(Debug, Default)]
struct LimiterSlot {
    next_event: Option<Instant>,
    extra_distance: Duration,
    fail_counter: u64,
}

#[derive(Debug)]
pub struct EventLimiter {
    /// Minimum time between two events of the same instance
    minimum_distance: Duration,
    slots: Mutex<HashMap<String, LimiterSlot>>,
}

impl EventLimiter {
    pub fn new(minimum_distance: Duration) -> Self {
        Self {
            minimum_distance,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn minimum_distance(&self) -> Duration {
        self.minimum_distance
    }

    /// Whether an event for `instance` may be sent now
    pub fn try_consume(&self, instance: Option<&str>) -> bool {
        self.try_consume_at(instance, Instant::now())
    }

    pub fn try_consume_at(&self, instance: Option<&str>, now: Instant) -> bool {
        let mut slots = lock_or_recover(&self.slots);
        let slot = slots
            .entry(instance.unwrap_or_default().to_string())
            .or_default();

        let minimum_ms = self.minimum_distance.as_millis() as u64;
        let fail_threshold = minimum_ms / 4;

        let allowed = match slot.next_event {
            None => true,
            Some(next) => now >= next,
        };

        if allowed {
            if slot.fail_counter > fail_threshold {
                slot.extra_distance += self.minimum_distance;
                slot.fail_counter = 0;
            } else {
                slot.extra_distance = Duration::ZERO;
            }
            slot.next_event = Some(now + self.minimum_distance + slot.extra_distance);
            return true;
        }

        slot.fail_counter += 1;
        if slot.fail_counter == fail_threshold {
            warn!(
                "Excessive events for instance {:?}: further events are delayed by an additional {} ms",
                instance.unwrap_or_default(),
                slot.extra_distance.as_millis() as u64 + minimum_ms
            );
        }
        false
    }
}
