// src/throttle.rs
//
// Cooldown gate between collision candidates and human-facing alerts.
//
// One global cooldown window shared across ALL event kinds, not per pair,
// not per zone. While the window is open, every candidate from a frame is
// dropped silently: no queueing, no batching, no deferred delivery. A
// genuine second collision that happens inside the cooldown of an earlier
// alert (real or spurious) is therefore never reported. That is a
// deliberate anti-alert-storm tradeoff; do not "fix" it by replaying
// suppressed candidates.
//
// The decision step is a pure function of (state, candidates, now) so it
// can be tested without a clock or any I/O. The frame loop is the single
// owner and writer of the state.

use crate::collision::CollisionEvent;

#[derive(Debug, Clone, Copy)]
pub struct ThrottleState {
    last_alert_ms: Option<f64>,
    cooldown_ms: f64,
}

impl ThrottleState {
    pub fn new(cooldown_ms: f64) -> Self {
        Self {
            last_alert_ms: None,
            cooldown_ms,
        }
    }

    /// Consumes the frame's candidate list and decides whether to dispatch.
    ///
    /// Dispatches at most one alert per frame: the FIRST candidate in the
    /// classifier's evaluation order. Dispatching resets the cooldown;
    /// suppression leaves the state untouched, so the window is measured
    /// from the last dispatched alert, not the last candidate seen.
    pub fn decide<'a>(
        self,
        candidates: &'a [CollisionEvent],
        now_ms: f64,
    ) -> (Self, Option<&'a CollisionEvent>) {
        if candidates.is_empty() {
            return (self, None);
        }

        let armed = self
            .last_alert_ms
            .map_or(true, |last| now_ms - last > self.cooldown_ms);
        if !armed {
            return (self, None);
        }

        (
            Self {
                last_alert_ms: Some(now_ms),
                ..self
            },
            Some(&candidates[0]),
        )
    }
}
