//! Tracks cumulative hand rotation so the rendered hands sweep forward
//! forever instead of snapping back to zero at each calendar wraparound.
//!
//! The tracker consumes one [`TimeSample`] per cycle and maintains a
//! per-hand 360° offset. A hand's raw field value dropping below the
//! previous cycle's value is treated as a wrap and bumps that hand's offset,
//! which keeps the published angle non-decreasing across consecutive cycles.
//! The only intentional break in that invariant is an explicit reset (e.g. a
//! timezone change), which is flagged on exactly one snapshot so renderers
//! can suppress animated interpolation for that single transition.

use tracing::debug;

use crate::events::RotationSnapshot;
use crate::time::TimeSample;

/// Sentinel for a last-raw field that has not observed a sample yet. A hand
/// never wraps on the first sample after construction or reset.
const UNARMED: i32 = -1;

/// Owns and mutates the engine's rotation state. One instance per engine;
/// created with sentinels armed, reset on timezone change, dropped with the
/// engine.
#[derive(Debug)]
pub struct RotationTracker {
    hour_offset: f64,
    minute_offset: f64,
    second_offset: f64,
    last_raw_hour: i32,
    last_raw_minute: i32,
    last_raw_second: i32,
    pending_discontinuity: bool,
}

impl RotationTracker {
    pub fn new() -> Self {
        Self {
            hour_offset: 0.0,
            minute_offset: 0.0,
            second_offset: 0.0,
            last_raw_hour: UNARMED,
            last_raw_minute: UNARMED,
            last_raw_second: UNARMED,
            pending_discontinuity: false,
        }
    }

    /// Folds one sample into the cumulative state and returns the snapshot
    /// to publish.
    ///
    /// Wrap detection compares raw calendar fields, not angles. The hour
    /// field is tracked modulo 12 so the noon transition (11 → 12) wraps
    /// just like the midnight one (23 → 0), matching the 12-hour dial the
    /// hour angle is computed on.
    pub fn on_tick(&mut self, sample: &TimeSample) -> RotationSnapshot {
        let raw = sample.hand_angles();
        let raw_hour = (sample.hours % 12) as i32;
        let raw_minute = sample.minutes as i32;
        let raw_second = sample.seconds as i32;

        // A backward field jump smaller than a full cycle (e.g. seconds
        // 10 -> 5 after a host clock adjustment) is also counted as a wrap.
        // That matches the long-standing display behavior: the hand sweeps
        // forward to the new position rather than backward.
        if self.last_raw_second != UNARMED && raw_second < self.last_raw_second {
            self.second_offset += 360.0;
            debug!("Second hand completed a full rotation.");
        }
        if self.last_raw_minute != UNARMED && raw_minute < self.last_raw_minute {
            self.minute_offset += 360.0;
        }
        if self.last_raw_hour != UNARMED && raw_hour < self.last_raw_hour {
            self.hour_offset += 360.0;
        }

        self.last_raw_hour = raw_hour;
        self.last_raw_minute = raw_minute;
        self.last_raw_second = raw_second;

        let snapshot = RotationSnapshot {
            hour_angle: self.hour_offset + raw.hour,
            minute_angle: self.minute_offset + raw.minute,
            second_angle: self.second_offset + raw.second,
            discontinuous: self.pending_discontinuity,
        };
        self.pending_discontinuity = false;
        snapshot
    }

    /// Discards all cumulative rotation and re-arms the wrap sentinels.
    ///
    /// The next snapshot published after a reset carries
    /// `discontinuous = true`; every later one is continuous again.
    pub fn reset(&mut self) {
        self.hour_offset = 0.0;
        self.minute_offset = 0.0;
        self.second_offset = 0.0;
        self.last_raw_hour = UNARMED;
        self.last_raw_minute = UNARMED;
        self.last_raw_second = UNARMED;
        self.pending_discontinuity = true;
    }
}

impl Default for RotationTracker {
    fn default() -> Self {
        Self::new()
    }
}
