//! Time sampling primitives: the per-cycle [`TimeSample`] and the
//! timezone-aware [`ClockSource`] that produces it.
//!
//! A `TimeSample` is created exactly once per scheduler cycle and shared with
//! every consumer as an `Arc`, so the rotation tracker and the cue evaluator
//! always observe the identical instant within one cycle.

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;
use tracing::warn;

use crate::common::lock_or_recover;

/// The pseudo zone id selecting the host's local time.
pub const LOCAL_TIMEZONE: &str = "local";

/// One immutable snapshot of calendar time, produced once per cycle.
///
/// Derived fields are always within their calendar range: `hours` in
/// `[0, 24)`, `minutes` and `seconds` in `[0, 60)`, `milliseconds` in
/// `[0, 1000)`. The sample is never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSample {
    /// Absolute wall-clock instant in milliseconds since the Unix epoch.
    pub wall_clock_millis: i64,
    /// The zone id this sample was resolved in (or requested in, when the
    /// clock source had to fall back to local time).
    pub timezone_id: String,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub milliseconds: u32,
}

impl TimeSample {
    /// Computes the raw (unwrapped) hand angles for this instant, in degrees.
    ///
    /// The hour hand advances with minutes and seconds, the minute hand with
    /// seconds, and the second hand with milliseconds, so all three sweep
    /// smoothly rather than stepping.
    pub fn hand_angles(&self) -> HandAngles {
        HandAngles {
            hour: f64::from(self.hours % 12) * 30.0
                + f64::from(self.minutes) * 0.5
                + f64::from(self.seconds) * (0.5 / 60.0),
            minute: f64::from(self.minutes) * 6.0 + f64::from(self.seconds) * 0.1,
            second: f64::from(self.seconds) * 6.0 + f64::from(self.milliseconds) * 0.006,
        }
    }
}

/// Raw per-hand angles in degrees, each within `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandAngles {
    pub hour: f64,
    pub minute: f64,
    pub second: f64,
}

/// A timezone-aware source of calendar time.
///
/// Implementations must fail soft: a zone id that cannot be resolved falls
/// back to host-local time for that cycle rather than propagating an error
/// into the scheduler loop.
pub trait ClockSource: Send + Sync {
    fn now(&self, timezone_id: &str) -> TimeSample;
}

/// The production clock source, backed by the host clock and the IANA
/// Time Zone Database via `chrono-tz`.
pub struct SystemClockSource {
    // Remembers the last zone id that failed to resolve so the fallback
    // warning fires once per bad value instead of once per cycle.
    last_bad_zone: Mutex<Option<String>>,
}

impl SystemClockSource {
    pub fn new() -> Self {
        Self {
            last_bad_zone: Mutex::new(None),
        }
    }

    fn warn_once(&self, timezone_id: &str) {
        let mut last = lock_or_recover(&self.last_bad_zone);
        if last.as_deref() != Some(timezone_id) {
            warn!(
                "Unknown timezone '{}'; falling back to local time.",
                timezone_id
            );
            *last = Some(timezone_id.to_string());
        }
    }
}

impl Default for SystemClockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClockSource {
    fn now(&self, timezone_id: &str) -> TimeSample {
        let utc = Utc::now();
        if timezone_id == LOCAL_TIMEZONE {
            return sample_from(utc, &utc.with_timezone(&Local), timezone_id);
        }
        match timezone_id.parse::<Tz>() {
            Ok(tz) => sample_from(utc, &utc.with_timezone(&tz), timezone_id),
            Err(_) => {
                self.warn_once(timezone_id);
                sample_from(utc, &utc.with_timezone(&Local), timezone_id)
            }
        }
    }
}

fn sample_from<Z: TimeZone>(utc: DateTime<Utc>, zoned: &DateTime<Z>, timezone_id: &str) -> TimeSample {
    TimeSample {
        wall_clock_millis: utc.timestamp_millis(),
        timezone_id: timezone_id.to_string(),
        hours: zoned.hour(),
        minutes: zoned.minute(),
        seconds: zoned.second(),
        milliseconds: utc.timestamp_subsec_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hand_angles_match_the_clock_face_formulas() {
        let sample = TimeSample {
            wall_clock_millis: 0,
            timezone_id: LOCAL_TIMEZONE.to_string(),
            hours: 15,
            minutes: 30,
            seconds: 45,
            milliseconds: 500,
        };
        let angles = sample.hand_angles();
        assert!((angles.hour - (3.0 * 30.0 + 30.0 * 0.5 + 45.0 * 0.5 / 60.0)).abs() < 1e-9);
        assert!((angles.minute - (30.0 * 6.0 + 45.0 * 0.1)).abs() < 1e-9);
        assert!((angles.second - (45.0 * 6.0 + 500.0 * 0.006)).abs() < 1e-9);
    }

    #[test]
    fn raw_angles_stay_under_a_full_turn() {
        let sample = TimeSample {
            wall_clock_millis: 0,
            timezone_id: LOCAL_TIMEZONE.to_string(),
            hours: 23,
            minutes: 59,
            seconds: 59,
            milliseconds: 999,
        };
        let angles = sample.hand_angles();
        assert!(angles.hour < 360.0);
        assert!(angles.minute < 360.0);
        assert!(angles.second < 360.0);
    }

    #[test]
    fn unknown_zone_falls_back_to_local_fields() {
        let clock = SystemClockSource::new();
        let sample = clock.now("Not/AZone");
        assert_eq!(sample.timezone_id, "Not/AZone");
        assert!(sample.hours < 24);
        assert!(sample.minutes < 60);
        assert!(sample.seconds < 60);
        assert!(sample.milliseconds < 1000);
    }

    #[test]
    fn named_zone_resolves_without_panicking() {
        let clock = SystemClockSource::new();
        let sample = clock.now("Asia/Karachi");
        assert_eq!(sample.timezone_id, "Asia/Karachi");
        assert!(sample.hours < 24);
    }
}
