//! Edge-triggered audio cue evaluation and the gate that decides whether a
//! computed cue may reach the bus.
//!
//! The evaluator is a pure consumer of time samples: it detects second and
//! hour edges and reports cues, independent of sampling cadence. Whether a
//! cue is actually published is decided downstream by the [`AudioGate`]:
//! cue emission requires the master audio flag, the backend's one-time
//! unlock gesture, and the per-kind preference. A dropped cue is simply
//! dropped: no queueing, no retry.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::config::AudioConfig;
use crate::events::{AudioCue, CueKind};
use crate::time::TimeSample;

const UNARMED: i32 = -1;

/// Owns the cue-detection state: the last second observed, the hour of the
/// last chime, and the tick cooldown deadline.
#[derive(Debug)]
pub struct AudioCueEvaluator {
    last_second_seen: i32,
    last_chime_hour: i32,
    tick_cooldown_until: i64,
    tick_cooldown_millis: i64,
}

impl AudioCueEvaluator {
    pub fn new(tick_cooldown_millis: u64) -> Self {
        Self {
            last_second_seen: UNARMED,
            last_chime_hour: UNARMED,
            tick_cooldown_until: 0,
            tick_cooldown_millis: tick_cooldown_millis as i64,
        }
    }

    /// Evaluates one sample and returns the cues it produced (possibly none,
    /// at most one of each kind).
    ///
    /// Chime: fires when the sample sits exactly on an hour boundary
    /// (`minutes == 0 && seconds == 0`) for an hour that has not chimed yet.
    /// The chimed hour stays latched while minutes remains zero, so several
    /// same-second samples within the zero-second window produce one chime;
    /// observing `minutes != 0` re-arms the latch for the next boundary.
    ///
    /// Tick: edge-triggered on the seconds field changing, at most once per
    /// unique second value, with a cooldown window so an artificially high
    /// sampling cadence cannot retrigger within one physical tick duration.
    pub fn on_tick(&mut self, sample: &TimeSample) -> Vec<AudioCue> {
        let mut cues = Vec::new();
        let hours = sample.hours as i32;
        let minutes = sample.minutes as i32;
        let seconds = sample.seconds as i32;

        if minutes == 0 && seconds == 0 && hours != self.last_chime_hour {
            cues.push(AudioCue {
                kind: CueKind::Chime,
                at_millis: sample.wall_clock_millis,
            });
            self.last_chime_hour = hours;
            debug!("Chime cue for hour {}.", hours);
        } else if minutes != 0 {
            self.last_chime_hour = UNARMED;
        }

        // A deadline more than one window ahead of the sample means the
        // host clock jumped backward; a stale deadline would mute every
        // tick until wall time caught back up.
        if sample.wall_clock_millis < self.tick_cooldown_until - self.tick_cooldown_millis {
            debug!(
                "Wall clock moved backward ({} < {}); tick cooldown cleared.",
                sample.wall_clock_millis, self.tick_cooldown_until
            );
            self.tick_cooldown_until = 0;
        }

        if seconds != self.last_second_seen {
            if sample.wall_clock_millis >= self.tick_cooldown_until {
                cues.push(AudioCue {
                    kind: CueKind::Tick,
                    at_millis: sample.wall_clock_millis,
                });
                self.tick_cooldown_until = sample.wall_clock_millis + self.tick_cooldown_millis;
            }
            self.last_second_seen = seconds;
        }

        cues
    }
}

/// The three-way gate between computed cues and the `audioCue` topic.
///
/// Lock-free: read on every cycle by the engine wiring, flipped from
/// preference updates and the unlock gesture.
#[derive(Debug)]
pub struct AudioGate {
    enabled: AtomicBool,
    unlocked: AtomicBool,
    tick_enabled: AtomicBool,
    chime_enabled: AtomicBool,
}

impl AudioGate {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            unlocked: AtomicBool::new(false),
            tick_enabled: AtomicBool::new(config.tick_enabled),
            chime_enabled: AtomicBool::new(config.chime_enabled),
        }
    }

    /// Whether a cue of this kind may be published right now.
    pub fn allows(&self, kind: CueKind) -> bool {
        if !self.enabled.load(Ordering::Relaxed) || !self.unlocked.load(Ordering::Relaxed) {
            return false;
        }
        match kind {
            CueKind::Tick => self.tick_enabled.load(Ordering::Relaxed),
            CueKind::Chime => self.chime_enabled.load(Ordering::Relaxed),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_unlocked(&self, unlocked: bool) {
        self.unlocked.store(unlocked, Ordering::Relaxed);
    }

    pub fn set_tick_enabled(&self, enabled: bool) {
        self.tick_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_chime_enabled(&self, enabled: bool) {
        self.chime_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Relaxed)
    }
}

/// The audio synthesis boundary. Real backends wrap a platform synthesizer;
/// the engine only needs the unlock gesture and a fire-and-forget trigger.
pub trait AudioBackend: Send {
    /// Performs the one-time interactive unlock gesture. Returns whether the
    /// backend is now ready to produce sound.
    fn unlock(&mut self) -> bool;

    /// Plays a cue. Fire-and-forget; failures stay inside the backend.
    fn trigger(&mut self, kind: CueKind);
}

/// A backend that produces log lines instead of sound. Used by the demo
/// binaries and tests.
#[derive(Debug, Default)]
pub struct NullAudioBackend {
    unlocked: bool,
}

impl NullAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for NullAudioBackend {
    fn unlock(&mut self) -> bool {
        self.unlocked = true;
        true
    }

    fn trigger(&mut self, kind: CueKind) {
        debug!("NullAudioBackend trigger: {:?}", kind);
    }
}
