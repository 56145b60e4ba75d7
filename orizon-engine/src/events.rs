//! Defines the topic names and message payloads carried by the event bus.
//!
//! This module acts as the public API for the engine's event system. All
//! coupling between components goes through these topic names; no component
//! holds a direct reference to another. Flow is strictly one-directional:
//! the sampler publishes the `tick`/boundary topics, the rotation tracker
//! publishes only `rotationUpdate`, and the cue pipeline publishes only
//! `audioCue`. No component re-publishes onto a topic it subscribes to.

use std::sync::Arc;

use crate::config::CadenceMode;
use crate::time::TimeSample;

/// Well-known topic names.
pub mod topic {
    /// One message per scheduler cycle, carrying the cycle's [`super::TimeSample`].
    pub const TICK: &str = "tick";
    /// Published only on cycles where the seconds field changed.
    pub const SECOND_BOUNDARY: &str = "secondBoundary";
    /// Published only on cycles where the minutes field changed.
    pub const MINUTE_BOUNDARY: &str = "minuteBoundary";
    /// Cumulative hand angles derived from each tick.
    pub const ROTATION_UPDATE: &str = "rotationUpdate";
    /// Gated audio cues (tick / chime).
    pub const AUDIO_CUE: &str = "audioCue";
    /// Preference updates from the external preference store.
    pub const SETTING_CHANGED: &str = "settingChanged";
    /// Subscribers to this topic receive every message on every topic.
    pub const WILDCARD: &str = "*";
}

/// The payload delivered to bus handlers.
///
/// Time-sample variants share one `Arc` per cycle so all subscribers observe
/// the identical sample instance.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Tick(Arc<TimeSample>),
    SecondBoundary(Arc<TimeSample>),
    MinuteBoundary(Arc<TimeSample>),
    Rotation(RotationSnapshot),
    Cue(AudioCue),
    Setting(SettingChange),
}

/// A read-only snapshot of the rotation tracker's state, published as
/// [`topic::ROTATION_UPDATE`] once per cycle.
///
/// Angles are cumulative and unbounded: renderers apply them directly as a
/// rotation transform and get monotonic sweep across wraparounds for free.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationSnapshot {
    pub hour_angle: f64,
    pub minute_angle: f64,
    pub second_angle: f64,
    /// Set on exactly one snapshot after an explicit reset (e.g. a timezone
    /// change). Renderers suppress transition animation for that snapshot
    /// only, preventing a visible sweep backward across the face.
    pub discontinuous: bool,
}

/// The two cue kinds the evaluator can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    /// One per second boundary.
    Tick,
    /// One per hour boundary.
    Chime,
}

/// A discrete audio trigger, published as [`topic::AUDIO_CUE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCue {
    pub kind: CueKind,
    /// Wall-clock instant of the sample that produced this cue.
    pub at_millis: i64,
}

/// A discrete preference update, published as [`topic::SETTING_CHANGED`] by
/// the external preference store (or an operator shell). The engine applies
/// these; it never writes back to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    Cadence(CadenceMode),
    Timezone(String),
    AudioEnabled(bool),
    TickEnabled(bool),
    ChimeEnabled(bool),
}
