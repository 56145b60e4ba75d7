//! # Orizon
//!
//! A time-driven reactive synchronization engine for smooth analog/digital
//! clock displays.
//!
//! Orizon renders nothing itself. It produces one immutable [`time::TimeSample`]
//! per cycle, fans it out over a named-topic event bus, and derives two
//! streams from it: continuously increasing hand angles (so rendered hands
//! sweep forward through every wraparound) and edge-triggered audio cues
//! (one tick per second, one chime per hour). External collaborators such as
//! a renderer, an audio backend, or a preference store subscribe to those
//! topics and never touch the engine directly.
//!
//! ## Core Concepts
//!
//! - **Event Bus**: a synchronous, reentrant-safe publish/subscribe
//!   dispatcher; the sole communication channel in the system.
//! - **Time Sampler**: queries a timezone-aware clock source once per cycle
//!   and publishes `tick` plus `secondBoundary`/`minuteBoundary` edges;
//!   cadence adapts between full-rate and 1 Hz power-saving modes.
//! - **Rotation Tracker**: turns calendar wraparounds into cumulative 360°
//!   offsets so published angles are monotonic; a timezone change resets it
//!   with a single flagged discontinuity.
//! - **Audio Cue Evaluator**: detects second and hour edges independently of
//!   the tracker, gated behind an explicit enable plus the backend's
//!   one-time unlock gesture.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use orizon::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load configuration (file and environment are both optional).
//!     let config = OrizonConfig::default();
//!
//!     // 2. Create the engine.
//!     let engine = OrizonEngine::new(config);
//!
//!     // 3. Subscribe a renderer to the derived rotation stream.
//!     let _renderer = engine.bus().subscribe(topic::ROTATION_UPDATE, |_, message| {
//!         if let BusMessage::Rotation(snapshot) = message {
//!             println!("second hand at {:.1}°", snapshot.second_angle);
//!         }
//!     });
//!
//!     // 4. Run the engine. It will shut down on Ctrl+C.
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Orizon Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod audio;
pub mod bus;
pub mod common;
pub mod config;
pub mod engine;
pub mod events;
pub mod format;
pub mod rotation;
pub mod scheduler;
pub mod time;

/// A prelude module for easy importing of the most common Orizon types.
pub mod prelude {
    pub use crate::audio::{AudioBackend, AudioGate, NullAudioBackend};
    pub use crate::bus::{EventBus, Subscription};
    pub use crate::config::{CadenceMode, OrizonConfig};
    pub use crate::engine::OrizonEngine;
    pub use crate::events::{
        topic, AudioCue, BusMessage, CueKind, RotationSnapshot, SettingChange,
    };
    pub use crate::time::{ClockSource, TimeSample};
}
