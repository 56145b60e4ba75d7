//! The wiring that binds the bus, sampler, rotation tracker, and audio cue
//! pipeline into one engine.
//!
//! The engine owns the bus and the derived-state consumers. Construction
//! attaches the rotation tracker and the cue evaluator to the `tick` topic
//! and an applier to `settingChanged`; after that every interaction flows
//! through topic names. The engine's public operations never raise: misuse
//! is logged and reported through return values.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::{AudioBackend, AudioCueEvaluator, AudioGate};
use crate::bus::{EventBus, Subscription};
use crate::common::lock_or_recover;
use crate::config::OrizonConfig;
use crate::events::{topic, BusMessage, SettingChange};
use crate::rotation::RotationTracker;
use crate::scheduler::{CycleProvider, FrameCycleProvider, Sampler};
use crate::time::{ClockSource, SystemClockSource};

/// The main Orizon engine.
///
/// This struct is the central point of control. It holds the configuration,
/// owns the event bus and the per-cycle consumers, and drives the sampling
/// loop. External collaborators (renderers, audio backends, preference
/// stores) talk to it exclusively through the bus handle returned by
/// [`OrizonEngine::bus`].
pub struct OrizonEngine {
    config: Arc<OrizonConfig>,
    bus: EventBus,
    sampler: Sampler,
    tracker: Arc<Mutex<RotationTracker>>,
    gate: Arc<AudioGate>,
    // Holds the engine's own bus subscriptions for the lifetime of the
    // engine; unsubscribed on shutdown.
    subscriptions: Vec<Subscription>,
}

impl OrizonEngine {
    /// Creates an engine wired to the system clock.
    pub fn new(config: OrizonConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClockSource::new()))
    }

    /// Creates an engine with an injected clock source (used by tests and
    /// deterministic drivers).
    pub fn with_clock(config: OrizonConfig, clock: Arc<dyn ClockSource>) -> Self {
        let config = Arc::new(config);
        let bus = EventBus::new(config.bus.max_listeners);
        let sampler = Sampler::new(bus.clone(), clock, config.cadence, config.timezone.clone());
        let tracker = Arc::new(Mutex::new(RotationTracker::new()));
        let evaluator = Arc::new(Mutex::new(AudioCueEvaluator::new(
            config.audio.tick_cooldown_millis,
        )));
        let gate = Arc::new(AudioGate::new(&config.audio));

        let mut subscriptions = Vec::new();

        // Rotation: every tick becomes a rotationUpdate snapshot.
        let rotation_bus = bus.clone();
        let rotation_tracker = tracker.clone();
        subscriptions.push(bus.subscribe(topic::TICK, move |_, message| {
            if let BusMessage::Tick(sample) = message {
                let snapshot = lock_or_recover(&rotation_tracker).on_tick(sample);
                rotation_bus.publish(topic::ROTATION_UPDATE, &BusMessage::Rotation(snapshot));
            }
        }));

        // Cues: computed on every tick, published only when the gate allows.
        let cue_bus = bus.clone();
        let cue_gate = gate.clone();
        subscriptions.push(bus.subscribe(topic::TICK, move |_, message| {
            if let BusMessage::Tick(sample) = message {
                for cue in lock_or_recover(&evaluator).on_tick(sample) {
                    if cue_gate.allows(cue.kind) {
                        cue_bus.publish(topic::AUDIO_CUE, &BusMessage::Cue(cue));
                    }
                }
            }
        }));

        // Preference updates from the external store.
        let setting_sampler = sampler.clone();
        let setting_tracker = tracker.clone();
        let setting_gate = gate.clone();
        subscriptions.push(bus.subscribe(topic::SETTING_CHANGED, move |_, message| {
            if let BusMessage::Setting(change) = message {
                match change {
                    SettingChange::Timezone(zone) => {
                        info!("Timezone changed to '{}'; rotation state reset.", zone);
                        setting_sampler.set_timezone(zone.clone());
                        lock_or_recover(&setting_tracker).reset();
                    }
                    SettingChange::Cadence(mode) => {
                        info!("Cadence changed to {:?}.", mode);
                        setting_sampler.set_cadence(*mode);
                    }
                    SettingChange::AudioEnabled(on) => setting_gate.set_enabled(*on),
                    SettingChange::TickEnabled(on) => setting_gate.set_tick_enabled(*on),
                    SettingChange::ChimeEnabled(on) => setting_gate.set_chime_enabled(*on),
                }
            }
        }));

        Self {
            config,
            bus,
            sampler,
            tracker,
            gate,
            subscriptions,
        }
    }

    /// A handle to the engine's bus, for external subscribers and the
    /// preference store.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn config(&self) -> &OrizonConfig {
        &self.config
    }

    pub fn gate(&self) -> &AudioGate {
        &self.gate
    }

    /// Starts the sampling loop on the production frame provider. Returns
    /// `false` if the loop was already running.
    pub fn start(&self) -> bool {
        let frame = Duration::from_millis(self.config.frame_millis.max(1));
        self.start_with(FrameCycleProvider::new(frame))
    }

    /// Starts the sampling loop on an injected cycle provider.
    pub fn start_with(&self, cycles: impl CycleProvider) -> bool {
        self.sampler.start(cycles)
    }

    /// Stops the sampling loop. Idempotent.
    pub fn stop(&self) {
        self.sampler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.sampler.is_running()
    }

    /// Performs the backend's one-time unlock gesture and, on success, opens
    /// the unlock half of the audio gate.
    pub fn unlock_audio(&self, backend: &mut dyn AudioBackend) -> bool {
        if backend.unlock() {
            self.gate.set_unlocked(true);
            true
        } else {
            warn!("Audio backend refused the unlock gesture; cues stay muted.");
            false
        }
    }

    /// Explicitly resets the rotation tracker, flagging the next snapshot as
    /// discontinuous. Normally driven by a timezone `settingChanged`
    /// message; exposed for hosts with their own discontinuity signals.
    pub fn reset_rotation(&self) {
        lock_or_recover(&self.tracker).reset();
    }

    /// Runs the engine until a shutdown signal is received.
    ///
    /// This method will start the sampling loop, wait for Ctrl+C, then stop
    /// the loop and tear the bus down. Intended for binaries; library hosts
    /// drive [`OrizonEngine::start`]/[`OrizonEngine::stop`] directly.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Orizon engine starting up...");
        if !self.start() {
            warn!("Engine was already running when run() was called.");
        }

        info!(
            "Engine running at {:?} cadence in '{}'. Press Ctrl+C to shut down.",
            self.config.cadence, self.config.timezone
        );
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received.");
        self.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!("Orizon engine has shut down.");
        Ok(())
    }

    /// Stops the loop and destroys the bus. Terminal; subsequent publishes
    /// are no-ops.
    pub fn shutdown(&self) {
        self.stop();
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.bus.destroy();
    }
}
